//! Kubernetes client configuration model.
//!
//! Only the fields this tool reads or rewrites are typed; everything else in
//! an entry round-trips through the `extra` maps so merged files keep what
//! other tools wrote.

mod materialize;

use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_yaml_ng::Value;
use thiserror::Error;

pub use materialize::{default_path, materialize};
pub(crate) use materialize::materialize_at;

/// Errors raised while handling kubeconfig documents.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum KubeconfigError {
    /// The document is not valid kubeconfig YAML.
    #[error("failed to parse kubeconfig: {message}")]
    Parse {
        /// Parser error message.
        message: String,
    },
    /// The document parsed but cannot be used to reach a cluster.
    #[error("invalid kubeconfig: {reason}")]
    Invalid {
        /// What is missing or inconsistent.
        reason: String,
    },
    /// Reading or writing the kubeconfig file failed.
    #[error("kubeconfig I/O failed at {path}: {message}")]
    Io {
        /// File or directory involved.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        message: String,
    },
    /// The existing default kubeconfig cannot be parsed, so merging into it
    /// would discard its entries.
    #[error("refusing to overwrite unreadable kubeconfig at {path}: {message}")]
    Unmergeable {
        /// Existing file.
        path: Utf8PathBuf,
        /// Parser error message.
        message: String,
    },
    /// No explicit path was given and the home directory is unknown.
    #[error("cannot resolve the default kubeconfig path: home directory is unknown")]
    NoHome,
}

impl KubeconfigError {
    fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: &Utf8Path, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        }
    }
}

/// A kubeconfig document (`kind: Config`).
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Kubeconfig {
    /// Schema version, `v1`.
    #[serde(rename = "apiVersion", default = "default_api_version")]
    pub api_version: String,
    /// Document kind, `Config`.
    #[serde(default = "default_kind")]
    pub kind: String,
    /// Cluster endpoints.
    #[serde(default)]
    pub clusters: Vec<NamedCluster>,
    /// Context bindings of cluster, user and namespace.
    #[serde(default)]
    pub contexts: Vec<NamedContext>,
    /// User credentials.
    #[serde(default)]
    pub users: Vec<NamedUser>,
    /// Context selected by default.
    #[serde(
        rename = "current-context",
        default,
        skip_serializing_if = "String::is_empty"
    )]
    pub current_context: String,
    /// Client preferences, carried through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferences: Option<Value>,
    /// Other top-level keys such as `extensions`, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn default_api_version() -> String {
    String::from("v1")
}

fn default_kind() -> String {
    String::from("Config")
}

/// Named cluster entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NamedCluster {
    /// Entry name.
    pub name: String,
    /// Endpoint settings.
    pub cluster: ClusterEntry,
    /// Other keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Cluster endpoint settings.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ClusterEntry {
    /// API server URL.
    #[serde(default)]
    pub server: String,
    /// Base64 PEM of the cluster CA.
    #[serde(
        rename = "certificate-authority-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificate_authority_data: Option<String>,
    /// Other keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Named context entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NamedContext {
    /// Entry name.
    pub name: String,
    /// Binding details.
    pub context: ContextEntry,
    /// Other keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Binding of a cluster to a user.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct ContextEntry {
    /// Cluster entry name.
    #[serde(default)]
    pub cluster: String,
    /// User entry name. `kubectl config set-context` may leave it unset.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub user: String,
    /// Default namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Other keys such as `extensions`, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Named user entry.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct NamedUser {
    /// Entry name.
    pub name: String,
    /// Credentials.
    #[serde(default)]
    pub user: UserEntry,
    /// Other keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// User credentials.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Serialize)]
pub struct UserEntry {
    /// Base64 PEM client certificate.
    #[serde(
        rename = "client-certificate-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_certificate_data: Option<String>,
    /// Base64 PEM client key.
    #[serde(
        rename = "client-key-data",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub client_key_data: Option<String>,
    /// Bearer token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Exec credential plugin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exec: Option<Value>,
    /// Other keys, preserved verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl UserEntry {
    fn has_credentials(&self) -> bool {
        let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.is_empty());
        present(&self.token)
            || (present(&self.client_certificate_data) && present(&self.client_key_data))
            || self.exec.is_some()
    }
}

impl Kubeconfig {
    /// Parses a kubeconfig document.
    ///
    /// # Errors
    ///
    /// Returns [`KubeconfigError::Parse`] for malformed YAML.
    pub fn from_yaml(raw: &str) -> Result<Self, KubeconfigError> {
        serde_yaml_ng::from_str(raw).map_err(|err| KubeconfigError::Parse {
            message: err.to_string(),
        })
    }

    /// Serialises the document to YAML.
    ///
    /// # Errors
    ///
    /// Returns [`KubeconfigError::Parse`] if serialisation fails.
    pub fn to_yaml(&self) -> Result<String, KubeconfigError> {
        serde_yaml_ng::to_string(self).map_err(|err| KubeconfigError::Parse {
            message: err.to_string(),
        })
    }

    fn current(&self) -> Result<(&NamedContext, &NamedCluster, &NamedUser), KubeconfigError> {
        if self.current_context.is_empty() {
            return Err(KubeconfigError::invalid("current-context is not set"));
        }
        let context = self
            .contexts
            .iter()
            .find(|entry| entry.name == self.current_context)
            .ok_or_else(|| {
                KubeconfigError::invalid(format!(
                    "current-context {} has no matching context",
                    self.current_context
                ))
            })?;
        let cluster = self
            .clusters
            .iter()
            .find(|entry| entry.name == context.context.cluster)
            .ok_or_else(|| {
                KubeconfigError::invalid(format!(
                    "context {} references unknown cluster {}",
                    context.name, context.context.cluster
                ))
            })?;
        let user = self
            .users
            .iter()
            .find(|entry| entry.name == context.context.user)
            .ok_or_else(|| {
                KubeconfigError::invalid(format!(
                    "context {} references unknown user {}",
                    context.name, context.context.user
                ))
            })?;
        Ok((context, cluster, user))
    }

    /// Checks that the current context can reach and authenticate against a
    /// cluster.
    ///
    /// # Errors
    ///
    /// Returns [`KubeconfigError::Invalid`] naming the first problem found.
    pub fn validate(&self) -> Result<(), KubeconfigError> {
        let (_, cluster, user) = self.current()?;
        if cluster.cluster.server.trim().is_empty() {
            return Err(KubeconfigError::invalid(format!(
                "cluster {} has no server",
                cluster.name
            )));
        }
        if cluster
            .cluster
            .certificate_authority_data
            .as_deref()
            .is_none_or(str::is_empty)
        {
            return Err(KubeconfigError::invalid(format!(
                "cluster {} has no certificate-authority-data",
                cluster.name
            )));
        }
        if !user.user.has_credentials() {
            return Err(KubeconfigError::invalid(format!(
                "user {} has no token, client certificate or exec plugin",
                user.name
            )));
        }
        Ok(())
    }

    /// API server URL of the current context.
    ///
    /// # Errors
    ///
    /// Returns [`KubeconfigError::Invalid`] when the current context does not
    /// resolve.
    pub fn endpoint(&self) -> Result<&str, KubeconfigError> {
        let (_, cluster, _) = self.current()?;
        Ok(cluster.cluster.server.as_str())
    }

    /// Reduces the document to its current context and renames the cluster,
    /// context and user entries to `name`, pointing the cluster at `server`.
    ///
    /// # Errors
    ///
    /// Returns [`KubeconfigError::Invalid`] when the current context does not
    /// resolve.
    pub fn retarget(&self, name: &str, server: &str) -> Result<Self, KubeconfigError> {
        let (context, cluster, user) = self.current()?;
        let mut cluster_entry = cluster.cluster.clone();
        cluster_entry.server = server.to_owned();
        Ok(Self {
            api_version: self.api_version.clone(),
            kind: self.kind.clone(),
            clusters: vec![NamedCluster {
                name: name.to_owned(),
                cluster: cluster_entry,
                extra: cluster.extra.clone(),
            }],
            contexts: vec![NamedContext {
                name: name.to_owned(),
                context: ContextEntry {
                    cluster: name.to_owned(),
                    user: name.to_owned(),
                    namespace: context.context.namespace.clone(),
                    extra: context.context.extra.clone(),
                },
                extra: context.extra.clone(),
            }],
            users: vec![NamedUser {
                name: name.to_owned(),
                user: user.user.clone(),
                extra: user.extra.clone(),
            }],
            current_context: name.to_owned(),
            preferences: self.preferences.clone(),
            extra: self.extra.clone(),
        })
    }

    /// Folds `incoming` into `self`: entries sharing a name are replaced,
    /// others are kept, and `incoming`'s current context becomes current.
    pub fn merge(&mut self, incoming: Self) {
        replace_named(&mut self.clusters, incoming.clusters, |entry| &entry.name);
        replace_named(&mut self.contexts, incoming.contexts, |entry| &entry.name);
        replace_named(&mut self.users, incoming.users, |entry| &entry.name);
        if !incoming.current_context.is_empty() {
            self.current_context = incoming.current_context;
        }
    }
}

fn replace_named<T>(existing: &mut Vec<T>, incoming: Vec<T>, name: impl Fn(&T) -> &String) {
    existing.retain(|kept| !incoming.iter().any(|new| name(new) == name(kept)));
    existing.extend(incoming);
}
