//! Canonical cluster and resource descriptors shared by all providers.

use std::fmt;
use std::str::FromStr;

use super::error::ProviderError;

/// Longest accepted cluster name. Derived node names such as
/// `<name>-control-plane` must stay within the 63 character label limit.
pub const MAX_CLUSTER_NAME_LEN: usize = 40;

/// Validated cluster name: a lowercase RFC 1123 label.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ClusterName(String);

impl ClusterName {
    /// Parses and validates a cluster name, trimming surrounding whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Validation`] when the name is empty, too long,
    /// or not a lowercase alphanumeric label with inner hyphens.
    pub fn parse(value: impl Into<String>) -> Result<Self, ProviderError> {
        let name = value.into().trim().to_owned();
        if name.is_empty() {
            return Err(invalid_name("must not be empty"));
        }
        if name.len() > MAX_CLUSTER_NAME_LEN {
            return Err(invalid_name(&format!(
                "must be at most {MAX_CLUSTER_NAME_LEN} characters"
            )));
        }
        if !name
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-')
        {
            return Err(invalid_name(
                "may only contain lowercase letters, digits and '-'",
            ));
        }
        if name.starts_with('-') || name.ends_with('-') {
            return Err(invalid_name("must start and end with a letter or digit"));
        }
        Ok(Self(name))
    }

    /// Returns the name as a string slice.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

fn invalid_name(message: &str) -> ProviderError {
    ProviderError::Validation {
        field: String::from("cluster name"),
        message: message.to_owned(),
    }
}

impl FromStr for ClusterName {
    type Err = ProviderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value)
    }
}

impl AsRef<str> for ClusterName {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl fmt::Display for ClusterName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle status derived from live backend resources.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ClusterStatus {
    /// Resources exist and the backend reports them as still coming up.
    Provisioning,
    /// Every expected resource exists and the control plane is serving.
    Ready,
    /// Some resources exist but the set is incomplete or stopped.
    PartiallyProvisioned,
    /// The backend reports resources being removed.
    Deleting,
    /// The backend reported a state this tool does not recognise.
    Unknown,
}

impl ClusterStatus {
    /// Returns the kebab-case label used in listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::PartiallyProvisioned => "partially-provisioned",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ClusterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of backend object created on behalf of a cluster.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ResourceKind {
    /// Virtual network the nodes attach to.
    Network,
    /// Compute node: a cloud server or a local node container.
    ComputeNode,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::ComputeNode => f.write_str("node"),
        }
    }
}

/// Backend-native object discovered or created for a cluster.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ManagedResource {
    /// Resource kind.
    pub kind: ResourceKind,
    /// Identifier assigned by the backend.
    pub provider_id: String,
    /// Display name reported by the backend.
    pub name: String,
    /// Cluster the resource is labelled for.
    pub owner_cluster: ClusterName,
}

impl ManagedResource {
    /// Describes a network owned by `cluster`.
    #[must_use]
    pub fn network(
        provider_id: impl ToString,
        name: impl Into<String>,
        cluster: &ClusterName,
    ) -> Self {
        Self {
            kind: ResourceKind::Network,
            provider_id: provider_id.to_string(),
            name: name.into(),
            owner_cluster: cluster.clone(),
        }
    }

    /// Describes a compute node owned by `cluster`.
    #[must_use]
    pub fn compute_node(
        provider_id: impl ToString,
        name: impl Into<String>,
        cluster: &ClusterName,
    ) -> Self {
        Self {
            kind: ResourceKind::ComputeNode,
            provider_id: provider_id.to_string(),
            name: name.into(),
            owner_cluster: cluster.clone(),
        }
    }
}

impl fmt::Display for ManagedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.kind, self.name, self.provider_id)
    }
}

/// One cluster as reconstructed from live backend state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClusterSummary {
    /// Cluster name taken from resource labels.
    pub name: ClusterName,
    /// Status derived from the resources below.
    pub status: ClusterStatus,
    /// Resources currently labelled for the cluster.
    pub resources: Vec<ManagedResource>,
}

impl ClusterSummary {
    /// Returns the resources of one kind.
    pub fn resources_of(&self, kind: ResourceKind) -> impl Iterator<Item = &ManagedResource> {
        self.resources
            .iter()
            .filter(move |resource| resource.kind == kind)
    }
}

/// Result of a `list` call.
///
/// When only some resource kinds could be enumerated, `clusters` holds what
/// was found and `incomplete` carries the error for the missing kinds.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ClusterListing {
    /// Clusters sorted by name.
    pub clusters: Vec<ClusterSummary>,
    /// Error for resource kinds that could not be enumerated.
    pub incomplete: Option<ProviderError>,
}

impl ClusterListing {
    /// Looks up a cluster by name.
    #[must_use]
    pub fn find(&self, name: &ClusterName) -> Option<&ClusterSummary> {
        self.clusters.iter().find(|cluster| &cluster.name == name)
    }

    /// Returns the listed cluster names in order.
    #[must_use]
    pub fn names(&self) -> Vec<&ClusterName> {
        self.clusters.iter().map(|cluster| &cluster.name).collect()
    }

    /// Fails unless the listing is complete and `name` is absent.
    ///
    /// # Errors
    ///
    /// Returns the listing's own error when it is incomplete and
    /// [`ProviderError::AlreadyExists`] when the name is taken.
    pub fn ensure_absent(&self, name: &ClusterName) -> Result<(), ProviderError> {
        if let Some(err) = &self.incomplete {
            return Err(err.clone());
        }
        if self.find(name).is_some() {
            return Err(ProviderError::AlreadyExists {
                cluster: name.to_string(),
            });
        }
        Ok(())
    }

    /// Returns the cluster when the listing is complete and contains it.
    ///
    /// # Errors
    ///
    /// Returns the listing's own error when it is incomplete and
    /// [`ProviderError::NotFound`] when the name is absent.
    pub fn require_present(&self, name: &ClusterName) -> Result<&ClusterSummary, ProviderError> {
        if let Some(err) = &self.incomplete {
            return Err(err.clone());
        }
        self.find(name).ok_or_else(|| ProviderError::NotFound {
            cluster: name.to_string(),
        })
    }

    /// Returns the cluster when it is present and observed ready.
    ///
    /// # Errors
    ///
    /// As [`Self::require_present`], plus [`ProviderError::NotReady`] when the
    /// derived status is anything but [`ClusterStatus::Ready`].
    pub fn require_ready(&self, name: &ClusterName) -> Result<&ClusterSummary, ProviderError> {
        let cluster = self.require_present(name)?;
        if cluster.status != ClusterStatus::Ready {
            return Err(ProviderError::NotReady {
                cluster: name.to_string(),
                status: cluster.status,
            });
        }
        Ok(cluster)
    }

    /// Converts the listing into a plain result, failing when incomplete.
    ///
    /// # Errors
    ///
    /// Returns the error carried in `incomplete`.
    pub fn into_complete(self) -> Result<Vec<ClusterSummary>, ProviderError> {
        match self.incomplete {
            Some(err) => Err(err),
            None => Ok(self.clusters),
        }
    }
}

/// Resources removed by a `delete` call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TeardownReport {
    /// Resources deleted from the backend.
    pub removed: Vec<ManagedResource>,
    /// Shared resources released by this cluster but kept for other owners.
    pub released: Vec<ManagedResource>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn summary(name: &str, status: ClusterStatus) -> ClusterSummary {
        ClusterSummary {
            name: ClusterName::parse(name).unwrap_or_else(|err| panic!("name: {err}")),
            status,
            resources: Vec::new(),
        }
    }

    #[rstest]
    #[case("dev")]
    #[case("team-a-01")]
    #[case("  padded  ")]
    fn cluster_name_accepts_labels(#[case] raw: &str) {
        let name = ClusterName::parse(raw).expect("name should parse");
        assert_eq!(name.as_str(), raw.trim());
    }

    #[rstest]
    #[case("")]
    #[case("Upper")]
    #[case("-leading")]
    #[case("trailing-")]
    #[case("under_score")]
    #[case("a-name-that-is-far-too-long-to-fit-in-a-label")]
    fn cluster_name_rejects_invalid_labels(#[case] raw: &str) {
        let err = ClusterName::parse(raw).expect_err("name should be rejected");
        assert!(matches!(err, ProviderError::Validation { .. }));
    }

    #[rstest]
    fn require_ready_distinguishes_missing_and_not_ready() {
        let listing = ClusterListing {
            clusters: vec![summary("half", ClusterStatus::PartiallyProvisioned)],
            incomplete: None,
        };
        let half = ClusterName::parse("half").expect("name");
        let absent = ClusterName::parse("absent").expect("name");

        assert_eq!(
            listing.require_ready(&half),
            Err(ProviderError::NotReady {
                cluster: String::from("half"),
                status: ClusterStatus::PartiallyProvisioned,
            })
        );
        assert!(
            listing
                .require_ready(&absent)
                .is_err_and(|err| err.is_not_found())
        );
    }

    #[rstest]
    fn incomplete_listing_blocks_collision_checks() {
        let unreachable = ProviderError::BackendUnreachable {
            resource: String::from("servers"),
            message: String::from("timeout"),
        };
        let listing = ClusterListing {
            clusters: Vec::new(),
            incomplete: Some(unreachable.clone()),
        };
        let name = ClusterName::parse("dev").expect("name");
        assert_eq!(listing.ensure_absent(&name), Err(unreachable));
    }

    #[rstest]
    fn provisioning_failure_renders_left_behind_resources() {
        let cluster = ClusterName::parse("dev").expect("name");
        let err = ProviderError::ProvisioningFailed {
            cluster: cluster.to_string(),
            stage: String::from("attach"),
            message: String::from("boom"),
            left_behind: vec![
                ManagedResource::network(7, "devkube", &cluster),
                ManagedResource::compute_node(42, "dev-control-plane", &cluster),
            ],
        };
        let rendered = err.to_string();
        assert!(rendered.contains("network devkube (7)"), "{rendered}");
        assert!(rendered.contains("node dev-control-plane (42)"), "{rendered}");
        assert_eq!(err.left_behind().len(), 2);
    }
}
