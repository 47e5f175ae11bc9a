//! Atomic kubeconfig writes.

use std::fs;
use std::io::Write;

use camino::{Utf8Path, Utf8PathBuf};

use super::{Kubeconfig, KubeconfigError};

/// Returns `$HOME/.kube/config`.
///
/// # Errors
///
/// Returns [`KubeconfigError::NoHome`] when the home directory is unknown or
/// not valid UTF-8.
pub fn default_path() -> Result<Utf8PathBuf, KubeconfigError> {
    let home = dirs::home_dir()
        .and_then(|dir| Utf8PathBuf::from_path_buf(dir).ok())
        .ok_or(KubeconfigError::NoHome)?;
    Ok(home.join(".kube").join("config"))
}

/// Validates `kubeconfig` and writes it to `target`, or merges it into the
/// default kubeconfig when `target` is `None`. Returns the written path.
///
/// # Errors
///
/// Returns [`KubeconfigError::Invalid`] before touching the filesystem when
/// validation fails, [`KubeconfigError::Unmergeable`] when the default
/// kubeconfig exists but cannot be parsed, and [`KubeconfigError::Io`] when
/// the write fails.
pub fn materialize(
    kubeconfig: &Kubeconfig,
    target: Option<&Utf8Path>,
) -> Result<Utf8PathBuf, KubeconfigError> {
    match target {
        Some(path) => materialize_at(kubeconfig, path, false),
        None => materialize_at(kubeconfig, &default_path()?, true),
    }
}

/// Writes `kubeconfig` to `path`, merging into the existing document when
/// `merge` is set. An existing file that does not parse is left untouched.
pub(crate) fn materialize_at(
    kubeconfig: &Kubeconfig,
    path: &Utf8Path,
    merge: bool,
) -> Result<Utf8PathBuf, KubeconfigError> {
    kubeconfig.validate()?;
    let document = if merge {
        merged_with_existing(kubeconfig, path)?
    } else {
        kubeconfig.clone()
    };
    write_atomic(path, &document.to_yaml()?)?;
    tracing::info!(path = %path, context = %document.current_context, "wrote kubeconfig");
    Ok(path.to_path_buf())
}

fn merged_with_existing(
    kubeconfig: &Kubeconfig,
    path: &Utf8Path,
) -> Result<Kubeconfig, KubeconfigError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Ok(kubeconfig.clone());
        }
        Err(err) => return Err(KubeconfigError::io(path, &err)),
    };
    if raw.trim().is_empty() {
        return Ok(kubeconfig.clone());
    }
    let mut existing =
        Kubeconfig::from_yaml(&raw).map_err(|err| KubeconfigError::Unmergeable {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    existing.merge(kubeconfig.clone());
    Ok(existing)
}

/// Writes `contents` to a private sibling temp file, syncs it and renames it
/// over `path`.
fn write_atomic(path: &Utf8Path, contents: &str) -> Result<(), KubeconfigError> {
    let parent = path
        .parent()
        .filter(|dir| !dir.as_str().is_empty())
        .unwrap_or_else(|| Utf8Path::new("."));
    ensure_private_dir(parent)?;

    let mut staged = tempfile::Builder::new()
        .prefix(".devkube-")
        .suffix(".tmp")
        .tempfile_in(parent)
        .map_err(|err| KubeconfigError::io(parent, &err))?;
    staged
        .write_all(contents.as_bytes())
        .map_err(|err| KubeconfigError::io(path, &err))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|err| KubeconfigError::io(path, &err))?;
    staged
        .persist(path)
        .map_err(|err| KubeconfigError::io(path, &err.error))?;
    Ok(())
}

fn ensure_private_dir(dir: &Utf8Path) -> Result<(), KubeconfigError> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder
        .create(dir)
        .map_err(|err| KubeconfigError::io(dir, &err))
}
