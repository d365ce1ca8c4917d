//! Path handling for declared host paths
//!
//! Declared paths are always absolute host paths (`/fedora/config`). They
//! are validated once during config resolution and mapped under the target
//! root (`--root`) only when a resource touches the filesystem.
//!
//! # Environment Variables
//!
//! - `FCREPO_PROVISION_ROOT` - Override the target root (default `/`)
//! - `FCREPO_PROVISION_ARTIFACTS` - Override the source artifact directory

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Environment variable for the target root override
pub const ENV_ROOT: &str = "FCREPO_PROVISION_ROOT";

/// Environment variable for the artifact directory override
pub const ENV_ARTIFACTS: &str = "FCREPO_PROVISION_ARTIFACTS";

/// Default directory holding source artifacts (tarballs, the WAR)
pub const DEFAULT_ARTIFACTS_DIR: &str = "/var/lib/fcrepo-provision/artifacts";

/// Validate a declared path: absolute, no `.` or `..` components, no
/// trailing slash noise
///
/// Returns the path rebuilt from its components.
pub fn clean_absolute(path: &str) -> Result<PathBuf> {
    let candidate = Path::new(path);
    if !candidate.is_absolute() {
        bail!("'{path}' is not an absolute path");
    }

    // Path::components() drops interior "." segments, so check the raw text
    if path.split('/').any(|segment| segment == "." || segment == "..") {
        bail!("'{path}' must not contain '.' or '..' components");
    }

    let mut cleaned = PathBuf::from("/");
    for component in candidate.components() {
        match component {
            Component::RootDir => {}
            Component::Normal(part) => cleaned.push(part),
            Component::CurDir | Component::ParentDir | Component::Prefix(_) => {
                bail!("'{path}' must not contain '.' or '..' components");
            }
        }
    }
    if cleaned == Path::new("/") {
        bail!("'{path}' is the filesystem root");
    }
    Ok(cleaned)
}

/// Check whether `path` is `ancestor` or lies below it
pub fn is_within(path: &Path, ancestor: &Path) -> bool {
    path.starts_with(ancestor)
}

/// Map a declared absolute path under a target root
///
/// `rooted("/", "/fedora")` is `/fedora`; `rooted("/mnt/host", "/fedora")`
/// is `/mnt/host/fedora`.
pub fn rooted(root: &Path, path: &Path) -> PathBuf {
    match path.strip_prefix("/") {
        Ok(relative) => root.join(relative),
        Err(_) => root.join(path),
    }
}

/// Render a path for keys and messages
pub fn display(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

// ============================================================================
// Tests
// ============================================================================
