//! Host access: path rooting, the identity database, and file ownership
//!
//! Resources never touch `/etc/passwd`, `useradd` or `chown` directly; they
//! go through a [`Host`]. [`SystemHost`] works on a real machine (or a host
//! tree mounted under another root), and tests use an in-memory host that
//! counts every mutation.

use anyhow::Result;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::paths;

pub mod system;

#[cfg(test)]
pub mod memory;

pub use system::SystemHost;

/// A group in the identity database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntry {
    pub name: String,
    pub gid: u32,
}

/// An account in the identity database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
    pub home: PathBuf,
    pub shell: String,
}

/// Desired account attributes for create and modify
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserSpec {
    pub name: String,
    /// Primary group name
    pub group: String,
    pub shell: String,
    pub home: PathBuf,
    pub manage_home: bool,
}

/// Numeric owner of a path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl fmt::Display for Ownership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.uid, self.gid)
    }
}

/// The machine being converged
pub trait Host: Send + Sync + fmt::Debug {
    /// Filesystem root declared paths live under
    fn root(&self) -> &Path;

    /// Map a declared absolute path to the path on this machine
    fn resolve(&self, path: &Path) -> PathBuf {
        paths::rooted(self.root(), path)
    }

    fn group(&self, name: &str) -> Result<Option<GroupEntry>>;

    fn user(&self, name: &str) -> Result<Option<UserEntry>>;

    fn create_group(&self, name: &str) -> Result<()>;

    /// Create an account; with `manage_home` the home directory is created too
    fn create_user(&self, spec: &UserSpec) -> Result<()>;

    /// Bring an existing account's group, shell and home in line with `spec`
    fn modify_user(&self, spec: &UserSpec) -> Result<()>;

    /// Owner of an already-resolved path
    fn ownership(&self, path: &Path) -> Result<Ownership>;

    /// Change the owner of an already-resolved path
    fn set_ownership(&self, path: &Path, owner: Ownership) -> Result<()>;

    /// Numeric ownership for a user and group name pair
    ///
    /// Fails when either name is unknown to the identity database.
    fn lookup_ownership(&self, user: &str, group: &str) -> Result<Ownership> {
        let uid = self
            .user(user)?
            .map(|u| u.uid)
            .ok_or_else(|| anyhow::anyhow!("user '{user}' does not exist"))?;
        let gid = self
            .group(group)?
            .map(|g| g.gid)
            .ok_or_else(|| anyhow::anyhow!("group '{group}' does not exist"))?;
        Ok(Ownership { uid, gid })
    }
}
