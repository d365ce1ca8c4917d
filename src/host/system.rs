//! The real machine
//!
//! Identity lookups parse `etc/passwd` and `etc/group` under the target
//! root. Mutations run the shadow-utils tools, passing `--prefix` when the
//! root is not `/` so the files under that root are edited instead.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use super::{GroupEntry, Host, Ownership, UserEntry, UserSpec};
use crate::runner;

#[derive(Debug, Clone)]
pub struct SystemHost {
    root: PathBuf,
}

impl SystemHost {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn is_system_root(&self) -> bool {
        self.root == Path::new("/")
    }

    fn read_db(&self, name: &str) -> Result<String> {
        let path = self.root.join("etc").join(name);
        match fs::read_to_string(&path) {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }

    /// Arguments shared by every shadow-utils invocation
    fn base_args(&self) -> Vec<OsString> {
        if self.is_system_root() {
            Vec::new()
        } else {
            vec!["--prefix".into(), self.root.clone().into_os_string()]
        }
    }

    fn user_args(&self, spec: &UserSpec) -> Vec<OsString> {
        let mut args = self.base_args();
        args.push("-g".into());
        args.push(spec.group.clone().into());
        args.push("-s".into());
        args.push(spec.shell.clone().into());
        args.push("-d".into());
        args.push(spec.home.clone().into_os_string());
        args
    }
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new("/")
    }
}

impl Host for SystemHost {
    fn root(&self) -> &Path {
        &self.root
    }

    fn group(&self, name: &str) -> Result<Option<GroupEntry>> {
        Ok(parse_group(&self.read_db("group")?, name))
    }

    fn user(&self, name: &str) -> Result<Option<UserEntry>> {
        Ok(parse_passwd(&self.read_db("passwd")?, name))
    }

    fn create_group(&self, name: &str) -> Result<()> {
        let mut args = self.base_args();
        args.push(name.into());
        runner::run_capture("groupadd", args.as_slice())?;
        Ok(())
    }

    fn create_user(&self, spec: &UserSpec) -> Result<()> {
        let mut args = self.user_args(spec);
        if spec.manage_home {
            args.push("-m".into());
        }
        args.push(spec.name.clone().into());
        runner::run_capture("useradd", args.as_slice())?;
        Ok(())
    }

    fn modify_user(&self, spec: &UserSpec) -> Result<()> {
        let mut args = self.user_args(spec);
        args.push(spec.name.clone().into());
        runner::run_capture("usermod", args.as_slice())?;
        Ok(())
    }

    fn ownership(&self, path: &Path) -> Result<Ownership> {
        let meta = fs::symlink_metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(Ownership {
            uid: meta.uid(),
            gid: meta.gid(),
        })
    }

    fn set_ownership(&self, path: &Path, owner: Ownership) -> Result<()> {
        std::os::unix::fs::lchown(path, Some(owner.uid), Some(owner.gid))
            .with_context(|| format!("Failed to chown {} to {owner}", path.display()))
    }
}

fn parse_group(content: &str, name: &str) -> Option<GroupEntry> {
    content.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 3 || fields[0] != name {
            return None;
        }
        Some(GroupEntry {
            name: fields[0].to_string(),
            gid: fields[2].parse().ok()?,
        })
    })
}

fn parse_passwd(content: &str, name: &str) -> Option<UserEntry> {
    content.lines().find_map(|line| {
        let fields: Vec<&str> = line.split(':').collect();
        if fields.len() < 7 || fields[0] != name {
            return None;
        }
        Some(UserEntry {
            name: fields[0].to_string(),
            uid: fields[2].parse().ok()?,
            gid: fields[3].parse().ok()?,
            home: PathBuf::from(fields[5]),
            shell: fields[6].to_string(),
        })
    })
}
