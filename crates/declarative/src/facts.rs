//! Host facts
//!
//! Facts are read once, at evaluation time, and passed by value to
//! whatever needs them. There is no caching: a convergence run is a
//! single pass.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::ffi::CStr;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment facts the engine cannot compute itself
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Facts {
    /// Short host name
    pub hostname: String,
    /// OS family, e.g. "RedHat" or "Debian"
    pub os_family: String,
}

/// Read-only accessor for host facts
pub trait FactProvider {
    /// Host name of the target machine
    fn hostname(&self) -> Result<String>;

    /// OS family of the target machine
    fn os_family(&self) -> Result<String>;

    /// Gather all facts at once
    fn gather(&self) -> Result<Facts> {
        Ok(Facts {
            hostname: self.hostname()?,
            os_family: self.os_family()?,
        })
    }
}

/// Facts supplied by the caller
#[derive(Debug, Clone)]
pub struct StaticFacts(pub Facts);

impl StaticFacts {
    pub fn new(hostname: impl Into<String>, os_family: impl Into<String>) -> Self {
        Self(Facts {
            hostname: hostname.into(),
            os_family: os_family.into(),
        })
    }
}

impl FactProvider for StaticFacts {
    fn hostname(&self) -> Result<String> {
        Ok(self.0.hostname.clone())
    }

    fn os_family(&self) -> Result<String> {
        Ok(self.0.os_family.clone())
    }
}

/// Facts read from the running system
///
/// `root` locates `etc/os-release`, so facts can be read for a host tree
/// mounted somewhere other than `/`.
#[derive(Debug, Clone)]
pub struct SystemFacts {
    root: PathBuf,
}

impl SystemFacts {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }
}

impl Default for SystemFacts {
    fn default() -> Self {
        Self::new("/")
    }
}

impl FactProvider for SystemFacts {
    fn hostname(&self) -> Result<String> {
        let mut buf = [0u8; 256];
        // SAFETY: buf is valid for buf.len() bytes and gethostname
        // NUL-terminates on success for names shorter than the buffer.
        let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
        if rc != 0 {
            return Err(std::io::Error::last_os_error()).context("gethostname failed");
        }
        let name = CStr::from_bytes_until_nul(&buf)
            .context("Host name is not NUL-terminated")?
            .to_string_lossy()
            .into_owned();

        // Short name, as configuration management tools report it
        Ok(name.split('.').next().unwrap_or_default().to_string())
    }

    fn os_family(&self) -> Result<String> {
        let path = self.root.join("etc/os-release");
        match fs::read_to_string(&path) {
            Ok(content) => Ok(os_family_from_release(&content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!(
                    "{} not found, reporting OS family as {}",
                    path.display(),
                    std::env::consts::OS
                );
                Ok(std::env::consts::OS.to_string())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
        }
    }
}

/// Map an os-release file to an OS family name
fn os_family_from_release(content: &str) -> String {
    let mut ids: Vec<String> = Vec::new();
    for line in content.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        if key == "ID" || key == "ID_LIKE" {
            let value = value.trim_matches('"').to_lowercase();
            ids.extend(value.split_whitespace().map(ToString::to_string));
        }
    }

    for id in &ids {
        let family = match id.as_str() {
            "rhel" | "fedora" | "centos" | "rocky" | "almalinux" | "amzn" => "RedHat",
            "debian" | "ubuntu" => "Debian",
            "suse" | "opensuse" | "sles" => "Suse",
            "arch" => "Archlinux",
            "alpine" => "Alpine",
            _ => continue,
        };
        return family.to_string();
    }

    ids.first().cloned().unwrap_or_else(|| "Linux".to_string())
}
