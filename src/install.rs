//! Software installers
//!
//! A deployment step hands an [`InstallRequest`] to an [`Installer`]. The
//! installer owns the mechanics of getting the artifact onto disk; the
//! deployment resource decides whether to call it at all and handles the
//! marker file and profile exports afterwards.

use anyhow::{Context, Result, bail};
use flate2::read::GzDecoder;
use std::fmt;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::host::{Host, Ownership};

/// One unpack of an artifact into a destination directory
#[derive(Debug, Clone)]
pub struct InstallRequest<'a> {
    /// Artifact file on the local machine
    pub artifact: &'a Path,
    /// Destination directory, already resolved under the host root
    pub destination: &'a Path,
    /// Owner applied to every unpacked path
    pub owner: Ownership,
    /// Top-level `webapps/` entries to remove after unpacking
    pub excluded_webapps: &'a [String],
}

/// Installs an artifact into its destination
pub trait Installer: Send + Sync + fmt::Debug {
    fn install(&self, host: &dyn Host, request: &InstallRequest<'_>) -> Result<()>;
}

/// Unpacks `.tar.gz`, `.tgz` or plain `.tar` archives
///
/// The single leading directory of the archive (`jdk1.7.0_51/`,
/// `apache-tomcat-7.0.50/`) is stripped, so the archive's contents land
/// directly in the destination. Unpacking happens in a sibling staging
/// directory that replaces the destination only once it is complete.
#[derive(Debug, Clone, Copy, Default)]
pub struct TarballInstaller;

impl TarballInstaller {
    fn open(artifact: &Path) -> Result<tar::Archive<Box<dyn Read>>> {
        let file = File::open(artifact)
            .with_context(|| format!("Source artifact not found: {}", artifact.display()))?;

        let name = artifact.to_string_lossy();
        let reader: Box<dyn Read> = if name.ends_with(".gz") || name.ends_with(".tgz") {
            Box::new(GzDecoder::new(file))
        } else if name.ends_with(".tar") {
            Box::new(file)
        } else {
            bail!("Unsupported artifact format: {}", artifact.display());
        };

        let mut archive = tar::Archive::new(reader);
        archive.set_preserve_permissions(true);
        Ok(archive)
    }

    fn unpack(artifact: &Path, staging: &Path) -> Result<usize> {
        let mut archive = Self::open(artifact)?;
        let mut count = 0;

        for entry in archive
            .entries()
            .with_context(|| format!("Failed to read {}", artifact.display()))?
        {
            let mut entry = entry.context("Corrupt archive entry")?;
            if matches!(
                entry.header().entry_type(),
                tar::EntryType::XGlobalHeader | tar::EntryType::XHeader
            ) {
                continue;
            }

            let path = entry.path().context("Archive entry has no path")?.into_owned();
            let Some(relative) = strip_leading(&path)? else {
                continue;
            };

            let target = staging.join(&relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            entry
                .unpack(&target)
                .with_context(|| format!("Failed to unpack {}", relative.display()))?;
            count += 1;
        }

        Ok(count)
    }
}

impl Installer for TarballInstaller {
    fn install(&self, host: &dyn Host, request: &InstallRequest<'_>) -> Result<()> {
        let destination = request.destination;
        let name = destination
            .file_name()
            .with_context(|| format!("Invalid destination: {}", destination.display()))?;
        let parent = destination
            .parent()
            .with_context(|| format!("Invalid destination: {}", destination.display()))?;
        if !parent.is_dir() {
            bail!(
                "Parent of {} does not exist (expected a directory at {})",
                destination.display(),
                parent.display()
            );
        }

        let staging = parent.join(format!(".{}.partial", name.to_string_lossy()));
        if staging.exists() {
            fs::remove_dir_all(&staging)
                .with_context(|| format!("Failed to clear {}", staging.display()))?;
        }
        fs::create_dir(&staging)
            .with_context(|| format!("Failed to create {}", staging.display()))?;

        let count = Self::unpack(request.artifact, &staging)?;
        log::info!(
            "Unpacked {count} entries from {} into {}",
            request.artifact.display(),
            destination.display()
        );

        for webapp in request.excluded_webapps {
            let path = staging.join("webapps").join(webapp);
            if path.exists() {
                fs::remove_dir_all(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                log::debug!("Removed bundled webapp {webapp}");
            }
        }

        if destination.exists() {
            fs::remove_dir_all(destination).with_context(|| {
                format!("Failed to remove previous {}", destination.display())
            })?;
        }
        fs::rename(&staging, destination)
            .with_context(|| format!("Failed to move staging into {}", destination.display()))?;

        for entry in WalkDir::new(destination) {
            let entry = entry.context("Failed to walk unpacked tree")?;
            host.set_ownership(entry.path(), request.owner)?;
        }

        Ok(())
    }
}

/// Drop the archive's top-level directory and reject escaping paths
///
/// Returns `None` for the top-level directory entry itself.
fn strip_leading(path: &Path) -> Result<Option<PathBuf>> {
    let mut normal = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => normal.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                bail!("Archive entry escapes the destination: {}", path.display());
            }
        }
    }

    if normal.len() < 2 {
        return Ok(None);
    }
    Ok(Some(normal[1..].iter().collect()))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    /// Write a gzipped tarball whose entries all sit under `top/`
    pub(crate) fn write_tarball(path: &Path, top: &str, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::fast()));
        for (name, body) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(body.len() as u64);
            header.set_mode(0o755);
            header.set_cksum();
            builder
                .append_data(&mut header, format!("{top}/{name}"), body.as_bytes())
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_strip_leading() {
        assert_eq!(
            strip_leading(Path::new("jdk1.7.0_51/bin/java")).unwrap(),
            Some(PathBuf::from("bin/java"))
        );
        assert_eq!(
            strip_leading(Path::new("./jdk1.7.0_51/bin")).unwrap(),
            Some(PathBuf::from("bin"))
        );
        assert_eq!(strip_leading(Path::new("jdk1.7.0_51/")).unwrap(), None);
        assert!(strip_leading(Path::new("jdk/../../etc/passwd")).is_err());
    }

    #[test]
    fn test_install_strips_and_excludes() {
        let dir = tempfile::tempdir().unwrap();
        let artifact = dir.path().join("apache-tomcat-7.0.50.tar.gz");
        write_tarball(
            &artifact,
            "apache-tomcat-7.0.50",
            &[
                ("bin/catalina.sh", "#!/bin/sh\n"),
                ("conf/server.xml", "<Server/>\n"),
                ("webapps/ROOT/index.jsp", "root\n"),
                ("webapps/docs/index.html", "docs\n"),
                ("webapps/sample/index.html", "kept\n"),
            ],
        );

        let root = dir.path().join("root");
        fs::create_dir_all(root.join("fedora")).unwrap();
        let host = MemoryHost::new(&root);
        let destination = root.join("fedora/tomcat7");
        let excluded = vec!["ROOT".to_string(), "docs".to_string()];

        TarballInstaller
            .install(
                &host,
                &InstallRequest {
                    artifact: &artifact,
                    destination: &destination,
                    owner: Ownership { uid: 1000, gid: 1000 },
                    excluded_webapps: &excluded,
                },
            )
            .unwrap();

        assert!(destination.join("bin/catalina.sh").is_file());
        assert!(destination.join("webapps/sample/index.html").is_file());
        assert!(!destination.join("webapps/ROOT").exists());
        assert!(!destination.join("webapps/docs").exists());
        assert!(!root.join("fedora/.tomcat7.partial").exists());
        assert_eq!(
            host.ownership(&destination.join("conf/server.xml")).unwrap(),
            Ownership { uid: 1000, gid: 1000 }
        );
    }

    #[test]
    fn test_install_replaces_previous_tree() {
        let dir = tempfile::tempdir().unwrap();
        let host = MemoryHost::new(dir.path());
        let destination = dir.path().join("java7");
        fs::create_dir_all(destination.join("stale")).unwrap();

        let artifact = dir.path().join("jdk.tar.gz");
        write_tarball(&artifact, "jdk1.7.0_51", &[("bin/java", "java\n")]);

        TarballInstaller
            .install(
                &host,
                &InstallRequest {
                    artifact: &artifact,
                    destination: &destination,
                    owner: Ownership { uid: 0, gid: 0 },
                    excluded_webapps: &[],
                },
            )
            .unwrap();

        assert!(destination.join("bin/java").is_file());
        assert!(!destination.join("stale").exists());
    }

    #[test]
    fn test_missing_parent_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let host = MemoryHost::new(dir.path());
        let artifact = dir.path().join("jdk.tar.gz");
        write_tarball(&artifact, "jdk", &[("bin/java", "java\n")]);

        let err = TarballInstaller
            .install(
                &host,
                &InstallRequest {
                    artifact: &artifact,
                    destination: &dir.path().join("missing/java7"),
                    owner: Ownership { uid: 0, gid: 0 },
                    excluded_webapps: &[],
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_missing_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let host = MemoryHost::new(dir.path());
        let err = TarballInstaller
            .install(
                &host,
                &InstallRequest {
                    artifact: &dir.path().join("nope.tar.gz"),
                    destination: &dir.path().join("java7"),
                    owner: Ownership { uid: 0, gid: 0 },
                    excluded_webapps: &[],
                },
            )
            .unwrap_err();
        assert!(err.to_string().contains("Source artifact not found"));
    }
}
