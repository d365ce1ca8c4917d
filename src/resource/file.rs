//! File resource: a path with owner, mode and (usually) managed content

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, Bindings, Resource, ResourceKey, ResourceState};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use super::{Attributes, Environment, WantedAttributes};
use crate::model::{FileDecl, FileSource};
use crate::paths;

/// Hex digits of the content digest shown in states
const DIGEST_LEN: usize = 12;

/// A file whose bytes come from an artifact or a rendered template
#[derive(Debug, Clone)]
pub struct FileContent {
    decl: FileDecl,
    deps: Vec<ResourceKey>,
    bindings: Bindings,
    env: Environment,
}

#[derive(Debug)]
enum FileState {
    Missing,
    NotAFile,
    Present {
        attributes: Attributes,
        /// Digest of the current bytes, when the content is managed
        digest: Option<String>,
    },
}

impl FileContent {
    pub fn new(decl: FileDecl, deps: Vec<ResourceKey>, bindings: Bindings, env: Environment) -> Self {
        Self {
            decl,
            deps,
            bindings,
            env,
        }
    }

    pub fn target(&self) -> PathBuf {
        self.env.host.resolve(&self.decl.path)
    }

    fn wanted(&self) -> WantedAttributes<'_> {
        WantedAttributes {
            mode: self.decl.mode,
            user: &self.decl.owner,
            group: &self.decl.group,
        }
    }

    fn is_managed(&self) -> bool {
        !matches!(self.decl.source, FileSource::Unmanaged)
    }

    /// The bytes this file should contain; `None` when content is unmanaged
    pub fn content(&self) -> Result<Option<Vec<u8>>> {
        match self.decl.source {
            FileSource::Unmanaged => Ok(None),
            FileSource::Artifact(name) => {
                let path = self.env.artifact(name);
                let bytes = fs::read(&path)
                    .with_context(|| format!("Source artifact not found: {}", path.display()))?;
                Ok(Some(bytes))
            }
            FileSource::Template(id) => {
                let rendered = id.template().render(&self.bindings)?;
                Ok(Some(rendered.into_bytes()))
            }
        }
    }

    fn desired_details(&self) -> String {
        let attributes = self.wanted().describe();
        match self.content() {
            Ok(Some(bytes)) => format!("{attributes} blake3:{}", digest(&bytes)),
            Ok(None) => attributes,
            Err(e) => format!("{attributes} (content unavailable: {e})"),
        }
    }

    fn check_current(&self) -> Result<FileState> {
        let target = self.target();
        let meta = match fs::symlink_metadata(&target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(FileState::Missing),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", target.display()));
            }
        };
        if !meta.is_file() {
            return Ok(FileState::NotAFile);
        }

        let attributes = Attributes::read(self.env.host.as_ref(), &target)?;
        let digest = if self.is_managed() {
            let bytes =
                fs::read(&target).with_context(|| format!("Failed to read {}", target.display()))?;
            Some(digest(&bytes))
        } else {
            None
        };
        Ok(FileState::Present { attributes, digest })
    }

    /// Replace the file's bytes through a sibling temporary file
    fn write_atomic(&self, target: &Path, bytes: &[u8]) -> Result<()> {
        let parent = target
            .parent()
            .with_context(|| format!("Invalid path: {}", target.display()))?;
        if !parent.is_dir() {
            bail!(
                "Parent directory {} of {} does not exist",
                parent.display(),
                target.display()
            );
        }

        let name = target.file_name().unwrap_or_default().to_string_lossy();
        let staging = parent.join(format!(".{name}.tmp"));
        fs::write(&staging, bytes)
            .with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::set_permissions(&staging, fs::Permissions::from_mode(self.decl.mode))?;
        fs::rename(&staging, target)
            .with_context(|| format!("Failed to move {} into place", target.display()))?;
        Ok(())
    }
}

impl Resource for FileContent {
    fn key(&self) -> ResourceKey {
        ResourceKey::file(paths::display(&self.decl.path))
    }

    fn description(&self) -> String {
        let source = match self.decl.source {
            FileSource::Artifact(name) => format!("from {name}"),
            FileSource::Template(id) => format!("rendered from {id}"),
            FileSource::Unmanaged => "content unmanaged".to_string(),
        };
        format!(
            "File {} ({}, {source})",
            self.decl.path.display(),
            self.wanted().describe()
        )
    }

    fn dependencies(&self) -> Vec<ResourceKey> {
        self.deps.clone()
    }

    fn current_state(&self) -> Result<ResourceState> {
        match self.check_current()? {
            FileState::Missing => Ok(ResourceState::Absent),
            FileState::NotAFile => Ok(ResourceState::Modified {
                from: "not a regular file".to_string(),
                to: self.desired_details(),
            }),
            FileState::Present { attributes, digest } => {
                let desired = self.desired_details();
                let wanted_digest = self.content()?.map(|bytes| self::digest(&bytes));
                let attributes_drift = self.wanted().mismatch(self.env.host.as_ref(), attributes);

                if attributes_drift.is_none() && digest == wanted_digest {
                    return Ok(self.desired_state());
                }

                let mut from = attributes_drift.unwrap_or_else(|| self.wanted().describe());
                if let Some(digest) = digest {
                    from = format!("{from} blake3:{digest}");
                }
                Ok(ResourceState::Modified { from, to: desired })
            }
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::Present {
            details: Some(self.desired_details()),
        }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        let target = self.target();
        let host = self.env.host.as_ref();
        match self.check_current()? {
            FileState::NotAFile => {
                bail!(
                    "{} exists and is not a regular file; refusing to replace it",
                    target.display()
                )
            }
            FileState::Missing => {
                let bytes = self.content()?.unwrap_or_default();
                self.write_atomic(&target, &bytes)?;
                let owner = host.lookup_ownership(&self.decl.owner, &self.decl.group)?;
                host.set_ownership(&target, owner)?;
                Ok(ApplyResult::Created)
            }
            FileState::Present { digest, .. } => {
                let mut changed = false;
                if let Some(bytes) = self.content()?
                    && digest.as_deref() != Some(self::digest(&bytes).as_str())
                {
                    log::info!("Rewriting {}", self.decl.path.display());
                    self.write_atomic(&target, &bytes)?;
                    changed = true;
                }

                let current = Attributes::read(host, &target)?;
                changed |= self.wanted().enforce(host, &target, current)?;

                Ok(if changed {
                    ApplyResult::Modified
                } else {
                    ApplyResult::NoChange
                })
            }
        }
    }
}

fn digest(bytes: &[u8]) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex.as_str()[..DIGEST_LEN].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::memory::MemoryHost;
    use crate::host::{Host, UserSpec};
    use crate::install::TarballInstaller;
    use crate::templates::TemplateId;
    use std::sync::Arc;

    struct Fixture {
        dir: tempfile::TempDir,
        host: Arc<MemoryHost>,
        env: Environment,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("fedora/config")).unwrap();
        let artifacts = dir.path().join("artifacts");
        fs::create_dir_all(&artifacts).unwrap();
        fs::write(artifacts.join("fcrepo.war"), b"war-bytes").unwrap();

        let host = Arc::new(MemoryHost::new(&root));
        host.create_group("fcrepo").unwrap();
        host.create_user(&UserSpec {
            name: "fcrepo".to_string(),
            group: "fcrepo".to_string(),
            shell: "/bin/bash".to_string(),
            home: PathBuf::from("/home/fcrepo"),
            manage_home: false,
        })
        .unwrap();
        let env = Environment::new(host.clone(), Arc::new(TarballInstaller), artifacts);
        Fixture { dir, host, env }
    }

    fn file(fixture: &Fixture, path: &str, mode: u32, source: FileSource) -> FileContent {
        let bindings = Bindings::builder()
            .bind("hostname", "FedoraTestNode")
            .build();
        FileContent::new(
            FileDecl {
                path: PathBuf::from(path),
                owner: "fcrepo".to_string(),
                group: "fcrepo".to_string(),
                mode,
                source,
            },
            Vec::new(),
            bindings,
            fixture.env.clone(),
        )
    }

    #[test]
    fn test_rendered_file_converges_once() {
        let fixture = fixture();
        let resource = file(
            &fixture,
            "/fedora/config/jgroups-fcrepo-tcp.xml",
            0o644,
            FileSource::Template(TemplateId::JgroupsTcp),
        );
        let mut ctx = ApplyContext::new(false, false);

        assert_eq!(resource.apply(&mut ctx).unwrap(), ApplyResult::Created);
        let written = fs::read_to_string(resource.target()).unwrap();
        assert!(written.contains("FedoraTestNode"));

        let mutations = fixture.host.mutations();
        assert_eq!(resource.current_state().unwrap(), resource.desired_state());
        assert_eq!(resource.apply(&mut ctx).unwrap(), ApplyResult::NoChange);
        assert_eq!(fixture.host.mutations(), mutations);
    }

    #[test]
    fn test_changed_content_is_rewritten() {
        let fixture = fixture();
        let resource = file(
            &fixture,
            "/fedora/config/fcrepo.war",
            0o644,
            FileSource::Artifact("fcrepo.war"),
        );
        let mut ctx = ApplyContext::new(false, false);
        resource.apply(&mut ctx).unwrap();

        fs::write(resource.target(), "tampered").unwrap();
        assert!(matches!(
            resource.current_state().unwrap(),
            ResourceState::Modified { .. }
        ));
        assert_eq!(resource.apply(&mut ctx).unwrap(), ApplyResult::Modified);
        assert_eq!(fs::read(resource.target()).unwrap(), b"war-bytes");
    }

    #[test]
    fn test_mode_drift_fixed_without_rewrite() {
        let fixture = fixture();
        let resource = file(
            &fixture,
            "/fedora/config/server.xml",
            0o600,
            FileSource::Template(TemplateId::JgroupsTcp),
        );
        let mut ctx = ApplyContext::new(false, false);
        resource.apply(&mut ctx).unwrap();
        fs::set_permissions(resource.target(), fs::Permissions::from_mode(0o644)).unwrap();

        assert_eq!(resource.apply(&mut ctx).unwrap(), ApplyResult::Modified);
        let mode = fs::metadata(resource.target()).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_unmanaged_content_is_left_alone() {
        let fixture = fixture();
        let target = fixture.dir.path().join("root/fedora/config/profile");
        fs::write(&target, "export EDITOR=vi\n").unwrap();
        fs::set_permissions(&target, fs::Permissions::from_mode(0o644)).unwrap();
        let owner = fixture.host.lookup_ownership("fcrepo", "fcrepo").unwrap();
        fixture.host.set_ownership(&target, owner).unwrap();

        let resource = file(&fixture, "/fedora/config/profile", 0o644, FileSource::Unmanaged);
        assert_eq!(resource.current_state().unwrap(), resource.desired_state());
        assert_eq!(
            resource.apply(&mut ApplyContext::new(false, false)).unwrap(),
            ApplyResult::NoChange
        );
        assert_eq!(fs::read_to_string(&target).unwrap(), "export EDITOR=vi\n");
    }

    #[test]
    fn test_missing_parent_is_an_error() {
        let fixture = fixture();
        let resource = file(
            &fixture,
            "/fedora/tomcat7/conf/server.xml",
            0o600,
            FileSource::Template(TemplateId::JgroupsTcp),
        );
        let err = resource
            .apply(&mut ApplyContext::new(false, false))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_missing_artifact_shows_in_desired_state() {
        let fixture = fixture();
        let resource = file(
            &fixture,
            "/fedora/config/other.war",
            0o644,
            FileSource::Artifact("other.war"),
        );
        let ResourceState::Present { details: Some(details) } = resource.desired_state() else {
            panic!("expected present");
        };
        assert!(details.contains("content unavailable"));
        assert!(resource.apply(&mut ApplyContext::new(false, false)).is_err());
    }
}
