//! Software deployment resource
//!
//! A deployment unpacks a source artifact into its destination through an
//! [`Installer`](crate::install::Installer), records what was installed in a
//! marker file inside the destination, and appends its environment exports
//! to a profile file. The installer runs only when the destination is
//! absent or its marker names a different artifact. A destination that
//! exists without a marker was not created here; it counts as deployed and
//! is never replaced.

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceKey, ResourceState};
use std::fs;
use std::path::{Path, PathBuf};

use super::Environment;
use crate::install::InstallRequest;
use crate::model::{DeploymentDecl, Export};

/// Marker file written into every deployment destination
pub const MARKER_FILE: &str = ".fcrepo-provision";

/// A versioned artifact unpacked into a destination directory
#[derive(Debug, Clone)]
pub struct Deployment {
    decl: DeploymentDecl,
    deps: Vec<ResourceKey>,
    env: Environment,
}

#[derive(Debug, PartialEq, Eq)]
enum InstallState {
    Missing,
    /// Destination exists without a marker; left untouched
    Unmarked,
    /// Marker names a different artifact
    Outdated(String),
    Installed,
}

impl Deployment {
    pub fn new(decl: DeploymentDecl, deps: Vec<ResourceKey>, env: Environment) -> Self {
        Self { decl, deps, env }
    }

    fn destination(&self) -> PathBuf {
        self.env.host.resolve(&self.decl.destination)
    }

    fn marker(&self) -> PathBuf {
        self.destination().join(MARKER_FILE)
    }

    fn describe_desired(&self) -> String {
        format!(
            "{} at {}",
            self.decl.source,
            self.decl.destination.display()
        )
    }

    fn check_install(&self) -> Result<InstallState> {
        let destination = self.destination();
        if !destination.exists() {
            return Ok(InstallState::Missing);
        }
        if !destination.is_dir() {
            bail!("{} exists and is not a directory", destination.display());
        }

        let marker = self.marker();
        match fs::read_to_string(&marker) {
            Ok(content) if content.trim() == self.decl.source => Ok(InstallState::Installed),
            Ok(content) => Ok(InstallState::Outdated(content.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(InstallState::Unmarked),
            Err(e) => Err(e).with_context(|| format!("Failed to read {}", marker.display())),
        }
    }

    /// Profile content with every export in place, or `None` when it already is
    fn updated_profile(&self) -> Result<Option<String>> {
        let Some(profile) = &self.decl.profile else {
            return Ok(None);
        };
        let path = self.env.host.resolve(profile);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()));
            }
        };
        Ok(merge_exports(&content, &self.decl.exports))
    }

    fn install(&self) -> Result<()> {
        let host = self.env.host.as_ref();
        let artifact = self.env.artifact(&self.decl.source);
        let destination = self.destination();
        let owner = host.lookup_ownership(&self.decl.user, &self.decl.group)?;

        log::info!(
            "Deploying {} into {}",
            self.decl.source,
            self.decl.destination.display()
        );
        self.env.installer.install(
            host,
            &InstallRequest {
                artifact: &artifact,
                destination: &destination,
                owner,
                excluded_webapps: &self.decl.excluded_webapps,
            },
        )?;

        let marker = self.marker();
        fs::write(&marker, format!("{}\n", self.decl.source))
            .with_context(|| format!("Failed to write {}", marker.display()))?;
        host.set_ownership(&marker, owner)?;
        Ok(())
    }

    fn write_profile(&self, profile: &Path, content: &str) -> Result<()> {
        let path = self.env.host.resolve(profile);
        if !path.is_file() {
            bail!("Profile file {} does not exist", path.display());
        }
        fs::write(&path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("Updated exports in {}", profile.display());
        Ok(())
    }
}

/// Bring `content` up to date with `exports`
///
/// A line already present is kept. A stale `export NAME=...` line is
/// rewritten in place unless the export is cumulative; anything else is
/// appended. Returns `None` when nothing changes.
fn merge_exports(content: &str, exports: &[Export]) -> Option<String> {
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut changed = false;

    for export in exports {
        let line = export.line();
        if lines.iter().any(|l| l.trim() == line) {
            continue;
        }
        let prefix = format!("export {}=", export.name);
        let stale = if export.is_cumulative() {
            None
        } else {
            lines.iter().position(|l| l.trim_start().starts_with(&prefix))
        };
        match stale {
            Some(index) => lines[index] = line,
            None => lines.push(line),
        }
        changed = true;
    }

    changed.then(|| {
        let mut out = lines.join("\n");
        out.push('\n');
        out
    })
}

impl Resource for Deployment {
    fn key(&self) -> ResourceKey {
        ResourceKey::deployment(&self.decl.name)
    }

    fn description(&self) -> String {
        if self.decl.excluded_webapps.is_empty() {
            format!("Deploy {}", self.describe_desired())
        } else {
            format!(
                "Deploy {} without webapps {}",
                self.describe_desired(),
                self.decl.excluded_webapps.join(", ")
            )
        }
    }

    fn dependencies(&self) -> Vec<ResourceKey> {
        self.deps.clone()
    }

    fn current_state(&self) -> Result<ResourceState> {
        let to = self.describe_desired();
        match self.check_install()? {
            InstallState::Missing => Ok(ResourceState::Absent),
            InstallState::Outdated(previous) => Ok(ResourceState::Modified {
                from: format!("{previous} installed"),
                to,
            }),
            InstallState::Installed | InstallState::Unmarked => {
                if self.updated_profile()?.is_some() {
                    Ok(ResourceState::Modified {
                        from: "profile exports out of date".to_string(),
                        to,
                    })
                } else {
                    Ok(self.desired_state())
                }
            }
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::Present {
            details: Some(self.describe_desired()),
        }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        let state = self.check_install()?;
        let mut result = match state {
            InstallState::Installed => ApplyResult::NoChange,
            InstallState::Unmarked => {
                log::warn!(
                    "{} already exists without a {MARKER_FILE} marker; leaving it in place",
                    self.decl.destination.display()
                );
                ApplyResult::NoChange
            }
            InstallState::Missing => {
                self.install()?;
                ApplyResult::Created
            }
            InstallState::Outdated(_) => {
                self.install()?;
                ApplyResult::Modified
            }
        };

        if let Some(profile) = &self.decl.profile
            && let Some(content) = self.updated_profile()?
        {
            self.write_profile(profile, &content)?;
            if result == ApplyResult::NoChange {
                result = ApplyResult::Modified;
            }
        }

        Ok(result)
    }
}
