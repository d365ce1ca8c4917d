//! Directory resource

use anyhow::{Context, Result, bail};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceKey, ResourceState};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use super::{Attributes, Environment, WantedAttributes};
use crate::model::DirectoryDecl;
use crate::paths;

/// A directory with a fixed owner, group and mode
#[derive(Debug, Clone)]
pub struct Directory {
    decl: DirectoryDecl,
    deps: Vec<ResourceKey>,
    env: Environment,
}

#[derive(Debug)]
enum DirectoryState {
    Missing,
    NotADirectory,
    Drifted(Attributes, String),
    Correct,
}

impl Directory {
    pub fn new(decl: DirectoryDecl, deps: Vec<ResourceKey>, env: Environment) -> Self {
        Self { decl, deps, env }
    }

    fn target(&self) -> PathBuf {
        self.env.host.resolve(&self.decl.path)
    }

    fn wanted(&self) -> WantedAttributes<'_> {
        WantedAttributes {
            mode: self.decl.mode,
            user: &self.decl.owner,
            group: &self.decl.group,
        }
    }

    fn check_current(&self) -> Result<DirectoryState> {
        let target = self.target();
        let meta = match fs::symlink_metadata(&target) {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(DirectoryState::Missing);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to stat {}", target.display()));
            }
        };
        if !meta.is_dir() {
            return Ok(DirectoryState::NotADirectory);
        }

        let current = Attributes::read(self.env.host.as_ref(), &target)?;
        match self.wanted().mismatch(self.env.host.as_ref(), current) {
            None => Ok(DirectoryState::Correct),
            Some(from) => Ok(DirectoryState::Drifted(current, from)),
        }
    }
}

impl Resource for Directory {
    fn key(&self) -> ResourceKey {
        ResourceKey::directory(paths::display(&self.decl.path))
    }

    fn description(&self) -> String {
        format!(
            "Directory {} ({})",
            self.decl.path.display(),
            self.wanted().describe()
        )
    }

    fn dependencies(&self) -> Vec<ResourceKey> {
        self.deps.clone()
    }

    fn current_state(&self) -> Result<ResourceState> {
        match self.check_current()? {
            DirectoryState::Missing => Ok(ResourceState::Absent),
            DirectoryState::Correct => Ok(self.desired_state()),
            DirectoryState::NotADirectory => Ok(ResourceState::Modified {
                from: "not a directory".to_string(),
                to: self.wanted().describe(),
            }),
            DirectoryState::Drifted(_, from) => Ok(ResourceState::Modified {
                from,
                to: self.wanted().describe(),
            }),
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::Present {
            details: Some(self.wanted().describe()),
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
            DirectoryState::Correct => Ok(ApplyResult::NoChange),
            DirectoryState::NotADirectory => {
                bail!(
                    "{} exists and is not a directory; refusing to replace it",
                    target.display()
                )
            }
            DirectoryState::Missing => {
                fs::create_dir(&target).with_context(|| {
                    format!(
                        "Failed to create {} (its parent must already exist)",
                        target.display()
                    )
                })?;
                fs::set_permissions(&target, fs::Permissions::from_mode(self.decl.mode))?;
                let owner = host.lookup_ownership(&self.decl.owner, &self.decl.group)?;
                host.set_ownership(&target, owner)?;
                Ok(ApplyResult::Created)
            }
            DirectoryState::Drifted(current, _) => {
                self.wanted().enforce(host, &target, current)?;
                Ok(ApplyResult::Modified)
            }
        }
    }
}
