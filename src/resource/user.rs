//! User resource

use anyhow::{Context, Result};
use declarative::{ApplyContext, ApplyResult, Resource, ResourceKey, ResourceState};

use super::Environment;
use crate::host::{UserEntry, UserSpec};
use crate::model::UserDecl;

/// An account with a primary group, shell and home directory
#[derive(Debug, Clone)]
pub struct User {
    decl: UserDecl,
    deps: Vec<ResourceKey>,
    env: Environment,
}

impl User {
    pub fn new(decl: UserDecl, deps: Vec<ResourceKey>, env: Environment) -> Self {
        Self { decl, deps, env }
    }

    fn spec(&self) -> UserSpec {
        UserSpec {
            name: self.decl.name.clone(),
            group: self.decl.group.clone(),
            shell: self.decl.shell.clone(),
            home: self.decl.home.clone(),
            manage_home: self.decl.manage_home,
        }
    }

    fn describe_desired(&self) -> String {
        format!(
            "group={} shell={} home={}",
            self.decl.group,
            self.decl.shell,
            self.decl.home.display()
        )
    }

    /// Describe how `entry` differs from the declaration, if it does
    fn mismatch(&self, entry: &UserEntry) -> Result<Option<String>> {
        let group_ok = self
            .env
            .host
            .group(&self.decl.group)?
            .is_some_and(|g| g.gid == entry.gid);

        if group_ok && entry.shell == self.decl.shell && entry.home == self.decl.home {
            Ok(None)
        } else {
            Ok(Some(format!(
                "gid={} shell={} home={}",
                entry.gid,
                entry.shell,
                entry.home.display()
            )))
        }
    }
}

impl Resource for User {
    fn key(&self) -> ResourceKey {
        ResourceKey::user(&self.decl.name)
    }

    fn description(&self) -> String {
        format!("User {} ({})", self.decl.name, self.describe_desired())
    }

    fn dependencies(&self) -> Vec<ResourceKey> {
        self.deps.clone()
    }

    fn current_state(&self) -> Result<ResourceState> {
        let Some(entry) = self.env.host.user(&self.decl.name)? else {
            return Ok(ResourceState::Absent);
        };
        match self.mismatch(&entry)? {
            None => Ok(self.desired_state()),
            Some(from) => Ok(ResourceState::Modified {
                from,
                to: self.describe_desired(),
            }),
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

        match self.env.host.user(&self.decl.name)? {
            None => {
                self.env
                    .host
                    .create_user(&self.spec())
                    .with_context(|| format!("Failed to create user {}", self.decl.name))?;
                Ok(ApplyResult::Created)
            }
            Some(entry) => {
                let Some(from) = self.mismatch(&entry)? else {
                    return Ok(ApplyResult::NoChange);
                };
                log::info!(
                    "User {}: {from} -> {}",
                    self.decl.name,
                    self.describe_desired()
                );
                self.env
                    .host
                    .modify_user(&self.spec())
                    .with_context(|| format!("Failed to modify user {}", self.decl.name))?;
                Ok(ApplyResult::Modified)
            }
        }
    }
}
