//! Group resource

use anyhow::Result;
use declarative::{ApplyContext, ApplyResult, Resource, ResourceKey, ResourceState};

use super::Environment;
use crate::model::GroupDecl;

/// A group that must exist
#[derive(Debug, Clone)]
pub struct Group {
    decl: GroupDecl,
    env: Environment,
}

impl Group {
    pub fn new(decl: GroupDecl, env: Environment) -> Self {
        Self { decl, env }
    }
}

impl Resource for Group {
    fn key(&self) -> ResourceKey {
        ResourceKey::group(&self.decl.name)
    }

    fn description(&self) -> String {
        format!("Group {}", self.decl.name)
    }

    fn current_state(&self) -> Result<ResourceState> {
        match self.env.host.group(&self.decl.name)? {
            Some(_) => Ok(ResourceState::Present { details: None }),
            None => Ok(ResourceState::Absent),
        }
    }

    fn desired_state(&self) -> ResourceState {
        ResourceState::Present { details: None }
    }

    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult> {
        if ctx.dry_run {
            return Ok(ApplyResult::Skipped {
                reason: "Dry run".to_string(),
            });
        }

        if self.env.host.group(&self.decl.name)?.is_some() {
            return Ok(ApplyResult::NoChange);
        }

        self.env.host.create_group(&self.decl.name)?;
        Ok(ApplyResult::Created)
    }
}
