//! The `Resource` trait
//!
//! A resource is one piece of host state the engine converges: an account,
//! a directory, a file body, an unpacked software tree. Ordering between
//! resources is declared up front through [`Resource::dependencies`];
//! nothing is inferred at apply time.

use crate::context::ApplyContext;
use crate::types::{ApplyResult, ResourceKey, ResourceState};
use anyhow::Result;
use std::fmt;

/// A single convergeable piece of host state
///
/// Implementations answer four questions: who am I (`key`), what must
/// converge first (`dependencies`), what does the host look like now
/// (`current_state`), and what should it look like (`desired_state`).
/// `apply` closes the gap and must be idempotent: applying a resource whose
/// current state already equals its desired state changes nothing.
///
/// # Example
///
/// ```ignore
/// use declarative::{ApplyContext, ApplyResult, Resource, ResourceKey, ResourceState};
///
/// #[derive(Debug)]
/// struct DataDir {
///     path: std::path::PathBuf,
///     owner: String,
/// }
///
/// impl Resource for DataDir {
///     fn key(&self) -> ResourceKey {
///         ResourceKey::directory(self.path.display().to_string())
///     }
///
///     fn description(&self) -> String {
///         format!("Data directory {}", self.path.display())
///     }
///
///     fn dependencies(&self) -> Vec<ResourceKey> {
///         vec![ResourceKey::user(&self.owner)]
///     }
///
///     fn current_state(&self) -> anyhow::Result<ResourceState> {
///         Ok(if self.path.is_dir() {
///             ResourceState::Present { details: None }
///         } else {
///             ResourceState::Absent
///         })
///     }
///
///     fn desired_state(&self) -> ResourceState {
///         ResourceState::Present { details: None }
///     }
///
///     fn apply(&self, ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
///         if ctx.dry_run {
///             return Ok(ApplyResult::Skipped { reason: "Dry run".into() });
///         }
///         if self.path.is_dir() {
///             return Ok(ApplyResult::NoChange);
///         }
///         std::fs::create_dir(&self.path)?;
///         Ok(ApplyResult::Created)
///     }
/// }
/// ```
pub trait Resource: Send + Sync + fmt::Debug {
    /// Unique key for this resource within a run
    fn key(&self) -> ResourceKey;

    /// One line for plans and progress output
    fn description(&self) -> String;

    /// Keys of resources that must converge before this one
    fn dependencies(&self) -> Vec<ResourceKey> {
        Vec::new()
    }

    /// Inspect the host without changing it
    fn current_state(&self) -> Result<ResourceState>;

    /// The state `apply` converges to
    fn desired_state(&self) -> ResourceState;

    /// Whether current and desired state differ
    fn needs_apply(&self) -> Result<bool> {
        Ok(self.current_state()? != self.desired_state())
    }

    /// Converge to the desired state
    ///
    /// Returns `Skipped` under `ctx.dry_run`, `NoChange` when already
    /// converged, and otherwise changes only what differs.
    fn apply(&self, ctx: &mut ApplyContext) -> Result<ApplyResult>;
}

/// Type-erased resource as stored in plans
pub type BoxedResource = Box<dyn Resource>;
