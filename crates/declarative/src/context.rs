//! Apply context and callback traits
//!
//! These traits allow the declarative crate to be used without
//! depending on a specific terminal UI or prompt implementation.

use crate::diff::ResourceDiff;
use crate::types::{ApplyResult, ResourceKey};
use anyhow::Result;

/// Progress callback for execution operations
///
/// Implement this trait to receive progress updates during execution.
/// Callbacks arrive in application order.
pub trait ProgressCallback: Send {
    /// Called once with every resource that differs, before confirmation
    fn on_plan_diffs(&mut self, _diffs: &[ResourceDiff]) {}

    /// Called once before the first resource with the number of resources
    fn on_run_start(&mut self, count: usize);

    /// Called when starting to apply a single resource
    fn on_resource_start(&mut self, key: &ResourceKey, description: &str);

    /// Called when a resource application completes successfully
    fn on_resource_complete(&mut self, key: &ResourceKey, result: &ApplyResult);

    /// Called when a resource application fails; the run stops afterwards
    fn on_resource_failed(&mut self, _key: &ResourceKey, _error: &anyhow::Error) {}
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action
    ///
    /// # Returns
    /// `true` if the user confirmed, `false` otherwise
    fn confirm(&mut self, prompt: &str) -> Result<bool>;
}

/// No-op progress callback
pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_run_start(&mut self, _count: usize) {}
    fn on_resource_start(&mut self, _key: &ResourceKey, _description: &str) {}
    fn on_resource_complete(&mut self, _key: &ResourceKey, _result: &ApplyResult) {}
}

/// Progress callback that records the applied trace
#[derive(Debug, Default)]
pub struct TraceRecorder {
    /// Resources that completed, in order, with their results
    pub completed: Vec<(ResourceKey, ApplyResult)>,
    /// The resource that failed, with its rendered cause
    pub failed: Option<(ResourceKey, String)>,
}

impl TraceRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keys in the order they were applied
    pub fn keys(&self) -> Vec<ResourceKey> {
        self.completed.iter().map(|(key, _)| key.clone()).collect()
    }

    /// Number of completed resources that changed something
    pub fn changes(&self) -> usize {
        self.completed.iter().filter(|(_, r)| r.is_change()).count()
    }
}

impl ProgressCallback for TraceRecorder {
    fn on_run_start(&mut self, count: usize) {
        self.completed.reserve(count);
    }

    fn on_resource_start(&mut self, _key: &ResourceKey, _description: &str) {}

    fn on_resource_complete(&mut self, key: &ResourceKey, result: &ApplyResult) {
        self.completed.push((key.clone(), result.clone()));
    }

    fn on_resource_failed(&mut self, key: &ResourceKey, error: &anyhow::Error) {
        self.failed = Some((key.clone(), format!("{error:#}")));
    }
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(true)
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Context passed to resource apply operations
#[derive(Debug, Clone, Copy)]
pub struct ApplyContext {
    /// Whether this is a dry run (no actual changes)
    pub dry_run: bool,
    /// Whether to output verbose information
    pub verbose: bool,
}

impl ApplyContext {
    /// Create a new apply context
    pub fn new(dry_run: bool, verbose: bool) -> Self {
        Self { dry_run, verbose }
    }
}
