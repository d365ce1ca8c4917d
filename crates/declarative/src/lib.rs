//! # Declarative
//!
//! A framework for declarative resource convergence.
//!
//! This crate provides the core abstractions for declaring desired state,
//! ordering it by dependency, detecting current state, and converging a
//! host to match the desired state in a single idempotent pass.
//!
//! ## Core Concepts
//!
//! - **Resource**: Something with state that can be managed (users, files,
//!   installed software), identified by a [`ResourceKey`] and declaring the
//!   keys it depends on
//! - **ResourceGraph**: The DAG of "must converge before" edges; cycles are
//!   rejected before anything runs
//! - **ExecutionPlan**: The resource set in a deterministic topological order
//! - **Executor**: Applies a plan strictly in order and stops at the first
//!   failure
//! - **Template / Bindings**: Pure rendering of file bodies
//! - **FactProvider**: Read-only host facts (hostname, OS family)
//!
//! ## Example
//!
//! ```ignore
//! use declarative::{ExecuteOptions, ExecutionPlan, execute_simple};
//!
//! let plan = ExecutionPlan::new(resources)?;
//! let summary = execute_simple(&plan, &ExecuteOptions::default())?;
//! assert_eq!(summary.total(), plan.len());
//! ```
//!
//! ## Callback Traits
//!
//! - [`ProgressCallback`]: Receives progress updates in application order
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This allows the crate to be used without hard dependencies on
//! specific UI frameworks.

pub mod context;
pub mod diff;
pub mod error;
pub mod executor;
pub mod facts;
pub mod graph;
pub mod planner;
pub mod resource;
pub mod template;
pub mod types;

// Re-export main types at crate root
pub use context::{
    ApplyContext, AutoConfirm, AutoDecline, ConfirmCallback, NoProgress, ProgressCallback,
    TraceRecorder,
};
pub use diff::{DiffSummary, ResourceDiff, compute_diffs, group_by_kind};
pub use error::{Error, ErrorCategory, Result};
pub use executor::{execute, execute_simple};
pub use facts::{FactProvider, Facts, StaticFacts, SystemFacts};
pub use graph::ResourceGraph;
pub use planner::ExecutionPlan;
pub use resource::{BoxedResource, Resource};
pub use template::{Bindings, BindingsBuilder, Template, render};
pub use types::{
    ApplyResult, ExecuteOptions, ExecuteSummary, ResourceKey, ResourceKind, ResourceState,
};
