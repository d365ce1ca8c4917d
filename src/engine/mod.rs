//! Convergence engine wiring for fcrepo-provision
//!
//! The engine orchestrates:
//! 1. Planning - Resolve config, gather facts, build the catalog and order it
//! 2. Diffing - Compute and display current vs desired state
//! 3. Executing - Confirm, then apply in order with console progress

pub mod differ;
pub mod executor;
pub mod planner;

pub use executor::{ApplyOptions, Outcome, execute};
pub use planner::{Planned, plan};
