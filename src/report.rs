//! JSON run reports
//!
//! `apply --report PATH` records what a run did: when it ran, the facts it
//! saw, every resource applied in order, and how it ended.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use declarative::{ApplyResult, ExecuteSummary, Facts, ResourceKey};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::engine::Outcome;

/// One applied resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppliedEntry {
    pub key: ResourceKey,
    pub result: ApplyResult,
}

/// How the run ended
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Success {
        summary: ExecuteSummary,
    },
    Failed {
        /// Resource the run stopped at, when it got that far
        failing_key: Option<ResourceKey>,
        category: String,
        cause: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub dry_run: bool,
    pub facts: Facts,
    /// Resources that differed when the run started
    pub pending: Vec<ResourceKey>,
    pub applied: Vec<AppliedEntry>,
    #[serde(flatten)]
    pub status: RunStatus,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>, dry_run: bool, facts: Facts, outcome: &Outcome) -> Self {
        let status = match &outcome.result {
            Ok(summary) => RunStatus::Success {
                summary: summary.clone(),
            },
            Err(e) => RunStatus::Failed {
                failing_key: e.failing_key().cloned(),
                category: e.category().description().to_string(),
                cause: format!("{e:#}"),
            },
        };

        Self {
            started_at,
            finished_at: Utc::now(),
            dry_run,
            facts,
            pending: outcome.diffs.iter().map(|d| d.key.clone()).collect(),
            applied: outcome
                .trace
                .completed
                .iter()
                .map(|(key, result)| AppliedEntry {
                    key: key.clone(),
                    result: result.clone(),
                })
                .collect(),
            status,
        }
    }

    /// Write the report as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            serde_json::to_string_pretty(self).context("Failed to serialize run report")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write run report: {}", path.display()))?;
        log::debug!("Saved run report to {}", path.display());
        Ok(())
    }
}
