//! Execution with console UI: diff, confirm, apply in order, summarize

use colored::Colorize;
use declarative::{
    ApplyResult, ConfirmCallback, ExecuteOptions, ExecuteSummary, ProgressCallback,
    ResourceDiff, ResourceKey, TraceRecorder,
};
use std::time::Duration;

use super::differ::display_diff;
use super::planner::Planned;
use crate::host::Host;
use crate::model::Catalog;
use crate::ui;

/// Options for an apply run, including `yes` for skipping the prompt
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Print every resource, not only the ones that changed
    pub verbose: bool,
    /// Deadline checked before each resource starts
    pub timeout: Option<Duration>,
}

/// Everything a run produced, successful or not
#[derive(Debug)]
pub struct Outcome {
    /// Resources that differed before the run started
    pub diffs: Vec<ResourceDiff>,
    /// Applied resources in order, plus the failing one
    pub trace: TraceRecorder,
    pub result: declarative::Result<ExecuteSummary>,
}

/// Prints each resource as it converges and records the trace
struct ConsoleProgress<'a> {
    catalog: &'a Catalog,
    host: &'a dyn Host,
    diffs: Vec<ResourceDiff>,
    trace: TraceRecorder,
    verbose: bool,
}

impl ProgressCallback for ConsoleProgress<'_> {
    fn on_plan_diffs(&mut self, diffs: &[ResourceDiff]) {
        display_diff(diffs, self.catalog, self.host, self.verbose);
        self.diffs = diffs.to_vec();
    }

    fn on_run_start(&mut self, count: usize) {
        println!();
        println!("  {} Converging {count} resources...", "→".cyan());
        self.trace.on_run_start(count);
    }

    fn on_resource_start(&mut self, key: &ResourceKey, description: &str) {
        log::debug!("{key}: {description}");
        self.trace.on_resource_start(key, description);
    }

    fn on_resource_complete(&mut self, key: &ResourceKey, result: &ApplyResult) {
        match result {
            ApplyResult::Created => {
                println!("    {} {key} {}", result.symbol().green(), "created".dimmed());
            }
            ApplyResult::Modified => {
                println!("    {} {key} {}", result.symbol().green(), "modified".dimmed());
            }
            ApplyResult::Skipped { reason } => {
                println!("    {} {key} {}", result.symbol().yellow(), reason.dimmed());
            }
            ApplyResult::NoChange if self.verbose => {
                println!("    {} {}", result.symbol().dimmed(), key.to_string().dimmed());
            }
            ApplyResult::NoChange => {}
        }
        self.trace.on_resource_complete(key, result);
    }

    fn on_resource_failed(&mut self, key: &ResourceKey, error: &anyhow::Error) {
        println!("    {} {key}: {}", "✗".red(), format!("{error:#}").red());
        self.trace.on_resource_failed(key, error);
    }
}

/// Interactive confirmation, bypassed by `--yes`
struct PromptConfirm {
    yes: bool,
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> anyhow::Result<bool> {
        if self.yes {
            return Ok(true);
        }
        println!();
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        if !confirmed {
            println!();
            println!("  {} Aborted, nothing was changed", "✗".red());
        }
        Ok(confirmed)
    }
}

/// Execute a plan with console output
pub fn execute(planned: &Planned, host: &dyn Host, opts: &ApplyOptions) -> Outcome {
    // The engine reports the diff first, then confirms and applies in order
    let mut progress = ConsoleProgress {
        catalog: &planned.catalog,
        host,
        diffs: Vec::new(),
        trace: TraceRecorder::new(),
        verbose: opts.verbose,
    };
    let mut confirm = PromptConfirm { yes: opts.yes };
    let result = declarative::execute(
        &planned.plan,
        &ExecuteOptions {
            dry_run: opts.dry_run,
            verbose: opts.verbose,
            timeout: opts.timeout,
        },
        &mut progress,
        &mut confirm,
    );

    match &result {
        Ok(_) if opts.dry_run => {
            println!();
            println!("  {} Dry run, no changes made", "ℹ".blue());
        }
        Ok(summary) => print_summary(summary),
        Err(e) => ui::failure(e),
    }

    Outcome {
        diffs: progress.diffs,
        trace: progress.trace,
        result,
    }
}

fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.total_changes() == 0 && summary.skipped == 0 {
        println!("  {} Host already converged", "✓".green().bold());
        return;
    }
    println!("  {} Convergence complete", "✓".green().bold());

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.no_change > 0 {
        println!("    • {} resources already converged", summary.no_change);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProvisionConfig;
    use crate::engine::planner::plan;
    use crate::resource::tests::Fixture;
    use declarative::{Error, Facts};

    fn planned(fixture: &Fixture) -> Planned {
        let config = ProvisionConfig::default().resolve().unwrap();
        let facts = Facts {
            hostname: "FedoraTestNode".to_string(),
            os_family: "RedHat".to_string(),
        };
        plan(&config, &facts, &fixture.env).unwrap()
    }

    #[test]
    fn test_apply_with_yes_converges() {
        let fixture = Fixture::new();
        let planned = planned(&fixture);
        let opts = ApplyOptions {
            yes: true,
            ..Default::default()
        };

        let outcome = execute(&planned, fixture.host.as_ref(), &opts);
        assert!(outcome.result.is_ok());
        assert_eq!(outcome.diffs.len(), planned.plan.len());
        assert_eq!(outcome.trace.keys(), planned.plan.keys());

        let again = execute(&planned, fixture.host.as_ref(), &opts);
        assert!(again.diffs.is_empty());
        assert_eq!(again.trace.changes(), 0);
    }

    #[test]
    fn test_dry_run_reports_without_applying() {
        let fixture = Fixture::new();
        let planned = planned(&fixture);
        let outcome = execute(
            &planned,
            fixture.host.as_ref(),
            &ApplyOptions {
                dry_run: true,
                ..Default::default()
            },
        );

        let summary = outcome.result.unwrap();
        assert_eq!(summary.skipped, outcome.diffs.len());
        assert!(outcome.trace.completed.is_empty());
        assert_eq!(fixture.host.mutations(), 0);
    }

    #[test]
    fn test_deadline_stops_before_first_resource() {
        let fixture = Fixture::new();
        let planned = planned(&fixture);
        let outcome = execute(
            &planned,
            fixture.host.as_ref(),
            &ApplyOptions {
                yes: true,
                timeout: Some(Duration::ZERO),
                ..Default::default()
            },
        );

        assert!(matches!(outcome.result, Err(Error::Timeout { .. })));
        assert!(outcome.trace.completed.is_empty());
        assert_eq!(fixture.host.mutations(), 0);
    }
}
