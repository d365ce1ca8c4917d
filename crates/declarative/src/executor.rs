//! Execution engine - applies a plan strictly in order, stopping at the
//! first failure

use crate::context::{ApplyContext, ConfirmCallback, ProgressCallback};
use crate::diff::ResourceDiff;
use crate::error::{Error, Result};
use crate::planner::ExecutionPlan;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary, ResourceKey};
use std::time::Instant;

/// Execute a plan with the given options and callbacks
///
/// Resources are applied one at a time in plan order. The first resource
/// that fails ends the run with [`Error::Apply`]; resources already applied
/// are left as they are. If `opts.timeout` is set, the deadline is checked
/// before each resource starts and never interrupts one already running.
///
/// # Arguments
/// * `plan` - The execution plan to run
/// * `opts` - Execution options (dry_run, verbose, timeout)
/// * `progress` - Progress callback
/// * `confirm` - Confirmation callback, consulted once if anything differs
///
/// # Returns
/// Summary of execution results
pub fn execute<P, C>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let mut diffs = Vec::new();
    for resource in &plan.resources {
        if let Some(diff) = ResourceDiff::from_resource(resource.as_ref()).map_err(|source| {
            Error::Apply {
                key: resource.key(),
                source,
            }
        })? {
            diffs.push(diff);
        }
    }
    progress.on_plan_diffs(&diffs);

    if diffs.is_empty() && !opts.dry_run {
        log::info!("All {} resources already converged", plan.len());
    } else if opts.dry_run {
        log::info!("Dry run: {} resources would change", diffs.len());
        return Ok(ExecuteSummary {
            skipped: diffs.len(),
            no_change: plan.len() - diffs.len(),
            ..Default::default()
        });
    } else {
        let confirmed = confirm
            .confirm(&format!("Apply {} changes?", diffs.len()))
            .map_err(|e| Error::configuration(format!("confirmation failed: {e:#}")))?;
        if !confirmed {
            return Ok(ExecuteSummary {
                skipped: plan.len(),
                ..Default::default()
            });
        }
    }

    apply_in_order(plan, opts, progress)
}

/// Apply every resource in plan order without diffing or confirmation
fn apply_in_order<P: ProgressCallback>(
    plan: &ExecutionPlan,
    opts: &ExecuteOptions,
    progress: &mut P,
) -> Result<ExecuteSummary> {
    let started = Instant::now();
    let mut ctx = ApplyContext::new(false, opts.verbose);
    let mut summary = ExecuteSummary::default();

    progress.on_run_start(plan.len());

    for resource in &plan.resources {
        let key = resource.key();

        if let Some(limit) = opts.timeout {
            let elapsed = started.elapsed();
            if elapsed >= limit {
                log::warn!("Deadline of {limit:?} reached before {key}");
                return Err(Error::Timeout { next: key, elapsed });
            }
        }

        progress.on_resource_start(&key, &resource.description());
        log::debug!("Applying {key}");

        match resource.apply(&mut ctx) {
            Ok(result) => {
                log_result(&key, &result);
                progress.on_resource_complete(&key, &result);
                summary.add_result(&result);
            }
            Err(source) => {
                log::error!("{key} failed: {source:#}");
                progress.on_resource_failed(&key, &source);
                return Err(Error::Apply { key, source });
            }
        }
    }

    Ok(summary)
}

fn log_result(key: &ResourceKey, result: &ApplyResult) {
    match result {
        ApplyResult::NoChange => log::debug!("{key}: already converged"),
        ApplyResult::Created => log::info!("{key}: created"),
        ApplyResult::Modified => log::info!("{key}: modified"),
        ApplyResult::Skipped { reason } => log::info!("{key}: skipped ({reason})"),
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(plan: &ExecutionPlan, opts: &ExecuteOptions) -> Result<ExecuteSummary> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, opts, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress, TraceRecorder};
    use crate::resource::{BoxedResource, Resource};
    use crate::types::ResourceState;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Converges once, then reports itself present
    #[derive(Debug)]
    struct Flag {
        name: String,
        deps: Vec<String>,
        applied: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Flag {
        fn boxed(name: &str, deps: &[&str], applied: &Arc<AtomicUsize>) -> BoxedResource {
            Box::new(Self {
                name: name.to_string(),
                deps: deps.iter().map(ToString::to_string).collect(),
                applied: Arc::clone(applied),
                fail: false,
            })
        }

        fn failing(name: &str, deps: &[&str], applied: &Arc<AtomicUsize>) -> BoxedResource {
            Box::new(Self {
                name: name.to_string(),
                deps: deps.iter().map(ToString::to_string).collect(),
                applied: Arc::clone(applied),
                fail: true,
            })
        }
    }

    impl Resource for Flag {
        fn key(&self) -> ResourceKey {
            ResourceKey::directory(&self.name)
        }

        fn description(&self) -> String {
            format!("Flag {}", self.name)
        }

        fn dependencies(&self) -> Vec<ResourceKey> {
            self.deps.iter().map(ResourceKey::directory).collect()
        }

        fn current_state(&self) -> anyhow::Result<ResourceState> {
            if self.applied.load(Ordering::SeqCst) > 0 {
                Ok(ResourceState::Present { details: None })
            } else {
                Ok(ResourceState::Absent)
            }
        }

        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }

        fn apply(&self, _ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
            if self.fail {
                anyhow::bail!("disk full");
            }
            if self.applied.load(Ordering::SeqCst) > 0 {
                return Ok(ApplyResult::NoChange);
            }
            self.applied.fetch_add(1, Ordering::SeqCst);
            Ok(ApplyResult::Created)
        }
    }

    /// Cannot read its own state
    #[derive(Debug)]
    struct Unreadable;

    impl Resource for Unreadable {
        fn key(&self) -> ResourceKey {
            ResourceKey::directory("unreadable")
        }

        fn description(&self) -> String {
            "Unreadable".to_string()
        }

        fn current_state(&self) -> anyhow::Result<ResourceState> {
            anyhow::bail!("permission denied")
        }

        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }

        fn apply(&self, _ctx: &mut ApplyContext) -> anyhow::Result<ApplyResult> {
            Ok(ApplyResult::Created)
        }
    }

    #[derive(Default)]
    struct DiffCollector {
        diffs: Vec<ResourceDiff>,
        started: bool,
    }

    impl ProgressCallback for DiffCollector {
        fn on_plan_diffs(&mut self, diffs: &[ResourceDiff]) {
            self.diffs = diffs.to_vec();
        }

        fn on_run_start(&mut self, _count: usize) {
            self.started = true;
        }

        fn on_resource_start(&mut self, _key: &ResourceKey, _description: &str) {}
        fn on_resource_complete(&mut self, _key: &ResourceKey, _result: &ApplyResult) {}
    }

    fn counters(n: usize) -> Vec<Arc<AtomicUsize>> {
        (0..n).map(|_| Arc::new(AtomicUsize::new(0))).collect()
    }

    #[test]
    fn test_execute_empty_plan() {
        let plan = ExecutionPlan::new(Vec::new()).unwrap();
        let result = execute_simple(&plan, &ExecuteOptions::default()).unwrap();
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_trace_follows_dependencies() {
        let c = counters(3);
        let plan = ExecutionPlan::new(vec![
            Flag::boxed("app", &["runtime"], &c[0]),
            Flag::boxed("root", &[], &c[1]),
            Flag::boxed("runtime", &["root"], &c[2]),
        ])
        .unwrap();

        let mut trace = TraceRecorder::new();
        let summary = execute(&plan, &ExecuteOptions::default(), &mut trace, &mut AutoConfirm)
            .unwrap();

        let names: Vec<_> = trace.keys().into_iter().map(|k| k.name).collect();
        assert_eq!(names, ["root", "runtime", "app"]);
        assert_eq!(summary.created, 3);
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let c = counters(2);
        let plan = ExecutionPlan::new(vec![
            Flag::boxed("a", &[], &c[0]),
            Flag::boxed("b", &["a"], &c[1]),
        ])
        .unwrap();

        let first = execute_simple(&plan, &ExecuteOptions::default()).unwrap();
        let second = execute_simple(&plan, &ExecuteOptions::default()).unwrap();

        assert_eq!(first.total_changes(), 2);
        assert_eq!(second.total_changes(), 0);
        assert_eq!(second.no_change, 2);
    }

    #[test]
    fn test_failure_stops_the_run() {
        let c = counters(3);
        let plan = ExecutionPlan::new(vec![
            Flag::boxed("a", &[], &c[0]),
            Flag::failing("b", &["a"], &c[1]),
            Flag::boxed("c", &["b"], &c[2]),
        ])
        .unwrap();

        let mut trace = TraceRecorder::new();
        let err = execute(&plan, &ExecuteOptions::default(), &mut trace, &mut AutoConfirm)
            .unwrap_err();

        match &err {
            Error::Apply { key, source } => {
                assert_eq!(key, &ResourceKey::directory("b"));
                assert!(source.to_string().contains("disk full"));
            }
            other => panic!("expected apply error, got {other}"),
        }
        // a stays applied, c never ran
        assert_eq!(c[0].load(Ordering::SeqCst), 1);
        assert_eq!(c[2].load(Ordering::SeqCst), 0);
        assert_eq!(trace.failed.as_ref().map(|(k, _)| k.name.as_str()), Some("b"));
    }

    #[test]
    fn test_dry_run_applies_nothing() {
        let c = counters(1);
        let plan = ExecutionPlan::new(vec![Flag::boxed("a", &[], &c[0])]).unwrap();
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };

        let summary = execute_simple(&plan, &opts).unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(c[0].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_diffs_reach_progress_before_dry_run_returns() {
        let c = counters(2);
        c[1].fetch_add(1, Ordering::SeqCst);
        let plan = ExecutionPlan::new(vec![
            Flag::boxed("a", &[], &c[0]),
            Flag::boxed("b", &[], &c[1]),
        ])
        .unwrap();
        let opts = ExecuteOptions {
            dry_run: true,
            ..Default::default()
        };

        let mut collector = DiffCollector::default();
        execute(&plan, &opts, &mut collector, &mut AutoConfirm).unwrap();
        let keys: Vec<_> = collector.diffs.iter().map(|d| d.key.name.as_str()).collect();
        assert_eq!(keys, ["a"]);
        assert!(!collector.started);
    }

    #[test]
    fn test_unreadable_state_fails_before_any_apply() {
        let c = counters(1);
        let plan = ExecutionPlan::new(vec![
            Flag::boxed("a", &[], &c[0]),
            Box::new(Unreadable) as BoxedResource,
        ])
        .unwrap();

        let mut collector = DiffCollector::default();
        let err = execute(&plan, &ExecuteOptions::default(), &mut collector, &mut AutoConfirm)
            .unwrap_err();
        assert_eq!(err.failing_key(), Some(&ResourceKey::directory("unreadable")));
        assert!(err.to_string().contains("permission denied"));
        assert!(!collector.started);
        assert_eq!(c[0].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_declined_confirmation_applies_nothing() {
        let c = counters(1);
        let plan = ExecutionPlan::new(vec![Flag::boxed("a", &[], &c[0])]).unwrap();

        let summary = execute(
            &plan,
            &ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(summary.skipped, 1);
        assert_eq!(c[0].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_zero_timeout_stops_before_first_resource() {
        let c = counters(1);
        let plan = ExecutionPlan::new(vec![Flag::boxed("a", &[], &c[0])]).unwrap();
        let opts = ExecuteOptions {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        };

        let err = execute_simple(&plan, &opts).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert_eq!(c[0].load(Ordering::SeqCst), 0);
    }
}
