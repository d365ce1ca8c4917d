//! Convergence commands
//!
//! - `plan` - List resources in the order they converge
//! - `diff` - Preview what apply would change
//! - `apply` - Make the host match the declared state
//! - `render` - Print a templated file's body
//! - `facts` / `config` - Show the inputs a run would use

use anyhow::{Context as AnyhowContext, Result, bail};
use chrono::Utc;
use colored::Colorize;
use declarative::{FactProvider, Facts, StaticFacts, SystemFacts, compute_diffs};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::Context;
use crate::cli::{ApplyArgs, PlanArgs, RenderArgs, TargetArgs};
use crate::config::{ProvisionConfig, ResolvedConfig, parse_assignment};
use crate::engine::{self, ApplyOptions, Planned};
use crate::host::SystemHost;
use crate::install::TarballInstaller;
use crate::lock::{self, RunLock};
use crate::report::RunReport;
use crate::resource::Environment;
use crate::ui;

// ============================================================================
// Inputs
// ============================================================================

/// Config file, then flags and environment, then `--set` assignments
fn load_config(args: &TargetArgs) -> Result<ResolvedConfig> {
    let base = match &args.config {
        Some(path) => {
            log::debug!("Loading config from {}", path.display());
            ProvisionConfig::load(path)?
        }
        None => ProvisionConfig::default(),
    };

    let mut config = base.merge(args.options.clone().into());
    for assignment in &args.set {
        parse_assignment(&mut config, assignment)?;
    }

    config.resolve().map_err(|e| {
        ui::failure(&e);
        anyhow::Error::new(e)
    })
}

fn gather_facts(args: &TargetArgs) -> Result<Facts> {
    let facts = match (&args.hostname, &args.os_family) {
        (Some(hostname), Some(os_family)) => StaticFacts::new(hostname, os_family).gather()?,
        _ => {
            let mut facts = SystemFacts::new(&args.root)
                .gather()
                .context("Failed to gather host facts")?;
            if let Some(hostname) = &args.hostname {
                facts.hostname.clone_from(hostname);
            }
            if let Some(os_family) = &args.os_family {
                facts.os_family.clone_from(os_family);
            }
            facts
        }
    };
    log::info!("Facts: hostname={} os_family={}", facts.hostname, facts.os_family);
    Ok(facts)
}

fn environment(args: &TargetArgs) -> Environment {
    Environment::new(
        Arc::new(SystemHost::new(&args.root)),
        Arc::new(TarballInstaller),
        args.artifacts.clone(),
    )
}

/// Resolve, gather and plan; nothing on the host changes here
fn prepare(args: &TargetArgs) -> Result<(Facts, Environment, Planned)> {
    let config = load_config(args)?;
    let facts = gather_facts(args)?;
    let env = environment(args);
    let planned = engine::plan(&config, &facts, &env).map_err(|e| {
        ui::failure(&e);
        anyhow::Error::new(e)
    })?;
    Ok((facts, env, planned))
}

// ============================================================================
// Commands
// ============================================================================

pub fn plan(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let (facts, _, planned) = prepare(&args.host)?;

    if !ctx.quiet {
        ui::header(&format!("Convergence plan for {}", facts.hostname));
    }
    engine::planner::display_plan(&planned.plan, args.target.as_deref());
    Ok(())
}

pub fn diff(ctx: &Context, args: &PlanArgs) -> Result<()> {
    let (_, env, planned) = prepare(&args.host)?;

    let diffs = compute_diffs(planned.plan.filter_by_target(args.target.as_deref()))?;
    engine::differ::display_diff(&diffs, &planned.catalog, env.host.as_ref(), ctx.verbose > 0);
    Ok(())
}

pub fn apply(ctx: &Context, args: &ApplyArgs) -> Result<()> {
    let (facts, env, planned) = prepare(&args.host)?;

    let lock_path = args.lock_file.clone().unwrap_or_else(lock::default_path);
    let _lock = RunLock::acquire(&lock_path)?;

    let opts = ApplyOptions {
        dry_run: args.dry_run,
        yes: args.yes,
        verbose: ctx.verbose > 0,
        timeout: args.timeout.map(Duration::from_secs),
    };

    let started_at = Utc::now();
    let outcome = engine::execute(&planned, env.host.as_ref(), &opts);

    if let Some(path) = &args.report {
        RunReport::new(started_at, args.dry_run, facts, &outcome).save(path)?;
        if !ctx.quiet {
            ui::success(&format!("Run report written to {}", path.display()));
        }
    }

    outcome.result.map(|_| ()).map_err(anyhow::Error::new)
}

pub fn render(_ctx: &Context, args: &RenderArgs) -> Result<()> {
    let (_, _, planned) = prepare(&args.host)?;
    let catalog = &planned.catalog;

    match catalog.render(&args.path) {
        Some(body) => {
            print!("{}", body?);
            Ok(())
        }
        None => {
            let templated: Vec<String> = catalog
                .files()
                .filter(|f| catalog.render(&f.path).is_some())
                .map(|f| f.path.display().to_string())
                .collect();
            bail!(
                "{} is not a templated file; templated files are:\n  {}",
                args.path.display(),
                templated.join("\n  ")
            )
        }
    }
}

pub fn facts(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let facts = gather_facts(args)?;
    if !ctx.quiet {
        ui::header("Host facts");
    }
    ui::kv("hostname", &facts.hostname);
    ui::kv("os_family", &facts.os_family);
    if args.root != Path::new("/") {
        ui::kv("root", &args.root.display().to_string());
    }
    Ok(())
}

pub fn config(ctx: &Context, args: &TargetArgs) -> Result<()> {
    let resolved = load_config(args)?;
    let rendered =
        toml::to_string_pretty(&resolved).context("Failed to serialize resolved config")?;

    if !ctx.quiet {
        ui::header("Resolved configuration");
        if args.config.is_none() {
            ui::info(&format!(
                "No config file given, showing defaults and overrides {}",
                "(--config PATH)".dimmed()
            ));
        }
        println!();
    }
    print!("{rendered}");
    Ok(())
}
