//! Planning: config and facts in, ordered resources out

use colored::Colorize;
use declarative::{ExecutionPlan, Facts};

use crate::config::ResolvedConfig;
use crate::model::Catalog;
use crate::resource::{self, Environment};

/// A catalog together with its execution plan
pub struct Planned {
    pub catalog: Catalog,
    pub plan: ExecutionPlan,
}

/// Build the catalog and order it
///
/// Configuration, cycle and template errors all surface here, before any
/// resource has been applied.
pub fn plan(
    config: &ResolvedConfig,
    facts: &Facts,
    env: &Environment,
) -> declarative::Result<Planned> {
    let catalog = Catalog::build(config, facts)?;
    let plan = ExecutionPlan::new(resource::build(&catalog, env))?;
    log::info!("Planned {} resources", plan.len());
    Ok(Planned { catalog, plan })
}

/// Print resources in convergence order with their dependencies
pub fn display_plan(plan: &ExecutionPlan, target: Option<&str>) {
    let resources = plan.filter_by_target(target);
    if resources.is_empty() {
        println!("  {} No resources match", "ℹ".blue());
        return;
    }

    println!();
    for (i, resource) in resources.iter().enumerate() {
        let key = resource.key();
        println!(
            "  {} {}",
            format!("{:>3}.", i + 1).dimmed(),
            key.to_string().bold()
        );
        println!("       {}", resource.description());

        let deps = plan.dependencies_of(&key);
        if !deps.is_empty() {
            let names: Vec<String> = deps.iter().map(ToString::to_string).collect();
            println!("       {} {}", "after".dimmed(), names.join(", ").dimmed());
        }
    }
    println!();
    println!(
        "  {} resources, applied strictly in this order",
        resources.len().to_string().bold()
    );
}
