//! Diff display for convergence runs

use colored::Colorize;
use declarative::{DiffSummary, ResourceDiff, ResourceKind, ResourceState, group_by_kind};
use similar::{ChangeTag, TextDiff};
use std::path::Path;

use crate::host::Host;
use crate::model::Catalog;

/// Heading for each kind, in the order kinds sort
fn kind_heading(kind: ResourceKind) -> &'static str {
    match kind {
        ResourceKind::Group => "Groups",
        ResourceKind::User => "Users",
        ResourceKind::Directory => "Directories",
        ResourceKind::File => "Files",
        ResourceKind::Deployment => "Software deployments",
    }
}

fn symbol(diff: &ResourceDiff) -> colored::ColoredString {
    match (&diff.current, &diff.desired) {
        (ResourceState::Absent, ResourceState::Present { .. }) => "+".green(),
        (ResourceState::Modified { .. }, _) | (ResourceState::Present { .. }, _) => {
            "~".yellow()
        }
        _ => "?".dimmed(),
    }
}

fn state_desc(diff: &ResourceDiff) -> String {
    match (&diff.current, &diff.desired) {
        (ResourceState::Absent, ResourceState::Present { details }) => format!(
            "(absent){}",
            details
                .as_ref()
                .map(|d| format!(" → {d}"))
                .unwrap_or_default()
        ),
        (ResourceState::Modified { from, to }, _) => format!("{from} → {to}"),
        (ResourceState::Present { details: from }, ResourceState::Present { details: to }) => {
            format!(
                "{} → {}",
                from.as_deref().unwrap_or("current"),
                to.as_deref().unwrap_or("desired")
            )
        }
        (ResourceState::Unknown, _) => "(state unknown)".to_string(),
        _ => String::new(),
    }
}

/// Display a list of diffs grouped by kind
///
/// With `verbose`, templated files that already exist also get a line diff
/// of their content against the freshly rendered body.
pub fn display_diff(diffs: &[ResourceDiff], catalog: &Catalog, host: &dyn Host, verbose: bool) {
    if diffs.is_empty() {
        println!();
        println!("  {} Host already converged, no changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Convergence Diff".bold()
    );
    println!("│");

    for (kind, kind_diffs) in group_by_kind(diffs) {
        println!("│ {}", kind_heading(kind).bold());
        for diff in kind_diffs {
            println!(
                "│   {} {:<40} {}",
                symbol(diff),
                diff.key.name,
                state_desc(diff).dimmed()
            );
            if verbose && kind == ResourceKind::File {
                show_content_diff(Path::new(&diff.key.name), catalog, host);
            }
        }
        println!("│");
    }

    let summary = DiffSummary::from_diffs(diffs);
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} new, {} to update)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.modifications.to_string().yellow()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Changed lines between two bodies, tagged `-` or `+`
pub fn changed_lines(current: &str, desired: &str) -> Vec<(char, String)> {
    TextDiff::from_lines(current, desired)
        .iter_all_changes()
        .filter_map(|change| {
            let sign = match change.tag() {
                ChangeTag::Delete => '-',
                ChangeTag::Insert => '+',
                ChangeTag::Equal => return None,
            };
            Some((sign, change.to_string_lossy().trim_end_matches('\n').to_string()))
        })
        .collect()
}

fn show_content_diff(path: &Path, catalog: &Catalog, host: &dyn Host) {
    let Some(Ok(desired)) = catalog.render(path) else {
        return;
    };
    let Ok(current) = std::fs::read_to_string(host.resolve(path)) else {
        return;
    };

    for (sign, line) in changed_lines(&current, &desired) {
        let text = format!("{sign} {line}");
        if sign == '-' {
            println!("│       {}", text.red());
        } else {
            println!("│       {}", text.green());
        }
    }
}
