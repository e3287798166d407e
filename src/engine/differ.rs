//! Plan display - what a dry run found, in declaration order

use colored::Colorize;
use converge::{Outcome, ResourceGraph, ResourceState, RunReport};

use crate::progress::notification_line;
use crate::ui;

const DETAIL_WIDTH: usize = 60;

/// Symbol and state description for one outcome
fn describe(outcome: &Outcome) -> (colored::ColoredString, String) {
    match outcome {
        Outcome::Unchanged => ("✓".green(), "up to date".to_string()),
        Outcome::Skipped { reason } => ("⊘".dimmed(), reason.clone()),
        Outcome::Changed { .. } => ("✓".green(), outcome.label().to_string()),
        Outcome::Failed { error } => ("✗".red(), error.clone()),
        Outcome::WouldChange { current, desired } => {
            let desired_details = match desired {
                ResourceState::Present { details: Some(d) } => d.as_str(),
                _ => "desired",
            };
            match current {
                ResourceState::Absent => ("+".green(), format!("(absent) → {desired_details}")),
                ResourceState::Modified { from, to } => ("~".yellow(), format!("{from} → {to}")),
                ResourceState::Unknown => ("?".yellow(), format!("(unknown) → {desired_details}")),
                ResourceState::Present { details } => (
                    "~".yellow(),
                    format!("{} → {desired_details}", details.as_deref().unwrap_or("current")),
                ),
            }
        }
    }
}

/// Display a dry-run report as a boxed plan
///
/// With `show_diffs`, pending content changes of files and templates follow
/// the box.
pub fn display_plan(report: &RunReport, graph: &ResourceGraph, show_diffs: bool) {
    if report.resources().is_empty() {
        println!();
        println!("  {} Nothing declared for this node", "ℹ".blue());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Convergence Plan".bold()
    );
    println!("│");

    for resource in report.resources() {
        let (symbol, state_desc) = describe(&resource.outcome);
        println!(
            "│   {} {:<50} {}",
            symbol,
            resource.id.to_string(),
            ui::truncate(&state_desc, DETAIL_WIDTH).dimmed()
        );
    }

    if !report.notifications().is_empty() {
        println!("│");
        println!("│ {}", "Notifications".bold());
        for record in report.notifications() {
            println!("│ {}", notification_line(record));
        }
    }

    let summary = report.summary();
    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} to change, {} up to date, {} skipped",
        summary.would_change.to_string().bold(),
        summary.unchanged.to_string().green(),
        summary.skipped.to_string().dimmed()
    );
    println!("└─────────────────────────────────────────────────────┘");

    if show_diffs {
        display_content_diffs(report, graph);
    }
}

/// Print line diffs for every pending resource that has one
pub fn display_content_diffs(report: &RunReport, graph: &ResourceGraph) {
    for resource in report.resources() {
        if !matches!(resource.outcome, Outcome::WouldChange { .. }) {
            continue;
        }
        let Some(diff) = graph.get(&resource.id).and_then(|d| d.resource().content_diff()) else {
            continue;
        };

        println!();
        println!("{}", resource.id.to_string().cyan().bold());
        for line in diff.lines() {
            println!("{}", colorize_diff_line(line));
        }
    }
}

fn colorize_diff_line(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.dimmed().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_pending_states() {
        colored::control::set_override(false);

        let (symbol, desc) = describe(&Outcome::WouldChange {
            current: ResourceState::Absent,
            desired: ResourceState::present("mode 0755"),
        });
        assert_eq!(symbol.to_string(), "+");
        assert_eq!(desc, "(absent) → mode 0755");

        let (symbol, desc) = describe(&Outcome::WouldChange {
            current: ResourceState::Modified {
                from: "disabled, stopped".into(),
                to: "enabled, running".into(),
            },
            desired: ResourceState::present("enabled, running"),
        });
        assert_eq!(symbol.to_string(), "~");
        assert_eq!(desc, "disabled, stopped → enabled, running");

        let (_, desc) = describe(&Outcome::WouldChange {
            current: ResourceState::Unknown,
            desired: ResourceState::Present { details: None },
        });
        assert_eq!(desc, "(unknown) → desired");
    }

    #[test]
    fn test_describe_settled_states() {
        colored::control::set_override(false);
        assert_eq!(describe(&Outcome::Unchanged).1, "up to date");
        assert_eq!(
            describe(&Outcome::Skipped {
                reason: "not_if `test -f /usr/local/sbin/zabbix_agentd` was true".into()
            })
            .1,
            "not_if `test -f /usr/local/sbin/zabbix_agentd` was true"
        );
    }

    #[test]
    fn test_colorize_diff_line_keeps_text() {
        colored::control::set_override(false);
        assert_eq!(colorize_diff_line("+Server=b"), "+Server=b");
        assert_eq!(colorize_diff_line("@@ -1 +1 @@"), "@@ -1 +1 @@");
    }
}
