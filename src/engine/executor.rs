//! Apply orchestration - preview, confirm, converge, record

use anyhow::{Context as AnyhowContext, Result};
use colored::Colorize;
use console::Term;
use converge::{
    Attributes, CachedDiscovery, ExecuteOptions, NoProgress, PeerDiscovery, ResourceGraph,
    RunReport,
};
use std::path::Path;

use crate::progress::RunProgress;
use crate::state::{LastRun, RunLock};

use super::differ::display_plan;

/// Options for `apply` (adds confirmation and output control to the run options)
#[derive(Debug, Clone, Default)]
pub struct ApplyOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Print the report as JSON instead of the plan and summary
    pub json: bool,
    pub verbose: bool,
    pub quiet: bool,
}

/// Everything a run converges
pub struct RunInput<'a> {
    pub graph: &'a ResourceGraph,
    pub attributes: &'a Attributes,
    pub discovery: &'a dyn PeerDiscovery,
    /// Recorded with the report
    pub config_path: &'a Path,
}

/// How an `apply` ended, short of an error
#[derive(Debug)]
pub enum ApplyOutcome {
    Converged(RunReport),
    /// Dry run: only the preview was computed
    Previewed(RunReport),
    /// The operator declined the plan
    Aborted,
}

/// Converge the node with preview and confirmation
pub fn execute(input: &RunInput<'_>, state_dir: &Path, opts: &ApplyOptions) -> Result<ApplyOutcome> {
    let _lock = RunLock::acquire(state_dir)?;

    // Preview and real run see the same peer lookups
    let discovery = CachedDiscovery::new(input.discovery);

    // 1. Dry run to find pending changes
    let preview = converge::run(
        input.graph,
        input.attributes,
        &discovery,
        &ExecuteOptions {
            dry_run: true,
            verbose: opts.verbose,
        },
        &mut NoProgress,
    )
    .map_err(|failure| anyhow::Error::new(failure.error))
    .context("Failed to plan the run")?;
    let pending = preview.summary().would_change;

    // 2. Display what will change
    if !opts.json && !opts.quiet {
        display_plan(&preview, input.graph, opts.verbose);
    }

    if opts.dry_run {
        if opts.json {
            print_json(&preview)?;
        } else if !opts.quiet {
            println!();
            println!("  {} Dry run - no changes made", "ℹ".blue());
        }
        return Ok(ApplyOutcome::Previewed(preview));
    }

    // 3. Confirm (unless --yes or nobody is watching)
    if pending > 0 && !opts.yes && Term::stdout().is_term() && !confirm_proceed()? {
        println!();
        println!("  {} Aborted", "✗".red());
        return Ok(ApplyOutcome::Aborted);
    }

    // 4. Converge
    let mut progress = RunProgress::new(opts.quiet || opts.json);
    let result = converge::run(
        input.graph,
        input.attributes,
        &discovery,
        &ExecuteOptions {
            dry_run: false,
            verbose: opts.verbose,
        },
        &mut progress,
    );

    // 5. Record and summarize
    match result {
        Ok(report) => {
            let last = LastRun {
                config: input.config_path.to_path_buf(),
                error: None,
                report,
            };
            last.save(state_dir)?;
            if opts.json {
                print_json(&last.report)?;
            } else if !opts.quiet {
                print_summary(&last.report, None);
            }
            Ok(ApplyOutcome::Converged(last.report))
        }
        Err(failure) => {
            progress.clear();
            let error = anyhow::Error::new(failure.error);
            let message = format!("{error:#}");
            let last = LastRun {
                config: input.config_path.to_path_buf(),
                error: Some(message.clone()),
                report: failure.report,
            };
            if let Err(e) = last.save(state_dir) {
                log::warn!("Failed to record the aborted run: {e:#}");
            }
            if opts.json {
                print_json(&last.report)?;
            } else {
                print_summary(&last.report, Some(&message));
            }
            Err(error.context("Run aborted; fix the cause and re-run"))
        }
    }
}

fn print_json(report: &RunReport) -> Result<()> {
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    println!("{json}");
    Ok(())
}

/// Confirm with user
fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()?;

    Ok(confirmed)
}

/// Print final summary
pub fn print_summary(report: &RunReport, error: Option<&str>) {
    let summary = report.summary();

    println!();
    match error {
        None => println!("  {} Node converged", "✓".green().bold()),
        Some(error) => {
            println!(
                "  {} Run aborted after {} resources",
                "⚠".yellow().bold(),
                summary.total()
            );
            println!("    {}", error.red());
        }
    }

    if summary.changed > 0 {
        println!("    • {} resources changed", summary.changed);
    }
    if summary.unchanged > 0 {
        println!("    • {} resources up to date", summary.unchanged);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} resources failed", summary.failed);
    }
    if summary.notifications_fired > 0 {
        println!("    • {} notifications fired", summary.notifications_fired);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{CookbookFile, Directory, FileAttrs, FileSource};
    use converge::{Declaration, Outcome, StaticDiscovery};
    use tempfile::TempDir;

    fn quiet() -> ApplyOptions {
        ApplyOptions {
            yes: true,
            quiet: true,
            ..Default::default()
        }
    }

    fn directory_graph(root: &Path) -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph
            .declare(Declaration::new(Directory::new(root, "/var/log/zabbix", FileAttrs::new(0o755))))
            .unwrap();
        graph
    }

    #[test]
    fn test_apply_converges_and_records() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let graph = directory_graph(root.path());
        let input = RunInput {
            graph: &graph,
            attributes: &Attributes::new(),
            discovery: &StaticDiscovery::new(),
            config_path: Path::new("/etc/provision/node.toml"),
        };

        let outcome = execute(&input, state.path(), &quiet()).unwrap();
        let ApplyOutcome::Converged(report) = outcome else {
            panic!("expected a converged run, got {outcome:?}");
        };
        assert_eq!(report.summary().changed, 1);
        assert!(root.path().join("var/log/zabbix").is_dir());

        let last = LastRun::load(state.path()).unwrap().unwrap();
        assert!(last.error.is_none());
        assert_eq!(last.report, report);
        assert!(!state.path().join("run.lock").exists());
    }

    #[test]
    fn test_dry_run_changes_and_records_nothing() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let graph = directory_graph(root.path());
        let input = RunInput {
            graph: &graph,
            attributes: &Attributes::new(),
            discovery: &StaticDiscovery::new(),
            config_path: Path::new("node.toml"),
        };
        let opts = ApplyOptions {
            dry_run: true,
            ..quiet()
        };

        let outcome = execute(&input, state.path(), &opts).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Previewed(ref r) if r.summary().would_change == 1));
        assert!(!root.path().join("var/log/zabbix").exists());
        assert!(LastRun::load(state.path()).unwrap().is_none());
    }

    #[test]
    fn test_failed_run_records_partial_report() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let mut graph = directory_graph(root.path());
        graph
            .declare(Declaration::new(CookbookFile::new(
                root.path(),
                "/tmp/zabbix-agent.tar.gz",
                FileSource::Disk(root.path().join("missing.tar.gz")),
                FileAttrs::new(0o444),
            )))
            .unwrap();
        let input = RunInput {
            graph: &graph,
            attributes: &Attributes::new(),
            discovery: &StaticDiscovery::new(),
            config_path: Path::new("node.toml"),
        };

        let err = execute(&input, state.path(), &quiet()).unwrap_err();
        let chain = format!("{err:#}");
        assert!(chain.contains("Run aborted; fix the cause and re-run"));
        assert!(chain.contains("cookbook_file[/tmp/zabbix-agent.tar.gz]"));

        let last = LastRun::load(state.path()).unwrap().unwrap();
        assert!(last.error.unwrap().contains("Failed to read cookbook file"));
        assert_eq!(last.report.summary().changed, 1);
        // The resource that stopped the run is in the report
        let failed = last
            .report
            .outcome(&"cookbook_file[/tmp/zabbix-agent.tar.gz]".parse().unwrap())
            .unwrap();
        assert!(matches!(failed, Outcome::Failed { error } if error.contains("Failed to read cookbook file")));
        assert!(!state.path().join("run.lock").exists());
    }

    #[test]
    fn test_held_lock_refuses_to_run() {
        let root = TempDir::new().unwrap();
        let state = TempDir::new().unwrap();
        let graph = directory_graph(root.path());
        let input = RunInput {
            graph: &graph,
            attributes: &Attributes::new(),
            discovery: &StaticDiscovery::new(),
            config_path: Path::new("node.toml"),
        };

        let _held = RunLock::acquire(state.path()).unwrap();
        let err = execute(&input, state.path(), &quiet()).unwrap_err();
        assert!(err.to_string().contains("another run holds"));
        assert!(!root.path().join("var/log/zabbix").exists());
    }
}
