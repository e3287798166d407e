//! `provision report` - show the last recorded run

use anyhow::{Context as AnyhowContext, Result};

use crate::Context;
use crate::cli::ReportArgs;
use crate::engine::executor::print_summary;
use crate::paths;
use crate::progress::{notification_line, outcome_line};
use crate::state::LastRun;
use crate::ui;

pub fn run(ctx: &Context, args: ReportArgs) -> Result<()> {
    let state_dir = paths::state_dir()?;
    let Some(last) = LastRun::load(&state_dir)? else {
        ui::info("No run recorded yet; run `provision apply` first");
        return Ok(());
    };

    if args.json {
        let json = serde_json::to_string_pretty(&last).context("Failed to serialize run report")?;
        println!("{json}");
        return Ok(());
    }

    let report = &last.report;
    ui::header("Last run");
    ui::kv("config", &last.config.display().to_string());
    ui::kv("started", &report.started_at().to_rfc3339());
    let elapsed = report.finished_at() - report.started_at();
    ui::kv("duration", &format!("{}ms", elapsed.num_milliseconds()));
    if report.dry_run() {
        ui::kv("mode", "dry run");
    }

    if !ctx.quiet {
        println!();
        for resource in report.resources() {
            match outcome_line(&resource.id, &resource.outcome) {
                Some(line) => println!("{line}"),
                None if ctx.verbose > 0 => ui::dim(&format!("{} up to date", resource.id)),
                None => {}
            }
        }
        for record in report.notifications() {
            println!("{}", notification_line(record));
        }
    }

    print_summary(report, last.error.as_deref());
    if last.error.is_some() {
        println!();
        ui::warn("The last run was aborted; fix the cause and re-run `provision apply`");
    }
    Ok(())
}
