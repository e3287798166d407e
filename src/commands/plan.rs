//! `provision plan` - show pending changes without applying them

use anyhow::{Context as AnyhowContext, Result};
use converge::{ExecuteOptions, NoProgress};

use super::node::Node;
use crate::Context;
use crate::cli::PlanArgs;
use crate::engine::differ::display_plan;
use crate::ui;

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let node = Node::load(args.config.as_deref())?;
    let graph = node.graph()?;

    if !ctx.quiet {
        ui::header(&format!(
            "Plan for {}",
            node.attributes.hostname().unwrap_or("this node")
        ));
        ui::kv("config", &node.config_path.display().to_string());
        ui::kv("root", &node.env.root().display().to_string());
        ui::kv("resources", &graph.len().to_string());
    }

    let opts = ExecuteOptions {
        dry_run: true,
        verbose: ctx.verbose > 0,
    };
    let preview = converge::run(&graph, &node.attributes, &node.discovery, &opts, &mut NoProgress)
        .map_err(|failure| anyhow::Error::new(failure.error))
        .context("Failed to plan the run")?;

    display_plan(&preview, &graph, true);

    let pending = preview.summary().would_change;
    println!();
    if pending == 0 {
        ui::success("Node is converged");
    } else {
        ui::info(&format!("{pending} resources would change; run `provision apply` to converge"));
    }
    Ok(())
}
