//! `provision apply` - converge this node

use anyhow::Result;

use super::node::Node;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{self, ApplyOptions, ApplyOutcome, RunInput};
use crate::paths;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let node = Node::load(args.config.as_deref())?;
    let graph = node.graph()?;
    let state_dir = paths::state_dir()?;

    let opts = ApplyOptions {
        dry_run: args.dry_run,
        yes: args.yes,
        json: args.json,
        verbose: ctx.verbose > 0,
        quiet: ctx.quiet,
    };
    let input = RunInput {
        graph: &graph,
        attributes: &node.attributes,
        discovery: &node.discovery,
        config_path: &node.config_path,
    };

    match engine::execute(&input, &state_dir, &opts)? {
        ApplyOutcome::Converged(report) => {
            log::info!("Converged {} resources", report.resources().len());
        }
        ApplyOutcome::Previewed(_) | ApplyOutcome::Aborted => {}
    }
    Ok(())
}
