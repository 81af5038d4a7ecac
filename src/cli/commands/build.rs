//! Build command implementation
//!
//! Implements `modbuild build`: resolve the requested modules with their
//! dependencies and build them in order.

use anyhow::{bail, Result};
use tracing::info;

use crate::cli::commands::{finish, run_build, Session};
use crate::cli::output::status;
use crate::cli::GlobalArgs;
use crate::core::config::CmdlineOverrides;
use crate::core::graph::ModuleGraph;
use crate::core::module::Module;
use crate::core::orchestrator::BuildReport;

/// Execute the build command
pub async fn execute(
    global: &GlobalArgs,
    overrides: CmdlineOverrides,
    names: &[String],
    start_at: Option<&str>,
) -> Result<()> {
    let session = Session::load(global, overrides)?;
    let config = &session.config;

    let (known, unknown) = session.partition_known(session.requested(names));
    for name in &unknown {
        eprintln!("{} Unknown module: {name}", status::ERROR);
    }
    if known.is_empty() && !unknown.is_empty() {
        bail!("Unknown module(s): {}", unknown.join(", "));
    }

    let include_suggests = config.include_suggests();
    let order = session
        .graph
        .resolve(&known, &config.skip, include_suggests)?;
    let order = ModuleGraph::remove_tag_modules(order, &config.tags);
    let order = apply_start_at(order, start_at)?;

    let skipped = session
        .graph
        .skipped_dependencies(&known, &config.skip, include_suggests);
    if !skipped.is_empty() && !config.quiet_mode {
        println!("{} Skipping: {}", status::INFO, skipped.join(", "));
    }

    if order.is_empty() {
        info!("nothing to do");
        println!("{} nothing to do", status::INFO);
        return finish(&BuildReport::default(), &unknown);
    }

    let modules: Vec<Module> = order.into_iter().cloned().collect();
    let report = run_build(session, modules).await?;
    finish(&report, &unknown)
}

/// Drop modules before `start_at`
pub fn apply_start_at<'a>(order: Vec<&'a Module>, start_at: Option<&str>) -> Result<Vec<&'a Module>> {
    let Some(start) = start_at else {
        return Ok(order);
    };
    let Some(pos) = order.iter().position(|m| m.name == start) else {
        bail!("Module '{start}' is not in the list of modules to build");
    };
    Ok(order.into_iter().skip(pos).collect())
}
