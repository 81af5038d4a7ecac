//! List command implementation
//!
//! Implements `modbuild list`: print the resolved build order.

use anyhow::Result;

use crate::cli::commands::Session;
use crate::cli::output::OutputConfig;
use crate::cli::GlobalArgs;
use crate::core::graph::ModuleGraph;

/// Execute the list command
pub async fn execute(global: &GlobalArgs, names: &[String], show_skipped: bool) -> Result<()> {
    let session = Session::load(global, global.overrides())?;
    let config = &session.config;
    let requested = session.requested(names);
    let include_suggests = config.include_suggests();

    let order = session
        .graph
        .resolve(&requested, &config.skip, include_suggests)?;
    let order: Vec<&str> = ModuleGraph::remove_tag_modules(order, &config.tags)
        .into_iter()
        .map(|m| m.name.as_str())
        .collect();
    let skipped = if show_skipped {
        session
            .graph
            .skipped_dependencies(&requested, &config.skip, include_suggests)
    } else {
        Vec::new()
    };

    if OutputConfig::global().json {
        let value = serde_json::json!({ "modules": order, "skipped": skipped });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    for name in &order {
        println!("{name}");
    }
    for name in &skipped {
        println!("{name} (skipped)");
    }
    Ok(())
}
