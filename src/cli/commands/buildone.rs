//! Buildone command implementation
//!
//! Implements `modbuild buildone`: build exactly the named modules, without
//! their dependencies.

use anyhow::{bail, Result};

use crate::cli::commands::{finish, run_build, Session};
use crate::cli::output::status;
use crate::cli::GlobalArgs;
use crate::core::config::CmdlineOverrides;
use crate::core::module::Module;

/// Execute the buildone command
pub async fn execute(
    global: &GlobalArgs,
    overrides: CmdlineOverrides,
    names: &[String],
) -> Result<()> {
    let session = Session::load(global, overrides)?;

    let mut modules: Vec<Module> = Vec::new();
    for name in names {
        match session.graph.get_module(name, true) {
            Ok(module) => {
                if !modules.iter().any(|m| m.name == module.name) {
                    modules.push(module.clone());
                }
            }
            Err(e) => eprintln!("{} {e}, ignoring", status::WARNING),
        }
    }
    if modules.is_empty() {
        bail!("No modules to build");
    }

    let report = run_build(session, modules).await?;
    finish(&report, &[])
}
