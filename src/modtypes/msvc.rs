//! Visual Studio solutions built with msbuild

use crate::core::module::Module;
use crate::core::phase::{Phase, PhaseSpec};
use crate::error::CommandError;
use crate::infra::process::{program_of, require_tool};

use super::autotools::join_args;
use super::{quote, require_srcdir, source, ModuleTypeAdapter, PhaseContext};

const PHASES: &[PhaseSpec] = &[
    PhaseSpec::new(Phase::Checkout),
    PhaseSpec::new(Phase::ForceCheckout).confirm(),
    PhaseSpec::new(Phase::Build)
        .depends(&[Phase::Checkout])
        .on_error(&[Phase::ForceCheckout]),
    PhaseSpec::new(Phase::Install).depends(&[Phase::Build]),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct MsvcAdapter;

impl ModuleTypeAdapter for MsvcAdapter {
    fn type_name(&self) -> &'static str {
        "msvc"
    }

    fn phases(&self) -> &'static [PhaseSpec] {
        PHASES
    }

    fn run_phase(
        &self,
        phase: Phase,
        module: &Module,
        ctx: &PhaseContext<'_>,
    ) -> Result<(), CommandError> {
        match phase {
            Phase::Checkout => source::checkout(module, ctx, false),
            Phase::ForceCheckout => source::checkout(module, ctx, true),
            Phase::Build => {
                let srcdir = require_srcdir(module, ctx.config)?;
                let command = build_command(module, ctx)?;
                require_tool(program_of(&command))?;
                ctx.run(module, &command, &srcdir)
            }
            // The solution's own build step installs; nothing to run here
            Phase::Install => Ok(()),
            other => Err(CommandError::new(format!(
                "msvc modules have no {other} phase"
            ))),
        }
    }

    fn validate(&self, module: &Module) -> Result<(), String> {
        match module.param("solution") {
            Some(solution) if !solution.trim().is_empty() => Ok(()),
            _ => Err("msvc modules need a 'solution' parameter".to_string()),
        }
    }
}

/// msbuild command line for the module's solution
pub fn build_command(module: &Module, ctx: &PhaseContext<'_>) -> Result<String, CommandError> {
    let solution = module
        .param("solution")
        .ok_or_else(|| CommandError::new(format!("{} has no solution", module.name)))?;
    let solution = quote(&require_srcdir(module, ctx.config)?.join(solution));
    let platform = format!("/p:Platform={}", ctx.config.arch);
    Ok(join_args(&[
        ctx.config.msbuild.as_str(),
        solution.as_str(),
        platform.as_str(),
        module.param("msvcargs").unwrap_or(""),
    ]))
}
