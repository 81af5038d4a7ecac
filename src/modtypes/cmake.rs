//! CMake modules
//!
//! Configures out of tree. Without a `buildroot` the build directory is
//! `_build` inside the source tree.

use std::path::PathBuf;

use crate::core::config::Config;
use crate::core::module::Module;
use crate::core::phase::{Phase, PhaseSpec};
use crate::error::CommandError;
use crate::infra::process::{program_of, require_tool};

use super::autotools::join_args;
use super::{
    default_builddir, prepare_builddir, quote, require_srcdir, source, ModuleTypeAdapter,
    PhaseContext,
};

const PHASES: &[PhaseSpec] = &[
    PhaseSpec::new(Phase::Checkout),
    PhaseSpec::new(Phase::ForceCheckout).confirm(),
    PhaseSpec::new(Phase::Configure)
        .depends(&[Phase::Checkout])
        .on_error(&[Phase::ForceCheckout]),
    PhaseSpec::new(Phase::Build)
        .depends(&[Phase::Configure])
        .on_error(&[Phase::ForceCheckout, Phase::Configure]),
    PhaseSpec::new(Phase::Check)
        .depends(&[Phase::Build])
        .on_error(&[Phase::Configure, Phase::ForceCheckout]),
    PhaseSpec::new(Phase::Install).depends(&[Phase::Build]),
    PhaseSpec::new(Phase::Clean)
        .depends(&[Phase::Configure])
        .on_error(&[Phase::ForceCheckout, Phase::Configure]),
];

#[derive(Debug, Default, Clone, Copy)]
pub struct CmakeAdapter;

impl ModuleTypeAdapter for CmakeAdapter {
    fn type_name(&self) -> &'static str {
        "cmake"
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
        let cmake = ctx.config.cmake_command.as_str();
        let command = match phase {
            Phase::Checkout => return source::checkout(module, ctx, false),
            Phase::ForceCheckout => return source::checkout(module, ctx, true),
            Phase::Configure => configure_command(module, ctx.config)?,
            Phase::Build => format!("{cmake} --build . --parallel {}", ctx.config.jobs),
            Phase::Check => "ctest --output-on-failure".to_string(),
            Phase::Install => format!("{cmake} --install ."),
            Phase::Clean => format!("{cmake} --build . --target clean"),
        };

        require_tool(program_of(&command))?;
        let builddir = prepare_builddir(self, module, ctx.config)?;
        ctx.run(module, &command, &builddir)
    }

    fn builddir(&self, module: &Module, config: &Config) -> Option<PathBuf> {
        if config.buildroot.is_some() {
            return default_builddir(module, config);
        }
        source::srcdir(module, config).map(|dir| dir.join("_build"))
    }
}

/// Command line for the configure phase
pub fn configure_command(module: &Module, config: &Config) -> Result<String, CommandError> {
    let srcdir = quote(&require_srcdir(module, config)?);
    let prefix = format!("-DCMAKE_INSTALL_PREFIX={}", quote(&config.prefix));
    Ok(join_args(&[
        config.cmake_command.as_str(),
        prefix.as_str(),
        module.param("cmakeargs").unwrap_or(""),
        config.cmakeargs_for(&module.name).unwrap_or(""),
        srcdir.as_str(),
    ]))
}
