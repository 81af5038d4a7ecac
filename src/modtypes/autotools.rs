//! Autotools modules: `autogen.sh`/`configure`, then make

use std::path::Path;

use crate::config::defaults::DEFAULT_AUTOGEN_SH;
use crate::core::config::Config;
use crate::core::module::Module;
use crate::core::phase::{Phase, PhaseSpec};
use crate::error::CommandError;
use crate::infra::process::{program_of, require_tool};

use super::{prepare_builddir, quote, require_srcdir, source, ModuleTypeAdapter, PhaseContext};

pub(crate) const PHASES: &[PhaseSpec] = &[
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
pub struct AutotoolsAdapter;

impl ModuleTypeAdapter for AutotoolsAdapter {
    fn type_name(&self) -> &'static str {
        "autotools"
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
            Phase::Configure => {
                let srcdir = require_srcdir(module, ctx.config)?;
                let builddir = prepare_builddir(self, module, ctx.config)?;
                let command = configure_command(module, ctx.config, &srcdir)?;
                ctx.run(module, &command, &builddir)
            }
            Phase::Build => self.make(module, ctx, &makeargs(module, ctx.config)),
            Phase::Check => self.make(module, ctx, "check"),
            Phase::Install => {
                let args = module.param("makeinstallargs").unwrap_or("install");
                self.make(module, ctx, args)
            }
            Phase::Clean => self.make(module, ctx, "clean"),
        }
    }
}

impl AutotoolsAdapter {
    fn make(&self, module: &Module, ctx: &PhaseContext<'_>, args: &str) -> Result<(), CommandError> {
        let make = &ctx.config.make_command;
        require_tool(program_of(make))?;
        let builddir = prepare_builddir(self, module, ctx.config)?;
        ctx.run(module, &join_args(&[make.as_str(), args]), &builddir)
    }
}

/// Command line for the configure phase
///
/// Uses the module's `autogen_sh` parameter, falling back to `configure`
/// when the default `autogen.sh` is absent.
pub fn configure_command(
    module: &Module,
    config: &Config,
    srcdir: &Path,
) -> Result<String, CommandError> {
    let script = match module.param("autogen_sh") {
        Some(script) => srcdir.join(script),
        None => {
            let autogen = srcdir.join(DEFAULT_AUTOGEN_SH);
            let configure = srcdir.join("configure");
            if !autogen.exists() && configure.exists() {
                configure
            } else {
                autogen
            }
        }
    };
    if !script.is_file() {
        return Err(CommandError::new(format!(
            "Configure script {} not found",
            script.display()
        )));
    }

    let script = quote(&script);
    let prefix = format!("--prefix={}", quote(&config.prefix));
    Ok(join_args(&[
        script.as_str(),
        prefix.as_str(),
        module.param("autogenargs").unwrap_or(""),
        config.autogenargs_for(&module.name).unwrap_or(""),
    ]))
}

/// Global, per-module config and module-set `makeargs`, in that order
pub fn makeargs(module: &Module, config: &Config) -> String {
    join_args(&[
        config.makeargs_for(&module.name),
        module.param("makeargs").unwrap_or(""),
    ])
}

/// Join non-empty pieces of a command line
pub(crate) fn join_args(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
