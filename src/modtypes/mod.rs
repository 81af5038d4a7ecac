//! Module type adapters
//!
//! Each module type (autotools, cmake, msvc, meta) declares its phase table
//! and knows how to run each phase with native tools. The orchestrator only
//! sees the [`ModuleTypeAdapter`] trait; adapters are looked up by type tag
//! in an [`AdapterRegistry`].

pub mod autotools;
pub mod cmake;
pub mod meta;
pub mod msvc;
pub mod source;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::build_env::BuildEnvironment;
use crate::core::config::Config;
use crate::core::module::Module;
use crate::core::phase::{Phase, PhaseSpec};
use crate::error::CommandError;
use crate::infra::filesystem;
use crate::infra::process::CommandRunner;

/// Everything a phase body needs besides the module itself
#[derive(Debug, Clone, Copy)]
pub struct PhaseContext<'a> {
    pub config: &'a Config,
    pub runner: &'a CommandRunner,
}

impl<'a> PhaseContext<'a> {
    pub fn new(config: &'a Config, runner: &'a CommandRunner) -> Self {
        Self { config, runner }
    }

    /// Environment overlay for one of the module's commands
    pub fn env(&self, module: &Module) -> BuildEnvironment {
        BuildEnvironment::for_module(self.config, &module.name)
    }

    /// Run a command for `module` in `cwd`
    pub fn run(&self, module: &Module, command: &str, cwd: &Path) -> Result<(), CommandError> {
        self.runner.execute(command, cwd, &self.env(module))
    }
}

/// Behaviour of one module type
pub trait ModuleTypeAdapter: Send + Sync {
    /// Type tag used in module sets
    fn type_name(&self) -> &'static str;

    /// Static phase table
    fn phases(&self) -> &'static [PhaseSpec];

    /// Run one phase
    fn run_phase(
        &self,
        phase: Phase,
        module: &Module,
        ctx: &PhaseContext<'_>,
    ) -> Result<(), CommandError>;

    /// Token that changes whenever the module's sources change
    fn freshness(&self, module: &Module, ctx: &PhaseContext<'_>) -> Option<String> {
        source::freshness(module, ctx)
    }

    /// Directory builds run in
    fn builddir(&self, module: &Module, config: &Config) -> Option<PathBuf> {
        default_builddir(module, config)
    }

    /// Check type-specific parameters at load time
    fn validate(&self, _module: &Module) -> Result<(), String> {
        Ok(())
    }

    /// Whether a successful install is recorded in the package database
    fn records_install(&self) -> bool {
        true
    }
}

/// Builds under `buildroot` when set, otherwise in the source tree
pub fn default_builddir(module: &Module, config: &Config) -> Option<PathBuf> {
    let srcdir = source::srcdir(module, config)?;
    match &config.buildroot {
        Some(root) => {
            let name = srcdir.file_name().map_or_else(
                || PathBuf::from(&module.name),
                PathBuf::from,
            );
            Some(root.join(name))
        }
        None => Some(srcdir),
    }
}

/// Source directory of a module that must have one
pub fn require_srcdir(module: &Module, config: &Config) -> Result<PathBuf, CommandError> {
    source::srcdir(module, config)
        .ok_or_else(|| CommandError::new(format!("{} has no source", module.name)))
}

/// Build directory for `module`, created if missing
pub fn prepare_builddir(
    adapter: &dyn ModuleTypeAdapter,
    module: &Module,
    config: &Config,
) -> Result<PathBuf, CommandError> {
    let dir = adapter
        .builddir(module, config)
        .ok_or_else(|| CommandError::new(format!("{} has no build directory", module.name)))?;
    filesystem::create_dir_all(&dir).map_err(|e| CommandError::new(e.to_string()))?;
    Ok(dir)
}

/// Quote a path for a shell command line
pub fn quote(path: &Path) -> String {
    format!("\"{}\"", path.display())
}

/// Quote a value from the module set as a single literal shell word
#[cfg(not(windows))]
pub fn quote_arg(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Quote a value from the module set as a single literal shell word
#[cfg(windows)]
pub fn quote_arg(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Adapters keyed by type tag
pub struct AdapterRegistry {
    adapters: BTreeMap<String, Box<dyn ModuleTypeAdapter>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.adapters.keys()).finish()
    }
}

impl AdapterRegistry {
    /// Registry with no adapters
    pub fn empty() -> Self {
        Self {
            adapters: BTreeMap::new(),
        }
    }

    /// Registry with every built-in module type
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(autotools::AutotoolsAdapter));
        registry.register(Box::new(cmake::CmakeAdapter));
        registry.register(Box::new(msvc::MsvcAdapter));
        registry.register(Box::new(meta::MetaAdapter));
        registry
    }

    /// Add or replace an adapter
    pub fn register(&mut self, adapter: Box<dyn ModuleTypeAdapter>) {
        self.adapters.insert(adapter.type_name().to_string(), adapter);
    }

    pub fn get(&self, type_name: &str) -> Option<&dyn ModuleTypeAdapter> {
        self.adapters.get(type_name).map(AsRef::as_ref)
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
