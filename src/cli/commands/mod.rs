//! CLI command implementations
//!
//! Each command is implemented in its own submodule.

pub mod build;
pub mod buildone;
pub mod info;
pub mod list;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Subcommand;
use tracing::{debug, warn};

use crate::cli::frontend::TerminalFrontend;
use crate::cli::GlobalArgs;
use crate::core::config::{is_terminal_interactive, CmdlineOverrides, Config};
use crate::core::graph::ModuleGraph;
use crate::core::module::Module;
use crate::core::moduleset;
use crate::core::orchestrator::{BuildOrchestrator, BuildReport};
use crate::core::packagedb::PackageDatabase;
use crate::modtypes::AdapterRegistry;

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build modules and everything they depend on
    Build {
        /// Modules to build (defaults to the configured list)
        modules: Vec<String>,

        /// Run make clean before building
        #[arg(short, long)]
        clean: bool,

        /// Do not access the network
        #[arg(short = 'n', long)]
        no_network: bool,

        /// Treat these modules as already installed (comma separated)
        #[arg(short, long)]
        skip: Vec<String>,

        /// Start building at this module, skipping earlier ones
        #[arg(short = 't', long)]
        start_at: Option<String>,

        /// Build even if the policy says the module is up to date
        #[arg(short, long)]
        force: bool,

        /// Target architecture for msvc modules
        #[arg(short = 'm', long)]
        arch: Option<String>,
    },

    /// Build only the named modules, ignoring dependencies
    Buildone {
        /// Modules to build
        #[arg(required = true)]
        modules: Vec<String>,

        /// Run make clean before building
        #[arg(short, long)]
        clean: bool,

        /// Do not access the network
        #[arg(short = 'n', long)]
        no_network: bool,

        /// Build even if the policy says the module is up to date
        #[arg(short, long)]
        force: bool,

        /// Target architecture for msvc modules
        #[arg(short = 'm', long)]
        arch: Option<String>,
    },

    /// Show information about modules
    Info {
        /// Modules to describe (defaults to every module)
        modules: Vec<String>,
    },

    /// Print the build order
    List {
        /// Modules to resolve (defaults to the configured list)
        modules: Vec<String>,

        /// Also list modules left out by the skip list
        #[arg(long)]
        show_skipped: bool,
    },
}

impl Commands {
    /// Execute the command
    pub async fn run(self, global: &GlobalArgs) -> Result<()> {
        match self {
            Self::Build {
                modules,
                clean,
                no_network,
                skip,
                start_at,
                force,
                arch,
            } => {
                let overrides = CmdlineOverrides {
                    clean,
                    nonetwork: no_network,
                    skip,
                    force,
                    arch,
                    ..global.overrides()
                };
                build::execute(global, overrides, &modules, start_at.as_deref()).await
            }
            Self::Buildone {
                modules,
                clean,
                no_network,
                force,
                arch,
            } => {
                let overrides = CmdlineOverrides {
                    clean,
                    nonetwork: no_network,
                    force,
                    arch,
                    ..global.overrides()
                };
                buildone::execute(global, overrides, &modules).await
            }
            Self::Info { modules } => info::execute(global, &modules).await,
            Self::List {
                modules,
                show_skipped,
            } => list::execute(global, &modules, show_skipped).await,
        }
    }
}

impl GlobalArgs {
    /// Overrides implied by the global options alone
    pub fn overrides(&self) -> CmdlineOverrides {
        CmdlineOverrides {
            quiet: self.quiet,
            moduleset: self.moduleset.clone(),
            ..CmdlineOverrides::default()
        }
    }
}

/// Configuration, module graph and adapters for one command
#[derive(Debug)]
pub struct Session {
    pub config: Config,
    pub graph: ModuleGraph,
    pub registry: AdapterRegistry,
}

impl Session {
    /// Load the configuration and its module set
    pub fn load(global: &GlobalArgs, overrides: CmdlineOverrides) -> Result<Self> {
        let mut config =
            Config::load(global.config.as_deref()).context("Failed to load configuration")?;
        config.apply_overrides(overrides);
        if config.interact && !is_terminal_interactive() {
            debug!("stdin is not a terminal, disabling interactive recovery");
            config.interact = false;
        }

        let Some(path) = config.moduleset_path() else {
            bail!("No module set configured; pass --moduleset or set 'moduleset' in the configuration");
        };
        let registry = AdapterRegistry::with_defaults();
        let graph = moduleset::load(&path, &registry)
            .with_context(|| format!("Failed to load module set {}", path.display()))?;

        Ok(Self {
            config,
            graph,
            registry,
        })
    }

    /// Names given on the command line, else the configured list, else all
    pub fn requested(&self, names: &[String]) -> Vec<String> {
        if !names.is_empty() {
            return names.to_vec();
        }
        if !self.config.modules.is_empty() {
            return self.config.modules.clone();
        }
        self.graph.modules().iter().map(|m| m.name.clone()).collect()
    }

    /// Split `names` into known modules and unknown names
    pub fn partition_known(&self, names: Vec<String>) -> (Vec<String>, Vec<String>) {
        names
            .into_iter()
            .partition(|name| self.graph.get_module(name, false).is_ok())
    }

    pub fn open_packagedb(&self) -> Result<PackageDatabase> {
        let path = self.config.packagedb_path();
        PackageDatabase::open(&path)
            .with_context(|| format!("Failed to open package database {}", path.display()))
    }
}

/// Run the orchestrator on a blocking thread with Ctrl-C handling
///
/// The first interrupt makes a waiting recovery prompt give up on its
/// module; a second one exits.
pub async fn run_build(session: Session, modules: Vec<Module>) -> Result<BuildReport> {
    let packagedb = session.open_packagedb()?;
    let Session {
        config, registry, ..
    } = session;

    let interrupted = Arc::new(AtomicBool::new(false));
    let frontend = TerminalFrontend::new(modules.len(), &config, Arc::clone(&interrupted));
    let watcher = tokio::spawn(watch_interrupts(interrupted));

    let report = tokio::task::spawn_blocking(move || {
        let mut frontend = frontend;
        let mut orchestrator = BuildOrchestrator::new(config, registry, packagedb);
        orchestrator.run(&modules, &mut frontend)
    })
    .await
    .context("Build thread panicked")?;

    watcher.abort();
    Ok(report)
}

async fn watch_interrupts(flag: Arc<AtomicBool>) {
    let mut count = 0;
    while tokio::signal::ctrl_c().await.is_ok() {
        count += 1;
        if count > 1 {
            eprintln!("Interrupted");
            std::process::exit(130);
        }
        warn!("Interrupt received; press Ctrl-C again to exit");
        flag.store(true, Ordering::SeqCst);
    }
}

/// Turn a finished run into the command result
pub fn finish(report: &BuildReport, unknown: &[String]) -> Result<()> {
    if !unknown.is_empty() {
        bail!("Unknown module(s): {}", unknown.join(", "));
    }
    if !report.success() {
        bail!(
            "{} module(s) failed to build: {}",
            report.failures.len(),
            report.failures.join(", ")
        );
    }
    Ok(())
}
