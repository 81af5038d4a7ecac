//! Build orchestration
//!
//! Walks a resolved module order one module at a time. For each module it
//! checks hard dependencies, asks the build policy whether work is needed,
//! then drives the module's phase state machine through its adapter. Phase
//! failures go through the recovery protocol: automatic configure and
//! force-checkout retries first, then the frontend. Successful installs are
//! recorded in the package database.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::core::config::Config;
use crate::core::frontend::{Frontend, RecoveryChoice, RecoveryDecision, RecoveryRequest};
use crate::core::module::Module;
use crate::core::packagedb::PackageDatabase;
use crate::core::phase::{ModuleOutcome, Phase, PhaseStateMachine, SkipReason};
use crate::error::{CommandError, ConfigError, PackageDbError};
use crate::infra::process::CommandRunner;
use crate::modtypes::{AdapterRegistry, PhaseContext};

/// Produces a fresh configuration from the active one
pub type ConfigReloader = Box<dyn FnMut(&Config) -> Result<Config, ConfigError> + Send>;

/// Result of one run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    /// Modules that ended Failed, in build order
    pub failures: Vec<String>,
    /// Terminal outcome of every module that was reached
    pub outcomes: Vec<(String, ModuleOutcome)>,
}

impl BuildReport {
    pub fn success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn outcome(&self, module: &str) -> Option<&ModuleOutcome> {
        self.outcomes
            .iter()
            .find(|(name, _)| name == module)
            .map(|(_, outcome)| outcome)
    }
}

/// Drives modules through their phases
pub struct BuildOrchestrator {
    config: Config,
    registry: AdapterRegistry,
    packagedb: PackageDatabase,
    reloader: Option<ConfigReloader>,
}

impl std::fmt::Debug for BuildOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuildOrchestrator")
            .field("registry", &self.registry)
            .field("packagedb", &self.packagedb.path())
            .finish_non_exhaustive()
    }
}

impl BuildOrchestrator {
    pub fn new(config: Config, registry: AdapterRegistry, packagedb: PackageDatabase) -> Self {
        Self {
            config,
            registry,
            packagedb,
            reloader: None,
        }
    }

    /// Replace the default reloader, which re-reads the config file
    #[must_use]
    pub fn with_reloader(mut self, reloader: ConfigReloader) -> Self {
        self.reloader = Some(reloader);
        self
    }

    /// Configuration used for the next module
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn packagedb(&self) -> &PackageDatabase {
        &self.packagedb
    }

    /// Swap in a freshly loaded configuration
    ///
    /// Affects targets, policy and flags of modules started afterwards; a
    /// module's phase plan is fixed once it starts.
    pub fn reload_config(&mut self) -> Result<(), ConfigError> {
        let config = match self.reloader.as_mut() {
            Some(reload) => reload(&self.config)?,
            None => self.config.reload()?,
        };
        self.config = config;
        info!("Configuration reloaded");
        Ok(())
    }

    /// Build `modules` in the given order
    pub fn run(&mut self, modules: &[Module], frontend: &mut dyn Frontend) -> BuildReport {
        let mut report = BuildReport::default();
        let mut finished: HashMap<String, ModuleOutcome> = HashMap::new();
        let mut rebuilt: HashSet<String> = HashSet::new();

        for module in modules {
            frontend.start_module(&module.name);
            let outcome = self.build_module(module, &finished, &rebuilt, frontend);
            debug!("{} finished: {}", module.name, outcome.label());

            if outcome == ModuleOutcome::Failed {
                report.failures.push(module.name.clone());
            }
            if outcome == ModuleOutcome::Success {
                rebuilt.insert(module.name.clone());
            }
            frontend.end_module(&module.name, &outcome);
            finished.insert(module.name.clone(), outcome.clone());
            report.outcomes.push((module.name.clone(), outcome));

            if self.config.exit_on_error && !report.failures.is_empty() {
                warn!("Stopping after failure of {}", module.name);
                break;
            }
        }

        frontend.end_build(&report.failures);
        report
    }

    fn build_module(
        &mut self,
        module: &Module,
        finished: &HashMap<String, ModuleOutcome>,
        rebuilt: &HashSet<String>,
        frontend: &mut dyn Frontend,
    ) -> ModuleOutcome {
        if let Some(dep) = blocking_dependency(module, finished) {
            frontend.message(
                &format!("Skipping {} since dependency {dep} failed", module.name),
                Some(&module.name),
            );
            return ModuleOutcome::Skipped(SkipReason::DependencyFailed(dep.to_string()));
        }

        let Some(adapter) = self.registry.get(&module.module_type) else {
            frontend.message(
                &format!("Unknown module type '{}'", module.module_type),
                Some(&module.name),
            );
            return ModuleOutcome::Failed;
        };

        let policy = self.config.policy();
        let force = policy.rebuild_for_dependencies()
            && module.depends.iter().any(|dep| rebuilt.contains(dep));
        let runner = self.runner();
        let freshness = adapter.freshness(module, &PhaseContext::new(&self.config, &runner));
        if !policy.needs_build(freshness.as_deref(), self.packagedb.get(&module.name), force) {
            frontend.message(
                &format!("Skipping {} (up to date)", module.name),
                Some(&module.name),
            );
            return ModuleOutcome::Skipped(SkipReason::UpToDate);
        }

        let mut machine = PhaseStateMachine::new(
            adapter.phases(),
            &self.config.build_targets,
            &self.config.skip_phases(),
        );
        debug!("{} plan: {:?}", module.name, machine.plan());

        while let Some(phase) = machine.current() {
            frontend.set_action(phase.action_label(), &module.name);
            match self.run_phase(phase, module) {
                Ok(()) => machine.succeed(),
                Err(PhaseFailure::Record(error)) => {
                    frontend.message(
                        &format!("Failed to record install of {}: {error}", module.name),
                        Some(&module.name),
                    );
                    machine.apply(&RecoveryDecision::Fail);
                }
                Err(PhaseFailure::Command(error)) => {
                    frontend.message(
                        &format!("Error during phase {phase} of {}: {error}", module.name),
                        Some(&module.name),
                    );
                    if !error.output.is_empty() {
                        frontend.message(error.output.trim_end(), Some(&module.name));
                    }
                    let decision = self.recover(&mut machine, phase, module, &error, frontend);
                    info!("{}: {decision} after {phase} failed", module.name);
                    machine.apply(&decision);
                }
            }
        }

        machine.outcome().cloned().unwrap_or(ModuleOutcome::Failed)
    }

    /// Run one phase body; a successful install is recorded
    fn run_phase(&mut self, phase: Phase, module: &Module) -> Result<(), PhaseFailure> {
        let adapter = self.registry.get(&module.module_type).ok_or_else(|| {
            CommandError::new(format!("Unknown module type '{}'", module.module_type))
        })?;
        let runner = self.runner();
        let ctx = PhaseContext::new(&self.config, &runner);
        adapter.run_phase(phase, module, &ctx)?;

        if phase == Phase::Install && adapter.records_install() {
            let token = adapter.freshness(module, &ctx).unwrap_or_default();
            self.packagedb.add(&module.name, &token, Utc::now())?;
        }
        Ok(())
    }

    /// Pick the recovery decision for a failed phase
    fn recover(
        &mut self,
        machine: &mut PhaseStateMachine,
        phase: Phase,
        module: &Module,
        error: &CommandError,
        frontend: &mut dyn Frontend,
    ) -> RecoveryDecision {
        if let Some(decision) = machine.automatic_recovery(phase, self.config.trycheckout) {
            frontend.message(
                &format!("Automatic recovery: {decision}"),
                Some(&module.name),
            );
            return decision;
        }
        if !self.config.interact {
            return RecoveryDecision::Fail;
        }

        let request = RecoveryRequest {
            module: module.name.clone(),
            phase,
            next_phase: machine.next_phase(),
            error: error.to_string(),
            choices: recovery_choices(machine, phase),
            builddir: self.builddir(module),
        };
        loop {
            match frontend.handle_error(&request) {
                RecoveryDecision::Reload => match self.reload_config() {
                    Ok(()) => frontend.message("Configuration reloaded", None),
                    Err(e) => frontend.message(&format!("Failed to reload configuration: {e}"), None),
                },
                decision => return decision,
            }
        }
    }

    fn builddir(&self, module: &Module) -> Option<PathBuf> {
        self.registry
            .get(&module.module_type)
            .and_then(|adapter| adapter.builddir(module, &self.config))
    }

    fn runner(&self) -> CommandRunner {
        CommandRunner::new()
            .with_capture(self.config.quiet_mode)
            .with_print_pattern(&self.config.print_command_pattern)
    }
}

/// Why a phase did not complete
///
/// Only command failures go through recovery; a lost install record fails
/// the module outright.
#[derive(Debug)]
enum PhaseFailure {
    Command(CommandError),
    Record(PackageDbError),
}

impl From<CommandError> for PhaseFailure {
    fn from(error: CommandError) -> Self {
        Self::Command(error)
    }
}

impl From<PackageDbError> for PhaseFailure {
    fn from(error: PackageDbError) -> Self {
        Self::Record(error)
    }
}

/// First hard dependency that failed or was itself blocked
fn blocking_dependency<'a>(
    module: &'a Module,
    finished: &HashMap<String, ModuleOutcome>,
) -> Option<&'a str> {
    module
        .depends
        .iter()
        .find(|dep| {
            matches!(
                finished.get(dep.as_str()),
                Some(ModuleOutcome::Failed | ModuleOutcome::Skipped(SkipReason::DependencyFailed(_)))
            )
        })
        .map(String::as_str)
}

/// Menu offered for a failure of `phase`
pub fn recovery_choices(machine: &PhaseStateMachine, phase: Phase) -> Vec<RecoveryChoice> {
    let plain = |decision| RecoveryChoice {
        decision,
        needs_confirmation: false,
    };

    let mut choices = vec![plain(RecoveryDecision::Rerun)];
    if machine.next_phase().is_some() {
        choices.push(plain(RecoveryDecision::Continue));
    }
    choices.push(plain(RecoveryDecision::Fail));
    for target in machine.error_phases(phase) {
        choices.push(RecoveryChoice {
            decision: RecoveryDecision::Goto(*target),
            needs_confirmation: machine.needs_confirmation(*target),
        });
    }
    choices.push(plain(RecoveryDecision::Reload));
    choices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phase::PhaseSpec;
    use crate::modtypes::autotools;
    use crate::modtypes::ModuleTypeAdapter;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Adapter that records phases and fails on demand
    #[derive(Default, Clone)]
    struct ScriptedAdapter {
        log: Arc<Mutex<Vec<String>>>,
        /// (module, phase) -> remaining failures
        failures: Arc<Mutex<HashMap<(String, Phase), usize>>>,
        token: &'static str,
    }

    impl ScriptedAdapter {
        fn new() -> Self {
            Self {
                token: "v1",
                ..Self::default()
            }
        }

        fn fail(&self, module: &str, phase: Phase, times: usize) {
            self.failures
                .lock()
                .unwrap()
                .insert((module.to_string(), phase), times);
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    impl ModuleTypeAdapter for ScriptedAdapter {
        fn type_name(&self) -> &'static str {
            "scripted"
        }

        fn phases(&self) -> &'static [PhaseSpec] {
            autotools::PHASES
        }

        fn run_phase(
            &self,
            phase: Phase,
            module: &Module,
            _ctx: &PhaseContext<'_>,
        ) -> Result<(), CommandError> {
            self.log.lock().unwrap().push(format!("{}:{phase}", module.name));
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(&(module.name.clone(), phase)) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(CommandError::exited("make", Some(2), String::new()));
                }
            }
            Ok(())
        }

        fn freshness(&self, _module: &Module, _ctx: &PhaseContext<'_>) -> Option<String> {
            Some(self.token.to_string())
        }
    }

    #[derive(Default)]
    struct ScriptedFrontend {
        decisions: VecDeque<RecoveryDecision>,
        requests: Vec<RecoveryRequest>,
        started: Vec<String>,
        messages: Vec<String>,
        finished: Option<Vec<String>>,
    }

    impl Frontend for ScriptedFrontend {
        fn message(&mut self, msg: &str, _module: Option<&str>) {
            self.messages.push(msg.to_string());
        }

        fn set_action(&mut self, _action: &str, _module: &str) {}

        fn start_module(&mut self, module: &str) {
            self.started.push(module.to_string());
        }

        fn handle_error(&mut self, request: &RecoveryRequest) -> RecoveryDecision {
            self.requests.push(request.clone());
            self.decisions.pop_front().unwrap_or(RecoveryDecision::Fail)
        }

        fn end_build(&mut self, failures: &[String]) {
            self.finished = Some(failures.to_vec());
        }
    }

    struct Fixture {
        _temp: TempDir,
        adapter: ScriptedAdapter,
        orchestrator: BuildOrchestrator,
    }

    fn fixture(config: &str) -> Fixture {
        let temp = TempDir::new().unwrap();
        let adapter = ScriptedAdapter::new();
        let mut registry = AdapterRegistry::empty();
        registry.register(Box::new(adapter.clone()));
        let db = PackageDatabase::open(temp.path().join("packagedb.toml")).unwrap();
        let config = Config::from_toml_str(config).unwrap();
        Fixture {
            _temp: temp,
            adapter,
            orchestrator: BuildOrchestrator::new(config, registry, db),
        }
    }

    fn modules() -> Vec<Module> {
        vec![
            Module::new("A", "scripted"),
            Module::new("B", "scripted").with_depends(&["A"]),
        ]
    }

    // ============ Unit Tests ============

    #[test]
    fn test_all_succeed_and_are_recorded() {
        let mut fx = fixture("interact = false\n");
        let mut frontend = ScriptedFrontend::default();
        let report = fx.orchestrator.run(&modules(), &mut frontend);

        assert!(report.success());
        assert_eq!(frontend.finished, Some(vec![]));
        assert_eq!(fx.orchestrator.packagedb().get("A").unwrap().version, "v1");
        assert!(fx.orchestrator.packagedb().get("B").is_some());
        assert_eq!(
            fx.adapter.log(),
            vec![
                "A:checkout", "A:configure", "A:build", "A:install",
                "B:checkout", "B:configure", "B:build", "B:install",
            ]
        );
    }

    #[test]
    fn test_failure_blocks_dependents() {
        let mut fx = fixture("interact = false\n");
        fx.adapter.fail("A", Phase::Build, 1);
        let mut frontend = ScriptedFrontend::default();
        let report = fx.orchestrator.run(&modules(), &mut frontend);

        assert_eq!(report.failures, vec!["A".to_string()]);
        assert_eq!(
            report.outcome("B"),
            Some(&ModuleOutcome::Skipped(SkipReason::DependencyFailed("A".into())))
        );
        assert!(fx.adapter.log().iter().all(|entry| !entry.starts_with("B:")));
        assert!(frontend.requests.is_empty());
        assert!(fx.orchestrator.packagedb().get("A").is_none());
    }

    #[test]
    fn test_blocked_transitively() {
        let mut fx = fixture("interact = false\n");
        fx.adapter.fail("A", Phase::Configure, 1);
        let mut mods = modules();
        mods.push(Module::new("C", "scripted").with_depends(&["B"]));
        let report = fx.orchestrator.run(&mods, &mut ScriptedFrontend::default());

        assert_eq!(report.failures, vec!["A".to_string()]);
        assert!(matches!(
            report.outcome("C"),
            Some(ModuleOutcome::Skipped(SkipReason::DependencyFailed(_)))
        ));
    }

    #[test]
    fn test_trycheckout_retries_configure_without_prompt() {
        let mut fx = fixture("trycheckout = true\n");
        fx.adapter.fail("A", Phase::Build, 1);
        let mut frontend = ScriptedFrontend::default();
        let report = fx.orchestrator.run(&modules()[..1], &mut frontend);

        assert!(report.success());
        assert!(frontend.requests.is_empty());
        assert_eq!(
            fx.adapter.log(),
            vec!["A:checkout", "A:configure", "A:build", "A:configure", "A:build", "A:install"]
        );
    }

    #[test]
    fn test_interactive_rerun() {
        let mut fx = fixture("");
        fx.adapter.fail("A", Phase::Configure, 1);
        let mut frontend = ScriptedFrontend {
            decisions: VecDeque::from([RecoveryDecision::Rerun]),
            ..ScriptedFrontend::default()
        };
        let report = fx.orchestrator.run(&modules()[..1], &mut frontend);

        assert!(report.success());
        let request = &frontend.requests[0];
        assert_eq!(request.phase, Phase::Configure);
        assert_eq!(request.next_phase, Some(Phase::Build));
        assert!(request.error.contains("exit code 2"));
        assert!(request.choices.contains(&RecoveryChoice {
            decision: RecoveryDecision::Goto(Phase::ForceCheckout),
            needs_confirmation: true,
        }));
        assert!(frontend
            .messages
            .iter()
            .any(|m| m.starts_with("Error during phase configure of A")));
    }

    #[test]
    fn test_continue_skips_failed_phase() {
        let mut fx = fixture("");
        fx.adapter.fail("A", Phase::Build, 1);
        let mut frontend = ScriptedFrontend {
            decisions: VecDeque::from([RecoveryDecision::Continue]),
            ..ScriptedFrontend::default()
        };
        let report = fx.orchestrator.run(&modules()[..1], &mut frontend);
        assert!(report.success());
        assert_eq!(fx.adapter.log().last().map(String::as_str), Some("A:install"));
    }

    #[test]
    fn test_up_to_date_module_is_skipped() {
        let mut fx = fixture("interact = false\n");
        fx.orchestrator
            .packagedb
            .add("A", "v1", Utc::now())
            .unwrap();
        let report = fx.orchestrator.run(&modules()[..1], &mut ScriptedFrontend::default());

        assert_eq!(
            report.outcome("A"),
            Some(&ModuleOutcome::Skipped(SkipReason::UpToDate))
        );
        assert!(fx.adapter.log().is_empty());
    }

    #[test]
    fn test_updated_deps_rebuilds_dependents() {
        let mut fx = fixture("interact = false\nbuild_policy = \"updated-deps\"\n");
        fx.orchestrator.packagedb.add("A", "v0", Utc::now()).unwrap();
        fx.orchestrator.packagedb.add("B", "v1", Utc::now()).unwrap();
        let report = fx.orchestrator.run(&modules(), &mut ScriptedFrontend::default());

        assert_eq!(report.outcome("A"), Some(&ModuleOutcome::Success));
        assert_eq!(report.outcome("B"), Some(&ModuleOutcome::Success));
    }

    #[test]
    fn test_updated_policy_keeps_current_dependents() {
        let mut fx = fixture("interact = false\n");
        fx.orchestrator.packagedb.add("A", "v0", Utc::now()).unwrap();
        fx.orchestrator.packagedb.add("B", "v1", Utc::now()).unwrap();
        let report = fx.orchestrator.run(&modules(), &mut ScriptedFrontend::default());

        assert_eq!(
            report.outcome("B"),
            Some(&ModuleOutcome::Skipped(SkipReason::UpToDate))
        );
    }

    #[test]
    fn test_exit_on_error_stops_run() {
        let mut fx = fixture("interact = false\nexit_on_error = true\n");
        fx.adapter.fail("A", Phase::Checkout, 1);
        let mods = vec![Module::new("A", "scripted"), Module::new("C", "scripted")];
        let mut frontend = ScriptedFrontend::default();
        let report = fx.orchestrator.run(&mods, &mut frontend);

        assert_eq!(report.failures, vec!["A".to_string()]);
        assert_eq!(frontend.started, vec!["A".to_string()]);
        assert_eq!(frontend.finished, Some(vec!["A".to_string()]));
    }

    #[test]
    fn test_reload_swaps_config_then_asks_again() {
        let mut fx = fixture("");
        fx.adapter.fail("A", Phase::Build, 1);
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        let mut orchestrator = fx.orchestrator.with_reloader(Box::new(move |current| {
            *counter.lock().unwrap() += 1;
            let mut next = current.clone();
            next.trycheckout = true;
            Ok(next)
        }));
        let mut frontend = ScriptedFrontend {
            decisions: VecDeque::from([RecoveryDecision::Reload, RecoveryDecision::Fail]),
            ..ScriptedFrontend::default()
        };
        let report = orchestrator.run(&modules()[..1], &mut frontend);

        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(orchestrator.config().trycheckout);
        assert_eq!(frontend.requests.len(), 2);
        assert_eq!(report.failures, vec!["A".to_string()]);
    }

    #[test]
    fn test_unwritable_packagedb_fails_module() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("blocker"), "").unwrap();
        let adapter = ScriptedAdapter::new();
        let mut registry = AdapterRegistry::empty();
        registry.register(Box::new(adapter));
        let db = PackageDatabase::open(temp.path().join("blocker/packagedb.toml")).unwrap();
        let config = Config::from_toml_str("interact = true\ntrycheckout = true\n").unwrap();
        let mut orchestrator = BuildOrchestrator::new(config, registry, db);
        let mut frontend = ScriptedFrontend {
            decisions: VecDeque::from([RecoveryDecision::Rerun]),
            ..ScriptedFrontend::default()
        };

        let report = orchestrator.run(&modules(), &mut frontend);
        assert_eq!(report.failures, vec!["A".to_string()]);
        assert!(matches!(
            report.outcome("B"),
            Some(ModuleOutcome::Skipped(SkipReason::DependencyFailed(_)))
        ));
        // no recovery menu and no automatic retry for a lost record
        assert!(frontend.requests.is_empty());
        assert!(frontend
            .messages
            .iter()
            .any(|m| m.starts_with("Failed to record install of A")));
    }

    #[test]
    fn test_automatic_ladder_runs_once_before_single_prompt() {
        let mut fx = fixture("interact = true\ntrycheckout = true\n");
        fx.adapter.fail("A", Phase::Build, 3);
        let mut frontend = ScriptedFrontend {
            decisions: VecDeque::from([RecoveryDecision::Fail]),
            ..ScriptedFrontend::default()
        };
        let report = fx.orchestrator.run(&modules()[..1], &mut frontend);

        assert_eq!(report.failures, vec!["A".to_string()]);
        assert_eq!(frontend.requests.len(), 1);
        assert_eq!(frontend.requests[0].phase, Phase::Build);
        assert_eq!(
            fx.adapter.log(),
            vec![
                "A:checkout",
                "A:configure",
                "A:build",
                "A:configure",
                "A:build",
                "A:force_checkout",
                "A:configure",
                "A:build",
            ]
        );
        let automatic = frontend
            .messages
            .iter()
            .filter(|m| m.starts_with("Automatic recovery"))
            .count();
        assert_eq!(automatic, 2);
    }

    #[test]
    fn test_recovery_choices_without_next_phase() {
        let machine = PhaseStateMachine::new(autotools::PHASES, &[Phase::Checkout], &[]);
        let choices = recovery_choices(&machine, Phase::Checkout);
        let decisions: Vec<_> = choices.iter().map(|c| c.decision.clone()).collect();
        assert_eq!(
            decisions,
            vec![RecoveryDecision::Rerun, RecoveryDecision::Fail, RecoveryDecision::Reload]
        );
    }
}
