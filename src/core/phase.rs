//! Build phases and the per-module phase state machine
//!
//! A module type declares a static table of [`PhaseSpec`]s. The state machine
//! turns that table plus the configured targets into an ordered plan, then
//! tracks progress through it and applies recovery decisions on failure.

use std::fmt;
use std::str::FromStr;

use crate::core::frontend::RecoveryDecision;
use crate::error::ConfigError;

/// A named step in building one module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Checkout,
    ForceCheckout,
    Configure,
    Build,
    Check,
    Install,
    Clean,
}

impl Phase {
    /// All phases
    pub const ALL: [Phase; 7] = [
        Phase::Checkout,
        Phase::ForceCheckout,
        Phase::Configure,
        Phase::Build,
        Phase::Check,
        Phase::Install,
        Phase::Clean,
    ];

    /// Phase this one stands in for when rebuilding a plan
    pub fn canonical(self) -> Phase {
        match self {
            Phase::ForceCheckout => Phase::Checkout,
            other => other,
        }
    }

    /// Verb shown while the phase runs
    pub fn action_label(self) -> &'static str {
        match self {
            Phase::Checkout => "Checking out",
            Phase::ForceCheckout => "Wiping directory and checking out",
            Phase::Configure => "Configuring",
            Phase::Build => "Building",
            Phase::Check => "Checking",
            Phase::Install => "Installing",
            Phase::Clean => "Cleaning",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Checkout => "checkout",
            Phase::ForceCheckout => "force_checkout",
            Phase::Configure => "configure",
            Phase::Build => "build",
            Phase::Check => "check",
            Phase::Install => "install",
            Phase::Clean => "clean",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Phase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Phase::ALL
            .into_iter()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| ConfigError::InvalidTarget(s.to_string()))
    }
}

/// Static description of one phase of a module type
#[derive(Debug, Clone, Copy)]
pub struct PhaseSpec {
    pub phase: Phase,
    /// Phases that must run first
    pub depends: &'static [Phase],
    /// Phases offered as recovery targets when this one fails
    pub error_phases: &'static [Phase],
    /// Running this phase destroys local state and must be confirmed
    pub needs_confirmation: bool,
}

impl PhaseSpec {
    pub const fn new(phase: Phase) -> Self {
        Self {
            phase,
            depends: &[],
            error_phases: &[],
            needs_confirmation: false,
        }
    }

    #[must_use]
    pub const fn depends(self, depends: &'static [Phase]) -> Self {
        Self { depends, ..self }
    }

    #[must_use]
    pub const fn on_error(self, error_phases: &'static [Phase]) -> Self {
        Self {
            error_phases,
            ..self
        }
    }

    #[must_use]
    pub const fn confirm(self) -> Self {
        Self {
            needs_confirmation: true,
            ..self
        }
    }
}

/// Why a module was not built
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Build policy found the installed version current
    UpToDate,
    /// A hard dependency failed in this run
    DependencyFailed(String),
}

/// Terminal state of a module in one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleOutcome {
    Success,
    Failed,
    Skipped(SkipReason),
}

impl ModuleOutcome {
    pub fn label(&self) -> String {
        match self {
            Self::Success => "success".to_string(),
            Self::Failed => "failed".to_string(),
            Self::Skipped(SkipReason::UpToDate) => "skipped (up to date)".to_string(),
            Self::Skipped(SkipReason::DependencyFailed(dep)) => {
                format!("skipped ({dep} failed)")
            }
        }
    }
}

/// Stage reached by automatic recovery for the current failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AutoStage {
    Configure,
    ForceCheckout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AutoRecovery {
    /// Phase whose failure started automatic recovery
    trigger: Phase,
    stage: AutoStage,
}

/// Dependency closure of `phase`, dependencies first
fn closure(specs: &[PhaseSpec], phase: Phase, out: &mut Vec<Phase>) {
    if out.contains(&phase) {
        return;
    }
    if let Some(spec) = specs.iter().find(|s| s.phase == phase) {
        for dep in spec.depends {
            closure(specs, *dep, out);
        }
    }
    out.push(phase);
}

/// Runtime phase plan and recovery bookkeeping for one module
#[derive(Debug, Clone)]
pub struct PhaseStateMachine {
    specs: &'static [PhaseSpec],
    queue: Vec<Phase>,
    cursor: usize,
    completed: Vec<Phase>,
    auto: Option<AutoRecovery>,
    outcome: Option<ModuleOutcome>,
}

impl PhaseStateMachine {
    /// Build the plan for `targets`, leaving out `skip_phases`
    pub fn new(specs: &'static [PhaseSpec], targets: &[Phase], skip_phases: &[Phase]) -> Self {
        let mut plan = Vec::new();
        for target in targets {
            if specs.iter().any(|s| s.phase == *target) {
                closure(specs, *target, &mut plan);
            }
        }
        plan.retain(|p| !skip_phases.contains(p));

        let outcome = plan.is_empty().then_some(ModuleOutcome::Success);
        Self {
            specs,
            queue: plan,
            cursor: 0,
            completed: Vec::new(),
            auto: None,
            outcome,
        }
    }

    /// Remaining and past phases, in execution order
    pub fn plan(&self) -> &[Phase] {
        &self.queue
    }

    /// Phase waiting to run, if the module is not finished
    pub fn current(&self) -> Option<Phase> {
        if self.outcome.is_some() {
            return None;
        }
        self.queue.get(self.cursor).copied()
    }

    /// Phase that would run after the current one
    pub fn next_phase(&self) -> Option<Phase> {
        self.queue.get(self.cursor + 1).copied()
    }

    pub fn completed(&self) -> &[Phase] {
        &self.completed
    }

    pub fn outcome(&self) -> Option<&ModuleOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn spec(&self, phase: Phase) -> Option<&PhaseSpec> {
        self.specs.iter().find(|s| s.phase == phase)
    }

    /// Recovery targets declared for `phase`
    pub fn error_phases(&self, phase: Phase) -> &'static [Phase] {
        self.specs
            .iter()
            .find(|s| s.phase == phase)
            .map(|s| s.error_phases)
            .unwrap_or(&[])
    }

    pub fn needs_confirmation(&self, phase: Phase) -> bool {
        self.spec(phase).is_some_and(|s| s.needs_confirmation)
    }

    /// Mark the current phase done and advance
    pub fn succeed(&mut self) {
        let Some(phase) = self.current() else {
            return;
        };
        self.completed.push(phase);
        if self.auto.is_some_and(|a| a.trigger == phase) {
            self.auto = None;
        }
        self.advance();
    }

    /// Pick an automatic recovery step for a failure of `failed`, if any
    ///
    /// The first failure with `configure` among its error phases reruns
    /// configure. If recovery is already underway and fails again, a forced
    /// checkout is tried when offered. Each step is taken once per failure.
    pub fn automatic_recovery(&mut self, failed: Phase, trycheckout: bool) -> Option<RecoveryDecision> {
        let error_phases = self.error_phases(failed);
        match self.auto {
            None if trycheckout && error_phases.contains(&Phase::Configure) => {
                self.auto = Some(AutoRecovery {
                    trigger: failed,
                    stage: AutoStage::Configure,
                });
                Some(RecoveryDecision::Goto(Phase::Configure))
            }
            Some(AutoRecovery {
                trigger,
                stage: AutoStage::Configure,
            }) if error_phases.contains(&Phase::ForceCheckout) => {
                self.auto = Some(AutoRecovery {
                    trigger,
                    stage: AutoStage::ForceCheckout,
                });
                Some(RecoveryDecision::Goto(Phase::ForceCheckout))
            }
            _ => None,
        }
    }

    /// Whether automatic recovery is in progress
    pub fn recovering(&self) -> bool {
        self.auto.is_some()
    }

    /// Apply a recovery decision to the failed current phase
    ///
    /// `Reload` is handled by the caller and leaves the plan untouched.
    pub fn apply(&mut self, decision: &RecoveryDecision) {
        let Some(failed) = self.current() else {
            return;
        };
        match decision {
            RecoveryDecision::Rerun | RecoveryDecision::Reload => {}
            RecoveryDecision::Continue => self.advance(),
            RecoveryDecision::Fail => {
                self.auto = None;
                self.outcome = Some(ModuleOutcome::Failed);
            }
            RecoveryDecision::Goto(target) => self.goto(*target, failed),
        }
    }

    fn goto(&mut self, target: Phase, failed: Phase) {
        // Nearest earlier run of the target, so phases spliced in by an
        // earlier recovery are not replayed
        let behind = self.queue[..=self.cursor]
            .iter()
            .rposition(|p| *p == target);
        let ahead = || {
            self.queue[self.cursor..]
                .iter()
                .position(|p| *p == target)
                .map(|offset| self.cursor + offset)
        };
        if let Some(pos) = behind.or_else(ahead) {
            self.cursor = pos;
            return;
        }

        let mut path = Vec::new();
        closure(self.specs, failed, &mut path);
        path.pop();
        let refill: Vec<Phase> = match path.iter().position(|p| *p == target.canonical()) {
            Some(start) => {
                let mut refill = path[start..].to_vec();
                refill[0] = target;
                refill
            }
            None => vec![target],
        };
        self.queue.splice(self.cursor..self.cursor, refill);
    }

    fn advance(&mut self) {
        self.cursor += 1;
        if self.cursor >= self.queue.len() {
            self.outcome = Some(ModuleOutcome::Success);
        }
    }
}
