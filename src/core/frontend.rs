//! Frontend contract
//!
//! The orchestrator reports progress and asks for recovery decisions through
//! this trait. The terminal implementation lives in [`crate::cli::frontend`];
//! tests script their own.

use std::path::PathBuf;

use crate::core::phase::{ModuleOutcome, Phase};

/// What to do after a phase failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryDecision {
    /// Run the failed phase again
    Rerun,
    /// Ignore the failure and move on to the next phase
    Continue,
    /// Give up on the module
    Fail,
    /// Jump to another phase, then come back to the failed one
    Goto(Phase),
    /// Reload configuration, then ask again
    Reload,
}

impl std::fmt::Display for RecoveryDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rerun => write!(f, "Rerun phase"),
            Self::Continue => write!(f, "Ignore error and continue to next phase"),
            Self::Fail => write!(f, "Give up on module"),
            Self::Goto(phase) => write!(f, "Go to phase \"{phase}\""),
            Self::Reload => write!(f, "Reload configuration"),
        }
    }
}

/// One entry of the recovery menu
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryChoice {
    pub decision: RecoveryDecision,
    /// Destructive choices must be confirmed before they are returned
    pub needs_confirmation: bool,
}

/// Everything a frontend needs to ask the user about a failure
#[derive(Debug, Clone)]
pub struct RecoveryRequest {
    pub module: String,
    pub phase: Phase,
    pub next_phase: Option<Phase>,
    pub error: String,
    pub choices: Vec<RecoveryChoice>,
    /// Directory to open a shell in, if the module has one
    pub builddir: Option<PathBuf>,
}

/// Messaging and decision surface used by the orchestrator
pub trait Frontend: Send {
    /// Free-form message tied to an optional module
    fn message(&mut self, msg: &str, module: Option<&str>);

    /// Announce the action about to run for a module
    fn set_action(&mut self, action: &str, module: &str);

    /// Called once before any work for a module
    fn start_module(&mut self, module: &str);

    /// Record the terminal outcome of a module
    fn end_module(&mut self, _module: &str, _outcome: &ModuleOutcome) {}

    /// Block until a recovery decision is available
    fn handle_error(&mut self, request: &RecoveryRequest) -> RecoveryDecision;

    /// Called once after the last module
    fn end_build(&mut self, failures: &[String]);
}
