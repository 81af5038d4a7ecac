//! Meta modules group dependencies and build nothing themselves

use crate::core::module::Module;
use crate::core::phase::{Phase, PhaseSpec};
use crate::error::CommandError;

use super::{ModuleTypeAdapter, PhaseContext};

#[derive(Debug, Default, Clone, Copy)]
pub struct MetaAdapter;

impl ModuleTypeAdapter for MetaAdapter {
    fn type_name(&self) -> &'static str {
        "meta"
    }

    fn phases(&self) -> &'static [PhaseSpec] {
        &[]
    }

    fn run_phase(
        &self,
        phase: Phase,
        module: &Module,
        _ctx: &PhaseContext<'_>,
    ) -> Result<(), CommandError> {
        Err(CommandError::new(format!(
            "meta module {} has no {phase} phase",
            module.name
        )))
    }

    fn freshness(&self, _module: &Module, _ctx: &PhaseContext<'_>) -> Option<String> {
        None
    }

    fn records_install(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::phase::PhaseStateMachine;

    #[test]
    fn test_meta_plan_is_empty_success() {
        let machine = PhaseStateMachine::new(MetaAdapter.phases(), &[Phase::Install], &[]);
        assert!(machine.plan().is_empty());
        assert!(machine.is_finished());
    }
}
