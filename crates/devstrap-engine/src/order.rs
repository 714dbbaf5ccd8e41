use std::collections::HashSet;

use devstrap_core::Step;

use crate::EngineError;

/// Step order is exactly the declared order; the only thing checked is that
/// every step can be named unambiguously in the report.
pub(crate) fn check_declared_order(steps: &[Step]) -> Result<(), EngineError> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.name.as_str()) {
            return Err(EngineError::DuplicateStep(step.name.clone()));
        }
    }
    Ok(())
}
