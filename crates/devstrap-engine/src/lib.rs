mod executor;
mod orchestrate;
mod order;
mod report;
mod summary;
mod types;

pub use executor::run_step;
pub use orchestrate::{run_provisioning, run_steps};
pub use report::{RunReport, StepRecord};
pub use summary::summary_lines;
pub use types::{EngineError, StepOutcome};
