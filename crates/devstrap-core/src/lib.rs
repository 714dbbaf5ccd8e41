mod archive;
mod error;
mod plan;
mod release;
mod step;

pub use archive::{url_file_name, ArchiveType};
pub use error::{ConfigWriteError, StepError};
pub use plan::{
    ConfigFileSpec, InstallSpec, PackageManager, PatchDirective, ProbeSpec, ProvisionPlan,
    StepSpec,
};
pub use release::{normalize_version_tag, RemoteRelease};
pub use step::{Criticality, ExecutionContext, Step, StepAction};
