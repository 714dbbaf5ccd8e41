mod actions;
mod artifact;
mod command;
mod fs_utils;
mod layout;
mod patch;
mod probe;
mod release;

pub use actions::{build_steps, http_client, InstallAction, InstallEnv, ToolStep};
pub use artifact::{install_from_archive_file, ArchiveInstaller};
pub use layout::{default_target_layout, TargetLayout, BACKUP_SUFFIX};
pub use patch::{ConfigDocument, ConfigPatcher, DirectiveEffect, PatchReport};
pub use probe::{find_on_path, Probe};
pub use release::{parse_latest_version, ReleaseResolver, DEFAULT_API_BASE};

#[cfg(test)]
mod tests;
