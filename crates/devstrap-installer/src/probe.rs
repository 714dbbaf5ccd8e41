use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use devstrap_core::ProbeSpec;

use crate::TargetLayout;

/// Local, read-only check of whether a step's end state already holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Probe {
    Never,
    /// Every command resolves to an executable on `PATH`.
    Commands(Vec<String>),
    /// The path exists; a dangling symlink counts as present.
    Path(PathBuf),
}

impl Probe {
    pub fn from_spec(spec: &ProbeSpec, layout: &TargetLayout) -> Self {
        match spec {
            ProbeSpec::Never => Self::Never,
            ProbeSpec::Commands(names) => Self::Commands(names.clone()),
            ProbeSpec::Path(raw) => Self::Path(layout.expand(raw)),
        }
    }

    pub fn check(&self) -> bool {
        let search_path = std::env::var_os("PATH").unwrap_or_default();
        self.check_with_path(&search_path)
    }

    pub fn check_with_path(&self, search_path: &OsStr) -> bool {
        match self {
            Self::Never => false,
            Self::Commands(names) => names
                .iter()
                .all(|name| find_on_path(name, search_path).is_some()),
            Self::Path(path) => fs::symlink_metadata(path).is_ok(),
        }
    }
}

pub fn find_on_path(command: &str, search_path: &OsStr) -> Option<PathBuf> {
    std::env::split_paths(search_path)
        .filter(|dir| !dir.as_os_str().is_empty())
        .map(|dir| dir.join(command))
        .find(|candidate| is_executable_file(candidate))
}

fn is_executable_file(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
