use anyhow::{Context, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub const BACKUP_SUFFIX: &str = "devstrap.bak";

/// Where things land on the target machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLayout {
    home: PathBuf,
    bin_dir: PathBuf,
}

impl TargetLayout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let bin_dir = home.join(".local").join("bin");
        Self { home, bin_dir }
    }

    pub fn with_bin_dir(mut self, bin_dir: impl Into<PathBuf>) -> Self {
        self.bin_dir = bin_dir.into();
        self
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    /// Expands a leading `~` against the home directory. Other paths are
    /// taken as they are.
    pub fn expand(&self, raw: &str) -> PathBuf {
        if raw == "~" {
            return self.home.clone();
        }
        match raw.strip_prefix("~/") {
            Some(rest) => self.home.join(rest),
            None => PathBuf::from(raw),
        }
    }

    /// Sibling of `path` holding the pre-run copy of a config file.
    pub fn backup_path(path: &Path) -> PathBuf {
        let mut file_name = path
            .file_name()
            .map(OsString::from)
            .unwrap_or_else(|| OsString::from("config"));
        file_name.push(".");
        file_name.push(BACKUP_SUFFIX);
        path.with_file_name(file_name)
    }
}

pub fn default_target_layout() -> Result<TargetLayout> {
    let home = std::env::var("HOME").context("HOME is not set; cannot resolve target layout")?;
    let layout = TargetLayout::new(home);
    match std::env::var_os("DEVSTRAP_BIN_DIR") {
        Some(bin_dir) if !bin_dir.is_empty() => Ok(layout.with_bin_dir(bin_dir)),
        _ => Ok(layout),
    }
}
