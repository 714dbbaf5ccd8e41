use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure of a step's install action. These are contained by the executor
/// for non-critical steps.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("failed to resolve latest release of {repo}: {reason}")]
    Resolution { repo: String, reason: String },

    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    #[error("failed to extract {archive}: {reason}")]
    Extract { archive: String, reason: String },

    #[error("binary '{binary}' not found in {archive}")]
    BinaryNotFound { binary: String, archive: String },

    #[error("command `{command}` failed: {reason}")]
    Command { command: String, reason: String },

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
}

impl StepError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }
}

/// Failure while reading, backing up or writing a user configuration file.
/// Always fatal for the run.
#[derive(Debug, Error)]
#[error("failed to {action} {}: {source}", .path.display())]
pub struct ConfigWriteError {
    pub action: &'static str,
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl ConfigWriteError {
    pub fn new(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            action,
            path: path.into(),
            source,
        }
    }
}
