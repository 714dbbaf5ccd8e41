use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use devstrap_core::{ConfigFileSpec, ConfigWriteError, ExecutionContext, PatchDirective};
use regex::bytes::Regex;
use tracing::{debug, info};

use crate::fs_utils::write_replacing;
use crate::TargetLayout;

/// A config file as ordered raw lines. Dotfiles are not required to be
/// UTF-8; lines that no directive touches are written back byte for byte.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigDocument {
    lines: Vec<Vec<u8>>,
    trailing_newline: bool,
}

impl ConfigDocument {
    pub fn parse(raw: &[u8]) -> Self {
        if raw.is_empty() {
            return Self::default();
        }
        let trailing_newline = raw.ends_with(b"\n");
        let body = raw.strip_suffix(b"\n").unwrap_or(raw);
        Self {
            lines: body.split(|byte| *byte == b'\n').map(<[u8]>::to_vec).collect(),
            trailing_newline,
        }
    }

    pub fn render(&self) -> Vec<u8> {
        let mut out = self.lines.join(&b'\n');
        if self.trailing_newline && !self.lines.is_empty() {
            out.push(b'\n');
        }
        out
    }

    pub fn lines(&self) -> &[Vec<u8>] {
        &self.lines
    }

    pub fn contains_marker(&self, marker: &str) -> bool {
        let needle = marker.as_bytes();
        needle.is_empty()
            || self
                .render()
                .windows(needle.len())
                .any(|window| window == needle)
    }

    /// Replaces every matching line with `line`; returns how many matched.
    pub fn replace_lines(&mut self, pattern: &Regex, line: &str) -> usize {
        let mut matched = 0;
        for existing in &mut self.lines {
            if pattern.is_match(existing) {
                *existing = line.as_bytes().to_vec();
                matched += 1;
            }
        }
        matched
    }

    /// Appends `block` verbatim, starting on a fresh line.
    pub fn append_block(&mut self, block: &str) {
        let mut raw = self.render();
        if !raw.is_empty() && !raw.ends_with(b"\n") {
            raw.push(b'\n');
        }
        raw.extend_from_slice(block.as_bytes());
        *self = Self::parse(&raw);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectiveEffect {
    Replaced { pattern: String, lines: usize },
    NoMatch { pattern: String },
    Appended { marker: String },
    AlreadyPresent { marker: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub path: PathBuf,
    /// Set when a pre-run copy was written this run.
    pub backup: Option<PathBuf>,
    pub effects: Vec<DirectiveEffect>,
    /// Whether the content differs (or would differ, when simulating).
    pub changed: bool,
    pub simulated: bool,
}

/// Applies patch directives to user configuration files.
///
/// A live run backs the file up before touching it, and writes it back only
/// when the content changed. Simulation only reads.
#[derive(Debug, Clone, Copy)]
pub struct ConfigPatcher<'a> {
    layout: &'a TargetLayout,
}

impl<'a> ConfigPatcher<'a> {
    pub fn new(layout: &'a TargetLayout) -> Self {
        Self { layout }
    }

    pub fn apply(
        &self,
        spec: &ConfigFileSpec,
        ctx: &ExecutionContext,
    ) -> Result<PatchReport, ConfigWriteError> {
        let path = self.layout.expand(&spec.path);
        let original = read_optional(&path)?;

        let backup = match (&original, ctx.simulate) {
            (Some(_), false) => Some(write_backup(&path)?),
            _ => None,
        };

        let before = original.as_deref().unwrap_or_default();
        let mut document = ConfigDocument::parse(before);
        let mut effects = Vec::with_capacity(spec.directives.len());
        for directive in &spec.directives {
            effects.push(apply_directive(&mut document, directive, &path)?);
        }

        let after = document.render();
        let changed = after.as_slice() != before;
        if changed && !ctx.simulate {
            write_config(&path, &after, original.is_some())?;
            info!(path = %path.display(), "patched config file");
        } else {
            debug!(
                path = %path.display(),
                changed,
                simulate = ctx.simulate,
                "config file left as is"
            );
        }

        Ok(PatchReport {
            path,
            backup,
            effects,
            changed,
            simulated: ctx.simulate,
        })
    }

    pub fn apply_all(
        &self,
        specs: &[ConfigFileSpec],
        ctx: &ExecutionContext,
    ) -> Result<Vec<PatchReport>, ConfigWriteError> {
        specs.iter().map(|spec| self.apply(spec, ctx)).collect()
    }
}

fn apply_directive(
    document: &mut ConfigDocument,
    directive: &PatchDirective,
    path: &Path,
) -> Result<DirectiveEffect, ConfigWriteError> {
    match directive {
        PatchDirective::ReplaceLine { pattern, line } => {
            let regex = Regex::new(pattern).map_err(|err| {
                ConfigWriteError::new(
                    "compile line pattern for",
                    path,
                    io::Error::new(io::ErrorKind::InvalidInput, err.to_string()),
                )
            })?;
            match document.replace_lines(&regex, line) {
                0 => Ok(DirectiveEffect::NoMatch {
                    pattern: pattern.clone(),
                }),
                lines => Ok(DirectiveEffect::Replaced {
                    pattern: pattern.clone(),
                    lines,
                }),
            }
        }
        PatchDirective::AppendOnce { marker, block } => {
            if document.contains_marker(marker) {
                return Ok(DirectiveEffect::AlreadyPresent {
                    marker: marker.clone(),
                });
            }
            document.append_block(block);
            Ok(DirectiveEffect::Appended {
                marker: marker.clone(),
            })
        }
    }
}

fn read_optional(path: &Path) -> Result<Option<Vec<u8>>, ConfigWriteError> {
    match fs::read(path) {
        Ok(raw) => Ok(Some(raw)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(ConfigWriteError::new("read", path, err)),
    }
}

fn write_backup(path: &Path) -> Result<PathBuf, ConfigWriteError> {
    let backup = TargetLayout::backup_path(path);
    fs::copy(path, &backup).map_err(|err| ConfigWriteError::new("back up", path, err))?;
    debug!(path = %path.display(), backup = %backup.display(), "backed up config file");
    Ok(backup)
}

fn write_config(path: &Path, contents: &[u8], existed: bool) -> Result<(), ConfigWriteError> {
    if !existed {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|err| ConfigWriteError::new("create parent of", path, err))?;
        }
        return write_replacing(path, contents)
            .map_err(|err| ConfigWriteError::new("write", path, err));
    }

    // Dotfiles are often symlinks into a managed repo; patch the real file.
    let target =
        fs::canonicalize(path).map_err(|err| ConfigWriteError::new("resolve", path, err))?;
    let permissions = fs::metadata(&target)
        .map_err(|err| ConfigWriteError::new("stat", path, err))?
        .permissions();
    write_replacing(&target, contents).map_err(|err| ConfigWriteError::new("write", path, err))?;
    fs::set_permissions(&target, permissions)
        .map_err(|err| ConfigWriteError::new("restore permissions of", path, err))
}
