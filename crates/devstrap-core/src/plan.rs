use std::collections::HashSet;

use anyhow::{anyhow, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};

const BUILTIN_PLAN: &str = include_str!("../plans/default.toml");

/// The declared, ordered provisioning work: tool steps first, then the
/// configuration files patched in the final pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProvisionPlan {
    #[serde(default)]
    pub steps: Vec<StepSpec>,
    #[serde(default)]
    pub config_files: Vec<ConfigFileSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepSpec {
    pub name: String,
    #[serde(default)]
    pub critical: bool,
    pub probe: ProbeSpec,
    pub install: InstallSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ProbeSpec {
    /// Always reports absent.
    Never,
    Commands(Vec<String>),
    Path(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Apt,
    Brew,
    Cargo,
}

impl PackageManager {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Brew => "brew",
            Self::Cargo => "cargo",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum InstallSpec {
    Archive {
        repo: String,
        url: String,
        binary: String,
    },
    Package {
        manager: PackageManager,
        #[serde(default)]
        packages: Vec<String>,
        #[serde(default)]
        refresh: bool,
    },
    GitClone {
        url: String,
        dest: String,
    },
    Script {
        url: Option<String>,
        program: String,
        #[serde(default)]
        args: Vec<String>,
    },
    Symlink {
        target: String,
        link: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConfigFileSpec {
    pub path: String,
    #[serde(default)]
    pub directives: Vec<PatchDirective>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PatchDirective {
    /// Replace every line matching `pattern` with `line`. Applied on every run.
    ReplaceLine { pattern: String, line: String },
    /// Append `block` unless `marker` already occurs in the file.
    AppendOnce { marker: String, block: String },
}

impl ProvisionPlan {
    pub fn builtin() -> anyhow::Result<Self> {
        Self::from_toml_str(BUILTIN_PLAN).context("built-in provisioning plan is invalid")
    }

    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let plan: Self = toml::from_str(input).context("failed to parse provisioning plan")?;
        plan.validate()?;
        Ok(plan)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.name.as_str()).collect()
    }

    fn validate(&self) -> anyhow::Result<()> {
        let mut seen = HashSet::new();
        for step in &self.steps {
            if step.name.trim().is_empty() {
                return Err(anyhow!("step name must not be empty"));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(anyhow!("duplicate step '{}'", step.name));
            }
            validate_probe(&step.probe)
                .with_context(|| format!("invalid probe for step '{}'", step.name))?;
            validate_install(&step.install)
                .with_context(|| format!("invalid install for step '{}'", step.name))?;
        }

        let mut seen_files = HashSet::new();
        for file in &self.config_files {
            if file.path.trim().is_empty() {
                return Err(anyhow!("config file path must not be empty"));
            }
            if !seen_files.insert(file.path.as_str()) {
                return Err(anyhow!("duplicate config file '{}'", file.path));
            }
            for directive in &file.directives {
                validate_directive(directive)
                    .with_context(|| format!("invalid directive for '{}'", file.path))?;
            }
        }
        Ok(())
    }
}

fn validate_probe(probe: &ProbeSpec) -> anyhow::Result<()> {
    match probe {
        ProbeSpec::Never => Ok(()),
        ProbeSpec::Commands(names) => {
            if names.is_empty() {
                return Err(anyhow!("commands probe must name at least one command"));
            }
            if let Some(name) = names
                .iter()
                .find(|name| name.trim().is_empty() || name.contains('/'))
            {
                return Err(anyhow!("invalid command name '{name}'"));
            }
            Ok(())
        }
        ProbeSpec::Path(path) if path.trim().is_empty() => {
            Err(anyhow!("path probe must not be empty"))
        }
        ProbeSpec::Path(_) => Ok(()),
    }
}

fn validate_install(install: &InstallSpec) -> anyhow::Result<()> {
    match install {
        InstallSpec::Archive { repo, url, binary } => {
            if repo.split('/').filter(|part| !part.is_empty()).count() != 2 {
                return Err(anyhow!("repo must be '<owner>/<name>', got '{repo}'"));
            }
            if !url.contains("{version}") {
                return Err(anyhow!("archive url template must contain {{version}}"));
            }
            if binary.trim().is_empty() || binary.contains('/') {
                return Err(anyhow!("invalid binary name '{binary}'"));
            }
            Ok(())
        }
        InstallSpec::Package {
            packages, refresh, ..
        } => {
            if packages.is_empty() && !refresh {
                return Err(anyhow!("package install needs packages or refresh = true"));
            }
            Ok(())
        }
        InstallSpec::GitClone { url, dest } => {
            if url.trim().is_empty() || dest.trim().is_empty() {
                return Err(anyhow!("git-clone needs both url and dest"));
            }
            Ok(())
        }
        InstallSpec::Script { program, .. } => {
            if program.trim().is_empty() {
                return Err(anyhow!("script program must not be empty"));
            }
            Ok(())
        }
        InstallSpec::Symlink { target, link } => {
            if target.trim().is_empty() || link.trim().is_empty() {
                return Err(anyhow!("symlink needs both target and link"));
            }
            Ok(())
        }
    }
}

fn validate_directive(directive: &PatchDirective) -> anyhow::Result<()> {
    match directive {
        PatchDirective::ReplaceLine { pattern, line } => {
            let regex = Regex::new(pattern)
                .with_context(|| format!("invalid line pattern '{pattern}'"))?;
            if line.contains('\n') {
                return Err(anyhow!("replacement line must be a single line"));
            }
            if !regex.is_match(line) {
                return Err(anyhow!(
                    "replacement line '{line}' does not match its own pattern '{pattern}'"
                ));
            }
            Ok(())
        }
        PatchDirective::AppendOnce { marker, block } => {
            if marker.trim().is_empty() {
                return Err(anyhow!("append marker must not be empty"));
            }
            if !block.contains(marker.as_str()) {
                return Err(anyhow!("append block must contain its marker '{marker}'"));
            }
            Ok(())
        }
    }
}
