use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::rc::Rc;

use devstrap_core::{
    Criticality, InstallSpec, PackageManager, ProvisionPlan, Step, StepAction, StepError,
};
use reqwest::blocking::Client;
use tracing::info;

use crate::artifact::{download_to, make_tmp_dir};
use crate::command::{render_command, run_command};
use crate::fs_utils::remove_file_if_exists;
use crate::probe::find_on_path;
use crate::{ArchiveInstaller, Probe, ReleaseResolver, TargetLayout};

/// Shared collaborators for every install action of a run.
#[derive(Debug, Clone)]
pub struct InstallEnv {
    layout: TargetLayout,
    client: Client,
    resolver: ReleaseResolver,
    archives: ArchiveInstaller,
}

impl InstallEnv {
    pub fn new(layout: TargetLayout, client: Client, api_base: &str) -> Self {
        Self {
            layout,
            resolver: ReleaseResolver::new(client.clone(), api_base),
            archives: ArchiveInstaller::new(client.clone()),
            client,
        }
    }

    pub fn layout(&self) -> &TargetLayout {
        &self.layout
    }
}

pub fn http_client() -> anyhow::Result<Client> {
    Ok(Client::builder()
        .user_agent(concat!("devstrap/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallAction {
    Archive {
        repo: String,
        url_template: String,
        binary: String,
    },
    Package {
        manager: PackageManager,
        packages: Vec<String>,
        refresh: bool,
    },
    GitClone {
        url: String,
        dest: PathBuf,
    },
    Script {
        url: Option<String>,
        program: String,
        args: Vec<String>,
    },
    Symlink {
        target: PathBuf,
        link: PathBuf,
    },
}

impl InstallAction {
    pub fn from_spec(spec: &InstallSpec, layout: &TargetLayout) -> Self {
        match spec {
            InstallSpec::Archive { repo, url, binary } => Self::Archive {
                repo: repo.clone(),
                url_template: url.clone(),
                binary: binary.clone(),
            },
            InstallSpec::Package {
                manager,
                packages,
                refresh,
            } => Self::Package {
                manager: *manager,
                packages: packages.clone(),
                refresh: *refresh,
            },
            InstallSpec::GitClone { url, dest } => Self::GitClone {
                url: url.clone(),
                dest: layout.expand(dest),
            },
            InstallSpec::Script { url, program, args } => Self::Script {
                url: url.clone(),
                program: program.clone(),
                args: args.clone(),
            },
            InstallSpec::Symlink { target, link } => Self::Symlink {
                target: layout.expand(target),
                link: layout.expand(link),
            },
        }
    }

    pub fn describe(&self, layout: &TargetLayout) -> String {
        match self {
            Self::Archive {
                repo,
                url_template,
                binary,
            } => format!(
                "download the latest release of {repo} ({url_template}) and place '{binary}' in {}",
                layout.bin_dir().display()
            ),
            Self::Package {
                manager,
                packages,
                refresh,
            } => package_commands(*manager, packages, *refresh, sudo_available())
                .iter()
                .map(render_command)
                .collect::<Vec<_>>()
                .join(" && "),
            Self::GitClone { url, dest } => render_command(&git_clone_command(url, dest)),
            Self::Script { url, program, args } => match url {
                Some(url) => {
                    format!("fetch {url} and run it with {}", render_args(program, args))
                }
                None => render_args(program, args),
            },
            Self::Symlink { target, link } => {
                format!("link {} -> {}", link.display(), target.display())
            }
        }
    }

    pub fn run(&self, env: &InstallEnv) -> Result<(), StepError> {
        match self {
            Self::Archive {
                repo,
                url_template,
                binary,
            } => {
                let release = env.resolver.fetch_release(repo, url_template)?;
                info!(%repo, version = %release.version, "installing release");
                env.archives
                    .install(&release.url, binary, env.layout.bin_dir())
                    .map(|_| ())
            }
            Self::Package {
                manager,
                packages,
                refresh,
            } => {
                let commands = package_commands(*manager, packages, *refresh, sudo_available());
                for mut command in commands {
                    run_command(&mut command)?;
                }
                Ok(())
            }
            Self::GitClone { url, dest } => {
                ensure_parent(dest)?;
                run_command(&mut git_clone_command(url, dest))
            }
            Self::Script { url, program, args } => {
                run_script(&env.client, url.as_deref(), program, args)
            }
            Self::Symlink { target, link } => create_symlink(target, link),
        }
    }
}

/// One declared step bound to this run's environment.
pub struct ToolStep {
    probe: Probe,
    action: InstallAction,
    env: Rc<InstallEnv>,
}

impl ToolStep {
    pub fn new(probe: Probe, action: InstallAction, env: Rc<InstallEnv>) -> Self {
        Self { probe, action, env }
    }
}

impl StepAction for ToolStep {
    fn probe(&self) -> bool {
        self.probe.check()
    }

    fn describe(&self) -> String {
        self.action.describe(&self.env.layout)
    }

    fn install(&self) -> Result<(), StepError> {
        self.action.run(&self.env)
    }
}

/// Binds every declared step of `plan`, keeping the declared order.
pub fn build_steps(plan: &ProvisionPlan, env: &Rc<InstallEnv>) -> Vec<Step> {
    plan.steps
        .iter()
        .map(|spec| {
            let probe = Probe::from_spec(&spec.probe, &env.layout);
            let action = InstallAction::from_spec(&spec.install, &env.layout);
            let criticality = if spec.critical {
                Criticality::Critical
            } else {
                Criticality::NonCritical
            };
            Step::new(spec.name.clone(), ToolStep::new(probe, action, Rc::clone(env)))
                .with_criticality(criticality)
        })
        .collect()
}

fn sudo_available() -> bool {
    let search_path = std::env::var_os("PATH").unwrap_or_default();
    find_on_path("sudo", &search_path).is_some()
}

pub(crate) fn package_commands(
    manager: PackageManager,
    packages: &[String],
    refresh: bool,
    use_sudo: bool,
) -> Vec<Command> {
    let mut commands = Vec::new();
    match manager {
        PackageManager::Apt => {
            let apt = |args: &[&str]| {
                let mut command = if use_sudo {
                    let mut command = Command::new("sudo");
                    command.arg("apt-get");
                    command
                } else {
                    Command::new("apt-get")
                };
                command.args(args);
                command
            };
            if refresh {
                commands.push(apt(&["update"]));
            }
            if !packages.is_empty() {
                let mut command = apt(&["install", "-y"]);
                command.args(packages);
                commands.push(command);
            }
        }
        PackageManager::Brew => {
            if refresh {
                let mut command = Command::new("brew");
                command.arg("update");
                commands.push(command);
            }
            if !packages.is_empty() {
                let mut command = Command::new("brew");
                command.arg("install").args(packages);
                commands.push(command);
            }
        }
        // cargo has no separate index refresh
        PackageManager::Cargo => {
            if !packages.is_empty() {
                let mut command = Command::new("cargo");
                command.arg("install").args(packages);
                commands.push(command);
            }
        }
    }
    commands
}

fn git_clone_command(url: &str, dest: &Path) -> Command {
    let mut command = Command::new("git");
    command
        .arg("clone")
        .arg("--depth")
        .arg("1")
        .arg(url)
        .arg(dest);
    command
}

fn render_args(program: &str, args: &[String]) -> String {
    let mut command = Command::new(program);
    command.args(args);
    render_command(&command)
}

fn run_script(
    client: &Client,
    url: Option<&str>,
    program: &str,
    args: &[String],
) -> Result<(), StepError> {
    let Some(url) = url else {
        let mut command = Command::new(program);
        command.args(args);
        return run_command(&mut command);
    };

    let workspace = make_tmp_dir("script")?;
    let script_path = workspace.path().join("install-script");
    download_to(client, url, &script_path)?;

    let mut command = Command::new(program);
    command.arg(&script_path).args(args);
    run_command(&mut command)
}

fn ensure_parent(path: &Path) -> Result<(), StepError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|err| StepError::io(format!("failed to create {}", parent.display()), err))?;
    }
    Ok(())
}

fn create_symlink(target: &Path, link: &Path) -> Result<(), StepError> {
    ensure_parent(link)?;
    remove_file_if_exists(link).map_err(|err| {
        StepError::io(format!("failed to replace {}", link.display()), err)
    })?;

    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link).map_err(|err| {
            StepError::io(
                format!(
                    "failed to create symlink {} -> {}",
                    link.display(),
                    target.display()
                ),
                err,
            )
        })
    }

    #[cfg(not(unix))]
    {
        Err(StepError::io(
            format!("cannot link {} on this platform", link.display()),
            std::io::Error::from(std::io::ErrorKind::Unsupported),
        ))
    }
}
