use super::*;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use devstrap_core::{
    ArchiveType, ConfigFileSpec, ExecutionContext, PackageManager, PatchDirective, ProbeSpec,
    ProvisionPlan, StepError,
};
use devstrap_engine::{run_provisioning, run_steps, StepOutcome};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::blocking::Client;

use crate::actions::package_commands;
use crate::artifact::find_binary;
use crate::command::render_command;

#[test]
fn expand_resolves_home_prefix_only() {
    let layout = TargetLayout::new("/home/dev");
    assert_eq!(layout.expand("~"), PathBuf::from("/home/dev"));
    assert_eq!(layout.expand("~/.zshrc"), PathBuf::from("/home/dev/.zshrc"));
    assert_eq!(layout.expand("/etc/zshrc"), PathBuf::from("/etc/zshrc"));
    assert_eq!(layout.expand("~other/x"), PathBuf::from("~other/x"));
    assert_eq!(layout.bin_dir(), Path::new("/home/dev/.local/bin"));
}

#[test]
fn bin_dir_override_is_kept() {
    let layout = TargetLayout::new("/home/dev").with_bin_dir("/opt/tools/bin");
    assert_eq!(layout.home(), Path::new("/home/dev"));
    assert_eq!(layout.bin_dir(), Path::new("/opt/tools/bin"));
}

#[test]
fn backup_path_is_a_sibling_with_suffix() {
    assert_eq!(
        TargetLayout::backup_path(Path::new("/home/dev/.zshrc")),
        PathBuf::from("/home/dev/.zshrc.devstrap.bak")
    );
}

#[test]
fn command_probe_requires_every_command() {
    let root = test_root();
    let bin = root.join("bin");
    fs::create_dir_all(&bin).expect("must create bin dir");
    write_executable(&bin.join("git"), b"#!/bin/sh\n");
    fs::write(bin.join("notexec"), b"data").expect("must write plain file");

    let search_path = OsString::from(bin.as_os_str());
    assert!(Probe::Commands(vec!["git".to_string()]).check_with_path(&search_path));
    assert!(!Probe::Commands(vec!["git".to_string(), "curl".to_string()])
        .check_with_path(&search_path));
    #[cfg(unix)]
    assert!(!Probe::Commands(vec!["notexec".to_string()]).check_with_path(&search_path));
    assert_eq!(
        find_on_path("git", &search_path),
        Some(bin.join("git"))
    );
    assert!(find_on_path("git", &OsString::new()).is_none());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn path_probe_counts_dangling_symlink_as_present() {
    let root = test_root();
    let layout = TargetLayout::new(&root);
    let probe = Probe::from_spec(&ProbeSpec::Path("~/.oh-my-zsh".to_string()), &layout);
    assert_eq!(probe, Probe::Path(root.join(".oh-my-zsh")));
    assert!(!probe.check_with_path(&OsString::new()));

    fs::create_dir_all(root.join(".oh-my-zsh")).expect("must create dir");
    assert!(probe.check_with_path(&OsString::new()));

    #[cfg(unix)]
    {
        let link = root.join("fd");
        std::os::unix::fs::symlink(root.join("missing-fdfind"), &link)
            .expect("must create dangling link");
        assert!(Probe::Path(link).check_with_path(&OsString::new()));
    }

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn never_probe_is_always_absent() {
    assert!(!Probe::Never.check_with_path(&OsString::from("/usr/bin")));
}

#[test]
fn latest_version_strips_tag_prefix() {
    let version = parse_latest_version("jesseduffield/lazygit", r#"{"tag_name":"v0.44.1"}"#)
        .expect("must parse tag");
    assert_eq!(version, "0.44.1");

    let version = parse_latest_version("dandavison/delta", r#"{"tag_name":"0.18.2","name":"x"}"#)
        .expect("must parse bare tag");
    assert_eq!(version, "0.18.2");
}

#[test]
fn latest_version_rejects_bad_metadata() {
    for body in [
        "not json",
        r#"{"name":"nightly"}"#,
        r#"{"tag_name":""}"#,
        r#"{"tag_name":"nightly"}"#,
    ] {
        let err = parse_latest_version("owner/tool", body).expect_err("must reject metadata");
        assert!(
            matches!(err, StepError::Resolution { ref repo, .. } if repo == "owner/tool"),
            "unexpected error for {body}: {err:?}"
        );
    }
}

#[test]
fn latest_release_url_uses_api_base() {
    let resolver = ReleaseResolver::new(test_client(), "http://127.0.0.1:9/");
    assert_eq!(
        resolver.latest_release_url("ajeetdsouza/zoxide"),
        "http://127.0.0.1:9/repos/ajeetdsouza/zoxide/releases/latest"
    );
}

#[test]
fn resolve_latest_reads_local_api() {
    let server = serve(vec![(
        "/repos/owner/tool/releases/latest",
        200,
        br#"{"tag_name":"v1.2.3"}"#.to_vec(),
    )]);
    let resolver = ReleaseResolver::new(test_client(), server.clone());

    let release = resolver
        .fetch_release("owner/tool", "https://dl.test/{repo}/v{version}/tool-{version}.tar.gz")
        .expect("must resolve release");
    assert_eq!(release.version, "1.2.3");
    assert_eq!(
        release.url,
        "https://dl.test/owner/tool/v1.2.3/tool-1.2.3.tar.gz"
    );
}

#[test]
fn resolve_latest_reports_http_errors() {
    let server = serve(Vec::new());
    let resolver = ReleaseResolver::new(test_client(), server);
    let err = resolver
        .resolve_latest("owner/tool")
        .expect_err("404 must fail");
    match err {
        StepError::Resolution { repo, reason } => {
            assert_eq!(repo, "owner/tool");
            assert!(reason.contains("404"), "reason: {reason}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn resolve_latest_reports_unreachable_api() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind");
    let addr = listener.local_addr().expect("must read addr");
    drop(listener);

    let resolver = ReleaseResolver::new(test_client(), format!("http://{addr}"));
    let err = resolver
        .resolve_latest("owner/tool")
        .expect_err("closed port must fail");
    assert!(matches!(err, StepError::Resolution { .. }), "{err:?}");
}

#[test]
fn tar_gz_install_finds_nested_binary() {
    let root = test_root();
    let archive = root.join("tool-1.0.0.tar.gz");
    write_tar_gz(&archive, "tool-1.0.0/bin/tool", b"#!/bin/sh\necho tool\n");
    let dest = root.join("bin");

    let placed = install_from_archive_file(
        &archive,
        ArchiveType::TarGz,
        "tool",
        &root.join("extract"),
        &dest,
    )
    .expect("must install from tarball");

    assert_eq!(placed, dest.join("tool"));
    assert_eq!(
        fs::read(&placed).expect("must read placed binary"),
        b"#!/bin/sh\necho tool\n"
    );
    assert!(!dest.join("tool.part").exists());
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(&placed).expect("must stat").permissions().mode();
        assert_eq!(mode & 0o755, 0o755);
    }

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn zip_install_finds_nested_binary() {
    let root = test_root();
    let archive = root.join("tool.zip");
    write_zip(&archive, "tool-x86_64/tool", b"zip payload");
    let dest = root.join("bin");

    let placed = install_from_archive_file(
        &archive,
        ArchiveType::Zip,
        "tool",
        &root.join("extract"),
        &dest,
    )
    .expect("must install from zip");
    assert_eq!(fs::read(placed).expect("must read"), b"zip payload");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn bare_binary_is_placed_under_its_name() {
    let root = test_root();
    let artifact = root.join("tool-linux-amd64");
    fs::write(&artifact, b"raw binary").expect("must write artifact");

    let placed = install_from_archive_file(
        &artifact,
        ArchiveType::Bin,
        "tool",
        &root.join("extract"),
        &root.join("bin"),
    )
    .expect("must place bare binary");
    assert_eq!(placed, root.join("bin").join("tool"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn missing_binary_names_the_archive() {
    let root = test_root();
    let archive = root.join("tool-1.0.0.tar.gz");
    write_tar_gz(&archive, "tool-1.0.0/README.md", b"docs");

    let err = install_from_archive_file(
        &archive,
        ArchiveType::TarGz,
        "tool",
        &root.join("extract"),
        &root.join("bin"),
    )
    .expect_err("binary is not in the archive");
    match err {
        StepError::BinaryNotFound { binary, archive } => {
            assert_eq!(binary, "tool");
            assert_eq!(archive, "tool-1.0.0.tar.gz");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(!root.join("bin").join("tool").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn corrupt_archives_fail_extraction() {
    let root = test_root();
    let archive = root.join("broken.zip");
    fs::write(&archive, b"this is not a zip file").expect("must write garbage");

    let err = install_from_archive_file(
        &archive,
        ArchiveType::Zip,
        "tool",
        &root.join("extract-zip"),
        &root.join("bin"),
    )
    .expect_err("garbage zip must fail");
    assert!(matches!(err, StepError::Extract { .. }), "{err:?}");

    let tarball = root.join("broken.tar.gz");
    fs::write(&tarball, b"this is not gzip").expect("must write garbage");
    let err = install_from_archive_file(
        &tarball,
        ArchiveType::TarGz,
        "tool",
        &root.join("extract-tar"),
        &root.join("bin"),
    )
    .expect_err("garbage tarball must fail");
    assert!(matches!(err, StepError::Extract { .. }), "{err:?}");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn find_binary_prefers_first_in_name_order() {
    let root = test_root();
    fs::create_dir_all(root.join("b")).expect("must create dir");
    fs::create_dir_all(root.join("a")).expect("must create dir");
    fs::write(root.join("b").join("tool"), b"b").expect("must write");
    fs::write(root.join("a").join("tool"), b"a").expect("must write");
    fs::create_dir_all(root.join("c").join("tool")).expect("dir named like the binary");

    let found = find_binary(&root, "tool").expect("must search");
    assert_eq!(found, Some(root.join("a").join("tool")));
    assert_eq!(find_binary(&root, "other").expect("must search"), None);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn apt_commands_refresh_then_install() {
    let packages = vec!["git".to_string(), "zsh".to_string()];
    let rendered = package_commands(PackageManager::Apt, &packages, true, true)
        .iter()
        .map(render_command)
        .collect::<Vec<_>>();
    assert_eq!(
        rendered,
        vec![
            "sudo apt-get update",
            "sudo apt-get install -y git zsh"
        ]
    );

    let rendered = package_commands(PackageManager::Apt, &[], true, false)
        .iter()
        .map(render_command)
        .collect::<Vec<_>>();
    assert_eq!(rendered, vec!["apt-get update"]);
}

#[test]
fn brew_and_cargo_commands_never_use_sudo() {
    let packages = vec!["eza".to_string()];
    let brew = package_commands(PackageManager::Brew, &packages, true, true)
        .iter()
        .map(render_command)
        .collect::<Vec<_>>();
    assert_eq!(brew, vec!["brew update", "brew install eza"]);

    let cargo = package_commands(PackageManager::Cargo, &packages, true, true)
        .iter()
        .map(render_command)
        .collect::<Vec<_>>();
    assert_eq!(cargo, vec!["cargo install eza"]);
}

#[test]
fn describe_names_the_work_without_doing_it() {
    let layout = TargetLayout::new("/home/dev");
    let clone = InstallAction::GitClone {
        url: "https://github.com/zsh-users/zsh-autosuggestions".to_string(),
        dest: layout.expand("~/.oh-my-zsh/custom/plugins/zsh-autosuggestions"),
    };
    assert_eq!(
        clone.describe(&layout),
        "git clone --depth 1 https://github.com/zsh-users/zsh-autosuggestions \
         /home/dev/.oh-my-zsh/custom/plugins/zsh-autosuggestions"
    );

    let link = InstallAction::Symlink {
        target: PathBuf::from("/usr/bin/fdfind"),
        link: layout.expand("~/.local/bin/fd"),
    };
    assert_eq!(
        link.describe(&layout),
        "link /home/dev/.local/bin/fd -> /usr/bin/fdfind"
    );
}

#[cfg(unix)]
#[test]
fn symlink_action_replaces_existing_link() {
    let root = test_root();
    let env = test_env(&root, "http://127.0.0.1:9");
    let target = root.join("fdfind");
    write_executable(&target, b"#!/bin/sh\n");
    let link = root.join(".local").join("bin").join("fd");

    let action = InstallAction::Symlink {
        target: target.clone(),
        link: link.clone(),
    };
    action.run(&env).expect("must create link");
    action.run(&env).expect("must replace link");
    assert_eq!(fs::read_link(&link).expect("must read link"), target);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn archive_step_installs_from_local_server() {
    let root = test_root();
    let tarball = root.join("fixture.tar.gz");
    write_tar_gz(&tarball, "tool-2.0.0/tool", b"fresh tool");
    let server = serve(vec![
        (
            "/repos/owner/tool/releases/latest",
            200,
            br#"{"tag_name":"v2.0.0"}"#.to_vec(),
        ),
        (
            "/dl/2.0.0/tool.tar.gz",
            200,
            fs::read(&tarball).expect("must read fixture"),
        ),
    ]);
    let home = root.join("home");
    let plan = ProvisionPlan::from_toml_str(&format!(
        r#"
[[steps]]
name = "tool"
probe = {{ commands = ["devstrap-test-tool-absent"] }}
install = {{ kind = "archive", repo = "owner/tool", url = "{server}/dl/{{version}}/tool.tar.gz", binary = "tool" }}
"#
    ))
    .expect("must parse plan");
    let env = Rc::new(test_env(&home, &server));
    let steps = build_steps(&plan, &env);

    let report = run_steps(&steps, &ExecutionContext::live(), |_, _| {}).expect("must run");
    assert!(matches!(
        report.outcome_of("tool"),
        Some(StepOutcome::Installed)
    ));
    assert_eq!(
        fs::read(home.join(".local").join("bin").join("tool")).expect("must read tool"),
        b"fresh tool"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn failed_download_is_contained_and_next_step_runs() {
    let root = test_root();
    let server = serve(vec![(
        "/repos/owner/tool/releases/latest",
        200,
        br#"{"tag_name":"v1.0.0"}"#.to_vec(),
    )]);
    let home = root.join("home");
    let target = root.join("batcat");
    fs::write(&target, b"bat").expect("must write target");
    let plan = ProvisionPlan::from_toml_str(&format!(
        r#"
[[steps]]
name = "tool"
probe = {{ commands = ["devstrap-test-tool-absent"] }}
install = {{ kind = "archive", repo = "owner/tool", url = "{server}/missing/{{version}}/tool.zip", binary = "tool" }}

[[steps]]
name = "bat-symlink"
probe = {{ path = "~/.local/bin/bat" }}
install = {{ kind = "symlink", target = "{target}", link = "~/.local/bin/bat" }}
"#,
        target = target.display()
    ))
    .expect("must parse plan");
    let env = Rc::new(test_env(&home, &server));
    let steps = build_steps(&plan, &env);

    let report = run_steps(&steps, &ExecutionContext::live(), |_, _| {}).expect("must run");
    match report.outcome_of("tool") {
        Some(StepOutcome::Failed(StepError::Download { url, reason })) => {
            assert!(url.ends_with("/missing/1.0.0/tool.zip"), "url: {url}");
            assert!(reason.contains("404"), "reason: {reason}");
        }
        other => panic!("unexpected outcome: {other:?}"),
    }
    #[cfg(unix)]
    assert!(matches!(
        report.outcome_of("bat-symlink"),
        Some(StepOutcome::Installed)
    ));
    assert!(!home.join(".local").join("bin").join("tool").exists());

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn document_render_round_trips() {
    for text in ["", "a", "a\n", "a\nb", "a\n\nb\n", "\n"] {
        assert_eq!(ConfigDocument::parse(text.as_bytes()).render(), text.as_bytes());
    }
}

#[test]
fn append_block_starts_on_a_fresh_line() {
    let mut document = ConfigDocument::parse(b"export A=1");
    document.append_block("# marker\nexport B=2\n");
    assert_eq!(document.render(), b"export A=1\n# marker\nexport B=2\n");
    assert_eq!(document.lines().len(), 3);
}

#[test]
fn non_utf8_config_is_patched_without_touching_other_bytes() {
    let root = test_root();
    let layout = TargetLayout::new(&root);
    let zshrc = root.join(".zshrc");
    fs::write(&zshrc, b"# caf\xe9 latin-1 comment\nplugins=(git)\nexport X=\xff\n")
        .expect("must seed zshrc");

    let report = ConfigPatcher::new(&layout)
        .apply(&zshrc_spec(), &ExecutionContext::live())
        .expect("non-UTF-8 content must not abort the patch");
    assert!(report.changed);

    let patched = fs::read(&zshrc).expect("must read patched file");
    let mut expected =
        b"# caf\xe9 latin-1 comment\nplugins=(git zsh-autosuggestions)\nexport X=\xff\n".to_vec();
    expected.extend_from_slice(
        b"# >>> devstrap shell >>>\neval \"$(zoxide init zsh)\"\n# <<< devstrap shell <<<\n",
    );
    assert_eq!(patched, expected);
    assert_eq!(
        fs::read(root.join(".zshrc.devstrap.bak")).expect("must read backup"),
        b"# caf\xe9 latin-1 comment\nplugins=(git)\nexport X=\xff\n"
    );

    let rerun = ConfigPatcher::new(&layout)
        .apply(&zshrc_spec(), &ExecutionContext::live())
        .expect("second patch");
    assert!(!rerun.changed);
    assert_eq!(fs::read(&zshrc).expect("must read"), expected);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn patching_twice_is_byte_identical() {
    let root = test_root();
    let layout = TargetLayout::new(&root);
    let zshrc = root.join(".zshrc");
    fs::write(
        &zshrc,
        "export ZSH=\"$HOME/.oh-my-zsh\"\nplugins=(git)\nsource $ZSH/oh-my-zsh.sh\n",
    )
    .expect("must seed zshrc");
    let spec = zshrc_spec();
    let patcher = ConfigPatcher::new(&layout);

    let first = patcher
        .apply(&spec, &ExecutionContext::live())
        .expect("first patch");
    assert!(first.changed);
    let after_first = fs::read(&zshrc).expect("must read");

    let second = patcher
        .apply(&spec, &ExecutionContext::live())
        .expect("second patch");
    assert!(!second.changed);
    assert_eq!(fs::read(&zshrc).expect("must read"), after_first);
    assert_eq!(
        second.effects,
        vec![
            DirectiveEffect::Replaced {
                pattern: r"^plugins=\(.*\)$".to_string(),
                lines: 1,
            },
            DirectiveEffect::AlreadyPresent {
                marker: "# >>> devstrap shell >>>".to_string(),
            },
        ]
    );

    let text = String::from_utf8(after_first).expect("utf8");
    assert_eq!(text.matches("# >>> devstrap shell >>>").count(), 1);
    assert!(text.contains("plugins=(git zsh-autosuggestions)\n"));
    assert!(!text.contains("plugins=(git)\n"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn backup_is_refreshed_on_each_live_run() {
    let root = test_root();
    let layout = TargetLayout::new(&root);
    let zshrc = root.join(".zshrc");
    fs::write(&zshrc, "plugins=(git)\n").expect("must seed zshrc");
    let patcher = ConfigPatcher::new(&layout);
    let spec = zshrc_spec();

    let first = patcher
        .apply(&spec, &ExecutionContext::live())
        .expect("first patch");
    let backup = first.backup.expect("existing file must be backed up");
    assert_eq!(backup, root.join(".zshrc.devstrap.bak"));
    assert_eq!(fs::read_to_string(&backup).expect("must read"), "plugins=(git)\n");

    let second = patcher
        .apply(&spec, &ExecutionContext::live())
        .expect("second patch");
    assert_eq!(second.backup.as_deref(), Some(backup.as_path()));
    assert_eq!(
        fs::read(&backup).expect("must read backup"),
        fs::read(&zshrc).expect("must read config")
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn unmatched_replace_leaves_file_untouched() {
    let root = test_root();
    let layout = TargetLayout::new(&root);
    let zshrc = root.join(".zshrc");
    fs::write(&zshrc, "# no plugins here\n").expect("must seed");
    let spec = ConfigFileSpec {
        path: "~/.zshrc".to_string(),
        directives: vec![PatchDirective::ReplaceLine {
            pattern: r"^plugins=\(.*\)$".to_string(),
            line: "plugins=(git)".to_string(),
        }],
    };

    let report = ConfigPatcher::new(&layout)
        .apply(&spec, &ExecutionContext::live())
        .expect("must patch");
    assert!(!report.changed);
    assert_eq!(
        report.effects,
        vec![DirectiveEffect::NoMatch {
            pattern: r"^plugins=\(.*\)$".to_string(),
        }]
    );
    assert_eq!(
        fs::read_to_string(&zshrc).expect("must read"),
        "# no plugins here\n"
    );

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn missing_file_is_created_only_when_appending() {
    let root = test_root();
    let layout = TargetLayout::new(&root);
    let patcher = ConfigPatcher::new(&layout);

    let replace_only = ConfigFileSpec {
        path: "~/.config/tool/rc".to_string(),
        directives: vec![PatchDirective::ReplaceLine {
            pattern: "^a=.*$".to_string(),
            line: "a=1".to_string(),
        }],
    };
    let report = patcher
        .apply(&replace_only, &ExecutionContext::live())
        .expect("must patch");
    assert!(!report.changed);
    assert!(report.backup.is_none());
    assert!(!root.join(".config").join("tool").join("rc").exists());

    let gitconfig = ConfigFileSpec {
        path: "~/.config/git/config".to_string(),
        directives: vec![PatchDirective::AppendOnce {
            marker: "# devstrap: delta".to_string(),
            block: "# devstrap: delta\n[core]\n\tpager = delta\n".to_string(),
        }],
    };
    let report = patcher
        .apply(&gitconfig, &ExecutionContext::live())
        .expect("must create");
    assert!(report.changed);
    assert!(report.backup.is_none());
    assert_eq!(
        fs::read_to_string(root.join(".config").join("git").join("config"))
            .expect("must read created file"),
        "# devstrap: delta\n[core]\n\tpager = delta\n"
    );

    let _ = fs::remove_dir_all(&root);
}

#[cfg(unix)]
#[test]
fn patch_preserves_permissions_and_symlinked_dotfiles() {
    use std::os::unix::fs::PermissionsExt;

    let root = test_root();
    let layout = TargetLayout::new(&root);
    let real = root.join("dotfiles").join("zshrc");
    fs::create_dir_all(real.parent().expect("parent")).expect("must create dotfiles dir");
    fs::write(&real, "plugins=(git)\n").expect("must seed");
    fs::set_permissions(&real, fs::Permissions::from_mode(0o600)).expect("must chmod");
    std::os::unix::fs::symlink(&real, root.join(".zshrc")).expect("must link");

    ConfigPatcher::new(&layout)
        .apply(&zshrc_spec(), &ExecutionContext::live())
        .expect("must patch");

    assert!(fs::symlink_metadata(root.join(".zshrc"))
        .expect("must stat link")
        .file_type()
        .is_symlink());
    let text = fs::read_to_string(&real).expect("must read real file");
    assert!(text.starts_with("plugins=(git zsh-autosuggestions)\n"));
    let mode = fs::metadata(&real).expect("must stat").permissions().mode();
    assert_eq!(mode & 0o777, 0o600);

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn simulation_leaves_the_filesystem_untouched() {
    let root = test_root();
    let home = root.join("home");
    fs::create_dir_all(&home).expect("must create home");
    fs::write(home.join(".zshrc"), "plugins=(git)\n").expect("must seed zshrc");
    let mut plan = ProvisionPlan::builtin().expect("builtin plan must load");
    // No probe may find the machine provisioned, so every step is simulated.
    plan.steps.retain(|step| !matches!(step.probe, ProbeSpec::Commands(_)));

    let env = Rc::new(test_env(&home, "http://127.0.0.1:9"));
    let steps = build_steps(&plan, &env);
    let before = snapshot(&root);

    let ctx = ExecutionContext::simulated();
    let mut reports = Vec::new();
    let report = run_provisioning(
        &steps,
        &ctx,
        |_, _| {},
        |ctx| {
            reports = ConfigPatcher::new(env.layout()).apply_all(&plan.config_files, ctx)?;
            Ok(())
        },
    )
    .expect("simulation must succeed");

    assert_eq!(snapshot(&root), before);
    assert!(!report.has_failures());
    assert!(report
        .records()
        .iter()
        .all(|record| matches!(record.outcome, StepOutcome::Simulated)));
    assert_eq!(reports.len(), plan.config_files.len());
    assert!(reports.iter().all(|patch| patch.simulated && patch.backup.is_none()));
    assert!(reports[0].changed);

    let _ = fs::remove_dir_all(&root);
}

fn zshrc_spec() -> ConfigFileSpec {
    ConfigFileSpec {
        path: "~/.zshrc".to_string(),
        directives: vec![
            PatchDirective::ReplaceLine {
                pattern: r"^plugins=\(.*\)$".to_string(),
                line: "plugins=(git zsh-autosuggestions)".to_string(),
            },
            PatchDirective::AppendOnce {
                marker: "# >>> devstrap shell >>>".to_string(),
                block: "# >>> devstrap shell >>>\neval \"$(zoxide init zsh)\"\n# <<< devstrap shell <<<\n"
                    .to_string(),
            },
        ],
    }
}

fn test_client() -> Client {
    Client::builder()
        .no_proxy()
        .build()
        .expect("must build test client")
}

fn test_env(home: &Path, api_base: &str) -> InstallEnv {
    InstallEnv::new(TargetLayout::new(home), test_client(), api_base)
}

/// Serves fixed responses on a loopback port for the rest of the test
/// process; unknown paths get a 404.
fn serve(routes: Vec<(&'static str, u16, Vec<u8>)>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").expect("must bind test server");
    let addr = listener.local_addr().expect("must read addr");
    let routes = routes
        .into_iter()
        .map(|(path, status, body)| (path.to_string(), (status, body)))
        .collect::<BTreeMap<_, _>>();

    std::thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream) = stream else {
                continue;
            };
            let mut request = Vec::new();
            let mut buf = [0_u8; 1024];
            while !request.windows(4).any(|window| window == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(read) => request.extend_from_slice(&buf[..read]),
                }
            }
            let head = String::from_utf8_lossy(&request);
            let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
            let (status, body) = routes
                .get(&path)
                .cloned()
                .unwrap_or((404, b"not found".to_vec()));
            let reason = if status == 200 { "OK" } else { "Not Found" };
            let header = format!(
                "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(header.as_bytes());
            let _ = stream.write_all(&body);
        }
    });

    format!("http://{addr}")
}

fn write_tar_gz(path: &Path, entry: &str, contents: &[u8]) {
    let file = fs::File::create(path).expect("must create tarball");
    let mut builder = tar::Builder::new(GzEncoder::new(file, Compression::default()));
    let mut header = tar::Header::new_gnu();
    header.set_size(contents.len() as u64);
    header.set_mode(0o755);
    builder
        .append_data(&mut header, entry, contents)
        .expect("must append entry");
    builder
        .into_inner()
        .expect("must finish tar")
        .finish()
        .expect("must finish gzip");
}

fn write_zip(path: &Path, entry: &str, contents: &[u8]) {
    let file = fs::File::create(path).expect("must create zip");
    let mut writer = zip::ZipWriter::new(file);
    let options = zip::write::SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o755);
    writer.start_file(entry, options).expect("must start entry");
    writer.write_all(contents).expect("must write entry");
    writer.finish().expect("must finish zip");
}

fn write_executable(path: &Path, contents: &[u8]) {
    fs::write(path, contents).expect("must write executable");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("must chmod");
    }
}

/// Every path under `root` with file contents or link targets.
fn snapshot(root: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut entries = BTreeMap::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).expect("must read dir") {
            let path = entry.expect("must read entry").path();
            let metadata = fs::symlink_metadata(&path).expect("must stat");
            let contents = if metadata.file_type().is_symlink() {
                fs::read_link(&path)
                    .expect("must read link")
                    .into_os_string()
                    .into_encoded_bytes()
            } else if metadata.is_dir() {
                pending.push(path.clone());
                Vec::new()
            } else {
                fs::read(&path).expect("must read file")
            };
            entries.insert(path, contents);
        }
    }
    entries
}

static TEST_ROOT_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_ROOT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!(
        "devstrap-installer-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test root");
    path
}
