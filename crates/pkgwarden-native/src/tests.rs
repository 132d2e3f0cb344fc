use std::collections::VecDeque;
use std::io;
use std::process::Command;
use std::sync::{Arc, Mutex};

use pkgwarden_core::PackageSummary;

use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
struct RecordedCall {
    program: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
}

impl RecordedCall {
    fn line(&self) -> String {
        let mut parts = vec![self.program.clone()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }

    fn env_value(&self, key: &str) -> Option<&str> {
        self.env
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Default)]
struct ScriptedRunner {
    responses: Mutex<VecDeque<io::Result<CommandOutput>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedRunner {
    fn with(responses: Vec<io::Result<CommandOutput>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &mut Command) -> io::Result<CommandOutput> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            program: command.get_program().to_string_lossy().into_owned(),
            args: command
                .get_args()
                .map(|arg| arg.to_string_lossy().into_owned())
                .collect(),
            env: command
                .get_envs()
                .filter_map(|(key, value)| {
                    Some((
                        key.to_string_lossy().into_owned(),
                        value?.to_string_lossy().into_owned(),
                    ))
                })
                .collect(),
        });
        self.responses
            .lock()
            .expect("responses lock")
            .pop_front()
            .unwrap_or_else(|| Ok(ok("")))
    }
}

fn ok(stdout: &str) -> CommandOutput {
    CommandOutput {
        code: Some(0),
        stdout: stdout.to_string(),
        stderr: String::new(),
    }
}

fn failed(code: i32, stderr: &str) -> CommandOutput {
    CommandOutput {
        code: Some(code),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[test]
fn detect_selects_pacman_when_version_check_runs() {
    let runner = ScriptedRunner::with(vec![Ok(ok("Pacman v6.1.0"))]);
    let manager = PackageManager::detect_with(runner.clone()).expect("must detect");
    assert_eq!(manager.kind(), BackendKind::Pacman);
    assert_eq!(runner.calls()[0].line(), "pacman --version");
}

#[test]
fn detect_falls_back_to_apt_when_pacman_is_missing() {
    let runner = ScriptedRunner::with(vec![Err(io::Error::from(io::ErrorKind::NotFound))]);
    let manager = PackageManager::detect_with(runner).expect("must detect");
    assert_eq!(manager.kind(), BackendKind::Apt);
}

#[test]
fn detect_propagates_other_version_check_failures() {
    let runner = ScriptedRunner::with(vec![Err(io::Error::from(
        io::ErrorKind::PermissionDenied,
    ))]);
    let err = PackageManager::detect_with(runner)
        .err()
        .expect("permission failure must not default to a backend");
    match err {
        BackendError::Spawn { command, source } => {
            assert_eq!(command, "pacman --version");
            assert_eq!(source.kind(), io::ErrorKind::PermissionDenied);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn apt_upgradable_parsing_skips_headers_and_warnings() {
    let stdout = "Listing... Done\n\
wget/focal-updates 1.20.3-1ubuntu2 amd64 [upgradable from: 1.20.3-1ubuntu1]\n\
WARNING: apt does not have a stable CLI interface.\n\
tux-web/stable 2.1.0 all [upgradable from: 2.0.4]\n";
    let parsed = apt::parse_upgradable(stdout);
    assert_eq!(
        parsed,
        vec![
            pkgwarden_core::UpgradableInfo::new("wget", "1.20.3-1ubuntu1", "1.20.3-1ubuntu2"),
            pkgwarden_core::UpgradableInfo::new("tux-web", "2.0.4", "2.1.0"),
        ]
    );
}

#[test]
fn apt_installed_parsing_accepts_flag_variants() {
    let stdout = "Listing...\n\
bash/focal,now 5.0-6ubuntu1 amd64 [installed]\n\
libc6/focal,now 2.31-0ubuntu9 amd64 [installed,automatic]\n\
curl/focal 7.68.0-1 amd64\n";
    let parsed = apt::parse_installed(stdout);
    let parsed_names = parsed.iter().map(|p| p.name.as_str()).collect::<Vec<_>>();
    assert_eq!(parsed_names, vec!["bash", "libc6"]);
    assert_eq!(parsed[1].version, "2.31-0ubuntu9");
}

#[test]
fn apt_list_installed_runs_installed_listing() {
    let runner = ScriptedRunner::with(vec![Ok(ok(
        "Listing...\nbash/focal,now 5.0-6ubuntu1 amd64 [installed]\ncurl/focal 7.68.0-1 amd64\n",
    ))]);
    let apt = Apt::new(runner.clone());

    let installed = apt.list_installed().expect("must list");

    assert_eq!(installed, vec![PackageSummary::new("bash", "5.0-6ubuntu1")]);
    assert_eq!(runner.calls()[0].line(), "apt list --installed");
}

#[test]
fn apt_show_reads_first_record_with_continuations() {
    let stdout = "Package: nginx\n\
Version: 1.18.0-0ubuntu1\n\
Installed-Size: 44.0 kB\n\
Description: small, powerful, scalable web/proxy server\n Nginx is a web server.\n\n\
Package: nginx\nVersion: 1.17.0\n";
    let summary = apt::parse_show(stdout).expect("must parse");
    assert_eq!(summary.name, "nginx");
    assert_eq!(summary.version, "1.18.0-0ubuntu1");
    assert_eq!(summary.installed_size.as_deref(), Some("44.0 kB"));
    assert_eq!(
        summary.description.as_deref(),
        Some("small, powerful, scalable web/proxy server\nNginx is a web server.")
    );
}

#[test]
fn apt_upgrade_with_deferred_restart_sets_marker() {
    let runner = ScriptedRunner::with(vec![]);
    let apt = Apt::new(runner.clone());
    apt.upgrade(&names(&["tux-web"]), UpgradeOptions::deferred_restart())
        .expect("must upgrade");

    let calls = runner.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].line(), "apt -yq install --only-upgrade tux-web");
    assert_eq!(calls[0].env_value(DEFER_RESTART_ENV), Some("yes"));
    assert_eq!(calls[0].env_value("DEBIAN_FRONTEND"), Some("noninteractive"));
}

#[test]
fn apt_upgrade_without_names_upgrades_everything() {
    let runner = ScriptedRunner::with(vec![]);
    Apt::new(runner.clone())
        .upgrade(&[], UpgradeOptions::default())
        .expect("must upgrade");
    let calls = runner.calls();
    assert_eq!(calls[0].line(), "apt -yq upgrade");
    assert_eq!(calls[0].env_value(DEFER_RESTART_ENV), None);
}

#[test]
fn apt_failure_carries_command_exit_code_and_stderr() {
    let runner = ScriptedRunner::with(vec![Ok(failed(100, "E: Unable to lock\n"))]);
    let err = Apt::new(runner)
        .install(&names(&["tux-db"]), true)
        .expect_err("install must fail");
    match err {
        BackendError::Execution(execution) => {
            assert_eq!(execution.command, "apt -yq install tux-db");
            assert_eq!(execution.exit_code, Some(100));
            assert_eq!(execution.stderr, "E: Unable to lock");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn apt_info_maps_missing_package_to_not_found() {
    let runner = ScriptedRunner::with(vec![Ok(failed(100, "E: No packages found"))]);
    let err = Apt::new(runner).info("ghost").expect_err("must fail");
    assert!(err.is_not_found(), "{err}");
}

#[test]
fn apt_is_installed_requires_installed_status() {
    let runner = ScriptedRunner::with(vec![
        Ok(ok("Package: nginx\nStatus: install ok installed\n")),
        Ok(ok("Package: nginx\nStatus: deinstall ok config-files\n")),
    ]);
    let apt = Apt::new(runner.clone());
    assert!(apt.is_installed("nginx").expect("must query"));
    assert!(!apt.is_installed("nginx").expect("must query"));
    assert_eq!(runner.calls()[0].line(), "dpkg -s nginx");
}

#[test]
fn pacman_upgradable_parsing_skips_ignored_and_noise() {
    let stdout = "php-fpm 7.2.0-1 -> 7.2.0-2\n\
linux 6.1.1-1 -> 6.1.2-1 [ignored]\n\
:: some notice\n\
tux-web 2.0.4-1 -> 2.1.0-1\n";
    let parsed = pacman::parse_upgradable(stdout);
    assert_eq!(
        parsed,
        vec![
            pkgwarden_core::UpgradableInfo::new("php-fpm", "7.2.0-1", "7.2.0-2"),
            pkgwarden_core::UpgradableInfo::new("tux-web", "2.0.4-1", "2.1.0-1"),
        ]
    );
}

#[test]
fn pacman_nothing_upgradable_is_an_empty_list() {
    let runner = ScriptedRunner::with(vec![Ok(failed(1, ""))]);
    let upgradable = Pacman::new(runner)
        .list_upgradable()
        .expect("exit 1 without stderr means nothing to upgrade");
    assert!(upgradable.is_empty());
}

#[test]
fn pacman_upgradable_failure_with_stderr_is_an_error() {
    let runner = ScriptedRunner::with(vec![Ok(failed(1, "error: failed to init transaction"))]);
    assert!(Pacman::new(runner).list_upgradable().is_err());
}

#[test]
fn pacman_install_respects_needed_flag() {
    let runner = ScriptedRunner::with(vec![]);
    let pacman = Pacman::new(runner.clone());
    pacman.install(&names(&["tux-db"]), true).expect("must install");
    pacman.install(&names(&["tux-db"]), false).expect("must install");
    pacman.remove(&names(&["tux-db"]), true).expect("must remove");

    let lines = runner
        .calls()
        .iter()
        .map(RecordedCall::line)
        .collect::<Vec<_>>();
    assert_eq!(
        lines,
        vec![
            "pacman --noconfirm -S --needed tux-db",
            "pacman --noconfirm -S tux-db",
            "pacman --noconfirm -Rcn tux-db",
        ]
    );
}

#[test]
fn pacman_info_uses_local_database_for_installed_packages() {
    let runner = ScriptedRunner::with(vec![
        Ok(ok("tux-web 2.0.4-1\n")),
        Ok(ok("Name            : tux-web\n\
Version         : 2.0.4-1\n\
Description     : Web frontend\n\
Installed Size  : 1.20 MiB\n\
Packager        : Unknown Packager\n")),
    ]);
    let summary = Pacman::new(runner.clone())
        .info("tux-web")
        .expect("must read info");
    assert_eq!(summary.version, "2.0.4-1");
    assert_eq!(summary.installed_size.as_deref(), Some("1.20 MiB"));
    assert_eq!(runner.calls()[1].line(), "pacman --noconfirm -Qi tux-web");
}

#[test]
fn pacman_info_for_unknown_package_is_not_found() {
    let runner = ScriptedRunner::with(vec![
        Ok(failed(1, "error: package 'ghost' was not found")),
        Ok(failed(1, "error: package 'ghost' was not found")),
    ]);
    let err = Pacman::new(runner).info("ghost").expect_err("must fail");
    assert!(err.is_not_found(), "{err}");
}

#[test]
fn pacman_list_all_prefers_installed_versions() {
    let runner = ScriptedRunner::with(vec![
        Ok(ok("bash 5.2-1\n")),
        Ok(ok("core bash 5.2-2 [installed: 5.2-1]\nextra nginx 1.24-1\n")),
    ]);
    let all = Pacman::new(runner).list_all().expect("must list");
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].name, "bash");
    assert_eq!(all[0].version, "5.2-1");
    assert_eq!(all[1].name, "nginx");
}

#[test]
fn systemctl_reads_state_from_stdout() {
    let runner = ScriptedRunner::with(vec![
        Ok(ok("enabled\n")),
        Ok(CommandOutput {
            code: Some(3),
            stdout: "inactive\n".to_string(),
            stderr: String::new(),
        }),
        Ok(failed(1, "Failed to restart web.service")),
    ]);
    let systemctl = Systemctl::new(runner.clone());
    assert!(systemctl.is_enabled("web.service"));
    assert!(!systemctl.is_active("web.service"));
    assert!(!systemctl.restart("web.service"));
    assert_eq!(runner.calls()[2].line(), "systemctl restart web.service");
}

#[test]
fn systemctl_spawn_failure_reads_as_false() {
    let runner = ScriptedRunner::with(vec![Err(io::Error::from(io::ErrorKind::NotFound))]);
    assert!(!Systemctl::new(runner).is_active("web.service"));
}
