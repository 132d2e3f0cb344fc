use std::cell::RefCell;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use pkgwarden_core::{PackageRecord, PackageUpdate};
use pkgwarden_native::ServiceManager;
use pkgwarden_store::StateDocument;
use pkgwarden_tasks::{
    change_set, InstallAction, InstallOutcome, ProgressEvent, ProgressPayload, RefreshOutcome,
    RefreshStatus, ServiceRestart, TaskKind, UpgradeOutcome,
};

use super::*;
use crate::completion::write_completions_script;
use crate::config::{resolve_config_path, AppConfig, DEFAULT_CONFIG_PATH};
use crate::dispatch::{desired_install_maps, run_service_action};
use crate::render::{
    format_install_outcome, format_package_lines, format_refresh_outcome,
    format_update_set_lines, format_upgrade_outcome, render_plain_event, render_status_line,
    OutputStyle,
};

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn install_parses_names_and_removals() {
    let cli = Cli::try_parse_from([
        "pkgwarden", "install", "web", "db", "--remove", "legacy", "--plain",
    ])
    .expect("must parse");

    assert!(cli.plain);
    match cli.command {
        Commands::Install { names, remove } => {
            assert_eq!(names, vec!["web", "db"]);
            assert_eq!(remove, vec!["legacy"]);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn service_action_rejects_unknown_verb() {
    let cli = Cli::try_parse_from(["pkgwarden", "service", "stop", "db.service"])
        .expect("must parse");
    assert!(matches!(
        cli.command,
        Commands::Service {
            action: ServiceAction::Stop,
            ..
        }
    ));
    assert!(Cli::try_parse_from(["pkgwarden", "service", "reload", "db.service"]).is_err());
}

#[test]
fn sync_accepts_no_refresh_flag() {
    let cli = Cli::try_parse_from(["pkgwarden", "--config", "/tmp/pw.toml", "sync", "--no-refresh"])
        .expect("must parse");
    assert_eq!(cli.config, Some(PathBuf::from("/tmp/pw.toml")));
    assert!(matches!(cli.command, Commands::Sync { no_refresh: true }));
}

#[test]
fn config_defaults_when_file_is_missing() {
    let root = test_dir();
    let config = AppConfig::load(&root.join("absent.toml")).expect("missing file is fine");
    assert_eq!(config, AppConfig::default());
    assert_eq!(config.state_root, PathBuf::from("/var/lib/pkgwarden"));
    assert_eq!(
        config.package_search_paths,
        vec![PathBuf::from("/etc/pkgwarden/packages")]
    );
    assert_eq!(config.log_level, "info");
}

#[test]
fn config_file_overrides_selected_keys() {
    let root = test_dir();
    fs::create_dir_all(&root).expect("must create dir");
    let path = root.join("config.toml");
    fs::write(
        &path,
        "state_root = \"/srv/pkgwarden\"\npackage_search_paths = [\"/a\", \"/b\"]\n",
    )
    .expect("must write config");

    let config = AppConfig::load(&path).expect("must load");
    assert_eq!(config.state_layout().root(), Path::new("/srv/pkgwarden"));
    assert_eq!(
        config.catalogue().search_paths(),
        &[PathBuf::from("/a"), PathBuf::from("/b")]
    );
    assert_eq!(config.log_level, "info");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn config_rejects_unknown_keys() {
    let err = AppConfig::from_toml_str("state_dir = \"/tmp\"").expect_err("must reject");
    assert!(format!("{err:#}").contains("state_dir"), "{err:#}");
}

#[test]
fn config_path_prefers_flag_then_environment() {
    let flag = Path::new("/opt/flag.toml");
    assert_eq!(
        resolve_config_path(Some(flag), Some(OsString::from("/opt/env.toml"))),
        PathBuf::from("/opt/flag.toml")
    );
    assert_eq!(
        resolve_config_path(None, Some(OsString::from("/opt/env.toml"))),
        PathBuf::from("/opt/env.toml")
    );
    assert_eq!(
        resolve_config_path(None, Some(OsString::new())),
        PathBuf::from(DEFAULT_CONFIG_PATH)
    );
    assert_eq!(resolve_config_path(None, None), PathBuf::from(DEFAULT_CONFIG_PATH));
}

#[test]
fn install_maps_use_recorded_state() {
    let mut state = StateDocument::default();
    state.upsert_package(record("web", true));
    state.upsert_package(record("db", false));

    let (old, new) = desired_install_maps(
        &state,
        &["db".to_string(), "api".to_string()],
        &["web".to_string()],
    )
    .expect("must build maps");

    assert_eq!(old.get("web"), Some(&true));
    assert_eq!(old.get("db"), Some(&false));
    assert_eq!(old.get("api"), Some(&false));
    assert_eq!(new.get("db"), Some(&true));
    assert_eq!(new.get("api"), Some(&true));
    assert_eq!(new.get("web"), Some(&false));
}

#[test]
fn remove_of_unrecorded_package_is_kept() {
    let state = StateDocument::default();

    let (old, new) = desired_install_maps(&state, &[], &["web".to_string()])
        .expect("must build maps");

    assert_eq!(
        change_set(&old, &new),
        vec![("web".to_string(), InstallAction::Remove)]
    );
}

#[test]
fn install_maps_reject_conflicts_and_empty_requests() {
    let state = StateDocument::default();
    let err = desired_install_maps(&state, &["db".to_string()], &["db".to_string()])
        .expect_err("must reject");
    assert_eq!(err.to_string(), "'db' cannot be both installed and removed");
    assert!(desired_install_maps(&state, &[], &[]).is_err());
}

#[test]
fn service_action_failure_is_an_error() {
    let services = FakeServices::default();
    run_service_action(&services, ServiceAction::Start, "web.service").expect("start works");
    let err = run_service_action(&services, ServiceAction::Restart, "db.service")
        .expect_err("restart fails");
    assert_eq!(err.to_string(), "failed to restart service db.service");
    assert_eq!(
        services.calls.borrow().as_slice(),
        ["start web.service", "restart db.service"]
    );
}

#[test]
fn refresh_outcome_lists_canceled_sets() {
    let outcome = RefreshOutcome {
        status: RefreshStatus::Created { update_set_id: 4 },
        superseded: vec![2, 3],
    };
    assert_eq!(format_refresh_outcome(&outcome), "created update set 4 (canceled 2, 3)");
}

#[test]
fn upgrade_outcome_reports_each_restart() {
    let outcome = UpgradeOutcome::Completed {
        update_set_id: 1,
        upgraded: vec!["db".to_string()],
        restarts: vec![
            ServiceRestart {
                service: "db.service".to_string(),
                restarted: true,
            },
            ServiceRestart {
                service: "db-worker.service".to_string(),
                restarted: false,
            },
        ],
    };
    assert_eq!(
        format_upgrade_outcome(&outcome),
        vec![
            "update set 1 done: upgraded db",
            "service db.service: restarted",
            "service db-worker.service: restart failed",
        ]
    );
    assert_eq!(format_install_outcome(&InstallOutcome::default()), "nothing to change");
}

#[test]
fn package_and_update_listings() {
    let mut state = StateDocument::default();
    assert_eq!(format_package_lines(&state), vec!["no package records; run `pkgwarden sync`"]);

    state.upsert_package(record("web", true));
    let id = state.create_update_set(
        "f1",
        vec![PackageUpdate {
            package_key: "web".to_string(),
            from_version: "1.0".to_string(),
            to_version: "1.1".to_string(),
            updated: true,
        }],
        0,
    );

    assert_eq!(format_package_lines(&state), vec!["web - (installed) Web"]);
    assert_eq!(
        format_update_set_lines(&state),
        vec![
            format!("#{id} pending (1 package(s))"),
            "  [x] web 1.0 -> 1.1".to_string(),
        ]
    );
}

#[test]
fn plain_rendering_has_no_escape_codes() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "sync", "done"),
        "sync: done"
    );
    let event = ProgressEvent::Progress {
        task: TaskKind::Upgrade,
        payload: ProgressPayload {
            total: 3,
            processed: 1,
            message: "Database".to_string(),
            name: Some("db".to_string()),
        },
    };
    assert_eq!(
        render_plain_event(&event).as_deref(),
        Some("[upgrade] 1/3 Database")
    );
    assert_eq!(
        render_plain_event(&ProgressEvent::Done {
            task: TaskKind::Upgrade
        }),
        None
    );
}

#[test]
fn bash_completions_mention_subcommands() {
    let mut output = Vec::new();
    write_completions_script(clap_complete::Shell::Bash, &mut output).expect("must generate");
    let script = String::from_utf8(output).expect("utf8");
    assert!(script.contains("pkgwarden"));
    assert!(script.contains("upgrade"));
}

#[derive(Default)]
struct FakeServices {
    calls: RefCell<Vec<String>>,
}

impl FakeServices {
    fn act(&self, verb: &str, service: &str) -> bool {
        self.calls.borrow_mut().push(format!("{verb} {service}"));
        service != "db.service"
    }
}

impl ServiceManager for FakeServices {
    fn is_enabled(&self, _service: &str) -> bool {
        true
    }

    fn is_active(&self, _service: &str) -> bool {
        true
    }

    fn is_failed(&self, _service: &str) -> bool {
        false
    }

    fn restart(&self, service: &str) -> bool {
        self.act("restart", service)
    }

    fn start(&self, service: &str) -> bool {
        self.act("start", service)
    }

    fn stop(&self, service: &str) -> bool {
        self.act("stop", service)
    }
}

fn record(key: &str, installed: bool) -> PackageRecord {
    let mut name = key.to_string();
    if let Some(first) = name.get_mut(0..1) {
        first.make_ascii_uppercase();
    }
    PackageRecord {
        key: key.to_string(),
        name,
        config_path: None,
        endpoint: None,
        installed,
        info: None,
        control_services_restart: false,
        services: Vec::new(),
        refreshed_at_unix: 0,
    }
}

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("pkgwarden-cli-test-{nanos}"))
}
