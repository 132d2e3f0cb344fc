use std::fs;
use std::path::PathBuf;

use super::*;

#[test]
fn fingerprint_ignores_input_order() {
    let forward = vec![
        UpgradableInfo::new("db", "2.0", "2.1"),
        UpgradableInfo::new("web", "1.0", "1.1"),
    ];
    let reversed = vec![
        UpgradableInfo::new("web", "1.0", "1.1"),
        UpgradableInfo::new("db", "2.0", "2.1"),
    ];

    let a = update_set_fingerprint(&forward).expect("must fingerprint");
    let b = update_set_fingerprint(&reversed).expect("must fingerprint");
    assert_eq!(a, b);
    assert_eq!(a.len(), 64);
}

#[test]
fn fingerprint_changes_with_target_version() {
    let first = update_set_fingerprint(&[UpgradableInfo::new("web", "1.0", "1.1")])
        .expect("must fingerprint");
    let second = update_set_fingerprint(&[UpgradableInfo::new("web", "1.0", "1.2")])
        .expect("must fingerprint");
    assert_ne!(first, second);
}

#[test]
fn fingerprint_of_empty_list_is_stable() {
    let empty = update_set_fingerprint(&[]).expect("must fingerprint");
    // sha256("[]")
    assert_eq!(
        empty,
        "4f53cda18c2baa0c0354bb5f9a3ecbe5ed12ab4d8e11ba873c2f11161202b945"
    );
}

#[test]
fn update_set_cancel_only_affects_pending_sets() {
    let mut pending = UpdateSet::new(1, "abc", 10);
    assert!(pending.cancel());
    assert_eq!(pending.state(), UpdateSetState::Canceled);
    assert!(!pending.cancel(), "second cancel must be a no-op");

    let mut done = UpdateSet::new(2, "def", 10);
    done.mark_done();
    assert!(!done.cancel());
    assert_eq!(done.state(), UpdateSetState::Done);
}

#[test]
fn update_set_reactivate_reports_change() {
    let mut set = UpdateSet::new(1, "abc", 10);
    assert!(!set.reactivate());
    set.cancel();
    assert!(set.reactivate());
    assert!(set.is_pending());
}

#[test]
fn reactivated_set_forgets_applied_items() {
    let mut set = UpdateSet::new(1, "abc", 10);
    set.packages.push(PackageUpdate {
        package_key: "web".to_string(),
        from_version: "1.0".to_string(),
        to_version: "1.1".to_string(),
        updated: true,
    });
    set.mark_done();

    assert!(set.reactivate());
    assert!(!set.packages[0].updated);

    set.packages[0].updated = true;
    assert!(!set.reactivate(), "pending set is left as is");
    assert!(set.packages[0].updated);
}

#[test]
fn definition_parses_with_defaults() {
    let definition = PackageDefinition::from_toml_str(
        r#"
name = "Web Frontend"
services = ["nginx.service", "web.service"]
"#,
    )
    .expect("must parse");

    assert_eq!(definition.name, "Web Frontend");
    assert!(!definition.control_services_restart);
    assert!(definition.config_path.is_none());
    assert_eq!(definition.services, vec!["nginx.service", "web.service"]);
}

#[test]
fn definition_rejects_duplicate_services() {
    let err = PackageDefinition::from_toml_str(
        r#"
name = "web"
services = ["web.service", "web.service"]
"#,
    )
    .expect_err("duplicate services must fail");
    assert!(err.to_string().contains("more than once"), "{err}");
}

#[test]
fn definition_rejects_empty_name() {
    assert!(PackageDefinition::from_toml_str("name = \"  \"\n").is_err());
}

#[test]
fn later_search_path_overrides_earlier_definition() {
    let root = test_root();
    let system = root.join("system");
    let local = root.join("local");
    fs::create_dir_all(&system).expect("must create system dir");
    fs::create_dir_all(&local).expect("must create local dir");

    fs::write(system.join("web.toml"), "name = \"web\"\n").expect("must write");
    fs::write(system.join("db.toml"), "name = \"db\"\n").expect("must write");
    fs::write(system.join("README.md"), "not a definition").expect("must write");
    fs::write(
        local.join("web.toml"),
        "name = \"web (local)\"\ncontrol_services_restart = true\n",
    )
    .expect("must write");

    let catalogue = load_catalogue(&[system, local, root.join("missing")])
        .expect("must load catalogue");

    assert_eq!(catalogue.len(), 2);
    let web = catalogue.get("web").expect("web must exist");
    assert_eq!(web.name, "web (local)");
    assert!(web.control_services_restart);
    assert!(catalogue.contains("db"));

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn invalid_definition_file_names_the_path() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create dir");
    fs::write(root.join("broken.toml"), "name = [").expect("must write");

    let err = load_catalogue(std::slice::from_ref(&root)).expect_err("must fail");
    assert!(format!("{err:#}").contains("broken.toml"), "{err:#}");

    let _ = fs::remove_dir_all(&root);
}

#[test]
fn directory_catalogue_reads_through_source_trait() {
    let root = test_root();
    fs::create_dir_all(&root).expect("must create dir");
    fs::write(root.join("web.toml"), "name = \"web\"\n").expect("must write");

    let source = DirectoryCatalogue::new(vec![root.clone()]);
    let catalogue = source.control_packages().expect("must load");
    assert_eq!(catalogue.keys().into_iter().collect::<Vec<_>>(), vec!["web"]);

    let _ = fs::remove_dir_all(&root);
}

fn test_root() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    std::env::temp_dir().join(format!("pkgwarden-core-test-{nanos}"))
}
