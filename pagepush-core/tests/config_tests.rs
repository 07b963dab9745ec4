//! Config error-message, atomic-write-safety, and init integration tests.
//! Storage: ~/.pagepush/config.yaml

use assert_fs::prelude::*;
use pagepush_core::{config, ConfigError};
use predicates::prelude::predicate;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

fn write_config(home: &assert_fs::TempDir, yaml: &str) {
    home.child(".pagepush/config.yaml")
        .write_str(yaml)
        .expect("write config");
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
    assert!(err.to_string().contains("pagepush init"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, ": : corrupt : yaml : !!!\n  - broken: [unclosed");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"), "must contain file path");
}

#[test]
fn load_without_repository_section_is_a_parse_error() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, "push:\n  debounce_secs: 5\n");

    let err = config::load_at(home.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }), "got: {err}");
}

#[rstest]
#[case::negative_age("repository:\n  path: /srv/site\nfreshness:\n  max_age_hours: -1\n", "freshness.max_age_hours")]
#[case::absolute_destination(
    "repository:\n  path: /srv/site\nartifacts:\n  - source: /tmp/a.html\n    destination: /abs/a.html\n",
    "artifacts.destination"
)]
#[case::empty_repository("repository:\n  path: ''\n", "repository.path")]
fn invalid_values_are_rejected(#[case] yaml: &str, #[case] field: &str) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(&home, yaml);

    let err = config::load_at(home.path()).unwrap_err();
    match err {
        ConfigError::Invalid { field: got, .. } => assert_eq!(got, field),
        other => panic!("expected invalid config, got {other:?}"),
    }
}

#[rstest]
#[case(5)]
#[case(30)]
fn debounce_is_configurable(#[case] secs: u64) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(
        &home,
        &format!("repository:\n  path: /srv/site\npush:\n  debounce_secs: {secs}\n"),
    );
    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.push.debounce().as_secs(), secs);
    assert_eq!(loaded.push.max_retry_attempts, config::MAX_RETRY_ATTEMPTS);
}

#[rstest]
#[case::never_expire(1e20, Duration::MAX)]
#[case::default_day(24.0, Duration::from_secs(24 * 3600))]
#[case::zero(0.0, Duration::ZERO)]
fn max_age_hours_converts_without_overflow(#[case] hours: f64, #[case] expected: Duration) {
    let home = assert_fs::TempDir::new().expect("tempdir");
    write_config(
        &home,
        &format!("repository:\n  path: /srv/site\nfreshness:\n  max_age_hours: {hours:e}\n"),
    );
    let loaded = config::load_at(home.path()).expect("load");
    assert_eq!(loaded.freshness.max_age(), expected);
}

// ---------------------------------------------------------------------------
// 2. Atomic write safety
// ---------------------------------------------------------------------------

#[test]
fn save_creates_state_dir_and_cleans_up_tmp() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let cfg = pagepush_core::Config::for_repository(PathBuf::from("/srv/site"));
    config::save_at(home.path(), &cfg).expect("save");

    home.child(".pagepush/config.yaml")
        .assert(predicate::path::exists());
    home.child(".pagepush/config.yaml.tmp")
        .assert(predicate::path::missing());
}

#[cfg(unix)]
#[test]
fn saved_config_is_private() {
    use std::os::unix::fs::PermissionsExt;

    let home = assert_fs::TempDir::new().expect("tempdir");
    let cfg = pagepush_core::Config::for_repository(PathBuf::from("/srv/site"));
    config::save_at(home.path(), &cfg).expect("save");

    let mode = fs::metadata(config::config_path_at(home.path()))
        .expect("metadata")
        .permissions()
        .mode()
        & 0o777;
    assert_eq!(mode, 0o600);
}

// ---------------------------------------------------------------------------
// 3. Init
// ---------------------------------------------------------------------------

#[test]
fn init_writes_config_for_checkout() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let repo = assert_fs::TempDir::new().expect("repo");
    repo.child(".git").create_dir_all().expect("mkdir .git");

    let cfg = config::init_at(home.path(), repo.path().to_path_buf()).expect("init");
    assert_eq!(cfg.repository.path, repo.path());

    home.child(".pagepush/config.yaml")
        .assert(predicate::str::contains("repository:"));
    let handle = cfg.repository_handle().expect("handle");
    assert_eq!(handle.path(), repo.path());
}

#[test]
fn init_rejects_plain_directory() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let plain = assert_fs::TempDir::new().expect("plain");

    let err = config::init_at(home.path(), plain.path().to_path_buf()).unwrap_err();
    assert!(matches!(err, ConfigError::NotAGitRepository { .. }), "got: {err}");
    home.child(".pagepush/config.yaml")
        .assert(predicate::path::missing());
}
