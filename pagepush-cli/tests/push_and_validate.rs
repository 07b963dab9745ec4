mod common;

use std::fs;

use assert_cmd::prelude::*;
use predicates::str::contains;
use tempfile::TempDir;

use common::{git, git_available, pagepush_cmd, Site};

#[test]
fn no_arguments_is_a_usage_error() {
    let home = TempDir::new().expect("home");
    pagepush_cmd(home.path())
        .assert()
        .code(2)
        .stderr(contains("nothing to do"));
}

#[test]
fn validate_rejects_directory_without_git() {
    let home = TempDir::new().expect("home");
    let plain = TempDir::new().expect("plain dir");

    pagepush_cmd(home.path())
        .arg("--repo")
        .arg(plain.path())
        .arg("--validate")
        .assert()
        .failure()
        .stderr(contains("not a git working copy"));
}

#[test]
fn missing_config_points_at_init() {
    let home = TempDir::new().expect("home");
    pagepush_cmd(home.path())
        .arg("--validate")
        .assert()
        .failure()
        .stderr(contains("pagepush init"));
}

#[test]
fn validate_reports_healthy_clone() {
    if !git_available() {
        return;
    }
    let site = Site::new();
    site.write_config(|_| {});

    pagepush_cmd(site.home.path())
        .arg("--validate")
        .assert()
        .success()
        .stdout(contains("branch:     main"))
        .stdout(contains("repository is healthy"));
}

#[test]
fn validate_warns_on_clone_without_remote() {
    if !git_available() {
        return;
    }
    let site = Site::new();
    site.write_config(|_| {});
    git(&site.checkout, &["remote", "remove", "origin"]);

    pagepush_cmd(site.home.path())
        .arg("--validate")
        .assert()
        .success()
        .stdout(contains("remotes:    (none)"))
        .stdout(contains("no remote configured"))
        .stdout(contains("repository is healthy"));
}

#[test]
fn validate_fails_when_git_status_fails() {
    if !git_available() {
        return;
    }
    let site = Site::new();
    site.write_config(|_| {});
    // A `.git` that is not a repository passes the checkout check but
    // breaks every git command.
    fs::remove_dir_all(site.checkout.join(".git")).expect("remove .git");
    fs::write(site.checkout.join(".git"), "gitdir: /nonexistent\n").expect("bogus .git");

    pagepush_cmd(site.home.path())
        .arg("--validate")
        .assert()
        .code(1)
        .stdout(contains("✗"));
}

#[test]
fn message_pushes_pending_changes() {
    if !git_available() {
        return;
    }
    let site = Site::new();
    site.write_config(|_| {});
    fs::write(site.checkout.join("index.html"), "<p>edited</p>\n").expect("edit");

    pagepush_cmd(site.home.path())
        .arg("Automated update of index.html")
        .assert()
        .success()
        .stdout(contains("success"));

    assert_eq!(site.remote_file("index.html").as_deref(), Some("<p>edited</p>\n"));
    assert_eq!(site.remote_subject(), "Automated update of index.html");
}

#[test]
fn message_without_changes_is_no_changes() {
    if !git_available() {
        return;
    }
    let site = Site::new();
    site.write_config(|_| {});

    pagepush_cmd(site.home.path())
        .arg("nothing new")
        .assert()
        .success()
        .stdout(contains("no-changes"));
    assert_eq!(site.remote_subject(), "seed");
}

#[test]
fn suppression_variable_skips_push() {
    if !git_available() {
        return;
    }
    let site = Site::new();
    site.write_config(|_| {});
    fs::write(site.checkout.join("index.html"), "<p>regenerated</p>\n").expect("edit");

    pagepush_cmd(site.home.path())
        .env("PAGEPUSH_SUPPRESS_UPLOAD", "1")
        .arg("Automated update of index.html")
        .assert()
        .success()
        .stdout(contains("skipping push"));

    assert_eq!(site.remote_subject(), "seed");
    assert!(
        !git(&site.checkout, &["status", "--porcelain"]).is_empty(),
        "working tree left untouched"
    );
}

#[test]
fn force_sync_resets_to_remote_and_keeps_backup() {
    if !git_available() {
        return;
    }
    let site = Site::new();
    site.write_config(|_| {});
    fs::write(site.checkout.join("index.html"), "<p>local</p>\n").expect("edit");
    git(&site.checkout, &["commit", "--quiet", "-am", "local only"]);

    pagepush_cmd(site.home.path())
        .arg("--force-sync")
        .assert()
        .success()
        .stdout(contains("reset to origin/main"))
        .stdout(contains("pagepush-backup-"));

    assert_eq!(
        fs::read_to_string(site.checkout.join("index.html")).expect("read"),
        "<p>home</p>\n"
    );
}
