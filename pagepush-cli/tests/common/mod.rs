//! Fixtures shared by the CLI integration tests: the built binary and a
//! bare remote with a clone the CLI publishes into.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use pagepush_core::{config, Artifact, Config};
use tempfile::TempDir;

pub fn pagepush_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_pagepush") {
        return PathBuf::from(path);
    }

    let this_test = std::env::current_exe().expect("current_exe");
    let deps_dir = this_test.parent().expect("deps dir");
    let debug_dir = deps_dir.parent().expect("debug dir");

    let direct = debug_dir.join("pagepush");
    if direct.exists() {
        return direct;
    }

    let mut candidates: Vec<_> = fs::read_dir(deps_dir)
        .expect("read deps dir")
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            let Some(name) = p.file_name().and_then(|n| n.to_str()) else {
                return false;
            };
            name.starts_with("pagepush-") && !name.ends_with(".d") && p.is_file()
        })
        .collect();
    candidates.sort();
    candidates
        .into_iter()
        .next()
        .expect("unable to locate pagepush binary in target/debug or target/debug/deps")
}

/// `pagepush` with `HOME` pointed at `home` and suppression cleared.
pub fn pagepush_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(pagepush_bin_path());
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("PAGEPUSH_SUPPRESS_UPLOAD")
        .env_remove("RUST_LOG");
    cmd
}

pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .env("GIT_TERMINAL_PROMPT", "0")
        .output()
        .expect("spawn git");
    assert!(
        output.status.success(),
        "git {} failed: {}",
        args.join(" "),
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

pub fn git_available() -> bool {
    Command::new("git").arg("--version").output().is_ok()
}

/// Home directory, scratch directory for artifact sources, and a clone of a
/// bare remote seeded with one commit on `main`.
pub struct Site {
    pub home: TempDir,
    pub scratch: TempDir,
    root: TempDir,
    pub checkout: PathBuf,
    pub bare: PathBuf,
}

impl Site {
    pub fn new() -> Self {
        let home = TempDir::new().expect("home");
        let scratch = TempDir::new().expect("scratch");
        let root = TempDir::new().expect("root");

        let seed = root.path().join("seed");
        fs::create_dir(&seed).expect("mkdir seed");
        git(&seed, &["init", "--quiet"]);
        git(&seed, &["checkout", "--quiet", "-b", "main"]);
        identity(&seed);
        fs::write(seed.join("index.html"), "<p>home</p>\n").expect("write seed");
        git(&seed, &["add", "--all"]);
        git(&seed, &["commit", "--quiet", "-m", "seed"]);

        let bare = root.path().join("remote.git");
        git(
            root.path(),
            &["clone", "--quiet", "--bare", seed.to_str().unwrap(), bare.to_str().unwrap()],
        );
        let checkout = root.path().join("site");
        git(
            root.path(),
            &["clone", "--quiet", bare.to_str().unwrap(), checkout.to_str().unwrap()],
        );
        identity(&checkout);

        Self {
            home,
            scratch,
            root,
            checkout,
            bare,
        }
    }

    /// Save a config publishing `vidiots.html` from the scratch dir.
    pub fn write_config(&self, tweak: impl FnOnce(&mut Config)) -> Config {
        let mut config = Config::for_repository(self.checkout.clone());
        config.push.settle_delay_ms = 0;
        config.artifacts.push(Artifact {
            source: self.source(),
            destination: PathBuf::from("TRMNL/vidiots.html"),
        });
        tweak(&mut config);
        config::save_at(self.home.path(), &config).expect("save config");
        config
    }

    pub fn source(&self) -> PathBuf {
        self.scratch.path().join("vidiots.html")
    }

    pub fn published(&self) -> PathBuf {
        self.checkout.join("TRMNL/vidiots.html")
    }

    /// `file` as it exists on the remote's `main`, if at all.
    pub fn remote_file(&self, file: &str) -> Option<String> {
        let output = Command::new("git")
            .arg("--git-dir")
            .arg(&self.bare)
            .args(["show", &format!("main:{file}")])
            .output()
            .expect("spawn git show");
        output
            .status
            .success()
            .then(|| String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub fn remote_subject(&self) -> String {
        let output = Command::new("git")
            .arg("--git-dir")
            .arg(&self.bare)
            .args(["log", "-1", "--format=%s", "main"])
            .output()
            .expect("spawn git log");
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }
}

fn identity(dir: &Path) {
    git(dir, &["config", "user.name", "pagepush test"]);
    git(dir, &["config", "user.email", "pagepush@example.invalid"]);
    git(dir, &["config", "commit.gpgsign", "false"]);
}
