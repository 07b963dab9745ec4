//! Narrow version-control interface and its `git` subprocess implementation.
//!
//! The engine only ever talks to [`VcsClient`]; [`GitCli`] shells out to the
//! system `git` binary with `-C <workdir>` and terminal prompts disabled so a
//! missing credential fails instead of hanging.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use pagepush_core::{BranchName, PushTarget, RemoteName, RepositoryHandle};

use crate::error::VcsError;

/// Every git operation the sync engine needs. Calls are blocking.
pub trait VcsClient: Send + Sync {
    /// Repository working directory, for log messages.
    fn workdir(&self) -> &Path;

    /// `git status --porcelain` output; empty means a clean tree.
    fn status_porcelain(&self) -> Result<String, VcsError>;

    /// Checked-out branch, or `None` when HEAD is detached.
    fn current_branch(&self) -> Result<Option<BranchName>, VcsError>;

    /// `false` in a repository without any commit yet.
    fn has_head(&self) -> Result<bool, VcsError>;

    fn remotes(&self) -> Result<Vec<RemoteName>, VcsError>;

    /// Whether the remote-tracking ref `<remote>/<branch>` exists locally.
    fn remote_branch_exists(&self, target: &PushTarget) -> Result<bool, VcsError>;

    /// `(ahead, behind)` of HEAD relative to `<remote>/<branch>`.
    fn ahead_behind(&self, target: &PushTarget) -> Result<(u32, u32), VcsError>;

    fn stage_all(&self) -> Result<(), VcsError>;
    fn commit(&self, message: &str) -> Result<(), VcsError>;
    fn push(&self, target: &PushTarget) -> Result<(), VcsError>;
    fn pull(&self, target: &PushTarget) -> Result<(), VcsError>;
    fn fetch_prune(&self, remote: &RemoteName) -> Result<(), VcsError>;

    /// Create `name` at HEAD without checking it out.
    fn create_branch(&self, name: &str) -> Result<(), VcsError>;

    fn abort_merge(&self) -> Result<(), VcsError>;
    fn abort_rebase(&self) -> Result<(), VcsError>;

    /// Check out `target.branch`, creating or moving it to `<remote>/<branch>`.
    fn checkout_tracking(&self, target: &PushTarget) -> Result<(), VcsError>;

    fn reset_hard(&self, rev: &str) -> Result<(), VcsError>;

    /// Remove untracked files and directories.
    fn clean_untracked(&self) -> Result<(), VcsError>;

    /// Full object id of `rev`.
    fn rev_parse(&self, rev: &str) -> Result<String, VcsError>;
}

// ---------------------------------------------------------------------------
// GitCli
// ---------------------------------------------------------------------------

/// [`VcsClient`] backed by the `git` executable on `PATH`.
#[derive(Debug, Clone)]
pub struct GitCli {
    workdir: PathBuf,
}

impl GitCli {
    pub fn new(handle: &RepositoryHandle) -> Self {
        Self {
            workdir: handle.path().to_path_buf(),
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.arg("-C").arg(&self.workdir).args(args);
        cmd.env("GIT_TERMINAL_PROMPT", "0");
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Run and return the raw output whatever the exit status.
    fn output(&self, args: &[&str]) -> Result<Output, VcsError> {
        tracing::debug!("git {} (in {})", args.join(" "), self.workdir.display());
        self.command(args).output().map_err(|source| VcsError::Spawn {
            command: args.join(" "),
            cwd: self.workdir.clone(),
            source,
        })
    }

    /// Run and return trimmed stdout, failing on a non-zero exit.
    fn run(&self, args: &[&str]) -> Result<String, VcsError> {
        let output = self.output(args)?;
        if !output.status.success() {
            return Err(self.failed(args, &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn failed(&self, args: &[&str], output: &Output) -> VcsError {
        VcsError::Failed {
            command: args.join(" "),
            cwd: self.workdir.clone(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        }
    }

    /// `Ok(true)` on exit 0, `Ok(false)` on exit 1, error otherwise.
    fn probe(&self, args: &[&str]) -> Result<bool, VcsError> {
        let output = self.output(args)?;
        match output.status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(self.failed(args, &output)),
        }
    }
}

impl VcsClient for GitCli {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    fn status_porcelain(&self) -> Result<String, VcsError> {
        self.run(&["status", "--porcelain"])
    }

    fn current_branch(&self) -> Result<Option<BranchName>, VcsError> {
        let args = ["symbolic-ref", "--quiet", "--short", "HEAD"];
        let output = self.output(&args)?;
        match output.status.code() {
            Some(0) => {
                let name = String::from_utf8_lossy(&output.stdout).trim().to_string();
                Ok((!name.is_empty()).then(|| BranchName(name)))
            }
            Some(1) => Ok(None),
            _ => Err(self.failed(&args, &output)),
        }
    }

    fn has_head(&self) -> Result<bool, VcsError> {
        self.probe(&["rev-parse", "--verify", "--quiet", "HEAD"])
    }

    fn remotes(&self) -> Result<Vec<RemoteName>, VcsError> {
        let stdout = self.run(&["remote"])?;
        Ok(stdout
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(RemoteName::from)
            .collect())
    }

    fn remote_branch_exists(&self, target: &PushTarget) -> Result<bool, VcsError> {
        let tracking = format!("refs/remotes/{}", target.tracking_ref());
        self.probe(&["rev-parse", "--verify", "--quiet", &tracking])
    }

    fn ahead_behind(&self, target: &PushTarget) -> Result<(u32, u32), VcsError> {
        let range = format!("HEAD...{}", target.tracking_ref());
        let args = ["rev-list", "--left-right", "--count", range.as_str()];
        let stdout = self.run(&args)?;
        parse_ahead_behind(&stdout).ok_or_else(|| VcsError::Parse {
            command: args.join(" "),
            output: stdout,
        })
    }

    fn stage_all(&self) -> Result<(), VcsError> {
        self.run(&["add", "--all"]).map(drop)
    }

    fn commit(&self, message: &str) -> Result<(), VcsError> {
        self.run(&["commit", "--message", message]).map(drop)
    }

    fn push(&self, target: &PushTarget) -> Result<(), VcsError> {
        self.run(&["push", "--set-upstream", &target.remote.0, &target.branch.0])
            .map(drop)
    }

    fn pull(&self, target: &PushTarget) -> Result<(), VcsError> {
        self.run(&[
            "pull",
            "--no-rebase",
            "--no-edit",
            &target.remote.0,
            &target.branch.0,
        ])
        .map(drop)
    }

    fn fetch_prune(&self, remote: &RemoteName) -> Result<(), VcsError> {
        self.run(&["fetch", "--prune", &remote.0]).map(drop)
    }

    fn create_branch(&self, name: &str) -> Result<(), VcsError> {
        self.run(&["branch", name]).map(drop)
    }

    fn abort_merge(&self) -> Result<(), VcsError> {
        self.run(&["merge", "--abort"]).map(drop)
    }

    fn abort_rebase(&self) -> Result<(), VcsError> {
        self.run(&["rebase", "--abort"]).map(drop)
    }

    fn checkout_tracking(&self, target: &PushTarget) -> Result<(), VcsError> {
        self.run(&[
            "checkout",
            "--force",
            "-B",
            &target.branch.0,
            &target.tracking_ref(),
        ])
        .map(drop)
    }

    fn reset_hard(&self, rev: &str) -> Result<(), VcsError> {
        self.run(&["reset", "--hard", rev]).map(drop)
    }

    fn clean_untracked(&self) -> Result<(), VcsError> {
        self.run(&["clean", "-fd"]).map(drop)
    }

    fn rev_parse(&self, rev: &str) -> Result<String, VcsError> {
        self.run(&["rev-parse", "--verify", rev])
    }
}

/// Parse `rev-list --left-right --count` output: `"<ahead>\t<behind>"`.
fn parse_ahead_behind(stdout: &str) -> Option<(u32, u32)> {
    let mut parts = stdout.split_whitespace();
    let ahead = parts.next()?.parse().ok()?;
    let behind = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some((ahead, behind))
}
