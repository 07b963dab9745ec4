//! Top-level operations: `pagepush --validate`, `pagepush --force-sync` and
//! `pagepush "<commit message>"`.

use std::process::ExitCode;

use anyhow::{Context, Result};
use colored::Colorize;

use pagepush_core::{Config, PushAttempt};
use pagepush_daemon::{request_push, send_request, DaemonError, DaemonRequest};
use pagepush_sync::{GitSyncEngine, NoopHook, PipelineHook};

use crate::context::{home, upload_suppressed, GlobalArgs};

/// Read-only health check.
///
/// Exits 1 when the path is not a git checkout or `git status` fails there.
/// Anything else is printed as a warning and still exits 0.
pub fn validate(global: &GlobalArgs) -> Result<ExitCode> {
    let config = global.load()?;
    let engine = GitSyncEngine::open(&config, Box::new(NoopHook))
        .with_context(|| format!("cannot open {}", config.repository.path.display()))?;

    println!("repository: {}", config.repository.path.display());
    let report = match engine.validate() {
        Ok(report) => report,
        Err(err) => {
            println!("{} {err}", "✗".red().bold());
            return Ok(ExitCode::FAILURE);
        }
    };

    println!(
        "branch:     {}",
        report
            .branch
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "(detached)".to_string())
    );
    let remotes: Vec<String> = report.remotes.iter().map(ToString::to_string).collect();
    println!(
        "remotes:    {}",
        if remotes.is_empty() {
            "(none)".to_string()
        } else {
            remotes.join(", ")
        }
    );
    if let Some(target) = &report.target {
        println!("target:     {target}");
    }
    println!(
        "pending:    {}",
        if report.changes.push_needed() {
            "yes"
        } else {
            "no"
        }
    );

    for warning in &report.warnings {
        println!("{} {warning}", "!".yellow().bold());
    }
    println!("{}", "✓ repository is healthy".green());
    Ok(ExitCode::SUCCESS)
}

/// Reset the checkout to the remote tip, then regenerate content.
pub fn force_sync(global: &GlobalArgs) -> Result<ExitCode> {
    let config = global.load()?;
    let engine = GitSyncEngine::open(&config, Box::new(PipelineHook::new(config.clone())))
        .with_context(|| format!("cannot open {}", config.repository.path.display()))?;
    let report = engine.force_sync().context("force-sync failed")?;

    println!("{} reset to {} at {}", "✓".green(), report.target, report.head);
    match &report.backup_branch {
        Some(branch) => println!("  previous HEAD kept on {branch}"),
        None => println!("  no backup branch created"),
    }
    Ok(ExitCode::SUCCESS)
}

/// Commit and push pending changes now.
///
/// When a daemon is serving the same repository the push runs inside it, so
/// it shares the daemon's git lane.
pub fn push(global: &GlobalArgs, message: &str) -> Result<ExitCode> {
    let config = global.load()?;
    if message.trim().is_empty() {
        anyhow::bail!("commit message must not be empty");
    }
    if upload_suppressed(&config) {
        println!(
            "{} is set; skipping push",
            config.regeneration.suppress_env
        );
        return Ok(ExitCode::SUCCESS);
    }

    let attempt = match push_via_daemon(&config, message)? {
        Some(attempt) => attempt,
        None => {
            let engine =
                GitSyncEngine::open(&config, Box::new(PipelineHook::new(config.clone())))
                    .with_context(|| {
                        format!("cannot open {}", config.repository.path.display())
                    })?;
            engine.push(message)
        }
    };
    Ok(report_attempt(&attempt))
}

/// Print one push attempt and map its outcome to an exit code.
pub fn report_attempt(attempt: &PushAttempt) -> ExitCode {
    if attempt.outcome.is_ok() {
        println!(
            "{} {} ({})",
            "✓".green(),
            attempt.outcome,
            attempt.commit_message
        );
        ExitCode::SUCCESS
    } else {
        eprintln!(
            "{} {} ({})",
            "✗".red().bold(),
            attempt.outcome,
            attempt.commit_message
        );
        ExitCode::FAILURE
    }
}

fn push_via_daemon(config: &Config, message: &str) -> Result<Option<PushAttempt>> {
    let home = home()?;
    let status = match send_request(&home, &DaemonRequest::new("status")) {
        Ok(response) if response.ok => response.data.unwrap_or_default(),
        Ok(_) | Err(DaemonError::DaemonNotRunning { .. }) => return Ok(None),
        Err(err) => return Err(err).context("failed to query daemon"),
    };
    let served = status["repository"].as_str().map(std::path::PathBuf::from);
    if served.as_deref() != Some(config.repository.path.as_path()) {
        return Ok(None);
    }

    let data = request_push(&home, message).context("daemon push request failed")?;
    let attempt = serde_json::from_value(data)
        .context("daemon returned an unreadable push attempt")?;
    Ok(Some(attempt))
}
