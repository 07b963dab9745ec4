//! Content regeneration after the working copy was pulled or force-synced.

use std::path::PathBuf;
use std::process::Command;

use pagepush_core::Config;
use pagepush_detector::{ChangeDetector, FreshnessPolicy};

use crate::error::SyncError;
use crate::publish::{self, WriteResult};

/// Re-runs the upstream content pipeline so the retried push carries content
/// built on top of the synced remote state.
///
/// Implementations must not trigger another push; the pipeline's own upload
/// step has to be suppressed.
pub trait RegenerationHook: Send + Sync {
    fn regenerate(&self) -> Result<(), SyncError>;
}

impl<F> RegenerationHook for F
where
    F: Fn() -> Result<(), SyncError> + Send + Sync,
{
    fn regenerate(&self) -> Result<(), SyncError> {
        self()
    }
}

/// Does nothing. For callers that only push and never regenerate.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHook;

impl RegenerationHook for NoopHook {
    fn regenerate(&self) -> Result<(), SyncError> {
        Ok(())
    }
}

/// Runs the configured regeneration command with the suppression variable
/// set, then republishes every artifact into the repository.
#[derive(Debug, Clone)]
pub struct PipelineHook {
    config: Config,
}

impl PipelineHook {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    fn run_command(&self) -> Result<(), SyncError> {
        let regeneration = &self.config.regeneration;
        let Some((program, args)) = regeneration.command.split_first() else {
            return Ok(());
        };

        let mut cmd = Command::new(program);
        cmd.args(args).env(&regeneration.suppress_env, "1");
        if let Some(dir) = &regeneration.workdir {
            cmd.current_dir(dir);
        }

        let cwd = regeneration
            .workdir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        tracing::info!(
            "regenerating content: {} (in {}, {}=1)",
            regeneration.command.join(" "),
            cwd.display(),
            regeneration.suppress_env
        );

        let output = cmd
            .output()
            .map_err(|e| SyncError::Hook(format!("failed to start `{program}`: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SyncError::Hook(format!(
                "`{}` exited with {} in {}: {}",
                regeneration.command.join(" "),
                output.status,
                cwd.display(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}

impl RegenerationHook for PipelineHook {
    fn regenerate(&self) -> Result<(), SyncError> {
        self.run_command()?;

        let detector = ChangeDetector::new(FreshnessPolicy::from(&self.config.freshness));
        let results = publish::publish_all(&self.config, &detector, false)?;
        let written = results
            .iter()
            .filter(|r| matches!(r, WriteResult::Written { .. }))
            .count();
        tracing::info!("regeneration republished {written} of {} artifact(s)", results.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::atomic::{AtomicU32, Ordering};

    use pagepush_core::Artifact;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn closures_are_hooks() {
        let calls = AtomicU32::new(0);
        let hook = || -> Result<(), SyncError> {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        };
        hook.regenerate().unwrap();
        hook.regenerate().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn pipeline_hook_without_command_republishes_artifacts() {
        let repo = TempDir::new().unwrap();
        let scratch = TempDir::new().unwrap();
        let source = scratch.path().join("vidiots.html");
        fs::write(&source, "<div class=\"title\">Alien</div>").unwrap();

        let mut config = Config::for_repository(repo.path().to_path_buf());
        config.artifacts.push(Artifact {
            source,
            destination: PathBuf::from("TRMNL/vidiots.html"),
        });

        PipelineHook::new(config).regenerate().unwrap();
        let published = fs::read_to_string(repo.path().join("TRMNL/vidiots.html")).unwrap();
        assert_eq!(published, "<div class=\"title\">Alien</div>");
    }

    #[cfg(unix)]
    #[test]
    fn pipeline_hook_sets_suppression_variable() {
        let repo = TempDir::new().unwrap();
        let marker = repo.path().join("suppressed");
        let mut config = Config::for_repository(repo.path().to_path_buf());
        config.regeneration.command = vec![
            "sh".into(),
            "-c".into(),
            format!(
                "test \"$PAGEPUSH_SUPPRESS_UPLOAD\" = 1 && touch '{}'",
                marker.display()
            ),
        ];

        PipelineHook::new(config).regenerate().unwrap();
        assert!(marker.exists());
    }

    #[cfg(unix)]
    #[test]
    fn failing_command_is_a_hook_error() {
        let repo = TempDir::new().unwrap();
        let mut config = Config::for_repository(repo.path().to_path_buf());
        config.regeneration.command = vec!["sh".into(), "-c".into(), "echo nope >&2; exit 3".into()];

        let err = PipelineHook::new(config).regenerate().unwrap_err();
        match err {
            SyncError::Hook(reason) => assert!(reason.contains("nope"), "{reason}"),
            other => panic!("expected hook error, got {other:?}"),
        }
    }
}
