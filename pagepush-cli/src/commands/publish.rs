//! `pagepush publish`: copy changed artifacts into the repository and
//! optionally push them.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use pagepush_core::Config;
use pagepush_sync::{diff::diff_artifacts, pipeline, GitSyncEngine, PipelineHook, WriteResult};

use crate::commands::push::report_attempt;
use crate::context::{upload_suppressed, GlobalArgs};

/// Arguments for `pagepush publish`.
#[derive(Args, Debug)]
pub struct PublishArgs {
    /// Show what would be written without writing any files.
    #[arg(long, conflicts_with = "push")]
    pub dry_run: bool,

    /// Print unified diffs of what would be written. Implies --dry-run.
    #[arg(long, conflicts_with = "push")]
    pub diff: bool,

    /// Commit and push after publishing.
    #[arg(long)]
    pub push: bool,

    /// Commit message for --push; defaults to one naming the written artifacts.
    #[arg(long, short = 'm', requires = "push")]
    pub message: Option<String>,
}

impl PublishArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let config = global.load()?;

        if self.diff {
            print_diffs(&config)?;
            return Ok(ExitCode::SUCCESS);
        }

        let results = pipeline::run(&config, self.dry_run).context("publish failed")?;
        print_results(&results, self.dry_run);

        if !self.push {
            return Ok(ExitCode::SUCCESS);
        }
        if upload_suppressed(&config) {
            println!(
                "{} is set; skipping push",
                config.regeneration.suppress_env
            );
            return Ok(ExitCode::SUCCESS);
        }

        let message = self
            .message
            .unwrap_or_else(|| pipeline::commit_message_for_written(&config, &results));
        let engine = GitSyncEngine::open(&config, Box::new(PipelineHook::new(config.clone())))
            .with_context(|| format!("cannot open {}", config.repository.path.display()))?;
        Ok(report_attempt(&engine.push(&message)))
    }
}

fn print_diffs(config: &Config) -> Result<()> {
    let diffs = diff_artifacts(config, &pipeline::detector_for(config)).context("diff failed")?;
    if diffs.is_empty() {
        println!("No differences.");
        return Ok(());
    }

    for diff in diffs {
        println!("# {} ({})", diff.destination.display(), diff.reason);
        print!("{}", diff.unified_diff);
        if !diff.unified_diff.ends_with('\n') {
            println!();
        }
    }
    Ok(())
}

fn print_results(results: &[WriteResult], dry_run: bool) {
    let prefix = if dry_run { "[dry-run] " } else { "" };
    let written = results
        .iter()
        .filter(|r| matches!(r, WriteResult::Written { .. } | WriteResult::WouldWrite { .. }))
        .count();
    let unchanged = results
        .iter()
        .filter(|r| matches!(r, WriteResult::Unchanged { .. }))
        .count();

    if results.is_empty() {
        println!("{prefix}No artifacts configured.");
        return;
    }
    println!("{prefix}✓ published ({written} written, {unchanged} unchanged)");

    for result in results {
        match result {
            WriteResult::Written { path, reason } => {
                println!("  ✎  {} ({reason})", path.display())
            }
            WriteResult::WouldWrite { path, reason } => {
                println!("  ~  {} ({reason})", path.display())
            }
            WriteResult::Unchanged { path } => println!("  ·  {}", path.display()),
            WriteResult::SourceMissing { source } => {
                println!("  ?  {} (source missing)", source.display())
            }
        }
    }
}
