//! `pagepush init <repo-path>`

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Args;

use pagepush_core::config;

use crate::context::GlobalArgs;

/// Write a default config for a repository checkout.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path to the local git checkout that gets published.
    pub repo_path: PathBuf,
}

impl InitArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let repo = self
            .repo_path
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.repo_path.display()))?;
        let path = global.config_path()?;
        let existed = path.exists();

        let config = config::init_to(&path, repo.clone())
            .with_context(|| format!("failed to init config for '{}'", repo.display()))?;

        if existed {
            println!("✓ Config already exists: {}", path.display());
            println!("  Repository: {}", config.repository.path.display());
        } else {
            println!("✓ Wrote {}", path.display());
            println!("  Repository: {}", config.repository.path.display());
            println!("  Add `artifacts:` entries to publish generated files.");
        }
        Ok(ExitCode::SUCCESS)
    }
}
