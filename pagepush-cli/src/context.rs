//! Options shared by every command: where the config lives and which
//! checkout to operate on.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use pagepush_core::{config, Config, ConfigError};

#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Config file to use instead of ~/.pagepush/config.yaml.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Repository checkout to use instead of the configured one.
    #[arg(long, global = true, value_name = "PATH")]
    pub repo: Option<PathBuf>,
}

impl GlobalArgs {
    pub fn config_path(&self) -> Result<PathBuf> {
        match &self.config {
            Some(path) => Ok(path.clone()),
            None => Ok(config::config_path_at(&home()?)),
        }
    }

    /// Load the config, applying `--repo`.
    ///
    /// With `--repo` and no config file, defaults apply: no artifacts and no
    /// regeneration command.
    pub fn load(&self) -> Result<Config> {
        let path = self.config_path()?;
        let mut loaded = match (config::load_from(&path), &self.repo) {
            (Ok(loaded), _) => loaded,
            (Err(ConfigError::ConfigNotFound { .. }), Some(repo)) => {
                Config::for_repository(repo.clone())
            }
            (Err(err), _) => {
                return Err(err).with_context(|| format!("failed to load {}", path.display()));
            }
        };

        if let Some(repo) = &self.repo {
            loaded.repository.path = repo.clone();
        }
        loaded.validate().context("invalid configuration")?;
        Ok(loaded)
    }
}

pub fn home() -> Result<PathBuf> {
    dirs::home_dir().context("could not determine home directory")
}

/// Whether the regeneration suppression variable is set for this process.
///
/// Set (to anything but empty or `0`) while a regeneration command runs, so
/// a producer invoked from recovery does not trigger another upload.
pub fn upload_suppressed(config: &Config) -> bool {
    std::env::var(&config.regeneration.suppress_env)
        .map(|value| !value.is_empty() && value != "0")
        .unwrap_or(false)
}
