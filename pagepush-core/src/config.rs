//! YAML configuration for the publish pipeline.
//!
//! # Storage layout
//!
//! ```text
//! ~/.pagepush/
//!   config.yaml     (mode 0600, created by `pagepush init`)
//! ```
//!
//! # API pattern
//!
//! Every function that touches the home directory has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{BranchName, RemoteName, RepositoryHandle};

/// Environment variable a regeneration run sees so it skips its own upload step.
pub const DEFAULT_SUPPRESS_ENV: &str = "PAGEPUSH_SUPPRESS_UPLOAD";

/// Recovery rounds allowed per push cycle before giving up.
pub const MAX_RETRY_ATTEMPTS: u32 = 2;

// ---------------------------------------------------------------------------
// 1. Schema
// ---------------------------------------------------------------------------

/// Root of `config.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub push: PushConfig,
    #[serde(default)]
    pub freshness: FreshnessConfig,
    #[serde(default)]
    pub regeneration: RegenerationConfig,
    #[serde(default)]
    pub artifacts: Vec<Artifact>,
}

/// The local checkout that gets committed and pushed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub path: PathBuf,
    /// Remote to push to. Defaults to the first configured remote.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteName>,
    /// Branch to push. Defaults to the currently checked-out branch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<BranchName>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Quiet period before a scheduled push fires.
    #[serde(default = "default_debounce_secs")]
    pub debounce_secs: u64,
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
    /// Pause after regeneration before the retried push.
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            debounce_secs: default_debounce_secs(),
            max_retry_attempts: default_max_retry_attempts(),
            settle_delay_ms: default_settle_delay_ms(),
        }
    }
}

impl PushConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_secs(self.debounce_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FreshnessConfig {
    /// Published files older than this are rewritten regardless of content.
    #[serde(default = "default_max_age_hours")]
    pub max_age_hours: f64,
    #[serde(default)]
    pub force_update: bool,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_max_age_hours(),
            force_update: false,
        }
    }
}

impl FreshnessConfig {
    /// Saturates at `Duration::MAX`, so a huge value means "never expire".
    pub fn max_age(&self) -> Duration {
        Duration::try_from_secs_f64(self.max_age_hours.max(0.0) * 3600.0)
            .unwrap_or(Duration::MAX)
    }
}

/// How to re-run the content pipeline after a pull or force-sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegenerationConfig {
    /// Program and arguments; empty means "republish artifacts only".
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub command: Vec<String>,
    /// Directory the command runs in; defaults to the current directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workdir: Option<PathBuf>,
    #[serde(default = "default_suppress_env")]
    pub suppress_env: String,
}

impl Default for RegenerationConfig {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            workdir: None,
            suppress_env: default_suppress_env(),
        }
    }
}

/// A generated file copied into the repository before publishing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Where the content producer writes the file.
    pub source: PathBuf,
    /// Destination relative to `repository.path`.
    pub destination: PathBuf,
}

impl Config {
    /// Minimal config for a repository checkout with every default applied.
    pub fn for_repository(path: PathBuf) -> Self {
        Self {
            repository: RepositoryConfig {
                path,
                remote: None,
                branch: None,
            },
            push: PushConfig::default(),
            freshness: FreshnessConfig::default(),
            regeneration: RegenerationConfig::default(),
            artifacts: Vec::new(),
        }
    }

    /// Open the configured repository, failing fast when it is not a checkout.
    pub fn repository_handle(&self) -> Result<RepositoryHandle, ConfigError> {
        RepositoryHandle::open(&self.repository.path)
    }

    /// Absolute destination of an artifact inside the repository.
    pub fn destination_path(&self, artifact: &Artifact) -> PathBuf {
        self.repository.path.join(&artifact.destination)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repository.path.as_os_str().is_empty() {
            return Err(ConfigError::Invalid {
                field: "repository.path",
                reason: "must not be empty".into(),
            });
        }
        if !self.freshness.max_age_hours.is_finite() || self.freshness.max_age_hours < 0.0 {
            return Err(ConfigError::Invalid {
                field: "freshness.max_age_hours",
                reason: format!("{} is not a non-negative number", self.freshness.max_age_hours),
            });
        }
        for artifact in &self.artifacts {
            if artifact.destination.is_absolute() {
                return Err(ConfigError::Invalid {
                    field: "artifacts.destination",
                    reason: format!(
                        "{} must be relative to the repository",
                        artifact.destination.display()
                    ),
                });
            }
        }
        Ok(())
    }
}

fn default_debounce_secs() -> u64 {
    10
}

fn default_max_retry_attempts() -> u32 {
    MAX_RETRY_ATTEMPTS
}

fn default_settle_delay_ms() -> u64 {
    2_000
}

fn default_max_age_hours() -> f64 {
    24.0
}

fn default_suppress_env() -> String {
    DEFAULT_SUPPRESS_ENV.to_string()
}

// ---------------------------------------------------------------------------
// 2. Paths
// ---------------------------------------------------------------------------

/// `<home>/.pagepush/`
pub fn state_dir_at(home: &Path) -> PathBuf {
    home.join(".pagepush")
}

/// `<home>/.pagepush/config.yaml`. Pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    state_dir_at(home).join("config.yaml")
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load and validate the config at an explicit path.
///
/// Returns `ConfigError::ConfigNotFound` if absent,
/// `ConfigError::Parse` (with path + line context) if malformed YAML.
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::ConfigNotFound {
            path: path.to_path_buf(),
        });
    }
    let contents = std::fs::read_to_string(path)?;
    let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    config.validate()?;
    Ok(config)
}

/// Load `<home>/.pagepush/config.yaml`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    load_from(&config_path_at(home))
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to an explicit path.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem).
pub fn save_to(path: &Path, config: &Config) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
            set_dir_permissions(dir)?;
        }
    }
    let tmp_path = path.with_extension("yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Atomically save `<home>/.pagepush/config.yaml`.
pub fn save_at(home: &Path, config: &Config) -> Result<(), ConfigError> {
    save_to(&config_path_at(home), config)
}

// ---------------------------------------------------------------------------
// 5. Init
// ---------------------------------------------------------------------------

/// Write a default config pointing at `repository_path`.
///
/// Idempotent: if the config already exists, loads and returns it unchanged.
/// The repository must already be a git checkout.
pub fn init_at(home: &Path, repository_path: PathBuf) -> Result<Config, ConfigError> {
    init_to(&config_path_at(home), repository_path)
}

/// `init_at` against an explicit config path.
pub fn init_to(path: &Path, repository_path: PathBuf) -> Result<Config, ConfigError> {
    if path.exists() {
        return load_from(path);
    }

    RepositoryHandle::open(&repository_path)?;
    let config = Config::for_repository(repository_path);
    save_to(path, &config)?;
    Ok(config)
}

/// `init_at` convenience wrapper.
pub fn init(repository_path: PathBuf) -> Result<Config, ConfigError> {
    init_at(&home()?, repository_path)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), ConfigError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), ConfigError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
