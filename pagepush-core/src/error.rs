//! Error types for pagepush-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading configuration or opening the publish repository.
///
/// Every variant is an operator problem: nothing here is retried.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load. Includes file path and line context from serde_yaml.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None`; cannot locate `~/.pagepush/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}; run `pagepush init <repo>` first")]
    ConfigNotFound { path: PathBuf },

    /// The configured repository path does not exist or is not a directory.
    #[error("repository path {path} does not exist or is not a directory")]
    RepositoryMissing { path: PathBuf },

    /// The repository path exists but has no `.git` metadata.
    #[error("{path} is not a git working copy (no .git found)")]
    NotAGitRepository { path: PathBuf },

    /// A configured value is out of range or malformed.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}
