//! pagepush core library: domain types, configuration, errors.
//!
//! - [`types`]: repository handle, change sets, push attempts
//! - [`error`]: [`ConfigError`]
//! - [`config`]: load / save / init of `~/.pagepush/config.yaml`

pub mod config;
pub mod error;
pub mod types;

pub use config::{Artifact, Config, FreshnessConfig, PushConfig, RegenerationConfig};
pub use error::ConfigError;
pub use types::{
    BranchName, ChangeSet, PushAttempt, PushOutcome, PushTarget, RemoteName, RepositoryHandle,
};
