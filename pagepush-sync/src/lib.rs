//! # pagepush-sync
//!
//! Git synchronization for a publish repository.
//!
//! [`GitSyncEngine`] detects pending changes, commits and pushes them, and
//! recovers from a diverged remote by pulling or force-syncing, re-running
//! content generation through a [`RegenerationHook`] before each retry.
//! [`publish`] copies generated artifacts into the checkout when the
//! detector says they changed.

pub mod diff;
pub mod engine;
pub mod error;
pub mod force_sync;
pub mod hook;
pub mod pipeline;
pub mod publish;
pub mod vcs;

pub use engine::{EngineSettings, GitSyncEngine, HealthReport};
pub use error::{SyncError, VcsError};
pub use force_sync::ForceSyncReport;
pub use hook::{NoopHook, PipelineHook, RegenerationHook};
pub use publish::WriteResult;
pub use vcs::{GitCli, VcsClient};
