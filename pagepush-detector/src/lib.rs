//! pagepush-detector: decides whether freshly generated content should
//! replace what is already published.
//!
//! Decision precedence:
//! 1. `Missing`: nothing published yet.
//! 2. `Forced`: force-update override is set.
//! 3. `Expired`: published file is older than the max age.
//! 4. `Keep`: strictly and normalized identical.
//! 5. `WhitespaceDrift`: identical once whitespace is normalized.
//! 6. `EntriesChanged` / `DetailsChanged`: listing fingerprint differs.
//! 7. `ContentChanged`: anything else.
//!
//! Any error while comparing yields `ComparisonFailed`, which is an update.

mod fingerprint;

use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use thiserror::Error;

use pagepush_core::FreshnessConfig;

pub use fingerprint::{EntryDetails, Fingerprint};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Why an update was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateReason {
    Missing,
    Forced,
    Expired { age: Duration, max_age: Duration },
    WhitespaceDrift,
    EntriesChanged { before: usize, after: usize },
    DetailsChanged,
    ContentChanged,
    ComparisonFailed { error: String },
}

impl fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateReason::Missing => f.write_str("no published file yet"),
            UpdateReason::Forced => f.write_str("force update enabled"),
            UpdateReason::Expired { age, max_age } => write!(
                f,
                "published file is {} old (max {})",
                format_age(*age),
                format_age(*max_age)
            ),
            UpdateReason::WhitespaceDrift => f.write_str("content differs only in whitespace"),
            UpdateReason::EntriesChanged { before, after } => {
                write!(f, "entry lineup changed: {before} -> {after}")
            }
            UpdateReason::DetailsChanged => f.write_str("schedules or descriptions changed"),
            UpdateReason::ContentChanged => f.write_str("content differs"),
            UpdateReason::ComparisonFailed { error } => write!(f, "comparison failed: {error}"),
        }
    }
}

/// Outcome of a freshness check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Update(UpdateReason),
    Keep,
}

impl Decision {
    pub fn should_update(&self) -> bool {
        matches!(self, Decision::Update(_))
    }
}

/// Errors from freshness comparison. Never surfaced by [`ChangeDetector::should_update`].
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid extraction pattern: {0}")]
    Pattern(regex::Error),
}

/// When content comparison is bypassed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreshnessPolicy {
    pub max_age: Duration,
    pub force_update: bool,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self::from(&FreshnessConfig::default())
    }
}

impl From<&FreshnessConfig> for FreshnessPolicy {
    fn from(config: &FreshnessConfig) -> Self {
        Self {
            max_age: config.max_age(),
            force_update: config.force_update,
        }
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct ChangeDetector {
    policy: FreshnessPolicy,
}

impl ChangeDetector {
    pub fn new(policy: FreshnessPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &FreshnessPolicy {
        &self.policy
    }

    /// `true` when `new_content` should be written over `existing`.
    ///
    /// Pure read; the caller performs the write.
    pub fn should_update(&self, existing: &Path, new_content: &str) -> bool {
        self.decide(existing, new_content).should_update()
    }

    /// Like [`should_update`](Self::should_update) but reports the reason.
    pub fn decide(&self, existing: &Path, new_content: &str) -> Decision {
        let decision = match self.compare(existing, new_content) {
            Ok(decision) => decision,
            Err(err) => {
                tracing::warn!(
                    "error comparing {}: {err}; proceeding with update",
                    existing.display()
                );
                Decision::Update(UpdateReason::ComparisonFailed {
                    error: err.to_string(),
                })
            }
        };

        match &decision {
            Decision::Keep => {
                tracing::info!("{}: content identical, no update needed", existing.display())
            }
            Decision::Update(reason) => {
                tracing::info!("{}: updating ({reason})", existing.display())
            }
        }
        decision
    }

    fn compare(&self, existing: &Path, new_content: &str) -> Result<Decision, DetectError> {
        let meta = match fs::metadata(existing) {
            Ok(meta) => meta,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Ok(Decision::Update(UpdateReason::Missing));
            }
            Err(err) => return Err(io_err(existing, err)),
        };

        if self.policy.force_update {
            return Ok(Decision::Update(UpdateReason::Forced));
        }

        let modified = meta.modified().map_err(|e| io_err(existing, e))?;
        let age = SystemTime::now()
            .duration_since(modified)
            .unwrap_or_default();
        if age > self.policy.max_age {
            return Ok(Decision::Update(UpdateReason::Expired {
                age,
                max_age: self.policy.max_age,
            }));
        }

        let current = fs::read_to_string(existing).map_err(|e| io_err(existing, e))?;
        tracing::debug!(
            "comparing {}: existing {} chars vs new {} chars, age {}",
            existing.display(),
            current.len(),
            new_content.len(),
            format_age(age)
        );
        compare_content(&current, new_content)
    }
}

/// Compare two versions of a document, ignoring file metadata.
pub fn compare_content(existing: &str, new_content: &str) -> Result<Decision, DetectError> {
    let strictly_identical = strict_trim(existing) == strict_trim(new_content);
    let normalized_identical = normalize(existing) == normalize(new_content);

    if strictly_identical && normalized_identical {
        return Ok(Decision::Keep);
    }
    if normalized_identical {
        return Ok(Decision::Update(UpdateReason::WhitespaceDrift));
    }

    let before = Fingerprint::extract(existing)?;
    let after = Fingerprint::extract(new_content)?;

    if before.titles != after.titles {
        return Ok(Decision::Update(UpdateReason::EntriesChanged {
            before: before.titles.len(),
            after: after.titles.len(),
        }));
    }
    if before.entries != after.entries {
        return Ok(Decision::Update(UpdateReason::DetailsChanged));
    }

    Ok(Decision::Update(UpdateReason::ContentChanged))
}

/// Whitespace-insensitive form: line endings unified, every whitespace run
/// (newlines included) collapsed to one space, ends trimmed.
pub fn normalize(content: &str) -> String {
    content
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compact age such as `45s`, `12m`, `30h`, `3d`.
pub fn format_age(age: Duration) -> String {
    let seconds = age.as_secs();
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}

// Line terminators stay significant so CRLF/LF drift is seen as a change.
fn strict_trim(content: &str) -> &str {
    content.trim_matches(|c| c == ' ' || c == '\t')
}

fn io_err(path: &Path, source: std::io::Error) -> DetectError {
    DetectError::Io {
        path: path.to_path_buf(),
        source,
    }
}
