//! `pagepush status`: pending repository changes and artifact freshness.

use std::io::ErrorKind;
use std::path::Path;
use std::process::ExitCode;
use std::time::SystemTime;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use pagepush_core::{ChangeSet, Config};
use pagepush_detector::{format_age, ChangeDetector, Decision};
use pagepush_sync::{pipeline, GitSyncEngine, NoopHook};

use crate::context::GlobalArgs;

/// Arguments for `pagepush status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, global: &GlobalArgs) -> Result<ExitCode> {
        let config = global.load()?;
        let engine = GitSyncEngine::open(&config, Box::new(NoopHook))
            .with_context(|| format!("cannot open {}", config.repository.path.display()))?;
        let changes = engine
            .has_pending_changes()
            .context("failed to inspect repository")?;

        let report = build_report(&config, changes)?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
        } else {
            print_table(&report);
        }
        Ok(ExitCode::SUCCESS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ArtifactState {
    Current,
    Update,
    MissingSource,
}

#[derive(Debug, Serialize)]
struct ArtifactStatus {
    source: String,
    destination: String,
    status: ArtifactState,
    detail: String,
    /// Age of the published copy, `never` when absent.
    published_age: String,
}

#[derive(Debug, Serialize)]
struct StatusReport {
    repository: String,
    push_needed: bool,
    changes: ChangeSet,
    artifacts: Vec<ArtifactStatus>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "artifact")]
    destination: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "detail")]
    detail: String,
    #[tabled(rename = "published")]
    published_age: String,
}

fn build_report(config: &Config, changes: ChangeSet) -> Result<StatusReport> {
    let detector = pipeline::detector_for(config);
    let artifacts = config
        .artifacts
        .iter()
        .map(|artifact| {
            let destination = config.destination_path(artifact);
            let (status, detail) = artifact_state(&detector, &artifact.source, &destination)?;
            Ok(ArtifactStatus {
                source: artifact.source.display().to_string(),
                destination: artifact.destination.display().to_string(),
                status,
                detail,
                published_age: published_age(&destination),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(StatusReport {
        repository: config.repository.path.display().to_string(),
        push_needed: changes.push_needed(),
        changes,
        artifacts,
    })
}

fn artifact_state(
    detector: &ChangeDetector,
    source: &Path,
    destination: &Path,
) -> Result<(ArtifactState, String)> {
    let content = match std::fs::read_to_string(source) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Ok((
                ArtifactState::MissingSource,
                "producer has not written the source".to_string(),
            ));
        }
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", source.display()));
        }
    };

    Ok(match detector.decide(destination, &content) {
        Decision::Keep => (ArtifactState::Current, "up to date".to_string()),
        Decision::Update(reason) => (ArtifactState::Update, reason.to_string()),
    })
}

fn published_age(destination: &Path) -> String {
    std::fs::metadata(destination)
        .and_then(|meta| meta.modified())
        .ok()
        .and_then(|modified| SystemTime::now().duration_since(modified).ok())
        .map(format_age)
        .unwrap_or_else(|| "never".to_string())
}

fn print_table(report: &StatusReport) {
    let pending = report
        .artifacts
        .iter()
        .filter(|a| a.status == ArtifactState::Update)
        .count();
    println!(
        "pagepush v{} | {} | {} artifacts | {} to publish",
        env!("CARGO_PKG_VERSION"),
        report.repository,
        report.artifacts.len(),
        pending,
    );

    let target = report
        .changes
        .target
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "(unresolved)".to_string());
    let push_state = if report.push_needed {
        "push needed".yellow().bold().to_string()
    } else {
        "in sync".green().bold().to_string()
    };
    println!("{} {push_state} with {target}", state_indicator(report.push_needed));
    if report.changes.has_local_changes {
        println!("  uncommitted changes in the working tree");
    }
    if let Some(ahead) = report.changes.ahead_count.filter(|n| *n > 0) {
        println!("  {ahead} commit(s) not yet on the remote");
    }
    if report.changes.remote_branch_missing {
        println!("  remote branch does not exist yet");
    }

    if report.artifacts.is_empty() {
        println!("No artifacts configured.");
        return;
    }

    let rows: Vec<StatusTableRow> = report
        .artifacts
        .iter()
        .map(|a| StatusTableRow {
            destination: a.destination.clone(),
            status: state_label(a.status).to_string(),
            detail: a.detail.clone(),
            published_age: a.published_age.clone(),
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if pending > 0 {
        println!("Run 'pagepush publish --push' to publish changed artifacts.");
    }
}

fn state_label(state: ArtifactState) -> &'static str {
    match state {
        ArtifactState::Current => "CURRENT",
        ArtifactState::Update => "UPDATE",
        ArtifactState::MissingSource => "NO SOURCE",
    }
}

fn state_indicator(push_needed: bool) -> String {
    if push_needed {
        "■".yellow().bold().to_string()
    } else {
        "■".green().bold().to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use pagepush_core::Artifact;
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn report_classifies_each_artifact() {
        let repo = TempDir::new().expect("repo");
        let scratch = TempDir::new().expect("scratch");
        let mut config = Config::for_repository(repo.path().to_path_buf());
        for name in ["vidiots.html", "espresso.html", "absent.html"] {
            config.artifacts.push(Artifact {
                source: scratch.path().join(name),
                destination: PathBuf::from("TRMNL").join(name),
            });
        }
        fs::write(scratch.path().join("vidiots.html"), "<p>new</p>").expect("source");
        fs::write(scratch.path().join("espresso.html"), "<p>same</p>").expect("source");
        fs::create_dir_all(repo.path().join("TRMNL")).expect("dest dir");
        fs::write(repo.path().join("TRMNL/espresso.html"), "<p>same</p>").expect("published");

        let report = build_report(&config, ChangeSet::idle()).expect("report");
        let states: Vec<ArtifactState> = report.artifacts.iter().map(|a| a.status).collect();
        assert_eq!(
            states,
            vec![
                ArtifactState::Update,
                ArtifactState::Current,
                ArtifactState::MissingSource
            ]
        );
        assert_eq!(report.artifacts[0].published_age, "never");
        assert!(!report.push_needed);
    }

    #[test]
    fn report_serializes_kebab_case_states() {
        let repo = TempDir::new().expect("repo");
        let config = Config::for_repository(repo.path().to_path_buf());
        let report = build_report(&config, ChangeSet::local_changes()).expect("report");
        let json = serde_json::to_value(&report).expect("json");
        assert_eq!(json["push_needed"], serde_json::json!(true));
        assert_eq!(json["changes"]["has_local_changes"], serde_json::json!(true));
        assert_eq!(
            serde_json::to_value(ArtifactState::MissingSource).expect("json"),
            serde_json::json!("missing-source")
        );
    }
}
