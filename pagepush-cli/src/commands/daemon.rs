//! `pagepush daemon`: background watcher lifecycle and debounced pushes.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Subcommand;

use pagepush_daemon::paths::socket_path;
use pagepush_daemon::{request_schedule, request_status, request_stop, start_blocking, DaemonError};

use crate::context::{home, upload_suppressed, GlobalArgs};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status,
    /// Schedule a debounced push with this commit message.
    Schedule {
        /// Commit message; the last one scheduled within the quiet period wins.
        message: String,
    },
}

pub fn run(command: DaemonCommand, global: &GlobalArgs) -> Result<ExitCode> {
    let home = home()?;

    match command {
        DaemonCommand::Start => {
            let config = global.load()?;
            start_blocking(&home, config).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status => match request_status(&home) {
            Ok(status) => {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&status)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                let payload = serde_json::json!({
                    "running": false,
                    "socket": socket_path(&home).display().to_string(),
                });
                println!(
                    "{}",
                    serde_json::to_string_pretty(&payload)
                        .context("failed to render daemon status JSON")?
                );
            }
            Err(err) => return Err(err).context("failed to query daemon status"),
        },
        DaemonCommand::Schedule { message } => {
            let config = global.load()?;
            if upload_suppressed(&config) {
                println!(
                    "{} is set; not scheduling a push",
                    config.regeneration.suppress_env
                );
                return Ok(ExitCode::SUCCESS);
            }
            let scheduled = request_schedule(&home, &message).map_err(|err| match err {
                DaemonError::DaemonNotRunning { .. } => {
                    anyhow::anyhow!("daemon is not running; start it with `pagepush daemon start`")
                }
                other => anyhow::Error::new(other).context("failed to schedule push"),
            })?;
            println!(
                "✓ push scheduled in {}s: {}",
                scheduled["quiet_secs"].as_u64().unwrap_or_default(),
                message
            );
        }
    }

    Ok(ExitCode::SUCCESS)
}
