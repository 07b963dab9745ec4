//! pagepush: publish generated pages to a git repository.
//!
//! # Usage
//!
//! ```text
//! pagepush [--config PATH] [--repo PATH] --validate
//! pagepush [--config PATH] [--repo PATH] --force-sync
//! pagepush [--config PATH] [--repo PATH] "<commit message>"
//! pagepush init <repo-path>
//! pagepush status [--json]
//! pagepush publish [--dry-run] [--diff] [--push] [--message MSG]
//! pagepush daemon start|stop|status|schedule <message>
//! ```

mod commands;
mod context;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    daemon::DaemonCommand, init::InitArgs, publish::PublishArgs, status::StatusArgs,
};
use context::GlobalArgs;

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "pagepush",
    version,
    about = "Publish generated pages to a git repository, recovering from a diverged remote",
    long_about = None,
    args_conflicts_with_subcommands = true,
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    /// Read-only health check of the repository; exits 1 when unhealthy.
    #[arg(long, conflicts_with_all = ["force_sync", "message"])]
    validate: bool,

    /// Back up local history, reset to the remote tip and regenerate content.
    #[arg(long, conflicts_with = "message")]
    force_sync: bool,

    /// Commit message for an immediate push of pending changes.
    message: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a default config for a repository checkout.
    Init(InitArgs),

    /// Show pending repository changes and each artifact's freshness.
    Status(StatusArgs),

    /// Copy changed artifacts into the repository, optionally pushing.
    Publish(PublishArgs),

    /// Run or control the background watcher.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let default_filter = match &cli.command {
        Some(Commands::Daemon {
            command: DaemonCommand::Start,
        }) => "info",
        _ => "warn",
    };
    pagepush_daemon::init_tracing(default_filter);

    let global = cli.global;
    match cli.command {
        Some(Commands::Init(args)) => args.run(&global),
        Some(Commands::Status(args)) => args.run(&global),
        Some(Commands::Publish(args)) => args.run(&global),
        Some(Commands::Daemon { command }) => commands::daemon::run(command, &global),
        None if cli.validate => commands::push::validate(&global),
        None if cli.force_sync => commands::push::force_sync(&global),
        None => match cli.message {
            Some(message) => commands::push::push(&global, &message),
            None => {
                eprintln!("nothing to do: pass a commit message, --validate or --force-sync (see --help)");
                Ok(ExitCode::from(2))
            }
        },
    }
}
