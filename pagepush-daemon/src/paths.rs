use std::path::{Path, PathBuf};
use std::time::Duration;

use pagepush_core::config::state_dir_at;

/// Filesystem events for one artifact closer together than this are one change.
pub const WATCH_DEBOUNCE: Duration = Duration::from_millis(500);

pub const DAEMON_SOCKET: &str = "daemon.sock";

pub fn run_dir(home: &Path) -> PathBuf {
    state_dir_at(home).join("run")
}

pub fn socket_path(home: &Path) -> PathBuf {
    run_dir(home).join(DAEMON_SOCKET)
}
