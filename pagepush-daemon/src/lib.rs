//! pagepush daemon: artifact watcher, debounced push scheduler and the
//! control socket the CLI talks to.

mod error;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod scheduler;

pub use error::DaemonError;
pub use protocol::{
    request_push, request_schedule, request_status, request_stop, send_request, DaemonRequest,
    DaemonResponse,
};
pub use runtime::{init_tracing, run, start_blocking};
pub use scheduler::{PushRunner, PushScheduler};
