mod commit;
mod controls;
mod event_handler;
mod listener;
mod state;

pub use commit::{CommandCommit, CommitCoordinator, CommitTarget, HttpCommit, LogCommit};
pub use controls::{serve_controls, LocalCommand};
pub use event_handler::shutdown_overlay;
pub use listener::BusListener;
pub use state::{OverlayState, ViewSink};
