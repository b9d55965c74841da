//! Process-level integration: termination signals.

pub(crate) mod shutdown;

pub use shutdown::{ShutdownError, ShutdownSignal, ShutdownWatcher, SystemShutdownSignal};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");
