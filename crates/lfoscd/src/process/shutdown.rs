use std::io;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::{Handle, Signals};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::PROCESS_TARGET;
use crate::daemon::Daemon;

/// Abstraction over shutdown notification mechanisms.
pub trait ShutdownSignal: Send + Sync {
    /// Blocks until shutdown should proceed, returning the signal number.
    ///
    /// `None` means the source was closed without a request.
    fn wait(&self) -> Result<Option<i32>, ShutdownError>;

    /// Unblocks a pending [`ShutdownSignal::wait`].
    fn close(&self);
}

/// Errors reported by shutdown signal listeners.
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// Installing signal handlers failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The watcher thread could not be spawned.
    #[error("failed to spawn the signal watcher: {source}")]
    Spawn {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Shutdown listener that waits for termination signals.
pub struct SystemShutdownSignal {
    signals: Mutex<Signals>,
    handle: Handle,
}

impl std::fmt::Debug for SystemShutdownSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemShutdownSignal").finish_non_exhaustive()
    }
}

impl SystemShutdownSignal {
    /// Installs handlers for SIGTERM, SIGINT, SIGQUIT and SIGHUP.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Install`] when registration fails.
    pub fn install() -> Result<Self, ShutdownError> {
        let signals = Signals::new([SIGTERM, SIGINT, SIGQUIT, SIGHUP])
            .map_err(|source| ShutdownError::Install { source })?;
        let handle = signals.handle();
        Ok(Self {
            signals: Mutex::new(signals),
            handle,
        })
    }
}

impl ShutdownSignal for SystemShutdownSignal {
    fn wait(&self) -> Result<Option<i32>, ShutdownError> {
        let mut signals = self.signals.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(signals.forever().next())
    }

    fn close(&self) {
        self.handle.close();
    }
}

/// Background thread turning a shutdown signal into `Daemon::shutdown(0)`.
pub struct ShutdownWatcher {
    signal: Arc<dyn ShutdownSignal>,
    thread: Option<thread::JoinHandle<()>>,
}

impl ShutdownWatcher {
    /// Starts watching `signal` on behalf of `daemon`.
    ///
    /// # Errors
    ///
    /// Returns [`ShutdownError::Spawn`] when the thread cannot start.
    pub fn spawn(signal: Arc<dyn ShutdownSignal>, daemon: Daemon) -> Result<Self, ShutdownError> {
        let watched = Arc::clone(&signal);
        let thread = thread::Builder::new()
            .name(String::from("lfoscd-signals"))
            .spawn(move || match watched.wait() {
                Ok(Some(signal)) => {
                    info!(target: PROCESS_TARGET, signal, "shutdown signal received");
                    daemon.shutdown(0);
                }
                Ok(None) => debug!(target: PROCESS_TARGET, "signal watcher closed"),
                Err(error) => {
                    warn!(target: PROCESS_TARGET, error = %error, "signal watcher failed");
                }
            })
            .map_err(|source| ShutdownError::Spawn { source })?;
        Ok(Self {
            signal,
            thread: Some(thread),
        })
    }

    /// Closes the signal source and joins the watcher thread.
    pub fn stop(mut self) {
        self.signal.close();
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for ShutdownWatcher {
    fn drop(&mut self) {
        self.signal.close();
    }
}
