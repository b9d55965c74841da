//! Gateway daemon lifecycle.
//!
//! A [`Daemon`] moves through `NotStarted → Running → ShuttingDown → Stopped`.
//! [`Daemon::run`] launches one listener per requested mode, blocks until a
//! shutdown is requested, joins every listener worker and returns the exit
//! code. [`Daemon::shutdown`] may be called from any thread, any number of
//! times; only the first call tears anything down.

mod cancel;
#[cfg(test)]
mod tests;

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use lfosc_config::{Config, ListenerMode, ModeParseError};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

pub use cancel::{CancelObserver, CancelToken};

use crate::adapters::MidiDriver;
use crate::health::HealthReporter;
use crate::protocol::ProtocolRegistry;
use crate::transport::{
    self, ListenerContext, ListenerEndpoint, ListenerError, ListenerHandle, ListenerSettings,
};

const DAEMON_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::daemon");
const RUNTIME_SHUTDOWN: Duration = Duration::from_secs(2);

/// Exit code for an empty or unrecognised mode set.
pub const INVALID_MODES_CODE: i32 = 1;
/// Exit code for a listener that failed to bind or stopped on an error.
pub const LISTENER_FAILURE_CODE: i32 = 2;

/// Lifecycle phase of a [`Daemon`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonPhase {
    /// `run` has not been called.
    NotStarted,
    /// Listeners are serving.
    Running,
    /// Shutdown was requested; listeners are draining.
    ShuttingDown,
    /// Every listener has exited.
    Stopped,
}

struct DaemonState {
    phase: DaemonPhase,
    error_code: i32,
    handles: Vec<ListenerHandle>,
}

struct DaemonShared {
    requested: Vec<String>,
    settings: ListenerSettings,
    registry: Arc<ProtocolRegistry>,
    reporter: Arc<dyn HealthReporter>,
    cancel: CancelToken,
    shutdown_started: AtomicBool,
    teardowns: AtomicUsize,
    state: Mutex<DaemonState>,
    changed: Condvar,
}

/// Cloneable handle on the gateway daemon.
#[derive(Clone)]
pub struct Daemon {
    shared: Arc<DaemonShared>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon")
            .field("requested", &self.shared.requested)
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Daemon {
    /// Builds a daemon that will serve `requested` modes.
    ///
    /// Mode tokens are validated when [`Daemon::run`] is called.
    #[must_use]
    pub fn new(
        requested: Vec<String>,
        settings: ListenerSettings,
        registry: Arc<ProtocolRegistry>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self {
            shared: Arc::new(DaemonShared {
                requested,
                settings,
                registry,
                reporter,
                cancel: CancelToken::new(),
                shutdown_started: AtomicBool::new(false),
                teardowns: AtomicUsize::new(0),
                state: Mutex::new(DaemonState {
                    phase: DaemonPhase::NotStarted,
                    error_code: 0,
                    handles: Vec::new(),
                }),
                changed: Condvar::new(),
            }),
        }
    }

    /// Builds a daemon from `config`, serving the default modes when none are
    /// configured.
    #[must_use]
    pub fn from_config(
        config: &Config,
        registry: Arc<ProtocolRegistry>,
        midi_driver: Arc<dyn MidiDriver>,
        reporter: Arc<dyn HealthReporter>,
    ) -> Self {
        Self::new(
            config.requested_modes(),
            ListenerSettings::from_config(config, midi_driver),
            registry,
            reporter,
        )
    }

    /// Registry shared by every listener.
    #[must_use]
    pub fn registry(&self) -> &Arc<ProtocolRegistry> {
        &self.shared.registry
    }

    /// Current lifecycle phase.
    #[must_use]
    pub fn phase(&self) -> DaemonPhase {
        self.state().phase
    }

    /// Whether a shutdown has been requested.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.shared.shutdown_started.load(Ordering::SeqCst)
    }

    /// Endpoints of the listeners currently running.
    #[must_use]
    pub fn endpoints(&self) -> Vec<(ListenerMode, ListenerEndpoint)> {
        self.state()
            .handles
            .iter()
            .map(|handle| (handle.mode(), handle.endpoint().clone()))
            .collect()
    }

    /// Runs the daemon until shutdown and returns its exit code.
    ///
    /// Calling `run` on a daemon that has already been started waits for it
    /// to stop instead.
    pub fn run(&self) -> i32 {
        let modes = {
            let mut state = self.state();
            if state.phase != DaemonPhase::NotStarted {
                drop(state);
                return self.exit_code();
            }
            match usable_modes(&self.shared.requested) {
                Ok(modes) => {
                    state.phase = DaemonPhase::Running;
                    modes
                }
                Err(rejection) => {
                    if !self.shared.shutdown_started.swap(true, Ordering::SeqCst) {
                        self.shared.cancel.cancel();
                        state.error_code = INVALID_MODES_CODE;
                    }
                    state.phase = DaemonPhase::Stopped;
                    let code = state.error_code;
                    drop(state);
                    self.shared.reporter.modes_rejected(rejection.as_ref());
                    self.shared.changed.notify_all();
                    self.shared.reporter.daemon_stopped(code);
                    return code;
                }
            }
        };
        self.shared.reporter.daemon_starting(&modes);

        let runtime = self.launch_listeners(&modes);
        self.wait_for_shutdown_request();
        self.join_listeners();
        if let Some(runtime) = runtime {
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN);
        }
        self.finish()
    }

    /// Requests shutdown with `code`.
    ///
    /// Only the first call has any effect: it records the code, cancels every
    /// listener and wakes the thread blocked in [`Daemon::run`].
    pub fn shutdown(&self, code: i32) {
        if self.shared.shutdown_started.swap(true, Ordering::SeqCst) {
            debug!(target: DAEMON_TARGET, code, "shutdown already requested");
            return;
        }
        self.shared.teardowns.fetch_add(1, Ordering::SeqCst);
        self.shared.reporter.shutdown_requested(code);
        let never_started = {
            let mut state = self.state();
            state.error_code = code;
            match state.phase {
                DaemonPhase::NotStarted => {
                    state.phase = DaemonPhase::Stopped;
                    true
                }
                DaemonPhase::Running => {
                    state.phase = DaemonPhase::ShuttingDown;
                    false
                }
                DaemonPhase::ShuttingDown | DaemonPhase::Stopped => false,
            }
        };
        self.shared.cancel.cancel();
        self.shared.changed.notify_all();
        if never_started {
            self.shared.reporter.daemon_stopped(code);
        }
    }

    /// Blocks until the daemon has stopped, then returns its exit code.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let mut state = self.state();
        while state.phase != DaemonPhase::Stopped {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        state.error_code
    }

    /// Number of teardown sequences that ran.
    #[cfg(test)]
    pub(crate) fn teardown_count(&self) -> usize {
        self.shared.teardowns.load(Ordering::SeqCst)
    }

    fn state(&self) -> MutexGuard<'_, DaemonState> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn launch_listeners(&self, modes: &[ListenerMode]) -> Option<Runtime> {
        let runtime = if modes.contains(&ListenerMode::Http) {
            match Builder::new_multi_thread()
                .enable_all()
                .thread_name("lfoscd-http-worker")
                .build()
            {
                Ok(runtime) => Some(runtime),
                Err(source) => {
                    self.listener_failed(ListenerMode::Http, &ListenerError::Configure { source });
                    return None;
                }
            }
        } else {
            None
        };
        let context = ListenerContext {
            registry: Arc::clone(&self.shared.registry),
            cancel: self.shared.cancel.clone(),
            on_fatal: fatal_handler(Arc::downgrade(&self.shared)),
            runtime: runtime.as_ref().map(|runtime| runtime.handle().clone()),
        };
        for &mode in modes {
            if self.is_shutdown() {
                break;
            }
            match transport::launch(mode, &self.shared.settings, &context) {
                Ok(handle) => {
                    self.shared
                        .reporter
                        .listener_started(mode, handle.endpoint());
                    self.state().handles.push(handle);
                }
                Err(error) => {
                    self.listener_failed(mode, &error);
                    break;
                }
            }
        }
        runtime
    }

    fn listener_failed(&self, mode: ListenerMode, error: &ListenerError) {
        self.shared.reporter.listener_failed(mode, error);
        self.shutdown(LISTENER_FAILURE_CODE);
    }

    fn wait_for_shutdown_request(&self) {
        let mut state = self.state();
        while state.phase == DaemonPhase::Running {
            state = self
                .shared
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn join_listeners(&self) {
        let handles = mem::take(&mut self.state().handles);
        for handle in handles {
            let mode = handle.mode();
            if let Err(error) = handle.join() {
                warn!(target: DAEMON_TARGET, mode = %mode, error = %error, "listener exited abnormally");
            }
        }
    }

    fn finish(&self) -> i32 {
        let code = {
            let mut state = self.state();
            state.phase = DaemonPhase::Stopped;
            state.error_code
        };
        self.shared.changed.notify_all();
        self.shared.reporter.daemon_stopped(code);
        code
    }
}

/// Parses the requested modes. An empty set is rejected without a parse
/// error.
fn usable_modes(requested: &[String]) -> Result<Vec<ListenerMode>, Option<ModeParseError>> {
    match ListenerMode::parse_set(requested) {
        Ok(modes) if modes.is_empty() => Err(None),
        Ok(modes) => Ok(modes),
        Err(error) => Err(Some(error)),
    }
}

fn fatal_handler(daemon: Weak<DaemonShared>) -> transport::FatalHandler {
    Arc::new(move |mode: ListenerMode, error: &ListenerError| {
        if let Some(shared) = daemon.upgrade() {
            Daemon { shared }.listener_failed(mode, error);
        }
    })
}
