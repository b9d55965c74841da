//! Gateway test world: a daemon on ephemeral ports, its recorded health
//! events, a mock console and the virtual MIDI loopback.

use std::cell::RefCell;
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lfosc_config::ListenerMode;
use tempfile::TempDir;

use crate::adapters::midi::VirtualMidiDriver;
use crate::adapters::{AdapterSettings, builtin_registry};
use crate::daemon::{Daemon, DaemonPhase};
use crate::transport::ListenerSettings;

use super::console_target::ConsoleTarget;
use super::reporter::{HealthEvent, RecordingHealthReporter};

pub const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Scenario world shared across gateway steps.
pub struct GatewayWorld {
    pub reporter: Arc<RecordingHealthReporter>,
    pub driver: VirtualMidiDriver,
    pub console: ConsoleTarget,
    pub modes: Vec<String>,
    pub settings: ListenerSettings,
    daemon: Option<Daemon>,
    runner: Option<thread::JoinHandle<i32>>,
    exit_code: Option<i32>,
    pub last_reply: Option<String>,
    /// Socket held open to make a port unavailable.
    pub reserved: Option<TcpListener>,
    _dir: TempDir,
}

impl GatewayWorld {
    /// Builds a world serving `modes` once started.
    #[must_use]
    pub fn new(modes: &[&str]) -> Self {
        let dir = TempDir::new().expect("failed to create temporary directory");
        let driver = VirtualMidiDriver::new();
        let settings =
            ListenerSettings::ephemeral(Arc::new(driver.clone()), dir.path().join("midi-map.json"));
        Self {
            reporter: Arc::new(RecordingHealthReporter::default()),
            driver,
            console: ConsoleTarget::spawn(),
            modes: modes.iter().map(ToString::to_string).collect(),
            settings,
            daemon: None,
            runner: None,
            exit_code: None,
            last_reply: None,
            reserved: None,
            _dir: dir,
        }
    }

    /// Builds the daemon without running it.
    pub fn daemon(&mut self) -> Daemon {
        if let Some(daemon) = &self.daemon {
            return daemon.clone();
        }
        let adapters = AdapterSettings {
            console_timeout: Duration::from_secs(1),
            midi_driver: Arc::new(self.driver.clone()),
            midi_bindings: self.settings.midi_bindings.clone(),
        };
        let registry = builtin_registry(&adapters).expect("builtin registry");
        let daemon = Daemon::new(
            self.modes.clone(),
            self.settings.clone(),
            Arc::new(registry),
            self.reporter.clone(),
        );
        self.daemon = Some(daemon.clone());
        daemon
    }

    /// Runs the daemon on a background thread.
    pub fn start(&mut self) {
        if self.runner.is_some() {
            return;
        }
        let daemon = self.daemon();
        self.runner = Some(thread::spawn(move || daemon.run()));
    }

    /// Runs the daemon on a background thread and waits for every listener.
    pub fn start_serving(&mut self) {
        self.start();
        let modes = ListenerMode::parse_set(&self.modes).expect("valid modes");
        for mode in modes {
            let _ = self.socket_or_device(mode);
        }
    }

    fn socket_or_device(&self, mode: ListenerMode) -> HealthEvent {
        self.reporter
            .wait_for(WAIT_TIMEOUT, |event| {
                matches!(event, HealthEvent::ListenerStarted(started, _) if *started == mode)
            })
            .unwrap_or_else(|| panic!("{mode} listener did not start: {:?}", self.reporter.events()))
    }

    /// Address of the running listener for `mode`.
    pub fn socket(&self, mode: ListenerMode) -> SocketAddr {
        self.reporter
            .wait_for_socket(mode, WAIT_TIMEOUT)
            .unwrap_or_else(|| panic!("{mode} listener did not start: {:?}", self.reporter.events()))
    }

    /// Requests shutdown with `code`.
    pub fn shutdown(&mut self, code: i32) {
        self.daemon().shutdown(code);
    }

    /// Joins the run thread and returns the daemon's exit code.
    pub fn finish(&mut self) -> i32 {
        if let Some(code) = self.exit_code {
            return code;
        }
        let code = match self.runner.take() {
            Some(runner) => runner.join().expect("daemon thread panicked"),
            None => self.daemon().run(),
        };
        self.exit_code = Some(code);
        code
    }

    /// Phase of the daemon, `NotStarted` before it is built.
    #[must_use]
    pub fn daemon_phase(&self) -> DaemonPhase {
        self.daemon
            .as_ref()
            .map_or(DaemonPhase::NotStarted, Daemon::phase)
    }

    /// Whether the daemon has reported its stop.
    #[must_use]
    pub fn stopped(&self) -> bool {
        self.reporter
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::DaemonStopped(_)))
    }
}

impl Drop for GatewayWorld {
    fn drop(&mut self) {
        if let Some(daemon) = &self.daemon {
            daemon.shutdown(0);
        }
        if let Some(runner) = self.runner.take() {
            let _ = runner.join();
        }
    }
}

/// Default world fixture serving the console, bus and bridge listeners.
#[must_use]
pub fn world() -> RefCell<GatewayWorld> {
    RefCell::new(GatewayWorld::new(&["lf", "osc", "http"]))
}
