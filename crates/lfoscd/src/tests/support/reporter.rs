//! Test double for [`HealthReporter`] that records lifecycle events.
//!
//! Listener endpoints are captured as they start, so tests bound to port 0
//! can discover where each listener actually landed.

use std::net::SocketAddr;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use lfosc_config::{ListenerMode, ModeParseError};

use crate::health::HealthReporter;
use crate::transport::{ListenerEndpoint, ListenerError};

/// Structured health events tracked during scenarios.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// The daemon accepted its mode set.
    DaemonStarting(Vec<ListenerMode>),
    /// The mode set was empty or held an unknown token.
    ModesRejected(Option<String>),
    /// A listener is accepting input.
    ListenerStarted(ListenerMode, ListenerEndpoint),
    /// A listener failed with an error description.
    ListenerFailed(ListenerMode, String),
    /// A shutdown sequence began.
    ShutdownRequested(i32),
    /// Every listener has exited.
    DaemonStopped(i32),
}

/// Records health events for assertions.
#[derive(Debug, Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
    recorded: Condvar,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    #[must_use]
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    pub fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
        self.recorded.notify_all();
    }

    /// Waits until an event satisfying `predicate` is recorded.
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Option<HealthEvent>
    where
        F: Fn(&HealthEvent) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock().expect("health reporter mutex poisoned");
        loop {
            if let Some(found) = events.iter().find(|event| predicate(event)) {
                return Some(found.clone());
            }
            let remaining = deadline.checked_duration_since(Instant::now())?;
            events = self
                .recorded
                .wait_timeout(events, remaining)
                .expect("health reporter mutex poisoned")
                .0;
        }
    }

    /// Waits for the socket of the listener started for `mode`.
    pub fn wait_for_socket(&self, mode: ListenerMode, timeout: Duration) -> Option<SocketAddr> {
        match self.wait_for(timeout, |event| {
            matches!(event, HealthEvent::ListenerStarted(started, _) if *started == mode)
        })? {
            HealthEvent::ListenerStarted(_, endpoint) => endpoint.socket_addr(),
            _ => None,
        }
    }

    /// Listener modes that reported a successful start.
    #[must_use]
    pub fn started_modes(&self) -> Vec<ListenerMode> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                HealthEvent::ListenerStarted(mode, _) => Some(mode),
                _ => None,
            })
            .collect()
    }

    /// Number of recorded events equal to `expected`.
    #[must_use]
    pub fn count(&self, expected: &HealthEvent) -> usize {
        self.events()
            .iter()
            .filter(|event| *event == expected)
            .count()
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn daemon_starting(&self, modes: &[ListenerMode]) {
        self.record(HealthEvent::DaemonStarting(modes.to_vec()));
    }

    fn modes_rejected(&self, error: Option<&ModeParseError>) {
        self.record(HealthEvent::ModesRejected(error.map(ToString::to_string)));
    }

    fn listener_started(&self, mode: ListenerMode, endpoint: &ListenerEndpoint) {
        self.record(HealthEvent::ListenerStarted(mode, endpoint.clone()));
    }

    fn listener_failed(&self, mode: ListenerMode, error: &ListenerError) {
        self.record(HealthEvent::ListenerFailed(mode, error.to_string()));
    }

    fn shutdown_requested(&self, code: i32) {
        self.record(HealthEvent::ShutdownRequested(code));
    }

    fn daemon_stopped(&self, code: i32) {
        self.record(HealthEvent::DaemonStopped(code));
    }
}
