//! Structured health reporting for daemon lifecycle events.

use std::sync::Arc;

use lfosc_config::{ListenerMode, ModeParseError};

use crate::transport::{ListenerEndpoint, ListenerError};

const HEALTH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::health");

/// Observer trait used to surface lifecycle events to telemetry sinks.
pub trait HealthReporter: Send + Sync {
    /// Invoked before any listener is launched.
    fn daemon_starting(&self, modes: &[ListenerMode]);

    /// Invoked when the requested mode set is unusable.
    fn modes_rejected(&self, error: Option<&ModeParseError>);

    /// Invoked once a listener is accepting input.
    fn listener_started(&self, mode: ListenerMode, endpoint: &ListenerEndpoint);

    /// Invoked when a listener fails to start or stops on a fatal error.
    fn listener_failed(&self, mode: ListenerMode, error: &ListenerError);

    /// Invoked when a shutdown sequence begins.
    fn shutdown_requested(&self, code: i32);

    /// Invoked after every listener has exited.
    fn daemon_stopped(&self, code: i32);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter + ?Sized,
{
    fn daemon_starting(&self, modes: &[ListenerMode]) {
        (**self).daemon_starting(modes);
    }

    fn modes_rejected(&self, error: Option<&ModeParseError>) {
        (**self).modes_rejected(error);
    }

    fn listener_started(&self, mode: ListenerMode, endpoint: &ListenerEndpoint) {
        (**self).listener_started(mode, endpoint);
    }

    fn listener_failed(&self, mode: ListenerMode, error: &ListenerError) {
        (**self).listener_failed(mode, error);
    }

    fn shutdown_requested(&self, code: i32) {
        (**self).shutdown_requested(code);
    }

    fn daemon_stopped(&self, code: i32) {
        (**self).daemon_stopped(code);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn daemon_starting(&self, modes: &[ListenerMode]) {
        let modes: Vec<&str> = modes.iter().map(|mode| mode.tag()).collect();
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_starting",
            modes = ?modes,
            "starting gateway daemon"
        );
    }

    fn modes_rejected(&self, error: Option<&ModeParseError>) {
        match error {
            Some(error) => tracing::error!(
                target: HEALTH_TARGET,
                event = "modes_rejected",
                error = %error,
                "invalid listener mode"
            ),
            None => tracing::error!(
                target: HEALTH_TARGET,
                event = "modes_rejected",
                "no listener modes requested"
            ),
        }
    }

    fn listener_started(&self, mode: ListenerMode, endpoint: &ListenerEndpoint) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "listener_started",
            mode = %mode,
            endpoint = %endpoint,
            "listener ready"
        );
    }

    fn listener_failed(&self, mode: ListenerMode, error: &ListenerError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "listener_failed",
            mode = %mode,
            error = %error,
            "listener failed"
        );
    }

    fn shutdown_requested(&self, code: i32) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "shutdown_requested",
            code,
            "shutting down gateway daemon"
        );
    }

    fn daemon_stopped(&self, code: i32) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "daemon_stopped",
            code,
            "gateway daemon stopped"
        );
    }
}
