//! Lifecycle tests for the gateway daemon.

use std::net::{TcpListener, UdpSocket};
use std::sync::{Arc, Barrier, Mutex, OnceLock};
use std::thread;

use lfosc_config::{ListenerMode, ModeParseError};
use rstest::rstest;
use tempfile::TempDir;

use super::{Daemon, DaemonPhase, INVALID_MODES_CODE, LISTENER_FAILURE_CODE};
use crate::adapters::midi::VirtualMidiDriver;
use crate::health::HealthReporter;
use crate::protocol::ProtocolRegistry;
use crate::tests::support::{GatewayWorld, HealthEvent};
use crate::transport::{ListenerEndpoint, ListenerError, ListenerSettings};

/// Notes every phase the daemon is in when each lifecycle event fires.
#[derive(Default)]
struct PhaseRecorder {
    daemon: OnceLock<Daemon>,
    phases: Mutex<Vec<(&'static str, DaemonPhase)>>,
}

impl PhaseRecorder {
    fn note(&self, event: &'static str) {
        if let Some(daemon) = self.daemon.get() {
            self.phases
                .lock()
                .expect("phases lock")
                .push((event, daemon.phase()));
        }
    }
}

impl HealthReporter for PhaseRecorder {
    fn daemon_starting(&self, _modes: &[ListenerMode]) {
        self.note("starting");
    }

    fn modes_rejected(&self, _error: Option<&ModeParseError>) {
        self.note("rejected");
    }

    fn listener_started(&self, _mode: ListenerMode, _endpoint: &ListenerEndpoint) {}

    fn listener_failed(&self, _mode: ListenerMode, _error: &ListenerError) {}

    fn shutdown_requested(&self, _code: i32) {}

    fn daemon_stopped(&self, _code: i32) {
        self.note("stopped");
    }
}

#[test]
fn concurrent_shutdown_tears_down_once() {
    let mut world = GatewayWorld::new(&["osc", "lf"]);
    world.start_serving();
    let daemon = world.daemon();
    let barrier = Arc::new(Barrier::new(2));

    let callers: Vec<_> = (0..2)
        .map(|_| {
            let daemon = daemon.clone();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                daemon.shutdown(0);
                daemon.exit_code()
            })
        })
        .collect();
    let codes: Vec<i32> = callers
        .into_iter()
        .map(|caller| caller.join().expect("caller panicked"))
        .collect();

    assert_eq!(codes, vec![0, 0]);
    assert_eq!(world.finish(), 0);
    assert_eq!(daemon.teardown_count(), 1);
    assert_eq!(world.reporter.count(&HealthEvent::ShutdownRequested(0)), 1);
    assert_eq!(world.reporter.count(&HealthEvent::DaemonStopped(0)), 1);
    assert_eq!(daemon.phase(), DaemonPhase::Stopped);
}

#[test]
fn later_shutdown_codes_are_ignored() {
    let mut world = GatewayWorld::new(&["osc"]);
    world.start_serving();
    world.shutdown(0);
    world.shutdown(2);
    assert_eq!(world.finish(), 0);
}

#[rstest]
#[case::unknown_token(&["dmx"])]
#[case::unknown_among_known(&["osc", "dmx"])]
#[case::empty(&[])]
#[case::blank_entries(&[" ", ","])]
fn unusable_mode_sets_stop_without_listeners(#[case] modes: &[&str]) {
    let mut world = GatewayWorld::new(modes);
    let daemon = world.daemon();

    assert_eq!(daemon.run(), INVALID_MODES_CODE);
    assert_eq!(daemon.exit_code(), INVALID_MODES_CODE);
    assert_eq!(daemon.phase(), DaemonPhase::Stopped);
    assert!(world.reporter.started_modes().is_empty());
    assert!(
        world
            .reporter
            .events()
            .iter()
            .any(|event| matches!(event, HealthEvent::ModesRejected(_)))
    );
}

#[test]
fn rejected_mode_sets_never_enter_running() {
    let dir = TempDir::new().expect("temp dir");
    let recorder = Arc::new(PhaseRecorder::default());
    let daemon = Daemon::new(
        vec![String::from("dmx")],
        ListenerSettings::ephemeral(
            Arc::new(VirtualMidiDriver::new()),
            dir.path().join("midi-map.json"),
        ),
        Arc::new(ProtocolRegistry::new()),
        Arc::clone(&recorder) as Arc<dyn HealthReporter>,
    );
    recorder
        .daemon
        .set(daemon.clone())
        .expect("daemon recorded once");

    assert_eq!(daemon.run(), INVALID_MODES_CODE);
    assert_eq!(
        *recorder.phases.lock().expect("phases lock"),
        vec![
            ("rejected", DaemonPhase::Stopped),
            ("stopped", DaemonPhase::Stopped),
        ]
    );
}

#[test]
fn unknown_mode_is_named_in_the_rejection() {
    let mut world = GatewayWorld::new(&["dmx"]);
    world.daemon().run();
    assert!(world.reporter.events().contains(&HealthEvent::ModesRejected(Some(
        "unknown listener mode 'dmx'".to_owned()
    ))));
}

#[test]
fn shutdown_before_run_stops_immediately() {
    let mut world = GatewayWorld::new(&["osc"]);
    let daemon = world.daemon();
    daemon.shutdown(3);

    assert!(daemon.is_shutdown());
    assert_eq!(daemon.phase(), DaemonPhase::Stopped);
    assert_eq!(daemon.run(), 3);
    assert!(world.reporter.started_modes().is_empty());
}

#[test]
fn occupied_port_brings_the_daemon_down() {
    let occupied = TcpListener::bind("127.0.0.1:0").expect("occupy port");
    let mut world = GatewayWorld::new(&["osc", "lf"]);
    world.settings.console_port = occupied.local_addr().expect("occupied address").port();
    world.start();

    assert_eq!(world.finish(), LISTENER_FAILURE_CODE);
    assert_eq!(world.reporter.started_modes(), vec![ListenerMode::Bus]);
    assert!(world.reporter.events().iter().any(|event| matches!(
        event,
        HealthEvent::ListenerFailed(ListenerMode::Console, _)
    )));
    assert!(world.daemon().endpoints().is_empty());
}

#[test]
fn shutdown_releases_listener_ports() {
    let mut world = GatewayWorld::new(&["lf", "osc", "http"]);
    world.start_serving();
    let console = world.socket(ListenerMode::Console);
    let bus = world.socket(ListenerMode::Bus);
    let bridge = world.socket(ListenerMode::Http);
    assert_eq!(world.daemon().endpoints().len(), 3);

    world.shutdown(0);
    assert_eq!(world.finish(), 0);

    TcpListener::bind(console).expect("console port released");
    UdpSocket::bind(bus).expect("bus port released");
    TcpListener::bind(bridge).expect("bridge port released");
}

#[test]
fn run_after_stop_returns_the_recorded_code() {
    let mut world = GatewayWorld::new(&["osc"]);
    world.start_serving();
    world.shutdown(0);
    assert_eq!(world.finish(), 0);
    assert_eq!(world.daemon().run(), 0);
}
