//! End-to-end scenarios across the console, bus, HTTP and MIDI paths.

use std::time::Duration;

use lfosc_config::ListenerMode;
use rstest::{fixture, rstest};

use crate::adapters::midi::{LOOPBACK_PORT, SentMessage};
use crate::daemon::DaemonPhase;
use crate::tests::support::{
    ConsoleClient, GatewayWorld, WAIT_TIMEOUT, http_get, unreachable_port,
};
use crate::transport::INVALID_COMMAND;

const QUIET_PERIOD: Duration = Duration::from_millis(300);

#[fixture]
fn gateway() -> GatewayWorld {
    let mut world = GatewayWorld::new(&["lf", "osc", "http"]);
    world.start_serving();
    world
}

#[rstest]
fn console_input_is_bridged_through_the_bus_to_the_console(gateway: GatewayWorld) {
    let bus = gateway.socket(ListenerMode::Bus);
    let echo = gateway.console.address();
    let mut client = ConsoleClient::connect(gateway.socket(ListenerMode::Console));

    let reply = client.exchange(&format!("osc@{bus} /lf/{echo}/foo bar 1234"));

    assert!(!reply.starts_with("error"), "unexpected reply {reply:?}");
    assert_eq!(
        gateway.console.next_command(WAIT_TIMEOUT).as_deref(),
        Some("foo bar 1234")
    );
}

#[rstest]
fn bridge_requests_reach_the_console(gateway: GatewayWorld) {
    let bridge = gateway.socket(ListenerMode::Http);
    let port = gateway.console.address().port();

    let reply = http_get(bridge, &format!("/lf/localhost:{port}/foo%20bar%201234"));

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "foo bar 1234 : Success");
    assert_eq!(
        gateway.console.next_command(WAIT_TIMEOUT).as_deref(),
        Some("foo bar 1234")
    );
}

#[rstest]
fn bridge_requests_play_midi_notes(gateway: GatewayWorld) {
    let bridge = gateway.socket(ListenerMode::Http);

    let reply = http_get(bridge, "/midi/loopMIDI%20Port/1:1:1");

    assert_eq!(reply.status, 200);
    assert_eq!(reply.body, "note (1,1,1) sent to device 'loopMIDI Port'");
    assert_eq!(
        gateway.driver.sent(),
        vec![
            SentMessage {
                port: LOOPBACK_PORT.to_owned(),
                bytes: vec![0x90, 1, 1],
            },
            SentMessage {
                port: LOOPBACK_PORT.to_owned(),
                bytes: vec![0x80, 1, 0],
            },
        ]
    );
}

#[rstest]
#[case("osc@127.0.0.1:3200")]
#[case("osc@127.0.0.1:3200 foo bar 1234")]
#[case("garbage")]
fn malformed_console_input_is_refused(gateway: GatewayWorld, #[case] line: &str) {
    let mut client = ConsoleClient::connect(gateway.socket(ListenerMode::Console));

    assert_eq!(client.exchange(line), INVALID_COMMAND);
    assert_eq!(gateway.console.next_command(QUIET_PERIOD), None);
}

#[rstest]
fn unreachable_targets_answer_with_an_error(gateway: GatewayWorld) {
    let mut client = ConsoleClient::connect(gateway.socket(ListenerMode::Console));
    let port = unreachable_port();

    let reply = client.exchange(&format!("lf@127.0.0.1:{port} /foo bar"));
    assert!(
        reply.starts_with(&format!("error: failed to reach 127.0.0.1:{port}")),
        "unexpected reply {reply:?}"
    );

    let echo = gateway.console.address();
    let reply = client.exchange(&format!("lf@{echo} /still alive"));
    assert_eq!(reply, "still alive : Success");
    assert_eq!(gateway.daemon_phase(), DaemonPhase::Running);
}

#[rstest]
fn bridge_failures_leave_the_daemon_running(gateway: GatewayWorld) {
    let bridge = gateway.socket(ListenerMode::Http);
    let port = unreachable_port();

    let reply = http_get(bridge, &format!("/lf/127.0.0.1:{port}/foo"));

    assert_eq!(reply.status, 400);
    assert!(reply.body.starts_with("failed to reach"), "{reply:?}");
    assert_eq!(gateway.daemon_phase(), DaemonPhase::Running);
}

#[rstest]
fn bridge_callbacks_wrap_results(gateway: GatewayWorld) {
    let bridge = gateway.socket(ListenerMode::Http);

    let reply = http_get(bridge, "/midi/default/60:100:1?callback=show");

    assert_eq!(reply.status, 200);
    assert_eq!(
        reply.content_type.as_deref(),
        Some("application/javascript")
    );
    assert_eq!(
        reply.body,
        r#"show({"data":"note (60,100,1) sent to device 'loopMIDI Port'"});"#
    );
}
