//! UDP listener for bus-protocol packets.
//!
//! Decoded packets are queued to one worker per sender, so a timed MIDI note
//! never holds up the receive loop while packets from the same sender still
//! run in arrival order. Messages inside one bundle run in order. Failures
//! and non-empty results are answered to the sender as bus messages.

use std::collections::HashMap;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::mpsc::{self, Sender};
use std::thread;
use std::time::{Duration, Instant};

use lfosc_config::ListenerMode;
use rosc::{OscMessage, OscPacket, OscType, decoder, encoder};
use tracing::{debug, info, trace, warn};

use super::{
    LISTENER_TARGET, ListenerContext, ListenerEndpoint, ListenerError, ListenerHandle,
    ListenerSettings, resolve_addr, spawn_worker,
};
use crate::protocol::{ProtocolRegistry, RawInput};

/// Address of replies carrying a command result.
pub(crate) const RESULT_ADDRESS: &str = "/lfosc/result";
/// Address of replies carrying a failure report.
pub(crate) const ERROR_ADDRESS: &str = "/lfosc/error";

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Quiet period after which a sender's worker is retired.
const PEER_IDLE: Duration = Duration::from_secs(30);

pub(super) fn launch(
    settings: &ListenerSettings,
    context: ListenerContext,
) -> Result<ListenerHandle, ListenerError> {
    let addr = resolve_addr(&settings.bind_address, settings.bus_port)?;
    let socket = UdpSocket::bind(addr).map_err(|source| ListenerError::BindUdp { addr, source })?;
    socket
        .set_read_timeout(Some(POLL_INTERVAL))
        .map_err(|source| ListenerError::Configure { source })?;
    let local = socket
        .local_addr()
        .map_err(|source| ListenerError::Configure { source })?;
    let worker = spawn_worker(ListenerMode::Bus, move || {
        if let Err(error) = run_receive_loop(&socket, &context) {
            context.fail(ListenerMode::Bus, &error);
        }
    })?;
    Ok(ListenerHandle::new(
        ListenerMode::Bus,
        ListenerEndpoint::Socket(local),
        worker,
    ))
}

fn run_receive_loop(socket: &UdpSocket, context: &ListenerContext) -> Result<(), ListenerError> {
    info!(
        target: LISTENER_TARGET,
        endpoint = ?socket.local_addr().ok(),
        "bus listener active"
    );
    let mut buffer = vec![0_u8; decoder::MTU];
    let mut queues = PeerQueues::default();
    while !context.cancel.is_cancelled() {
        queues.retire_idle();
        let (size, peer) = match socket.recv_from(&mut buffer) {
            Ok(received) => received,
            Err(error) if is_idle(&error) => continue,
            Err(error) if is_transient(&error) => {
                trace!(target: LISTENER_TARGET, error = %error, "ignoring bus receive error");
                continue;
            }
            Err(source) => return Err(ListenerError::Receive { source }),
        };
        match decoder::decode_udp(&buffer[..size]) {
            Ok((_, packet)) => queues.enqueue(socket, context, peer, packet)?,
            Err(error) => {
                debug!(target: LISTENER_TARGET, peer = %peer, error = ?error, "undecodable bus packet");
                send_reply(socket, peer, ERROR_ADDRESS, &format!("malformed packet: {error:?}"));
            }
        }
    }
    info!(target: LISTENER_TARGET, "bus listener stopped");
    Ok(())
}

/// Ordered packet queues keyed by sender.
///
/// Only the receive loop holds the senders. Dropping one lets its worker
/// drain what is queued and exit.
#[derive(Default)]
struct PeerQueues {
    queues: HashMap<SocketAddr, PeerQueue>,
}

struct PeerQueue {
    packets: Sender<OscPacket>,
    last_seen: Instant,
}

impl PeerQueues {
    fn enqueue(
        &mut self,
        socket: &UdpSocket,
        context: &ListenerContext,
        peer: SocketAddr,
        packet: OscPacket,
    ) -> Result<(), ListenerError> {
        let now = Instant::now();
        let packet = match self.queues.get_mut(&peer) {
            Some(queue) => {
                queue.last_seen = now;
                match queue.packets.send(packet) {
                    Ok(()) => return Ok(()),
                    Err(mpsc::SendError(packet)) => packet,
                }
            }
            None => packet,
        };
        let packets = spawn_peer_worker(socket, context, peer)?;
        if let Err(mpsc::SendError(packet)) = packets.send(packet) {
            warn!(target: LISTENER_TARGET, peer = %peer, packet = ?packet, "bus worker exited early");
        }
        self.queues.insert(
            peer,
            PeerQueue {
                packets,
                last_seen: now,
            },
        );
        Ok(())
    }

    fn retire_idle(&mut self) {
        self.queues
            .retain(|_, queue| queue.last_seen.elapsed() < PEER_IDLE);
    }
}

fn spawn_peer_worker(
    socket: &UdpSocket,
    context: &ListenerContext,
    peer: SocketAddr,
) -> Result<Sender<OscPacket>, ListenerError> {
    let reply = socket
        .try_clone()
        .map_err(|source| ListenerError::Configure { source })?;
    let registry = Arc::clone(&context.registry);
    let cancel = context.cancel.clone();
    let (packets, queue) = mpsc::channel();
    thread::Builder::new()
        .name(format!("lfoscd-bus-{peer}"))
        .spawn(move || {
            for packet in queue {
                if cancel.is_cancelled() {
                    break;
                }
                handle_packet(&registry, packet, &reply, peer);
            }
            trace!(target: LISTENER_TARGET, peer = %peer, "bus worker retired");
        })
        .map_err(|source| ListenerError::Configure { source })?;
    Ok(packets)
}

fn is_idle(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::ConnectionReset | io::ErrorKind::ConnectionRefused
    )
}

/// Processes every message in `packet`, depth first and in order.
fn handle_packet(
    registry: &ProtocolRegistry,
    packet: OscPacket,
    reply: &UdpSocket,
    peer: SocketAddr,
) {
    match packet {
        OscPacket::Message(message) => handle_message(registry, &message, reply, peer),
        OscPacket::Bundle(bundle) => {
            for element in bundle.content {
                handle_packet(registry, element, reply, peer);
            }
        }
    }
}

fn handle_message(
    registry: &ProtocolRegistry,
    message: &OscMessage,
    reply: &UdpSocket,
    peer: SocketAddr,
) {
    trace!(target: LISTENER_TARGET, peer = %peer, address = %message.addr, "bus >>");
    match registry.resolve_and_dispatch(&RawInput::Bus(message)) {
        Ok(result) if result.is_empty() => {}
        Ok(result) => send_reply(reply, peer, RESULT_ADDRESS, &result),
        Err(error) => {
            debug!(
                target: LISTENER_TARGET,
                peer = %peer,
                error = %error.report(),
                "bus command failed"
            );
            send_reply(reply, peer, ERROR_ADDRESS, &error.report());
        }
    }
}

fn send_reply(socket: &UdpSocket, peer: SocketAddr, address: &str, text: &str) {
    let packet = OscPacket::Message(OscMessage {
        addr: address.to_owned(),
        args: vec![OscType::String(text.to_owned())],
    });
    let sent = encoder::encode(&packet)
        .map_err(|error| io::Error::new(io::ErrorKind::InvalidData, format!("{error:?}")))
        .and_then(|bytes| socket.send_to(&bytes, peer));
    if let Err(error) = sent {
        warn!(target: LISTENER_TARGET, peer = %peer, error = %error, "failed to answer bus sender");
    }
}
