//! Event-bus (OSC) adapter.
//!
//! Commands address `/<protocol>/<host>:<port>/<operation path>`. Delivery
//! encodes one message and sends it as a single UDP datagram.

use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs, UdpSocket};

use rosc::{OscMessage, OscPacket, encoder};
use tracing::debug;

use super::ADAPTER_TARGET;
use crate::protocol::{
    Argument, ProtocolAdapter, ProtocolData, ProtocolError, ProtocolRegistry, RawInput, tokenize,
};

/// Tag of the event-bus protocol.
pub const BUS_TAG: &str = "osc";

/// Adapter for the event-bus protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct BusAdapter;

impl ProtocolAdapter for BusAdapter {
    fn tag(&self) -> &'static str {
        BUS_TAG
    }

    fn recognize(&self, raw: &RawInput<'_>) -> Option<ProtocolData> {
        match raw {
            RawInput::Text(text) => {
                let text = text.trim();
                let (address, rest) = text
                    .split_once(char::is_whitespace)
                    .unwrap_or((text, ""));
                let (protocol, target, operation) = split_address(address)?;
                Some(ProtocolData::new(protocol, target, operation, tokenize(rest)))
            }
            RawInput::Bus(message) => {
                let (protocol, target, operation) = split_address(&message.addr)?;
                let arguments = message.args.iter().filter_map(Argument::from_osc).collect();
                Some(ProtocolData::new(protocol, target, operation, arguments))
            }
        }
    }

    fn process(
        &self,
        data: &ProtocolData,
        _registry: &ProtocolRegistry,
    ) -> Result<String, ProtocolError> {
        let destination = resolve_target(data.target())?;
        let packet = OscPacket::Message(OscMessage {
            addr: bus_address(data.operation()),
            args: data.arguments().iter().map(Argument::to_osc).collect(),
        });
        let bytes = encoder::encode(&packet).map_err(|error| ProtocolError::Encode {
            target: data.target().to_owned(),
            message: format!("{error:?}"),
        })?;
        let local: SocketAddr = if destination.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let transport = |source| ProtocolError::Transport {
            target: destination.to_string(),
            source,
        };
        let socket = UdpSocket::bind(local).map_err(transport)?;
        socket.send_to(&bytes, destination).map_err(transport)?;
        debug!(
            target: ADAPTER_TARGET,
            destination = %destination,
            bytes = bytes.len(),
            "bus message sent"
        );
        Ok(String::new())
    }
}

/// Splits `/<protocol>/<host>:<port>/<operation>` into its parts.
fn split_address(address: &str) -> Option<(&str, &str, &str)> {
    let mut parts = address.strip_prefix('/')?.splitn(3, '/');
    let protocol = parts.next().filter(|part| !part.is_empty())?;
    let target = parts.next().filter(|part| is_host_port(part))?;
    let operation = parts.next().filter(|part| !part.is_empty())?;
    Some((protocol, target, operation))
}

fn is_host_port(target: &str) -> bool {
    target.rsplit_once(':').is_some_and(|(host, port)| {
        !host.is_empty() && !port.is_empty() && port.chars().all(|ch| ch.is_ascii_digit())
    })
}

/// Resolves a `host:port` target to a socket address.
pub(crate) fn resolve_target(target: &str) -> Result<SocketAddr, ProtocolError> {
    let Some((host, port)) = target.rsplit_once(':') else {
        return Err(ProtocolError::InvalidTarget {
            target: target.to_owned(),
            reason: "expected <host>:<port>",
        });
    };
    let port = port.parse::<u16>().map_err(|_| ProtocolError::InvalidTarget {
        target: target.to_owned(),
        reason: "port must be a number between 0 and 65535",
    })?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let addresses: Vec<SocketAddr> = (host, port)
        .to_socket_addrs()
        .map_err(|source| ProtocolError::UnknownHost {
            target: target.to_owned(),
            source: Some(source),
        })?
        .collect();
    // IPv4 wins when a host such as `localhost` resolves to both families.
    addresses
        .iter()
        .find(|address| address.is_ipv4())
        .or_else(|| addresses.first())
        .copied()
        .ok_or_else(|| ProtocolError::UnknownHost {
            target: target.to_owned(),
            source: None,
        })
}

fn bus_address(operation: &str) -> String {
    if operation.starts_with('/') {
        operation.to_owned()
    } else {
        format!("/{operation}")
    }
}
