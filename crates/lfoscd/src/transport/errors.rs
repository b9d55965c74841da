//! Error types for listener startup and operation.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::protocol::ProtocolError;

/// Fatal listener failures. Any of these stops the whole daemon.
#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("failed to resolve address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error("failed to bind TCP listener at {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind UDP socket at {addr}: {source}")]
    BindUdp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("failed to configure listener socket: {source}")]
    Configure {
        #[source]
        source: io::Error,
    },
    #[error("failed to accept console connection: {source}")]
    Accept {
        #[source]
        source: io::Error,
    },
    #[error("failed to receive datagram: {source}")]
    Receive {
        #[source]
        source: io::Error,
    },
    #[error("HTTP bridge failed: {source}")]
    Serve {
        #[source]
        source: io::Error,
    },
    #[error("no async runtime available for the HTTP bridge")]
    RuntimeUnavailable,
    #[error("failed to open MIDI input '{device}': {source}")]
    MidiInput {
        device: String,
        #[source]
        source: ProtocolError,
    },
    #[error("failed to load MIDI bindings: {source}")]
    Bindings {
        #[source]
        source: ProtocolError,
    },
    #[error("listener thread panicked")]
    ThreadPanic,
}
