//! Error types for protocol resolution and execution.

use std::error::Error as _;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Recoverable failure of a single request.
///
/// Listeners report these back on the transport that carried the request;
/// they never stop a listener or the daemon.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Input matched no registered grammar.
    #[error("unrecognized command '{input}'")]
    Unrecognized {
        /// Raw input as received.
        input: String,
    },
    /// Command names a protocol with no registered adapter.
    #[error("unknown protocol '{protocol}'")]
    UnknownProtocol {
        /// Requested protocol tag.
        protocol: String,
    },
    /// Target host could not be resolved.
    #[error("unknown host '{target}'")]
    UnknownHost {
        /// Target as written in the command.
        target: String,
        /// Resolver failure, when one was reported.
        #[source]
        source: Option<io::Error>,
    },
    /// Target is not in the form the adapter requires.
    #[error("invalid target '{target}': {reason}")]
    InvalidTarget {
        /// Target as written in the command.
        target: String,
        /// What was expected.
        reason: &'static str,
    },
    /// Network exchange with the target failed.
    #[error("failed to reach {target}")]
    Transport {
        /// Remote endpoint.
        target: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },
    /// Message could not be encoded for the wire.
    #[error("failed to encode message for {target}: {message}")]
    Encode {
        /// Remote endpoint.
        target: String,
        /// Codec description of the failure.
        message: String,
    },
    /// MIDI note operation is not `key:velocity:duration`.
    #[error("invalid note '{operation}', expected <key>:<velocity>:<duration>")]
    InvalidNote {
        /// Operation as received.
        operation: String,
    },
    /// No MIDI device matches the requested name or index.
    #[error("MIDI device '{device}' not found")]
    DeviceNotFound {
        /// Requested device.
        device: String,
    },
    /// MIDI device exists but could not be opened or written.
    #[error("MIDI device '{device}' unavailable: {message}")]
    DeviceUnavailable {
        /// Device name.
        device: String,
        /// Driver description of the failure.
        message: String,
    },
    /// An adapter was asked to relay to itself.
    #[error("protocol '{protocol}' cannot relay to itself")]
    SelfRelay {
        /// Offending protocol tag.
        protocol: String,
    },
    /// Binding table could not be read or written.
    #[error("failed to access MIDI binding table {path}")]
    BindingsIo {
        /// Table location.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Binding table holds malformed JSON.
    #[error("malformed MIDI binding table {path}")]
    BindingsFormat {
        /// Table location.
        path: PathBuf,
        /// Decoder error.
        #[source]
        source: serde_json::Error,
    },
    /// Interactive command console failed.
    #[error("command console IO failed")]
    Console {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Worker executing the request stopped before producing a result.
    #[error("request worker failed: {message}")]
    Worker {
        /// Failure description.
        message: String,
    },
}

impl ProtocolError {
    /// Builds the error for a failed console IO operation.
    pub(crate) fn console(source: io::Error) -> Self {
        Self::Console { source }
    }

    /// Text reported to callers: the message followed by its cause, if any.
    #[must_use]
    pub fn report(&self) -> String {
        match self.source() {
            Some(cause) => format!("{self} - {cause}"),
            None => self.to_string(),
        }
    }
}

/// Fatal failure while populating the adapter registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two adapters claimed the same tag.
    #[error("protocol '{protocol}' is already registered")]
    Duplicate {
        /// Conflicting tag.
        protocol: String,
    },
    /// An adapter factory could not build its adapter.
    #[error("failed to initialise adapter '{protocol}': {message}")]
    Factory {
        /// Tag of the failing adapter.
        protocol: String,
        /// Factory description of the failure.
        message: String,
    },
}
