//! Listeners accepting commands on each supported transport.
//!
//! Every listener binds eagerly, then serves on its own worker thread until
//! the shared [`CancelToken`] fires. Bind failures are returned to the caller;
//! failures after startup are reported through [`ListenerContext::on_fatal`].

mod bus;
mod console;
mod errors;
mod http;
mod lines;
mod midi;
mod session;

use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use lfosc_config::{Config, ListenerMode};
use tokio::runtime::Handle;

pub use self::errors::ListenerError;
#[cfg(test)]
pub(crate) use self::session::{GREETING, INVALID_COMMAND};

use crate::adapters::MidiDriver;
use crate::daemon::CancelToken;
use crate::protocol::ProtocolRegistry;

const LISTENER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");

/// Where a listener accepts input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerEndpoint {
    /// Bound network socket.
    Socket(SocketAddr),
    /// MIDI input device.
    Device(String),
}

impl ListenerEndpoint {
    /// Socket address, for network listeners.
    #[must_use]
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        match self {
            Self::Socket(addr) => Some(*addr),
            Self::Device(_) => None,
        }
    }
}

impl fmt::Display for ListenerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Socket(addr) => write!(f, "{addr}"),
            Self::Device(name) => write!(f, "midi:{name}"),
        }
    }
}

/// Addresses and devices the listeners bind to.
#[derive(Clone)]
pub struct ListenerSettings {
    /// Host every network listener binds to.
    pub bind_address: String,
    /// Console-protocol TCP port.
    pub console_port: u16,
    /// Bus-protocol UDP port.
    pub bus_port: u16,
    /// HTTP bridge port.
    pub http_port: u16,
    /// MIDI input watched by the receiver.
    pub midi_input: String,
    /// Key-binding table consulted by the receiver.
    pub midi_bindings: PathBuf,
    /// MIDI device access.
    pub midi_driver: Arc<dyn MidiDriver>,
}

impl fmt::Debug for ListenerSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerSettings")
            .field("bind_address", &self.bind_address)
            .field("console_port", &self.console_port)
            .field("bus_port", &self.bus_port)
            .field("http_port", &self.http_port)
            .field("midi_input", &self.midi_input)
            .field("midi_bindings", &self.midi_bindings)
            .finish_non_exhaustive()
    }
}

impl ListenerSettings {
    /// Settings taken from `config`.
    #[must_use]
    pub fn from_config(config: &Config, midi_driver: Arc<dyn MidiDriver>) -> Self {
        Self {
            bind_address: config.bind_address().to_owned(),
            console_port: config.console_port(),
            bus_port: config.bus_port(),
            http_port: config.http_port(),
            midi_input: config.midi_input().to_owned(),
            midi_bindings: config.midi_bindings().to_path_buf(),
            midi_driver,
        }
    }

    /// Settings binding every network listener to an ephemeral loopback port.
    #[must_use]
    pub fn ephemeral(midi_driver: Arc<dyn MidiDriver>, midi_bindings: PathBuf) -> Self {
        Self {
            bind_address: String::from("127.0.0.1"),
            console_port: 0,
            bus_port: 0,
            http_port: 0,
            midi_input: String::from(crate::adapters::midi::LOOPBACK_PORT),
            midi_bindings,
            midi_driver,
        }
    }
}

/// Callback invoked when a running listener hits a fatal error.
pub(crate) type FatalHandler = Arc<dyn Fn(ListenerMode, &ListenerError) + Send + Sync>;

/// Collaborators shared by every listener.
#[derive(Clone)]
pub(crate) struct ListenerContext {
    pub registry: Arc<ProtocolRegistry>,
    pub cancel: CancelToken,
    pub on_fatal: FatalHandler,
    pub runtime: Option<Handle>,
}

impl ListenerContext {
    fn fail(&self, mode: ListenerMode, error: &ListenerError) {
        if !self.cancel.is_cancelled() {
            (self.on_fatal)(mode, error);
        }
    }
}

/// Binds the listener for `mode` and starts serving.
///
/// # Errors
///
/// Returns [`ListenerError`] when the transport cannot be bound or opened.
pub(crate) fn launch(
    mode: ListenerMode,
    settings: &ListenerSettings,
    context: &ListenerContext,
) -> Result<ListenerHandle, ListenerError> {
    match mode {
        ListenerMode::Console => console::launch(settings, context.clone()),
        ListenerMode::Bus => bus::launch(settings, context.clone()),
        ListenerMode::Http => http::launch(settings, context.clone()),
        ListenerMode::Midi => midi::launch(settings, context.clone()),
    }
}

/// Handle on a running listener worker.
#[derive(Debug)]
pub struct ListenerHandle {
    mode: ListenerMode,
    endpoint: ListenerEndpoint,
    worker: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    fn new(mode: ListenerMode, endpoint: ListenerEndpoint, worker: thread::JoinHandle<()>) -> Self {
        Self {
            mode,
            endpoint,
            worker: Some(worker),
        }
    }

    /// Mode served by the worker.
    #[must_use]
    pub fn mode(&self) -> ListenerMode {
        self.mode
    }

    /// Where the worker accepts input.
    #[must_use]
    pub fn endpoint(&self) -> &ListenerEndpoint {
        &self.endpoint
    }

    /// Waits for the worker to exit.
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::ThreadPanic`] when the worker panicked.
    pub fn join(mut self) -> Result<(), ListenerError> {
        match self.worker.take().map(thread::JoinHandle::join) {
            Some(Err(_)) => Err(ListenerError::ThreadPanic),
            _ => Ok(()),
        }
    }
}

fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, ListenerError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ListenerError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    addrs.next().ok_or_else(|| ListenerError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })
}

fn spawn_worker<F>(mode: ListenerMode, work: F) -> Result<thread::JoinHandle<()>, ListenerError>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(format!("lfoscd-{}", mode.tag()))
        .spawn(work)
        .map_err(|source| ListenerError::Configure { source })
}
