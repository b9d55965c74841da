//! MIDI device access.
//!
//! The gateway talks to MIDI hardware only through [`MidiDriver`]. The
//! default build ships [`VirtualMidiDriver`], an in-process loopback exposing
//! a single `loopMIDI Port` device on which every sent message is recorded and
//! echoed to open inputs. The `hardware-midi` feature adds a `midir` driver.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::protocol::ProtocolError;

/// Name of the loopback device exposed by [`VirtualMidiDriver`].
pub const LOOPBACK_PORT: &str = "loopMIDI Port";

/// Callback receiving raw messages from an input device.
pub type MidiSink = Arc<dyn Fn(&[u8]) + Send + Sync>;

/// Open output connection.
pub trait MidiOutputPort: Send {
    /// Sends one raw message.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DeviceUnavailable`] when the device rejects it.
    fn send(&mut self, message: &[u8]) -> Result<(), ProtocolError>;
}

/// Open input connection. Dropping or closing it stops delivery.
pub trait MidiInputPort: Send {
    /// Stops delivery and releases the device.
    fn close(self: Box<Self>);
}

/// Access to the host's MIDI devices.
#[cfg_attr(test, mockall::automock)]
pub trait MidiDriver: Send + Sync {
    /// Names of the input devices, in index order.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DeviceUnavailable`] when enumeration fails.
    fn input_ports(&self) -> Result<Vec<String>, ProtocolError>;

    /// Names of the output devices, in index order.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DeviceUnavailable`] when enumeration fails.
    fn output_ports(&self) -> Result<Vec<String>, ProtocolError>;

    /// Name of the output used for the `default` device.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DeviceNotFound`] when no output exists.
    fn default_output(&self) -> Result<String, ProtocolError> {
        self.output_ports()?
            .into_iter()
            .next()
            .ok_or_else(|| ProtocolError::DeviceNotFound {
                device: String::from("default"),
            })
    }

    /// Opens the named output device.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DeviceNotFound`] or
    /// [`ProtocolError::DeviceUnavailable`].
    fn open_output(&self, port: &str) -> Result<Box<dyn MidiOutputPort>, ProtocolError>;

    /// Opens the named input device, delivering its messages to `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::DeviceNotFound`] or
    /// [`ProtocolError::DeviceUnavailable`].
    fn open_input(
        &self,
        port: &str,
        sink: MidiSink,
    ) -> Result<Box<dyn MidiInputPort>, ProtocolError>;
}

/// Finds a device by index or by case-insensitive name.
///
/// Exact names win over prefixes so `loopMIDI Port` still matches drivers
/// that decorate names with client numbers.
#[must_use]
pub fn find_port(ports: &[String], wanted: &str) -> Option<String> {
    if let Ok(index) = wanted.trim().parse::<usize>() {
        return ports.get(index).cloned();
    }
    let wanted_lower = wanted.to_lowercase();
    ports
        .iter()
        .find(|port| port.to_lowercase() == wanted_lower)
        .or_else(|| {
            ports
                .iter()
                .find(|port| port.to_lowercase().starts_with(&wanted_lower))
        })
        .cloned()
}

/// Message written to a virtual output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Device written to.
    pub port: String,
    /// Raw message bytes.
    pub bytes: Vec<u8>,
}

struct InputRegistration {
    id: u64,
    port: String,
    sink: MidiSink,
}

#[derive(Default)]
struct VirtualBus {
    ports: Vec<String>,
    sent: Mutex<Vec<SentMessage>>,
    inputs: Mutex<Vec<InputRegistration>>,
    next_id: AtomicU64,
}

impl VirtualBus {
    fn deliver(&self, port: &str, bytes: &[u8]) {
        let sinks: Vec<MidiSink> = self
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|input| input.port == port)
            .map(|input| Arc::clone(&input.sink))
            .collect();
        for sink in sinks {
            sink(bytes);
        }
    }

    fn lookup(&self, port: &str) -> Result<String, ProtocolError> {
        find_port(&self.ports, port).ok_or_else(|| ProtocolError::DeviceNotFound {
            device: port.to_owned(),
        })
    }
}

/// In-process loopback driver.
#[derive(Clone)]
pub struct VirtualMidiDriver {
    bus: Arc<VirtualBus>,
}

impl std::fmt::Debug for VirtualMidiDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualMidiDriver")
            .field("ports", &self.bus.ports)
            .finish_non_exhaustive()
    }
}

impl Default for VirtualMidiDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualMidiDriver {
    /// Builds a driver exposing the [`LOOPBACK_PORT`] device.
    #[must_use]
    pub fn new() -> Self {
        Self::with_ports([LOOPBACK_PORT])
    }

    /// Builds a driver exposing the named loopback devices.
    #[must_use]
    pub fn with_ports<I, S>(ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            bus: Arc::new(VirtualBus {
                ports: ports.into_iter().map(Into::into).collect(),
                ..VirtualBus::default()
            }),
        }
    }

    /// Messages written to outputs so far.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.bus
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Delivers `bytes` to every open input on `port`, as if played on it.
    pub fn inject(&self, port: &str, bytes: &[u8]) {
        self.bus.deliver(port, bytes);
    }

    /// Number of inputs currently open.
    #[must_use]
    pub fn open_inputs(&self) -> usize {
        self.bus
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl MidiDriver for VirtualMidiDriver {
    fn input_ports(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(self.bus.ports.clone())
    }

    fn output_ports(&self) -> Result<Vec<String>, ProtocolError> {
        Ok(self.bus.ports.clone())
    }

    fn open_output(&self, port: &str) -> Result<Box<dyn MidiOutputPort>, ProtocolError> {
        let port = self.bus.lookup(port)?;
        Ok(Box::new(VirtualOutput {
            bus: Arc::clone(&self.bus),
            port,
        }))
    }

    fn open_input(
        &self,
        port: &str,
        sink: MidiSink,
    ) -> Result<Box<dyn MidiInputPort>, ProtocolError> {
        let port = self.bus.lookup(port)?;
        let id = self.bus.next_id.fetch_add(1, Ordering::Relaxed);
        self.bus
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(InputRegistration { id, port, sink });
        Ok(Box::new(VirtualInput {
            bus: Arc::clone(&self.bus),
            id,
        }))
    }
}

struct VirtualOutput {
    bus: Arc<VirtualBus>,
    port: String,
}

impl MidiOutputPort for VirtualOutput {
    fn send(&mut self, message: &[u8]) -> Result<(), ProtocolError> {
        self.bus
            .sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(SentMessage {
                port: self.port.clone(),
                bytes: message.to_vec(),
            });
        self.bus.deliver(&self.port, message);
        Ok(())
    }
}

struct VirtualInput {
    bus: Arc<VirtualBus>,
    id: u64,
}

impl VirtualInput {
    fn detach(&self) {
        self.bus
            .inputs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|input| input.id != self.id);
    }
}

impl MidiInputPort for VirtualInput {
    fn close(self: Box<Self>) {
        self.detach();
    }
}

impl Drop for VirtualInput {
    fn drop(&mut self) {
        self.detach();
    }
}
