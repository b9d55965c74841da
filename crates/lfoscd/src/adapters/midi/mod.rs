//! MIDI adapter: timed notes on output devices and operator commands.
//!
//! Commands take the form `/midi/<device>/<key>:<velocity>:<duration>`.
//! `default` selects the driver's default output. Key and velocity are clamped
//! to `0..=127` and the duration, in milliseconds, to zero or more.

pub mod bindings;
pub mod driver;
#[cfg(feature = "hardware-midi")]
mod hardware;
mod learn;
pub mod message;
mod pool;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

pub use bindings::{BindingTable, KeyBinding};
pub use driver::{
    LOOPBACK_PORT, MidiDriver, MidiInputPort, MidiOutputPort, MidiSink, SentMessage,
    VirtualMidiDriver, find_port,
};
#[cfg(feature = "hardware-midi")]
pub use hardware::HardwareMidiDriver;
pub use message::{MidiEvent, key_name};
pub use pool::{OutputPool, OutputReceiver};

use crate::protocol::{
    CommandContext, ProtocolAdapter, ProtocolData, ProtocolError, ProtocolRegistry, RawInput,
    configure_decoded,
};

/// Tag of the MIDI protocol.
pub const MIDI_TAG: &str = "midi";

pub(crate) const MIDI_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::midi");

const DEFAULT_DEVICE: &str = "default";

/// Driver used when no other is configured.
#[cfg(feature = "hardware-midi")]
#[must_use]
pub fn default_midi_driver() -> Arc<dyn MidiDriver> {
    Arc::new(HardwareMidiDriver)
}

/// Driver used when no other is configured.
#[cfg(not(feature = "hardware-midi"))]
#[must_use]
pub fn default_midi_driver() -> Arc<dyn MidiDriver> {
    Arc::new(VirtualMidiDriver::new())
}

/// A note request: key, velocity and duration in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// Key number.
    pub key: u8,
    /// Note-on velocity.
    pub velocity: u8,
    /// Milliseconds between note-on and note-off.
    pub duration_ms: u64,
}

impl Note {
    /// Parses `<key>:<velocity>:<duration>`, clamping each part into range.
    #[must_use]
    pub fn parse(operation: &str) -> Option<Self> {
        let mut parts = operation.trim().split(':');
        let key = parts.next()?.trim().parse::<i64>().ok()?;
        let velocity = parts.next()?.trim().parse::<i64>().ok()?;
        let duration = parts.next()?.trim().parse::<i64>().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            key: clamp_data_byte(key),
            velocity: clamp_data_byte(velocity),
            duration_ms: u64::try_from(duration).unwrap_or(0),
        })
    }

    /// Time between note-on and note-off.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

fn clamp_data_byte(value: i64) -> u8 {
    u8::try_from(value.clamp(0, 127)).unwrap_or(0)
}

/// Adapter playing notes on output devices.
pub struct MidiAdapter {
    driver: Arc<dyn MidiDriver>,
    pool: OutputPool,
    bindings: PathBuf,
}

impl std::fmt::Debug for MidiAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiAdapter")
            .field("bindings", &self.bindings)
            .field("open_devices", &self.pool.open_devices())
            .finish_non_exhaustive()
    }
}

impl MidiAdapter {
    /// Builds an adapter over `driver`, learning into the table at `bindings`.
    #[must_use]
    pub fn new(driver: Arc<dyn MidiDriver>, bindings: impl Into<PathBuf>) -> Self {
        Self {
            pool: OutputPool::new(Arc::clone(&driver)),
            driver,
            bindings: bindings.into(),
        }
    }

    /// Location of the key-binding table.
    #[must_use]
    pub fn bindings_path(&self) -> &Path {
        &self.bindings
    }

    /// Output devices with an in-flight note.
    #[must_use]
    pub fn open_devices(&self) -> Vec<String> {
        self.pool.open_devices()
    }

    fn output_device(&self, requested: &str) -> Result<String, ProtocolError> {
        if requested.eq_ignore_ascii_case(DEFAULT_DEVICE) {
            self.driver.default_output()
        } else {
            Ok(requested.to_owned())
        }
    }

    fn play(&self, device: &str, note: Note) -> Result<(), ProtocolError> {
        let receiver = self.pool.acquire(device)?;
        receiver.send(&message::note_on(note.key, note.velocity))?;
        thread::sleep(note.duration());
        receiver.send(&message::note_off(note.key))
    }

    fn list(&self, context: &mut CommandContext<'_>) -> Result<i32, ProtocolError> {
        context.say("MIDI inputs:")?;
        for (index, name) in self.driver.input_ports()?.iter().enumerate() {
            context.say(&format!("  {index}: {name}"))?;
        }
        context.say("MIDI outputs:")?;
        for (index, name) in self.driver.output_ports()?.iter().enumerate() {
            context.say(&format!("  {index}: {name}"))?;
        }
        Ok(0)
    }

    fn learn(&self, args: &[String], context: &mut CommandContext<'_>) -> Result<i32, ProtocolError> {
        let Some(session) =
            learn::LearnSession::open(self.driver.as_ref(), &self.bindings, args, context)?
        else {
            return Ok(-1);
        };
        session.run(args.get(1).map(String::as_str), context)
    }
}

fn split_address(address: &str) -> Option<(&str, &str, &str)> {
    let mut parts = address.trim().strip_prefix('/')?.splitn(3, '/');
    let protocol = parts.next().filter(|part| part.eq_ignore_ascii_case(MIDI_TAG))?;
    let device = parts.next().filter(|part| !part.is_empty())?;
    let operation = parts.next().filter(|part| !part.trim().is_empty())?;
    Some((protocol, device, operation))
}

impl ProtocolAdapter for MidiAdapter {
    fn tag(&self) -> &'static str {
        MIDI_TAG
    }

    fn recognize(&self, raw: &RawInput<'_>) -> Option<ProtocolData> {
        let address = match raw {
            RawInput::Text(text) => *text,
            RawInput::Bus(message) => message.addr.as_str(),
        };
        let (protocol, device, operation) = split_address(address)?;
        Some(ProtocolData::new(protocol, device, operation, Vec::new()))
    }

    fn configure(&self, data: ProtocolData) -> ProtocolData {
        if data.is_configured() {
            return data;
        }
        let decoded = configure_decoded(data);
        let operation = decoded.operation().trim_start_matches('/').to_owned();
        let target = decoded.target().to_owned();
        let arguments = decoded.arguments().to_vec();
        decoded.into_configured(target, operation, arguments)
    }

    fn process(
        &self,
        data: &ProtocolData,
        _registry: &ProtocolRegistry,
    ) -> Result<String, ProtocolError> {
        let note = Note::parse(data.operation()).ok_or_else(|| ProtocolError::InvalidNote {
            operation: data.operation().to_owned(),
        })?;
        let device = self.output_device(data.target())?;
        debug!(
            target: MIDI_TARGET,
            device = %device,
            key = note.key,
            velocity = note.velocity,
            duration_ms = note.duration_ms,
            "playing note"
        );
        self.play(&device, note)?;
        Ok(format!(
            "note ({},{},{}) sent to device '{device}'",
            note.key,
            note.velocity,
            note.duration_ms
        ))
    }

    fn run_local_command(
        &self,
        name: &str,
        args: &[String],
        context: &mut CommandContext<'_>,
    ) -> Result<i32, ProtocolError> {
        match name.to_ascii_lowercase().as_str() {
            "list" => self.list(context),
            "learn" => self.learn(args, context),
            _ => {
                context.say(&format!("unknown midi command '{name}'"))?;
                Ok(-1)
            }
        }
    }
}
