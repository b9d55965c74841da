//! Built-in protocol adapters and the registry they populate.
//!
//! Adapters are registered in a fixed order: bus, console, HTTP bridge, MIDI.
//! Recognition tries them in that order and the first match wins.

pub mod bridge;
pub mod bus;
pub mod console;
pub mod midi;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use lfosc_config::Config;

pub use bridge::{BRIDGE_TAG, BridgeAdapter};
pub use bus::{BUS_TAG, BusAdapter};
pub use console::{CONSOLE_TAG, ConsoleAdapter, NO_RESPONSE};
pub use midi::{MIDI_TAG, MidiAdapter, MidiDriver, default_midi_driver};

use crate::protocol::{ProtocolAdapter, ProtocolRegistry, RegistryError};

pub(crate) const ADAPTER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::adapters");

/// Collaborators and tuning shared by the built-in adapters.
#[derive(Clone)]
pub struct AdapterSettings {
    /// Budget for one console-protocol round trip.
    pub console_timeout: Duration,
    /// MIDI device access.
    pub midi_driver: Arc<dyn MidiDriver>,
    /// Key-binding table used by the MIDI learn command and receiver.
    pub midi_bindings: PathBuf,
}

impl fmt::Debug for AdapterSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterSettings")
            .field("console_timeout", &self.console_timeout)
            .field("midi_bindings", &self.midi_bindings)
            .finish_non_exhaustive()
    }
}

impl AdapterSettings {
    /// Settings taken from `config`, using `midi_driver` for MIDI devices.
    #[must_use]
    pub fn from_config(config: &Config, midi_driver: Arc<dyn MidiDriver>) -> Self {
        Self {
            console_timeout: config.console_timeout(),
            midi_driver,
            midi_bindings: config.midi_bindings().to_path_buf(),
        }
    }
}

type AdapterFactory = fn(&AdapterSettings) -> Result<Arc<dyn ProtocolAdapter>, RegistryError>;

const BUILTIN_ADAPTERS: [(&str, AdapterFactory); 4] = [
    (BUS_TAG, bus_adapter),
    (CONSOLE_TAG, console_adapter),
    (BRIDGE_TAG, bridge_adapter),
    (MIDI_TAG, midi_adapter),
];

fn bus_adapter(_: &AdapterSettings) -> Result<Arc<dyn ProtocolAdapter>, RegistryError> {
    Ok(Arc::new(BusAdapter))
}

fn console_adapter(settings: &AdapterSettings) -> Result<Arc<dyn ProtocolAdapter>, RegistryError> {
    Ok(Arc::new(ConsoleAdapter::new(settings.console_timeout)))
}

fn bridge_adapter(_: &AdapterSettings) -> Result<Arc<dyn ProtocolAdapter>, RegistryError> {
    Ok(Arc::new(BridgeAdapter))
}

fn midi_adapter(settings: &AdapterSettings) -> Result<Arc<dyn ProtocolAdapter>, RegistryError> {
    Ok(Arc::new(MidiAdapter::new(
        Arc::clone(&settings.midi_driver),
        settings.midi_bindings.clone(),
    )))
}

/// Builds a registry holding every built-in adapter.
///
/// # Errors
///
/// Returns [`RegistryError`] when an adapter cannot be built or two adapters
/// claim the same tag.
pub fn builtin_registry(settings: &AdapterSettings) -> Result<ProtocolRegistry, RegistryError> {
    let registry = ProtocolRegistry::new();
    for (tag, factory) in BUILTIN_ADAPTERS {
        let adapter = factory(settings)?;
        if adapter.tag() != tag {
            return Err(RegistryError::Factory {
                protocol: tag.to_owned(),
                message: format!("factory built adapter '{}'", adapter.tag()),
            });
        }
        registry.register(adapter)?;
    }
    tracing::debug!(target: ADAPTER_TARGET, protocols = ?registry.tags(), "registered adapters");
    Ok(registry)
}
