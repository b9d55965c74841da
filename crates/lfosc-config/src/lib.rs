//! Shared configuration for the lfosc protocol gateway.
//!
//! Values are layered by `ortho_config`: built-in defaults, then a TOML
//! configuration file (`--config-path` or `LFOSC_CONFIG_PATH`), then
//! `LFOSC_*` environment variables, and finally command-line flags. Every
//! field is optional at load time; accessors apply the defaults from
//! [`defaults`].

mod defaults;
mod logging;
mod modes;

use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_BIND_ADDRESS, DEFAULT_BUS_PORT, DEFAULT_CONSOLE_PORT, DEFAULT_CONSOLE_TIMEOUT_MS,
    DEFAULT_HTTP_PORT, DEFAULT_LOG_FILTER, DEFAULT_MIDI_BINDINGS, DEFAULT_MIDI_INPUT,
    default_console_timeout, default_log_filter, default_log_format, default_midi_bindings,
};
pub use logging::{LogFormat, LogFormatParseError};
pub use modes::{DEFAULT_MODES, ListenerMode, ModeParseError};

/// Gateway configuration shared by the daemon and the one-shot command mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "LFOSC")]
pub struct Config {
    /// Host the listeners bind to.
    pub bind_address: Option<String>,
    /// Console-protocol listener port.
    pub console_port: Option<u16>,
    /// Bus-protocol listener port.
    pub bus_port: Option<u16>,
    /// HTTP bridge port.
    pub http_port: Option<u16>,
    /// Requested listener modes; entries may hold comma separated lists.
    #[serde(default)]
    pub modes: Vec<String>,
    /// MIDI input device watched by the receiver listener.
    pub midi_input: Option<String>,
    /// Path of the learnt MIDI binding table.
    pub midi_bindings: Option<PathBuf>,
    /// Console-protocol round-trip budget in milliseconds.
    pub console_timeout_ms: Option<u64>,
    /// `tracing` filter expression.
    pub log_filter: Option<String>,
    /// Log output format.
    pub log_format: Option<LogFormat>,
}

impl Config {
    /// Host the listeners bind to.
    #[must_use]
    pub fn bind_address(&self) -> &str {
        self.bind_address.as_deref().unwrap_or(DEFAULT_BIND_ADDRESS)
    }

    /// Console-protocol listener port.
    #[must_use]
    pub fn console_port(&self) -> u16 {
        self.console_port.unwrap_or(DEFAULT_CONSOLE_PORT)
    }

    /// Bus-protocol listener port.
    #[must_use]
    pub fn bus_port(&self) -> u16 {
        self.bus_port.unwrap_or(DEFAULT_BUS_PORT)
    }

    /// HTTP bridge port.
    #[must_use]
    pub fn http_port(&self) -> u16 {
        self.http_port.unwrap_or(DEFAULT_HTTP_PORT)
    }

    /// Mode entries to serve, before validation. Falls back to the tags of
    /// [`DEFAULT_MODES`] when nothing was requested.
    #[must_use]
    pub fn requested_modes(&self) -> Vec<String> {
        if self.modes.iter().all(|entry| entry.trim().is_empty()) {
            return DEFAULT_MODES.iter().map(ToString::to_string).collect();
        }
        self.modes.clone()
    }

    /// MIDI input device watched by the receiver listener.
    #[must_use]
    pub fn midi_input(&self) -> &str {
        self.midi_input.as_deref().unwrap_or(DEFAULT_MIDI_INPUT)
    }

    /// Path of the learnt MIDI binding table.
    #[must_use]
    pub fn midi_bindings(&self) -> &Path {
        self.midi_bindings
            .as_deref()
            .unwrap_or_else(|| Path::new(DEFAULT_MIDI_BINDINGS))
    }

    /// Console-protocol round-trip budget.
    #[must_use]
    pub fn console_timeout(&self) -> Duration {
        self.console_timeout_ms
            .map_or_else(default_console_timeout, Duration::from_millis)
    }

    /// `tracing` filter expression.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }

    /// Log output format.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format.unwrap_or_else(default_log_format)
    }
}
