use std::path::PathBuf;
use std::time::Duration;

use crate::logging::LogFormat;

/// Host every listener binds to by default.
pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1";

/// Console-protocol (TCP) listener port.
pub const DEFAULT_CONSOLE_PORT: u16 = 3100;

/// Bus-protocol (UDP) listener port.
pub const DEFAULT_BUS_PORT: u16 = 3200;

/// HTTP bridge port.
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Input device watched by the MIDI receiver.
pub const DEFAULT_MIDI_INPUT: &str = "loopMIDI Port";

/// File holding learnt MIDI key bindings.
pub const DEFAULT_MIDI_BINDINGS: &str = "midi-map.json";

/// Budget for one console-protocol round trip, in milliseconds.
pub const DEFAULT_CONSOLE_TIMEOUT_MS: u64 = 2000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> &'static str {
    DEFAULT_LOG_FILTER
}

/// Default logging format for the binaries.
#[must_use]
pub fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default location of the MIDI binding table.
#[must_use]
pub fn default_midi_bindings() -> PathBuf {
    PathBuf::from(DEFAULT_MIDI_BINDINGS)
}

/// Default console-protocol round-trip budget.
#[must_use]
pub fn default_console_timeout() -> Duration {
    Duration::from_millis(DEFAULT_CONSOLE_TIMEOUT_MS)
}
