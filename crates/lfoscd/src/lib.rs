//! Protocol gateway daemon.
//!
//! `lfoscd` translates commands between four control protocols: an OSC event
//! bus, a lighting console's line-oriented remote command interface, an HTTP
//! bridge and MIDI. Each protocol is a [`ProtocolAdapter`] held by a
//! [`ProtocolRegistry`]; the [`Daemon`] hosts one listener per enabled
//! protocol and tears them down together.
//!
//! Raw input is resolved by asking each adapter, in registration order,
//! whether it recognises the input. The first match is refined into a
//! [`ProtocolData`] and delivered by the adapter owning its protocol tag, so a
//! line arriving on the console listener can end up as an OSC packet, a MIDI
//! note or another console session.
//!
//! The binary also offers one-shot administrative commands such as
//! `midi.list` and `midi.learn`, which bypass the daemon entirely.

pub mod adapters;
mod cli;
pub mod daemon;
mod health;
mod process;
pub mod protocol;
mod telemetry;
pub mod transport;

use std::ffi::OsString;
use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use lfosc_config::Config;
use ortho_config::OrthoConfig;
use tracing::warn;

pub use adapters::{AdapterSettings, MidiDriver, builtin_registry, default_midi_driver};
pub use cli::CliError;
pub use daemon::{Daemon, DaemonPhase};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use process::{ShutdownError, ShutdownSignal, ShutdownWatcher, SystemShutdownSignal};
pub use protocol::{
    Argument, ProtocolAdapter, ProtocolData, ProtocolError, ProtocolRegistry, RawInput,
    RegistryError,
};
pub use telemetry::{TelemetryError, TelemetryHandle};
pub use transport::{ListenerEndpoint, ListenerError, ListenerSettings};

const STARTUP_FAILURE: u8 = 2;

/// Runs the gateway with the system MIDI driver and signal handlers.
pub fn run<I>(
    args: I,
    stdin: &mut dyn BufRead,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
{
    run_with(args, default_midi_driver(), stdin, stdout, stderr)
}

/// Runs the gateway using `midi_driver` for MIDI devices.
///
/// With a `<protocol>.<command>` argument the command runs once and its code
/// becomes the exit status; otherwise the daemon serves until shutdown.
/// Negative codes map to 255.
pub fn run_with<I>(
    args: I,
    midi_driver: Arc<dyn MidiDriver>,
    stdin: &mut dyn BufRead,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> ExitCode
where
    I: IntoIterator<Item = OsString>,
{
    let args: Vec<OsString> = args.into_iter().collect();
    let split = cli::split_config_arguments(&args);
    let command = match cli::parse_local_command(args.get(split.command_start..).unwrap_or_default())
    {
        Ok(command) => command,
        Err(error) => return startup_failure(stderr, &error),
    };
    let config = match Config::load_from_iter(split.config_arguments) {
        Ok(config) => config,
        Err(error) => return startup_failure(stderr, &CliError::LoadConfiguration(error)),
    };
    if let Err(error) = telemetry::initialise(&config) {
        return startup_failure(stderr, &error);
    }
    let registry = match builtin_registry(&AdapterSettings::from_config(
        &config,
        Arc::clone(&midi_driver),
    )) {
        Ok(registry) => Arc::new(registry),
        Err(error) => return startup_failure(stderr, &error),
    };

    let code = match command {
        Some(command) => {
            registry.run_command(&command.protocol, &command.name, &command.args, stdin, stdout)
        }
        None => serve(&config, registry, midi_driver),
    };
    exit_status(code)
}

fn serve(config: &Config, registry: Arc<ProtocolRegistry>, midi_driver: Arc<dyn MidiDriver>) -> i32 {
    let daemon = Daemon::from_config(
        config,
        registry,
        midi_driver,
        Arc::new(StructuredHealthReporter::new()),
    );
    let watcher = SystemShutdownSignal::install().and_then(|signal| {
        ShutdownWatcher::spawn(Arc::new(signal), daemon.clone())
    });
    let watcher = match watcher {
        Ok(watcher) => Some(watcher),
        Err(error) => {
            warn!(target: env!("CARGO_PKG_NAME"), error = %error, "running without signal handling");
            None
        }
    };
    let code = daemon.run();
    if let Some(watcher) = watcher {
        watcher.stop();
    }
    code
}

fn startup_failure(stderr: &mut dyn Write, error: &dyn std::error::Error) -> ExitCode {
    let _ = writeln!(stderr, "lfoscd: {error}");
    let _ = writeln!(stderr, "{}", cli::USAGE);
    ExitCode::from(STARTUP_FAILURE)
}

fn exit_status(code: i32) -> ExitCode {
    ExitCode::from(u8::try_from(code).unwrap_or(u8::MAX))
}

#[cfg(test)]
mod tests;
