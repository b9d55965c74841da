//! Test harness utilities shared by the gateway suites.

mod clients;
mod console_target;
mod reporter;
mod scripted_input;
mod world;

pub use clients::{ConsoleClient, HttpReply, http_get};
pub use console_target::{ConsoleTarget, unreachable_port};
pub use reporter::{HealthEvent, RecordingHealthReporter};
pub use scripted_input::ScriptedInput;
pub use world::{GatewayWorld, WAIT_TIMEOUT, world};
