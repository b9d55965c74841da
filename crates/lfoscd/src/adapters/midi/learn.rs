//! Interactive recording of key bindings.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, trace};

use super::MIDI_TARGET;
use super::bindings::{BindingTable, KeyBinding};
use super::driver::{MidiDriver, MidiSink};
use super::message::{MidiEvent, hex};
use crate::protocol::{CommandContext, ProtocolError, RawInput};

const USAGE: &str = "usage: midi.learn <device> [operation]";
const OPERATION_PROMPT: &str = "operation> ";

/// One `midi.learn` invocation.
pub(super) struct LearnSession<'a> {
    driver: &'a dyn MidiDriver,
    device: String,
    table: BindingTable,
}

impl<'a> LearnSession<'a> {
    /// Prepares a session on the input named by `args[0]`.
    ///
    /// Returns `Ok(None)` after printing usage when no device was given.
    pub(super) fn open(
        driver: &'a dyn MidiDriver,
        bindings: &std::path::Path,
        args: &[String],
        context: &mut CommandContext<'_>,
    ) -> Result<Option<Self>, ProtocolError> {
        let Some(device) = args.first() else {
            context.say(USAGE)?;
            return Ok(None);
        };
        debug!(target: MIDI_TARGET, device = %device, "starting learn session");
        Ok(Some(Self {
            driver,
            device: device.clone(),
            table: BindingTable::load(bindings)?,
        }))
    }

    /// Learns operations until the operator enters an empty one.
    ///
    /// `first` is used instead of prompting for the first operation.
    pub(super) fn run(
        mut self,
        first: Option<&str>,
        context: &mut CommandContext<'_>,
    ) -> Result<i32, ProtocolError> {
        let mut next = first.map(str::to_owned);
        loop {
            let operation = match next.take().filter(|op| !op.is_empty()) {
                Some(operation) => operation,
                None => match context.ask(OPERATION_PROMPT)? {
                    Some(operation) if !operation.is_empty() => operation,
                    _ => return Ok(0),
                },
            };
            if context.registry.resolve(&RawInput::Text(&operation)).is_none() {
                context.say(&format!("'{operation}' is not a valid operation"))?;
                continue;
            }
            self.learn(&operation, context)?;
        }
    }

    fn learn(
        &mut self,
        operation: &str,
        context: &mut CommandContext<'_>,
    ) -> Result<(), ProtocolError> {
        let recorded: Arc<Mutex<Vec<KeyBinding>>> = Arc::default();
        let sink: MidiSink = {
            let recorded = Arc::clone(&recorded);
            Arc::new(move |bytes: &[u8]| {
                let Some(event) = MidiEvent::parse(bytes) else {
                    return;
                };
                trace!(target: MIDI_TARGET, bytes = %hex(bytes), event = %event, "learned");
                if let Some(binding) = event.binding() {
                    recorded
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push(binding);
                }
            })
        };
        let input = self.driver.open_input(&self.device, sink)?;
        context.say(&format!(
            "listening on '{}' for '{operation}'; press keys, then Enter to finish",
            self.device
        ))?;
        let waited = context.ask("");
        input.close();
        waited?;

        self.table.clear(operation);
        let learned = std::mem::take(&mut *recorded.lock().unwrap_or_else(PoisonError::into_inner));
        for binding in &learned {
            self.table.add(operation, *binding);
        }
        self.table.save()?;
        context.say(&format!(
            "bound {} key event(s) to '{operation}'",
            self.table.bindings(operation).len()
        ))
    }
}
