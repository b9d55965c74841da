//! MIDI receiver triggering operations bound to keys.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use lfosc_config::ListenerMode;
use tracing::{debug, info, trace, warn};

use super::{
    LISTENER_TARGET, ListenerContext, ListenerEndpoint, ListenerError, ListenerHandle,
    ListenerSettings, spawn_worker,
};
use crate::adapters::midi::message::hex;
use crate::adapters::midi::{BindingTable, MidiEvent, MidiSink};
use crate::protocol::{ProtocolRegistry, RawInput};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub(super) fn launch(
    settings: &ListenerSettings,
    context: ListenerContext,
) -> Result<ListenerHandle, ListenerError> {
    let table = BindingTable::load(&settings.midi_bindings)
        .map_err(|source| ListenerError::Bindings { source })?;
    if table.is_empty() {
        warn!(
            target: LISTENER_TARGET,
            path = %settings.midi_bindings.display(),
            "no MIDI key bindings; received notes will be ignored"
        );
    }
    let sink = binding_sink(Arc::new(table), Arc::clone(&context.registry));
    let device = settings.midi_input.clone();
    let input = settings
        .midi_driver
        .open_input(&device, sink)
        .map_err(|source| ListenerError::MidiInput {
            device: device.clone(),
            source,
        })?;
    info!(target: LISTENER_TARGET, device = %device, "midi receiver active");
    let cancel = context.cancel.clone();
    let worker = spawn_worker(ListenerMode::Midi, move || {
        while !cancel.is_cancelled() {
            thread::sleep(POLL_INTERVAL);
        }
        input.close();
        info!(target: LISTENER_TARGET, "midi receiver stopped");
    })?;
    Ok(ListenerHandle::new(
        ListenerMode::Midi,
        ListenerEndpoint::Device(device),
        worker,
    ))
}

/// Sink dispatching the operations bound to each key press.
fn binding_sink(table: Arc<BindingTable>, registry: Arc<ProtocolRegistry>) -> MidiSink {
    Arc::new(move |bytes: &[u8]| {
        let Some(event) = MidiEvent::parse(bytes) else {
            trace!(target: LISTENER_TARGET, bytes = %hex(bytes), "unparsed midi message");
            return;
        };
        trace!(target: LISTENER_TARGET, bytes = %hex(bytes), event = %event, "midi message");
        if !event.is_key_press() {
            return;
        }
        let Some(binding) = event.binding() else {
            return;
        };
        for operation in table.operations_for(binding) {
            let registry = Arc::clone(&registry);
            let operation = operation.to_owned();
            thread::spawn(move || trigger(&registry, &operation));
        }
    })
}

fn trigger(registry: &ProtocolRegistry, operation: &str) {
    match registry.resolve_and_dispatch(&RawInput::Text(operation)) {
        Ok(result) => {
            debug!(target: LISTENER_TARGET, operation, result = %result, "bound operation ran");
        }
        Err(error) => {
            warn!(
                target: LISTENER_TARGET,
                operation,
                error = %error.report(),
                "bound operation failed"
            );
        }
    }
}
