//! Reference-counted MIDI output connections.
//!
//! A device is opened on first use and shared by every concurrent request
//! that targets it. Each request holds an [`OutputReceiver`]; the device is
//! closed when the last receiver is released. Sends are not serialised
//! across receivers, so overlapping notes on one device interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::MIDI_TARGET;
use super::driver::{MidiDriver, MidiOutputPort};
use crate::protocol::ProtocolError;

type SharedPort = Arc<Mutex<Box<dyn MidiOutputPort>>>;

struct OpenDevice {
    port: SharedPort,
    receivers: usize,
}

/// Pool of open output devices.
pub struct OutputPool {
    driver: Arc<dyn MidiDriver>,
    devices: Mutex<HashMap<String, OpenDevice>>,
}

impl OutputPool {
    /// Builds an empty pool over `driver`.
    #[must_use]
    pub fn new(driver: Arc<dyn MidiDriver>) -> Self {
        Self {
            driver,
            devices: Mutex::new(HashMap::new()),
        }
    }

    /// Opens `device`, or reuses its open connection.
    ///
    /// # Errors
    ///
    /// Propagates driver failures when the device has to be opened.
    pub fn acquire(&self, device: &str) -> Result<OutputReceiver<'_>, ProtocolError> {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        let port = if let Some(open) = devices.get_mut(device) {
            open.receivers += 1;
            Arc::clone(&open.port)
        } else {
            let port: SharedPort = Arc::new(Mutex::new(self.driver.open_output(device)?));
            debug!(target: MIDI_TARGET, device, "opened MIDI output");
            devices.insert(
                device.to_owned(),
                OpenDevice {
                    port: Arc::clone(&port),
                    receivers: 1,
                },
            );
            port
        };
        Ok(OutputReceiver {
            pool: self,
            device: device.to_owned(),
            port,
        })
    }

    /// Devices that currently have at least one receiver.
    #[must_use]
    pub fn open_devices(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn release(&self, device: &str) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(open) = devices.get_mut(device) else {
            return;
        };
        open.receivers = open.receivers.saturating_sub(1);
        if open.receivers == 0 {
            devices.remove(device);
            debug!(target: MIDI_TARGET, device, "closed MIDI output");
        }
    }
}

/// One request's handle on an open output device.
pub struct OutputReceiver<'a> {
    pool: &'a OutputPool,
    device: String,
    port: SharedPort,
}

impl OutputReceiver<'_> {
    /// Sends one raw message to the device.
    ///
    /// # Errors
    ///
    /// Propagates the driver's send failure.
    pub fn send(&self, message: &[u8]) -> Result<(), ProtocolError> {
        self.port
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .send(message)
    }
}

impl Drop for OutputReceiver<'_> {
    fn drop(&mut self) {
        self.pool.release(&self.device);
    }
}
