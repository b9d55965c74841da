//! `midir`-backed access to real MIDI devices.

use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};

use super::driver::{MidiDriver, MidiInputPort, MidiOutputPort, MidiSink, find_port};
use crate::protocol::ProtocolError;

const CLIENT_NAME: &str = "lfoscd";

/// Driver using the platform MIDI services.
#[derive(Debug, Default, Clone, Copy)]
pub struct HardwareMidiDriver;

fn unavailable(device: &str, error: impl std::fmt::Display) -> ProtocolError {
    ProtocolError::DeviceUnavailable {
        device: device.to_owned(),
        message: error.to_string(),
    }
}

fn not_found(device: &str) -> ProtocolError {
    ProtocolError::DeviceNotFound {
        device: device.to_owned(),
    }
}

impl MidiDriver for HardwareMidiDriver {
    fn input_ports(&self) -> Result<Vec<String>, ProtocolError> {
        let input = MidiInput::new(CLIENT_NAME).map_err(|error| unavailable("inputs", error))?;
        Ok(input
            .ports()
            .iter()
            .filter_map(|port| input.port_name(port).ok())
            .collect())
    }

    fn output_ports(&self) -> Result<Vec<String>, ProtocolError> {
        let output = MidiOutput::new(CLIENT_NAME).map_err(|error| unavailable("outputs", error))?;
        Ok(output
            .ports()
            .iter()
            .filter_map(|port| output.port_name(port).ok())
            .collect())
    }

    fn open_output(&self, port: &str) -> Result<Box<dyn MidiOutputPort>, ProtocolError> {
        let output = MidiOutput::new(CLIENT_NAME).map_err(|error| unavailable(port, error))?;
        let ports = output.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|candidate| output.port_name(candidate).unwrap_or_default())
            .collect();
        let wanted = find_port(&names, port).ok_or_else(|| not_found(port))?;
        let found = ports
            .iter()
            .zip(&names)
            .find_map(|(candidate, name)| (*name == wanted).then_some(candidate))
            .ok_or_else(|| not_found(port))?;
        let connection = output
            .connect(found, "lfoscd-out")
            .map_err(|error| unavailable(port, error))?;
        Ok(Box::new(HardwareOutput {
            device: wanted,
            connection,
        }))
    }

    fn open_input(
        &self,
        port: &str,
        sink: MidiSink,
    ) -> Result<Box<dyn MidiInputPort>, ProtocolError> {
        let mut input = MidiInput::new(CLIENT_NAME).map_err(|error| unavailable(port, error))?;
        input.ignore(Ignore::None);
        let ports = input.ports();
        let names: Vec<String> = ports
            .iter()
            .map(|candidate| input.port_name(candidate).unwrap_or_default())
            .collect();
        let wanted = find_port(&names, port).ok_or_else(|| not_found(port))?;
        let found = ports
            .iter()
            .zip(&names)
            .find_map(|(candidate, name)| (*name == wanted).then_some(candidate))
            .ok_or_else(|| not_found(port))?
            .clone();
        let connection = input
            .connect(
                &found,
                "lfoscd-in",
                move |_stamp, message, _state| sink(message),
                (),
            )
            .map_err(|error| unavailable(port, error))?;
        Ok(Box::new(HardwareInput { connection }))
    }
}

struct HardwareOutput {
    device: String,
    connection: MidiOutputConnection,
}

impl MidiOutputPort for HardwareOutput {
    fn send(&mut self, message: &[u8]) -> Result<(), ProtocolError> {
        self.connection
            .send(message)
            .map_err(|error| unavailable(&self.device, error))
    }
}

struct HardwareInput {
    connection: MidiInputConnection<()>,
}

impl MidiInputPort for HardwareInput {
    fn close(self: Box<Self>) {
        drop(self.connection.close());
    }
}
