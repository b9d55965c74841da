//! Decoding and description of raw MIDI messages.

use std::fmt;

use super::bindings::KeyBinding;

const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Status nibble of a note-off message.
pub const NOTE_OFF: u8 = 0x80;
/// Status nibble of a note-on message.
pub const NOTE_ON: u8 = 0x90;

/// Channel voice and system messages the gateway understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// Key released.
    NoteOff { channel: u8, key: u8, velocity: u8 },
    /// Key pressed; velocity 0 is a release by convention.
    NoteOn { channel: u8, key: u8, velocity: u8 },
    /// Polyphonic aftertouch.
    KeyPressure { channel: u8, key: u8, pressure: u8 },
    /// Controller change.
    ControlChange { channel: u8, controller: u8, value: u8 },
    /// Program change.
    ProgramChange { channel: u8, program: u8 },
    /// Channel aftertouch.
    ChannelPressure { channel: u8, pressure: u8 },
    /// Pitch wheel, 14-bit, centred on 8192.
    PitchBend { channel: u8, value: u16 },
    /// System common or real-time message.
    System { status: u8 },
}

impl MidiEvent {
    /// Decodes one short message. Returns `None` for running status,
    /// truncated messages and SysEx payloads.
    #[must_use]
    pub fn parse(bytes: &[u8]) -> Option<Self> {
        let (&status, data) = bytes.split_first()?;
        if status < 0x80 {
            return None;
        }
        let channel = status & 0x0F;
        let first = data.first().copied();
        let second = data.get(1).copied();
        let event = match status & 0xF0 {
            NOTE_OFF => Self::NoteOff {
                channel,
                key: first?,
                velocity: second?,
            },
            NOTE_ON => Self::NoteOn {
                channel,
                key: first?,
                velocity: second?,
            },
            0xA0 => Self::KeyPressure {
                channel,
                key: first?,
                pressure: second?,
            },
            0xB0 => Self::ControlChange {
                channel,
                controller: first?,
                value: second?,
            },
            0xC0 => Self::ProgramChange {
                channel,
                program: first?,
            },
            0xD0 => Self::ChannelPressure {
                channel,
                pressure: first?,
            },
            0xE0 => Self::PitchBend {
                channel,
                value: u16::from(first?) | (u16::from(second?) << 7),
            },
            _ if status == 0xF0 => return None,
            _ => Self::System { status },
        };
        Some(event)
    }

    /// Key binding recorded for note messages.
    #[must_use]
    pub fn binding(&self) -> Option<KeyBinding> {
        match *self {
            Self::NoteOn { key, .. } => Some(KeyBinding {
                key,
                status: NOTE_ON,
            }),
            Self::NoteOff { key, .. } => Some(KeyBinding {
                key,
                status: NOTE_OFF,
            }),
            _ => None,
        }
    }

    /// Whether this is a key press that should trigger bound operations.
    #[must_use]
    pub fn is_key_press(&self) -> bool {
        matches!(self, Self::NoteOn { velocity, .. } if *velocity > 0)
    }
}

impl fmt::Display for MidiEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::NoteOff {
                channel,
                key,
                velocity,
            } => write!(
                f,
                "note off {} velocity {velocity}, channel {}",
                key_name(key),
                channel + 1
            ),
            Self::NoteOn {
                channel,
                key,
                velocity,
            } => write!(
                f,
                "note on {} velocity {velocity}, channel {}",
                key_name(key),
                channel + 1
            ),
            Self::KeyPressure {
                channel,
                key,
                pressure,
            } => write!(
                f,
                "key pressure {} pressure {pressure}, channel {}",
                key_name(key),
                channel + 1
            ),
            Self::ControlChange {
                channel,
                controller,
                value,
            } => write!(
                f,
                "control change {controller} value {value}, channel {}",
                channel + 1
            ),
            Self::ProgramChange { channel, program } => {
                write!(f, "program change {program}, channel {}", channel + 1)
            }
            Self::ChannelPressure { channel, pressure } => {
                write!(f, "channel pressure {pressure}, channel {}", channel + 1)
            }
            Self::PitchBend { channel, value } => {
                write!(f, "pitch bend {value}, channel {}", channel + 1)
            }
            Self::System { status } => write!(f, "system message {status:#04X}"),
        }
    }
}

/// Scientific pitch name of a key, with middle C (60) as `C4`.
#[must_use]
pub fn key_name(key: u8) -> String {
    let name = NOTE_NAMES
        .get(usize::from(key.rem_euclid(12)))
        .copied()
        .unwrap_or("?");
    let octave = i16::from(key.div_euclid(12)) - 1;
    format!("{name}{octave}")
}

/// Upper-case hex dump of a raw message.
#[must_use]
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|byte| format!("{byte:02X}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Note-on message on channel 1.
#[must_use]
pub fn note_on(key: u8, velocity: u8) -> [u8; 3] {
    [NOTE_ON, key, velocity]
}

/// Note-off message on channel 1.
#[must_use]
pub fn note_off(key: u8) -> [u8; 3] {
    [NOTE_OFF, key, 0]
}
