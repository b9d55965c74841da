//! Listener modes selectable when the gateway daemon starts.

use strum::{Display, EnumString};
use thiserror::Error;

/// Protocol listeners the daemon can host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum ListenerMode {
    /// Line-oriented remote command server for the lighting console.
    #[strum(to_string = "lf", serialize = "console")]
    Console,
    /// UDP event-bus server.
    #[strum(to_string = "osc", serialize = "bus")]
    Bus,
    /// HTTP bridge mapping request paths onto protocol commands.
    #[strum(to_string = "http", serialize = "bridge")]
    Http,
    /// MIDI input receiver triggering bound operations.
    #[strum(to_string = "midi", serialize = "midi-receiver")]
    Midi,
}

/// Modes started when the configuration requests none.
pub const DEFAULT_MODES: &[ListenerMode] =
    &[ListenerMode::Console, ListenerMode::Bus, ListenerMode::Http];

/// Failure raised for an unrecognised mode token.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown listener mode '{token}'")]
pub struct ModeParseError {
    /// Offending token as supplied.
    pub token: String,
}

impl ListenerMode {
    /// Parses a requested mode set.
    ///
    /// Each entry may itself hold a comma separated list. Duplicates collapse
    /// while first-seen order is kept. Parsing stops at the first unknown
    /// token.
    ///
    /// # Errors
    ///
    /// Returns [`ModeParseError`] naming the first token that is not a mode.
    pub fn parse_set<S>(entries: &[S]) -> Result<Vec<Self>, ModeParseError>
    where
        S: AsRef<str>,
    {
        let mut modes = Vec::new();
        let tokens = entries
            .iter()
            .flat_map(|entry| entry.as_ref().split(','))
            .map(str::trim)
            .filter(|token| !token.is_empty());
        for token in tokens {
            let mode = token.parse::<Self>().map_err(|_| ModeParseError {
                token: token.to_owned(),
            })?;
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        Ok(modes)
    }

    /// Stable tag used in logs and health events.
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Self::Console => "lf",
            Self::Bus => "osc",
            Self::Http => "http",
            Self::Midi => "midi",
        }
    }
}
