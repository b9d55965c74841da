//! Contract shared by every protocol adapter.

use std::borrow::Cow;
use std::io::{BufRead, Write};

use percent_encoding::percent_decode_str;
use rosc::OscMessage;
use tracing::warn;

use super::{PROTOCOL_TARGET, ProtocolData, ProtocolError, ProtocolRegistry, tokenize};

/// Raw input offered to the recognisers.
#[derive(Debug, Clone, Copy)]
pub enum RawInput<'a> {
    /// A console line, URL path, or other textual command.
    Text(&'a str),
    /// A decoded bus-protocol message.
    Bus(&'a OscMessage),
}

impl RawInput<'_> {
    /// Textual form of the input, if it has one.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bus(_) => None,
        }
    }
}

impl std::fmt::Display for RawInput<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Bus(message) => write!(f, "{} {:?}", message.addr, message.args),
        }
    }
}

/// Streams and collaborators available to local administrative commands.
pub struct CommandContext<'a> {
    /// Registry used to validate or dispatch operations.
    pub registry: &'a ProtocolRegistry,
    /// Operator input.
    pub input: &'a mut dyn BufRead,
    /// Operator output.
    pub output: &'a mut dyn Write,
}

impl CommandContext<'_> {
    /// Writes one line of operator output.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Console`] when the output stream fails.
    pub fn say(&mut self, line: &str) -> Result<(), ProtocolError> {
        writeln!(self.output, "{line}").map_err(ProtocolError::console)?;
        self.output.flush().map_err(ProtocolError::console)
    }

    /// Writes `prompt` and reads one trimmed line. `None` marks end of input.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::Console`] when either stream fails.
    pub fn ask(&mut self, prompt: &str) -> Result<Option<String>, ProtocolError> {
        write!(self.output, "{prompt}").map_err(ProtocolError::console)?;
        self.output.flush().map_err(ProtocolError::console)?;
        let mut line = String::new();
        let read = self
            .input
            .read_line(&mut line)
            .map_err(ProtocolError::console)?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line.trim().to_owned()))
    }
}

/// A protocol the gateway can parse commands from and deliver commands to.
pub trait ProtocolAdapter: Send + Sync {
    /// Lower-case tag naming the protocol.
    fn tag(&self) -> &'static str;

    /// Matches `raw` against this adapter's grammar.
    ///
    /// Returns `None` when the input is not in this protocol's form. Must not
    /// have side effects.
    fn recognize(&self, raw: &RawInput<'_>) -> Option<ProtocolData>;

    /// Refines a freshly recognised command owned by this adapter.
    ///
    /// The default percent-decodes the target and the operation, then moves
    /// any arguments embedded in the operation after a space in front of the
    /// existing arguments. Already refined values are returned unchanged.
    fn configure(&self, data: ProtocolData) -> ProtocolData {
        configure_decoded(data)
    }

    /// Delivers the command and returns the protocol's textual result.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the target cannot be reached or the
    /// command cannot be delivered.
    fn process(
        &self,
        data: &ProtocolData,
        registry: &ProtocolRegistry,
    ) -> Result<String, ProtocolError>;

    /// Runs an administrative command outside the network path.
    ///
    /// Returns the process exit code. The default knows no commands.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError`] when the command fails.
    fn run_local_command(
        &self,
        name: &str,
        _args: &[String],
        _context: &mut CommandContext<'_>,
    ) -> Result<i32, ProtocolError> {
        warn!(
            target: PROTOCOL_TARGET,
            protocol = self.tag(),
            command = name,
            "command not found"
        );
        Ok(-1)
    }
}

/// Default refinement shared by the adapters.
#[must_use]
pub fn configure_decoded(data: ProtocolData) -> ProtocolData {
    if data.is_configured() {
        return data;
    }
    let target = decode(data.target()).into_owned();
    let operation = decode(data.operation()).into_owned();
    let (operation, mut arguments) = match operation.split_once(' ') {
        Some((head, inline)) => (head.to_owned(), tokenize(inline)),
        None => (operation, Vec::new()),
    };
    arguments.extend_from_slice(data.arguments());
    data.into_configured(target, operation, arguments)
}

/// Percent-decodes `raw`, keeping it unchanged when the escapes are not UTF-8.
#[must_use]
pub fn decode(raw: &str) -> Cow<'_, str> {
    percent_decode_str(raw)
        .decode_utf8()
        .unwrap_or(Cow::Borrowed(raw))
}
