//! Lighting-console remote command adapter.
//!
//! Commands are written `<protocol>@<target> /<operation> <arguments>`. The
//! protocol tag is matched case-insensitively. Delivery opens a TCP session
//! with the console, writes the operation and its rendered arguments as one
//! line, and returns the first response line. Greeting banners and bare
//! prompts are skipped.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::ADAPTER_TARGET;
use super::bus::resolve_target;
use crate::protocol::{
    ProtocolAdapter, ProtocolData, ProtocolError, ProtocolRegistry, RawInput, tokenize,
};

/// Tag of the console protocol.
pub const CONSOLE_TAG: &str = "lf";

/// Result returned when the console stays silent for the whole budget.
pub const NO_RESPONSE: &str = "no response";

const PROMPT: char = '>';
const LINE_END: &str = "\r\n";
const READ_SLICE: Duration = Duration::from_millis(50);

/// Adapter for the console protocol.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleAdapter {
    timeout: Duration,
}

impl ConsoleAdapter {
    /// Builds an adapter bounding each round trip by `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ProtocolAdapter for ConsoleAdapter {
    fn tag(&self) -> &'static str {
        CONSOLE_TAG
    }

    fn recognize(&self, raw: &RawInput<'_>) -> Option<ProtocolData> {
        let (protocol, target, operation, rest) = split_command(raw.as_text()?)?;
        Some(ProtocolData::new(protocol, target, operation, tokenize(rest)))
    }

    fn process(
        &self,
        data: &ProtocolData,
        _registry: &ProtocolRegistry,
    ) -> Result<String, ProtocolError> {
        let destination = resolve_target(data.target())?;
        let transport = |source| ProtocolError::Transport {
            target: data.target().to_owned(),
            source,
        };
        let deadline = Instant::now() + self.timeout;
        let mut stream = TcpStream::connect_timeout(&destination, self.timeout).map_err(transport)?;
        let mut session = ConsoleSession::new(&mut stream, deadline);

        let command = data.command_line();
        trace!(target: ADAPTER_TARGET, console = %destination, command = %command, "console >>");
        session.send(&command).map_err(transport)?;
        let response = session.read_response().map_err(transport)?;
        trace!(target: ADAPTER_TARGET, console = %destination, response = ?response, "console <<");

        if let Err(error) = stream.shutdown(Shutdown::Both) {
            trace!(target: ADAPTER_TARGET, error = %error, "console close failed");
        }
        Ok(response.unwrap_or_else(|| {
            debug!(target: ADAPTER_TARGET, console = %destination, "console did not answer");
            NO_RESPONSE.to_owned()
        }))
    }
}

/// Splits `<protocol>@<target> /<operation> <rest>`.
fn split_command(line: &str) -> Option<(&str, &str, &str, &str)> {
    let line = line.trim();
    let (address, remainder) = line.split_once(char::is_whitespace)?;
    let (protocol, target) = address.split_once('@')?;
    if protocol.is_empty() || target.is_empty() {
        return None;
    }
    let remainder = remainder.trim_start();
    let (operation, rest) = remainder
        .split_once(char::is_whitespace)
        .unwrap_or((remainder, ""));
    if !operation.starts_with('/') || operation.len() < 2 {
        return None;
    }
    Some((protocol, target, operation, rest))
}

/// Line exchange with a console peer under one deadline.
struct ConsoleSession<'a> {
    stream: &'a mut TcpStream,
    deadline: Instant,
    pending: String,
}

impl<'a> ConsoleSession<'a> {
    fn new(stream: &'a mut TcpStream, deadline: Instant) -> Self {
        Self {
            stream,
            deadline,
            pending: String::new(),
        }
    }

    fn send(&mut self, command: &str) -> io::Result<()> {
        self.stream.write_all(command.as_bytes())?;
        self.stream.write_all(LINE_END.as_bytes())?;
        self.stream.flush()
    }

    /// Returns the first response line with any echoed prompt removed.
    ///
    /// Lines led by a prompt, or arriving after a bare prompt, are answers.
    /// Unprompted lines before that are banner text; the first of them is
    /// kept only as a fallback for peers that close or stall without ever
    /// prompting.
    fn read_response(&mut self) -> io::Result<Option<String>> {
        let mut prompted = false;
        let mut fallback: Option<String> = None;
        loop {
            while let Some(position) = self.pending.find('\n') {
                let line: String = self.pending.drain(..=position).collect();
                let trimmed = line.trim();
                let text = strip_prompt(trimmed);
                if trimmed.starts_with(PROMPT) || prompted {
                    if !text.is_empty() {
                        return Ok(Some(text.to_owned()));
                    }
                    prompted = true;
                } else if !text.is_empty() {
                    fallback.get_or_insert_with(|| text.to_owned());
                }
            }
            if self.prompt_pending() {
                self.pending.clear();
                prompted = true;
                fallback = None;
            }
            if !self.fill()? {
                return Ok(fallback);
            }
        }
    }

    fn prompt_pending(&self) -> bool {
        self.pending.trim_end().ends_with(PROMPT)
    }

    /// Reads more bytes, returning `false` once the peer closed or the
    /// deadline passed.
    fn fill(&mut self) -> io::Result<bool> {
        let mut chunk = [0_u8; 1024];
        loop {
            let now = Instant::now();
            if now >= self.deadline {
                return Ok(false);
            }
            let slice = (self.deadline - now).min(READ_SLICE);
            self.stream.set_read_timeout(Some(slice))?;
            match self.stream.read(&mut chunk) {
                Ok(0) => return Ok(false),
                Ok(read) => {
                    let bytes = chunk.get(..read).unwrap_or_default();
                    self.pending.push_str(&String::from_utf8_lossy(bytes));
                    return Ok(true);
                }
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock
                            | io::ErrorKind::TimedOut
                            | io::ErrorKind::Interrupted
                    ) => {}
                Err(error) => return Err(error),
            }
        }
    }
}

fn strip_prompt(line: &str) -> &str {
    line.trim().trim_start_matches(PROMPT).trim()
}
