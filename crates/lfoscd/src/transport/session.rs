//! One console-protocol connection.

use std::io::{self, Write};
use std::net::TcpStream;
use std::time::Duration;

use tracing::{debug, trace, warn};

use super::LISTENER_TARGET;
use super::lines::{LineReader, ReadOutcome};
use crate::daemon::CancelToken;
use crate::protocol::{ProtocolError, ProtocolRegistry, RawInput};

/// Banner written when a client connects; ends with the prompt.
pub(crate) const GREETING: &str = "lfoscd remote command interface\r\n\r\n>";
/// Reply to lines no adapter recognises.
pub(crate) const INVALID_COMMAND: &str =
    "error: invalid command, expected <protocol>@<host>:<port> /<operation> [arguments]";

const EXIT_COMMAND: &str = "exit";
const CLOSING: &str = "Closing connection\r\n";
const PROMPT: &str = "\r\n>";
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Serves `stream` until the peer leaves, says `exit`, or the daemon stops.
pub(crate) fn serve(stream: TcpStream, registry: &ProtocolRegistry, cancel: &CancelToken) {
    let peer = stream
        .peer_addr()
        .map_or_else(|_| String::from("unknown"), |addr| addr.to_string());
    debug!(target: LISTENER_TARGET, peer = %peer, "console client connected");
    if let Err(error) = run(&stream, registry, cancel) {
        warn!(target: LISTENER_TARGET, peer = %peer, error = %error, "console connection error");
    }
    if let Err(error) = stream.shutdown(std::net::Shutdown::Both) {
        trace!(target: LISTENER_TARGET, peer = %peer, error = %error, "console close failed");
    }
    debug!(target: LISTENER_TARGET, peer = %peer, "console client disconnected");
}

fn run(stream: &TcpStream, registry: &ProtocolRegistry, cancel: &CancelToken) -> io::Result<()> {
    stream.set_nonblocking(false)?;
    stream.set_read_timeout(Some(POLL_INTERVAL))?;
    let mut writer = stream.try_clone()?;
    let mut reader = LineReader::new(stream.try_clone()?);
    write_reply(&mut writer, GREETING)?;
    loop {
        let line = match reader.next_line(cancel)? {
            ReadOutcome::Line(line) => line,
            ReadOutcome::End | ReadOutcome::Cancelled => return Ok(()),
        };
        trace!(target: LISTENER_TARGET, line = %line, "console >>");
        if line.eq_ignore_ascii_case(EXIT_COMMAND) {
            return write_reply(&mut writer, CLOSING);
        }
        let reply = respond(&line, registry);
        trace!(target: LISTENER_TARGET, reply = %reply, "console <<");
        write_reply(&mut writer, &reply)?;
    }
}

/// Reply for one console line, prompt included.
pub(crate) fn respond(line: &str, registry: &ProtocolRegistry) -> String {
    if line.is_empty() {
        return String::from(PROMPT);
    }
    match registry.resolve_and_dispatch(&RawInput::Text(line)) {
        Ok(result) => format!("{result}{PROMPT}"),
        Err(ProtocolError::Unrecognized { .. }) => format!("{INVALID_COMMAND}{PROMPT}"),
        Err(error) => {
            debug!(target: LISTENER_TARGET, error = %error.report(), "console command failed");
            format!("error: {}{PROMPT}", error.report())
        }
    }
}

fn write_reply(writer: &mut impl Write, reply: &str) -> io::Result<()> {
    writer.write_all(reply.as_bytes())?;
    writer.flush()
}
