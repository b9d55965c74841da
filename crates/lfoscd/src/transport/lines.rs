//! Bounded line reading for console-protocol connections.

use std::io::{self, Read};

use crate::daemon::CancelToken;

const MAX_LINE_BYTES: usize = 64 * 1024;

/// Result of waiting for the next line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum ReadOutcome {
    /// A complete line, or the unterminated tail of the stream, trimmed.
    Line(String),
    /// The peer closed the stream.
    End,
    /// The daemon is shutting down.
    Cancelled,
}

/// Splits a byte stream into lines, keeping bytes read past a line break.
///
/// Read timeouts on the underlying stream are treated as idle ticks so the
/// reader can observe cancellation between reads.
pub(crate) struct LineReader<R> {
    inner: R,
    pending: Vec<u8>,
}

impl<R: Read> LineReader<R> {
    pub(crate) fn new(inner: R) -> Self {
        Self {
            inner,
            pending: Vec::new(),
        }
    }

    pub(crate) fn next_line(&mut self, cancel: &CancelToken) -> io::Result<ReadOutcome> {
        let mut chunk = [0_u8; 1024];
        loop {
            if let Some(line) = self.take_line()? {
                return Ok(ReadOutcome::Line(line));
            }
            if cancel.is_cancelled() {
                return Ok(ReadOutcome::Cancelled);
            }
            match read_chunk_with_retry(&mut self.inner, &mut chunk) {
                Ok(0) => return Ok(self.handle_end_of_stream()),
                Ok(read) => {
                    self.pending.extend_from_slice(&chunk[..read]);
                }
                Err(error)
                    if matches!(
                        error.kind(),
                        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                    ) => {}
                Err(error) => return Err(error),
            }
        }
    }

    fn take_line(&mut self) -> io::Result<Option<String>> {
        let Some(pos) = self.pending.iter().position(|byte| *byte == b'\n') else {
            enforce_line_limit(self.pending.len())?;
            return Ok(None);
        };
        enforce_line_limit(pos)?;
        let line: Vec<u8> = self.pending.drain(..=pos).collect();
        Ok(Some(decode_line(&line)))
    }

    fn handle_end_of_stream(&mut self) -> ReadOutcome {
        if self.pending.is_empty() {
            return ReadOutcome::End;
        }
        let tail = std::mem::take(&mut self.pending);
        ReadOutcome::Line(decode_line(&tail))
    }
}

fn read_chunk_with_retry(stream: &mut impl Read, chunk: &mut [u8]) -> io::Result<usize> {
    loop {
        match stream.read(chunk) {
            Ok(read) => return Ok(read),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
            Err(error) => return Err(error),
        }
    }
}

fn enforce_line_limit(size: usize) -> io::Result<()> {
    if size > MAX_LINE_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "line exceeds maximum size",
        ));
    }
    Ok(())
}

fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_owned()
}
