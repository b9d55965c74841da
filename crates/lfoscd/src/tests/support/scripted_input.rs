//! Operator input that runs an action before each line is handed out.

use std::collections::VecDeque;
use std::io::{self, BufRead, Read};

type Action = Box<dyn FnMut() + Send>;

struct Step {
    before: Option<Action>,
    line: String,
}

/// Line-at-a-time input for interactive commands.
///
/// Actions run lazily, when the command asks for the line they precede, so a
/// test can inject device events while a command is waiting for Enter.
#[derive(Default)]
pub struct ScriptedInput {
    steps: VecDeque<Step>,
    buffer: Vec<u8>,
    position: usize,
}

impl ScriptedInput {
    /// Queues `line`.
    #[must_use]
    pub fn line(mut self, line: &str) -> Self {
        self.steps.push_back(Step {
            before: None,
            line: line.to_owned(),
        });
        self
    }

    /// Queues `line`, running `action` just before it is read.
    #[must_use]
    pub fn line_after(mut self, action: impl FnMut() + Send + 'static, line: &str) -> Self {
        self.steps.push_back(Step {
            before: Some(Box::new(action)),
            line: line.to_owned(),
        });
        self
    }
}

impl Read for ScriptedInput {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let available = self.fill_buf()?;
        let count = available.len().min(out.len());
        out[..count].copy_from_slice(&available[..count]);
        self.consume(count);
        Ok(count)
    }
}

impl BufRead for ScriptedInput {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.position >= self.buffer.len() {
            self.buffer.clear();
            self.position = 0;
            if let Some(mut step) = self.steps.pop_front() {
                if let Some(action) = step.before.as_mut() {
                    action();
                }
                self.buffer.extend_from_slice(step.line.as_bytes());
                self.buffer.push(b'\n');
            }
        }
        Ok(&self.buffer[self.position..])
    }

    fn consume(&mut self, amount: usize) {
        self.position = (self.position + amount).min(self.buffer.len());
    }
}
