//! Mock lighting console that records every command it receives.

use std::io::{BufRead, BufReader, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread;
use std::time::Duration;

const BANNER: &[u8] = b"Mock Console\r\n\r\n>";

/// A console peer answering `> <command> : Success` to each command.
pub struct ConsoleTarget {
    address: SocketAddr,
    commands: Receiver<String>,
}

impl ConsoleTarget {
    /// Binds an ephemeral loopback port and serves sessions in the background.
    #[must_use]
    pub fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock console");
        let address = listener.local_addr().expect("mock console address");
        let (sender, commands) = mpsc::channel();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { break };
                let sender = sender.clone();
                thread::spawn(move || serve(stream, &sender));
            }
        });
        Self { address, commands }
    }

    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Next command received within `timeout`.
    pub fn next_command(&self, timeout: Duration) -> Option<String> {
        match self.commands.recv_timeout(timeout) {
            Ok(command) => Some(command),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }
}

fn serve(mut stream: TcpStream, sender: &Sender<String>) {
    if stream.write_all(BANNER).is_err() {
        return;
    }
    let Ok(clone) = stream.try_clone() else { return };
    let mut reader = BufReader::new(clone);
    let mut line = String::new();
    while matches!(reader.read_line(&mut line), Ok(read) if read > 0) {
        let command = line.trim().to_owned();
        line.clear();
        let reply = format!("> {command} : Success\r\n>");
        let _ = sender.send(command);
        if stream.write_all(reply.as_bytes()).is_err() {
            return;
        }
    }
}

/// A loopback port with nothing listening on it.
#[must_use]
pub fn unreachable_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("reserve port");
    listener.local_addr().expect("reserved address").port()
}
