//! Minimal clients for talking to running listeners.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

const CLIENT_TIMEOUT: Duration = Duration::from_secs(5);

/// A console-protocol session with the gateway.
pub struct ConsoleClient {
    stream: TcpStream,
    /// Greeting sent on connect.
    pub greeting: String,
}

impl ConsoleClient {
    /// Connects and consumes the greeting up to the first prompt.
    pub fn connect(address: SocketAddr) -> Self {
        let stream = TcpStream::connect(address).expect("connect console listener");
        stream
            .set_read_timeout(Some(Duration::from_millis(100)))
            .expect("client read timeout");
        let mut client = Self {
            stream,
            greeting: String::new(),
        };
        client.greeting = client.read_until_prompt();
        client
    }

    /// Sends `line` and returns the reply with its trailing prompt removed.
    pub fn exchange(&mut self, line: &str) -> String {
        self.stream
            .write_all(format!("{line}\r\n").as_bytes())
            .expect("send console line");
        let reply = self.read_until_prompt();
        reply.trim_end_matches('>').trim().to_owned()
    }

    fn read_until_prompt(&mut self) -> String {
        let deadline = Instant::now() + CLIENT_TIMEOUT;
        let mut received = Vec::new();
        let mut chunk = [0_u8; 512];
        while Instant::now() < deadline {
            match self.stream.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => {
                    received.extend_from_slice(&chunk[..read]);
                    if received.ends_with(b"\r\n>") {
                        break;
                    }
                }
                Err(_) => {}
            }
        }
        String::from_utf8_lossy(&received).into_owned()
    }
}

/// Response of a bridge request.
#[derive(Debug)]
pub struct HttpReply {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Issues `GET path` against the bridge over a fresh connection.
pub fn http_get(address: SocketAddr, path: &str) -> HttpReply {
    let mut stream = TcpStream::connect(address).expect("connect bridge");
    stream
        .set_read_timeout(Some(CLIENT_TIMEOUT))
        .expect("bridge read timeout");
    let request = format!("GET {path} HTTP/1.1\r\nHost: {address}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).expect("send request");
    let mut raw = String::new();
    stream.read_to_string(&mut raw).expect("read response");

    let (head, body) = raw.split_once("\r\n\r\n").expect("response head");
    let mut lines = head.lines();
    let status = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|code| code.parse().ok())
        .expect("status code");
    let content_type = lines.find_map(|line| {
        let (name, value) = line.split_once(':')?;
        name.eq_ignore_ascii_case("content-type")
            .then(|| value.trim().to_owned())
    });
    HttpReply {
        status,
        content_type,
        body: body.to_owned(),
    }
}
