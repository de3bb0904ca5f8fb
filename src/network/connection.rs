#![cfg(unix)]
use crate::http::RequestParser;
use nix::unistd::Pid;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::os::unix::io::RawFd;
use std::time::Instant;

/// Per-event read size
pub const READ_BUF_SIZE: usize = 4096;

/// Connection state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnState {
    /// Waiting to read request bytes
    Reading,
    /// A CGI child is running; the outbound buffer stays empty until
    /// its pipe closes or the deadline fires
    AwaitingCgi,
    /// Have response bytes, waiting for write readiness
    Writing,
    /// Done, removed in the next cleanup pass
    Closing,
}

/// Active CGI sub-state for one connection
pub struct CgiState {
    pub pid: Pid,
    pub stdout_fd: RawFd,
    pub output: Vec<u8>,
    pub started_at: Instant,
}

/// Manages a single client connection
pub struct ClientConnection {
    pub stream: TcpStream,

    /// Listening port this connection arrived on; selects the
    /// virtual server
    pub port: u16,

    pub state: ConnState,
    pub parser: RequestParser,

    // Write side
    pub write_buffer: Vec<u8>,
    pub bytes_written: usize,

    pub last_activity: Instant,

    // Keep-alive
    pub keep_alive: bool,
    pub requests_handled: u32,

    pub cgi: Option<CgiState>,
}

impl ClientConnection {
    pub fn new(stream: TcpStream, port: u16) -> Self {
        Self {
            stream,
            port,
            state: ConnState::Reading,
            parser: RequestParser::new(),
            write_buffer: Vec::new(),
            bytes_written: 0,
            last_activity: Instant::now(),
            keep_alive: true,
            requests_handled: 0,
            cgi: None,
        }
    }

    /// Read once from the socket and feed the parser.
    /// Returns Ok(true) when a full request has been parsed, Err if
    /// the connection should close.
    pub fn try_read(&mut self) -> Result<bool, ConnectionError> {
        let mut temp = [0u8; READ_BUF_SIZE];

        match self.stream.read(&mut temp) {
            Ok(0) => Err(ConnectionError::Closed),
            Ok(n) => {
                self.last_activity = Instant::now();
                Ok(self.parser.parse(&temp[..n]))
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(false),
            Err(_) => Err(ConnectionError::Io),
        }
    }

    /// Write once to the socket.
    /// Returns Ok(true) when the outbound buffer has fully drained.
    pub fn try_write(&mut self) -> Result<bool, ConnectionError> {
        if self.bytes_written >= self.write_buffer.len() {
            return Ok(true);
        }

        let remaining = &self.write_buffer[self.bytes_written..];

        match self.stream.write(remaining) {
            Ok(0) => Ok(false),
            Ok(n) => {
                self.bytes_written += n;
                self.last_activity = Instant::now();
                Ok(self.bytes_written >= self.write_buffer.len())
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(false),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Ok(false),
            Err(_) => Err(ConnectionError::Io),
        }
    }

    /// Queue response bytes for writing
    pub fn queue_response(&mut self, data: Vec<u8>) {
        self.write_buffer = data;
        self.bytes_written = 0;
        self.state = ConnState::Writing;
        self.last_activity = Instant::now();
    }

    /// Reset for the next request on a keep-alive connection
    pub fn reset_for_next_request(&mut self) {
        self.parser.reset();
        self.write_buffer.clear();
        self.bytes_written = 0;
        self.state = ConnState::Reading;
        self.requests_handled += 1;
    }

    /// Check if the connection has been idle too long
    pub fn is_timed_out(&self, timeout_secs: u64) -> bool {
        self.last_activity.elapsed().as_secs() > timeout_secs
    }
}

#[derive(Debug)]
pub enum ConnectionError {
    Closed,
    Io,
}
