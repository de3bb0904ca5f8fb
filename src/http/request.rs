use std::collections::HashMap;

/// Completed HTTP request handed to the router
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub version: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Set when the request line could not be parsed
    pub malformed: bool,
}

impl HttpRequest {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ParseState {
    RequestLine,
    Headers,
    Body,
    Chunked,
    Complete,
}

/// Incremental request parser
///
/// Accumulates bytes from a connection and walks
/// REQUEST_LINE -> HEADERS -> (BODY | CHUNKED | COMPLETE).
/// `parse` may be called with arbitrarily small slices; no byte is
/// examined twice. COMPLETE is terminal until `reset`.
pub struct RequestParser {
    state: ParseState,
    buffer: Vec<u8>,
    method: String,
    path: String,
    query: String,
    version: String,
    headers: HashMap<String, String>,
    body: Vec<u8>,
    content_length: usize,
    chunk_length: usize,
    reading_chunk_size: bool,
    malformed: bool,
}

impl RequestParser {
    pub fn new() -> Self {
        Self {
            state: ParseState::RequestLine,
            buffer: Vec::with_capacity(4096),
            method: String::new(),
            path: String::new(),
            query: String::new(),
            version: String::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            content_length: 0,
            chunk_length: 0,
            reading_chunk_size: true,
            malformed: false,
        }
    }

    /// Feed raw bytes; returns true once a full request has been parsed
    pub fn parse(&mut self, data: &[u8]) -> bool {
        self.buffer.extend_from_slice(data);

        if self.state == ParseState::RequestLine {
            self.parse_request_line();
        }
        if self.state == ParseState::Headers {
            self.parse_headers();
        }
        if self.state == ParseState::Body {
            self.parse_body();
        }
        if self.state == ParseState::Chunked {
            self.parse_chunked_body();
        }

        self.state == ParseState::Complete
    }

    pub fn is_complete(&self) -> bool {
        self.state == ParseState::Complete
    }

    /// Build the finished request, leaving the parser ready for `reset`
    pub fn take_request(&mut self) -> HttpRequest {
        HttpRequest {
            method: std::mem::take(&mut self.method),
            path: std::mem::take(&mut self.path),
            query: std::mem::take(&mut self.query),
            version: std::mem::take(&mut self.version),
            headers: std::mem::take(&mut self.headers),
            body: std::mem::take(&mut self.body),
            malformed: self.malformed,
        }
    }

    /// Return to REQUEST_LINE with all fields cleared. Bytes received
    /// past the last completed request are dropped; pipelining is not
    /// supported.
    pub fn reset(&mut self) {
        self.state = ParseState::RequestLine;
        self.buffer.clear();
        self.method.clear();
        self.path.clear();
        self.query.clear();
        self.version.clear();
        self.headers.clear();
        self.body.clear();
        self.content_length = 0;
        self.chunk_length = 0;
        self.reading_chunk_size = true;
        self.malformed = false;
    }

    fn parse_request_line(&mut self) {
        let line = match self.take_line() {
            Some(l) => l,
            None => return,
        };

        let mut parts = line.split_whitespace();
        let method = parts.next().unwrap_or("");
        let target = parts.next().unwrap_or("");
        let version = parts.next().unwrap_or("");

        if method.is_empty() || target.is_empty() || version.is_empty() {
            self.malformed = true;
            self.state = ParseState::Complete;
            return;
        }

        self.method = method.to_string();
        self.version = version.to_string();
        match target.split_once('?') {
            Some((path, query)) => {
                self.path = path.to_string();
                self.query = query.to_string();
            }
            None => self.path = target.to_string(),
        }
        self.state = ParseState::Headers;
    }

    fn parse_headers(&mut self) {
        while let Some(line) = self.take_line() {
            if line.is_empty() {
                self.decide_body_state();
                return;
            }
            if let Some((key, value)) = line.split_once(':') {
                self.headers
                    .insert(key.to_string(), value.trim_start_matches(' ').to_string());
            }
        }
    }

    /// After the blank line: Content-Length wins, then chunked, else done
    fn decide_body_state(&mut self) {
        if let Some(value) = self.headers.get("Content-Length") {
            self.content_length = value.trim().parse().unwrap_or(0);
            self.state = if self.content_length > 0 {
                ParseState::Body
            } else {
                ParseState::Complete
            };
        } else if self
            .headers
            .get("Transfer-Encoding")
            .map(|v| v.trim().eq_ignore_ascii_case("chunked"))
            .unwrap_or(false)
        {
            self.state = ParseState::Chunked;
        } else {
            self.state = ParseState::Complete;
        }
    }

    fn parse_body(&mut self) {
        if self.buffer.len() >= self.content_length {
            self.body.extend_from_slice(&self.buffer[..self.content_length]);
            self.buffer.drain(..self.content_length);
            self.state = ParseState::Complete;
        }
    }

    fn parse_chunked_body(&mut self) {
        loop {
            if self.reading_chunk_size {
                let line = match self.take_line() {
                    Some(l) => l,
                    None => return,
                };

                // Chunk extensions after ';' are ignored
                let size = line.split(';').next().unwrap_or("").trim();
                self.chunk_length = usize::from_str_radix(size, 16).unwrap_or(0);

                if self.chunk_length == 0 {
                    // Terminal chunk; consume the optional trailing CRLF
                    if self.buffer.starts_with(b"\r\n") {
                        self.buffer.drain(..2);
                    }
                    self.state = ParseState::Complete;
                    return;
                }
                self.reading_chunk_size = false;
            } else {
                // Need the full chunk plus its CRLF
                if self.buffer.len() < self.chunk_length + 2 {
                    return;
                }
                self.body.extend_from_slice(&self.buffer[..self.chunk_length]);
                self.buffer.drain(..self.chunk_length + 2);
                self.reading_chunk_size = true;
            }
        }
    }

    /// Pop one CRLF-terminated line off the front of the buffer
    fn take_line(&mut self) -> Option<String> {
        let pos = self.buffer.windows(2).position(|w| w == b"\r\n")?;
        let line = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
        self.buffer.drain(..pos + 2);
        Some(line)
    }
}

impl Default for RequestParser {
    fn default() -> Self {
        Self::new()
    }
}
