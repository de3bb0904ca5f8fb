/// Outgoing HTTP response
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status_code: u16,
    pub status_text: String,
    pub content_type: String,
    /// Extra headers (e.g. Location) emitted between Content-Type and
    /// Content-Length
    pub extra_headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub keep_alive: bool,
}

impl HttpResponse {
    pub fn new(status_code: u16, status_text: &str) -> Self {
        Self {
            status_code,
            status_text: status_text.to_string(),
            content_type: "text/html".to_string(),
            extra_headers: Vec::new(),
            body: Vec::new(),
            keep_alive: true,
        }
    }

    pub fn set_header(&mut self, key: &str, value: &str) {
        self.extra_headers.push((key.to_string(), value.to_string()));
    }

    pub fn set_body(&mut self, text: &str) {
        self.body = text.as_bytes().to_vec();
    }

    pub fn set_body_bytes(&mut self, bytes: Vec<u8>) {
        self.body = bytes;
    }

    /// Convert to wire format:
    /// status line, Content-Type, extras, Content-Length, Connection
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut output = Vec::with_capacity(self.body.len() + 128);

        output.extend_from_slice(
            format!("HTTP/1.1 {} {}\r\n", self.status_code, self.status_text).as_bytes(),
        );
        output.extend_from_slice(format!("Content-Type: {}\r\n", self.content_type).as_bytes());
        for (key, value) in &self.extra_headers {
            output.extend_from_slice(format!("{}: {}\r\n", key, value).as_bytes());
        }
        output.extend_from_slice(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        let connection = if self.keep_alive { "keep-alive" } else { "close" };
        output.extend_from_slice(format!("Connection: {}\r\n", connection).as_bytes());
        output.extend_from_slice(b"\r\n");
        output.extend_from_slice(&self.body);

        output
    }

    // Quick constructors

    pub fn ok() -> Self {
        Self::new(200, "OK")
    }

    pub fn created() -> Self {
        Self::new(201, "Created")
    }

    pub fn no_content() -> Self {
        Self::new(204, "No Content")
    }

    /// Status-only response with the built-in HTML error stub as body
    pub fn error(status_code: u16) -> Self {
        let text = status_text(status_code);
        let mut response = Self::new(status_code, text);
        response.set_body(&format!(
            "<html><body><h1>{} {}</h1></body></html>",
            status_code, text
        ));
        response
    }
}

/// Reason phrase for the status codes this server emits
pub fn status_text(code: u16) -> &'static str {
    match code {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        308 => "Permanent Redirect",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        501 => "Not Implemented",
        504 => "Gateway Timeout",
        _ => "Unknown",
    }
}
