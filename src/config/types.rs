use std::collections::HashMap;

/// One `server { }` block from the configuration file
#[derive(Debug, Clone)]
pub struct VirtualServer {
    /// Listening port (1-65535)
    pub port: u16,

    /// Bind address
    pub host: String,

    /// Document root for this server
    pub root: String,

    /// Names this server answers to
    pub server_names: Vec<String>,

    /// Status code -> custom error page path
    pub error_pages: HashMap<u16, String>,

    /// Maximum accepted request body size in bytes
    pub max_body_size: usize,

    /// Routing rules, in declaration order
    pub locations: Vec<Location>,
}

/// Default request body limit (1 MiB)
pub const DEFAULT_MAX_BODY_SIZE: usize = 1024 * 1024;

impl VirtualServer {
    pub fn new() -> Self {
        Self {
            port: 0,
            host: "0.0.0.0".to_string(),
            root: "www".to_string(),
            server_names: Vec::new(),
            error_pages: HashMap::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            locations: Vec::new(),
        }
    }
}

impl Default for VirtualServer {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for ONE location block
#[derive(Debug, Clone)]
pub struct Location {
    /// The URL path prefix (e.g., "/upload", "/")
    pub path: String,

    /// Where to serve files from; empty inherits the server root
    pub root: String,

    /// Index file served for directory requests
    pub index: Option<String>,

    /// Generate directory listings
    pub autoindex: bool,

    /// Allowed HTTP methods; empty means GET only
    pub methods: Vec<String>,

    /// Redirect (status code, target URI)
    pub redirect: Option<(u16, String)>,

    /// Filename suffixes handed to the CGI subsystem (e.g., ".py")
    pub cgi_extensions: Vec<String>,
}

impl Location {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            root: String::new(),
            index: None,
            autoindex: false,
            methods: Vec::new(),
            redirect: None,
            cgi_extensions: Vec::new(),
        }
    }
}
