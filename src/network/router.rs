#![cfg(unix)]
use crate::config::{Location, VirtualServer};
use crate::handlers;
use crate::handlers::CgiProcess;
use crate::http::{status_text, HttpRequest, HttpResponse};
use std::path::Path;

/// Result of routing one request
pub enum RouteOutcome {
    /// Complete response, ready for the outbound buffer
    Respond(HttpResponse),
    /// A CGI child was launched; the loop registers its pipe
    StartCgi(CgiProcess),
}

/// Route a completed request against the configuration
pub fn route_request(request: &HttpRequest, configs: &[VirtualServer], port: u16) -> RouteOutcome {
    let server = select_server(configs, port);

    if request.malformed || request.version != "HTTP/1.1" {
        return respond_error(400, server);
    }

    if !is_path_safe(&request.path) {
        return respond_error(403, server);
    }

    let location = match find_location(&request.path, &server.locations) {
        Some(l) => l,
        None => return respond_error(404, server),
    };

    if request.body.len() > server.max_body_size {
        return respond_error(413, server);
    }

    if let Some((code, target)) = &location.redirect {
        let mut response = HttpResponse::new(*code, status_text(*code));
        response.set_header("Location", target);
        return RouteOutcome::Respond(response);
    }

    let method = request.method.as_str();
    if method != "GET" && method != "POST" && method != "DELETE" {
        return respond_error(501, server);
    }
    let allowed = if location.methods.is_empty() {
        method == "GET"
    } else {
        location.methods.iter().any(|m| m == method)
    };
    if !allowed {
        return respond_error(405, server);
    }

    // Resolve root + path; directory requests gain the index file
    let mut resolved = format!("{}{}", location.root, request.path);
    if let Some(index) = &location.index {
        if Path::new(&resolved).is_dir() {
            resolved = format!("{}/{}", resolved.trim_end_matches('/'), index);
        }
    }

    if location
        .cgi_extensions
        .iter()
        .any(|ext| resolved.ends_with(ext.as_str()))
    {
        return match handlers::spawn_cgi(&resolved, request) {
            Ok(process) => RouteOutcome::StartCgi(process),
            Err(_) => respond_error(500, server),
        };
    }

    let response = match method {
        "GET" => handlers::handle_get(&resolved, &request.path, location.autoindex),
        "DELETE" => handlers::handle_delete(&resolved),
        _ => handlers::handle_post(&resolved, &request.body),
    };

    RouteOutcome::Respond(apply_error_page(response, server))
}

/// First record matching the connection's port, else the first overall
fn select_server<'a>(configs: &'a [VirtualServer], port: u16) -> &'a VirtualServer {
    configs
        .iter()
        .find(|s| s.port == port)
        .unwrap_or(&configs[0])
}

/// Longest-prefix match, aligned on path segments: "/api" matches
/// "/api" and "/api/x" but not "/apix". Ties keep declaration order.
pub fn find_location<'a>(path: &str, locations: &'a [Location]) -> Option<&'a Location> {
    let mut best: Option<&Location> = None;
    let mut best_len = 0;

    for location in locations {
        if !prefix_matches(&location.path, path) {
            continue;
        }
        if best.is_none() || location.path.len() > best_len {
            best = Some(location);
            best_len = location.path.len();
        }
    }

    best
}

fn prefix_matches(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    prefix.ends_with('/') || path.len() == prefix.len() || path.as_bytes()[prefix.len()] == b'/'
}

/// Build an error response, honoring the server's custom error pages
pub fn error_response(code: u16, server: &VirtualServer) -> HttpResponse {
    apply_error_page(HttpResponse::error(code), server)
}

fn respond_error(code: u16, server: &VirtualServer) -> RouteOutcome {
    RouteOutcome::Respond(error_response(code, server))
}

/// Swap in the configured error page body, when present and loadable
fn apply_error_page(mut response: HttpResponse, server: &VirtualServer) -> HttpResponse {
    if response.status_code >= 400 {
        if let Some(page) = server.error_pages.get(&response.status_code) {
            if let Ok(content) = handlers::serve_file(page) {
                response.content_type = handlers::get_content_type(page).to_string();
                response.set_body_bytes(content);
            }
        }
    }
    response
}

/// Reject traversal attempts before the path touches the filesystem
fn is_path_safe(path: &str) -> bool {
    let decoded = url_decode(path);
    !decoded.contains("..") && !decoded.contains('\0')
}

/// Decode %XX escapes and '+'
fn url_decode(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '%' {
            let hex: String = chars.by_ref().take(2).collect();
            if hex.len() == 2 {
                if let Ok(byte) = u8::from_str_radix(&hex, 16) {
                    result.push(byte as char);
                    continue;
                }
            }
            result.push('%');
            result.push_str(&hex);
        } else if c == '+' {
            result.push(' ');
        } else {
            result.push(c);
        }
    }

    result
}
