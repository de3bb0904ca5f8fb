use super::types::{Location, VirtualServer};
use std::fs;
use std::io;

pub fn parse_config_file(path: &str) -> io::Result<Vec<VirtualServer>> {
    let content = fs::read_to_string(path)?;
    parse_config_string(&content)
}

/// Parse nginx-like configuration text into virtual server records
pub fn parse_config_string(content: &str) -> io::Result<Vec<VirtualServer>> {
    let tokens = tokenize(content);
    let mut servers = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        if tokens[i] == "server" {
            if tokens.get(i + 1).map(String::as_str) != Some("{") {
                return Err(config_error("expected '{' after 'server'"));
            }
            let (server, next) = parse_server_block(&tokens, i + 2)?;
            servers.push(server);
            i = next;
        } else {
            return Err(config_error(&format!(
                "unexpected token '{}' at global scope",
                tokens[i]
            )));
        }
    }

    if servers.is_empty() {
        return Err(config_error("no server block defined"));
    }

    normalize(&mut servers)?;
    Ok(servers)
}

/// Split config text into tokens; braces and semicolons separate
/// even when glued to a word, '#' comments run to end of line
fn tokenize(content: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = content.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '#' => {
                while let Some(&n) = chars.peek() {
                    chars.next();
                    if n == '\n' {
                        break;
                    }
                }
            }
            '{' | '}' | ';' => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
                tokens.push(c.to_string());
            }
            c if c.is_whitespace() => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_server_block(tokens: &[String], mut i: usize) -> io::Result<(VirtualServer, usize)> {
    let mut server = VirtualServer::new();
    let mut saw_listen = false;

    while i < tokens.len() {
        match tokens[i].as_str() {
            "}" => {
                if !saw_listen {
                    return Err(config_error("server block missing 'listen' directive"));
                }
                return Ok((server, i + 1));
            }
            "listen" => {
                let args = directive_args(tokens, &mut i, "listen", 1)?;
                server.port = parse_port(&args[0])?;
                saw_listen = true;
            }
            "host" => {
                let args = directive_args(tokens, &mut i, "host", 1)?;
                server.host = args[0].clone();
            }
            "server_name" => {
                let args = directive_args_var(tokens, &mut i, "server_name")?;
                server.server_names = args;
            }
            "root" => {
                let args = directive_args(tokens, &mut i, "root", 1)?;
                server.root = args[0].clone();
            }
            "error_page" => {
                let args = directive_args(tokens, &mut i, "error_page", 2)?;
                let code: u16 = args[0]
                    .parse()
                    .map_err(|_| config_error(&format!("invalid error_page code '{}'", args[0])))?;
                server.error_pages.insert(code, args[1].clone());
            }
            "client_max_body_size" => {
                let args = directive_args(tokens, &mut i, "client_max_body_size", 1)?;
                server.max_body_size = parse_size(&args[0])?;
            }
            "location" => {
                let prefix = tokens
                    .get(i + 1)
                    .filter(|t| *t != "{" && *t != "}" && *t != ";")
                    .ok_or_else(|| config_error("location directive missing path prefix"))?;
                if tokens.get(i + 2).map(String::as_str) != Some("{") {
                    return Err(config_error("expected '{' after location prefix"));
                }
                let (location, next) = parse_location_block(tokens, i + 3, prefix)?;
                server.locations.push(location);
                i = next;
            }
            t => {
                return Err(config_error(&format!(
                    "unknown directive '{}' in server block",
                    t
                )))
            }
        }
    }

    Err(config_error("unterminated server block"))
}

fn parse_location_block(
    tokens: &[String],
    mut i: usize,
    prefix: &str,
) -> io::Result<(Location, usize)> {
    let mut location = Location::new(prefix);

    while i < tokens.len() {
        match tokens[i].as_str() {
            "}" => return Ok((location, i + 1)),
            "root" => {
                let args = directive_args(tokens, &mut i, "root", 1)?;
                location.root = args[0].clone();
            }
            "index" => {
                let args = directive_args(tokens, &mut i, "index", 1)?;
                location.index = Some(args[0].clone());
            }
            "autoindex" => {
                let args = directive_args(tokens, &mut i, "autoindex", 1)?;
                location.autoindex = match args[0].as_str() {
                    "on" => true,
                    "off" => false,
                    v => {
                        return Err(config_error(&format!(
                            "autoindex expects 'on' or 'off', got '{}'",
                            v
                        )))
                    }
                };
            }
            "allow_methods" => {
                let args = directive_args_var(tokens, &mut i, "allow_methods")?;
                for m in &args {
                    if m != "GET" && m != "POST" && m != "DELETE" {
                        return Err(config_error(&format!("unsupported method '{}'", m)));
                    }
                }
                location.methods = args;
            }
            "return" => {
                let args = directive_args(tokens, &mut i, "return", 2)?;
                let code: u16 = args[0]
                    .parse()
                    .map_err(|_| config_error(&format!("invalid return code '{}'", args[0])))?;
                location.redirect = Some((code, args[1].clone()));
            }
            "cgi_ext" => {
                let args = directive_args_var(tokens, &mut i, "cgi_ext")?;
                location.cgi_extensions = args;
            }
            t => {
                return Err(config_error(&format!(
                    "unknown directive '{}' in location block",
                    t
                )))
            }
        }
    }

    Err(config_error("unterminated location block"))
}

/// Consume a directive expecting exactly `count` arguments before ';'
fn directive_args(
    tokens: &[String],
    i: &mut usize,
    name: &str,
    count: usize,
) -> io::Result<Vec<String>> {
    let args = directive_args_var(tokens, i, name)?;
    if args.len() != count {
        return Err(config_error(&format!(
            "'{}' expects {} argument(s), got {}",
            name,
            count,
            args.len()
        )));
    }
    Ok(args)
}

/// Consume a directive with one or more arguments, up to the ';'
fn directive_args_var(tokens: &[String], i: &mut usize, name: &str) -> io::Result<Vec<String>> {
    let mut args = Vec::new();
    let mut j = *i + 1;

    while j < tokens.len() {
        match tokens[j].as_str() {
            ";" => {
                if args.is_empty() {
                    return Err(config_error(&format!("'{}' expects an argument", name)));
                }
                *i = j + 1;
                return Ok(args);
            }
            "{" | "}" => break,
            t => args.push(t.to_string()),
        }
        j += 1;
    }

    Err(config_error(&format!("missing ';' after '{}'", name)))
}

fn parse_port(value: &str) -> io::Result<u16> {
    let port: u16 = value
        .parse()
        .map_err(|_| config_error(&format!("invalid port '{}'", value)))?;
    if port == 0 {
        return Err(config_error("port must be between 1 and 65535"));
    }
    Ok(port)
}

/// Parse a byte size with an optional K, M or G suffix
fn parse_size(value: &str) -> io::Result<usize> {
    let (digits, factor) = match value.chars().last() {
        Some('K') | Some('k') => (&value[..value.len() - 1], 1024),
        Some('M') | Some('m') => (&value[..value.len() - 1], 1024 * 1024),
        Some('G') | Some('g') => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        _ => (value, 1),
    };
    let n: usize = digits
        .parse()
        .map_err(|_| config_error(&format!("invalid size '{}'", value)))?;
    if n == 0 {
        return Err(config_error("client_max_body_size must be positive"));
    }
    Ok(n * factor)
}

/// Post-parse fixups: locations inherit the server root when theirs is empty
fn normalize(servers: &mut [VirtualServer]) -> io::Result<()> {
    for server in servers.iter_mut() {
        while server.root.len() > 1 && server.root.ends_with('/') {
            server.root.pop();
        }
        for location in server.locations.iter_mut() {
            if location.root.is_empty() {
                location.root = server.root.clone();
            }
            while location.root.len() > 1 && location.root.ends_with('/') {
                location.root.pop();
            }
        }
    }
    Ok(())
}

fn config_error(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_string())
}
