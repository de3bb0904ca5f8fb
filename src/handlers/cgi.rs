use crate::http::HttpRequest;
use crate::network::set_nonblocking;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::{close, dup2, execve, fork, pipe, ForkResult, Pid};
use std::ffi::CString;
use std::io;
use std::os::unix::io::RawFd;

/// A launched CGI child: the loop registers `stdout_fd` and maps it
/// back to the originating client
pub struct CgiProcess {
    pub pid: Pid,
    pub stdout_fd: RawFd,
}

/// Fork and exec a CGI script, wiring the request body to its stdin
/// and returning the read end of its stdout pipe.
///
/// The body is written in a single call before the fd is handed back;
/// the configured body-size limit keeps that write within pipe capacity.
pub fn spawn_cgi(script_path: &str, request: &HttpRequest) -> io::Result<CgiProcess> {
    let script = CString::new(script_path)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "script path contains NUL"))?;
    let env = build_environment(script_path, request)?;
    let argv = [script.clone()];

    let (stdin_read, stdin_write) = pipe().map_err(io::Error::from)?;
    let (stdout_read, stdout_write) = pipe().map_err(io::Error::from)?;

    let fork_result = match unsafe { fork() } {
        Ok(r) => r,
        Err(e) => {
            let _ = close(stdin_read);
            let _ = close(stdin_write);
            let _ = close(stdout_read);
            let _ = close(stdout_write);
            return Err(io::Error::from(e));
        }
    };

    match fork_result {
        ForkResult::Child => {
            let _ = close(stdin_write);
            let _ = close(stdout_read);
            let _ = dup2(stdin_read, 0);
            let _ = dup2(stdout_write, 1);
            let _ = close(stdin_read);
            let _ = close(stdout_write);
            let _ = execve(&script, &argv, &env);
            unsafe { libc::_exit(1) }
        }
        ForkResult::Parent { child } => {
            let _ = close(stdin_read);
            let _ = close(stdout_write);

            if !request.body.is_empty() {
                let _ = nix::unistd::write(stdin_write, &request.body);
            }
            let _ = close(stdin_write);

            if let Err(e) = set_nonblocking(stdout_read) {
                kill_cgi(child);
                let _ = close(stdout_read);
                return Err(e);
            }

            Ok(CgiProcess {
                pid: child,
                stdout_fd: stdout_read,
            })
        }
    }
}

/// CGI environment: the standard variables plus HTTP_* copies of the
/// request headers
fn build_environment(script_path: &str, request: &HttpRequest) -> io::Result<Vec<CString>> {
    let mut vars: Vec<(String, String)> = vec![
        ("REQUEST_METHOD".to_string(), request.method.clone()),
        ("QUERY_STRING".to_string(), request.query.clone()),
        ("SCRIPT_FILENAME".to_string(), script_path.to_string()),
        ("PATH_INFO".to_string(), request.path.clone()),
        ("SERVER_PROTOCOL".to_string(), "HTTP/1.1".to_string()),
        ("GATEWAY_INTERFACE".to_string(), "CGI/1.1".to_string()),
        ("REDIRECT_STATUS".to_string(), "200".to_string()),
    ];

    if !request.body.is_empty() || request.headers.contains_key("Content-Length") {
        vars.push(("CONTENT_LENGTH".to_string(), request.body.len().to_string()));
    }
    if let Some(ct) = request.header("Content-Type") {
        vars.push(("CONTENT_TYPE".to_string(), ct.to_string()));
    }
    for (key, value) in &request.headers {
        let name = format!("HTTP_{}", key.to_uppercase().replace('-', "_"));
        vars.push((name, value.clone()));
    }

    vars.into_iter()
        .map(|(k, v)| {
            CString::new(format!("{}={}", k, v))
                .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "NUL in CGI environment"))
        })
        .collect()
}

/// SIGKILL the child and reap it. Used on deadline expiry and on
/// connection teardown while a CGI is still running.
pub fn kill_cgi(pid: Pid) {
    let _ = kill(pid, Signal::SIGKILL);
    let _ = waitpid(pid, None);
}

/// Non-blocking reap after the stdout pipe reached EOF
pub fn reap_cgi(pid: Pid) {
    let _ = waitpid(pid, Some(WaitPidFlag::WNOHANG));
}

/// Wrap accumulated child output into an HTTP response.
///
/// Output with a header/body delimiter keeps the child's headers and
/// gains a computed Content-Length; output without one is served whole
/// as text/plain. LF-only delimiters are tolerated. `keep_alive` is
/// the connection's decision, same as every other response path.
pub fn build_cgi_response(output: &[u8], keep_alive: bool) -> Vec<u8> {
    let connection = if keep_alive { "keep-alive" } else { "close" };

    match find_delimiter(output) {
        Some((header_end, body_start)) => {
            let headers = String::from_utf8_lossy(&output[..header_end]);
            let body = &output[body_start..];

            let mut response = Vec::with_capacity(output.len() + 96);
            response.extend_from_slice(b"HTTP/1.1 200 OK\r\n");
            for line in headers.lines() {
                if line.is_empty() {
                    continue;
                }
                response.extend_from_slice(line.as_bytes());
                response.extend_from_slice(b"\r\n");
            }
            response.extend_from_slice(format!("Content-Length: {}\r\n", body.len()).as_bytes());
            response.extend_from_slice(format!("Connection: {}\r\n\r\n", connection).as_bytes());
            response.extend_from_slice(body);
            response
        }
        None => {
            let mut response = Vec::with_capacity(output.len() + 96);
            response.extend_from_slice(b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\n");
            response.extend_from_slice(format!("Content-Length: {}\r\n", output.len()).as_bytes());
            response.extend_from_slice(format!("Connection: {}\r\n\r\n", connection).as_bytes());
            response.extend_from_slice(output);
            response
        }
    }
}

fn find_delimiter(raw: &[u8]) -> Option<(usize, usize)> {
    if let Some(pos) = raw.windows(4).position(|w| w == b"\r\n\r\n") {
        return Some((pos, pos + 4));
    }
    raw.windows(2).position(|w| w == b"\n\n").map(|pos| (pos, pos + 2))
}
