#![cfg(unix)]
use std::collections::HashMap;
use std::net::TcpListener;
use std::os::unix::io::{AsRawFd, RawFd};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::config::VirtualServer;
use crate::handlers;

use super::connection::{CgiState, ClientConnection, ConnState, READ_BUF_SIZE};
use super::epoll_wrapper::{Epoll, Interest, SocketEvent};
use super::listener::create_listener;
use super::router::{error_response, route_request, RouteOutcome};

/// Wall-clock limit on a CGI child
const CGI_TIMEOUT: Duration = Duration::from_secs(3);

/// Maximum idle time before closing a connection
const IDLE_TIMEOUT_SECS: u64 = 30;

/// Poll timeout (milliseconds) so deadlines fire on idle sockets
const TIMEOUT_CHECK_MS: i32 = 1000;

/// Maximum requests per keep-alive connection
const MAX_REQUESTS_PER_CONN: u32 = 100;

pub struct Server {
    configs: Vec<VirtualServer>,
}

impl Server {
    pub fn new(configs: Vec<VirtualServer>) -> Self {
        Self { configs }
    }

    /// Bind every configured port and drive the event loop.
    /// Returns only on fatal error.
    pub fn run(&self) -> std::io::Result<()> {
        let mut listeners: Vec<TcpListener> = Vec::new();
        let mut listener_ports: HashMap<RawFd, u16> = HashMap::new();

        // Records sharing a port share the first record's listener
        for server in &self.configs {
            if listener_ports.values().any(|p| *p == server.port) {
                continue;
            }
            let addr = format!("{}:{}", server.host, server.port);
            let listener = create_listener(&addr)?;
            info!("listening on {}", addr);
            listener_ports.insert(listener.as_raw_fd(), server.port);
            listeners.push(listener);
        }

        let poller = Epoll::create()?;
        for listener in &listeners {
            poller.register(listener.as_raw_fd(), Interest::readable())?;
        }

        // Connection table and CGI pipe map, owned by the loop
        let mut clients: HashMap<RawFd, ClientConnection> = HashMap::new();
        let mut cgi_pipes: HashMap<RawFd, RawFd> = HashMap::new();

        info!("ready to accept connections");

        loop {
            let events = poller.poll(TIMEOUT_CHECK_MS)?;

            self.check_cgi_deadlines(&poller, &mut clients, &mut cgi_pipes);

            for event in &events {
                if let Some(&port) = listener_ports.get(&event.fd) {
                    if let Some(listener) = listeners.iter().find(|l| l.as_raw_fd() == event.fd) {
                        self.accept_connections(listener, port, &poller, &mut clients);
                    }
                } else if cgi_pipes.contains_key(&event.fd) {
                    self.handle_cgi_pipe(event, &poller, &mut clients, &mut cgi_pipes);
                } else if clients.contains_key(&event.fd) {
                    self.handle_client_event(event, &poller, &mut clients, &mut cgi_pipes);
                }
                // Unknown fds were torn down earlier in this batch
            }

            self.cleanup_connections(&poller, &mut clients, &mut cgi_pipes);
        }
    }

    /// Accept all pending connections from a listener
    fn accept_connections(
        &self,
        listener: &TcpListener,
        port: u16,
        poller: &Epoll,
        clients: &mut HashMap<RawFd, ClientConnection>,
    ) {
        loop {
            match listener.accept() {
                Ok((stream, addr)) => {
                    if stream.set_nonblocking(true).is_err() {
                        continue;
                    }
                    let fd = stream.as_raw_fd();

                    if let Err(e) = poller.register(fd, Interest::readable()) {
                        warn!("failed to register client: {}", e);
                        continue;
                    }

                    clients.insert(fd, ClientConnection::new(stream, port));
                    debug!("accepted connection from {} on port {}", addr, port);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept error: {}", e);
                    break;
                }
            }
        }
    }

    /// Kill and reap CGI children past their deadline, answering 504
    fn check_cgi_deadlines(
        &self,
        poller: &Epoll,
        clients: &mut HashMap<RawFd, ClientConnection>,
        cgi_pipes: &mut HashMap<RawFd, RawFd>,
    ) {
        let expired: Vec<RawFd> = clients
            .iter()
            .filter(|(_, c)| {
                c.cgi
                    .as_ref()
                    .map(|s| s.started_at.elapsed() >= CGI_TIMEOUT)
                    .unwrap_or(false)
            })
            .map(|(fd, _)| *fd)
            .collect();

        for fd in expired {
            if let Some(client) = clients.get_mut(&fd) {
                if let Some(cgi) = client.cgi.take() {
                    warn!("cgi child {} exceeded deadline, killing", cgi.pid);
                    handlers::kill_cgi(cgi.pid);
                    let _ = poller.unregister(cgi.stdout_fd);
                    let _ = nix::unistd::close(cgi.stdout_fd);
                    cgi_pipes.remove(&cgi.stdout_fd);
                }
                let response = self.error_for_port(504, client.port, client.keep_alive);
                client.queue_response(response);
                if poller.modify(fd, Interest::writable()).is_err() {
                    client.state = ConnState::Closing;
                }
            }
        }
    }

    /// Read, parse, route and write for one client descriptor
    fn handle_client_event(
        &self,
        event: &SocketEvent,
        poller: &Epoll,
        clients: &mut HashMap<RawFd, ClientConnection>,
        cgi_pipes: &mut HashMap<RawFd, RawFd>,
    ) {
        let fd = event.fd;
        let client = match clients.get_mut(&fd) {
            Some(c) => c,
            None => return,
        };
        if client.state == ConnState::Closing {
            return;
        }
        if event.has_error {
            client.state = ConnState::Closing;
            return;
        }

        if (event.can_read || event.hung_up) && client.state == ConnState::Reading {
            match client.try_read() {
                Ok(true) => {
                    let request = client.parser.take_request();
                    client.parser.reset();

                    client.keep_alive = request
                        .header("Connection")
                        .map(|v| !v.eq_ignore_ascii_case("close"))
                        .unwrap_or(true);

                    info!("{} {} (fd {})", request.method, request.path, fd);

                    match route_request(&request, &self.configs, client.port) {
                        RouteOutcome::Respond(mut response) => {
                            response.keep_alive = client.keep_alive;
                            client.queue_response(response.to_bytes());
                            if poller.modify(fd, Interest::writable()).is_err() {
                                client.state = ConnState::Closing;
                            }
                        }
                        RouteOutcome::StartCgi(process) => {
                            if poller.register(process.stdout_fd, Interest::readable()).is_err() {
                                handlers::kill_cgi(process.pid);
                                let _ = nix::unistd::close(process.stdout_fd);
                                let response =
                                    self.error_for_port(500, client.port, client.keep_alive);
                                client.queue_response(response);
                                if poller.modify(fd, Interest::writable()).is_err() {
                                    client.state = ConnState::Closing;
                                }
                            } else {
                                cgi_pipes.insert(process.stdout_fd, fd);
                                client.cgi = Some(CgiState {
                                    pid: process.pid,
                                    stdout_fd: process.stdout_fd,
                                    output: Vec::new(),
                                    started_at: Instant::now(),
                                });
                                client.state = ConnState::AwaitingCgi;
                            }
                        }
                    }
                }
                Ok(false) => {}
                Err(_) => {
                    client.state = ConnState::Closing;
                    return;
                }
            }
        }

        if event.can_write && client.state == ConnState::Writing {
            match client.try_write() {
                Ok(true) => {
                    if client.keep_alive && client.requests_handled < MAX_REQUESTS_PER_CONN {
                        client.reset_for_next_request();
                        if poller.modify(fd, Interest::readable()).is_err() {
                            client.state = ConnState::Closing;
                        }
                    } else {
                        client.state = ConnState::Closing;
                    }
                }
                Ok(false) => {}
                Err(_) => client.state = ConnState::Closing,
            }
        }
    }

    /// Drain a CGI pipe; on EOF assemble the response for its client
    fn handle_cgi_pipe(
        &self,
        event: &SocketEvent,
        poller: &Epoll,
        clients: &mut HashMap<RawFd, ClientConnection>,
        cgi_pipes: &mut HashMap<RawFd, RawFd>,
    ) {
        let pipe_fd = event.fd;
        let client_fd = match cgi_pipes.get(&pipe_fd) {
            Some(fd) => *fd,
            None => return,
        };

        let client = match clients.get_mut(&client_fd) {
            Some(c) => c,
            None => {
                // Client vanished; drop the orphaned pipe
                cgi_pipes.remove(&pipe_fd);
                let _ = poller.unregister(pipe_fd);
                let _ = nix::unistd::close(pipe_fd);
                return;
            }
        };

        let mut finished = false;
        let mut buf = [0u8; READ_BUF_SIZE];
        loop {
            match nix::unistd::read(pipe_fd, &mut buf) {
                Ok(0) => {
                    finished = true;
                    break;
                }
                Ok(n) => {
                    if let Some(cgi) = client.cgi.as_mut() {
                        cgi.output.extend_from_slice(&buf[..n]);
                    }
                }
                Err(nix::errno::Errno::EAGAIN) => break,
                Err(nix::errno::Errno::EINTR) => continue,
                Err(_) => {
                    finished = true;
                    break;
                }
            }
        }

        if finished {
            cgi_pipes.remove(&pipe_fd);
            let _ = poller.unregister(pipe_fd);
            let _ = nix::unistd::close(pipe_fd);

            if let Some(cgi) = client.cgi.take() {
                // EOF implies the child terminated
                handlers::reap_cgi(cgi.pid);
                debug!("cgi child {} finished, {} bytes", cgi.pid, cgi.output.len());
                let keep_alive = client.keep_alive;
                client.queue_response(handlers::build_cgi_response(&cgi.output, keep_alive));
                if poller.modify(client_fd, Interest::writable()).is_err() {
                    client.state = ConnState::Closing;
                }
            }
        }
    }

    /// Remove closed and idle connections, tearing down any live CGI
    fn cleanup_connections(
        &self,
        poller: &Epoll,
        clients: &mut HashMap<RawFd, ClientConnection>,
        cgi_pipes: &mut HashMap<RawFd, RawFd>,
    ) {
        let to_remove: Vec<RawFd> = clients
            .iter()
            .filter(|(_, c)| c.state == ConnState::Closing || c.is_timed_out(IDLE_TIMEOUT_SECS))
            .map(|(fd, _)| *fd)
            .collect();

        for fd in to_remove {
            if let Some(mut conn) = clients.remove(&fd) {
                if let Some(cgi) = conn.cgi.take() {
                    handlers::kill_cgi(cgi.pid);
                    let _ = poller.unregister(cgi.stdout_fd);
                    let _ = nix::unistd::close(cgi.stdout_fd);
                    cgi_pipes.remove(&cgi.stdout_fd);
                }
                let _ = poller.unregister(fd);
                let _ = conn.stream.shutdown(std::net::Shutdown::Both);
                debug!("connection closed (fd {})", fd);
            }
        }
    }

    /// Serialized error response for the virtual server on `port`
    fn error_for_port(&self, code: u16, port: u16, keep_alive: bool) -> Vec<u8> {
        let server = self
            .configs
            .iter()
            .find(|s| s.port == port)
            .unwrap_or(&self.configs[0]);
        let mut response = error_response(code, server);
        response.keep_alive = keep_alive;
        response.to_bytes()
    }
}
