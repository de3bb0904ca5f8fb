#![cfg(unix)]
mod connection;
mod epoll_wrapper;
mod listener;
mod router;
pub mod server;

pub use connection::{CgiState, ClientConnection, ConnState, ConnectionError, READ_BUF_SIZE};
pub use epoll_wrapper::{Epoll, Interest, SocketEvent};
pub use listener::{create_listener, set_nonblocking};
pub use router::{error_response, find_location, route_request, RouteOutcome};
