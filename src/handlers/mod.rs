#[cfg(unix)]
mod cgi;
mod directory;
mod remove_file;
mod static_files;
mod upload_file;

#[cfg(unix)]
pub use cgi::{build_cgi_response, kill_cgi, reap_cgi, spawn_cgi, CgiProcess};
pub use directory::list_directory;
pub use remove_file::handle_delete;
pub use static_files::{get_content_type, handle_get, serve_file};
pub use upload_file::handle_post;
