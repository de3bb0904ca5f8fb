mod request;
mod response;

pub use request::{HttpRequest, RequestParser};
pub use response::{status_text, HttpResponse};
