use crate::http::HttpResponse;
use std::fs;
use std::path::Path;

/// Handle a DELETE for an already-resolved filesystem path
pub fn handle_delete(resolved: &str) -> HttpResponse {
    let path = Path::new(resolved);

    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return HttpResponse::error(404),
    };

    if metadata.is_dir() {
        return HttpResponse::error(403);
    }

    match fs::remove_file(path) {
        Ok(_) => {
            let mut response = HttpResponse::no_content();
            response.content_type = "text/plain".to_string();
            response
        }
        Err(_) => HttpResponse::error(500),
    }
}
