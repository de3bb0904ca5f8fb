use crate::http::HttpResponse;
use std::fs;
use std::path::Path;

/// Serve a GET for an already-resolved filesystem path
pub fn handle_get(resolved: &str, request_uri: &str, autoindex: bool) -> HttpResponse {
    let path = Path::new(resolved);

    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return HttpResponse::error(404),
    };

    if metadata.is_dir() {
        if autoindex {
            return super::list_directory(resolved, request_uri);
        }
        return HttpResponse::error(403);
    }

    match fs::read(path) {
        Ok(content) => {
            let mut response = HttpResponse::ok();
            response.content_type = get_content_type(resolved).to_string();
            response.set_body_bytes(content);
            response
        }
        Err(_) => HttpResponse::error(404),
    }
}

/// Read a file from disk
pub fn serve_file(file_path: &str) -> Result<Vec<u8>, String> {
    let path = Path::new(file_path);

    if !path.is_file() {
        return Err("file not found".to_string());
    }

    match fs::read(path) {
        Ok(data) => Ok(data),
        Err(e) => Err(format!("could not read file: {}", e)),
    }
}

/// MIME type by filename suffix
pub fn get_content_type(file_path: &str) -> &'static str {
    if file_path.ends_with(".html") {
        "text/html"
    } else if file_path.ends_with(".css") {
        "text/css"
    } else if file_path.ends_with(".js") {
        "application/javascript"
    } else if file_path.ends_with(".json") {
        "application/json"
    } else if file_path.ends_with(".png") {
        "image/png"
    } else if file_path.ends_with(".jpg") || file_path.ends_with(".jpeg") {
        "image/jpeg"
    } else if file_path.ends_with(".gif") {
        "image/gif"
    } else {
        "text/plain"
    }
}
