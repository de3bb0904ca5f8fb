use crate::http::HttpResponse;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Handle a POST: write the body to the resolved path. A directory
/// target gets a generated `upload_<unix-seconds>.dat` file inside it.
pub fn handle_post(resolved: &str, body: &[u8]) -> HttpResponse {
    let target = if Path::new(resolved).is_dir() {
        unique_upload_path(resolved)
    } else {
        resolved.to_string()
    };

    match File::create(&target).and_then(|mut f| f.write_all(body)) {
        Ok(_) => {
            let mut response = HttpResponse::created();
            response.content_type = "text/plain".to_string();
            response.set_body(&format!("created {}\n", target));
            response
        }
        Err(_) => HttpResponse::error(500),
    }
}

/// Generated filename inside `dir`; a counter suffix disambiguates
/// same-second collisions
fn unique_upload_path(dir: &str) -> String {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let base = dir.trim_end_matches('/');

    let mut candidate = format!("{}/upload_{}.dat", base, seconds);
    let mut counter = 1;
    while Path::new(&candidate).exists() {
        candidate = format!("{}/upload_{}_{}.dat", base, seconds, counter);
        counter += 1;
    }
    candidate
}
