use crate::http::HttpResponse;
use std::fs;

/// Synthesize a minimal HTML listing for a directory request.
/// Hidden entries are skipped; directories get a trailing slash.
pub fn list_directory(path: &str, uri: &str) -> HttpResponse {
    let entries = match fs::read_dir(path) {
        Ok(e) => e,
        Err(_) => return HttpResponse::error(404),
    };

    let mut names: Vec<(String, bool)> = Vec::new();
    for entry in entries.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        names.push((name, is_dir));
    }
    names.sort();

    let base = uri.trim_end_matches('/');
    let mut html = format!("<html><body><h1>Index of {}</h1><ul>", uri);
    for (name, is_dir) in &names {
        let suffix = if *is_dir { "/" } else { "" };
        html.push_str(&format!(
            r#"<li><a href="{}/{}{}">{}{}</a></li>"#,
            base, name, suffix, name, suffix
        ));
    }
    html.push_str("</ul></body></html>");

    let mut response = HttpResponse::ok();
    response.set_body(&html);
    response
}
