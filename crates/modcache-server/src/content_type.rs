//! The fixed `Content-Type` table for module-protocol responses.

/// Returns the `Content-Type` header value for a file suffix or response
/// kind (`info`, `json`, `mod`, `text`, `zip`).
#[must_use]
pub fn for_key(key: &str) -> &'static str {
    match key {
        "info" | "json" => "application/json; charset=UTF-8",
        "mod" | "text" => "text/plain; charset=UTF-8",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}
