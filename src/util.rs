//! Small helpers shared across modules.

/// Escape text for inclusion in HTML element content or quoted attributes.
///
/// Log lines carry client-supplied headers and paths, so anything rendered
/// into the `/log` page goes through here.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}
