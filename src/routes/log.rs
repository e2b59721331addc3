//! `/log` — the caller's recent request history as HTML.
//!
//! The visit itself is recorded before rendering, so the page always ends
//! with the `log request` line for this request.

use std::fmt::Write as _;

use axum::{extract::State, response::Response};
use chrono::{DateTime, Local};

use super::{html, ClientId};
use crate::history::{LogEntry, STAMP_FORMAT};
use crate::util::escape_html;
use crate::AppState;

/// `ANY /log`
pub async fn log(State(state): State<AppState>, ClientId(client): ClientId) -> Response {
    state.history.append(&client, "log request").await;
    let entries = state.history.render(&client).await;
    html(render_page(&client, &entries, Local::now()))
}

/// Render the history page: a heading, one `<li>` per entry (oldest first),
/// then the current server time.
pub fn render_page(client: &str, entries: &[LogEntry], now: DateTime<Local>) -> String {
    let mut page = format!("<h1>History for {}</h1>\n", escape_html(client));
    if !entries.is_empty() {
        page.push_str("<ul>\n");
        for entry in entries {
            let _ = writeln!(
                page,
                "  <li><pre style='margin: 0'>{}</pre></li>",
                escape_html(&entry.to_string())
            );
        }
        page.push_str("</ul>\n");
    }
    page.push_str("<hr>\n");
    let _ = writeln!(page, "{}", now.format(STAMP_FORMAT));
    page
}
