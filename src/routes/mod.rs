//! HTTP route handlers.
//!
//! | Path      | Behavior                                                      |
//! |-----------|---------------------------------------------------------------|
//! | `/update` | Firmware redirect (302) for devices, instructions for browsers |
//! | `/log`    | The caller's recent request history                           |
//! | other     | 404, recorded in the caller's history                         |
//!
//! Paths match exactly and case-sensitively; any method is accepted.
//! Every handler keys history entries by [`ClientId`].

pub mod log;
pub mod update;

use std::borrow::Cow;
use std::convert::Infallible;
use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, FromRequestParts, State},
    http::{header, request::Parts, HeaderMap, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::any,
    Router,
};
use tower_http::trace::TraceLayer;

use crate::AppState;

/// Content type for the HTML pages.
pub const HTML_CONTENT_TYPE: &str = r#"text/html; charset="UTF-8""#;

/// Identity used when neither the proxy header nor the peer address is known.
const UNKNOWN_CLIENT: &str = "unknown";

/// Build the router with all routes, the fallback and request tracing.
///
/// Serve it with `into_make_service_with_connect_info::<SocketAddr>()` so
/// clients without a proxy header are identified by their peer address.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/update", any(update::update))
        .route("/log", any(log::log))
        .fallback(unknown)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// The client identity history entries are keyed by.
///
/// The configured real-IP header wins when present and non-empty; otherwise
/// the TCP peer address without its port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

impl FromRequestParts<AppState> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Ok(Self(client_identity(
            &parts.headers,
            peer,
            state.config.real_ip_header(),
        )))
    }
}

/// Resolve a client identity from headers and the peer address.
pub fn client_identity(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    real_ip_header: Option<&str>,
) -> String {
    if let Some(real_ip) = real_ip_header.and_then(|name| header_str(headers, name)) {
        return real_ip.into_owned();
    }
    peer.map_or_else(|| UNKNOWN_CLIENT.to_string(), |addr| addr.ip().to_string())
}

/// Header value as text; missing or empty counts as absent.
///
/// Invalid UTF-8 is decoded lossily rather than dropped, so a device sending
/// odd bytes in its MGOS headers still takes the firmware path (and gets a
/// 404 from resolution) instead of the browser page.
pub(crate) fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<Cow<'a, str>> {
    headers
        .get(name)
        .filter(|v| !v.is_empty())
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
}

pub(crate) fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "Not Found\n").into_response()
}

pub(crate) fn html(body: impl Into<String>) -> Response {
    ([(header::CONTENT_TYPE, HTML_CONTENT_TYPE)], body.into()).into_response()
}

/// Fallback for every path other than `/update` and `/log`.
async fn unknown(State(state): State<AppState>, ClientId(client): ClientId, uri: Uri) -> Response {
    state
        .history
        .append(&client, format!("unknown request {:?}", uri.path()))
        .await;
    not_found()
}
