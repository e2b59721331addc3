//! `/update` — the endpoint stock firmware polls for updates.
//!
//! - Both `X-MGOS-FW-Version` and `X-MGOS-Device-ID` present: resolve the
//!   HomeKit model and answer `302 Found` with `Location` pointing at the
//!   templated download URL, or `404` when resolution fails.
//! - Otherwise, a `User-Agent` means a human with a browser: answer with a
//!   short instructions page.
//! - Neither: `404`.
//!
//! The browser check is header presence only. A device sending its own
//! `User-Agent` without the MGOS headers is treated as a browser.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};

use super::{header_str, html, not_found, ClientId};
use crate::AppState;

pub const FW_VERSION_HEADER: &str = "X-MGOS-FW-Version";
pub const DEVICE_ID_HEADER: &str = "X-MGOS-Device-ID";

/// Page shown to browsers hitting `/update` directly.
pub const INDEX_PAGE: &str = "Please follow instructions <a href='https://github.com/mongoose-os-apps/shelly-homekit/'>here</a>.\n";

/// `ANY /update`
pub async fn update(
    State(state): State<AppState>,
    ClientId(client): ClientId,
    headers: HeaderMap,
) -> Response {
    let fw_version = header_str(&headers, FW_VERSION_HEADER);
    let device_id = header_str(&headers, DEVICE_ID_HEADER);
    if let (Some(fw_version), Some(device_id)) = (fw_version, device_id) {
        return serve_firmware(&state, &client, &fw_version, &device_id).await;
    }

    if let Some(agent) = header_str(&headers, header::USER_AGENT.as_str()) {
        state
            .history
            .append(&client, format!("index request from {agent:?}"))
            .await;
        return html(INDEX_PAGE);
    }

    not_found()
}

async fn serve_firmware(
    state: &AppState,
    client: &str,
    fw_version: &str,
    device_id: &str,
) -> Response {
    match state.models.resolve(fw_version, device_id) {
        Ok(model) => {
            let url = state.redirect.render(model);
            state
                .history
                .append(
                    client,
                    format!("firmware request: {fw_version:?} {device_id:?} -> {url}"),
                )
                .await;
            let body = format!("You are being taken to {url}\n");
            (StatusCode::FOUND, [(header::LOCATION, url)], body).into_response()
        }
        Err(e) => {
            state
                .history
                .append(
                    client,
                    format!("firmware request: {fw_version:?} {device_id:?} -> {e}"),
                )
                .await;
            not_found()
        }
    }
}
