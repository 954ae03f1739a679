//! SignalR negotiate step.
//!
//! Before opening the WebSocket the client POSTs to `{hub}/negotiate` to
//! obtain a connection token and the list of transports the hub offers. A
//! hub may instead answer with a redirect (`url` + `accessToken`), which is
//! followed up to [`MAX_REDIRECTS`] times.

// Rust guideline compliant 2026-02

use reqwest::Url;
use serde::Deserialize;

use super::HubError;
use crate::ws::http_to_ws_scheme;

/// Negotiate protocol version requested from the hub.
const NEGOTIATE_VERSION: &str = "1";

/// Maximum number of negotiate redirects to follow.
pub const MAX_REDIRECTS: usize = 5;

/// Transport name the hub must offer for this client to connect.
const WEBSOCKETS_TRANSPORT: &str = "WebSockets";

/// One entry of `availableTransports`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableTransport {
    /// Transport name (`WebSockets`, `ServerSentEvents`, `LongPolling`).
    pub transport: String,
    /// Supported transfer formats (`Text`, `Binary`).
    #[serde(default)]
    pub transfer_formats: Vec<String>,
}

/// Body of a negotiate response.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    /// Server-assigned connection id.
    #[serde(default)]
    pub connection_id: Option<String>,
    /// Token to present as `id` (negotiate version 1 and later).
    #[serde(default)]
    pub connection_token: Option<String>,
    /// Version the server agreed to.
    #[serde(default)]
    pub negotiate_version: u32,
    /// Transports offered by the hub.
    #[serde(default)]
    pub available_transports: Vec<AvailableTransport>,
    /// Redirect target.
    #[serde(default)]
    pub url: Option<String>,
    /// Bearer token to use with the redirect target.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Error reported by the hub.
    #[serde(default)]
    pub error: Option<String>,
}

impl NegotiateResponse {
    /// The id to send on the WebSocket URL.
    pub fn connect_id(&self) -> Option<&str> {
        self.connection_token
            .as_deref()
            .or(self.connection_id.as_deref())
    }

    fn offers_websockets(&self) -> bool {
        self.available_transports.is_empty()
            || self
                .available_transports
                .iter()
                .any(|t| t.transport == WEBSOCKETS_TRANSPORT)
    }
}

/// Result of a successful negotiate: where to open the socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Negotiated {
    /// Full `ws://` / `wss://` URL including the connection id.
    pub ws_url: String,
    /// Access token from a redirect, if any.
    pub access_token: Option<String>,
}

fn negotiate_error(message: impl Into<String>) -> HubError {
    HubError::Negotiate {
        status: None,
        message: message.into(),
        network_class: false,
    }
}

/// Build `{hub}/negotiate?negotiateVersion=1`, keeping any existing query.
pub fn negotiate_url(hub_url: &str) -> Result<Url, HubError> {
    let mut url =
        Url::parse(hub_url).map_err(|e| negotiate_error(format!("invalid hub URL {hub_url}: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| negotiate_error(format!("hub URL cannot be a base: {hub_url}")))?
        .pop_if_empty()
        .push("negotiate");
    url.query_pairs_mut()
        .append_pair("negotiateVersion", NEGOTIATE_VERSION);
    Ok(url)
}

/// Build the WebSocket URL for a negotiated connection.
pub fn websocket_url(hub_url: &str, connect_id: Option<&str>) -> Result<String, HubError> {
    let mut url =
        Url::parse(hub_url).map_err(|e| negotiate_error(format!("invalid hub URL {hub_url}: {e}")))?;
    if let Some(id) = connect_id {
        url.query_pairs_mut().append_pair("id", id);
    }
    Ok(http_to_ws_scheme(url.as_str()))
}

/// Append a redirect bearer token as the `access_token` query parameter.
pub fn with_access_token(ws_url: &str, access_token: Option<&str>) -> Result<String, HubError> {
    let Some(token) = access_token else {
        return Ok(ws_url.to_string());
    };
    let mut url =
        Url::parse(ws_url).map_err(|e| negotiate_error(format!("invalid WebSocket URL {ws_url}: {e}")))?;
    url.query_pairs_mut().append_pair("access_token", token);
    Ok(url.into())
}

/// POST one negotiate request.
async fn negotiate_once(
    http: &reqwest::Client,
    hub_url: &str,
    access_token: Option<&str>,
) -> Result<NegotiateResponse, HubError> {
    let url = negotiate_url(hub_url)?;
    log::debug!("[Negotiate] POST {}", url);

    let mut request = http.post(url);
    if let Some(token) = access_token {
        request = request.bearer_auth(token);
    }

    let response = request.send().await.map_err(|e| HubError::Negotiate {
        status: None,
        message: e.to_string(),
        network_class: e.is_connect() || e.is_timeout() || e.is_request(),
    })?;

    let status = response.status();
    if !status.is_success() {
        // 403 is how a cross-origin refusal shows up outside a browser.
        return Err(HubError::Negotiate {
            status: Some(status.as_u16()),
            message: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
            network_class: status == reqwest::StatusCode::FORBIDDEN,
        });
    }

    response
        .json::<NegotiateResponse>()
        .await
        .map_err(|e| negotiate_error(format!("invalid negotiate response: {e}")))
}

/// Run the negotiate step, following redirects.
pub async fn negotiate(http: &reqwest::Client, hub_url: &str) -> Result<Negotiated, HubError> {
    let mut target = hub_url.to_string();
    let mut access_token: Option<String> = None;

    for _ in 0..=MAX_REDIRECTS {
        let mut response = negotiate_once(http, &target, access_token.as_deref()).await?;

        if let Some(error) = response.error.take() {
            return Err(negotiate_error(error));
        }

        if let Some(redirect) = response.url.take() {
            log::info!("[Negotiate] Redirected to {}", redirect);
            target = redirect;
            access_token = response.access_token.take();
            continue;
        }

        if !response.offers_websockets() {
            return Err(negotiate_error("hub does not offer the WebSockets transport"));
        }

        let ws_url = websocket_url(&target, response.connect_id())?;
        log::debug!(
            "[Negotiate] Negotiated connection (version {})",
            response.negotiate_version
        );
        return Ok(Negotiated {
            ws_url,
            access_token,
        });
    }

    Err(negotiate_error("too many negotiate redirects"))
}
