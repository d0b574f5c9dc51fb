//! WebSocket opening handshake
//!
//! Pure helpers for the server side of the RFC 6455 opening handshake:
//! validating an upgrade request, computing the accept token and rendering the
//! `101 Switching Protocols` response. No I/O happens here.

use crate::error::{Error, ProtocolError, Result};
use crate::protocol::constants::*;
use crate::protocol::http_header;
use crate::protocol::http_value;
use base64::{engine::general_purpose, Engine as _};
use http::{header, HeaderMap, HeaderName, Method, Request, Version};
use sha1::{Digest, Sha1};

/// Compute the Sec-WebSocket-Accept token for a client key
pub fn compute_accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_MAGIC.as_bytes());
    general_purpose::STANDARD.encode(hasher.finalize())
}

/// Validate an upgrade request and return its Sec-WebSocket-Key
///
/// Checks run in a fixed order (method, request target, `Connection`,
/// `Upgrade`, `Sec-WebSocket-Version`, `Sec-WebSocket-Key`) and the first
/// failure is returned. [`ProtocolError::status`] maps it to the HTTP status
/// the request should be rejected with.
pub fn validate_upgrade_request<B>(request: &Request<B>) -> Result<&str> {
    if request.method() != Method::GET {
        return Err(ProtocolError::InvalidMethod(request.method().to_string()).into());
    }

    let uri = request.uri();
    if uri.path_and_query().is_none() && uri.authority().is_none() {
        return Err(ProtocolError::MissingRequestTarget.into());
    }

    let headers = request.headers();

    let connection = require_header(headers, header::CONNECTION, http_header::CONNECTION)?;
    if !headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| has_token(value, http_value::UPGRADE))
    {
        return Err(invalid(http_header::CONNECTION, connection));
    }

    let upgrade = require_header(headers, header::UPGRADE, http_header::UPGRADE)?;
    if !has_token(upgrade, http_value::WEBSOCKET) {
        return Err(invalid(http_header::UPGRADE, upgrade));
    }

    let version = require_header(
        headers,
        header::SEC_WEBSOCKET_VERSION,
        http_header::SEC_WEBSOCKET_VERSION,
    )?;
    if version.trim() != WEBSOCKET_VERSION {
        return Err(invalid(http_header::SEC_WEBSOCKET_VERSION, version));
    }

    let key = require_header(headers, header::SEC_WEBSOCKET_KEY, http_header::SEC_WEBSOCKET_KEY)?;
    let key = key.trim();
    if key.is_empty() {
        return Err(invalid(http_header::SEC_WEBSOCKET_KEY, key));
    }

    Ok(key)
}

/// Render the `101 Switching Protocols` response for a validated request
pub fn switching_protocols_response(version: Version, accept_key: &str) -> String {
    format!(
        "{:?} 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\
         \r\n",
        version, accept_key
    )
}

fn require_header<'a>(
    headers: &'a HeaderMap,
    name: HeaderName,
    label: &'static str,
) -> Result<&'a str> {
    let value = headers
        .get(&name)
        .ok_or(ProtocolError::MissingHeader(label))?;
    value.to_str().map_err(|_| {
        Error::Protocol(ProtocolError::InvalidHeaderValue {
            header: label,
            value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
        })
    })
}

/// Case-insensitive match of `token` against a comma-separated header value
fn has_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|candidate| candidate.trim().eq_ignore_ascii_case(token))
}

fn invalid(header: &'static str, value: &str) -> Error {
    Error::Protocol(ProtocolError::InvalidHeaderValue {
        header,
        value: value.to_string(),
    })
}
