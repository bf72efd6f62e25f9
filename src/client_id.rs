use axum::extract::{ConnectInfo, FromRequestParts};
use axum::http::request::Parts;
use axum::http::{Extensions, HeaderMap};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use crate::rate_limit::UNKNOWN_CLIENT;
use crate::state::AppState;

// Rate-limit key for a request. Socket peer by default; behind a trusted
// reverse proxy, the address that proxy appended to X-Forwarded-For.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId(pub String);

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl ClientId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn resolve(headers: &HeaderMap, peer: Option<SocketAddr>, trust_proxy_headers: bool) -> Self {
        let proxied = if trust_proxy_headers {
            // the right-most hop is the one our proxy wrote; anything left of it is client-supplied
            header_str(headers, "x-forwarded-for")
                .and_then(|v| v.rsplit(',').next())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .or_else(|| {
                    header_str(headers, "x-real-ip")
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                })
        } else {
            None
        };

        let id = proxied
            .map(str::to_string)
            .or_else(|| peer.map(|addr| addr.ip().to_string()))
            .unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
        Self(id)
    }

    pub fn from_request(headers: &HeaderMap, extensions: &Extensions, trust_proxy_headers: bool) -> Self {
        let peer = extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        Self::resolve(headers, peer, trust_proxy_headers)
    }
}

impl FromRequestParts<Arc<AppState>> for ClientId {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self::from_request(
            &parts.headers,
            &parts.extensions,
            state.trust_proxy_headers,
        ))
    }
}
