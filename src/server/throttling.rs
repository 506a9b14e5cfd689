//! Per-client admission in front of the product routes.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::error::ServiceError;

const ANONYMOUS_CLIENT: &str = "anonymous";

/// Reject the request with 429 once the client's quota is used up.
///
/// Rejected requests never reach the handler, so they cannot start an
/// acquisition.
pub async fn throttle_requests(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let client = client_id(&request, state.throttle.trusts_forwarded_for());
    if !state.throttle.admit(&client) {
        let retry_after = state.throttle.retry_after(&client);
        return ServiceError::Throttled { retry_after }.into_response();
    }
    next.run(request).await
}

/// The peer address, or with `trust_forwarded_for` the last
/// `X-Forwarded-For` hop, which is the one the fronting proxy appended.
fn client_id(request: &Request, trust_forwarded_for: bool) -> String {
    if trust_forwarded_for {
        let forwarded = request
            .headers()
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.rsplit(',').map(str::trim).find(|hop| !hop.is_empty()));

        if let Some(hop) = forwarded {
            return hop.to_string();
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| ANONYMOUS_CLIENT.to_string())
}
