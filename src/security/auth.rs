//! Per-request authentication guard.
//!
//! Evaluation order per request:
//! 1. a verified client certificate chain (identity attached at the
//!    connection layer) authenticates outright;
//! 2. otherwise a configured bearer secret is matched against the
//!    `Authorization` header in constant time;
//! 3. anything else is 401.
//!
//! No session is retained; every request is authenticated independently,
//! and every decision is logged with the remote address.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::response::json_error;

/// Identity derived from a verified client certificate chain.
///
/// Built once per connection from the leaf certificate; ephemeral, never
/// persisted.
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Subject common name of the leaf certificate.
    pub common_name: String,
    /// SHA-256 of the leaf certificate's raw DER encoding, hex-encoded.
    pub fingerprint: String,
}

impl ClientIdentity {
    /// Abbreviated fingerprint for log lines.
    pub fn short_fingerprint(&self) -> &str {
        &self.fingerprint[..self.fingerprint.len().min(16)]
    }
}

/// Shared state for the auth guard.
#[derive(Clone, Default)]
pub struct AuthState {
    bearer_token: Option<Arc<str>>,
}

impl AuthState {
    /// An empty token disables bearer authentication entirely.
    pub fn new(bearer_token: &str) -> Self {
        Self {
            bearer_token: if bearer_token.is_empty() {
                None
            } else {
                Some(Arc::from(bearer_token))
            },
        }
    }

    fn check_bearer(&self, header_value: Option<&str>) -> bool {
        let Some(expected) = self.bearer_token.as_deref() else {
            return false;
        };
        let Some(presented) = header_value.and_then(|v| v.strip_prefix("Bearer ")) else {
            return false;
        };
        constant_time_eq(expected, presented)
    }
}

/// String comparison whose duration does not depend on where the inputs
/// first differ. Differing lengths still compare every position.
fn constant_time_eq(expected: &str, presented: &str) -> bool {
    let expected = expected.as_bytes();
    let presented = presented.as_bytes();
    let max_len = expected.len().max(presented.len());
    let mut diff = expected.len() ^ presented.len();

    for idx in 0..max_len {
        let left = expected.get(idx).copied().unwrap_or(0);
        let right = presented.get(idx).copied().unwrap_or(0);
        diff |= usize::from(left ^ right);
    }

    diff == 0
}

/// Middleware enforcing the certificate-then-bearer authentication order.
pub async fn require_auth(
    State(auth): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let remote = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.to_string())
        .unwrap_or_else(|| "unknown".to_string());

    if let Some(identity) = request.extensions().get::<ClientIdentity>() {
        tracing::info!(
            cn = %identity.common_name,
            fp = %identity.short_fingerprint(),
            remote = %remote,
            "auth ok (client certificate)"
        );
        return next.run(request).await;
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if auth.check_bearer(header_value) {
        tracing::info!(remote = %remote, "auth ok (bearer token)");
        return next.run(request).await;
    }

    tracing::warn!(remote = %remote, "auth failed");
    json_error(StatusCode::UNAUTHORIZED, "unauthorized")
}
