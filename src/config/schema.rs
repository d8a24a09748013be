//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the agent.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Root configuration for the power-management agent.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AgentConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Authentication settings.
    pub auth: AuthConfig,

    /// Client IP allowlist (CIDR strings). Empty means no allowlist guard.
    pub allowlist: Vec<String>,

    /// Rate limiting for power-action routes.
    pub rate_limit: RateLimitConfig,

    /// Command dispatch settings.
    pub dispatch: DispatchConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "127.0.0.1:9090").
    pub bind_address: String,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,

    /// TLS configuration. The agent refuses to serve plaintext.
    pub tls: TlsConfig,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:9090".to_string(),
            max_connections: 64,
            tls: TlsConfig::default(),
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct TlsConfig {
    /// Path to the server certificate file (PEM).
    pub cert_path: String,

    /// Path to the server private key file (PEM).
    pub key_path: String,

    /// Path to the CA bundle used to verify client certificates.
    /// Required when `client_auth` is `required` or `optional`.
    pub client_ca_path: Option<String>,

    /// Client certificate policy.
    pub client_auth: ClientAuthMode,
}

/// How the listener treats client certificates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMode {
    /// A verified client certificate is mandatory (mTLS).
    #[default]
    Required,
    /// Verify a certificate if the client presents one; otherwise fall
    /// through to bearer-token authentication.
    Optional,
    /// Never request client certificates; bearer token only.
    Disabled,
}

/// Authentication settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Static bearer secret for `Authorization: Bearer <token>`.
    /// Empty disables bearer authentication.
    pub bearer_token: String,

    /// Whether /stats requires authentication.
    pub protect_stats: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            bearer_token: String::new(),
            protect_stats: true,
        }
    }
}

/// Rate limiting configuration for power-action routes.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Token replenishment rate in tokens per second.
    pub rate_per_sec: f64,

    /// Burst capacity (maximum tokens).
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        // One action per two seconds, burst of two.
        Self {
            rate_per_sec: 0.5,
            burst: 2,
        }
    }
}

/// Command dispatch settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Log power actions without executing them.
    pub dry_run: bool,

    /// Delay between the acknowledgement and the executor invocation, in
    /// milliseconds. Must be long enough for the response to reach the
    /// client before an action such as shutdown tears the host down.
    pub exec_delay_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            exec_delay_ms: 500,
        }
    }
}

impl DispatchConfig {
    pub fn exec_delay(&self) -> Duration {
        Duration::from_millis(self.exec_delay_ms)
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Per-request timeout in seconds.
    pub request_secs: u64,

    /// TLS handshake timeout in seconds.
    pub handshake_secs: u64,

    /// How long in-flight requests may run after a stop signal before
    /// connections are force-closed, in seconds.
    pub drain_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: 15,
            handshake_secs: 5,
            drain_secs: 5,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn handshake(&self) -> Duration {
        Duration::from_secs(self.handshake_secs)
    }

    pub fn drain(&self) -> Duration {
        Duration::from_secs(self.drain_secs)
    }
}
