//! Configuration validation.
//!
//! Semantic checks on top of what serde already guarantees syntactically.
//! Validation runs before any socket is bound; a config that fails here
//! never serves traffic.

use std::net::SocketAddr;

use crate::config::schema::{AgentConfig, ClientAuthMode};
use crate::security::allowlist::CidrRange;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid bind address {0:?}")]
    InvalidBindAddress(String),

    #[error("listener.max_connections must be greater than zero")]
    ZeroMaxConnections,

    #[error("tls.cert_path is required")]
    MissingCertPath,

    #[error("tls.key_path is required")]
    MissingKeyPath,

    #[error("tls.client_ca_path is required when client_auth is {0}")]
    MissingClientCa(&'static str),

    #[error("no authentication configured: client_auth is disabled and auth.bearer_token is empty")]
    NoAuthentication,

    #[error("invalid CIDR {0:?}: {1}")]
    InvalidCidr(String, String),

    #[error("rate_limit.rate_per_sec must be positive")]
    NonPositiveRate,

    #[error("rate_limit.burst must be at least 1")]
    ZeroBurst,
}

/// Validate a parsed configuration, returning all problems found.
pub fn validate_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    let tls = &config.listener.tls;
    if tls.cert_path.is_empty() {
        errors.push(ValidationError::MissingCertPath);
    }
    if tls.key_path.is_empty() {
        errors.push(ValidationError::MissingKeyPath);
    }
    match tls.client_auth {
        ClientAuthMode::Required | ClientAuthMode::Optional => {
            if tls.client_ca_path.as_deref().unwrap_or("").is_empty() {
                let mode = if tls.client_auth == ClientAuthMode::Required {
                    "required"
                } else {
                    "optional"
                };
                errors.push(ValidationError::MissingClientCa(mode));
            }
        }
        ClientAuthMode::Disabled => {
            if config.auth.bearer_token.is_empty() {
                errors.push(ValidationError::NoAuthentication);
            }
        }
    }

    for cidr in &config.allowlist {
        if let Err(e) = cidr.parse::<CidrRange>() {
            errors.push(ValidationError::InvalidCidr(cidr.clone(), e.to_string()));
        }
    }

    if config.rate_limit.rate_per_sec <= 0.0 {
        errors.push(ValidationError::NonPositiveRate);
    }
    if config.rate_limit.burst == 0 {
        errors.push(ValidationError::ZeroBurst);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
