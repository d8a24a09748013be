//! TLS configuration and client identity extraction.
//!
//! All TLS material is loaded and validated at startup, before the
//! listener binds; a broken certificate chain aborts the process instead
//! of serving a half-configured endpoint.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::server::WebPkiClientVerifier;
use rustls::{RootCertStore, ServerConfig};
use sha2::{Digest, Sha256};
use x509_parser::prelude::*;

use crate::config::schema::{ClientAuthMode, TlsConfig};
use crate::security::auth::ClientIdentity;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyCertChain(String),

    #[error("no private key found in {0}")]
    EmptyPrivateKey(String),

    #[error("no usable CA certificates in {0}")]
    EmptyCaBundle(String),

    #[error("failed to build client verifier: {0}")]
    Verifier(String),

    #[error("TLS config error: {0}")]
    Config(#[from] rustls::Error),
}

/// Build the server-side rustls configuration. TLS 1.2 is the floor.
pub fn build_server_config(tls: &TlsConfig) -> Result<Arc<ServerConfig>, TlsError> {
    let cert_chain = load_cert_chain(Path::new(&tls.cert_path))?;
    let key = load_private_key(Path::new(&tls.key_path))?;

    let versions = [&rustls::version::TLS13, &rustls::version::TLS12];
    let builder = ServerConfig::builder_with_protocol_versions(&versions);

    let config = match tls.client_auth {
        ClientAuthMode::Disabled => builder
            .with_no_client_auth()
            .with_single_cert(cert_chain, key)?,
        mode => {
            let ca_path = tls.client_ca_path.as_deref().unwrap_or_default();
            let roots = load_root_store(Path::new(ca_path))?;
            let verifier = WebPkiClientVerifier::builder(roots.into());
            let verifier = match mode {
                ClientAuthMode::Required => verifier,
                _ => verifier.allow_unauthenticated(),
            }
            .build()
            .map_err(|e| TlsError::Verifier(e.to_string()))?;
            builder
                .with_client_cert_verifier(verifier)
                .with_single_cert(cert_chain, key)?
        }
    };

    Ok(Arc::new(config))
}

/// Derive the per-connection identity from a verified peer chain.
///
/// rustls has already verified the chain against the configured CA; this
/// only extracts the subject common name and the SHA-256 of the leaf's
/// raw DER encoding.
pub fn peer_identity(peer_certs: &[CertificateDer<'_>]) -> Option<ClientIdentity> {
    let leaf = peer_certs.first()?;
    let fingerprint = hex::encode(Sha256::digest(leaf.as_ref()));

    let common_name = match X509Certificate::from_der(leaf.as_ref()) {
        Ok((_, cert)) => cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .unwrap_or_default()
            .to_string(),
        Err(e) => {
            tracing::debug!(error = %e, "failed to parse verified peer certificate");
            String::new()
        }
    };

    Some(ClientIdentity {
        common_name,
        fingerprint,
    })
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })
}

fn load_cert_chain(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::EmptyCertChain(path.display().to_string()));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })?
        .ok_or_else(|| TlsError::EmptyPrivateKey(path.display().to_string()))
}

fn load_root_store(path: &Path) -> Result<RootCertStore, TlsError> {
    let certs = load_cert_chain(path)?;
    let mut roots = RootCertStore::empty();
    let (added, _skipped) = roots.add_parsable_certificates(certs);
    if added == 0 {
        return Err(TlsError::EmptyCaBundle(path.display().to_string()));
    }
    Ok(roots)
}
