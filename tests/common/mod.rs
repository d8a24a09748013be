//! Shared fixtures for integration tests: a throwaway PKI on disk and a
//! helper that boots the agent on an ephemeral port.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rcgen::{
    BasicConstraints, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa, KeyPair,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use powerd::config::schema::AgentConfig;
use powerd::http::{HttpServer, ServeError, ServeOutcome};
use powerd::net::build_server_config;
use powerd::platform::{ExecutorError, PowerExecutor, StatsError, StatsProvider, SystemStats};
use powerd::security::Allowlist;
use powerd::Shutdown;

/// PEM material for one CA, one server leaf, and one client leaf.
pub struct TestPki {
    pub dir: PathBuf,
    pub ca_pem: String,
    pub cert_path: String,
    pub key_path: String,
    pub ca_path: String,
    pub client_pem: String,
}

impl TestPki {
    /// Generate certificates and write them under a unique temp dir.
    pub fn generate() -> Self {
        let ca_key = KeyPair::generate().unwrap();
        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        ca_params
            .distinguished_name
            .push(DnType::CommonName, "powerd test ca");
        let ca_cert = ca_params.self_signed(&ca_key).unwrap();

        let server_key = KeyPair::generate().unwrap();
        let mut server_params =
            CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()])
                .unwrap();
        server_params
            .distinguished_name
            .push(DnType::CommonName, "localhost");
        server_params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ServerAuth);
        let server_cert = server_params
            .signed_by(&server_key, &ca_cert, &ca_key)
            .unwrap();

        let client_key = KeyPair::generate().unwrap();
        let mut client_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        client_params
            .distinguished_name
            .push(DnType::CommonName, "operator");
        client_params
            .extended_key_usages
            .push(ExtendedKeyUsagePurpose::ClientAuth);
        let client_cert = client_params
            .signed_by(&client_key, &ca_cert, &ca_key)
            .unwrap();

        let dir = std::env::temp_dir().join(format!(
            "powerd-test-{}-{}",
            std::process::id(),
            unique_suffix()
        ));
        std::fs::create_dir_all(&dir).unwrap();

        let ca_pem = ca_cert.pem();
        let cert_path = dir.join("server.pem");
        let key_path = dir.join("server.key");
        let ca_path = dir.join("ca.pem");
        // Serve the full chain so clients only need the root.
        std::fs::write(&cert_path, format!("{}{}", server_cert.pem(), ca_pem)).unwrap();
        std::fs::write(&key_path, server_key.serialize_pem()).unwrap();
        std::fs::write(&ca_path, &ca_pem).unwrap();

        Self {
            dir: dir.clone(),
            ca_pem,
            cert_path: cert_path.display().to_string(),
            key_path: key_path.display().to_string(),
            ca_path: ca_path.display().to_string(),
            client_pem: format!("{}{}", client_cert.pem(), client_key.serialize_pem()),
        }
    }
}

impl Drop for TestPki {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

fn unique_suffix() -> u128 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
}

/// Executor that records invocations instead of touching the host.
pub struct RecordingExecutor {
    pub calls: Arc<AtomicUsize>,
}

impl PowerExecutor for RecordingExecutor {
    fn execute(&self, _action: &str) -> Result<(), ExecutorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct StaticStats;

impl StatsProvider for StaticStats {
    fn snapshot(&self) -> Result<SystemStats, StatsError> {
        Ok(SystemStats {
            cpu_usage_percent: 1.0,
            memory_total_bytes: 4096,
            memory_free_bytes: 2048,
            memory_used_bytes: 2048,
            uptime_seconds: 42,
        })
    }
}

/// A running agent bound to an ephemeral port.
pub struct RunningAgent {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub calls: Arc<AtomicUsize>,
    pub handle: JoinHandle<Result<ServeOutcome, ServeError>>,
}

impl RunningAgent {
    pub fn url(&self, path: &str) -> String {
        format!("https://localhost:{}{}", self.addr.port(), path)
    }
}

/// Boot the agent with the given config. TLS paths must already be set.
pub async fn spawn_agent(config: AgentConfig) -> RunningAgent {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let tls_config = build_server_config(&config.listener.tls).unwrap();
    let allowlist = Allowlist::parse(&config.allowlist).unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let server = HttpServer::new(
        &config,
        tls_config,
        allowlist,
        Arc::new(RecordingExecutor {
            calls: Arc::clone(&calls),
        }),
        Arc::new(StaticStats),
    );

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.clone()));

    RunningAgent {
        addr,
        shutdown,
        calls,
        handle,
    }
}
