//! End-to-end tests over real TLS connections.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use reqwest::StatusCode;

use common::{spawn_agent, RunningAgent, TestPki};
use powerd::config::schema::{AgentConfig, ClientAuthMode};
use powerd::http::ServeOutcome;

const TOKEN: &str = "integration-secret";

fn base_config(pki: &TestPki) -> AgentConfig {
    let mut config = AgentConfig::default();
    config.listener.tls.cert_path = pki.cert_path.clone();
    config.listener.tls.key_path = pki.key_path.clone();
    config.dispatch.dry_run = true;
    config.dispatch.exec_delay_ms = 5;
    config
}

fn bearer_config(pki: &TestPki) -> AgentConfig {
    let mut config = base_config(pki);
    config.listener.tls.client_auth = ClientAuthMode::Disabled;
    config.auth.bearer_token = TOKEN.into();
    config
}

fn client_builder(pki: &TestPki, agent: &RunningAgent) -> reqwest::ClientBuilder {
    reqwest::Client::builder()
        .use_rustls_tls()
        .add_root_certificate(reqwest::Certificate::from_pem(pki.ca_pem.as_bytes()).unwrap())
        .resolve("localhost", agent.addr)
}

fn client(pki: &TestPki, agent: &RunningAgent) -> reqwest::Client {
    client_builder(pki, agent).build().unwrap()
}

fn mtls_client(pki: &TestPki, agent: &RunningAgent) -> reqwest::Client {
    client_builder(pki, agent)
        .identity(reqwest::Identity::from_pem(pki.client_pem.as_bytes()).unwrap())
        .build()
        .unwrap()
}

#[tokio::test]
async fn health_is_open_power_routes_are_not() {
    let pki = TestPki::generate();
    let agent = spawn_agent(bearer_config(&pki)).await;
    let client = client(&pki, &agent);

    let response = client.get(agent.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");

    let response = client.post(agent.url("/shutdown")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "unauthorized");
    assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn bearer_token_authorizes_power_action() {
    let pki = TestPki::generate();
    let agent = spawn_agent(bearer_config(&pki)).await;
    let client = client(&pki, &agent);

    let response = client
        .post(agent.url("/shutdown"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert_eq!(response.headers()["cache-control"], "no-store");
    assert!(response.headers().contains_key("x-request-id"));

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["action"], "shutdown");
    assert_eq!(body["message"], "dry-run");

    // Dry run: acknowledged but never executed.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(agent.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn burst_exhaustion_returns_429() {
    let pki = TestPki::generate();
    let mut config = bearer_config(&pki);
    config.rate_limit.rate_per_sec = 0.01;
    config.rate_limit.burst = 2;
    let agent = spawn_agent(config).await;
    let client = client(&pki, &agent);

    for _ in 0..2 {
        let response = client
            .post(agent.url("/lock"))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
    let response = client
        .post(agent.url("/lock"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "rate limit exceeded");
}

#[tokio::test]
async fn allowlist_blocks_sources_outside_ranges() {
    let pki = TestPki::generate();
    let mut config = bearer_config(&pki);
    config.allowlist = vec!["10.0.0.0/8".into()];
    let agent = spawn_agent(config).await;
    let client = client(&pki, &agent);

    // Loopback is not in 10.0.0.0/8.
    let response = client
        .post(agent.url("/shutdown"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["message"], "forbidden: 127.0.0.1 not in allowlist");
}

#[tokio::test]
async fn stats_reports_host_metrics() {
    let pki = TestPki::generate();
    let agent = spawn_agent(bearer_config(&pki)).await;
    let client = client(&pki, &agent);

    let response = client
        .get(agent.url("/stats"))
        .bearer_auth(TOKEN)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["memory_total_bytes"], 4096);
    assert_eq!(body["uptime_seconds"], 42);
}

#[tokio::test]
async fn client_certificate_authenticates_without_bearer() {
    let pki = TestPki::generate();
    let mut config = base_config(&pki);
    config.listener.tls.client_auth = ClientAuthMode::Required;
    config.listener.tls.client_ca_path = Some(pki.ca_path.clone());
    let agent = spawn_agent(config).await;

    let response = mtls_client(&pki, &agent)
        .post(agent.url("/sleep"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["action"], "sleep");
}

#[tokio::test]
async fn missing_client_certificate_is_rejected_at_handshake() {
    let pki = TestPki::generate();
    let mut config = base_config(&pki);
    config.listener.tls.client_auth = ClientAuthMode::Required;
    config.listener.tls.client_ca_path = Some(pki.ca_path.clone());
    let agent = spawn_agent(config).await;

    let result = client(&pki, &agent).get(agent.url("/health")).send().await;
    assert!(result.is_err());
}

#[tokio::test]
async fn drain_timeout_forces_remaining_connections_closed() {
    use tokio::io::AsyncReadExt;

    let pki = TestPki::generate();
    let mut config = bearer_config(&pki);
    config.timeouts.drain_secs = 1;
    config.timeouts.handshake_secs = 30;
    let agent = spawn_agent(config).await;

    // A connection that never speaks TLS holds its slot until the
    // handshake timeout, well past the drain window.
    let mut stalled = tokio::net::TcpStream::connect(agent.addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    agent.shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), agent.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ServeOutcome::Forced);
    assert!(started.elapsed() >= Duration::from_secs(1));

    // The stalled connection was aborted, not left running.
    let mut buf = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(1), stalled.read(&mut buf))
        .await
        .expect("aborted connection must close promptly");
    assert!(matches!(read, Ok(0) | Err(_)));
}

#[tokio::test]
async fn shutdown_drains_and_stops_accepting() {
    let pki = TestPki::generate();
    let agent = spawn_agent(bearer_config(&pki)).await;
    let client = client(&pki, &agent);

    let response = client.get(agent.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let health_url = agent.url("/health");
    agent.shutdown.trigger();
    let outcome = tokio::time::timeout(Duration::from_secs(5), agent.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(outcome, ServeOutcome::Clean);

    assert!(client.get(health_url).send().await.is_err());
}
