//! HTTP server setup and the serve loop.
//!
//! # Responsibilities
//! - Build the axum Router: health/stats plus the fixed power-action table
//! - Wire up the guard chain (allowlist → auth → rate limit) and the
//!   response-header/trace/request-id layers
//! - Accept TLS connections, attach the per-connection client identity,
//!   and serve requests until shutdown
//! - Drain in-flight requests within the configured timeout, then force

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{header, HeaderValue},
    middleware,
    routing::{get, post},
    Router,
};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use tokio::net::TcpListener;
use tokio::task::JoinSet;
use tokio_rustls::TlsAcceptor;
use tower::ServiceExt;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    set_header::SetResponseHeaderLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::schema::{AgentConfig, TimeoutConfig};
use crate::dispatch::{Dispatcher, PowerAction};
use crate::http::handlers;
use crate::lifecycle::Shutdown;
use crate::net::{peer_identity, BoundedListener};
use crate::platform::{PowerExecutor, StatsProvider};
use crate::security::allowlist::allowlist_middleware;
use crate::security::auth::require_auth;
use crate::security::rate_limit::rate_limit_middleware;
use crate::security::{Allowlist, AuthState, PowerRateLimiter};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Dispatcher,
    pub stats: Arc<dyn StatsProvider>,
}

/// How the serve loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeOutcome {
    /// All connections drained within the timeout.
    Clean,
    /// The drain timeout expired; remaining connections were cut off.
    Forced,
}

#[derive(Debug, thiserror::Error)]
pub enum ServeError {
    #[error("listener error: {0}")]
    Io(#[from] std::io::Error),
}

/// HTTPS server for the power-management agent.
pub struct HttpServer {
    app: Router,
    acceptor: TlsAcceptor,
    timeouts: TimeoutConfig,
    max_connections: usize,
}

impl HttpServer {
    pub fn new(
        config: &AgentConfig,
        tls_config: Arc<rustls::ServerConfig>,
        allowlist: Allowlist,
        executor: Arc<dyn PowerExecutor>,
        stats: Arc<dyn StatsProvider>,
    ) -> Self {
        Self {
            app: build_router(config, allowlist, executor, stats),
            acceptor: TlsAcceptor::from(tls_config),
            timeouts: config.timeouts.clone(),
            max_connections: config.listener.max_connections,
        }
    }

    /// Serve until the shutdown signal fires, then drain.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: Shutdown,
    ) -> Result<ServeOutcome, ServeError> {
        let local_addr = listener.local_addr()?;
        tracing::info!(address = %local_addr, "agent listening");

        let listener = BoundedListener::new(listener, self.max_connections);
        let mut conn_tasks: JoinSet<()> = JoinSet::new();
        let mut accept_shutdown = shutdown.subscribe();

        loop {
            tokio::select! {
                _ = accept_shutdown.recv() => break,
                // Reap finished connection tasks so the set stays small.
                Some(_) = conn_tasks.join_next(), if !conn_tasks.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        // Subscribe before spawning so a trigger racing the
                        // spawn is still observed by the connection task.
                        let conn_shutdown = shutdown.subscribe();
                        let acceptor = self.acceptor.clone();
                        let app = self.app.clone();
                        let handshake_timeout = self.timeouts.handshake();
                        conn_tasks.spawn(async move {
                            let _permit = permit;
                            serve_connection(
                                stream,
                                peer,
                                acceptor,
                                app,
                                handshake_timeout,
                                conn_shutdown,
                            )
                            .await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "accept failed");
                    }
                },
            }
        }

        tracing::info!(
            active = conn_tasks.len(),
            "stopped accepting, draining connections"
        );

        let drain = self.timeouts.drain();
        let drained = tokio::time::timeout(drain, async {
            while conn_tasks.join_next().await.is_some() {}
        })
        .await;

        if drained.is_ok() {
            tracing::info!("shutdown complete, all connections drained");
            Ok(ServeOutcome::Clean)
        } else {
            tracing::warn!(
                timeout_secs = drain.as_secs(),
                remaining = conn_tasks.len(),
                "drain timed out, aborting remaining connections"
            );
            conn_tasks.shutdown().await;
            Ok(ServeOutcome::Forced)
        }
    }
}

/// TLS handshake, identity extraction, then HTTP on one connection.
async fn serve_connection(
    stream: tokio::net::TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    app: Router,
    handshake_timeout: std::time::Duration,
    mut shutdown: tokio::sync::broadcast::Receiver<()>,
) {
    let tls_stream = match tokio::time::timeout(handshake_timeout, acceptor.accept(stream)).await
    {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => {
            tracing::debug!(peer = %peer, error = %e, "TLS handshake failed");
            return;
        }
        Err(_) => {
            tracing::debug!(peer = %peer, "TLS handshake timed out");
            return;
        }
    };

    let identity = tls_stream
        .get_ref()
        .1
        .peer_certificates()
        .and_then(peer_identity);

    let service = hyper::service::service_fn(move |mut req: hyper::Request<hyper::body::Incoming>| {
        req.extensions_mut().insert(ConnectInfo(peer));
        if let Some(identity) = identity.clone() {
            req.extensions_mut().insert(identity);
        }
        app.clone().oneshot(req.map(Body::new))
    });

    let builder = auto::Builder::new(TokioExecutor::new());
    let conn = builder.serve_connection_with_upgrades(TokioIo::new(tls_stream), service);
    tokio::pin!(conn);

    tokio::select! {
        result = conn.as_mut() => {
            if let Err(e) = result {
                tracing::debug!(peer = %peer, error = %e, "connection error");
            }
        }
        _ = shutdown.recv() => {
            conn.as_mut().graceful_shutdown();
            if let Err(e) = conn.as_mut().await {
                tracing::debug!(peer = %peer, error = %e, "connection error during drain");
            }
        }
    }
}

/// Build the axum router with the full guard chain.
pub(crate) fn build_router(
    config: &AgentConfig,
    allowlist: Allowlist,
    executor: Arc<dyn PowerExecutor>,
    stats: Arc<dyn StatsProvider>,
) -> Router {
    let state = AppState {
        dispatcher: Dispatcher::new(
            executor,
            config.dispatch.exec_delay(),
            config.dispatch.dry_run,
        ),
        stats,
    };
    let auth = AuthState::new(&config.auth.bearer_token);
    let limiter = Arc::new(PowerRateLimiter::new(&config.rate_limit));

    // Fixed route table: each power route is bound to its action at build
    // time. Guard order on these routes is auth, then rate limit.
    let mut power = Router::new();
    for action in PowerAction::ALL {
        power = power.route(
            action.route_path(),
            post(move |State(state): State<AppState>| async move {
                state.dispatcher.dispatch(action)
            }),
        );
    }
    let power = power
        .route_layer(middleware::from_fn_with_state(limiter, rate_limit_middleware))
        .route_layer(middleware::from_fn_with_state(auth.clone(), require_auth));

    let mut stats_routes = Router::new().route("/stats", get(handlers::stats));
    if config.auth.protect_stats {
        stats_routes = stats_routes.route_layer(middleware::from_fn_with_state(auth, require_auth));
    }

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .merge(stats_routes)
        .merge(power)
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .with_state(state)
        .layer(TimeoutLayer::new(config.timeouts.request()))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ));

    // Outermost guard, installed only when ranges are configured.
    if !allowlist.is_empty() {
        app = app.layer(middleware::from_fn_with_state(
            Arc::new(allowlist),
            allowlist_middleware,
        ));
    }

    app
}
