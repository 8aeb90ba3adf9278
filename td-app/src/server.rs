//! TaskDesk HTTP server.
//!
//! Opens the task database, wires the assistant pipeline and mounts the API
//! routes behind the shared tower middleware stack.

use crate::assistant::Assistant;
use crate::assistant::remote::{HttpResponder, RemoteResponder};
use crate::assistant::settings::AssistantConfigStore;
use crate::config::AppConfig;
use crate::routes;
use anyhow::Result;
use axum::Extension;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::Response;
use std::net::SocketAddr;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use td_store::TaskStore;
use tower::limit::GlobalConcurrencyLimitLayer;
use tower_http::classify::ServerErrorsFailureClass;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

pub struct AppState {
    pub store: TaskStore,
    pub assistant: Assistant,
    pub assistant_config: Arc<AssistantConfigStore>,
}

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, path) = AppConfig::load_with_path(config_path).await?;
    let db_path = cfg.database_path()?;
    let store = TaskStore::open(&db_path).await?;
    let counts = store.counts().await?;
    let assistant_config = AssistantConfigStore::new(cfg.assistant_config_path()?);
    let assistant = assistant_config.load().await;
    tracing::info!(
        config_path = %path.display(),
        bind_addr = %cfg.server.bind_addr,
        db_path = %db_path.display(),
        assistant_config_path = %assistant_config.path().display(),
        total_tasks = counts.total,
        completed_tasks = counts.completed,
        assistant_model = %assistant.assistant.model,
        assistant_credential_configured = assistant.assistant.has_credential(),
        "config ok"
    );
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    let (cfg, cfg_path) = AppConfig::load_with_path(config_path).await?;
    let addr = cfg.bind_addr()?;
    let db_path = cfg.database_path()?;
    let assistant_config_path = cfg.assistant_config_path()?;
    tracing::info!(
        config_path = %cfg_path.display(),
        bind_addr = %addr,
        db_path = %db_path.display(),
        assistant_config_path = %assistant_config_path.display(),
        http_timeout_seconds = cfg.server.http_timeout_seconds,
        http_max_in_flight = cfg.server.http_max_in_flight,
        assistant_timeout_seconds = cfg.assistant.request_timeout_seconds,
        "server configuration loaded"
    );
    let listener = preflight_bind_listener(addr).await?;

    let store = TaskStore::open(&db_path).await?;
    let assistant_config = Arc::new(AssistantConfigStore::new(assistant_config_path));
    let remote: Arc<dyn RemoteResponder> = Arc::new(HttpResponder::new(cfg.assistant_timeout()));
    let assistant = Assistant::new(assistant_config.clone(), store.clone(), remote);
    let state = Arc::new(AppState {
        store,
        assistant,
        assistant_config,
    });

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(|request: &Request<_>| {
            tracing::info_span!(
                "http.request",
                method = %request.method(),
                uri = %request.uri(),
                version = ?request.version(),
                request_id = %request_id_from_headers(request.headers())
            )
        })
        .on_request(|request: &Request<_>, _span: &tracing::Span| {
            tracing::info!(
                method = %request.method(),
                uri = %request.uri(),
                request_id = %request_id_from_headers(request.headers()),
                "http request started"
            );
        })
        .on_response(
            |response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(
                    status = response.status().as_u16(),
                    latency_ms = latency.as_millis() as u64,
                    "http request completed"
                );
            },
        )
        .on_failure(
            |error: ServerErrorsFailureClass, latency: Duration, _span: &tracing::Span| {
                tracing::error!(
                    error_class = %error,
                    latency_ms = latency.as_millis() as u64,
                    "http request failed"
                );
            },
        );

    let app = routes::router()
        .layer(Extension(state))
        .layer(GlobalConcurrencyLimitLayer::new(cfg.server.http_max_in_flight))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            cfg.http_timeout(),
        ))
        .layer(trace_layer)
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));

    tracing::info!(%addr, "taskdesk serving");
    run_server(listener, app, shutdown_signal()).await
}

/// Serves `app` until `shutdown` resolves, then drains in-flight requests.
async fn run_server<F>(listener: tokio::net::TcpListener, app: axum::Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    tracing::info!("http server shutdown completed");
    Ok(())
}

async fn preflight_bind_listener(addr: SocketAddr) -> Result<tokio::net::TcpListener> {
    tracing::info!(%addr, "preflight bind check starting");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("preflight bind failed for {addr}: {e}"))?;
    tracing::info!(%addr, "preflight bind check passed");
    Ok(listener)
}

fn request_id_from_headers(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
        .unwrap_or_else(|| "missing".to_string())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; beginning graceful shutdown");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; beginning graceful shutdown");
            }
        }
    }
    #[cfg(not(unix))]
    {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::warn!("received ctrl-c; beginning graceful shutdown"),
            Err(e) => tracing::error!(error = %e, "failed to await ctrl-c signal"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use tower::ServiceExt;

    #[test]
    fn request_id_falls_back_to_missing() {
        let mut headers = HeaderMap::new();
        assert_eq!(request_id_from_headers(&headers), "missing");
        headers.insert("x-request-id", "abc-123".parse().expect("header"));
        assert_eq!(request_id_from_headers(&headers), "abc-123");
    }

    #[tokio::test]
    async fn preflight_reports_address_in_use() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = taken.local_addr().expect("addr");
        let err = preflight_bind_listener(addr).await.expect_err("port busy");
        assert!(err.to_string().contains("preflight bind failed"));
    }

    #[tokio::test]
    async fn request_id_layers_echo_generated_id() {
        let app = routes::router()
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
        let resp = app
            .oneshot(
                Request::builder()
                    .uri("/api/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("x-request-id").is_some());
    }

    #[tokio::test]
    async fn server_stops_when_shutdown_future_resolves() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(run_server(listener, routes::router(), async move {
            let _ = stop_rx.await;
        }));

        let resp = reqwest::get(format!("http://{addr}/api/health"))
            .await
            .expect("health request");
        assert_eq!(resp.status(), reqwest::StatusCode::OK);

        stop_tx.send(()).expect("signal shutdown");
        let joined = tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .expect("server exits after shutdown")
            .expect("join");
        assert!(joined.is_ok());
    }

    #[tokio::test]
    async fn doctor_bootstraps_database_from_config() {
        let dir = tempfile::tempdir().expect("temp dir");
        let config_path = dir.path().join("config.toml");
        let data_dir = dir.path().join("data");
        tokio::fs::write(
            &config_path,
            format!(
                "[storage]\ndata_dir = \"{}\"\n[server]\nbind_addr = \"127.0.0.1:0\"\n",
                data_dir.display()
            ),
        )
        .await
        .expect("write config");

        doctor(Some(config_path)).await.expect("doctor");
        assert!(data_dir.join("tasks.db").exists());
    }
}
