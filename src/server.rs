//! HTTP control surface: status query, manual trigger and optional static UI

use anyhow::{Context, Result};
use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::future::Future;
use std::path::Path;
use std::time::Instant;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::services::ServeDir;
use tracing::{error, info, warn};

use crate::backup::{Orchestrator, StatusSnapshot};
use crate::config::Config;
use crate::error::BackupError;

#[derive(Clone)]
pub struct AppState {
    orchestrator: Orchestrator,
}

async fn access_log(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let start = Instant::now();
    let resp = next.run(req).await;

    let status = resp.status();
    let latency_ms = start.elapsed().as_millis() as u64;

    if status.is_server_error() {
        error!("| {:>3} | {:^7} | {} | {}ms", status.as_u16(), method.as_str(), path, latency_ms);
    } else if status.is_client_error() {
        warn!("| {:>3} | {:^7} | {} | {}ms", status.as_u16(), method.as_str(), path, latency_ms);
    } else {
        info!("| {:>3} | {:^7} | {} | {}ms", status.as_u16(), method.as_str(), path, latency_ms);
    }

    resp
}

async fn get_status(State(state): State<AppState>) -> Json<StatusSnapshot> {
    Json(state.orchestrator.status().snapshot())
}

async fn trigger_backup(State(state): State<AppState>) -> Response {
    if state.orchestrator.status().is_running() {
        return already_running();
    }

    // Detached so a dropped connection cannot cancel a run halfway through
    let orchestrator = state.orchestrator.clone();
    let run = tokio::spawn(async move { orchestrator.perform_backup().await });

    match run.await {
        Ok(Ok(_summary)) => (
            StatusCode::OK,
            Json(json!({ "message": "Backup completed successfully" })),
        )
            .into_response(),
        Ok(Err(BackupError::AlreadyRunning)) => already_running(),
        Ok(Err(e)) => internal_error(e.to_string()),
        Err(e) => internal_error(format!("Backup task failed: {}", e)),
    }
}

fn already_running() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": BackupError::AlreadyRunning.to_string() })),
    )
        .into_response()
}

fn internal_error(message: String) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(json!({ "error": message }))).into_response()
}

async fn not_found_handler() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}

/// Build the application router. Unknown paths fall through to `static_dir` when set.
pub fn router(orchestrator: Orchestrator, static_dir: Option<&Path>) -> Router {
    let state = AppState { orchestrator };

    let api = Router::new()
        .route("/api/status", get(get_status))
        .route("/api/backup", post(trigger_backup));

    let app = match static_dir {
        Some(dir) => api.fallback_service(ServeDir::new(dir)),
        None => api.fallback(not_found_handler),
    };

    app.with_state(state)
        .layer(middleware::from_fn(access_log))
}

/// Bind the configured address and serve until Ctrl+C
pub async fn serve(config: &Config, orchestrator: Orchestrator, initial_backup: bool) -> Result<()> {
    let addr = format!("{}:{}", config.server.bind, config.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server running on {}", addr);

    if initial_backup {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.perform_backup().await {
                error!("Initial backup failed: {}", e);
            }
        });
    }

    let app = router(orchestrator, config.server.static_dir.as_deref().map(Path::new));
    serve_with_shutdown(listener, app, shutdown_signal()).await
}

/// Serve `app` on an already bound listener until `shutdown` resolves
pub async fn serve_with_shutdown<F>(listener: TcpListener, app: Router, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;
    info!("Server has shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
