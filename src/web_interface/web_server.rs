use std::net::SocketAddr;
use std::sync::Arc;

use serde::Deserialize;
use tokio::sync::watch;
use warp::{http::StatusCode, reply, Filter, Rejection};

use crate::error_handling::types::WebError;
use crate::storage::storage_trait::ConnectionStore;

/// API error payload
#[derive(serde::Serialize)]
struct ApiError {
    message: String,
}

#[derive(serde::Serialize)]
struct HealthResponse {
    status: &'static str,
    schema_version: i64,
}

#[derive(Debug, Deserialize)]
struct RecentQuery {
    limit: Option<u32>,
}

const DEFAULT_LIMIT: u32 = 100;
const MAX_LIMIT: u32 = 1000;

/// Read-only web query surface over the connection store.
///
/// External consumers (dashboard, visualization) only ever read finished
/// records here; no write operation is exposed across this boundary.
pub struct WebServer {
    store: Arc<dyn ConnectionStore>,
}

impl WebServer {
    /// Create a new WebServer instance
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self { store }
    }

    /// Start the web server on the given port; returns once the shutdown
    /// signal fires.
    pub async fn start(
        &self,
        port: u16,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<(), WebError> {
        let store_for_connections = self.store.clone();
        let store_for_stats = self.store.clone();
        let store_for_health = self.store.clone();

        // GET / -> dashboard
        let dashboard = warp::path::end().and(warp::get()).and_then(|| async move {
            let html = r#"<html><head><title>Vigie</title></head>
                <body><h1>Vigie is running</h1><p>See /connections for JSON.</p></body></html>"#;
            Ok::<_, Rejection>(reply::html(html))
        });

        // GET /connections?limit=N -> most recent records
        let connections = warp::path("connections")
            .and(warp::path::end())
            .and(warp::get())
            .and(warp::query::<RecentQuery>())
            .and_then(move |query: RecentQuery| {
                let store = store_for_connections.clone();
                async move {
                    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
                    match tokio::task::spawn_blocking(move || store.recent(limit)).await {
                        Ok(Ok(records)) => Ok::<_, Rejection>(reply::with_status(
                            reply::json(&records),
                            StatusCode::OK,
                        )),
                        _ => Ok::<_, Rejection>(reply::with_status(
                            reply::json(&ApiError {
                                message: "Failed to load connections".to_string(),
                            }),
                            StatusCode::INTERNAL_SERVER_ERROR,
                        )),
                    }
                }
            });

        // GET /stats -> aggregate statistics
        let stats = warp::path("stats")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let store = store_for_stats.clone();
                async move {
                    match tokio::task::spawn_blocking(move || store.stats()).await {
                        Ok(Ok(stats)) => Ok::<_, Rejection>(reply::with_status(
                            reply::json(&stats),
                            StatusCode::OK,
                        )),
                        _ => Ok::<_, Rejection>(reply::with_status(
                            reply::json(&ApiError {
                                message: "Failed to load statistics".to_string(),
                            }),
                            StatusCode::INTERNAL_SERVER_ERROR,
                        )),
                    }
                }
            });

        // GET /health -> liveness and schema version
        let health = warp::path("health")
            .and(warp::path::end())
            .and(warp::get())
            .and_then(move || {
                let store = store_for_health.clone();
                async move {
                    match tokio::task::spawn_blocking(move || store.schema_version()).await {
                        Ok(Ok(version)) => Ok::<_, Rejection>(reply::with_status(
                            reply::json(&HealthResponse {
                                status: "ok",
                                schema_version: version,
                            }),
                            StatusCode::OK,
                        )),
                        _ => Ok::<_, Rejection>(reply::with_status(
                            reply::json(&ApiError {
                                message: "Store unavailable".to_string(),
                            }),
                            StatusCode::SERVICE_UNAVAILABLE,
                        )),
                    }
                }
            });

        let routes = dashboard.or(connections).or(stats).or(health);
        let addr = SocketAddr::from(([0, 0, 0, 0], port));

        let (_bound, server) = warp::serve(routes)
            .try_bind_with_graceful_shutdown(addr, async move {
                let _ = shutdown_rx.changed().await;
            })
            .map_err(|e| WebError::BindFailed(e.to_string()))?;

        server.await;
        Ok(())
    }
}
