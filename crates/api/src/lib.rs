//! Sensor Data Service
//!
//! In-memory mock of the driver monitoring backend: randomized drowsiness,
//! emotion, phone-use and heart-rate readings, an alert history and a
//! mood-based music player, served over axum.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod alerts;
pub mod config;
pub mod error;
pub mod metrics;
pub mod mock;
pub mod music;
pub mod routes;

pub use self::config::{LogFormat, ServiceConfig};
pub use error::ApiError;

use alerts::AlertStore;
use music::MusicPlayer;

/// Application state shared across handlers
pub struct AppState {
    pub alerts: AlertStore,
    pub music: MusicPlayer,
    pub metrics: Option<PrometheusHandle>,
    pub version: String,
    pub start_time: Instant,
}

pub type SharedState = Arc<RwLock<AppState>>;

impl AppState {
    pub fn new(config: &ServiceConfig, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            alerts: AlertStore::seeded(
                config.alert_history_capacity,
                &mut rand::thread_rng(),
                Utc::now(),
            ),
            music: MusicPlayer::new(),
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: Instant::now(),
        }
    }

    pub fn shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }
}

/// Create the application router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        .route("/api", get(routes::index))
        .route("/api/status", get(routes::status))
        .route(
            "/api/drowsiness",
            get(routes::sensors::get_drowsiness).post(routes::sensors::post_drowsiness),
        )
        .route(
            "/api/emotion",
            get(routes::sensors::get_emotion).post(routes::sensors::post_emotion),
        )
        .route(
            "/api/phone",
            get(routes::sensors::get_phone).post(routes::sensors::post_phone),
        )
        .route(
            "/api/heart-rate",
            get(routes::sensors::get_heart_rate).post(routes::sensors::post_heart_rate),
        )
        .route(
            "/api/alert",
            get(routes::alerts::list_alerts)
                .post(routes::alerts::create_alert)
                .put(routes::alerts::acknowledge_alert),
        )
        .route(
            "/api/music",
            get(routes::music::get_music).post(routes::music::control_music),
        )
        .route("/metrics", get(routes::metrics))
        .route_layer(middleware::from_fn(metrics::track_requests))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Initialize logging. `RUST_LOG` overrides the default `info` filter.
pub fn init_logging(format: LogFormat) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| anyhow::anyhow!(e))
}

/// Serve on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: SharedState, shutdown: F) -> std::io::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Run the server until Ctrl-C
pub async fn run_server(config: &ServiceConfig, metrics: Option<PrometheusHandle>) -> anyhow::Result<()> {
    let state = AppState::new(config, metrics).shared();
    let listener = TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    let addr: SocketAddr = listener.local_addr()?;

    info!("Sensor data service listening on {}", addr);
    serve(listener, state, async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
    })
    .await?;

    info!("Sensor data service stopped");
    Ok(())
}
