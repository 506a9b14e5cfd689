//! HTTP service exposing discounted products per source.
//!
//! Routes:
//! - `GET /products/:source_id` records for one source (throttled)
//! - `GET /products` every source at once, failures reported per source (throttled)
//! - `GET /sources` configured sources
//! - `GET /health` uptime and cache snapshot

mod handlers;
mod routes;
mod throttling;

pub use routes::create_router;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;

use crate::config::Settings;
use crate::models::SourceDescriptor;
use crate::pipeline::Pipeline;
use crate::throttle::RequestThrottle;

/// Public view of a configured source.
#[derive(Debug, Clone, Serialize)]
pub struct SourceSummary {
    pub id: String,
    pub name: String,
    pub strategy: &'static str,
    pub base_url: String,
}

impl From<&SourceDescriptor> for SourceSummary {
    fn from(descriptor: &SourceDescriptor) -> Self {
        Self {
            id: descriptor.id.clone(),
            name: descriptor.display_name().to_string(),
            strategy: descriptor.strategy.kind(),
            base_url: descriptor.base_url.clone(),
        }
    }
}

/// Shared state for the web server.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub throttle: Arc<RequestThrottle>,
    pub sources: Arc<Vec<SourceSummary>>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(pipeline: Pipeline, throttle: RequestThrottle, sources: Vec<SourceSummary>) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            throttle: Arc::new(throttle),
            sources: Arc::new(sources),
            started_at: Instant::now(),
        }
    }

    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let pipeline = Pipeline::from_settings(settings)?;
        let sources = settings.sources.iter().map(SourceSummary::from).collect();
        Ok(Self::new(
            pipeline,
            RequestThrottle::new(settings.throttle),
            sources,
        ))
    }
}

/// Start the web server.
pub async fn serve(settings: &Settings, bind: &str) -> anyhow::Result<()> {
    let state = AppState::from_settings(settings)?;
    let app = create_router(state);

    let addr: SocketAddr = bind.parse()?;
    tracing::info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
