//! Binds and serves the axum router (spec §6.3, §6.6).

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::http::routes::{router, AppState};

pub struct HttpServer {
    bind_addr: String,
    state: AppState,
}

impl HttpServer {
    pub fn new(bind_addr: String, state: AppState) -> Self {
        Self { bind_addr, state }
    }

    pub async fn run(self) -> Result<()> {
        let app = router(self.state).layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        );

        let addr: SocketAddr = self.bind_addr.parse().context("invalid bind address")?;
        let listener = TcpListener::bind(addr).await.context("failed to bind HTTP listener")?;
        info!(addr = %addr, "HTTP server listening");

        axum::serve(listener, app).await.context("HTTP server failed")?;
        Ok(())
    }
}
