//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use super::middleware;
use super::routes::topics::TopicsApiState;
use super::routes::{health, topics};
use crate::core::CoreApp;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;

        // Clone shutdown before moving app
        let shutdown = app.shutdown.clone();

        let host = app.config.server.host.clone();
        let port = app.config.server.port;
        let addr = SocketAddr::new(host.parse()?, port);

        let state = TopicsApiState {
            topics: Arc::clone(&app.topics),
            shutdown_rx: shutdown.subscribe(),
        };

        let router = Router::new()
            .route("/health", get(health::health))
            .route("/{topic}/push", post(topics::push))
            .route(
                "/{topic}/subscribe",
                get(topics::subscribe).post(topics::subscribe),
            )
            .route("/{topic}/unsubscribe", post(topics::unsubscribe))
            .with_state(state)
            .fallback(middleware::handle_404)
            .layer(TraceLayer::new_for_http())
            .layer(middleware::cors());

        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}
