//! API server setup and configuration.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::Request;
use ferry_engine::MediaGateway;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::api::routes;
use crate::error::Result;

/// Shared state handed to every route.
#[derive(Debug, Clone)]
pub struct AppState {
    pub gateway: MediaGateway,
}

impl AppState {
    pub fn new(gateway: MediaGateway) -> Self {
        Self { gateway }
    }
}

pub struct ApiServer {
    bind: SocketAddr,
    state: AppState,
    cancel_token: CancellationToken,
}

impl ApiServer {
    pub fn new(bind: SocketAddr, state: AppState) -> Self {
        Self {
            bind,
            state,
            cancel_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for graceful shutdown.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    /// Build the router with all middleware and routes.
    pub fn build_router(&self) -> Router {
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);

        routes::create_router(self.state.clone())
            .layer(cors)
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(|req: &Request| {
                        // Event streams stay open for the whole session.
                        if req.uri().path().ends_with("/events") {
                            Span::none()
                        } else {
                            let mut make_span = tower_http::trace::DefaultMakeSpan::new()
                                .level(tracing::Level::DEBUG);
                            use tower_http::trace::MakeSpan;
                            make_span.make_span(req)
                        }
                    })
                    .on_response(
                        |res: &axum::http::Response<_>, latency: Duration, span: &Span| {
                            if span.is_disabled() {
                                return;
                            }
                            let on_response = tower_http::trace::DefaultOnResponse::new()
                                .level(tracing::Level::DEBUG);
                            use tower_http::trace::OnResponse;
                            on_response.on_response(res, latency, span);
                        },
                    ),
            )
    }

    /// Start the server and run until the cancellation token fires.
    pub async fn run(&self) -> Result<()> {
        let router = self.build_router();
        let listener = TcpListener::bind(self.bind).await?;

        tracing::info!("API server listening on http://{}", listener.local_addr()?);

        let cancel_token = self.cancel_token.clone();
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                cancel_token.cancelled().await;
                tracing::info!("API server shutting down...");
            })
            .await?;

        Ok(())
    }
}
