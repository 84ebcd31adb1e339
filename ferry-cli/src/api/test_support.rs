// In-process upstream media host and an app wired to it.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use ferry_engine::{DownloadEvent, EngineConfig, MediaGateway};
use futures::StreamExt;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::timeout;

use crate::api::routes;
use crate::api::server::AppState;

pub const WAIT: Duration = Duration::from_secs(5);

pub struct Upstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
}

impl Upstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

pub async fn spawn_upstream() -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/hls/index.m3u8", get(playlist))
        .route("/media/clip.mp4", get(clip))
        .route("/forbidden", get(|| async { StatusCode::FORBIDDEN }))
        .route("/files/{name}", get(file))
        .route("/stall.mp4", get(stall))
        .layer(middleware::from_fn_with_state(hits.clone(), count_hits));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream { addr, hits }
}

/// Router over a gateway that may reach `127.0.0.1`, downloading into a fresh temp dir.
pub fn test_app() -> (Router, AppState, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EngineConfig {
        allowed_hosts: vec!["127.0.0.1".into()],
        ..Default::default()
    };
    config.downloads.output_dir = dir.path().to_path_buf();
    config.downloads.progress_interval_ms = 1;

    let state = AppState::new(MediaGateway::new(&config).unwrap());
    (routes::create_router(state.clone()), state, dir)
}

pub fn build_query(pairs: &[(&str, &str)]) -> String {
    let mut ser = url::form_urlencoded::Serializer::new(String::new());
    for (k, v) in pairs {
        ser.append_pair(k, v);
    }
    ser.finish()
}

pub async fn wait_terminal(
    rx: &mut broadcast::Receiver<DownloadEvent>,
    episode_id: &str,
) -> DownloadEvent {
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if event.episode_id() == episode_id && event.is_terminal() => {
                    return event;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for terminal event")
}

async fn count_hits(State(hits): State<Arc<AtomicUsize>>, request: Request, next: Next) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn playlist() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/vnd.apple.mpegurl")],
        "#EXTM3U\n#EXTINF:4,\nseg0.ts\n#EXT-X-ENDLIST\n",
    )
}

async fn clip(headers: HeaderMap) -> impl IntoResponse {
    let mut out = HeaderMap::new();
    out.insert(header::CONTENT_TYPE, "video/mp4".parse().unwrap());
    out.insert(header::ACCEPT_RANGES, "bytes".parse().unwrap());
    out.insert(header::SET_COOKIE, "tracking=1".parse().unwrap());

    if headers.contains_key(header::RANGE) {
        out.insert(header::CONTENT_RANGE, "bytes 0-3/10".parse().unwrap());
        (StatusCode::PARTIAL_CONTENT, out, "0123")
    } else {
        (StatusCode::OK, out, "0123456789")
    }
}

async fn file(Path(name): Path<String>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "video/mp4")],
        format!("episode {name}"),
    )
}

/// Sends a first chunk and then never finishes the body.
async fn stall() -> impl IntoResponse {
    let body = futures::stream::once(async { Ok::<_, std::io::Error>(Bytes::from_static(b"HEAD")) })
        .chain(futures::stream::pending());
    (
        [
            (header::CONTENT_TYPE, "video/mp4"),
            (header::CONTENT_LENGTH, "1000000"),
        ],
        Body::from_stream(body),
    )
}
