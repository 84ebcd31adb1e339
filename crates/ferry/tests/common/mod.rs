// Shared fixtures: an in-process upstream media host and a gateway pointed at it.
#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use axum::body::{Body, Bytes};
use axum::extract::{Path as UrlPath, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use ferry_engine::{DownloadConfig, DownloadEvent, EngineConfig, MediaGateway};
use futures::StreamExt;
use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tokio::time::timeout;

pub const MPEGURL: &str = "application/vnd.apple.mpegurl";
pub const CLIP_LEN: usize = 4096;
pub const TRICKLE_CHUNKS: usize = 40;
pub const TRICKLE_CHUNK_LEN: usize = 1024;
pub const WAIT: Duration = Duration::from_secs(5);

pub fn clip_bytes() -> Vec<u8> {
    (0..CLIP_LEN).map(|i| (i % 251) as u8).collect()
}

#[derive(Clone)]
struct UpstreamState {
    gate: Arc<Semaphore>,
}

pub struct Upstream {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    gate: Arc<Semaphore>,
}

impl Upstream {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests received so far, on any route.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Let `n` requests waiting on `/gated/*` respond.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }
}

pub async fn spawn_upstream() -> Upstream {
    let hits = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Semaphore::new(0));

    let app = Router::new()
        .route("/a/b/index.m3u8", get(relative_playlist))
        .route("/plain/index.m3u8", get(sniffed_playlist))
        .route("/binary/key.bin", get(binary))
        .route("/forbidden.m3u8", get(forbidden))
        .route("/media/clip.mp4", get(clip))
        .route("/cookies", get(echo_cookies))
        .route("/stall.mp4", get(stall))
        .route("/trickle.mp4", get(trickle))
        .route("/truncated.mp4", get(truncated))
        .route("/gated/{name}", get(gated))
        .route("/hls/master.m3u8", get(master_playlist))
        .route("/hls/locked.m3u8", get(locked_playlist))
        .route("/hls/720/{file}", get(rendition))
        .with_state(UpstreamState { gate: gate.clone() })
        .layer(middleware::from_fn_with_state(hits.clone(), count_hits));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Upstream { addr, hits, gate }
}

/// Gateway allowed to reach the local upstream, writing downloads into `dir`.
pub fn gateway(dir: &Path, tweak: impl FnOnce(&mut DownloadConfig)) -> MediaGateway {
    let mut config = EngineConfig {
        allowed_hosts: vec!["127.0.0.1".into()],
        ..Default::default()
    };
    config.downloads.output_dir = dir.to_path_buf();
    config.downloads.progress_interval_ms = 1;
    tweak(&mut config.downloads);
    MediaGateway::new(&config).expect("gateway")
}

/// Next event for `episode_id` matching `pred`, skipping everything else.
pub async fn wait_for(
    rx: &mut broadcast::Receiver<DownloadEvent>,
    episode_id: &str,
    pred: impl Fn(&DownloadEvent) -> bool,
) -> DownloadEvent {
    timeout(WAIT, async {
        loop {
            match rx.recv().await {
                Ok(event) if event.episode_id() == episode_id && pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn wait_terminal(
    rx: &mut broadcast::Receiver<DownloadEvent>,
    episode_id: &str,
) -> DownloadEvent {
    wait_for(rx, episode_id, DownloadEvent::is_terminal).await
}

async fn count_hits(State(hits): State<Arc<AtomicUsize>>, request: Request, next: Next) -> Response {
    hits.fetch_add(1, Ordering::SeqCst);
    next.run(request).await
}

async fn relative_playlist() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, MPEGURL)],
        "#EXTM3U\n#EXTINF:9,\nseg1.ts\n#EXTINF:8,\nseg2.ts\n#EXT-X-ENDLIST",
    )
}

async fn sniffed_playlist() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain")],
        "\u{FEFF}#EXTM3U\r\n#EXTINF:4,\r\nchunk.ts\r\n",
    )
}

async fn binary() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "application/octet-stream")],
        vec![0u8, 1, 2, 3],
    )
}

async fn forbidden() -> impl IntoResponse {
    (StatusCode::FORBIDDEN, "expired session")
}

fn parse_range(value: &str) -> Option<(usize, usize)> {
    let spec = value.strip_prefix("bytes=")?;
    let (start, end) = spec.split_once('-')?;
    Some((start.parse().ok()?, end.parse().ok()?))
}

async fn clip(headers: HeaderMap) -> Response {
    let body = clip_bytes();
    let mut out = HeaderMap::new();
    out.insert(header::CONTENT_TYPE, HeaderValue::from_static("video/mp4"));
    out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    out.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("https://upstream.example"),
    );
    out.insert(header::SET_COOKIE, HeaderValue::from_static("tracking=1"));

    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_range);
    match range {
        Some((start, end)) => {
            let end = end.min(CLIP_LEN - 1);
            out.insert(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes {start}-{end}/{CLIP_LEN}")).unwrap(),
            );
            (StatusCode::PARTIAL_CONTENT, out, body[start..=end].to_vec()).into_response()
        }
        None => (StatusCode::OK, out, body).into_response(),
    }
}

async fn echo_cookies(headers: HeaderMap) -> impl IntoResponse {
    headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// One chunk, then nothing until the client goes away.
async fn stall() -> Response {
    let first = futures::stream::once(async { Ok::<_, io::Error>(Bytes::from(vec![7u8; 8192])) });
    let stream = first.chain(futures::stream::pending());
    Response::builder()
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, "1000000")
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Known length, delivered in small chunks with a pause between each.
async fn trickle() -> Response {
    let stream = futures::stream::unfold(0usize, |sent| async move {
        if sent == TRICKLE_CHUNKS {
            return None;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
        Some((
            Ok::<_, io::Error>(Bytes::from(vec![1u8; TRICKLE_CHUNK_LEN])),
            sent + 1,
        ))
    });
    Response::builder()
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(
            header::CONTENT_LENGTH,
            (TRICKLE_CHUNKS * TRICKLE_CHUNK_LEN).to_string(),
        )
        .body(Body::from_stream(stream))
        .unwrap()
}

/// Sends a prefix, then breaks the connection.
async fn truncated() -> Response {
    let stream = futures::stream::unfold(0u8, |step| async move {
        match step {
            0 => Some((Ok(Bytes::from_static(b"PARTIAL")), 1)),
            1 => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                Some((Err(io::Error::other("upstream reset")), 2))
            }
            _ => None,
        }
    });
    Response::builder()
        .header(header::CONTENT_TYPE, "video/mp4")
        .header(header::CONTENT_LENGTH, "1000")
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn gated(State(state): State<UpstreamState>, UrlPath(name): UrlPath<String>) -> Response {
    if let Ok(permit) = state.gate.acquire().await {
        permit.forget();
    }
    (
        [(header::CONTENT_TYPE, "video/mp4")],
        format!("episode {name}").into_bytes(),
    )
        .into_response()
}

async fn master_playlist() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, MPEGURL)],
        "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=2000000\n720/index.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=800000\n480/index.m3u8\n",
    )
}

async fn locked_playlist() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, MPEGURL)],
        "#EXTM3U\n#EXT-X-KEY:METHOD=AES-128,URI=\"key.bin\"\n#EXTINF:4,\nseg0.ts\n#EXT-X-ENDLIST\n",
    )
}

async fn rendition(UrlPath(file): UrlPath<String>) -> Response {
    match file.as_str() {
        "index.m3u8" => (
            [(header::CONTENT_TYPE, MPEGURL)],
            "#EXTM3U\n#EXT-X-VERSION:7\n#EXT-X-TARGETDURATION:4\n#EXT-X-MAP:URI=\"init.mp4\"\n#EXTINF:4,\nseg0.m4s\n#EXTINF:4,\nseg1.m4s\n#EXT-X-ENDLIST\n",
        )
            .into_response(),
        "init.mp4" => b"INIT".to_vec().into_response(),
        "seg0.m4s" => b"SEG0".to_vec().into_response(),
        "seg1.m4s" => b"SEG1".to_vec().into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
