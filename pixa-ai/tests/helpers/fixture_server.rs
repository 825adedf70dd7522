//! In-process HTTP server serving model file fixtures
//!
//! Routes:
//! - `GET /files/:name`: whole body with Content-Length
//! - `GET /slow/:name`: chunked body, one small chunk per tick
//! - `GET /redirect/:name`: 307 to `/files/:name`
//! - anything else: 404

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

const SLOW_CHUNK_BYTES: usize = 1024;
const SLOW_CHUNK_DELAY: Duration = Duration::from_millis(25);

type Files = Arc<HashMap<String, Vec<u8>>>;

/// Deterministic file content of `len` bytes
pub fn fixture_bytes(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}

/// Fixture server bound to an ephemeral loopback port
pub struct FixtureServer {
    base_url: String,
    task: JoinHandle<()>,
}

impl FixtureServer {
    pub async fn start(files: Vec<(&str, Vec<u8>)>) -> Self {
        let files: Files = Arc::new(
            files
                .into_iter()
                .map(|(name, bytes)| (name.to_string(), bytes))
                .collect(),
        );

        let app = Router::new()
            .route("/files/:name", get(serve_file))
            .route("/slow/:name", get(serve_slow))
            .route("/redirect/:name", get(redirect))
            .with_state(files);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            task,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve_file(State(files): State<Files>, Path(name): Path<String>) -> Response {
    match files.get(&name) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn serve_slow(State(files): State<Files>, Path(name): Path<String>) -> Response {
    let Some(bytes) = files.get(&name) else {
        return StatusCode::NOT_FOUND.into_response();
    };

    let chunks: Vec<Vec<u8>> = bytes.chunks(SLOW_CHUNK_BYTES).map(<[u8]>::to_vec).collect();
    let stream = futures::stream::iter(chunks).then(|chunk| async move {
        tokio::time::sleep(SLOW_CHUNK_DELAY).await;
        Ok::<_, std::io::Error>(Bytes::from(chunk))
    });
    Body::from_stream(stream).into_response()
}

async fn redirect(Path(name): Path<String>) -> Redirect {
    Redirect::temporary(&format!("/files/{}", name))
}
