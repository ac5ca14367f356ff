//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt};
use tempfile::TempDir;
use tokio::sync::mpsc;

use braid_mock_server::config::Config;
use braid_mock_server::pipeline::{ChangePipeline, RawChange, CHANGE_QUEUE_CAPACITY};
use braid_mock_server::protocol::{FrameDecoder, UpdateFrame};
use braid_mock_server::routes;
use braid_mock_server::state::AppState;
use braid_mock_server::subscription::{SequentialIds, SubscriptionRegistry};

pub const WAIT: Duration = Duration::from_secs(5);

/// A server over a temporary resource directory
///
/// Changes are pushed into the pipeline by hand instead of through the
/// filesystem watcher.
pub struct TestApp {
    pub addr: SocketAddr,
    pub state: AppState,
    changes: mpsc::Sender<RawChange>,
    _dir: TempDir,
}

pub fn config_for(dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.resources.root_dir = dir.path().to_path_buf();
    config
}

pub fn test_state(config: Config) -> AppState {
    AppState::with_registry(
        config,
        SubscriptionRegistry::with_id_generator(SequentialIds::new()),
    )
    .unwrap()
}

impl TestApp {
    pub async fn spawn() -> Self {
        let dir = TempDir::new().unwrap();
        let state = test_state(config_for(&dir));

        let (changes, rx) = mpsc::channel(CHANGE_QUEUE_CAPACITY);
        ChangePipeline::new(state.store().clone(), Arc::new(state.dispatcher().clone()))
            .with_gate(state.change_gate().clone())
            .with_settle_delay(Duration::ZERO)
            .spawn(rx);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = routes::router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            changes,
            _dir: dir,
        }
    }

    pub fn path_of(&self, resource: &str) -> PathBuf {
        self.state
            .store()
            .root()
            .join(format!("{}.braid", resource.trim_start_matches('/')))
    }

    /// Write a resource file without announcing it
    pub fn write(&self, resource: &str, body: &str) {
        let path = self.path_of(resource);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, body).unwrap();
    }

    /// Write a resource file and push the change through the pipeline
    pub async fn change(&self, resource: &str, body: &str) {
        self.write(resource, body);
        self.changes
            .send(RawChange::write(self.path_of(resource)))
            .await
            .unwrap();
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn subscribe(&self, path: &str) -> Subscriber {
        Subscriber::connect(&self.url(path)).await
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Streaming client for one subscription
pub struct Subscriber {
    pub response_status: u16,
    pub response_headers: reqwest::header::HeaderMap,
    /// Every byte received so far
    pub raw: Vec<u8>,
    stream: ByteStream,
    decoder: FrameDecoder,
}

impl Subscriber {
    pub async fn connect(url: &str) -> Self {
        let response = reqwest::Client::new()
            .get(url)
            .header("Subscribe", "true")
            .send()
            .await
            .unwrap();

        Self {
            response_status: response.status().as_u16(),
            response_headers: response.headers().clone(),
            raw: Vec::new(),
            stream: Box::pin(response.bytes_stream()),
            decoder: FrameDecoder::new(),
        }
    }

    /// Wait for the next complete frame
    pub async fn next_frame(&mut self) -> UpdateFrame {
        tokio::time::timeout(WAIT, async {
            loop {
                if let Some(frame) = self.decoder.next_frame().unwrap() {
                    return frame;
                }
                let chunk = self
                    .stream
                    .next()
                    .await
                    .expect("subscription stream ended")
                    .unwrap();
                self.raw.extend_from_slice(&chunk);
                self.decoder.push(&chunk);
            }
        })
        .await
        .expect("timed out waiting for a frame")
    }

    /// Wait for the server to end the stream
    pub async fn wait_closed(&mut self) {
        tokio::time::timeout(WAIT, async {
            while let Some(chunk) = self.stream.next().await {
                if chunk.is_err() {
                    break;
                }
            }
        })
        .await
        .expect("timed out waiting for the stream to end")
    }
}
