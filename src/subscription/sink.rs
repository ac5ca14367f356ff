//! Frame sinks
//!
//! A sink is the dispatcher's handle on one subscriber's connection. The
//! HTTP handler owns the receiving half and streams it as the response
//! body; when the client goes away the receiver is dropped and every
//! further write fails.
//!
//! Writes never wait. A subscriber whose queue is full is not keeping up
//! and gets evicted rather than holding up everyone else.

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// Sink write errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SinkError {
    #[error("Subscriber connection closed")]
    Closed,

    #[error("Subscriber queue is full")]
    Full,
}

/// Writable connection handle for encoded frames
pub trait FrameSink: Send + Sync {
    /// Queue one encoded frame without waiting
    fn send_frame(&self, frame: Bytes) -> Result<(), SinkError>;

    /// Whether the connection is known to be gone
    fn is_closed(&self) -> bool;

    /// End the connection from the server side
    fn close(&self) {}
}

/// Sink backed by a bounded channel into the response body
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Bytes>,
    closing: Arc<watch::Sender<bool>>,
}

impl ChannelSink {
    /// Create a sink and the receiver that feeds the response body
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closing, _) = watch::channel(false);
        (
            Self {
                tx,
                closing: Arc::new(closing),
            },
            rx,
        )
    }

    /// Resolves once the receiving side has been dropped
    pub async fn closed(&self) {
        self.tx.closed().await
    }

    /// Resolves once [`FrameSink::close`] has been called
    pub fn closing(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closing.subscribe();
        async move {
            let _ = rx.wait_for(|closing| *closing).await;
        }
    }
}

impl FrameSink for ChannelSink {
    fn send_frame(&self, frame: Bytes) -> Result<(), SinkError> {
        self.tx.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => SinkError::Full,
            mpsc::error::TrySendError::Closed(_) => SinkError::Closed,
        })
    }

    fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn close(&self) {
        self.closing.send_replace(true);
    }
}
