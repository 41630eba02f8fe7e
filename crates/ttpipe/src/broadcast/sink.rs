use std::sync::Mutex;

use tokio::sync::mpsc;

/// Handle the hub assigns to a registered sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SinkId(pub(crate) u64);

impl std::fmt::Display for SinkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sink-{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    #[error("Client disconnected")]
    Disconnected,

    #[error("Sink already closed")]
    Closed,

    #[error("Failed to serialize event: {0}")]
    Serialize(String),
}

/// A client connection receiving serialized events.
///
/// `write` must not block: the hub calls it while holding its registry lock.
pub trait EventSink: Send + Sync {
    fn write(&self, payload: &str) -> Result<(), SinkError>;

    fn close(&self);
}

/// Sink backed by an unbounded channel; the receiving half feeds an HTTP
/// response stream. Closing drops the sender so the stream ends.
pub struct ChannelSink {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl ChannelSink {
    pub fn new() -> (std::sync::Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            std::sync::Arc::new(Self {
                tx: Mutex::new(Some(tx)),
            }),
            rx,
        )
    }
}

impl EventSink for ChannelSink {
    fn write(&self, payload: &str) -> Result<(), SinkError> {
        let guard = self.tx.lock().map_err(|_| SinkError::Closed)?;
        match guard.as_ref() {
            Some(tx) => tx
                .send(payload.to_string())
                .map_err(|_| SinkError::Disconnected),
            None => Err(SinkError::Closed),
        }
    }

    fn close(&self) {
        if let Ok(mut guard) = self.tx.lock() {
            guard.take();
        }
    }
}
