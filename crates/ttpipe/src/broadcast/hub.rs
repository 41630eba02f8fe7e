//! Fan-out of processing events to every client watching a document.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, warn};

use crate::broadcast::event::ProcessingEvent;
use crate::broadcast::sink::{EventSink, SinkError, SinkId};

struct Registered {
    id: SinkId,
    sink: Arc<dyn EventSink>,
}

struct HubInner {
    sinks: Mutex<HashMap<String, Vec<Registered>>>,
    next_id: AtomicU64,
    close_grace: Duration,
}

impl HubInner {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Registered>>> {
        // A panic while holding the lock leaves the map consistent; keep going
        self.sinks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn close_document(&self, document_id: &str) {
        let removed = self.lock().remove(document_id);
        if let Some(registered) = removed {
            debug!(
                "Closing {} sink(s) for document {}",
                registered.len(),
                document_id
            );
            for entry in registered {
                entry.sink.close();
            }
        }
    }
}

/// Registry of live sinks keyed by document id.
///
/// Cloning is cheap and every clone shares the same registry.
#[derive(Clone)]
pub struct BroadcastHub {
    inner: Arc<HubInner>,
}

impl BroadcastHub {
    pub fn new(close_grace: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                sinks: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                close_grace,
            }),
        }
    }

    /// Registers `sink` for `document_id` and writes the `connected` event to
    /// it before anything else. A sink that cannot take that first write is
    /// not registered.
    pub fn subscribe(
        &self,
        document_id: &str,
        sink: Arc<dyn EventSink>,
    ) -> Result<SinkId, SinkError> {
        let hello = ProcessingEvent::connected(document_id)
            .to_json()
            .map_err(|e| SinkError::Serialize(e.to_string()))?;

        let id = SinkId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let mut sinks = self.inner.lock();
        sink.write(&hello)?;
        sinks
            .entry(document_id.to_string())
            .or_default()
            .push(Registered { id, sink });

        debug!("Subscribed {} to document {}", id, document_id);
        Ok(id)
    }

    /// Removes one sink. Unknown ids are ignored.
    pub fn unsubscribe(&self, document_id: &str, id: SinkId) {
        let mut sinks = self.inner.lock();
        if let Some(registered) = sinks.get_mut(document_id) {
            registered.retain(|entry| entry.id != id);
            if registered.is_empty() {
                sinks.remove(document_id);
            }
            debug!("Unsubscribed {} from document {}", id, document_id);
        }
    }

    /// Delivers `event` to every sink of `document_id`, in registration
    /// order. Sinks whose write fails are dropped on the spot. A terminal
    /// event schedules the document's remaining sinks to close after the
    /// grace period.
    pub fn emit(&self, document_id: &str, event: &ProcessingEvent) {
        let payload = match event.to_json() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping {} event for {}: {}", event.kind(), document_id, e);
                return;
            }
        };

        {
            let mut sinks = self.inner.lock();
            let Some(registered) = sinks.get_mut(document_id) else {
                debug!("No subscribers for document {}; {} event dropped", document_id, event.kind());
                return;
            };

            registered.retain(|entry| match entry.sink.write(&payload) {
                Ok(()) => true,
                Err(e) => {
                    debug!("Evicting {} from document {}: {}", entry.id, document_id, e);
                    false
                }
            });
            if registered.is_empty() {
                sinks.remove(document_id);
            }
        }

        if event.is_terminal() {
            self.schedule_close(document_id);
        }
    }

    fn schedule_close(&self, document_id: &str) {
        let inner = Arc::clone(&self.inner);
        let document_id = document_id.to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(inner.close_grace).await;
                    inner.close_document(&document_id);
                });
            }
            Err(_) => inner.close_document(&document_id),
        }
    }

    pub fn sink_count(&self, document_id: &str) -> usize {
        self.inner.lock().get(document_id).map_or(0, Vec::len)
    }

    pub fn total_sinks(&self) -> usize {
        self.inner.lock().values().map(Vec::len).sum()
    }

    pub fn document_count(&self) -> usize {
        self.inner.lock().len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000))
    }
}
