//! Broadcast fan-out to live subscribers.
//!
//! The hub owns a registry of subscriber handles, each holding the sending
//! half of an unbounded channel. Frames are wrapped in an `Arc` once and the
//! pointer is cloned per subscriber, so a broadcast never copies the payload.
//! Delivery is best-effort: a send only fails when the receiving half is
//! gone, and such handles are pruned during the same pass without affecting
//! anyone else.

use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures_util::stream::Stream;
use tokio::sync::mpsc;

use crate::core::replay::ReplayCursor;
use crate::model::StreamFrame;

struct SubscriberHandle {
    id: usize,
    sender: mpsc::UnboundedSender<Arc<StreamFrame>>,
}

/// Registry of live subscribers plus the replay cursor used to seed new
/// arrivals with the current snapshot. The registry is shared with every
/// [`Subscription`] so a dropped one can remove itself.
pub struct BroadcastHub {
    cursor: Arc<ReplayCursor>,
    subscribers: Arc<Mutex<Vec<SubscriberHandle>>>,
    next_id: AtomicUsize,
}

impl BroadcastHub {
    pub fn new(cursor: Arc<ReplayCursor>) -> Self {
        Self {
            cursor,
            subscribers: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicUsize::new(1),
        }
    }

    /// Registers a new live subscriber.
    ///
    /// When the store has data, the current position is queued into the new
    /// channel as an `initial_data` frame before the handle joins the
    /// registry, so it is always the first frame the subscriber observes.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        if let Ok(position) = self.cursor.current() {
            let _ = tx.send(Arc::new(StreamFrame::initial(position.reading())));
        }

        let mut subscribers = self.subscribers.lock().expect("hub lock poisoned");
        subscribers.push(SubscriberHandle { id, sender: tx });
        log::info!("Subscriber {} joined ({} active)", id, subscribers.len());

        Subscription {
            id,
            registry: Arc::clone(&self.subscribers),
            receiver: rx,
        }
    }

    /// Queues the frame for every registered subscriber. Handles whose
    /// receiver is gone are removed in the same pass; their failure never
    /// reaches the caller or the remaining subscribers.
    pub fn broadcast(&self, frame: StreamFrame) {
        let frame = Arc::new(frame);
        let mut subscribers = self.subscribers.lock().expect("hub lock poisoned");
        subscribers.retain(|subscriber| match subscriber.sender.send(Arc::clone(&frame)) {
            Ok(()) => true,
            Err(_) => {
                log::debug!("Subscriber {} gone, pruning from hub", subscriber.id);
                false
            }
        });
    }

    /// Removes one subscriber. Calling it again for the same id, or for an
    /// already pruned one, is a no-op.
    pub fn unsubscribe(&self, id: usize) {
        deregister(&self.subscribers, id);
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().expect("hub lock poisoned").len()
    }
}

fn deregister(registry: &Mutex<Vec<SubscriberHandle>>, id: usize) {
    let mut subscribers = registry.lock().expect("hub lock poisoned");
    let before = subscribers.len();
    subscribers.retain(|s| s.id != id);
    if subscribers.len() < before {
        log::info!("Subscriber {} left ({} active)", id, subscribers.len());
    }
}

/// The receiving half handed to one live client.
///
/// Yields every frame the hub queues for this subscriber, and deregisters
/// itself on drop so an abandoned connection frees its registry slot.
pub struct Subscription {
    id: usize,
    registry: Arc<Mutex<Vec<SubscriberHandle>>>,
    receiver: mpsc::UnboundedReceiver<Arc<StreamFrame>>,
}

impl Subscription {
    pub fn id(&self) -> usize {
        self.id
    }

    /// Next queued frame; `None` once this subscriber has been removed from
    /// the hub and the backlog is drained.
    pub async fn recv(&mut self) -> Option<Arc<StreamFrame>> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Arc<StreamFrame>> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for Subscription {
    type Item = Arc<StreamFrame>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        deregister(&self.registry, self.id);
    }
}
