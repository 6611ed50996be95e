//! `send_for`'s response correlator (spec.md §3's `ResponseManager`, §8's
//! timeout-sweep scenario): a `message_id -> pending completion` map plus a
//! `message_id -> deadline` table, drained by a periodic sweep task rather
//! than a per-slot timer so one `tokio::time::interval` covers every
//! in-flight request on a connection.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tempest_protocol::Message;
use tokio::sync::oneshot;

/// What a `send_for` future resolves to.
pub enum ResponseOutcome {
    /// A response with a matching `response_message_id` arrived in time.
    Response(Box<dyn Message>),
    /// `timeout_ms` elapsed with no matching response (spec.md §8 scenario
    /// 6) or the connection was torn down while the request was pending.
    Cancelled,
}

struct PendingSlot {
    sender: oneshot::Sender<ResponseOutcome>,
    deadline: Instant,
}

/// Pairs outgoing `send_for` requests with their eventual response by
/// `message_id` (spec.md §3). One instance per connection.
#[derive(Default)]
pub struct ResponseManager {
    pending: DashMap<u32, PendingSlot>,
    next_message_id: AtomicU32,
}

impl ResponseManager {
    /// Creates an empty manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next monotonic `message_id` for an outgoing message,
    /// wrapping at 2^31 per spec.md §3.
    pub fn next_message_id(&self) -> u32 {
        const WRAP: u32 = 1 << 31;
        self.next_message_id
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| Some((id + 1) % WRAP))
            .unwrap_or(0)
    }

    /// Registers a pending completion slot for `message_id`, due within
    /// `timeout`. Returns the receiving half of the future the caller of
    /// `send_for` awaits.
    pub fn register(&self, message_id: u32, timeout: Duration) -> oneshot::Receiver<ResponseOutcome> {
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(
            message_id,
            PendingSlot {
                sender,
                deadline: Instant::now() + timeout,
            },
        );
        receiver
    }

    /// Delivers an incoming response. If no slot is registered for
    /// `response_message_id` (already timed out, already delivered, or
    /// never requested), the response is dropped silently (spec.md §8
    /// scenario 6).
    pub fn complete(&self, response_message_id: u32, message: Box<dyn Message>) {
        if let Some((_, slot)) = self.pending.remove(&response_message_id) {
            let _ = slot.sender.send(ResponseOutcome::Response(message));
        }
    }

    /// Removes and cancels every slot whose deadline has passed. Called
    /// periodically by the connection's sweep task.
    pub fn sweep_expired(&self) {
        let now = Instant::now();
        let expired: Vec<u32> = self
            .pending
            .iter()
            .filter(|entry| entry.value().deadline <= now)
            .map(|entry| *entry.key())
            .collect();
        for message_id in expired {
            if let Some((_, slot)) = self.pending.remove(&message_id) {
                let _ = slot.sender.send(ResponseOutcome::Cancelled);
            }
        }
    }

    /// Cancels every pending slot unconditionally (spec.md §4.F's
    /// disconnect teardown: "drains/cancels pending responses").
    pub fn cancel_all(&self) {
        let ids: Vec<u32> = self.pending.iter().map(|entry| *entry.key()).collect();
        for message_id in ids {
            if let Some((_, slot)) = self.pending.remove(&message_id) {
                let _ = slot.sender.send(ResponseOutcome::Cancelled);
            }
        }
    }

    /// Cancels one specific pending slot, e.g. in response to an external
    /// cancel signal wired up by the caller of `send_for` (spec.md §5).
    pub fn cancel(&self, message_id: u32) {
        if let Some((_, slot)) = self.pending.remove(&message_id) {
            let _ = slot.sender.send(ResponseOutcome::Cancelled);
        }
    }

    /// Number of requests currently awaiting a response.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempest_protocol::control::Pong;

    #[test]
    fn message_ids_wrap_at_2_31() {
        let manager = ResponseManager::new();
        manager.next_message_id.store((1 << 31) - 1, Ordering::SeqCst);
        assert_eq!(manager.next_message_id(), (1 << 31) - 1);
        assert_eq!(manager.next_message_id(), 0);
    }

    #[tokio::test]
    async fn complete_delivers_to_the_matching_slot() {
        let manager = ResponseManager::new();
        let receiver = manager.register(7, Duration::from_secs(5));
        manager.complete(7, Box::new(Pong::new()));
        let outcome = receiver.await.unwrap();
        assert!(matches!(outcome, ResponseOutcome::Response(_)));
    }

    #[tokio::test]
    async fn complete_with_no_matching_slot_is_silently_ignored() {
        let manager = ResponseManager::new();
        // No panic, no registered receiver to deliver to.
        manager.complete(42, Box::new(Pong::new()));
        assert_eq!(manager.pending_count(), 0);
    }

    #[tokio::test]
    async fn sweep_cancels_past_deadline_slots() {
        let manager = ResponseManager::new();
        let receiver = manager.register(1, Duration::from_millis(0));
        tokio::time::sleep(Duration::from_millis(5)).await;
        manager.sweep_expired();
        let outcome = receiver.await.unwrap();
        assert!(matches!(outcome, ResponseOutcome::Cancelled));

        // A response for the same id that arrives after the sweep is
        // ignored: the slot is already gone (spec.md §8 scenario 6).
        manager.complete(1, Box::new(Pong::new()));
    }
}
