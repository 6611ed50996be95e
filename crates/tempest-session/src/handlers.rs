//! The `(protocol_id, message_type) -> ordered handler list` registry
//! (spec.md §3's `MessageHandler registry`) and the `SessionHandle` trait
//! handlers use to talk back to the connection that invoked them without
//! depending on its transport type.

use std::sync::Mutex;

use dashmap::DashMap;
use tempest_protocol::Message;

use crate::error::SessionResult;

/// What a registered handler sees: the fully-decoded message plus a handle
/// back to the connection it arrived on, so a handler can `send`/`send_for`
/// a reply without knowing whether the connection is backed by a
/// `TcpStream` or the in-process mock transport.
pub trait MessageHandler: Send + Sync {
    /// Invoked once per matching message, in registration order (spec.md
    /// §3, §5). Takes the message by reference since every handler
    /// registered for a key sees the same decoded instance. Must not block
    /// for long — offload real work to a spawned task if needed (spec.md
    /// §4.F).
    fn handle(&self, connection: &dyn SessionHandle, message: &dyn Message);
}

impl<F> MessageHandler for F
where
    F: Fn(&dyn SessionHandle, &dyn Message) + Send + Sync,
{
    fn handle(&self, connection: &dyn SessionHandle, message: &dyn Message) {
        self(connection, message)
    }
}

/// The transport-independent surface a connection exposes to application
/// code and to its own registered handlers (spec.md §6's public API
/// surface: `send`, `send_for`, `disconnect`, plus the connection id and
/// negotiated protocol set from spec.md §3's `Connection` data model).
pub trait SessionHandle: Send + Sync {
    /// The connection id the server assigned during the handshake.
    fn connection_id(&self) -> u32;

    /// Enqueues `message` for sending, assigning its `message_id` from the
    /// connection's monotonic counter. Fire-and-forget: failures surface as
    /// a `tracing::warn` rather than here, matching spec.md §7's "serializer
    /// failures surface only to the caller of send" for the common case
    /// where the caller does not hold a completion to fail.
    fn send(&self, message: Box<dyn Message>) -> SessionResult<()>;

    /// Sends `response` as a reply to `original`, setting
    /// `response_message_id`/`is_response` first (spec.md §4.F).
    fn send_response(&self, original: &dyn Message, response: Box<dyn Message>) -> SessionResult<()>;

    /// Begins a graceful (`now = false`) or immediate (`now = true`)
    /// disconnect (spec.md §4.F). Idempotent.
    fn disconnect(&self, now: bool, reason: tempest_core::DisconnectReason);
}

/// `(protocol_id, message_type) -> ordered handler list` (spec.md §3).
/// Each key's list lives behind its own `Mutex` so appending a handler for
/// one message type never contends with dispatch for another; dispatch
/// clones the `Arc`-backed list (handlers are `Arc<dyn MessageHandler>`) so
/// a handler registered mid-dispatch takes effect on the next receive, not
/// the one in progress (spec.md §3's "changes take effect on the next
/// receive").
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: DashMap<(u8, u16), Mutex<Vec<std::sync::Arc<dyn MessageHandler>>>>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `(protocol_id, message_type)`, appended
    /// after any already registered for the same key.
    pub fn register(&self, protocol_id: u8, message_type: u16, handler: std::sync::Arc<dyn MessageHandler>) {
        self.handlers
            .entry((protocol_id, message_type))
            .or_default()
            .lock()
            .expect("handler list lock poisoned")
            .push(handler);
    }

    /// Snapshots the handler list for `(protocol_id, message_type)`, or an
    /// empty vector if nothing is registered.
    #[must_use]
    pub fn handlers_for(&self, protocol_id: u8, message_type: u16) -> Vec<std::sync::Arc<dyn MessageHandler>> {
        self.handlers
            .get(&(protocol_id, message_type))
            .map(|list| list.lock().expect("handler list lock poisoned").clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempest_protocol::control::Pong;

    #[test]
    fn handlers_invoke_in_registration_order() {
        let registry = HandlerRegistry::new();
        let order = Arc::new(Mutex::new(Vec::new()));

        for tag in [1, 2, 3] {
            let order = order.clone();
            registry.register(
                1,
                2,
                Arc::new(move |_: &dyn SessionHandle, _: &dyn Message| {
                    order.lock().unwrap().push(tag);
                }),
            );
        }

        struct Noop;
        impl SessionHandle for Noop {
            fn connection_id(&self) -> u32 {
                0
            }
            fn send(&self, _: Box<dyn Message>) -> SessionResult<()> {
                Ok(())
            }
            fn send_response(&self, _: &dyn Message, _: Box<dyn Message>) -> SessionResult<()> {
                Ok(())
            }
            fn disconnect(&self, _: bool, _: tempest_core::DisconnectReason) {}
        }
        let handle = Noop;
        let called = AtomicUsize::new(0);
        let message = Pong::new();
        for handler in registry.handlers_for(1, 2) {
            handler.handle(&handle, &message);
            called.fetch_add(1, Ordering::SeqCst);
        }
        assert_eq!(called.load(Ordering::SeqCst), 3);
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn unregistered_key_yields_no_handlers() {
        let registry = HandlerRegistry::new();
        assert!(registry.handlers_for(9, 9).is_empty());
    }
}
