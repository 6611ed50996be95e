//! The user-facing client (spec.md §4.G): resolve a [`Target`], run the
//! client handshake over a fresh `TcpStream`, and hand back a [`Client`]
//! that forwards straight through to the underlying
//! [`tempest_session::Connection`].

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::broadcast;

use tempest_core::{DisconnectReason, TempestConfig};
use tempest_crypto::RsaKeypair;
use tempest_protocol::{Message, ProtocolDescriptor};
use tempest_session::{connect_client, Connection, Disconnected, MessageHandler, SessionHandle, SessionResult};
use tempest_types::SerializeContext;

use crate::error::ConnectError;
use crate::target::Target;

/// A connected Tempest client (spec.md §4.G). Cheap to clone, like the
/// [`Connection`] it wraps — every clone drives the same connection.
#[derive(Clone)]
pub struct Client {
    connection: Connection,
}

impl Client {
    /// Resolves `target`, opens a TCP connection, and runs the client
    /// handshake requesting `protocols` and authenticating with `auth_key`
    /// (spec.md §4.E, §4.G). `configure_context` registers application
    /// polymorphic types on the connection's [`SerializeContext`] before
    /// any frame is encoded or decoded.
    pub async fn connect(
        target: &Target,
        config: TempestConfig,
        auth_key: RsaKeypair,
        protocols: Vec<ProtocolDescriptor>,
        configure_context: impl FnOnce(&SerializeContext) + Send + 'static,
    ) -> Result<Self, ConnectError> {
        let addr = target.resolve().await?;
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        let connection = connect_client(stream, config, auth_key, protocols, configure_context).await?;
        tracing::info!(connection_id = connection.connection_id(), %target, "connected");
        Ok(Self { connection })
    }

    /// The connection id the server assigned during the handshake.
    #[must_use]
    pub fn connection_id(&self) -> u32 {
        self.connection.connection_id()
    }

    /// The negotiated protocol intersection this connection speaks.
    #[must_use]
    pub fn enabled_protocols(&self) -> &[ProtocolDescriptor] {
        self.connection.enabled_protocols()
    }

    /// The underlying session connection, for callers that need lower-level
    /// access than this facade exposes.
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    /// Registers `handler` for `(protocol_id, message_type)` (spec.md §6).
    pub fn register_handler(&self, protocol_id: u8, message_type: u16, handler: Arc<dyn MessageHandler>) {
        self.connection.register_handler(protocol_id, message_type, handler);
    }

    /// Sends `message`, assigning its `message_id` from the connection's
    /// monotonic counter (spec.md §4.F).
    pub fn send(&self, message: Box<dyn Message>) -> SessionResult<()> {
        self.connection.send(message)
    }

    /// Sends `message` and awaits a matching response within `timeout`
    /// (spec.md §4.F, §8 scenario 5/6).
    pub async fn send_for(&self, message: Box<dyn Message>, timeout: Duration) -> SessionResult<Box<dyn Message>> {
        self.connection.send_for(message, timeout).await
    }

    /// Begins disconnecting (spec.md §4.F). `now = false` sends a graceful
    /// `Disconnect` notice first; `now = true` tears down immediately.
    pub fn disconnect(&self, now: bool, reason: DisconnectReason) {
        self.connection.disconnect(now, reason);
    }

    /// Subscribes to this client's single `Disconnected` event (spec.md
    /// §4.G).
    #[must_use]
    pub fn subscribe_disconnected(&self) -> broadcast::Receiver<Disconnected> {
        self.connection.subscribe_disconnected()
    }

    /// Whether the connection has finished tearing down.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.connection.is_disconnected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempest_mock::{handshake_pair, HandshakeParty};
    use tempest_protocol::CONTROL_PROTOCOL_ID;

    fn keypair() -> RsaKeypair {
        RsaKeypair::generate(&mut rand::rngs::OsRng).expect("key generation")
    }

    #[tokio::test]
    async fn disconnect_is_observed_by_the_peer() {
        let descriptor = ProtocolDescriptor {
            id: CONTROL_PROTOCOL_ID,
            version: 1,
        };
        let (client_conn, server_conn) = handshake_pair(
            HandshakeParty {
                config: TempestConfig::default(),
                auth_key: keypair(),
            },
            HandshakeParty {
                config: TempestConfig::default(),
                auth_key: keypair(),
            },
            keypair(),
            1,
            vec![descriptor],
            |_| {},
            |_| {},
        )
        .await
        .expect("handshake");

        let client = Client { connection: client_conn };
        let mut server_disconnected = server_conn.subscribe_disconnected();

        let seen = Arc::new(AtomicBool::new(false));
        client.disconnect(true, DisconnectReason::Success);

        let event = tokio::time::timeout(Duration::from_secs(1), server_disconnected.recv())
            .await
            .expect("did not time out")
            .expect("disconnect event");
        seen.store(true, Ordering::SeqCst);
        assert!(matches!(event.reason, DisconnectReason::FailedUnknown | DisconnectReason::Success));
        assert!(seen.load(Ordering::SeqCst));
    }
}
