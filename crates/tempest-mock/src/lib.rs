//! # Overview
//!
//! `tempest-mock` is spec.md §4.I: an in-process loopback transport used by
//! tests instead of a real `TcpStream`. [`pair`] hands back two
//! `tokio::io::DuplexStream` halves wired directly to each other —
//! `tempest-session`'s handshake and session engine read/write against them
//! exactly as they would a socket, so the end-to-end scenarios in spec.md
//! §8 can run without binding a port.
//!
//! [`handshake_pair`] goes one step further and drives both sides of the
//! handshake concurrently over a fresh [`pair`], returning two already-
//! `Connected` [`tempest_session::Connection`]s — the shape every
//! `tempest-session`/`tempest-client`/`tempest-server` integration test in
//! this workspace builds on.

use tokio::io::DuplexStream;

use tempest_core::TempestConfig;
use tempest_crypto::RsaKeypair;
use tempest_protocol::ProtocolDescriptor;
use tempest_session::{accept_server, connect_client, Connection, HandshakeError};
use tempest_types::SerializeContext;

/// Default buffer size for [`pair`]; large enough that a handshake frame or
/// two never blocks waiting for the peer to drain.
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Creates two connected, in-process duplex halves (spec.md §4.I). Bytes
/// written to one half are readable from the other, with no socket, OS
/// buffer, or DNS resolution involved — the same contract a real
/// `TcpStream` pair gives `tempest-session`, minus the network.
#[must_use]
pub fn pair(buffer_size: usize) -> (DuplexStream, DuplexStream) {
    tokio::io::duplex(buffer_size)
}

/// Everything one side needs to drive its half of [`handshake_pair`].
pub struct HandshakeParty {
    /// Transport-wide configuration for this side.
    pub config: TempestConfig,
    /// This side's authentication keypair.
    pub auth_key: RsaKeypair,
}

/// Drives the client and server handshakes concurrently over a fresh
/// in-process [`pair`], registering application types on each side's
/// [`SerializeContext`] via `configure_client`/`configure_server` before any
/// frame — including the handshake's own — is encoded or decoded. Returns
/// `(client, server)` already past `Connected`, ready for `send`/`send_for`.
///
/// `server_encryption_key` is separate from `server.auth_key` because the
/// handshake uses two distinct server keypairs (spec.md §4.E #2: one signs
/// `AcknowledgeConnect`, the other decrypts the client's AES key in
/// `FinalConnect`).
#[allow(clippy::too_many_arguments)]
pub async fn handshake_pair(
    client: HandshakeParty,
    server: HandshakeParty,
    server_encryption_key: RsaKeypair,
    connection_id: u32,
    protocols: Vec<ProtocolDescriptor>,
    configure_client: impl FnOnce(&SerializeContext) + Send + 'static,
    configure_server: impl FnOnce(&SerializeContext) + Send + 'static,
) -> Result<(Connection, Connection), HandshakeError> {
    let (client_half, server_half) = pair(DEFAULT_BUFFER_SIZE);

    let client_fut = connect_client(client_half, client.config, client.auth_key, protocols, configure_client);
    let server_fut = accept_server(
        server_half,
        server.config,
        server.auth_key,
        server_encryption_key,
        connection_id,
        configure_server,
    );

    tokio::try_join!(client_fut, server_fut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use tempest_protocol::{Header, Message, Protocol, Protocols, CONTROL_PROTOCOL_ID};
    use tempest_session::{MessageHandler, SessionHandle};
    use tempest_types::{SerializeContext, SerializeResult};
    use tempest_wire::{FrameReader, FrameWriter};

    fn keypair() -> RsaKeypair {
        RsaKeypair::generate(&mut rand::rngs::OsRng).expect("key generation")
    }

    const BIG_PROTOCOL_ID: u8 = 250;
    const BIG_MESSAGE_TYPE: u16 = 1;

    /// An application message carrying an arbitrary byte blob, used only to
    /// drive a payload past `max_message_length` and prove the `Partial`
    /// fragmentation/reassembly path delivers it intact end to end (spec.md
    /// §4.D, §8 scenario 5-style).
    #[derive(Default)]
    struct BigPayload {
        header: Header,
        data: Vec<u8>,
    }

    impl Message for BigPayload {
        fn protocol_id(&self) -> u8 {
            BIG_PROTOCOL_ID
        }
        fn message_type(&self) -> u16 {
            BIG_MESSAGE_TYPE
        }
        fn header(&self) -> &Header {
            &self.header
        }
        fn header_mut(&mut self) -> &mut Header {
            &mut self.header
        }
        fn authenticated(&self) -> bool {
            true
        }
        fn encrypted(&self) -> bool {
            true
        }
        fn write_payload(&self, _ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
            writer.write_bytes(&self.data);
            Ok(())
        }
        fn read_payload(&mut self, _ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<()> {
            self.data = reader.read_bytes()?;
            Ok(())
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn ensure_big_protocol_registered() {
        static INIT: std::sync::Once = std::sync::Once::new();
        INIT.call_once(|| {
            let protocol = Protocol::new(BIG_PROTOCOL_ID, 1).register(BIG_MESSAGE_TYPE, || Box::new(BigPayload::default()));
            Protocols::register(protocol).expect("register big protocol");
        });
    }

    #[tokio::test]
    async fn handshake_pair_yields_two_connected_sides() {
        let descriptor = ProtocolDescriptor {
            id: CONTROL_PROTOCOL_ID,
            version: 1,
        };
        let (client, server) = handshake_pair(
            HandshakeParty {
                config: TempestConfig::default(),
                auth_key: keypair(),
            },
            HandshakeParty {
                config: TempestConfig::default(),
                auth_key: keypair(),
            },
            keypair(),
            7,
            vec![descriptor],
            |_ctx| {},
            |_ctx| {},
        )
        .await
        .expect("handshake");

        assert_eq!(client.connection_id(), 7);
        assert_eq!(server.connection_id(), 7);
        assert!(!client.is_disconnected());
        assert!(!server.is_disconnected());
    }

    #[tokio::test]
    async fn oversize_message_is_fragmented_and_delivered_intact() {
        ensure_big_protocol_registered();

        // Small enough that a several-kilobyte payload must be split into
        // multiple `Partial` fragments, each of which must itself still fit
        // under this same cap once wrapped in its own frame.
        let config = TempestConfig::builder().max_message_length(600).build();
        let control = ProtocolDescriptor {
            id: CONTROL_PROTOCOL_ID,
            version: 1,
        };
        let big = ProtocolDescriptor {
            id: BIG_PROTOCOL_ID,
            version: 1,
        };

        let (client, server) = handshake_pair(
            HandshakeParty {
                config,
                auth_key: keypair(),
            },
            HandshakeParty {
                config,
                auth_key: keypair(),
            },
            keypair(),
            1,
            vec![control, big],
            |_ctx| {},
            |_ctx| {},
        )
        .await
        .expect("handshake");

        let received: Arc<Mutex<Option<Vec<u8>>>> = Arc::new(Mutex::new(None));
        let received_for_handler = received.clone();
        server.register_handler(
            BIG_PROTOCOL_ID,
            BIG_MESSAGE_TYPE,
            Arc::new(move |_: &dyn SessionHandle, message: &dyn Message| {
                if let Some(big) = message.as_any().downcast_ref::<BigPayload>() {
                    *received_for_handler.lock().expect("received lock poisoned") = Some(big.data.clone());
                }
            }) as Arc<dyn MessageHandler>,
        );

        let payload: Vec<u8> = (0..5_000u32).map(|i| (i % 256) as u8).collect();
        let mut message = BigPayload::default();
        message.data = payload.clone();
        client.send(Box::new(message)).expect("send");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(data) = received.lock().expect("received lock poisoned").clone() {
                assert_eq!(data, payload);
                return;
            }
            assert!(tokio::time::Instant::now() < deadline, "oversize message was never delivered");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
