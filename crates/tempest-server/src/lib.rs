//! # Overview
//!
//! `tempest-server` is spec.md §4.G's server half: [`Server::start`] binds a
//! listening socket and spawns one server handshake per accepted
//! connection, surfacing each as a [`ConnectionMade`] event the application
//! may [`ConnectionMade::reject`]. [`ServerHandle::stop`] closes the
//! listener and disconnects every session accepted so far.
//!
//! As with `tempest-client`, this crate owns only the socket-level
//! bookkeeping — the handshake and session engine both live in
//! `tempest-session`.

mod connection_made;
mod server;

pub use connection_made::ConnectionMade;
pub use server::{ConnectionHandler, Server, ServerHandle};

pub use tempest_session::{Connection, Disconnected, MessageHandler, SessionHandle};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use tempest_client::{Client, Target};
    use tempest_core::TempestConfig;
    use tempest_crypto::RsaKeypair;
    use tempest_protocol::{ProtocolDescriptor, CONTROL_PROTOCOL_ID};

    fn keypair() -> RsaKeypair {
        RsaKeypair::generate(&mut rand::rngs::OsRng).expect("key generation")
    }

    #[tokio::test]
    async fn client_connects_and_server_observes_connection_made() {
        let made_count = Arc::new(AtomicU32::new(0));
        let counter = made_count.clone();

        let handle = Server::start(
            "127.0.0.1:0".parse().unwrap(),
            TempestConfig::default(),
            keypair(),
            keypair(),
            |_ctx| {},
            move |_event: &ConnectionMade| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .await
        .expect("server start");

        let target = Target::new("127.0.0.1", handle.local_addr().port());
        let client = Client::connect(
            &target,
            TempestConfig::default(),
            keypair(),
            vec![ProtocolDescriptor {
                id: CONTROL_PROTOCOL_ID,
                version: 1,
            }],
            |_ctx| {},
        )
        .await
        .expect("client connect");

        assert_eq!(client.enabled_protocols().len(), 1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(made_count.load(Ordering::SeqCst), 1);

        handle.stop();
    }
}
