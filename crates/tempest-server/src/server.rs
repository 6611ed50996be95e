//! The server acceptor (spec.md §4.G): listen, run the server handshake
//! for each inbound socket, and surface [`ConnectionMade`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use tempest_core::{DisconnectReason, TempestConfig};
use tempest_crypto::RsaKeypair;
use tempest_session::{accept_server, Connection, SessionHandle};
use tempest_types::SerializeContext;

use crate::connection_made::ConnectionMade;

/// Invoked once per accepted connection, after its handshake completes
/// (spec.md §4.G). Runs on the accept loop's task, so a handler that needs
/// to do real work should spawn it rather than block here — the same
/// contract `tempest_session::MessageHandler` documents.
pub trait ConnectionHandler: Send + Sync {
    /// Handles one newly-authenticated connection.
    fn handle(&self, event: &ConnectionMade);
}

impl<F> ConnectionHandler for F
where
    F: Fn(&ConnectionMade) + Send + Sync,
{
    fn handle(&self, event: &ConnectionMade) {
        self(event)
    }
}

/// A running server (spec.md §4.G). Dropping this handle does not stop the
/// server — call [`ServerHandle::stop`] explicitly, mirroring
/// [`tempest_session::Connection::disconnect`]'s explicit teardown.
pub struct ServerHandle {
    local_addr: std::net::SocketAddr,
    accept_task: JoinHandle<()>,
    connections: Arc<Mutex<Vec<Connection>>>,
}

impl ServerHandle {
    /// The address the listening socket is bound to.
    #[must_use]
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    /// Closes the listening socket and disconnects every connection
    /// accepted so far (spec.md §4.G: "`stop()` closes it and all accepted
    /// sessions").
    pub fn stop(&self) {
        self.accept_task.abort();
        let connections = std::mem::take(&mut *self.connections.lock().expect("connection list lock poisoned"));
        for connection in connections {
            connection.disconnect(true, DisconnectReason::Success);
        }
    }
}

/// The server-side acceptor builder (spec.md §4.G). Binds a listening
/// socket via [`Server::start`] and spawns one server handshake per
/// accepted connection.
pub struct Server;

impl Server {
    /// Binds `addr`, then accepts connections in a background task: each
    /// runs the server handshake with `auth_key`/`encryption_key`, and on
    /// success invokes `on_connection` with a [`ConnectionMade`] event the
    /// application may [`ConnectionMade::reject`] (spec.md §4.G).
    /// `configure_context` registers application polymorphic types on each
    /// connection's [`SerializeContext`] before any frame is (de)coded;
    /// called fresh per accepted connection since the `TypeMap` is
    /// per-connection (spec.md §3).
    pub async fn start<F, H>(
        addr: std::net::SocketAddr,
        config: TempestConfig,
        auth_key: RsaKeypair,
        encryption_key: RsaKeypair,
        configure_context: F,
        on_connection: H,
    ) -> std::io::Result<ServerHandle>
    where
        F: Fn(&SerializeContext) + Send + Sync + 'static,
        H: ConnectionHandler + 'static,
    {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let next_connection_id = Arc::new(AtomicU32::new(1));
        let connections: Arc<Mutex<Vec<Connection>>> = Arc::new(Mutex::new(Vec::new()));
        let configure_context = Arc::new(configure_context);
        let on_connection = Arc::new(on_connection);

        let accept_connections = connections.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let (stream, peer_addr) = match listener.accept().await {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        tracing::warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                stream.set_nodelay(true).ok();

                let config = config.clone();
                let auth_key = auth_key.clone();
                let encryption_key = encryption_key.clone();
                let connection_id = next_connection_id.fetch_add(1, Ordering::SeqCst);
                let configure_context = configure_context.clone();
                let on_connection = on_connection.clone();
                let connections = accept_connections.clone();

                tokio::spawn(async move {
                    accept_one(
                        stream,
                        peer_addr,
                        config,
                        auth_key,
                        encryption_key,
                        connection_id,
                        configure_context,
                        on_connection,
                        connections,
                    )
                    .await;
                });
            }
        });

        Ok(ServerHandle {
            local_addr,
            accept_task,
            connections,
        })
    }
}

#[allow(clippy::too_many_arguments)]
async fn accept_one<F, H>(
    stream: TcpStream,
    peer_addr: std::net::SocketAddr,
    config: TempestConfig,
    auth_key: RsaKeypair,
    encryption_key: RsaKeypair,
    connection_id: u32,
    configure_context: Arc<F>,
    on_connection: Arc<H>,
    connections: Arc<Mutex<Vec<Connection>>>,
) where
    F: Fn(&SerializeContext) + Send + Sync + 'static,
    H: ConnectionHandler + 'static,
{
    let configure = {
        let configure_context = configure_context.clone();
        move |ctx: &SerializeContext| configure_context(ctx)
    };

    match accept_server(stream, config, auth_key, encryption_key, connection_id, configure).await {
        Ok(connection) => {
            tracing::info!(connection_id, %peer_addr, "connection made");
            let event = ConnectionMade::new(connection.clone());
            on_connection.handle(&event);
            if event.is_rejected() {
                connection.disconnect(true, DisconnectReason::Success);
                return;
            }
            connections.lock().expect("connection list lock poisoned").push(connection);
        }
        Err(err) => {
            tracing::warn!(error = %err, %peer_addr, "handshake failed");
        }
    }
}
