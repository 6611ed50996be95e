//! The running session engine (spec.md §4.F): a live connection is four
//! cooperating tasks (writer, reader, dispatcher, keepalive) plus a periodic
//! response sweep, all sharing one reference-counted [`Shared`] state block.
//! [`Connection`] itself is a cheap `Arc` handle to that block — cloning it
//! is how the writer/reader/dispatcher/keepalive tasks and the application's
//! own copy all see the same connection.
//!
//! The handshake (spec.md §4.E) runs to completion *before* any of these
//! tasks exist: [`connect_client`]/[`accept_server`] drive
//! [`crate::handshake::ClientHandshake`]/[`crate::handshake::ServerHandshake`]
//! directly against the raw stream, then hand the now-authenticated
//! connection off to [`spawn_connection`].

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{broadcast, mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use tempest_core::{DisconnectReason, TempestConfig};
use tempest_crypto::{HashAlgorithm, RsaKeypair, RsaPublicOnly, SessionCrypto};
use tempest_frame::{
    split_into_fragments, BufferPool, DecodedFrame, FragmentReassembler, FrameCodec, Signer,
    FRAGMENT_FRAME_OVERHEAD,
};
use tempest_protocol::control::{Disconnect, Partial, Ping, Pong, DISCONNECT, PARTIAL, PING, PONG};
use tempest_protocol::{Message, ProtocolDescriptor, CONTROL_PROTOCOL_ID};
use tempest_types::SerializeContext;

use crate::error::{HandshakeError, HandshakeResult, SessionError, SessionResult};
use crate::events::Disconnected;
use crate::handlers::{HandlerRegistry, MessageHandler, SessionHandle};
use crate::handshake::{ClientHandshake, HandshakeAction, HandshakeOutcome, ServerHandshake};
use crate::response::{ResponseManager, ResponseOutcome};

/// How long to give a best-effort graceful `Disconnect` to reach the writer
/// and go out before the socket is closed out from under it.
const GRACEFUL_DISCONNECT_LINGER: Duration = Duration::from_millis(200);
/// Cadence of the `send_for` deadline sweep, independent of the keepalive
/// period so a short `send_for` timeout is not held hostage by a long
/// `ping_interval`.
const RESPONSE_SWEEP_INTERVAL: Duration = Duration::from_millis(500);
/// Socket read chunk size for both the handshake and the steady-state
/// reader loop.
const READ_CHUNK_SIZE: usize = 16 * 1024;
/// Fallback sleep while keepalive is disabled (`ping_interval_ms == 0`), so
/// the task still wakes up periodically to notice a disconnect.
const KEEPALIVE_DISABLED_POLL: Duration = Duration::from_secs(1);

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Where a connection is in its lifecycle (spec.md §4.F). The handshake
/// phases live entirely in [`ClientHandshake`]/[`ServerHandshake`] and never
/// reach a [`Connection`] — by construction time the connection is already
/// `Connected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connected,
    Disconnecting,
    Disconnected,
}

/// A unit of work for the writer task. A plain channel (rather than calling
/// the socket directly from `send`) is what makes `send`/`disconnect`
/// synchronous, fire-and-forget calls usable from any context, including a
/// synchronous [`MessageHandler`] (spec.md §4.F, §5).
enum OutboundJob {
    Send(Box<dyn Message>),
    Shutdown,
}

struct Shared {
    connection_id: u32,
    enabled_protocols: Vec<ProtocolDescriptor>,
    peer_auth_key: RsaPublicOnly,
    config: TempestConfig,
    outbound: mpsc::UnboundedSender<OutboundJob>,
    response_manager: ResponseManager,
    handlers: HandlerRegistry,
    state: StdMutex<ConnectionState>,
    last_received_ms: AtomicI64,
    ping_interval_ms: AtomicU64,
    disconnect_started: AtomicBool,
    disconnected_tx: broadcast::Sender<Disconnected>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

/// A live, authenticated connection (spec.md §3, §4.F). Cheap to clone —
/// every clone shares the same underlying state and outbound channel, which
/// is how the background tasks and the application's own handle stay in
/// sync without a central owner.
#[derive(Clone)]
pub struct Connection(Arc<Shared>);

impl Connection {
    /// The connection id the server assigned during the handshake.
    #[must_use]
    pub fn connection_id(&self) -> u32 {
        self.0.connection_id
    }

    /// The negotiated protocol intersection this connection speaks.
    #[must_use]
    pub fn enabled_protocols(&self) -> &[ProtocolDescriptor] {
        &self.0.enabled_protocols
    }

    /// The peer's authentication public key, established during the
    /// handshake, for any out-of-band verification the application wants to
    /// layer on top (spec.md §4.E #4).
    #[must_use]
    pub fn peer_auth_key(&self) -> &RsaPublicOnly {
        &self.0.peer_auth_key
    }

    /// Whether teardown has finished and every background task has wound
    /// down.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        *self.0.state.lock().expect("connection state lock poisoned") == ConnectionState::Disconnected
    }

    /// Registers `handler` for `(protocol_id, message_type)` on this
    /// connection (spec.md §3, §5).
    pub fn register_handler(&self, protocol_id: u8, message_type: u16, handler: Arc<dyn MessageHandler>) {
        self.0.handlers.register(protocol_id, message_type, handler);
    }

    /// Subscribes to this connection's single [`Disconnected`] event. Safe
    /// to call after the connection has already gone down — the broadcast
    /// channel is sized for exactly one send, so a late subscriber still
    /// misses nothing that matters once it starts awaiting.
    #[must_use]
    pub fn subscribe_disconnected(&self) -> broadcast::Receiver<Disconnected> {
        self.0.disconnected_tx.subscribe()
    }

    /// Sends `message` and awaits a reply whose `response_message_id`
    /// matches the `message_id` assigned here, or [`SessionError::TimedOut`]
    /// if none arrives within `timeout` (spec.md §3, §8 scenario 6).
    pub async fn send_for(&self, mut message: Box<dyn Message>, timeout: Duration) -> SessionResult<Box<dyn Message>> {
        self.check_sendable(message.as_ref())?;
        message.header_mut().connection_id = self.0.connection_id;
        let message_id = self.0.response_manager.next_message_id();
        message.header_mut().message_id = message_id;
        let receiver = self.0.response_manager.register(message_id, timeout);
        self.0
            .outbound
            .send(OutboundJob::Send(message))
            .map_err(|_| SessionError::AlreadyDisconnected)?;
        match receiver.await {
            Ok(ResponseOutcome::Response(response)) => Ok(response),
            Ok(ResponseOutcome::Cancelled) => Err(SessionError::TimedOut),
            Err(_) => Err(SessionError::Cancelled),
        }
    }

    fn check_sendable(&self, message: &dyn Message) -> SessionResult<()> {
        if *self.0.state.lock().expect("connection state lock poisoned") != ConnectionState::Connected {
            return Err(SessionError::AlreadyDisconnected);
        }
        if self.0.config.require_encryption() && !(message.encrypted() && message.authenticated()) {
            return Err(SessionError::EncryptionRequired);
        }
        Ok(())
    }

    /// Enqueues `message` with no disconnect/policy checks — used for the
    /// engine's own best-effort `Disconnect` notice, which must still go out
    /// even though the connection is already marked `Disconnecting`.
    fn send_raw(&self, mut message: Box<dyn Message>) -> SessionResult<()> {
        message.header_mut().connection_id = self.0.connection_id;
        message.header_mut().message_id = self.0.response_manager.next_message_id();
        self.0
            .outbound
            .send(OutboundJob::Send(message))
            .map_err(|_| SessionError::AlreadyDisconnected)
    }

    fn send_impl(&self, message: Box<dyn Message>) -> SessionResult<()> {
        self.check_sendable(message.as_ref())?;
        self.send_raw(message)
    }

    fn send_response_impl(&self, original: &dyn Message, mut response: Box<dyn Message>) -> SessionResult<()> {
        response.header_mut().response_message_id = Some(original.header().message_id);
        self.send_impl(response)
    }

    fn handle_control_message(&self, message: Box<dyn Message>) {
        match message.message_type() {
            PING => {
                if let Some(ping) = message.as_any().downcast_ref::<Ping>() {
                    if ping.interval_ms > 0 {
                        self.0.ping_interval_ms.store(u64::from(ping.interval_ms), Ordering::SeqCst);
                    }
                }
                let _ = self.send_impl(Box::new(Pong::new()));
            }
            PONG | PARTIAL => {
                // Pong only needed to reset `last_received`, already done by
                // the dispatcher for every frame. A `Partial` reaching here
                // means the reader already reassembled it into its real
                // message type, so this arm should be unreachable in
                // practice; ignored defensively rather than treated as a
                // protocol violation.
            }
            DISCONNECT => {
                if let Some(disconnect) = message.as_any().downcast_ref::<Disconnect>() {
                    let reason = DisconnectReason::from_wire(disconnect.reason_code, disconnect.custom.clone());
                    self.begin_teardown(true, false, reason);
                }
            }
            _ => {
                tracing::debug!(message_type = message.message_type(), "unhandled control message");
            }
        }
    }

    fn begin_teardown(&self, now: bool, requested: bool, reason: DisconnectReason) {
        if self.0.disconnect_started.swap(true, Ordering::SeqCst) {
            return;
        }
        *self.0.state.lock().expect("connection state lock poisoned") = ConnectionState::Disconnecting;
        let this = self.clone();
        tokio::spawn(async move {
            this.teardown(now, requested, reason).await;
        });
    }

    async fn teardown(&self, now: bool, requested: bool, reason: DisconnectReason) {
        if !now {
            let mut disconnect = Disconnect::new();
            disconnect.reason_code = reason.wire_code();
            if let DisconnectReason::Custom(text) = &reason {
                disconnect.custom = Some(text.clone());
            }
            if self.send_raw(Box::new(disconnect)).is_ok() {
                tokio::time::sleep(GRACEFUL_DISCONNECT_LINGER).await;
            }
        }
        let _ = self.0.outbound.send(OutboundJob::Shutdown);
        self.0.response_manager.cancel_all();

        let tasks = std::mem::take(&mut *self.0.tasks.lock().expect("task list lock poisoned"));
        for task in tasks {
            task.abort();
        }

        *self.0.state.lock().expect("connection state lock poisoned") = ConnectionState::Disconnected;
        let _ = self.0.disconnected_tx.send(Disconnected { requested, reason });
    }
}

impl SessionHandle for Connection {
    fn connection_id(&self) -> u32 {
        self.0.connection_id
    }

    fn send(&self, message: Box<dyn Message>) -> SessionResult<()> {
        self.send_impl(message)
    }

    fn send_response(&self, original: &dyn Message, response: Box<dyn Message>) -> SessionResult<()> {
        self.send_response_impl(original, response)
    }

    fn disconnect(&self, now: bool, reason: DisconnectReason) {
        self.begin_teardown(now, true, reason);
    }
}

/// Drives a handshake state machine to completion against a raw (not yet
/// split) stream, sending whatever each [`HandshakeAction`] asks for and
/// reading one frame at a time in between (spec.md §4.E). Shared between
/// [`connect_client`] and [`accept_server`] — the only difference between
/// the two sides is the initial action and how incoming frames are fed
/// back in, both supplied by the caller.
async fn run_handshake_loop<S>(
    stream: &mut S,
    codec: &mut FrameCodec,
    recv_buf: &mut BytesMut,
    auth_key: &RsaKeypair,
    mut action: HandshakeAction,
    mut receive: impl FnMut(DecodedFrame) -> HandshakeAction,
) -> HandshakeResult<HandshakeOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        action = match action {
            HandshakeAction::Send {
                message,
                signer,
                install_session_crypto,
            } => {
                send_handshake_message(stream, codec, auth_key, message, signer, install_session_crypto).await?;
                HandshakeAction::AwaitIncoming
            }
            HandshakeAction::SendThenComplete {
                message,
                signer,
                install_session_crypto,
                outcome,
            } => {
                send_handshake_message(stream, codec, auth_key, message, signer, install_session_crypto).await?;
                return Ok(*outcome);
            }
            HandshakeAction::Complete(outcome) => return Ok(outcome),
            HandshakeAction::Fail(err) => {
                send_handshake_disconnect(stream, codec, auth_key, &err).await;
                return Err(err);
            }
            HandshakeAction::AwaitIncoming => {
                let frame = read_handshake_frame(stream, codec, recv_buf).await?;
                if let Some(disconnect) = frame.message.as_any().downcast_ref::<Disconnect>() {
                    return Err(HandshakeError::PeerDisconnected(DisconnectReason::from_wire(
                        disconnect.reason_code,
                        disconnect.custom.clone(),
                    )));
                }
                receive(frame)
            }
        };
    }
}

/// Best-effort notification of a local handshake failure (spec.md §4.E:
/// "the server sends `Disconnect(reason)` and closes"). Sent in plaintext
/// since no session key exists this early; the send result is ignored
/// since the stream may already be the reason the handshake failed.
async fn send_handshake_disconnect<S>(stream: &mut S, codec: &mut FrameCodec, auth_key: &RsaKeypair, err: &HandshakeError)
where
    S: AsyncWrite + Unpin,
{
    let reason = err.disconnect_reason();
    let mut disconnect = Disconnect::new();
    disconnect.plaintext = true;
    disconnect.reason_code = reason.wire_code();
    if let DisconnectReason::Custom(text) = &reason {
        disconnect.custom = Some(text.clone());
    }
    let _ = send_handshake_message(stream, codec, auth_key, Box::new(disconnect), None, None).await;
}

async fn send_handshake_message<S>(
    stream: &mut S,
    codec: &mut FrameCodec,
    auth_key: &RsaKeypair,
    mut message: Box<dyn Message>,
    signer_meta: Option<(HashAlgorithm, &'static str)>,
    install_session_crypto: Option<SessionCrypto>,
) -> HandshakeResult<()>
where
    S: AsyncWrite + Unpin,
{
    let needs_session_signer = message.encrypted() || message.authenticated();
    let signer = match (signer_meta, &install_session_crypto) {
        (Some((algorithm, _role)), _) => Signer::Asymmetric { key: auth_key, algorithm },
        (None, Some(crypto)) if needs_session_signer => Signer::Session(crypto),
        (None, _) => Signer::None,
    };
    let bytes = codec.encode_frame(message.as_mut(), &signer)?;
    stream.write_all(&bytes).await?;
    if let Some(crypto) = install_session_crypto {
        codec.install_session_crypto(crypto);
    }
    Ok(())
}

async fn read_handshake_frame<S>(
    stream: &mut S,
    codec: &mut FrameCodec,
    recv_buf: &mut BytesMut,
) -> HandshakeResult<DecodedFrame>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        if let Some(frame) = codec.decode(recv_buf)? {
            return Ok(frame);
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(HandshakeError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "peer closed the connection during the handshake",
            )));
        }
        recv_buf.extend_from_slice(&chunk[..n]);
    }
}

/// Performs the client side of the handshake (spec.md §4.E) over `stream`,
/// then spawns the session engine and returns the resulting [`Connection`].
/// `configure_context` registers application polymorphic types on the
/// connection's [`SerializeContext`] before any frame — including the
/// handshake's own — is encoded or decoded.
pub async fn connect_client<S>(
    mut stream: S,
    config: TempestConfig,
    auth_key: RsaKeypair,
    protocols: Vec<ProtocolDescriptor>,
    configure_context: impl FnOnce(&SerializeContext),
) -> HandshakeResult<Connection>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ctx = SerializeContext::new();
    configure_context(&ctx);
    let mut codec = FrameCodec::new(ctx, config.max_message_length());
    let mut recv_buf = BytesMut::new();

    let mut machine = ClientHandshake::new(auth_key.clone(), protocols);
    let start_action = machine.start();
    let outcome = tokio::time::timeout(
        Duration::from_millis(config.handshake_timeout_ms()),
        run_handshake_loop(&mut stream, &mut codec, &mut recv_buf, &auth_key, start_action, move |frame| {
            machine.receive(frame)
        }),
    )
    .await
    .map_err(|_| HandshakeError::TimedOut)??;

    Ok(spawn_connection(stream, codec, recv_buf, config, outcome))
}

/// Performs the server side of the handshake (spec.md §4.E) over an
/// accepted `stream`, assigning it `connection_id`, then spawns the session
/// engine and returns the resulting [`Connection`]. See [`connect_client`]
/// for `configure_context`.
pub async fn accept_server<S>(
    mut stream: S,
    config: TempestConfig,
    auth_key: RsaKeypair,
    encryption_key: RsaKeypair,
    connection_id: u32,
    configure_context: impl FnOnce(&SerializeContext),
) -> HandshakeResult<Connection>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ctx = SerializeContext::new();
    configure_context(&ctx);
    let mut codec = FrameCodec::new(ctx, config.max_message_length());
    let mut recv_buf = BytesMut::new();

    let mut machine = ServerHandshake::new(auth_key.clone(), encryption_key, connection_id);
    let outcome = tokio::time::timeout(
        Duration::from_millis(config.handshake_timeout_ms()),
        run_handshake_loop(
            &mut stream,
            &mut codec,
            &mut recv_buf,
            &auth_key,
            HandshakeAction::AwaitIncoming,
            move |frame| machine.receive(frame),
        ),
    )
    .await
    .map_err(|_| HandshakeError::TimedOut)??;

    Ok(spawn_connection(stream, codec, recv_buf, config, outcome))
}

/// Splits the now-authenticated `stream`, builds the connection's shared
/// state, and spawns the writer/reader/dispatcher/keepalive/sweep tasks
/// (spec.md §4.F).
fn spawn_connection<S>(
    stream: S,
    codec: FrameCodec,
    leftover: BytesMut,
    config: TempestConfig,
    outcome: HandshakeOutcome,
) -> Connection
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (decoded_tx, decoded_rx) = mpsc::channel(256);
    let (disconnected_tx, _) = broadcast::channel(1);

    let ping_interval_ms = config.ping_interval_ms();
    let max_message_length = config.max_message_length();
    let buffer_pool = Arc::new(BufferPool::from_config(&config));

    let shared = Arc::new(Shared {
        connection_id: outcome.connection_id,
        enabled_protocols: outcome.enabled_protocols,
        peer_auth_key: outcome.peer_auth_key,
        config,
        outbound: outbound_tx,
        response_manager: ResponseManager::new(),
        handlers: HandlerRegistry::new(),
        state: StdMutex::new(ConnectionState::Connected),
        last_received_ms: AtomicI64::new(now_ms()),
        ping_interval_ms: AtomicU64::new(ping_interval_ms),
        disconnect_started: AtomicBool::new(false),
        disconnected_tx,
        tasks: StdMutex::new(Vec::new()),
    });
    let connection = Connection(shared);

    let codec = Arc::new(AsyncMutex::new(codec));
    let fragments = Arc::new(FragmentReassembler::new());

    let writer = tokio::spawn(run_writer(
        write_half,
        codec.clone(),
        outbound_rx,
        outcome.session_crypto.clone(),
        buffer_pool,
        max_message_length,
    ));
    let reader = tokio::spawn(run_reader(read_half, codec, leftover, decoded_tx, fragments, connection.clone()));
    let dispatcher = tokio::spawn(run_dispatcher(connection.clone(), decoded_rx));
    let keepalive = tokio::spawn(run_keepalive(connection.clone()));
    let sweep = tokio::spawn(run_response_sweep(connection.clone()));

    *connection.0.tasks.lock().expect("task list lock poisoned") = vec![writer, reader, dispatcher, keepalive, sweep];
    connection
}

async fn write_via_pool<S>(write_half: &mut WriteHalf<S>, pool: &BufferPool, bytes: &[u8]) -> bool
where
    S: AsyncWrite + Unpin,
{
    let mut buf = pool.checkout();
    buf.extend_from_slice(bytes);
    let ok = write_half.write_all(&buf).await.is_ok();
    pool.release(buf);
    ok
}

/// Encodes and writes one outgoing message, transparently splitting it into
/// `Partial` fragments first if the encoded frame exceeds
/// `max_message_length` (spec.md §4.D's oversize-message scheme). Returns
/// `false` on a fatal socket error, telling the writer task to stop.
async fn write_message<S>(
    write_half: &mut WriteHalf<S>,
    codec: &AsyncMutex<FrameCodec>,
    session_crypto: &SessionCrypto,
    buffer_pool: &BufferPool,
    max_message_length: u32,
    mut message: Box<dyn Message>,
) -> bool
where
    S: AsyncWrite + Unpin,
{
    let encoded = {
        let codec = codec.lock().await;
        codec.encode_frame(message.as_mut(), &Signer::Session(session_crypto))
    };
    let encoded = match encoded {
        Ok(bytes) => bytes,
        Err(err) => {
            tracing::warn!(error = %err, "failed to encode outgoing message; dropping it");
            return true;
        }
    };

    if encoded.len() <= max_message_length as usize {
        return write_via_pool(write_half, buffer_pool, &encoded).await;
    }

    let original_message_id = message.header().message_id;
    let connection_id = message.header().connection_id;
    // Each chunk is wrapped in its own `Partial` frame by `encode_frame`
    // below, which adds a full wire header, IV, CBC padding, and HMAC
    // signature on top of the `bytes` field itself — not just the
    // `Partial` message's own inner fields — so the chunk size must leave
    // room for all of it, or the encoded fragment itself would exceed
    // `max_message_length` and get rejected by the peer's own cap.
    let max_chunk = (max_message_length as usize).saturating_sub(FRAGMENT_FRAME_OVERHEAD).max(1);

    for (index, is_last, chunk) in split_into_fragments(&encoded, max_chunk) {
        let mut partial = Partial::new();
        partial.original_message_id = original_message_id;
        partial.fragment_index = index;
        partial.is_last = is_last;
        partial.bytes = chunk;
        partial.header_mut().connection_id = connection_id;

        let encoded_partial = {
            let codec = codec.lock().await;
            codec.encode_frame(&mut partial, &Signer::Session(session_crypto))
        };
        let encoded_partial = match encoded_partial {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(error = %err, "failed to encode outgoing fragment; dropping message");
                return true;
            }
        };
        if !write_via_pool(write_half, buffer_pool, &encoded_partial).await {
            return false;
        }
    }
    true
}

async fn run_writer<S>(
    mut write_half: WriteHalf<S>,
    codec: Arc<AsyncMutex<FrameCodec>>,
    mut outbound_rx: mpsc::UnboundedReceiver<OutboundJob>,
    session_crypto: SessionCrypto,
    buffer_pool: Arc<BufferPool>,
    max_message_length: u32,
) where
    S: AsyncWrite + Unpin,
{
    while let Some(job) = outbound_rx.recv().await {
        match job {
            OutboundJob::Send(message) => {
                if !write_message(&mut write_half, &codec, &session_crypto, &buffer_pool, max_message_length, message).await
                {
                    break;
                }
            }
            OutboundJob::Shutdown => {
                let _ = write_half.shutdown().await;
                break;
            }
        }
    }
}

async fn run_reader<S>(
    mut read_half: ReadHalf<S>,
    codec: Arc<AsyncMutex<FrameCodec>>,
    mut recv_buf: BytesMut,
    decoded_tx: mpsc::Sender<DecodedFrame>,
    fragments: Arc<FragmentReassembler>,
    connection: Connection,
) where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK_SIZE];
    loop {
        loop {
            let decoded = {
                let mut codec = codec.lock().await;
                codec.decode(&mut recv_buf)
            };
            let frame = match decoded {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(err) => {
                    connection.begin_teardown(true, false, err.disconnect_reason());
                    return;
                }
            };

            if frame.header.protocol_id == CONTROL_PROTOCOL_ID && frame.header.message_type == PARTIAL {
                let Some(partial) = frame.message.as_any().downcast_ref::<Partial>() else {
                    continue;
                };
                match fragments.accept(
                    frame.header.connection_id,
                    partial.original_message_id,
                    partial.fragment_index,
                    partial.is_last,
                    &partial.bytes,
                ) {
                    Ok(Some(reassembled)) => {
                        let full = {
                            let codec = codec.lock().await;
                            codec.decode_reassembled(reassembled)
                        };
                        match full {
                            Ok(full_frame) => {
                                if decoded_tx.send(full_frame).await.is_err() {
                                    return;
                                }
                            }
                            Err(err) => {
                                connection.begin_teardown(true, false, err.disconnect_reason());
                                return;
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(err) => {
                        connection.begin_teardown(true, false, err.disconnect_reason());
                        return;
                    }
                }
                continue;
            }

            if decoded_tx.send(frame).await.is_err() {
                return;
            }
        }

        match read_half.read(&mut chunk).await {
            Ok(0) => {
                connection.begin_teardown(true, false, DisconnectReason::FailedUnknown);
                return;
            }
            Ok(n) => recv_buf.extend_from_slice(&chunk[..n]),
            Err(err) => {
                tracing::warn!(error = %err, "socket read failed");
                connection.begin_teardown(true, false, DisconnectReason::FailedUnknown);
                return;
            }
        }
    }
}

async fn run_dispatcher(connection: Connection, mut decoded_rx: mpsc::Receiver<DecodedFrame>) {
    while let Some(frame) = decoded_rx.recv().await {
        connection.0.last_received_ms.store(now_ms(), Ordering::SeqCst);

        if frame.header.is_response() {
            if let Some(response_message_id) = frame.header.response_message_id {
                connection.0.response_manager.complete(response_message_id, frame.message);
            }
            continue;
        }

        if frame.header.protocol_id == CONTROL_PROTOCOL_ID {
            connection.handle_control_message(frame.message);
            continue;
        }

        let handlers = connection
            .0
            .handlers
            .handlers_for(frame.header.protocol_id, frame.header.message_type);
        for handler in &handlers {
            handler.handle(&connection, frame.message.as_ref());
        }
    }
}

/// Sends a periodic `Ping` and watches for a dead peer (spec.md §4.F:
/// "if `now - last_received > 2 * ping_interval`, the side initiates
/// `Disconnect(TimedOut)`"). `ping_interval_ms` starts at the configured
/// default and is kept in sync with whatever value the peer last
/// advertised in its own `Ping`, so both sides converge on one period.
async fn run_keepalive(connection: Connection) {
    loop {
        let interval_ms = connection.0.ping_interval_ms.load(Ordering::SeqCst);
        if interval_ms == 0 {
            tokio::time::sleep(KEEPALIVE_DISABLED_POLL).await;
        } else {
            tokio::time::sleep(Duration::from_millis(interval_ms)).await;
        }

        if connection.is_disconnected() {
            return;
        }
        if interval_ms == 0 {
            continue;
        }

        let mut ping = Ping::new();
        ping.interval_ms = u32::try_from(interval_ms).unwrap_or(u32::MAX);
        let _ = connection.send_impl(Box::new(ping));

        let last_received = connection.0.last_received_ms.load(Ordering::SeqCst);
        if now_ms().saturating_sub(last_received) > (interval_ms as i64) * 2 {
            connection.begin_teardown(true, false, DisconnectReason::TimedOut);
            return;
        }
    }
}

async fn run_response_sweep(connection: Connection) {
    let mut ticker = tokio::time::interval(RESPONSE_SWEEP_INTERVAL);
    loop {
        ticker.tick().await;
        if connection.is_disconnected() {
            return;
        }
        connection.0.response_manager.sweep_expired();
    }
}
