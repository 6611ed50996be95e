//! The four-message connection handshake (spec.md §4.E): mutual
//! authentication, AES session-key exchange, and protocol negotiation,
//! expressed as explicit client/server state machines driven one message
//! at a time rather than as a hidden async task — this is the Mealy-machine
//! shape `tempest_frame::header_parser::HeaderParser` already uses for the
//! header, generalized to a whole multi-round exchange.

use tempest_crypto::{HashAlgorithm, PublicKeyCrypto, RsaKeypair, RsaPublicOnly, SessionCrypto, SUPPORTED_HASHES};
use tempest_frame::DecodedFrame;
use tempest_protocol::control::{AcknowledgeConnect, Connect, Connected, FinalConnect};
use tempest_protocol::{Message, ProtocolDescriptor, Protocols};

use crate::error::{HandshakeError, HandshakeResult};

/// What the driving engine should do after a [`ClientHandshake::start`] or
/// [`ClientHandshake::receive`] / [`ServerHandshake::receive`] call.
pub enum HandshakeAction {
    /// Send `message`, signed as directed. If `install_session_crypto` is
    /// set, install it on the connection's [`tempest_frame::FrameCodec`]
    /// before the next incoming frame is decoded (the reply is expected to
    /// arrive encrypted+authenticated under it).
    Send {
        /// The handshake message to send next.
        message: Box<dyn Message>,
        /// The asymmetric key/hash-algorithm to sign it with, or `None` if
        /// this step's message is unsigned (`Connect`).
        signer: Option<(HashAlgorithm, &'static str)>,
        /// The session key to install on the local codec once this send
        /// completes, if any.
        install_session_crypto: Option<SessionCrypto>,
    },
    /// The handshake is complete.
    Complete(HandshakeOutcome),
    /// Send a final handshake message, and treat the handshake as complete
    /// as soon as it goes out (the server's last step: `Connected` carries
    /// no reply to wait for).
    SendThenComplete {
        /// The handshake message to send.
        message: Box<dyn Message>,
        /// The asymmetric key/hash-algorithm to sign it with, or `None`.
        signer: Option<(HashAlgorithm, &'static str)>,
        /// The session key to install once this send completes, if any.
        install_session_crypto: Option<SessionCrypto>,
        /// The outcome to report once this send completes.
        outcome: Box<HandshakeOutcome>,
    },
    /// The handshake failed; close the connection with this reason.
    Fail(HandshakeError),
    /// Nothing to send; keep waiting for the next incoming frame.
    AwaitIncoming,
}

/// Connection-level facts established once a handshake completes
/// (spec.md §4.E #4).
pub struct HandshakeOutcome {
    /// The connection id the server assigned.
    pub connection_id: u32,
    /// The derived session key, already installed for HMAC/AES use.
    pub session_crypto: SessionCrypto,
    /// The negotiated protocol intersection.
    pub enabled_protocols: Vec<ProtocolDescriptor>,
    /// The peer's authentication public key, for any further verification
    /// the application wants to perform out of band.
    pub peer_auth_key: RsaPublicOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientPhase {
    Idle,
    SentHello,
    SentFinal,
    Done,
}

/// Client side of the handshake: `Idle -> SentHello -> ReceivedAck ->
/// SentFinal -> Connected` (spec.md §4.E). `ReceivedAck` is folded into the
/// transition out of `SentHello` rather than held as its own phase, since
/// nothing suspends between "ack verified" and "final sent".
pub struct ClientHandshake {
    phase: ClientPhase,
    auth_key: RsaKeypair,
    requested_protocols: Vec<ProtocolDescriptor>,
    pending: Option<PendingClientState>,
}

struct PendingClientState {
    hash_algorithm: HashAlgorithm,
    connection_id: u32,
    enabled_protocols: Vec<ProtocolDescriptor>,
    session_crypto: SessionCrypto,
    peer_auth_key: RsaPublicOnly,
}

impl ClientHandshake {
    /// Builds a client handshake that will authenticate with `auth_key` and
    /// request `protocols`.
    #[must_use]
    pub fn new(auth_key: RsaKeypair, protocols: Vec<ProtocolDescriptor>) -> Self {
        Self {
            phase: ClientPhase::Idle,
            auth_key,
            requested_protocols: protocols,
            pending: None,
        }
    }

    /// Produces the opening `Connect` frame. Call exactly once, before any
    /// incoming frame is fed to [`ClientHandshake::receive`].
    pub fn start(&mut self) -> HandshakeAction {
        let mut connect = Connect::new();
        connect.hash_algorithms = SUPPORTED_HASHES.iter().map(|name| (*name).to_string()).collect();
        connect.protocols = self.requested_protocols.clone();
        self.phase = ClientPhase::SentHello;
        HandshakeAction::Send {
            message: Box::new(connect),
            signer: None,
            install_session_crypto: None,
        }
    }

    /// Feeds one incoming handshake frame.
    pub fn receive(&mut self, frame: DecodedFrame) -> HandshakeAction {
        match self.phase {
            ClientPhase::SentHello => self.receive_acknowledge_connect(frame),
            ClientPhase::SentFinal => self.receive_connected(frame),
            ClientPhase::Idle | ClientPhase::Done => HandshakeAction::Fail(HandshakeError::UnexpectedMessage {
                phase: "idle-or-done",
                got: "any",
            }),
        }
    }

    fn receive_acknowledge_connect(&mut self, frame: DecodedFrame) -> HandshakeAction {
        let Some(ack) = frame.message.as_any().downcast_ref::<AcknowledgeConnect>() else {
            return HandshakeAction::Fail(HandshakeError::UnexpectedMessage {
                phase: "sent-hello",
                got: "not AcknowledgeConnect",
            });
        };

        let hash_algorithm = match HashAlgorithm::from_name(&ack.hash_algorithm) {
            Ok(alg) => alg,
            Err(_) => return HandshakeAction::Fail(HandshakeError::UnsupportedHash(ack.hash_algorithm.clone())),
        };

        let server_auth_key = match RsaKeypair::import_public_der(&ack.server_auth_public_key) {
            Ok(key) => key,
            Err(err) => return HandshakeAction::Fail(HandshakeError::Crypto(err)),
        };

        let Some(signature) = frame.signature.as_deref() else {
            return HandshakeAction::Fail(HandshakeError::SignatureVerificationFailed);
        };
        match server_auth_key.verify_signed_hash(hash_algorithm, &frame.signed_bytes, signature) {
            Ok(true) => {}
            Ok(false) | Err(_) => return HandshakeAction::Fail(HandshakeError::SignatureVerificationFailed),
        }

        if ack.enabled_protocols.is_empty() {
            return HandshakeAction::Fail(HandshakeError::IncompatibleVersion);
        }

        let server_encryption_key = match RsaKeypair::import_public_der(&ack.server_encryption_public_key) {
            Ok(key) => key,
            Err(err) => return HandshakeAction::Fail(HandshakeError::Crypto(err)),
        };

        let session_crypto = SessionCrypto::generate();
        let encrypted_aes_key = match server_encryption_key.encrypt(session_crypto.key_bytes()) {
            Ok(bytes) => bytes,
            Err(err) => return HandshakeAction::Fail(HandshakeError::Crypto(err)),
        };
        let client_auth_public_key = match self.auth_key.export_public_key() {
            Ok(bytes) => bytes,
            Err(err) => return HandshakeAction::Fail(HandshakeError::Crypto(err)),
        };

        let mut final_connect = FinalConnect::new();
        final_connect.encrypted_aes_key = encrypted_aes_key;
        final_connect.client_auth_public_key = client_auth_public_key;

        self.pending = Some(PendingClientState {
            hash_algorithm,
            connection_id: ack.connection_id,
            enabled_protocols: ack.enabled_protocols.clone(),
            session_crypto: session_crypto.clone(),
            peer_auth_key: server_auth_key,
        });
        self.phase = ClientPhase::SentFinal;

        HandshakeAction::Send {
            message: Box::new(final_connect),
            signer: Some((hash_algorithm, "client")),
            install_session_crypto: Some(session_crypto),
        }
    }

    fn receive_connected(&mut self, frame: DecodedFrame) -> HandshakeAction {
        if frame.message.as_any().downcast_ref::<Connected>().is_none() {
            return HandshakeAction::Fail(HandshakeError::UnexpectedMessage {
                phase: "sent-final",
                got: "not Connected",
            });
        }
        let Some(pending) = self.pending.take() else {
            return HandshakeAction::Fail(HandshakeError::UnexpectedMessage {
                phase: "sent-final",
                got: "Connected with no pending state",
            });
        };
        self.phase = ClientPhase::Done;
        HandshakeAction::Complete(HandshakeOutcome {
            connection_id: pending.connection_id,
            session_crypto: pending.session_crypto,
            enabled_protocols: pending.enabled_protocols,
            peer_auth_key: pending.peer_auth_key,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServerPhase {
    Idle,
    SentAck,
    Done,
}

struct PendingServerState {
    hash_algorithm: HashAlgorithm,
    connection_id: u32,
    enabled_protocols: Vec<ProtocolDescriptor>,
}

/// Server side of the handshake: `Idle -> ReceivedHello -> SentAck ->
/// ReceivedFinal -> SentConnected` (spec.md §4.E). As on the client,
/// `ReceivedHello`/`ReceivedFinal` are folded into the transitions out of
/// `Idle`/`SentAck`.
pub struct ServerHandshake {
    phase: ServerPhase,
    auth_key: RsaKeypair,
    encryption_key: RsaKeypair,
    connection_id: u32,
    pending: Option<PendingServerState>,
}

impl ServerHandshake {
    /// Builds a server handshake that will sign with `auth_key`, decrypt
    /// the client's session key with `encryption_key`, and assign
    /// `connection_id` to whichever client completes it.
    #[must_use]
    pub fn new(auth_key: RsaKeypair, encryption_key: RsaKeypair, connection_id: u32) -> Self {
        Self {
            phase: ServerPhase::Idle,
            auth_key,
            encryption_key,
            connection_id,
            pending: None,
        }
    }

    /// Feeds one incoming handshake frame. The server never sends first, so
    /// there is no `start()` counterpart to [`ClientHandshake::start`].
    pub fn receive(&mut self, frame: DecodedFrame) -> HandshakeAction {
        match self.phase {
            ServerPhase::Idle => self.receive_connect(frame),
            ServerPhase::SentAck => self.receive_final_connect(frame),
            ServerPhase::Done => HandshakeAction::Fail(HandshakeError::UnexpectedMessage {
                phase: "done",
                got: "any",
            }),
        }
    }

    fn receive_connect(&mut self, frame: DecodedFrame) -> HandshakeAction {
        let Some(connect) = frame.message.as_any().downcast_ref::<Connect>() else {
            return HandshakeAction::Fail(HandshakeError::UnexpectedMessage {
                phase: "idle",
                got: "not Connect",
            });
        };

        let hash_algorithm = connect
            .hash_algorithms
            .iter()
            .find_map(|name| HashAlgorithm::from_name(name).ok());
        let Some(hash_algorithm) = hash_algorithm else {
            return HandshakeAction::Fail(HandshakeError::UnsupportedHash(
                connect.hash_algorithms.join(", "),
            ));
        };

        let enabled_protocols = Protocols::negotiate(&connect.protocols);
        if enabled_protocols.is_empty() {
            return HandshakeAction::Fail(HandshakeError::IncompatibleVersion);
        }

        let server_auth_public_key = match self.auth_key.export_public_key() {
            Ok(bytes) => bytes,
            Err(err) => return HandshakeAction::Fail(HandshakeError::Crypto(err)),
        };
        let server_encryption_public_key = match self.encryption_key.export_public_key() {
            Ok(bytes) => bytes,
            Err(err) => return HandshakeAction::Fail(HandshakeError::Crypto(err)),
        };

        let mut ack = AcknowledgeConnect::new();
        ack.hash_algorithm = hash_algorithm.name().to_string();
        ack.enabled_protocols = enabled_protocols.clone();
        ack.connection_id = self.connection_id;
        ack.server_encryption_public_key = server_encryption_public_key;
        ack.server_auth_public_key = server_auth_public_key;

        self.pending = Some(PendingServerState {
            hash_algorithm,
            connection_id: self.connection_id,
            enabled_protocols,
        });
        self.phase = ServerPhase::SentAck;

        HandshakeAction::Send {
            message: Box::new(ack),
            signer: Some((hash_algorithm, "server")),
            install_session_crypto: None,
        }
    }

    fn receive_final_connect(&mut self, frame: DecodedFrame) -> HandshakeAction {
        let Some(final_connect) = frame.message.as_any().downcast_ref::<FinalConnect>() else {
            return HandshakeAction::Fail(HandshakeError::UnexpectedMessage {
                phase: "sent-ack",
                got: "not FinalConnect",
            });
        };
        let Some(pending) = self.pending.take() else {
            return HandshakeAction::Fail(HandshakeError::UnexpectedMessage {
                phase: "sent-ack",
                got: "FinalConnect with no pending state",
            });
        };

        let client_auth_key = match RsaKeypair::import_public_der(&final_connect.client_auth_public_key) {
            Ok(key) => key,
            Err(err) => return HandshakeAction::Fail(HandshakeError::Crypto(err)),
        };
        let Some(signature) = frame.signature.as_deref() else {
            return HandshakeAction::Fail(HandshakeError::SignatureVerificationFailed);
        };
        match client_auth_key.verify_signed_hash(pending.hash_algorithm, &frame.signed_bytes, signature) {
            Ok(true) => {}
            Ok(false) | Err(_) => return HandshakeAction::Fail(HandshakeError::SignatureVerificationFailed),
        }

        let aes_key_bytes = match self.encryption_key.decrypt(&final_connect.encrypted_aes_key) {
            Ok(bytes) => bytes,
            Err(err) => return HandshakeAction::Fail(HandshakeError::Crypto(err)),
        };
        let aes_key: [u8; tempest_crypto::AES_KEY_LEN] = match aes_key_bytes.try_into() {
            Ok(bytes) => bytes,
            Err(_) => return HandshakeAction::Fail(HandshakeError::SignatureVerificationFailed),
        };
        let session_crypto = SessionCrypto::new(aes_key);

        self.phase = ServerPhase::Done;
        HandshakeAction::Send {
            message: Box::new(Connected::new()),
            signer: None,
            install_session_crypto: Some(session_crypto.clone()),
        }
        .then_complete(HandshakeOutcome {
            connection_id: pending.connection_id,
            session_crypto,
            enabled_protocols: pending.enabled_protocols,
            peer_auth_key: client_auth_key,
        })
    }
}

impl HandshakeAction {
    /// Bundles a final `Send` with the outcome the engine should treat the
    /// handshake as complete with once that send goes out. The server's
    /// last step (send `Connected`) and "handshake is done" happen in the
    /// same transition, unlike the client's (which waits for a reply), so
    /// this carries both rather than forcing a third phase purely to
    /// re-enter `receive` and get a `Complete` on the next (nonexistent)
    /// incoming frame.
    fn then_complete(self, outcome: HandshakeOutcome) -> Self {
        match self {
            Self::Send {
                message,
                signer,
                install_session_crypto,
            } => Self::SendThenComplete {
                message,
                signer,
                install_session_crypto,
                outcome: Box::new(outcome),
            },
            other => other,
        }
    }
}
