//! The frame codec proper (spec.md §4.D): wires [`crate::header_parser`]
//! together with [`tempest_crypto`] and the [`tempest_types`] object
//! serializer to turn a [`Message`] into on-wire bytes and back.

use bytes::{Buf, BytesMut};
use tempest_crypto::{HashAlgorithm, PublicKeyCrypto, SessionCrypto, IV_LEN};
use tempest_protocol::{Header, Message, MessageFlags, Protocols};
use tempest_types::SerializeContext;
use tempest_wire::{FrameReader, FrameWriter};
use tokio_util::codec::Decoder;

use crate::error::{FrameError, FrameResult};
use crate::header_parser::{write_header, HeaderParser, ParseOutcome};

/// Byte offset of the `total_length` field within a written header — fixed
/// because `protocol_id`(1) + `flags`(1) + `connection_id`(4) +
/// `message_type`(2) always precede it.
const LENGTH_FIELD_OFFSET: usize = 1 + 1 + 4 + 2;

/// How an outgoing frame's signature, if any, should be computed (spec.md
/// §4.D step 4: HMAC-SHA256 post-handshake, RSA during the handshake).
pub enum Signer<'a> {
    /// Not authenticated; no signature is written.
    None,
    /// Post-handshake: HMAC-SHA256 keyed with the session AES key.
    Session(&'a SessionCrypto),
    /// Handshake-phase: signed with a local asymmetric keypair.
    Asymmetric {
        /// The local private key to sign with.
        key: &'a dyn PublicKeyCrypto,
        /// The negotiated hash algorithm.
        algorithm: HashAlgorithm,
    },
}

/// A fully decoded, verified, and payload-parsed incoming frame.
pub struct DecodedFrame {
    /// The parsed header (already copied into `message.header_mut()`).
    pub header: Header,
    /// The constructed, payload-populated message.
    pub message: Box<dyn Message>,
    /// `header_bytes ++ wire-form payload` — the exact bytes a signature
    /// was computed over. Populated whenever `authenticated` is set, even
    /// if this codec had no session key to auto-verify with (handshake
    /// frames), so the caller can verify manually against a key it only
    /// learns from the payload itself.
    pub signed_bytes: Vec<u8>,
    /// The trailing signature, if `authenticated` was set.
    pub signature: Option<Vec<u8>>,
}

enum Stage {
    Header(HeaderParser),
    Payload {
        header: Header,
        raw_header: Vec<u8>,
        remaining: usize,
        acc: Vec<u8>,
    },
    SigLen {
        header: Header,
        raw_header: Vec<u8>,
        payload: Vec<u8>,
    },
    Sig {
        header: Header,
        raw_header: Vec<u8>,
        payload: Vec<u8>,
        remaining: u16,
        acc: Vec<u8>,
    },
}

impl Stage {
    fn fresh() -> Self {
        Self::Header(HeaderParser::new())
    }
}

/// Per-connection frame codec: holds the resumable decode state, the
/// connection's [`SerializeContext`], and (once the handshake completes)
/// the session's [`SessionCrypto`].
pub struct FrameCodec {
    stage: Stage,
    ctx: SerializeContext,
    session_crypto: Option<SessionCrypto>,
    max_message_length: u32,
}

impl FrameCodec {
    /// Builds a codec with no session key yet (pre-handshake state).
    #[must_use]
    pub fn new(ctx: SerializeContext, max_message_length: u32) -> Self {
        Self {
            stage: Stage::fresh(),
            ctx,
            session_crypto: None,
            max_message_length,
        }
    }

    /// Installs the session key derived at the end of the handshake
    /// (spec.md §4.E #4). From this point on, `decode` auto-verifies and
    /// decrypts every `encrypted`/`authenticated` frame.
    pub fn install_session_crypto(&mut self, crypto: SessionCrypto) {
        self.session_crypto = Some(crypto);
    }

    /// Whether a session key has been installed.
    #[must_use]
    pub fn has_session_crypto(&self) -> bool {
        self.session_crypto.is_some()
    }

    /// Borrows the connection's serialize context.
    #[must_use]
    pub fn context(&self) -> &SerializeContext {
        &self.ctx
    }

    /// Encodes one complete wire frame (header + payload + optional
    /// signature). Does not split oversize messages; see
    /// `tempest_session`'s fragmentation driver for that.
    ///
    /// `message`'s header must already carry `connection_id`,
    /// `message_type` (via the factory), `message_id`, and, for a
    /// response, `response_message_id` — everything else (`flags`, `iv`,
    /// `length`) is computed here.
    pub fn encode_frame(&self, message: &mut dyn Message, signer: &Signer<'_>) -> FrameResult<Vec<u8>> {
        let encrypted = message.encrypted();
        let authenticated = message.authenticated();

        let mut writer = FrameWriter::new();
        message.write_payload(&self.ctx, &mut writer)?;
        let mut payload = writer.flush();

        let mut header = message.header().clone();
        header.flags = MessageFlags::new(encrypted, authenticated, header.response_message_id.is_some());

        if encrypted {
            let crypto = match signer {
                Signer::Session(crypto) => crypto,
                _ => return Err(FrameError::NoSessionCrypto),
            };
            let (iv, ciphertext) = crypto.encrypt(&payload);
            header.iv = Some(iv.to_vec());
            payload = ciphertext;
        }

        header.length = 0;
        let mut frame = FrameWriter::new();
        write_header(&mut frame, &header)?;
        frame.write_raw(&payload);
        let total_length = u32::try_from(frame.len()).map_err(|_| FrameError::Malformed("frame too large"))?;
        frame.as_mut_slice()[LENGTH_FIELD_OFFSET..LENGTH_FIELD_OFFSET + 4]
            .copy_from_slice(&total_length.to_le_bytes());
        header.length = total_length;

        if authenticated {
            let signed_bytes = frame.as_slice().to_vec();
            let signature = match signer {
                Signer::Session(crypto) => crypto.sign(&signed_bytes),
                Signer::Asymmetric { key, algorithm } => key.hash_and_sign(*algorithm, &signed_bytes)?,
                Signer::None => return Err(FrameError::Malformed("authenticated message has no signer")),
            };
            frame.write_u16(
                u16::try_from(signature.len()).map_err(|_| FrameError::Malformed("signature too long"))?,
            );
            frame.write_raw(&signature);
        }

        *message.header_mut() = header;
        Ok(frame.flush())
    }

    /// Feeds newly-arrived bytes into the resumable decoder. Returns
    /// `Ok(None)` when more bytes are needed to make progress (mirroring
    /// `tokio_util::codec::Decoder`'s contract).
    pub fn decode(&mut self, buf: &mut BytesMut) -> FrameResult<Option<DecodedFrame>> {
        advance_stage(&mut self.stage, buf, &self.ctx, self.session_crypto.as_ref(), self.max_message_length)
    }

    /// Parses a complete, already-reassembled frame (header + payload +
    /// optional signature) in one shot — used to recover the original
    /// message once [`crate::fragment::FragmentReassembler`] has collected
    /// every `Partial` fragment.
    ///
    /// The reassembled bytes ARE the original oversize frame (that is why
    /// it needed splitting into `Partial`s in the first place), so
    /// `header.length` is expected to exceed `max_message_length` here —
    /// that cap guards a single *wire* frame read off the socket, not the
    /// logical message a completed reassembly produces. Each individual
    /// `Partial` fragment was already checked against the cap on the way
    /// in, so no further bound applies once they are stitched back
    /// together.
    pub fn decode_reassembled(&self, bytes: Vec<u8>) -> FrameResult<DecodedFrame> {
        let mut stage = Stage::fresh();
        let mut buf = BytesMut::from(&bytes[..]);
        match advance_stage(&mut stage, &mut buf, &self.ctx, self.session_crypto.as_ref(), u32::MAX)? {
            Some(decoded) => Ok(decoded),
            None => Err(FrameError::Malformed("reassembled fragment set did not contain a complete frame")),
        }
    }
}

impl Decoder for FrameCodec {
    type Item = DecodedFrame;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> FrameResult<Option<DecodedFrame>> {
        FrameCodec::decode(self, src)
    }
}

fn advance_stage(
    stage: &mut Stage,
    buf: &mut BytesMut,
    ctx: &SerializeContext,
    session_crypto: Option<&SessionCrypto>,
    max_message_length: u32,
) -> FrameResult<Option<DecodedFrame>> {
    loop {
        match stage {
            Stage::Header(parser) => match parser.advance(buf)? {
                ParseOutcome::NeedMore => return Ok(None),
                ParseOutcome::Ready { header, raw } => {
                    if (header.length as usize) < raw.len() {
                        return Err(FrameError::Malformed("total_length shorter than header"));
                    }
                    if header.length > max_message_length {
                        return Err(FrameError::MessageTooLarge {
                            actual: header.length,
                            max: max_message_length,
                        });
                    }
                    let remaining = header.length as usize - raw.len();
                    *stage = Stage::Payload {
                        header,
                        raw_header: raw,
                        remaining,
                        acc: Vec::with_capacity(remaining),
                    };
                }
            },
            Stage::Payload {
                header,
                raw_header,
                remaining,
                acc,
            } => {
                if *remaining > 0 {
                    let take = (*remaining).min(buf.len());
                    if take == 0 {
                        return Ok(None);
                    }
                    acc.extend_from_slice(&buf.split_to(take));
                    *remaining -= take;
                    if *remaining > 0 {
                        return Ok(None);
                    }
                }
                if header.flags.authenticated() {
                    *stage = Stage::SigLen {
                        header: header.clone(),
                        raw_header: std::mem::take(raw_header),
                        payload: std::mem::take(acc),
                    };
                } else {
                    let header = header.clone();
                    let raw_header = std::mem::take(raw_header);
                    let payload = std::mem::take(acc);
                    let decoded = finish_frame(header, raw_header, payload, None, ctx, session_crypto)?;
                    *stage = Stage::fresh();
                    return Ok(Some(decoded));
                }
            }
            Stage::SigLen {
                header,
                raw_header,
                payload,
            } => {
                if buf.len() < 2 {
                    return Ok(None);
                }
                let sig_len = buf.get_u16_le();
                *stage = Stage::Sig {
                    header: header.clone(),
                    raw_header: std::mem::take(raw_header),
                    payload: std::mem::take(payload),
                    remaining: sig_len,
                    acc: Vec::with_capacity(sig_len as usize),
                };
            }
            Stage::Sig {
                header,
                raw_header,
                payload,
                remaining,
                acc,
            } => {
                if *remaining > 0 {
                    let take = (*remaining as usize).min(buf.len());
                    if take == 0 {
                        return Ok(None);
                    }
                    acc.extend_from_slice(&buf.split_to(take));
                    *remaining -= take as u16;
                    if *remaining > 0 {
                        return Ok(None);
                    }
                }
                let header = header.clone();
                let raw_header = std::mem::take(raw_header);
                let payload = std::mem::take(payload);
                let signature = std::mem::take(acc);
                let decoded = finish_frame(header, raw_header, payload, Some(signature), ctx, session_crypto)?;
                *stage = Stage::fresh();
                return Ok(Some(decoded));
            }
        }
    }
}

fn finish_frame(
    header: Header,
    raw_header: Vec<u8>,
    payload_wire: Vec<u8>,
    signature: Option<Vec<u8>>,
    ctx: &SerializeContext,
    session_crypto: Option<&SessionCrypto>,
) -> FrameResult<DecodedFrame> {
    let mut signed_bytes = raw_header;
    signed_bytes.extend_from_slice(&payload_wire);

    if let Some(sig) = &signature {
        if let Some(crypto) = session_crypto {
            if !crypto.verify(&signed_bytes, sig) {
                return Err(FrameError::MessageAuthenticationFailed);
            }
        }
        // No session key yet: this is a handshake frame, authenticated
        // with the peer's RSA key instead — the caller verifies manually
        // against `signed_bytes`/`signature` once it has learned that key
        // from the payload.
    }

    let final_payload = if header.flags.encrypted() {
        let crypto = session_crypto.ok_or(FrameError::NoSessionCrypto)?;
        let iv_bytes = header
            .iv
            .as_deref()
            .ok_or(FrameError::Malformed("encrypted header missing iv"))?;
        let iv: [u8; IV_LEN] = iv_bytes
            .try_into()
            .map_err(|_| FrameError::Malformed("iv has wrong length"))?;
        crypto
            .decrypt(&iv, &payload_wire)
            .map_err(|_| FrameError::EncryptionMismatch)?
    } else {
        payload_wire.clone()
    };

    let protocol = Protocols::require(header.protocol_id)?;
    let mut message = protocol.create(header.message_type)?;
    {
        let mut reader = FrameReader::new(&final_payload);
        message.read_payload(ctx, &mut reader)?;
    }
    *message.header_mut() = header.clone();

    Ok(DecodedFrame {
        header,
        message,
        signed_bytes,
        signature,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempest_protocol::control::{Ping, Pong};
    use tempest_protocol::CONTROL_PROTOCOL_ID;

    fn config_max() -> u32 {
        tempest_core::TempestConfig::default().max_message_length()
    }

    #[test]
    fn encodes_and_decodes_session_frame_round_trip() {
        let crypto = SessionCrypto::generate();
        let mut codec = FrameCodec::new(SerializeContext::new(), config_max());
        codec.install_session_crypto(crypto.clone());

        let mut ping = Ping::new();
        ping.interval_ms = 5_000;
        ping.header_mut().connection_id = 7;
        ping.header_mut().message_id = 1;

        let bytes = codec.encode_frame(&mut ping, &Signer::Session(&crypto)).unwrap();

        let mut buf = BytesMut::from(&bytes[..]);
        let decoded = codec.decode(&mut buf).unwrap().expect("a complete frame");
        assert_eq!(decoded.header.protocol_id, CONTROL_PROTOCOL_ID);
        assert_eq!(decoded.header.connection_id, 7);
        let restored = decoded.message.as_any().downcast_ref::<Ping>().unwrap();
        assert_eq!(restored.interval_ms, 5_000);
    }

    #[test]
    fn tampered_session_frame_fails_authentication() {
        let crypto = SessionCrypto::generate();
        let mut codec = FrameCodec::new(SerializeContext::new(), config_max());
        codec.install_session_crypto(crypto.clone());

        let mut pong = Pong::new();
        pong.header_mut().connection_id = 1;
        pong.header_mut().message_id = 2;
        let mut bytes = codec.encode_frame(&mut pong, &Signer::Session(&crypto)).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;

        let mut buf = BytesMut::from(&bytes[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::MessageAuthenticationFailed));
    }

    #[test]
    fn decode_resumes_across_fragmented_delivery() {
        let crypto = SessionCrypto::generate();
        let mut codec = FrameCodec::new(SerializeContext::new(), config_max());
        codec.install_session_crypto(crypto.clone());

        let mut ping = Ping::new();
        ping.interval_ms = 42;
        ping.header_mut().connection_id = 3;
        ping.header_mut().message_id = 1;
        let bytes = codec.encode_frame(&mut ping, &Signer::Session(&crypto)).unwrap();

        let mut buf = BytesMut::new();
        let mut decoded = None;
        for chunk in bytes.chunks(3) {
            buf.extend_from_slice(chunk);
            if let Some(frame) = codec.decode(&mut buf).unwrap() {
                decoded = Some(frame);
                break;
            }
        }
        let decoded = decoded.expect("frame eventually completes");
        assert_eq!(decoded.header.connection_id, 3);
    }

    #[test]
    fn oversize_frame_is_rejected() {
        let crypto = SessionCrypto::generate();
        let mut codec = FrameCodec::new(SerializeContext::new(), 16);
        codec.install_session_crypto(crypto.clone());
        let mut ping = Ping::new();
        ping.header_mut().connection_id = 1;
        let bytes = codec.encode_frame(&mut ping, &Signer::Session(&crypto)).unwrap();
        let mut buf = BytesMut::from(&bytes[..]);
        let err = codec.decode(&mut buf).unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { .. }));
    }
}
