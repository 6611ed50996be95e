//! The internal control protocol (spec.md §4.C, id `1`): the nine
//! handshake and session-maintenance messages every Tempest connection
//! exchanges regardless of which application protocols it also speaks.
//!
//! These types hand-write `write_payload`/`read_payload` directly against
//! `tempest_wire::{FrameWriter, FrameReader}` rather than going through
//! `tempest_types`'s polymorphic object serializer — their shapes are
//! fixed and non-polymorphic, so the extra machinery would buy nothing
//! (spec.md §4.B: "a hand-written impl is equally valid for types that
//! need custom framing").

use std::any::Any;

use tempest_types::{SerializeContext, SerializeResult};
use tempest_wire::{FrameReader, FrameWriter};

use crate::header::Header;
use crate::message::Message;
use crate::protocol::{MessageFactory, Protocol, ProtocolDescriptor};
use crate::CONTROL_PROTOCOL_ID;

/// `Ping` message-type code.
pub const PING: u16 = 1;
/// `Pong` message-type code.
pub const PONG: u16 = 2;
/// `Disconnect` message-type code.
pub const DISCONNECT: u16 = 3;
/// `Connect` message-type code.
pub const CONNECT: u16 = 4;
/// `AcknowledgeConnect` message-type code.
pub const ACKNOWLEDGE_CONNECT: u16 = 5;
/// `FinalConnect` message-type code.
pub const FINAL_CONNECT: u16 = 6;
/// `Connected` message-type code.
pub const CONNECTED: u16 = 7;
/// `Acknowledge` message-type code.
pub const ACKNOWLEDGE: u16 = 8;
/// `Partial` message-type code.
pub const PARTIAL: u16 = 9;

fn write_descriptors(writer: &mut FrameWriter, descriptors: &[ProtocolDescriptor]) {
    writer.write_var_u32(descriptors.len() as u32);
    for d in descriptors {
        writer.write_u8(d.id);
        writer.write_u32(d.version);
    }
}

fn read_descriptors(reader: &mut FrameReader<'_>) -> SerializeResult<Vec<ProtocolDescriptor>> {
    let len = reader.read_var_u32()? as usize;
    let mut out = Vec::with_capacity(len.min(1 << 12));
    for _ in 0..len {
        out.push(ProtocolDescriptor {
            id: reader.read_u8()?,
            version: reader.read_u32()?,
        });
    }
    Ok(out)
}

fn write_strings(writer: &mut FrameWriter, values: &[String]) {
    writer.write_var_u32(values.len() as u32);
    for v in values {
        writer.write_string(Some(v));
    }
}

fn read_strings(reader: &mut FrameReader<'_>) -> SerializeResult<Vec<String>> {
    let len = reader.read_var_u32()? as usize;
    let mut out = Vec::with_capacity(len.min(1 << 12));
    for _ in 0..len {
        out.push(reader.read_string()?.ok_or(tempest_wire::WireError::MalformedFrame(
            "expected non-null hash algorithm name",
        ))?);
    }
    Ok(out)
}

/// Every control message is a plain-data struct whose fields are all
/// individually `Default`-able, so `#[derive(Default)]` gives a valid
/// zeroed instance; `new()` is that same instance with the header's
/// `protocol_id`/`message_type` pre-filled for the factory table.
macro_rules! control_message {
    ($name:ident, $code:expr) => {
        impl $name {
            #[must_use]
            pub fn new() -> Self {
                Self {
                    header: Header::new(CONTROL_PROTOCOL_ID, $code),
                    ..Default::default()
                }
            }
        }
    };
}

/// Empty keepalive probe; the server advertises `ping_interval` so the
/// client can arm the same 2x-dead-peer timeout (spec.md §4.F).
#[derive(Debug, Clone, Default)]
pub struct Ping {
    /// Frame header.
    pub header: Header,
    /// Keepalive period in milliseconds the server wants both sides to use.
    pub interval_ms: u32,
}
control_message!(Ping, PING);

impl Message for Ping {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        PING
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
        writer.write_u32(self.interval_ms);
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        self.interval_ms = reader.read_u32()?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Empty keepalive reply; receipt resets the peer's `last_received` clock.
#[derive(Debug, Clone, Default)]
pub struct Pong {
    /// Frame header.
    pub header: Header,
}
control_message!(Pong, PONG);

impl Message for Pong {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        PONG
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
    fn write_payload(&self, _ctx: &SerializeContext, _writer: &mut FrameWriter) -> SerializeResult<()> {
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, _reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Announces the connection is being torn down, and why (spec.md §6's
/// `DisconnectReason` wire codes, in `tempest-core`).
#[derive(Debug, Clone, Default)]
pub struct Disconnect {
    /// Frame header.
    pub header: Header,
    /// The `DisconnectReason` wire code.
    pub reason_code: u8,
    /// Present iff `reason_code == 7` (`Custom`).
    pub custom: Option<String>,
    /// Set when this `Disconnect` is raised during the handshake, before a
    /// session key exists to protect it with (spec.md §4.E's failure
    /// semantics fire on the bare `Connect`/signature/decrypt path, ahead
    /// of `FinalConnect`). Never set once the session is live.
    pub plaintext: bool,
}
control_message!(Disconnect, DISCONNECT);

impl Message for Disconnect {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        DISCONNECT
    }
    fn header(&self) -> &Header {
        &self.header
    }
    fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }
    fn authenticated(&self) -> bool {
        !self.plaintext
    }
    fn encrypted(&self) -> bool {
        !self.plaintext
    }
    fn write_payload(&self, _ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        writer.write_u8(self.reason_code);
        writer.write_string(self.custom.as_deref());
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        self.reason_code = reader.read_u8()?;
        self.custom = reader.read_string()?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Client's opening handshake frame: supported hash algorithms and
/// requested protocols, sent plaintext and unsigned (spec.md §4.E #1).
#[derive(Debug, Clone, Default)]
pub struct Connect {
    /// Frame header.
    pub header: Header,
    /// Hash algorithm names the client can sign/verify with, in
    /// preference order.
    pub hash_algorithms: Vec<String>,
    /// Protocols the client wishes to speak.
    pub protocols: Vec<ProtocolDescriptor>,
}
control_message!(Connect, CONNECT);

impl Message for Connect {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        CONNECT
    }
    fn header(&self) -> &Header {
        &self.header
    }
    fn header_mut(&mut self) -> &mut Header {
        &mut self.header
    }
    fn write_payload(&self, _ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        write_strings(writer, &self.hash_algorithms);
        write_descriptors(writer, &self.protocols);
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        self.hash_algorithms = read_strings(reader)?;
        self.protocols = read_descriptors(reader)?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Server's handshake reply: chosen hash algorithm, the negotiated
/// protocol intersection, the assigned connection id, and the server's
/// public keys — signed with the server's authentication private key
/// (spec.md §4.E #2).
#[derive(Debug, Clone, Default)]
pub struct AcknowledgeConnect {
    /// Frame header.
    pub header: Header,
    /// The hash algorithm the server selected (first client-offered name
    /// the server also supports).
    pub hash_algorithm: String,
    /// The protocol intersection the connection will speak.
    pub enabled_protocols: Vec<ProtocolDescriptor>,
    /// The connection id the server assigned.
    pub connection_id: u32,
    /// Server's public encryption key (SPKI DER), used by the client to
    /// encrypt the AES session key in `FinalConnect`.
    pub server_encryption_public_key: Vec<u8>,
    /// Server's public authentication key (SPKI DER), used by the client
    /// to verify this and future signed frames.
    pub server_auth_public_key: Vec<u8>,
}
control_message!(AcknowledgeConnect, ACKNOWLEDGE_CONNECT);

impl Message for AcknowledgeConnect {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        ACKNOWLEDGE_CONNECT
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
    fn write_payload(&self, _ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        writer.write_string(Some(&self.hash_algorithm));
        write_descriptors(writer, &self.enabled_protocols);
        writer.write_u32(self.connection_id);
        writer.write_bytes(&self.server_encryption_public_key);
        writer.write_bytes(&self.server_auth_public_key);
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        self.hash_algorithm = reader.read_string()?.ok_or(tempest_wire::WireError::MalformedFrame(
            "expected non-null hash algorithm",
        ))?;
        self.enabled_protocols = read_descriptors(reader)?;
        self.connection_id = reader.read_u32()?;
        self.server_encryption_public_key = reader.read_bytes()?;
        self.server_auth_public_key = reader.read_bytes()?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Client's closing handshake frame: the AES session key (RSA-encrypted
/// under the server's public encryption key) and the client's own public
/// authentication key, signed with the client's private key (spec.md
/// §4.E #3).
#[derive(Debug, Clone, Default)]
pub struct FinalConnect {
    /// Frame header.
    pub header: Header,
    /// The 256-bit AES session key, RSA-OAEP encrypted under the server's
    /// public encryption key.
    pub encrypted_aes_key: Vec<u8>,
    /// The client's public authentication key (SPKI DER), so the server
    /// can verify this and future signed frames.
    pub client_auth_public_key: Vec<u8>,
}
control_message!(FinalConnect, FINAL_CONNECT);

impl Message for FinalConnect {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        FINAL_CONNECT
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
    fn write_payload(&self, _ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        writer.write_bytes(&self.encrypted_aes_key);
        writer.write_bytes(&self.client_auth_public_key);
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        self.encrypted_aes_key = reader.read_bytes()?;
        self.client_auth_public_key = reader.read_bytes()?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Empty payload; signals the session is live (spec.md §4.E #4). Sent
/// encrypted+authenticated under the now-derived session key — by the
/// time the server sends it, both sides already hold the AES key.
#[derive(Debug, Clone, Default)]
pub struct Connected {
    /// Frame header.
    pub header: Header,
}
control_message!(Connected, CONNECTED);

impl Message for Connected {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        CONNECTED
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
    fn write_payload(&self, _ctx: &SerializeContext, _writer: &mut FrameWriter) -> SerializeResult<()> {
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, _reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Acknowledgment frame. Registered as a future extension point; not
/// exercised by the handshake or session engine (spec.md §9's Open
/// Questions).
#[derive(Debug, Clone, Default)]
pub struct Acknowledge {
    /// Frame header.
    pub header: Header,
    /// The `message_id` being acknowledged.
    pub acknowledged_message_id: u32,
}
control_message!(Acknowledge, ACKNOWLEDGE);

impl Message for Acknowledge {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        ACKNOWLEDGE
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
        writer.write_u32(self.acknowledged_message_id);
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        self.acknowledged_message_id = reader.read_u32()?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// One fragment of an oversize message, reassembled by
/// `tempest_frame::FragmentReassembler` (spec.md §4.D's partial-message
/// scheme).
#[derive(Debug, Clone, Default)]
pub struct Partial {
    /// Frame header.
    pub header: Header,
    /// The `message_id` of the message being split.
    pub original_message_id: u32,
    /// Monotonic 0-based fragment index.
    pub fragment_index: u32,
    /// Whether this is the final fragment.
    pub is_last: bool,
    /// This fragment's slice of the original payload.
    pub bytes: Vec<u8>,
}
control_message!(Partial, PARTIAL);

impl Message for Partial {
    fn protocol_id(&self) -> u8 {
        CONTROL_PROTOCOL_ID
    }
    fn message_type(&self) -> u16 {
        PARTIAL
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
        writer.write_u32(self.original_message_id);
        writer.write_u32(self.fragment_index);
        writer.write_bool(self.is_last);
        writer.write_bytes(&self.bytes);
        Ok(())
    }
    fn read_payload(&mut self, _ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<()> {
        self.original_message_id = reader.read_u32()?;
        self.fragment_index = reader.read_u32()?;
        self.is_last = reader.read_bool()?;
        self.bytes = reader.read_bytes()?;
        Ok(())
    }
    fn as_any(&self) -> &dyn Any {
        self
    }
    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Builds the internal control [`Protocol`] (id `1`), with all nine
/// message-type factories registered. Called once by
/// [`crate::Protocols`]'s lazy init.
pub(crate) fn build() -> Protocol {
    let entries: [(u16, MessageFactory); 9] = [
        (PING, || Box::new(Ping::new())),
        (PONG, || Box::new(Pong::new())),
        (DISCONNECT, || Box::new(Disconnect::new())),
        (CONNECT, || Box::new(Connect::new())),
        (ACKNOWLEDGE_CONNECT, || Box::new(AcknowledgeConnect::new())),
        (FINAL_CONNECT, || Box::new(FinalConnect::new())),
        (CONNECTED, || Box::new(Connected::new())),
        (ACKNOWLEDGE, || Box::new(Acknowledge::new())),
        (PARTIAL, || Box::new(Partial::new())),
    ];
    Protocol::new(CONTROL_PROTOCOL_ID, 1).register_all(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempest_wire::{FrameReader, FrameWriter};

    #[test]
    fn disconnect_round_trips_custom_reason() {
        let ctx = SerializeContext::default();
        let mut msg = Disconnect::new();
        msg.reason_code = 7;
        msg.custom = Some("bye".into());

        let mut writer = FrameWriter::new();
        msg.write_payload(&ctx, &mut writer).unwrap();
        let bytes = writer.flush();

        let mut restored = Disconnect::new();
        let mut reader = FrameReader::new(&bytes);
        restored.read_payload(&ctx, &mut reader).unwrap();
        assert_eq!(restored.reason_code, 7);
        assert_eq!(restored.custom.as_deref(), Some("bye"));
    }

    #[test]
    fn connect_round_trips_protocol_list() {
        let ctx = SerializeContext::default();
        let mut msg = Connect::new();
        msg.hash_algorithms = vec!["SHA256".into(), "SHA1".into()];
        msg.protocols = vec![ProtocolDescriptor { id: 2, version: 1 }];

        let mut writer = FrameWriter::new();
        msg.write_payload(&ctx, &mut writer).unwrap();
        let bytes = writer.flush();

        let mut restored = Connect::new();
        let mut reader = FrameReader::new(&bytes);
        restored.read_payload(&ctx, &mut reader).unwrap();
        assert_eq!(restored.hash_algorithms, vec!["SHA256", "SHA1"]);
        assert_eq!(restored.protocols, vec![ProtocolDescriptor { id: 2, version: 1 }]);
    }

    #[test]
    fn control_protocol_registers_all_nine_codes() {
        let protocol = build();
        for code in [
            PING,
            PONG,
            DISCONNECT,
            CONNECT,
            ACKNOWLEDGE_CONNECT,
            FINAL_CONNECT,
            CONNECTED,
            ACKNOWLEDGE,
            PARTIAL,
        ] {
            assert!(protocol.supports(code));
        }
    }
}
