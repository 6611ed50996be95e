//! Incremental header parsing (spec.md §3, §4.D): the wire header may
//! arrive split across arbitrarily many socket reads, so parsing has to
//! resume from wherever the previous call left off rather than assume a
//! complete header is available. This is the direct analogue of a
//! buffered-prefix sniffer that has to resume across short reads from a
//! non-blocking socket — the parser here plays the same role for the frame
//! header that such a sniffer plays for a text negotiation line.

use bytes::{Buf, BytesMut};

use tempest_protocol::{Header, MessageFlags};

use crate::error::{FrameError, FrameResult};

/// Incremental parse progress through a single header (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    /// Nothing consumed yet.
    Empty,
    /// `protocol_id` and `flags` consumed; awaiting `connection_id`.
    Protocol,
    /// `connection_id` consumed; awaiting `message_type`.
    Cid,
    /// `message_type` consumed; awaiting `total_length`.
    Type,
    /// `total_length` consumed; awaiting the IV field (if encrypted) or
    /// `message_id`.
    Length,
    /// Reading the optional IV field.
    Iv,
    /// Awaiting `message_id`.
    MessageId,
    /// Awaiting `response_message_id` (present iff `is_response`).
    ResponseId,
    /// The header is fully parsed.
    Complete,
}

/// The result of one [`HeaderParser::advance`] call.
pub enum ParseOutcome {
    /// The buffer did not contain enough bytes to make progress; call
    /// again once more bytes have arrived.
    NeedMore,
    /// The header is complete. `raw` is the exact bytes the header
    /// occupied on the wire (reconstructed field-by-field, byte-identical
    /// to what the sender wrote), needed later to verify a signature
    /// computed over header+payload.
    Ready { header: Header, raw: Vec<u8> },
}

/// Resumable header parser. One instance is driven to [`HeaderState::Complete`]
/// per frame, then discarded (or reset) for the next.
#[derive(Debug, Clone)]
pub struct HeaderParser {
    state: HeaderState,
    header: Header,
    raw: Vec<u8>,
    iv_len: Option<u16>,
}

impl Default for HeaderParser {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderParser {
    /// Starts a fresh parser at [`HeaderState::Empty`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: HeaderState::Empty,
            header: Header::default(),
            raw: Vec::with_capacity(24),
            iv_len: None,
        }
    }

    /// Resets this parser to parse the next frame's header, reusing its
    /// allocation.
    pub fn reset(&mut self) {
        self.state = HeaderState::Empty;
        self.header = Header::default();
        self.raw.clear();
        self.iv_len = None;
    }

    /// The parser's current state, for diagnostics.
    #[must_use]
    pub const fn state(&self) -> HeaderState {
        self.state
    }

    /// Advances the state machine as far as `buf` allows, consuming
    /// exactly the bytes it parses and leaving the rest untouched.
    pub fn advance(&mut self, buf: &mut BytesMut) -> FrameResult<ParseOutcome> {
        loop {
            match self.state {
                HeaderState::Empty => {
                    if buf.len() < 2 {
                        return Ok(ParseOutcome::NeedMore);
                    }
                    let protocol_id = buf.get_u8();
                    let flags_byte = buf.get_u8();
                    self.raw.push(protocol_id);
                    self.raw.push(flags_byte);
                    self.header.protocol_id = protocol_id;
                    self.header.flags = MessageFlags::from_bits(flags_byte);
                    self.state = HeaderState::Protocol;
                }
                HeaderState::Protocol => {
                    if buf.len() < 4 {
                        return Ok(ParseOutcome::NeedMore);
                    }
                    let connection_id = buf.get_u32_le();
                    self.raw.extend_from_slice(&connection_id.to_le_bytes());
                    self.header.connection_id = connection_id;
                    self.state = HeaderState::Cid;
                }
                HeaderState::Cid => {
                    if buf.len() < 2 {
                        return Ok(ParseOutcome::NeedMore);
                    }
                    let message_type = buf.get_u16_le();
                    self.raw.extend_from_slice(&message_type.to_le_bytes());
                    self.header.message_type = message_type;
                    self.state = HeaderState::Type;
                }
                HeaderState::Type => {
                    if buf.len() < 4 {
                        return Ok(ParseOutcome::NeedMore);
                    }
                    let total_length = buf.get_u32_le();
                    self.raw.extend_from_slice(&total_length.to_le_bytes());
                    self.header.length = total_length;
                    self.state = HeaderState::Length;
                }
                HeaderState::Length => {
                    self.state = if self.header.flags.encrypted() {
                        HeaderState::Iv
                    } else {
                        HeaderState::MessageId
                    };
                }
                HeaderState::Iv => {
                    let iv_len = match self.iv_len {
                        Some(len) => len,
                        None => {
                            if buf.len() < 2 {
                                return Ok(ParseOutcome::NeedMore);
                            }
                            let len = buf.get_u16_le();
                            self.raw.extend_from_slice(&len.to_le_bytes());
                            self.iv_len = Some(len);
                            len
                        }
                    };
                    if buf.len() < iv_len as usize {
                        return Ok(ParseOutcome::NeedMore);
                    }
                    let iv = buf.split_to(iv_len as usize);
                    self.raw.extend_from_slice(&iv);
                    self.header.iv = Some(iv.to_vec());
                    self.state = HeaderState::MessageId;
                }
                HeaderState::MessageId => {
                    if buf.len() < 4 {
                        return Ok(ParseOutcome::NeedMore);
                    }
                    let message_id = buf.get_u32_le();
                    self.raw.extend_from_slice(&message_id.to_le_bytes());
                    self.header.message_id = message_id;
                    self.state = if self.header.flags.is_response() {
                        HeaderState::ResponseId
                    } else {
                        HeaderState::Complete
                    };
                }
                HeaderState::ResponseId => {
                    if buf.len() < 4 {
                        return Ok(ParseOutcome::NeedMore);
                    }
                    let response_message_id = buf.get_u32_le();
                    self.raw.extend_from_slice(&response_message_id.to_le_bytes());
                    self.header.response_message_id = Some(response_message_id);
                    self.state = HeaderState::Complete;
                }
                HeaderState::Complete => {
                    return Ok(ParseOutcome::Ready {
                        header: self.header.clone(),
                        raw: std::mem::take(&mut self.raw),
                    });
                }
            }
        }
    }
}

/// Writes a header in the same field order [`HeaderParser`] reads it,
/// returning the raw header bytes (for signing) alongside the header
/// value with `length` left at whatever the caller passed in (the caller
/// backpatches it once the payload length is known).
pub fn write_header(writer: &mut tempest_wire::FrameWriter, header: &Header) -> FrameResult<()> {
    writer.write_u8(header.protocol_id);
    writer.write_u8(header.flags.bits());
    writer.write_u32(header.connection_id);
    writer.write_u16(header.message_type);
    writer.write_u32(header.length);
    if header.flags.encrypted() {
        let iv = header
            .iv
            .as_deref()
            .ok_or(FrameError::Malformed("encrypted header missing iv"))?;
        writer.write_u16(u16::try_from(iv.len()).map_err(|_| FrameError::Malformed("iv too long"))?);
        writer.write_raw(iv);
    }
    writer.write_u32(header.message_id);
    if header.flags.is_response() {
        let response_message_id = header
            .response_message_id
            .ok_or(FrameError::Malformed("is_response header missing response_message_id"))?;
        writer.write_u32(response_message_id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempest_protocol::MessageFlags;

    fn sample_header(encrypted: bool, is_response: bool) -> Header {
        Header {
            protocol_id: 2,
            connection_id: 7,
            message_type: 42,
            length: 0,
            iv: if encrypted { Some(vec![1, 2, 3, 4]) } else { None },
            message_id: 99,
            flags: MessageFlags::new(encrypted, true, is_response),
            response_message_id: if is_response { Some(5) } else { None },
        }
    }

    fn encode(header: &Header) -> Vec<u8> {
        let mut writer = tempest_wire::FrameWriter::new();
        write_header(&mut writer, header).unwrap();
        writer.flush()
    }

    #[test]
    fn round_trips_plain_header() {
        let header = sample_header(false, false);
        let bytes = encode(&header);
        let mut buf = BytesMut::from(&bytes[..]);
        let mut parser = HeaderParser::new();
        match parser.advance(&mut buf).unwrap() {
            ParseOutcome::Ready { header: parsed, raw } => {
                assert_eq!(parsed.protocol_id, header.protocol_id);
                assert_eq!(parsed.connection_id, header.connection_id);
                assert_eq!(parsed.message_type, header.message_type);
                assert_eq!(parsed.message_id, header.message_id);
                assert_eq!(raw, bytes);
            }
            ParseOutcome::NeedMore => panic!("expected a complete header"),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn round_trips_encrypted_response_header() {
        let header = sample_header(true, true);
        let bytes = encode(&header);
        let mut buf = BytesMut::from(&bytes[..]);
        let mut parser = HeaderParser::new();
        match parser.advance(&mut buf).unwrap() {
            ParseOutcome::Ready { header: parsed, raw } => {
                assert_eq!(parsed.iv, header.iv);
                assert_eq!(parsed.response_message_id, header.response_message_id);
                assert_eq!(raw, bytes);
            }
            ParseOutcome::NeedMore => panic!("expected a complete header"),
        }
    }

    #[test]
    fn resumes_across_byte_by_byte_delivery() {
        let header = sample_header(true, true);
        let bytes = encode(&header);
        let mut parser = HeaderParser::new();
        let mut delivered = BytesMut::new();
        let mut result = None;
        for byte in &bytes {
            delivered.extend_from_slice(&[*byte]);
            match parser.advance(&mut delivered).unwrap() {
                ParseOutcome::NeedMore => continue,
                ready @ ParseOutcome::Ready { .. } => {
                    result = Some(ready);
                    break;
                }
            }
        }
        let ParseOutcome::Ready { header: parsed, .. } = result.expect("header eventually completes") else {
            unreachable!()
        };
        assert_eq!(parsed.connection_id, header.connection_id);
        assert_eq!(parsed.iv, header.iv);
    }
}
