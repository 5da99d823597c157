//! Client wire framing (§6, "Client wire framing").
//!
//! The core never requires these functions on its own dispatch path — a
//! [`crate::transport::TransportServer`] implementation already hands the
//! [`crate::session::SessionAdapter`] pre-parsed [`crate::transport::InboundFrame`]s
//! and receives structured [`Packet`]s back. This module exists so an
//! embedding application writing that `TransportServer` doesn't have to
//! hand-roll the length-prefixed layout §6 fixes: little-endian,
//! `[length][msg_id_len][msg_id][msg_seq][stage_id][payload]` inbound,
//! the same shape plus `error_code`/`original_size` outbound.

// Layer 1: Standard library imports
use std::convert::TryInto;

// Layer 2: Third-party crate imports
use bytes::{Bytes, BytesMut};

// Layer 3: Internal module imports
use crate::error::{ErrorCode, SessionError};
use crate::packet::{Packet, Payload};
use crate::transport::InboundFrame;
use crate::util::{MsgSeq, StageId};

const LENGTH_FIELD_BYTES: usize = 4;
const MSG_ID_LEN_FIELD_BYTES: usize = 1;
const MSG_SEQ_FIELD_BYTES: usize = 2;
const STAGE_ID_FIELD_BYTES: usize = 8;
const ERROR_CODE_FIELD_BYTES: usize = 2;
const ORIGINAL_SIZE_FIELD_BYTES: usize = 4;

/// Decodes one complete request frame, `length` field included
/// (§6). `bytes` must be exactly one frame: `length` plus the
/// `length` field itself.
///
/// Constraints enforced per §6: `msg_id_len > 0`, `length > 0`,
/// `length <= max_packet_size`.
pub fn decode_request_frame(bytes: &[u8], max_packet_size: u32) -> Result<InboundFrame, SessionError> {
    if bytes.len() < LENGTH_FIELD_BYTES {
        return Err(SessionError::EmptyFrame);
    }
    let length = u32::from_le_bytes(bytes[0..4].try_into().expect("checked length"));
    if length == 0 {
        return Err(SessionError::EmptyFrame);
    }
    if length > max_packet_size {
        return Err(SessionError::FrameTooLarge { size: length, max: max_packet_size });
    }

    let body = &bytes[LENGTH_FIELD_BYTES..];
    if (body.len() as u64) < length as u64 {
        return Err(SessionError::EmptyFrame);
    }
    decode_request_body(&body[..length as usize])
}

/// Decodes the body of a request frame — everything after the `length`
/// field — into an [`InboundFrame`].
pub fn decode_request_body(body: &[u8]) -> Result<InboundFrame, SessionError> {
    let mut cursor = 0usize;

    if body.len() < MSG_ID_LEN_FIELD_BYTES {
        return Err(SessionError::EmptyMsgId);
    }
    let msg_id_len = body[cursor] as usize;
    cursor += MSG_ID_LEN_FIELD_BYTES;
    if msg_id_len == 0 {
        return Err(SessionError::EmptyMsgId);
    }

    if body.len() < cursor + msg_id_len + MSG_SEQ_FIELD_BYTES + STAGE_ID_FIELD_BYTES {
        return Err(SessionError::EmptyFrame);
    }
    let msg_id = std::str::from_utf8(&body[cursor..cursor + msg_id_len])
        .map_err(|_| SessionError::InvalidMsgIdEncoding)?
        .to_string();
    cursor += msg_id_len;

    let msg_seq = u16::from_le_bytes(body[cursor..cursor + MSG_SEQ_FIELD_BYTES].try_into().expect("checked len"));
    cursor += MSG_SEQ_FIELD_BYTES;

    let stage_id = StageId::from_le_bytes(body[cursor..cursor + STAGE_ID_FIELD_BYTES].try_into().expect("checked len"));
    cursor += STAGE_ID_FIELD_BYTES;

    let payload = Payload::zero_copy(Bytes::copy_from_slice(&body[cursor..]));

    Ok(InboundFrame {
        msg_id,
        msg_seq: MsgSeq(msg_seq),
        stage_id,
        payload,
    })
}

/// Encodes a response frame, `length` field included (§6).
/// `original_size` is always written as `0` (uncompressed); this crate
/// does not implement payload compression.
pub fn encode_response(packet: &Packet) -> Vec<u8> {
    let msg_id_bytes = packet.msg_id.as_bytes();
    debug_assert!(!msg_id_bytes.is_empty() && msg_id_bytes.len() <= u8::MAX as usize);

    let body_len = MSG_ID_LEN_FIELD_BYTES
        + msg_id_bytes.len()
        + MSG_SEQ_FIELD_BYTES
        + STAGE_ID_FIELD_BYTES
        + ERROR_CODE_FIELD_BYTES
        + ORIGINAL_SIZE_FIELD_BYTES
        + packet.payload.len();

    let mut buf = BytesMut::with_capacity(LENGTH_FIELD_BYTES + body_len);
    buf.extend_from_slice(&(body_len as u32).to_le_bytes());
    buf.extend_from_slice(&[msg_id_bytes.len() as u8]);
    buf.extend_from_slice(msg_id_bytes);
    buf.extend_from_slice(&packet.msg_seq.0.to_le_bytes());
    buf.extend_from_slice(&packet.stage_id.to_le_bytes());
    buf.extend_from_slice(&packet.error_code.code().to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(packet.payload.as_slice());
    buf.to_vec()
}

/// Convenience: `encode_response` for an error with no payload, the shape
/// the Dispatcher and session adapter build for rejected requests.
pub fn encode_error_response(msg_id: &str, msg_seq: MsgSeq, stage_id: StageId, error_code: ErrorCode) -> Vec<u8> {
    let mut packet = Packet::request(msg_id, stage_id, Payload::empty()).with_seq(msg_seq);
    packet.error_code = error_code;
    packet.is_reply = true;
    encode_response(&packet)
}
