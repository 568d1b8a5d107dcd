use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::{OpCode, HEADER_SIZE};
use crate::error::Error;

/// The fixed 16-byte message header that precedes every wire message, in
/// both directions.
///
/// Layout (all fields little-endian `i32`):
/// - `message_length`: total size of this message, header included
/// - `request_id`: identifies this message, arbitrary
/// - `response_to`: `request_id` of the message this one answers, or 0
/// - `op_code`: see [`OpCode`]
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct MessageHeader {
    pub message_length: i32,
    pub request_id: i32,
    pub response_to: i32,
    pub op_code: i32,
}

impl MessageHeader {
    pub fn new(message_length: i32, request_id: i32, response_to: i32, op_code: OpCode) -> Self {
        Self {
            message_length,
            request_id,
            response_to,
            op_code: op_code as i32,
        }
    }

    /// Parses a header from the front of `data`, which must hold at least
    /// [`HEADER_SIZE`] bytes.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < HEADER_SIZE {
            return Err(Error::Protocol(format!(
                "message header truncated: got {} bytes, need {HEADER_SIZE}",
                data.len()
            )));
        }
        // All fields are plain little-endian i32s with no padding, so a raw
        // byte-by-byte read is simpler and more portable than casting the
        // slice through zerocopy (which would require native-endian target
        // assumptions for a packed struct of i32s). We still derive the
        // zerocopy traits above so `write_message` can treat this as a
        // loss-free wire struct when building outgoing buffers on LE hosts.
        let read_i32 = |offset: usize| {
            let mut bytes = [0u8; 4];
            bytes.copy_from_slice(&data[offset..offset + 4]);
            i32::from_le_bytes(bytes)
        };
        Ok(Self {
            message_length: read_i32(0),
            request_id: read_i32(4),
            response_to: read_i32(8),
            op_code: read_i32(12),
        })
    }

    pub fn op_code(&self) -> Result<OpCode, Error> {
        OpCode::from_i32(self.op_code)
            .ok_or_else(|| Error::Protocol(format!("unsupported opcode {}", self.op_code)))
    }

    /// Appends this header's wire bytes to `out`.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.message_length.to_le_bytes());
        out.extend_from_slice(&self.request_id.to_le_bytes());
        out.extend_from_slice(&self.response_to.to_le_bytes());
        out.extend_from_slice(&self.op_code.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_bytes() {
        let header = MessageHeader::new(123, 7, 0, OpCode::Query);
        let mut buf = Vec::new();
        header.write_to(&mut buf);
        assert_eq!(buf.len(), HEADER_SIZE);

        let parsed = MessageHeader::parse(&buf).unwrap();
        assert_eq!(parsed.message_length, 123);
        assert_eq!(parsed.request_id, 7);
        assert_eq!(parsed.response_to, 0);
        assert_eq!(parsed.op_code().unwrap(), OpCode::Query);
    }

    #[test]
    fn rejects_truncated_header() {
        let err = MessageHeader::parse(&[0u8; 8]).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn rejects_unknown_opcode() {
        let mut buf = Vec::new();
        MessageHeader::new(16, 1, 0, OpCode::Query).write_to(&mut buf);
        buf[12..16].copy_from_slice(&999i32.to_le_bytes());
        let header = MessageHeader::parse(&buf).unwrap();
        assert!(header.op_code().is_err());
    }
}
