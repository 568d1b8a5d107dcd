//! Parsing of `OP_REPLY` messages: the 20-byte reply header that follows
//! the common message header, and the `numberReturned` documents after it.

use bson::Document;

use crate::constant::{ReplyFlags, HEADER_SIZE, MIN_REPLY_SIZE};
use crate::error::Error;
use crate::protocol::header::MessageHeader;
use crate::protocol::primitive::{read_i32, read_i64};

/// The reply-specific header fields, immediately following [`MessageHeader`].
#[derive(Debug, Clone, Copy)]
pub struct ReplyHeader {
    pub response_flags: ReplyFlags,
    pub cursor_id: i64,
    pub starting_from: i32,
    pub number_returned: i32,
}

/// A fully parsed `OP_REPLY`: header, reply header, and decoded documents.
#[derive(Debug, Clone)]
pub struct Reply {
    pub message_header: MessageHeader,
    pub reply_header: ReplyHeader,
    pub documents: Vec<Document>,
}

impl Reply {
    /// Parses a complete reply message (header included) from `data`.
    ///
    /// Enforces spec.md's size bounds: `[MIN_REPLY_SIZE, MAX_REPLY_SIZE]`,
    /// mirroring `mongo_read_response`'s 36-byte/64 MiB sanity checks.
    pub fn parse(data: &[u8]) -> Result<Self, Error> {
        if data.len() < MIN_REPLY_SIZE {
            return Err(Error::Protocol(format!(
                "reply shorter than minimum {MIN_REPLY_SIZE} bytes: got {}",
                data.len()
            )));
        }

        let message_header = MessageHeader::parse(data)?;
        if message_header.message_length as usize != data.len() {
            return Err(Error::Protocol(format!(
                "reply length mismatch: header says {}, got {}",
                message_header.message_length,
                data.len()
            )));
        }

        let mut offset = HEADER_SIZE;
        let response_flags = ReplyFlags::from_bits_truncate(read_i32(data, offset)?);
        offset += 4;
        let cursor_id = read_i64(data, offset)?;
        offset += 8;
        let starting_from = read_i32(data, offset)?;
        offset += 4;
        let number_returned = read_i32(data, offset)?;
        offset += 4;

        if response_flags.contains(ReplyFlags::QUERY_FAILURE) {
            let err_doc = Document::from_reader(&data[offset..]).ok();
            let message = err_doc
                .as_ref()
                .and_then(|doc| doc.get_str("$err").ok())
                .unwrap_or("query failed")
                .to_string();
            return Err(Error::Command(message));
        }

        let number_returned_usize = usize::try_from(number_returned)
            .map_err(|_| Error::Protocol(format!("negative numberReturned {number_returned}")))?;
        let mut documents = Vec::with_capacity(number_returned_usize);
        let mut cursor = std::io::Cursor::new(&data[offset..]);
        for _ in 0..number_returned_usize {
            let doc = Document::from_reader(&mut cursor)?;
            documents.push(doc);
        }

        Ok(Self {
            message_header,
            reply_header: ReplyHeader {
                response_flags,
                cursor_id,
                starting_from,
                number_returned,
            },
            documents,
        })
    }
}
