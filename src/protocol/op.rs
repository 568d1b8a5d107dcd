//! Builders for the outgoing message bodies: `OP_QUERY`, `OP_INSERT`,
//! `OP_UPDATE`, `OP_DELETE`, `OP_GET_MORE` and `OP_KILL_CURSORS`.
//!
//! Each builder returns the full message (header included) ready to hand
//! to a [`crate::sync::stream::Stream`] or append to a
//! [`crate::pipeline::buffer::AsyncBuffer`]. Grounded in the wire layouts
//! from `mongo_insert`/`mongo_update`/`mongo_remove`/`mongo_find_request`/
//! `mongo_cursor_get_more`/`mongo_cursor_destroy` in the original C driver,
//! following the "one free function per message kind" style of
//! `zero-mysql::protocol::command::utility`.

use bson::Document;

use crate::constant::{DeleteFlags, InsertFlags, OpCode, QueryFlags, UpdateFlags};
use crate::error::Error;
use crate::protocol::header::MessageHeader;
use crate::protocol::primitive::{write_cstring, write_i32};

fn finish(mut body: Vec<u8>, request_id: i32, op_code: OpCode) -> Result<Vec<u8>, Error> {
    let total_len = i32::try_from(body.len() + 16)
        .map_err(|_| Error::bug("message body exceeds i32::MAX"))?;
    let mut message = Vec::with_capacity(body.len() + 16);
    MessageHeader::new(total_len, request_id, 0, op_code).write_to(&mut message);
    message.append(&mut body);
    Ok(message)
}

fn encode_document(doc: &Document) -> Result<Vec<u8>, Error> {
    let mut buf = Vec::new();
    doc.to_writer(&mut buf)?;
    Ok(buf)
}

pub fn build_query(
    request_id: i32,
    flags: QueryFlags,
    full_collection_name: &str,
    number_to_skip: i32,
    number_to_return: i32,
    query: &Document,
    return_field_selector: Option<&Document>,
) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    write_i32(&mut body, flags.bits());
    write_cstring(&mut body, full_collection_name);
    write_i32(&mut body, number_to_skip);
    write_i32(&mut body, number_to_return);
    body.extend_from_slice(&encode_document(query)?);
    if let Some(selector) = return_field_selector {
        body.extend_from_slice(&encode_document(selector)?);
    }
    finish(body, request_id, OpCode::Query)
}

pub fn build_get_more(
    request_id: i32,
    full_collection_name: &str,
    number_to_return: i32,
    cursor_id: i64,
) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    write_i32(&mut body, 0); // reserved
    write_cstring(&mut body, full_collection_name);
    write_i32(&mut body, number_to_return);
    body.extend_from_slice(&cursor_id.to_le_bytes());
    finish(body, request_id, OpCode::GetMore)
}

pub fn build_kill_cursors(request_id: i32, cursor_ids: &[i64]) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    write_i32(&mut body, 0); // reserved
    write_i32(
        &mut body,
        i32::try_from(cursor_ids.len()).map_err(|_| Error::bug("too many cursor ids"))?,
    );
    for id in cursor_ids {
        body.extend_from_slice(&id.to_le_bytes());
    }
    finish(body, request_id, OpCode::KillCursors)
}

pub fn build_insert(
    request_id: i32,
    flags: InsertFlags,
    full_collection_name: &str,
    documents: &[Document],
) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    write_i32(&mut body, flags.bits());
    write_cstring(&mut body, full_collection_name);
    for doc in documents {
        body.extend_from_slice(&encode_document(doc)?);
    }
    finish(body, request_id, OpCode::Insert)
}

pub fn build_update(
    request_id: i32,
    flags: UpdateFlags,
    full_collection_name: &str,
    selector: &Document,
    update: &Document,
) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    write_i32(&mut body, 0); // reserved
    write_cstring(&mut body, full_collection_name);
    write_i32(&mut body, flags.bits());
    body.extend_from_slice(&encode_document(selector)?);
    body.extend_from_slice(&encode_document(update)?);
    finish(body, request_id, OpCode::Update)
}

pub fn build_delete(
    request_id: i32,
    flags: DeleteFlags,
    full_collection_name: &str,
    selector: &Document,
) -> Result<Vec<u8>, Error> {
    let mut body = Vec::new();
    write_i32(&mut body, 0); // reserved
    write_cstring(&mut body, full_collection_name);
    write_i32(&mut body, flags.bits());
    body.extend_from_slice(&encode_document(selector)?);
    finish(body, request_id, OpCode::Delete)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_message_length_matches_header() {
        let doc = bson::doc! {"x": 1};
        let msg = build_query(1, QueryFlags::empty(), "db.coll", 0, 0, &doc, None).unwrap();
        let header = MessageHeader::parse(&msg).unwrap();
        assert_eq!(header.message_length as usize, msg.len());
        assert_eq!(header.op_code().unwrap(), OpCode::Query);
    }

    #[test]
    fn kill_cursors_encodes_count_and_ids() {
        let msg = build_kill_cursors(1, &[10, 20]).unwrap();
        let header_len = 16;
        // reserved(4) + count(4) + 2*i64
        assert_eq!(msg.len(), header_len + 4 + 4 + 16);
    }
}
