//! Chunk key/document helpers, mirroring `gridfile_prepare_chunk_key_bson`
//! and the chunk insert/find calls scattered through
//! `original_source/src/gridfs.c`.

use bson::{doc, Bson, Document};

use crate::constant::{InsertFlags, UpdateFlags};
use crate::error::Result;
use crate::gridfs::transform::ChunkTransform;
use crate::sync::conn::Conn;

/// The `{n, files_id}` selector that uniquely identifies a chunk. Field
/// order here matches the original (`n` before `files_id`); a bson
/// document is matched as a set of fields, not positionally, so this has
/// no effect on correctness.
pub fn chunk_key(files_id: &Bson, n: i64) -> Document {
    doc! { "n": n, "files_id": files_id.clone() }
}

/// Upserts chunk `n` of `files_id` with `data`, running it through the
/// store's pre-process transform first.
pub fn upsert_chunk(
    conn: &mut Conn,
    chunks_ns: &str,
    transform: &dyn ChunkTransform,
    files_id: &Bson,
    n: i64,
    data: &[u8],
) -> Result<()> {
    let processed = transform.pre_process(data);
    let chunk_doc = doc! {
        "files_id": files_id.clone(),
        "n": n,
        "data": Bson::Binary(bson::Binary {
            subtype: bson::spec::BinarySubtype::Generic,
            bytes: processed.into_owned(),
        }),
    };
    conn.update(
        chunks_ns,
        &chunk_key(files_id, n),
        &chunk_doc,
        UpdateFlags::UPSERT,
    )
}

/// Plain (non-upserting) chunk insert, used by the sequential bulk-store
/// path (`gridfs_store_buffer`/`gridfs_store_file`) which never overwrites
/// an existing chunk.
pub fn insert_chunk(
    conn: &mut Conn,
    chunks_ns: &str,
    transform: &dyn ChunkTransform,
    files_id: &Bson,
    n: i64,
    data: &[u8],
) -> Result<()> {
    let processed = transform.pre_process(data);
    let chunk_doc = doc! {
        "files_id": files_id.clone(),
        "n": n,
        "data": Bson::Binary(bson::Binary {
            subtype: bson::spec::BinarySubtype::Generic,
            bytes: processed.into_owned(),
        }),
    };
    conn.insert(chunks_ns, &[chunk_doc], InsertFlags::empty())
}

/// Fetches a single chunk's raw `data` bytes, post-processed, or `None`
/// if no chunk `n` exists for `files_id`.
pub fn find_chunk(
    conn: &mut Conn,
    chunks_ns: &str,
    transform: &dyn ChunkTransform,
    files_id: &Bson,
    n: i64,
) -> Result<Option<Vec<u8>>> {
    let reply = conn.query(
        chunks_ns,
        crate::constant::QueryFlags::empty(),
        0,
        -1,
        &chunk_key(files_id, n),
        None,
    )?;
    Ok(extract_chunk_data(reply.documents.into_iter().next(), transform))
}

/// Fetches chunks `n >= start_n`, ascending, up to `limit`, used by
/// sequential reads that may span several chunks.
pub fn find_chunks_from(
    conn: &mut Conn,
    chunks_ns: &str,
    transform: &dyn ChunkTransform,
    files_id: &Bson,
    start_n: i64,
    limit: i32,
) -> Result<Vec<Vec<u8>>> {
    let selector = doc! {
        "files_id": files_id.clone(),
        "n": { "$gte": start_n },
    };
    let reply = conn.query(
        chunks_ns,
        crate::constant::QueryFlags::empty(),
        0,
        limit,
        &selector,
        None,
    )?;
    Ok(reply
        .documents
        .into_iter()
        .filter_map(|doc| extract_chunk_data(Some(doc), transform))
        .collect())
}

fn extract_chunk_data(doc: Option<Document>, transform: &dyn ChunkTransform) -> Option<Vec<u8>> {
    let doc = doc?;
    match doc.get("data") {
        Some(Bson::Binary(bin)) => Some(transform.post_process(&bin.bytes).into_owned()),
        _ => None,
    }
}

/// Removes chunks for `files_id`. When `from_n` is `None`, every chunk is
/// removed (mirrors passing a negative `deleteFromChunk` to
/// `gridfile_remove_chunks`); otherwise only chunks `n >= from_n`.
pub fn remove_chunks_from(
    conn: &mut Conn,
    chunks_ns: &str,
    files_id: &Bson,
    from_n: Option<i64>,
) -> Result<()> {
    let selector = match from_n {
        Some(from_n) => doc! { "files_id": files_id.clone(), "n": { "$gte": from_n } },
        None => doc! { "files_id": files_id.clone() },
    };
    conn.delete(
        chunks_ns,
        &selector,
        crate::constant::DeleteFlags::empty(),
    )
}
