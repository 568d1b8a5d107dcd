//! Random-access writing to a [`crate::gridfs::GridFile`]: a single pending
//! chunk acts as a write-through cache so that writes at arbitrary offsets
//! only ever read-modify-write the one or two chunks they actually touch.
//!
//! Ported from the three-phase write algorithm in `gridfile_write_buffer`
//! (`original_source/src/gridfs.c`): a possibly-partial leading chunk
//! (flushed once full), a run of whole chunks written straight through,
//! and a possibly-partial trailing chunk — loaded for read-modify-write
//! only when the write is overwriting existing data rather than
//! appending past the current end of file.

use bson::doc;

use crate::constant::{GridFileFlags, UpdateFlags};
use crate::error::Result;
use crate::gridfs::chunk::{find_chunk, remove_chunks_from, upsert_chunk};
use crate::gridfs::file::GridFile;
use crate::sync::conn::Conn;

/// The single chunk currently staged for read-modify-write, keyed by its
/// chunk index. Mirrors the `pendingData`/`pendingDataSize`/`pendingChunk`
/// fields of `gridfile_t`.
#[derive(Debug)]
pub struct PendingChunk {
    pub chunk_num: i64,
    pub data: Vec<u8>,
}

impl GridFile {
    pub(crate) fn flush_pending(&mut self, conn: &mut Conn, chunks_ns: &str) -> Result<()> {
        if let Some(pending) = self.pending.take() {
            if !pending.data.is_empty() {
                upsert_chunk(
                    conn,
                    chunks_ns,
                    self.transform.as_ref(),
                    &self.id,
                    pending.chunk_num,
                    &pending.data,
                )?;
            }
        }
        Ok(())
    }

    /// Returns the pending chunk for `chunk_num`, loading it from the
    /// server first if the currently staged chunk (if any) is a different
    /// index. `Option::insert` hands back the freshly stored value's
    /// reference directly, so callers never need to re-borrow `self.pending`.
    fn ensure_pending_loaded(
        &mut self,
        conn: &mut Conn,
        chunks_ns: &str,
        chunk_num: i64,
    ) -> Result<&mut PendingChunk> {
        if let Some(pending) = &mut self.pending {
            if pending.chunk_num == chunk_num {
                return Ok(pending);
            }
        }
        self.flush_pending(conn, chunks_ns)?;
        let data = find_chunk(conn, chunks_ns, self.transform.as_ref(), &self.id, chunk_num)?
            .unwrap_or_default();
        Ok(self.pending.insert(PendingChunk { chunk_num, data }))
    }

    /// Writes `data` starting at the current position, advancing it.
    /// Mirrors `gridfile_write_buffer`.
    pub fn write(&mut self, conn: &mut Conn, chunks_ns: &str, mut data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let chunk_size = self.chunk_size as usize;

        // Phase 1: a partial leading chunk, if the current position isn't
        // chunk-aligned.
        let offset_in_chunk = (self.pos % self.chunk_size) as usize;
        if offset_in_chunk != 0 {
            let chunk_num = self.pos / self.chunk_size;
            let space = chunk_size - offset_in_chunk;
            let take = space.min(data.len());
            let pending = self.ensure_pending_loaded(conn, chunks_ns, chunk_num)?;
            if pending.data.len() < offset_in_chunk + take {
                pending.data.resize(offset_in_chunk + take, 0);
            }
            pending.data[offset_in_chunk..offset_in_chunk + take].copy_from_slice(&data[..take]);
            data = &data[take..];
            self.pos += take as i64;
            self.length = self.length.max(self.pos);
            if offset_in_chunk + take == chunk_size {
                self.flush_pending(conn, chunks_ns)?;
            }
        }

        // Phase 2: whole chunks, written straight through without ever
        // being staged as pending.
        while data.len() >= chunk_size {
            let chunk_num = self.pos / self.chunk_size;
            upsert_chunk(
                conn,
                chunks_ns,
                self.transform.as_ref(),
                &self.id,
                chunk_num,
                &data[..chunk_size],
            )?;
            data = &data[chunk_size..];
            self.pos += chunk_size as i64;
            self.length = self.length.max(self.pos);
        }

        // Phase 3: a partial trailing chunk. Only read-modify-write it if
        // this write is overwriting bytes that already exist past the end
        // of the new data; a pure append past the old end of file starts
        // from an empty pending chunk.
        if !data.is_empty() {
            let chunk_num = self.pos / self.chunk_size;
            let overwriting_existing = self.pos + data.len() as i64 < self.length;
            let offset_in_chunk = (self.pos % self.chunk_size) as usize;
            let pending = if overwriting_existing {
                self.ensure_pending_loaded(conn, chunks_ns, chunk_num)?
            } else {
                self.flush_pending(conn, chunks_ns)?;
                self.pending.insert(PendingChunk {
                    chunk_num,
                    data: Vec::new(),
                })
            };
            if pending.data.len() < offset_in_chunk + data.len() {
                pending.data.resize(offset_in_chunk + data.len(), 0);
            }
            pending.data[offset_in_chunk..offset_in_chunk + data.len()].copy_from_slice(data);
            self.pos += data.len() as i64;
            self.length = self.length.max(self.pos);
        }

        Ok(())
    }

    /// Shrinks or (no-op) grows the file to `new_size`. Mirrors
    /// `gridfile_truncate`: growing past the current length does nothing
    /// but seek to the current end; shrinking to zero drops every chunk;
    /// shrinking to a non-boundary size read-modify-writes the chunk that
    /// straddles the new end before deleting everything after it.
    pub fn truncate(&mut self, conn: &mut Conn, chunks_ns: &str, new_size: i64) -> Result<()> {
        let new_size = new_size.max(0);

        if new_size > self.length {
            self.seek(conn, chunks_ns, self.length)?;
            return Ok(());
        }

        if new_size == 0 {
            self.flush_pending(conn, chunks_ns)?;
            remove_chunks_from(conn, chunks_ns, &self.id, None)?;
            self.length = 0;
            self.pos = 0;
            return Ok(());
        }

        let delete_from_chunk = new_size / self.chunk_size;
        self.seek(conn, chunks_ns, new_size)?;

        let boundary_aligned = new_size % self.chunk_size == 0;
        let delete_from = if boundary_aligned {
            delete_from_chunk
        } else {
            let pending = self.ensure_pending_loaded(conn, chunks_ns, delete_from_chunk)?;
            let keep = (new_size % self.chunk_size) as usize;
            pending.data.truncate(keep);
            self.flush_pending(conn, chunks_ns)?;
            delete_from_chunk + 1
        };

        remove_chunks_from(conn, chunks_ns, &self.id, Some(delete_from))?;
        self.length = new_size;
        Ok(())
    }

    /// Flushes any pending write and upserts the file-metadata document,
    /// fixing `length`/`md5` as of the bytes now on the server. Mirrors
    /// `gridfile_writer_done`: flush the pending buffer, then the upsert
    /// is the observable commit point — a reader sees either the old file
    /// (pre-open) or the fully written new one, never a half-written one,
    /// because chunk writes already landed and only the metadata flips.
    pub fn close(&mut self, conn: &mut Conn, chunks_ns: &str, files_ns: &str) -> Result<()> {
        self.flush_pending(conn, chunks_ns)?;

        let md5 = if self.flags.contains(GridFileFlags::NO_MD5) {
            String::new()
        } else {
            self.compute_md5(conn, chunks_ns)?
        };

        let filename_field = if self.case_insensitive {
            self.filename.to_uppercase()
        } else {
            self.filename.clone()
        };
        let mut metadata = doc! {
            "filename": filename_field,
            "length": self.length,
            "chunkSize": self.chunk_size,
            "uploadDate": bson::DateTime::now(),
            "md5": md5,
            "flags": self.flags.bits(),
        };
        if self.case_insensitive {
            metadata.insert("realFilename", self.filename.clone());
        }
        if let Some(content_type) = &self.content_type {
            metadata.insert("contentType", content_type.clone());
        }

        conn.update(
            files_ns,
            &doc! {"_id": self.id.clone()},
            &metadata,
            UpdateFlags::UPSERT,
        )
    }

    fn compute_md5(&mut self, conn: &mut Conn, chunks_ns: &str) -> Result<String> {
        use md5::{Digest, Md5};

        let mut hasher = Md5::new();
        let num_chunks = if self.chunk_size == 0 {
            0
        } else {
            (self.length + self.chunk_size - 1) / self.chunk_size
        };
        for n in 0..num_chunks {
            if let Some(data) = find_chunk(conn, chunks_ns, self.transform.as_ref(), &self.id, n)? {
                hasher.update(&data);
            }
        }
        Ok(hasher.finalize().iter().map(|b| format!("{b:02x}")).collect())
    }
}
