//! `GridStore` (a chunked-large-object collection pair) and `GridFile`
//! (one stored object's metadata plus read/seek access), mirroring
//! `gridfs_t`/`gridfile_t` in `original_source/src/gridfs.c`.

use std::io::Read;
use std::sync::Arc;

use bson::{doc, Bson, Document};
use md5::{Digest, Md5};

use crate::command::index::create_index_with_options;
use crate::constant::{
    DeleteFlags, GridFileFlags, InsertFlags, DEFAULT_CHUNK_SIZE, DEFAULT_GRIDFS_PREFIX,
};
use crate::error::{Error, Result};
use crate::gridfs::chunk::{find_chunk, find_chunks_from, insert_chunk, remove_chunks_from};
use crate::gridfs::transform::{ChunkTransform, IdentityTransform};
use crate::gridfs::writer::PendingChunk;
use crate::sync::conn::Conn;

/// A collection pair (`<db>.<prefix>.files` / `<db>.<prefix>.chunks`)
/// holding chunked large objects.
pub struct GridStore {
    db: String,
    prefix: String,
    case_insensitive: bool,
    transform: Arc<dyn ChunkTransform>,
}

impl GridStore {
    /// Opens (and, per `gridfs_init`, ensures the required indexes for)
    /// the `fs` prefix in `db`.
    pub fn new(conn: &mut Conn, db: impl Into<String>) -> Result<Self> {
        Self::with_prefix(conn, db, DEFAULT_GRIDFS_PREFIX)
    }

    pub fn with_prefix(conn: &mut Conn, db: impl Into<String>, prefix: impl Into<String>) -> Result<Self> {
        Self::with_transform(conn, db, prefix, Arc::new(IdentityTransform))
    }

    pub fn with_transform(
        conn: &mut Conn,
        db: impl Into<String>,
        prefix: impl Into<String>,
        transform: Arc<dyn ChunkTransform>,
    ) -> Result<Self> {
        let store = Self {
            db: db.into(),
            prefix: prefix.into(),
            case_insensitive: false,
            transform,
        };
        create_index_with_options(conn, &store.files_ns(), &doc! {"filename": 1}, false)?;
        create_index_with_options(
            conn,
            &store.chunks_ns(),
            &doc! {"files_id": 1, "n": 1},
            true,
        )?;
        Ok(store)
    }

    pub fn files_ns(&self) -> String {
        format!("{}.{}.files", self.db, self.prefix)
    }

    pub fn chunks_ns(&self) -> String {
        format!("{}.{}.chunks", self.db, self.prefix)
    }

    pub fn set_case_insensitive(&mut self, value: bool) {
        self.case_insensitive = value;
    }

    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// Builds the `{filename: ...}` selector used to look a file up by
    /// name. Per spec.md §3, case-insensitive mode stores the uppercased
    /// key in `filename`, so the lookup itself is a plain equality match
    /// on the uppercased name rather than a server-side case-folding
    /// query.
    fn match_filename(&self, filename: &str) -> Document {
        if self.case_insensitive {
            doc! {"filename": filename.to_uppercase()}
        } else {
            doc! {"filename": filename}
        }
    }

    /// Inserts a file's metadata document, matching `gridfs_insert_file`.
    /// `md5` is computed client-side over the bytes just stored unless
    /// `flags` carries [`GridFileFlags::NO_MD5`] (the original instead
    /// issues a server-side `filemd5` command; that command requires a
    /// real server to run the aggregation, so the equivalent digest is
    /// computed here from the bytes this call already has in hand).
    fn insert_file_metadata(
        &self,
        conn: &mut Conn,
        id: &Bson,
        filename: &str,
        content_type: Option<&str>,
        length: i64,
        flags: GridFileFlags,
        md5_hasher: impl FnOnce() -> String,
    ) -> Result<()> {
        let md5 = if flags.contains(GridFileFlags::NO_MD5) {
            String::new()
        } else {
            md5_hasher()
        };
        let filename_field = if self.case_insensitive {
            filename.to_uppercase()
        } else {
            filename.to_string()
        };
        let mut metadata = doc! {
            "_id": id.clone(),
            "filename": filename_field,
            "length": length,
            "chunkSize": DEFAULT_CHUNK_SIZE as i64,
            "uploadDate": bson::DateTime::now(),
            "md5": md5,
            "flags": flags.bits(),
        };
        if self.case_insensitive {
            metadata.insert("realFilename", filename);
        }
        if let Some(content_type) = content_type {
            metadata.insert("contentType", content_type);
        }
        conn.insert(&self.files_ns(), &[metadata], InsertFlags::empty())
    }

    /// Stores an in-memory buffer as a new file, chunking it sequentially.
    /// Mirrors `gridfs_store_buffer`.
    pub fn store_buffer(
        &self,
        conn: &mut Conn,
        filename: &str,
        content_type: Option<&str>,
        data: &[u8],
        flags: GridFileFlags,
    ) -> Result<Bson> {
        let id = Bson::ObjectId(bson::oid::ObjectId::new());
        for (n, piece) in data.chunks(DEFAULT_CHUNK_SIZE).enumerate() {
            insert_chunk(
                conn,
                &self.chunks_ns(),
                self.transform.as_ref(),
                &id,
                n as i64,
                piece,
            )?;
        }
        self.insert_file_metadata(conn, &id, filename, content_type, data.len() as i64, flags, || {
            hex_digest(data)
        })?;
        Ok(id)
    }

    /// Stores the contents of `reader`, reading it in chunk-sized pieces.
    /// Generalizes `gridfs_store_file`'s `FILE*` reads to any [`Read`].
    pub fn store_reader(
        &self,
        conn: &mut Conn,
        filename: &str,
        content_type: Option<&str>,
        mut reader: impl Read,
        flags: GridFileFlags,
    ) -> Result<Bson> {
        let id = Bson::ObjectId(bson::oid::ObjectId::new());
        let mut buf = vec![0u8; DEFAULT_CHUNK_SIZE];
        let mut n: i64 = 0;
        let mut total: i64 = 0;
        let mut hasher = Md5::new();
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            if !flags.contains(GridFileFlags::NO_MD5) {
                hasher.update(&buf[..read]);
            }
            insert_chunk(
                conn,
                &self.chunks_ns(),
                self.transform.as_ref(),
                &id,
                n,
                &buf[..read],
            )?;
            n += 1;
            total += read as i64;
        }
        self.insert_file_metadata(conn, &id, filename, content_type, total, flags, || {
            hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
        })?;
        Ok(id)
    }

    /// Removes every file matching `filename` and all of their chunks.
    /// Mirrors `gridfs_remove_filename`.
    pub fn remove(&self, conn: &mut Conn, filename: &str) -> Result<()> {
        let selector = self.match_filename(filename);
        let reply = conn.query(
            &self.files_ns(),
            crate::constant::QueryFlags::empty(),
            0,
            0,
            &selector,
            None,
        )?;
        for doc in reply.documents {
            let Some(id) = doc.get("_id").cloned() else {
                continue;
            };
            conn.delete(&self.files_ns(), &doc! {"_id": id.clone()}, DeleteFlags::empty())?;
            remove_chunks_from(conn, &self.chunks_ns(), &id, None)?;
        }
        Ok(())
    }

    /// Opens the most recently uploaded file named `filename` for reading.
    pub fn open(&self, conn: &mut Conn, filename: &str) -> Result<Option<GridFile>> {
        let selector = self.match_filename(filename);
        let reply = conn.query(
            &self.files_ns(),
            crate::constant::QueryFlags::empty(),
            0,
            -1,
            &selector,
            None,
        )?;
        Ok(reply.documents.into_iter().next().map(|meta| {
            GridFile::from_meta(meta, self.case_insensitive, self.transform.clone())
        }))
    }

    /// Starts a brand-new file for incremental writing through
    /// [`crate::gridfs::writer`], adopting `filename`'s existing id/length
    /// and flags if it already exists (the caller's `flags` then only
    /// takes effect on [`GridFile::close`]), otherwise generating a new id
    /// and starting from zero length. Mirrors `gridfile_writer_init`.
    pub fn new_file(
        &self,
        conn: &mut Conn,
        filename: &str,
        flags: GridFileFlags,
    ) -> Result<GridFile> {
        if let Some(mut existing) = self.open(conn, filename)? {
            existing.flags = flags;
            return Ok(existing);
        }
        let mut file = GridFile::create_new(DEFAULT_CHUNK_SIZE as i64, self.transform.clone());
        file.filename = filename.to_string();
        file.case_insensitive = self.case_insensitive;
        file.flags = flags;
        Ok(file)
    }
}

fn hex_digest(data: &[u8]) -> String {
    Md5::digest(data).iter().map(|b| format!("{b:02x}")).collect()
}

/// One stored object's metadata, current read/write position and a
/// single-chunk write-through cache. Mirrors `gridfile_t`.
pub struct GridFile {
    /// Set only when this handle was produced from a document actually
    /// read back from `.files`; `None` for a handle just created by
    /// [`GridFile::create_new`] that has not been flushed yet.
    pub(crate) meta: Option<Document>,
    pub(crate) filename: String,
    pub(crate) content_type: Option<String>,
    pub(crate) case_insensitive: bool,
    pub(crate) flags: GridFileFlags,
    pub(crate) id: Bson,
    pub(crate) length: i64,
    pub(crate) chunk_size: i64,
    pub(crate) pos: i64,
    pub(crate) pending: Option<PendingChunk>,
    pub(crate) transform: Arc<dyn ChunkTransform>,
}

impl GridFile {
    fn from_meta(meta: Document, case_insensitive: bool, transform: Arc<dyn ChunkTransform>) -> Self {
        let id = meta.get("_id").cloned().unwrap_or(Bson::Null);
        let filename = meta
            .get_str("realFilename")
            .or_else(|_| meta.get_str("filename"))
            .unwrap_or_default()
            .to_string();
        let content_type = meta.get_str("contentType").ok().map(ToString::to_string);
        let length = meta.get_i64("length").unwrap_or(0);
        let chunk_size = meta
            .get_i64("chunkSize")
            .unwrap_or(DEFAULT_CHUNK_SIZE as i64);
        let flags =
            GridFileFlags::from_bits_truncate(meta.get_i32("flags").unwrap_or(0));
        Self {
            meta: Some(meta),
            filename,
            content_type,
            case_insensitive,
            flags,
            id,
            length,
            chunk_size,
            pos: 0,
            pending: None,
            transform,
        }
    }

    /// Starts a brand-new file with its own id, no pre-existing metadata
    /// and zero length, for incremental writing via
    /// [`crate::gridfs::writer`]. Mirrors `gridfile_writer_init` creating
    /// a fresh id when no existing file matched.
    pub fn create_new(chunk_size: i64, transform: Arc<dyn ChunkTransform>) -> Self {
        Self {
            meta: None,
            filename: String::new(),
            content_type: None,
            case_insensitive: false,
            flags: GridFileFlags::empty(),
            id: Bson::ObjectId(bson::oid::ObjectId::new()),
            length: 0,
            chunk_size,
            pos: 0,
            pending: None,
            transform,
        }
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    /// Corrected form of `gridfile_exists`, whose original predicate
    /// (`gfile != NULL || gfile->meta == NULL`) is always true — the
    /// decided fix (spec.md §9, SPEC_FULL.md §10) is "metadata found and
    /// non-null".
    pub fn exists(&self) -> bool {
        self.meta.is_some()
    }

    pub fn id(&self) -> &Bson {
        &self.id
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn upload_date(&self) -> Option<bson::DateTime> {
        self.meta
            .as_ref()
            .and_then(|m| m.get_datetime("uploadDate").ok().copied())
    }

    pub fn md5(&self) -> Option<&str> {
        self.meta.as_ref().and_then(|m| m.get_str("md5").ok())
    }

    pub fn chunk_size(&self) -> i64 {
        self.chunk_size
    }

    /// Current known length. Flushes a pending write first, since a
    /// pending chunk may have extended the file past its last flushed
    /// `length`, matching `gridfile_get_contentlength`'s implicit flush.
    pub fn content_length(&mut self, conn: &mut Conn, chunks_ns: &str) -> Result<i64> {
        self.flush_pending(conn, chunks_ns)?;
        Ok(self.length)
    }

    /// Ceiling division of length by chunk size; zero-length files have
    /// zero chunks, matching `gridfile_get_numchunks`.
    pub fn num_chunks(&self) -> i64 {
        if self.length == 0 || self.chunk_size == 0 {
            return 0;
        }
        (self.length + self.chunk_size - 1) / self.chunk_size
    }

    /// Reads up to `buf.len()` bytes starting at the current position,
    /// returning the number of bytes actually read. Mirrors
    /// `gridfile_read`.
    pub fn read(&mut self, conn: &mut Conn, chunks_ns: &str, buf: &mut [u8]) -> Result<usize> {
        self.flush_pending(conn, chunks_ns)?;

        let remaining = (self.length - self.pos).max(0);
        let want = (buf.len() as i64).min(remaining);
        if want <= 0 {
            return Ok(0);
        }

        let first_chunk = self.pos / self.chunk_size;
        let last_byte = self.pos + want - 1;
        let last_chunk = last_byte / self.chunk_size;
        let count = i32::try_from(last_chunk - first_chunk + 1)
            .map_err(|_| Error::bug("read spans too many chunks"))?;

        let chunks = find_chunks_from(
            conn,
            chunks_ns,
            self.transform.as_ref(),
            &self.id,
            first_chunk,
            count,
        )?;

        let mut written = 0usize;
        let skip_in_first = (self.pos % self.chunk_size) as usize;
        for (i, chunk) in chunks.iter().enumerate() {
            let start = if i == 0 { skip_in_first } else { 0 };
            if start >= chunk.len() {
                continue;
            }
            let available = chunk.len() - start;
            let take = available.min(want as usize - written);
            buf[written..written + take].copy_from_slice(&chunk[start..start + take]);
            written += take;
            if written >= want as usize {
                break;
            }
        }

        self.pos += written as i64;
        Ok(written)
    }

    /// Moves the read/write position, flushing a pending chunk first if
    /// the seek actually moves. Mirrors `gridfile_seek`.
    pub fn seek(&mut self, conn: &mut Conn, chunks_ns: &str, offset: i64) -> Result<()> {
        let offset = offset.clamp(0, self.length);
        if offset != self.pos {
            self.flush_pending(conn, chunks_ns)?;
        }
        self.pos = offset;
        Ok(())
    }

    /// Writes the file's full contents to `writer`, chunk by chunk.
    /// Mirrors `gridfile_write_file`.
    pub fn write_to(
        &mut self,
        conn: &mut Conn,
        chunks_ns: &str,
        writer: &mut impl std::io::Write,
    ) -> Result<()> {
        let num_chunks = self.num_chunks();
        for n in 0..num_chunks {
            if let Some(data) = find_chunk(conn, chunks_ns, self.transform.as_ref(), &self.id, n)? {
                writer.write_all(&data)?;
            }
        }
        Ok(())
    }
}
