use bitflags::bitflags;

/// Operation codes carried in the message header (`opCode`).
///
/// Mirrors `zero-mysql::constant::CommandByte` in shape: a small
/// `#[repr(i32)]` enum with a fallible `from_i32` rather than a derive,
/// since the wire value space is sparse (not `0..=N`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum OpCode {
    Reply = 1,
    Msg = 1000,
    Update = 2001,
    Insert = 2002,
    Query = 2004,
    GetMore = 2005,
    Delete = 2006,
    KillCursors = 2007,
}

impl OpCode {
    pub fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Reply),
            1000 => Some(Self::Msg),
            2001 => Some(Self::Update),
            2002 => Some(Self::Insert),
            2004 => Some(Self::Query),
            2005 => Some(Self::GetMore),
            2006 => Some(Self::Delete),
            2007 => Some(Self::KillCursors),
            _ => None,
        }
    }
}

bitflags! {
    /// `OP_UPDATE` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UpdateFlags: i32 {
        const UPSERT = 1 << 0;
        const MULTI_UPDATE = 1 << 1;
    }
}

bitflags! {
    /// `OP_INSERT` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InsertFlags: i32 {
        const CONTINUE_ON_ERROR = 1 << 0;
    }
}

bitflags! {
    /// `OP_QUERY` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct QueryFlags: i32 {
        const TAILABLE_CURSOR = 1 << 1;
        const SLAVE_OK = 1 << 2;
        const OPLOG_REPLAY = 1 << 3;
        const NO_CURSOR_TIMEOUT = 1 << 4;
        const AWAIT_DATA = 1 << 5;
        const EXHAUST = 1 << 6;
        const PARTIAL = 1 << 7;
    }
}

bitflags! {
    /// `OP_DELETE` flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeleteFlags: i32 {
        const SINGLE_REMOVE = 1 << 0;
    }
}

bitflags! {
    /// Per-file GridFS flags, mirroring `gridfs.h`'s `GRIDFILE_NOMD5`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GridFileFlags: i32 {
        /// Skip computing the stored file's MD5; `md5` is left `""`.
        const NO_MD5 = 1 << 0;
    }
}

bitflags! {
    /// Reply `responseFlags`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ReplyFlags: i32 {
        const CURSOR_NOT_FOUND = 1 << 0;
        const QUERY_FAILURE = 1 << 1;
        const SHARD_CONFIG_STALE = 1 << 2;
        const AWAIT_CAPABLE = 1 << 3;
    }
}

/// Size of the fixed 16-byte message header (4 little-endian `i32` fields).
pub const HEADER_SIZE: usize = 16;

/// Largest reply this client will accept, mirrors the original's 64 MiB
/// sanity bound on `mongo_read_response`.
pub const MAX_REPLY_SIZE: usize = 64 * 1024 * 1024;

/// Smallest legal reply: header (16) + reply-header fields (20) = 36 bytes.
pub const MIN_REPLY_SIZE: usize = 36;

/// Default GridFS chunk size, 256 KiB, matches `DEFAULT_CHUNK_SIZE` in the
/// original `gridfs.c`.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Default GridFS namespace prefix ("fs.files" / "fs.chunks").
pub const DEFAULT_GRIDFS_PREFIX: &str = "fs";

/// Smallest allowed size for the async elastic buffer (spec.md §4.C).
pub const MIN_BUFFER_SIZE: usize = 512;
