use thiserror::Error;

pub use color_eyre::eyre::eyre;

pub type Result<T> = core::result::Result<T, Error>;

/// All errors this crate can surface.
///
/// Variants are grouped the way spec.md §7 groups them: connection errors,
/// network errors, wire-protocol errors, command errors and programming
/// errors (the last of which is a bug in this crate, not in the caller).
#[derive(Debug, Error)]
pub enum Error {
    /// Could not reach any configured endpoint.
    #[error("no socket could be created")]
    NoSocket,

    /// TCP connect failed outright.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// `connect` was called with no usable endpoint.
    #[error("bad connection arguments: {0}")]
    BadArg(String),

    /// Reachable, but not the primary, and no other endpoint to try.
    #[error("connected endpoint is not master")]
    NotMaster,

    /// Operation exceeded its deadline.
    #[error("operation timed out")]
    Timeout,

    /// Partial transfer, zero-length read, or other transport failure.
    #[error("network I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Reply length outside `[36, 64 MiB]`, or a header that couldn't be
    /// decoded at all.
    #[error("malformed wire message: {0}")]
    Protocol(String),

    /// The server answered with `ok: 0` or a non-null `err` field.
    #[error("server error: {0}")]
    Command(String),

    /// A bug in this crate (e.g. a message builder that wrote the wrong
    /// number of bytes). Fatal in both debug and release.
    #[error("internal bug: {0}")]
    Bug(color_eyre::Report),

    #[error("bad configuration: {0}")]
    BadConfig(String),
}

impl Error {
    /// True when the connection this error came from should be considered
    /// dead and not reused (mirrors `zero-mysql`'s `is_conn_broken`).
    pub fn is_conn_broken(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Timeout | Error::Protocol(_) | Error::NotMaster
        )
    }

    pub fn bug(err: impl std::fmt::Debug) -> Self {
        Error::Bug(eyre!(format!("{err:?}")))
    }
}

impl From<bson::de::Error> for Error {
    fn from(err: bson::de::Error) -> Self {
        Error::Protocol(format!("document decode failed: {err}"))
    }
}

impl From<bson::ser::Error> for Error {
    fn from(err: bson::ser::Error) -> Self {
        Error::Bug(eyre!("document encode failed: {err}"))
    }
}
