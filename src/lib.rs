pub mod constant;
pub mod error;
pub mod opts;
pub mod protocol;

#[cfg(feature = "pipeline")]
pub mod pipeline;

#[cfg(feature = "sync")]
pub mod sync;

// Command helpers and GridFS are both built on the blocking `Conn`.
#[cfg(feature = "sync")]
pub mod command;
#[cfg(feature = "sync")]
pub mod gridfs;

pub use error::{Error, Result};
pub use opts::{Endpoint, Opts};

#[cfg(feature = "sync")]
pub use sync::{Conn, Cursor};
