pub mod buffer;
pub mod conn;

pub use buffer::AsyncBuffer;
pub use conn::{AsyncConn, PollMask};
