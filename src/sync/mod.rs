pub mod conn;
pub mod cursor;
pub mod stream;

pub use conn::{Conn, Side};
pub use cursor::Cursor;
