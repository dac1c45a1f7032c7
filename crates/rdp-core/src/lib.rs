//! Cursor and stream-buffer primitives shared by the ISO framing, DVC
//! multiplexer and transport crates.

mod config;
mod cursor;
mod stream_buffer;

pub use config::{ClientConfig, RdpVersion, SmartcardIdentity};
pub use cursor::{ReadCursor, WriteCursor};
pub use stream_buffer::{Layer, StreamBuffer};
