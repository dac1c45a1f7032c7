//! Blocking TCP transport with an optional TLS overlay, a rotating output
//! buffer pool, and a cooperative UI-poll hook for blocking receives.

mod buffer_pool;
mod error;
mod stream;
mod transport;
mod ui_poll;

pub use buffer_pool::{BufferPool, OutputStream};
pub use error::{TransportError, TransportErrorKind, TransportResult};
pub use transport::{Transport, TransportConfig};
pub use ui_poll::{NeverQuit, PollOutcome, UiPoll};
