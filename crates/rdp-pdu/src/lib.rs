//! Wire-format types for the ISO/T.123 framing layer and the dynamic
//! virtual channel protocol. This crate only encodes/decodes bytes; the
//! connection and channel state machines live in `rdp-iso` and `rdp-dvc`.

pub mod dvc;
pub mod error;
pub mod fastpath;
pub mod nego;
pub mod tpkt;
pub mod x224;

pub use error::{PduError, PduErrorKind, PduResult};
