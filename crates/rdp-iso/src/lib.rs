//! ISO/T.123 framing: TPKT/X.224 envelopes, fast-path detection, and the
//! connection-time security-protocol negotiation state machine.

mod credssp;
mod error;
mod framer;
mod negotiation;

pub use credssp::CredsspHandoff;
pub use error::{IsoError, IsoErrorKind, IsoResult};
pub use framer::{ConnectResult, Frame, IsoFramer, RESERVED_PREFIX_LEN};
pub use negotiation::NegotiationConfig;
