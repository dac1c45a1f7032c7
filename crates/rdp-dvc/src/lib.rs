//! MS-RDPEDYC dynamic virtual channel multiplexer: reassembles fragmented
//! channel data, tracks which listener owns which server-assigned channel
//! id, and segments outbound writes to fit the wire.

mod channels;
mod error;
mod multiplexer;
mod outbound;
mod reassembly;

pub use channels::DvcListener;
pub use error::{DvcError, DvcErrorKind, DvcResult};
pub use multiplexer::Multiplexer;
pub use outbound::{write_pkt, MAX_PDU, MAX_SINGLE_DATA_PAYLOAD};
pub use reassembly::Reassembly;
