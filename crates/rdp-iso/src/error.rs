use std::fmt;

use rdp_pdu::nego::FailureCode;

#[derive(Debug)]
pub enum IsoErrorKind {
    Network,
    Protocol(&'static str),
    Negotiation(FailureCode),
}

impl fmt::Display for IsoErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "transport is in the sticky network-error state"),
            Self::Protocol(reason) => write!(f, "protocol error: {reason}"),
            Self::Negotiation(code) => write!(f, "negotiation failed: {code}"),
        }
    }
}

pub type IsoError = rdp_error::Error<IsoErrorKind>;
pub type IsoResult<T> = Result<T, IsoError>;

pub(crate) fn protocol_error(context: &'static str, reason: &'static str) -> IsoError {
    IsoError::new(context, IsoErrorKind::Protocol(reason))
}

pub(crate) fn from_transport(context: &'static str, e: rdp_transport::TransportError) -> IsoError {
    IsoError::new(context, IsoErrorKind::Network).with_source(e)
}

pub(crate) fn from_pdu(context: &'static str, e: rdp_pdu::PduError) -> IsoError {
    IsoError::new(context, IsoErrorKind::Protocol("malformed frame")).with_source(e)
}
