use std::fmt;

#[derive(Debug)]
pub enum DvcErrorKind {
    Protocol(&'static str),
    ListenerAlreadyRegistered(String),
}

impl fmt::Display for DvcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(reason) => write!(f, "DVC protocol error: {reason}"),
            Self::ListenerAlreadyRegistered(name) => write!(f, "listener already registered for channel {name:?}"),
        }
    }
}

pub type DvcError = rdp_error::Error<DvcErrorKind>;
pub type DvcResult<T> = Result<T, DvcError>;

pub(crate) fn protocol_error(context: &'static str, reason: &'static str) -> DvcError {
    DvcError::new(context, DvcErrorKind::Protocol(reason))
}

pub(crate) fn from_pdu(context: &'static str, e: rdp_pdu::PduError) -> DvcError {
    DvcError::new(context, DvcErrorKind::Protocol("malformed DVC PDU")).with_source(e)
}
