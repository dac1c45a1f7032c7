use std::fmt;

use rdp_error::NotEnoughBytesError;

#[derive(Debug)]
pub enum PduErrorKind {
    NotEnoughBytes(NotEnoughBytesError),
    InvalidMessage { field: &'static str, reason: &'static str },
    UnexpectedMessageType(u8),
    UnsupportedValue { what: &'static str, value: u32 },
}

impl fmt::Display for PduErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PduErrorKind::NotEnoughBytes(e) => write!(f, "{e}"),
            PduErrorKind::InvalidMessage { field, reason } => write!(f, "invalid field `{field}`: {reason}"),
            PduErrorKind::UnexpectedMessageType(ty) => write!(f, "unexpected message type {ty:#04x}"),
            PduErrorKind::UnsupportedValue { what, value } => write!(f, "unsupported {what}: {value:#x}"),
        }
    }
}

pub type PduError = rdp_error::Error<PduErrorKind>;
pub type PduResult<T> = Result<T, PduError>;

impl From<NotEnoughBytesError> for PduErrorKind {
    fn from(e: NotEnoughBytesError) -> Self {
        PduErrorKind::NotEnoughBytes(e)
    }
}

pub(crate) fn invalid_message(context: &'static str, field: &'static str, reason: &'static str) -> PduError {
    PduError::new(context, PduErrorKind::InvalidMessage { field, reason })
}

pub(crate) fn unexpected_message_type(context: &'static str, ty: u8) -> PduError {
    PduError::new(context, PduErrorKind::UnexpectedMessageType(ty))
}

pub(crate) fn unsupported_value(context: &'static str, what: &'static str, value: u32) -> PduError {
    PduError::new(context, PduErrorKind::UnsupportedValue { what, value })
}

pub(crate) fn not_enough_bytes(context: &'static str, e: NotEnoughBytesError) -> PduError {
    PduError::new(context, PduErrorKind::NotEnoughBytes(e))
}
