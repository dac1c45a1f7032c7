use std::fmt;
use std::io;

#[derive(Debug)]
pub enum TransportErrorKind {
    Io(io::Error),
    Tls(native_tls::Error),
    NoPeerCertificate,
    NonRsaPeerKey,
    UserQuit,
    NetworkError,
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Tls(e) => write!(f, "TLS error: {e}"),
            Self::NoPeerCertificate => write!(f, "server did not present a certificate"),
            Self::NonRsaPeerKey => write!(f, "server certificate's public key is not RSA"),
            Self::UserQuit => write!(f, "user requested disconnect"),
            Self::NetworkError => write!(f, "transport is in the sticky network-error state"),
        }
    }
}

pub type TransportError = rdp_error::Error<TransportErrorKind>;
pub type TransportResult<T> = Result<T, TransportError>;

pub(crate) fn io_err(context: &'static str, e: io::Error) -> TransportError {
    TransportError::new(context, TransportErrorKind::Io(e))
}
