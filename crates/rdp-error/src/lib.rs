//! Generic error wrapper shared by the transport, ISO and DVC crates.
//!
//! Each crate defines its own `Kind` enum and uses [`Error<Kind>`] to attach
//! a static call-site context string and an optional boxed source error,
//! instead of stringly-typed errors.

use std::error::Error as StdError;
use std::fmt;

pub trait Source: StdError + Sync + Send + 'static {}

impl<T> Source for T where T: StdError + Sync + Send + 'static {}

#[derive(Debug)]
pub struct Error<Kind> {
    pub context: &'static str,
    pub kind: Kind,
    source: Option<Box<dyn StdError + Sync + Send>>,
}

impl<Kind> Error<Kind> {
    #[cold]
    #[must_use]
    pub fn new(context: &'static str, kind: Kind) -> Self {
        Self {
            context,
            kind,
            source: None,
        }
    }

    #[cold]
    #[must_use]
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Source,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    pub fn into_other_kind<OtherKind>(self) -> Error<OtherKind>
    where
        Kind: Into<OtherKind>,
    {
        Error {
            context: self.context,
            kind: self.kind.into(),
            source: self.source,
        }
    }
}

impl<Kind> fmt::Display for Error<Kind>
where
    Kind: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.context, self.kind)
    }
}

impl<Kind> StdError for Error<Kind>
where
    Kind: fmt::Debug + fmt::Display,
{
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

/// Error indicating that a buffer did not contain enough bytes to decode a field.
#[derive(Copy, Eq, PartialEq, Clone, Debug)]
pub struct NotEnoughBytesError {
    received: usize,
    expected: usize,
}

impl NotEnoughBytesError {
    #[must_use]
    pub const fn new(received: usize, expected: usize) -> Self {
        Self { received, expected }
    }

    #[must_use]
    pub const fn received(&self) -> usize {
        self.received
    }

    #[must_use]
    pub const fn expected(&self) -> usize {
        self.expected
    }
}

impl fmt::Display for NotEnoughBytesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "not enough bytes: received {}, expected {}",
            self.received, self.expected
        )
    }
}

impl StdError for NotEnoughBytesError {}

#[macro_export]
macro_rules! ensure_enough_bytes {
    (in: $buf:ident, size: $expected:expr) => {{
        let received = $buf.len();
        let expected = $expected;
        if received < expected {
            return Err($crate::NotEnoughBytesError::new(received, expected));
        }
    }};
}
