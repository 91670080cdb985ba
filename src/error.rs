//! Unified error type for channels, certificates and digests.

use std::fmt;

use openssl::error::ErrorStack;

/// What went wrong, independent of the provider that noticed it.
///
/// Callers are expected to match on the kind; the stable `Display` message
/// and the optional native code exist for diagnostics only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Operation on a null certificate or channel handle.
    BadAddress,
    /// Zero-length or otherwise unusable input.
    InvalidArgument,
    /// Malformed DER, PEM or base64.
    IllegalByteSequence,
    /// Base64 length not a multiple of four, or a record too large for the
    /// negotiated limits.
    MessageSize,
    /// Output buffer too small, or PEM body exceeds the internal decode
    /// buffer.
    NoBufferSpace,
    /// Encrypt/decrypt before the handshake completed.
    NotConnected,
    /// Handshake on an already connected channel.
    AlreadyConnected,
    /// The application's certificate check rejected the peer.
    PermissionDenied,
    /// Tampered record or provider-detected protocol failure.
    ConnectionAborted,
    /// The peer closed the session cleanly.
    OrderlyShutdown,
    /// Provider failure outside the portable taxonomy; carries the native
    /// code and message.
    Platform,
}

impl ErrorKind {
    fn message(self) -> &'static str {
        match self {
            Self::BadAddress => "null handle",
            Self::InvalidArgument => "invalid argument",
            Self::IllegalByteSequence => "illegal byte sequence",
            Self::MessageSize => "message size",
            Self::NoBufferSpace => "no buffer space",
            Self::NotConnected => "not connected",
            Self::AlreadyConnected => "already connected",
            Self::PermissionDenied => "permission denied",
            Self::ConnectionAborted => "connection aborted",
            Self::OrderlyShutdown => "orderly shutdown",
            Self::Platform => "platform error",
        }
    }
}

/// Error raised by this crate.
///
/// Cheap to clone; channels keep the error that moved them into the failed
/// state and return it from every subsequent call.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    code: Option<u64>,
    detail: Option<String>,
}

impl Error {
    pub(crate) fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            code: None,
            detail: None,
        }
    }

    pub(crate) fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            detail: Some(detail.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Native provider code, when the provider reported one.
    pub fn platform_code(&self) -> Option<u64> {
        self.code
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind.message())?;
        if let Some(detail) = &self.detail {
            write!(f, ": {}", detail)?;
        }
        if let Some(code) = self.code {
            write!(f, " (code {})", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl From<ErrorStack> for Error {
    fn from(stack: ErrorStack) -> Self {
        let (code, detail) = match stack.errors().first() {
            Some(e) => (Some(e.code() as u64), Some(e.to_string())),
            None => (None, None),
        };
        Self {
            kind: ErrorKind::Platform,
            code,
            detail,
        }
    }
}
