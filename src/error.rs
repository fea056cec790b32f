//! Error handling for tncd.
//!
//! Provides a unified error type used across the receive pipeline. Every
//! fallible path in the core collapses into one of a small number of
//! kinds; see [`ErrorKind`] for the taxonomy and when each applies.
//!
//! # Example
//!
//! ```rust
//! use tncd::error::{Error, ErrorKind, Result};
//!
//! fn do_something(len: usize) -> Result<()> {
//!     if len == 0 {
//!         return Err(Error::invalid("frame length is zero"));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use thiserror::Error;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error.
    pub kind: ErrorKind,

    /// Details of the underlying error.
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

impl Error {
    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

/// Standard result type for tncd operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories for the receive pipeline.
///
/// Unlike a network service, a soft-TNC has no client to answer with a
/// status code; these kinds instead tell the caller whether to retry,
/// give up, or stop looping.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// A recoverable failure in the intake layer: underrun, `EAGAIN`, a
    /// dropped UDP datagram. The caller should back off briefly and retry.
    #[error("transient failure")]
    Transient,

    /// An unrecoverable failure: device gone, bad file descriptor,
    /// malformed configuration. The caller should stop.
    #[error("fatal failure")]
    Fatal,

    /// The input source is exhausted (stdin closed, file ended).
    #[error("end of input")]
    Eof,

    /// A bit sequence failed to decode into a valid frame: bad FCS after
    /// all recovery attempts, RS decode failure, sanity check failure.
    #[error("decode failure")]
    Decode,

    /// A value supplied by configuration or a caller is out of range or
    /// otherwise malformed.
    #[error("invalid argument")]
    Invalid,

    /// An internal invariant was violated (should be unreachable in
    /// correct code, but is not a panic so the pipeline can keep running).
    #[error("internal error")]
    Internal,
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates a transient error.
    ///
    /// Use for conditions the caller can retry: audio underruns, short
    /// reads, momentary device unavailability.
    pub fn transient<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: ErrorKind::Transient,
            error: error.into(),
        }
    }

    /// Creates a fatal error.
    ///
    /// Use for conditions that will not resolve on retry: a device that
    /// vanished, a configuration that can never be satisfied.
    pub fn fatal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: ErrorKind::Fatal,
            error: error.into(),
        }
    }

    /// Creates an end-of-input error.
    pub fn eof<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: ErrorKind::Eof,
            error: error.into(),
        }
    }

    /// Creates a decode error.
    ///
    /// Use when a captured bit block could not be turned into a valid
    /// frame by any recovery strategy.
    pub fn decode<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: ErrorKind::Decode,
            error: error.into(),
        }
    }

    /// Creates an invalid-argument error.
    pub fn invalid<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: ErrorKind::Invalid,
            error: error.into(),
        }
    }

    /// Creates an internal error.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind: ErrorKind::Internal,
            error: error.into(),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

impl From<std::io::Error> for Error {
    /// Converts IO errors into appropriate error kinds.
    ///
    /// Maps standard IO errors to their logical equivalents:
    /// * `UnexpectedEof` -> `Eof`
    /// * `WouldBlock`/`Interrupted`/connection resets -> `Transient`
    /// * everything else -> `Fatal`
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::{
            AddrInUse, AddrNotAvailable, BrokenPipe, ConnectionAborted, ConnectionRefused,
            ConnectionReset, Interrupted, InvalidData, InvalidInput, NotConnected, TimedOut,
            UnexpectedEof, WouldBlock,
        };
        match err.kind() {
            UnexpectedEof => Self::eof(err),
            WouldBlock
            | Interrupted
            | TimedOut
            | BrokenPipe
            | ConnectionReset
            | ConnectionAborted
            | ConnectionRefused
            | AddrInUse
            | AddrNotAvailable
            | NotConnected => Self::transient(err),
            InvalidInput | InvalidData => Self::invalid(err),
            _ => Self::fatal(err),
        }
    }
}

impl From<std::num::ParseIntError> for Error {
    fn from(e: std::num::ParseIntError) -> Self {
        Self::invalid(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Self::invalid(e.to_string())
    }
}

impl From<cpal::DevicesError> for Error {
    fn from(e: cpal::DevicesError) -> Self {
        Self::fatal(e.to_string())
    }
}

impl From<cpal::DeviceNameError> for Error {
    fn from(e: cpal::DeviceNameError) -> Self {
        Self::fatal(e.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for Error {
    fn from(e: cpal::DefaultStreamConfigError) -> Self {
        Self::fatal(e.to_string())
    }
}

impl From<cpal::SupportedStreamConfigsError> for Error {
    fn from(e: cpal::SupportedStreamConfigsError) -> Self {
        use cpal::SupportedStreamConfigsError::{BackendSpecific, DeviceNotAvailable, InvalidArgument};
        match e {
            DeviceNotAvailable => Self::fatal(e),
            InvalidArgument => Self::invalid(e),
            BackendSpecific { err } => Self::fatal(err),
        }
    }
}

impl From<cpal::BuildStreamError> for Error {
    fn from(e: cpal::BuildStreamError) -> Self {
        Self::fatal(e.to_string())
    }
}

impl From<cpal::PlayStreamError> for Error {
    fn from(e: cpal::PlayStreamError) -> Self {
        Self::fatal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_unexpected_eof_maps_to_eof() {
        let io = std::io::Error::from(std::io::ErrorKind::UnexpectedEof);
        let err = Error::from(io);
        assert_eq!(err.kind, ErrorKind::Eof);
    }

    #[test]
    fn io_would_block_maps_to_transient() {
        let io = std::io::Error::from(std::io::ErrorKind::WouldBlock);
        let err = Error::from(io);
        assert_eq!(err.kind, ErrorKind::Transient);
    }

    #[test]
    fn display_includes_kind_and_detail() {
        let err = Error::decode("bad fcs");
        assert_eq!(err.to_string(), "decode failure: bad fcs");
    }
}
