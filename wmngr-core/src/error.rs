//! Error type shared by the public API, the persistence adapter, and the
//! platform traits.

use derive_more::{Display, Error};

/// Manager-level error kinds.
///
/// Platform adapters map their native errors onto these; the details are
/// logged at the point of failure rather than carried up.
#[derive(Debug, Display, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Allocation or resource exhaustion.
    #[display("out of memory")]
    NoMemory,
    /// A bounded wait (mutex or driver call) expired.
    #[display("timed out")]
    Timeout,
    /// Operation refused: the manager is mid-transition, or the radio mode
    /// is incompatible with the request.
    #[display("invalid state")]
    InvalidState,
    /// No persisted configuration, or a stored record failed validation.
    #[display("not found")]
    NotFound,
    /// Storage or radio driver failure.
    #[display("I/O error")]
    Io,
    /// Malformed argument.
    #[display("invalid argument")]
    InvalidArg,
}

pub type Result<T> = core::result::Result<T, Error>;
