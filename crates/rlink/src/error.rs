//! Error types for the interop layer.

use rlink_libr::SexpType;
use thiserror::Error;

/// Errors that can occur when working with the embedded R runtime.
#[derive(Error, Debug)]
pub enum LinkError {
    /// The R session is not initialized, or has already ended.
    #[error("R session is not ready (not initialized or already ended)")]
    NotReady,

    /// The R session was ended and cannot be initialized again in this process.
    #[error("R cannot be restarted after shutdown in the same process")]
    RestartUnsupported,

    /// An operation expected one R type but found another.
    #[error("R type mismatch: expected {expected:?}, got {actual:?}")]
    TypeMismatch {
        expected: SexpType,
        actual: SexpType,
    },

    /// A buffer view was requested for a kind whose elements are not a
    /// contiguous numeric buffer.
    #[error("R type {actual:?} has no contiguous element buffer")]
    NoBufferView { actual: SexpType },

    /// A conversion between host and R values failed.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// No conversion rule is registered for the given type, in either
    /// direction: the host type's name going in, the R type tag coming
    /// out.
    #[error("no conversion rule registered for {type_name}")]
    ConversionMissing { type_name: String },

    /// No converter is active and no default converter has been set.
    #[error("no converter active; set a default converter or enter a local one")]
    NoConverter,

    /// A vector access was out of range.
    #[error("index {index} out of range for vector of length {length}")]
    IndexOutOfRange { index: i64, length: usize },

    /// The R runtime raised an error during evaluation.
    #[error("R error: {0}")]
    RRuntime(String),

    /// An attempt was made to modify a binding in a locked environment.
    #[error("cannot modify binding {name:?}: environment is locked")]
    LockedEnvironment { name: String },

    /// A string contained an interior NUL byte and cannot cross into R.
    #[error("string contains an interior NUL byte")]
    InvalidString,

    /// An error from the low-level R bindings.
    #[error(transparent)]
    Libr(#[from] rlink_libr::RError),
}

/// Result type for interop operations.
pub type LinkResult<T> = Result<T, LinkError>;
