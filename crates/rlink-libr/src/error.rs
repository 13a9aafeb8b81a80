//! Error types for the low-level R bindings.

use thiserror::Error;

/// Errors raised while locating, loading or bootstrapping libR.
#[derive(Error, Debug)]
pub enum RError {
    /// The shared library was found but the dynamic loader rejected it.
    #[error("failed to load the R library: {0}")]
    LoadError(#[from] libloading::Error),

    /// No R shared library could be located.
    #[error("R library not found: {0}")]
    LibraryNotFound(String),

    /// The library has not been loaded yet.
    #[error("the R library is not initialized")]
    NotInitialized,

    /// The library was already loaded once in this process.
    #[error("the R library is already initialized")]
    AlreadyInitialized,

    /// A required symbol is missing from the loaded library.
    #[error("R symbol not found: {0}")]
    FunctionNotFound(String),

    /// The R parser rejected the input.
    #[error("R parse error: {0}")]
    ParseError(String),
}

/// Result type for libr operations.
pub type RResult<T> = Result<T, RError>;
