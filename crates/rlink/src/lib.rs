//! Safe interop with an embedded R runtime.
//!
//! The crate is organized around four concerns:
//! - protection: [`protect`] keeps host-held R objects out of R's
//!   garbage collector via a refcounted registry; [`object::RObject`]
//!   is the RAII owner built on it.
//! - typed access: [`vector`] wraps each R vector and container kind
//!   with checked, NA-aware element access and zero-copy buffer views.
//! - conversion: [`convert`] holds composable, scopable rule sets for
//!   moving values across the boundary in both directions.
//! - lifecycle: [`session`] owns the initialize-use-shutdown state
//!   machine and the global call lock; [`eval`] is the guarded
//!   parse-and-evaluate boundary.

pub mod convert;
pub mod error;
pub mod eval;
pub mod handle;
pub mod na;
pub mod object;
pub mod protect;
pub mod session;
pub mod vector;

pub use error::{LinkError, LinkResult};
pub use handle::RHandle;
pub use object::RObject;
pub use rlink_libr::SexpType;
