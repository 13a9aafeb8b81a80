//! Lightweight handles to R objects.

use rlink_libr::{SEXP, SexpType};

/// An unmanaged reference to an R object.
///
/// A handle pairs the raw SEXP pointer with the type tag observed when the
/// handle was created. It carries no protection: the referent is only safe
/// to touch while something else (an [`crate::object::RObject`] or R itself)
/// keeps it alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RHandle {
    sexp: SEXP,
    sexp_type: SexpType,
}

// Safety: a handle is an address plus a type tag. The referent is only
// dereferenced through FFI calls made under the global call lock, so the
// handle itself may move between threads.
unsafe impl Send for RHandle {}

impl RHandle {
    /// Create a handle from a raw SEXP and its observed type tag.
    ///
    /// # Safety
    /// The caller must ensure that `sexp` is a valid R object and that
    /// `sexp_type` matches `TYPEOF(sexp)`.
    pub unsafe fn new(sexp: SEXP, sexp_type: SexpType) -> Self {
        RHandle { sexp, sexp_type }
    }

    /// Get the raw SEXP pointer.
    pub fn sexp(&self) -> SEXP {
        self.sexp
    }

    /// Get the type tag observed at handle creation.
    pub fn sexp_type(&self) -> SexpType {
        self.sexp_type
    }

    /// The referent's address, used as the identity key in the protection
    /// registry.
    pub fn addr(&self) -> usize {
        self.sexp as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_and_objects_move_between_threads() {
        // Session state lives in a static mutex, which requires the
        // managed types to be Send.
        fn assert_send<T: Send>() {}
        assert_send::<RHandle>();
        assert_send::<crate::object::RObject>();
    }
}
