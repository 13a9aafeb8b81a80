//! Typed wrappers over R vectors and container objects.
//!
//! Each wrapper owns a managed [`RObject`] and is only constructible from
//! an object whose type tag matches. Lengths are always read live from R,
//! element access uses signed indexing with negative offsets from the
//! end, and `slice` materializes a fresh R vector rather than aliasing
//! the source.

mod character;
mod env;
mod list;
mod numeric;

pub use character::StrVector;
pub use env::Environment;
pub use list::{Closure, ExternalPtr, LangCall, ListVector, PairList, S4Object, Symbol};
pub use numeric::{
    BufferView, ComplexVector, IntVector, LogicalVector, RawVector, RealVector, buffer_view,
};

use crate::error::{LinkError, LinkResult};

/// Common shell of a typed wrapper: construction checks the type tag,
/// and the managed object is reachable for generic code.
macro_rules! wrapper {
    ($(#[$meta:meta])* $name:ident => $kind:path) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name {
            obj: $crate::object::RObject,
        }

        impl $name {
            /// The R type tag this wrapper accepts.
            pub const KIND: rlink_libr::SexpType = $kind;

            /// Wrap a managed object, checking its type tag.
            pub fn from_object(obj: $crate::object::RObject) -> $crate::error::LinkResult<Self> {
                if obj.sexp_type() != $kind {
                    return Err($crate::error::LinkError::TypeMismatch {
                        expected: $kind,
                        actual: obj.sexp_type(),
                    });
                }
                Ok(Self { obj })
            }

            /// Wrap a raw SEXP, protecting it and checking its type tag.
            ///
            /// # Safety
            /// The caller must ensure that `sexp` is a valid R object.
            pub unsafe fn from_sexp(sexp: rlink_libr::SEXP) -> $crate::error::LinkResult<Self> {
                Self::from_object(unsafe { $crate::object::RObject::new(sexp)? })
            }

            /// The managed object backing this wrapper.
            pub fn object(&self) -> &$crate::object::RObject {
                &self.obj
            }

            /// Give up the wrapper, keeping the protection.
            pub fn into_object(self) -> $crate::object::RObject {
                self.obj
            }
        }

        impl From<$name> for $crate::object::RObject {
            fn from(v: $name) -> Self {
                v.into_object()
            }
        }
    };
}
pub(crate) use wrapper;

/// Translate a signed element index into an offset.
///
/// Negative indices count from the end, so `-1` is the last element.
/// Anything outside `[-len, len)` is out of range.
pub(crate) fn resolve_index(index: i64, len: usize) -> LinkResult<usize> {
    let n = len as i64;
    let resolved = if index < 0 { index + n } else { index };
    if resolved < 0 || resolved >= n {
        return Err(LinkError::IndexOutOfRange { index, length: len });
    }
    Ok(resolved as usize)
}

/// Clamp-check a half-open range for `slice`.
pub(crate) fn resolve_range(start: i64, end: i64, len: usize) -> LinkResult<(usize, usize)> {
    let start = if start == len as i64 {
        // An empty slice starting one past the end is allowed
        len
    } else {
        resolve_index(start, len)?
    };
    let end = if end == len as i64 {
        len
    } else {
        resolve_index(end, len)?
    };
    if end < start {
        return Err(LinkError::IndexOutOfRange {
            index: end as i64,
            length: len,
        });
    }
    Ok((start, end))
}

/// A zero-copy, read-only view over a contiguous R buffer.
///
/// The shape comes from the object's `dim` attribute (a missing `dim`
/// means rank 1) and indexing is column-major: the first dimension varies
/// fastest, exactly as R lays the buffer out. The borrow is tied to the
/// wrapper the view came from, so the buffer cannot be collected while
/// the view is live.
#[derive(Debug)]
pub struct ArrayView<'a, T> {
    data: &'a [T],
    dims: Vec<usize>,
}

impl<'a, T> ArrayView<'a, T> {
    pub(crate) fn from_parts(data: &'a [T], dims: Vec<usize>) -> Self {
        debug_assert_eq!(dims.iter().product::<usize>(), data.len());
        ArrayView { data, dims }
    }

    /// The view's shape.
    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    /// The underlying buffer in R's element order.
    pub fn as_slice(&self) -> &'a [T] {
        self.data
    }

    /// Column-major strides for the current shape.
    fn strides(&self) -> Vec<usize> {
        let mut strides = Vec::with_capacity(self.dims.len());
        let mut stride = 1;
        for &dim in &self.dims {
            strides.push(stride);
            stride *= dim;
        }
        strides
    }

    /// Element at a multi-dimensional index, or `None` when the index
    /// does not match the shape.
    pub fn get(&self, index: &[usize]) -> Option<&'a T> {
        if index.len() != self.dims.len() {
            return None;
        }
        let mut offset = 0;
        for ((&i, &dim), stride) in index.iter().zip(&self.dims).zip(self.strides()) {
            if i >= dim {
                return None;
            }
            offset += i * stride;
        }
        self.data.get(offset)
    }
}
