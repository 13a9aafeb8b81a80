//! Element-typed wrappers for R's contiguous vectors.

use super::{ArrayView, resolve_index, resolve_range, wrapper};
use crate::error::{LinkError, LinkResult};
use crate::na;
use crate::object::RObject;
use crate::protect::LocalProtect;
use crate::session;
use rlink_libr::{Rcomplex, SexpType, r_library, r_nil_value};
use std::os::raw::c_int;

/// Allocate a fresh R vector of the given kind and length.
pub(crate) fn allocate(kind: SexpType, len: usize) -> LinkResult<RObject> {
    session::assert_ready()?;
    let lib = r_library()?;
    session::with_lock(|| unsafe {
        let mut protect = LocalProtect::new();
        let sexp = protect.protect((lib.rf_allocvector)(kind as c_int, len as isize));
        RObject::new(sexp)
    })
}

/// Shape of an object from its `dim` attribute; a missing attribute means
/// rank 1.
pub(crate) fn dims_of(obj: &RObject, len: usize) -> LinkResult<Vec<usize>> {
    let lib = r_library()?;
    let nil = r_nil_value()?;
    session::with_lock(|| unsafe {
        let dim_attr = (lib.rf_getattrib)(obj.sexp(), *lib.r_dimsymbol);
        if dim_attr == nil {
            return Ok(vec![len]);
        }
        let rank = (lib.rf_xlength)(dim_attr) as usize;
        let data = (lib.integer)(dim_attr);
        let mut dims = Vec::with_capacity(rank);
        for i in 0..rank {
            dims.push(*data.add(i) as usize);
        }
        Ok(dims)
    })
}

/// A zero-copy element buffer for any of the contiguous kinds, chosen by
/// the object's runtime type tag.
#[derive(Debug)]
pub enum BufferView<'a> {
    Logical(ArrayView<'a, i32>),
    Int(ArrayView<'a, i32>),
    Real(ArrayView<'a, f64>),
    Raw(ArrayView<'a, u8>),
}

/// Borrow an object's element buffer without knowing its kind statically.
///
/// Character, list and the other pointer-element kinds have no
/// contiguous buffer and fail with [`LinkError::NoBufferView`].
pub fn buffer_view(obj: &RObject) -> LinkResult<BufferView<'_>> {
    let kind = obj.sexp_type();
    if !matches!(
        kind,
        SexpType::LglSxp | SexpType::IntSxp | SexpType::RealSxp | SexpType::RawSxp
    ) {
        return Err(LinkError::NoBufferView { actual: kind });
    }
    let len = obj.len()?;
    let dims = dims_of(obj, len)?;
    let lib = r_library()?;
    session::with_lock(|| unsafe {
        let view = match kind {
            SexpType::LglSxp => BufferView::Logical(ArrayView::from_parts(
                std::slice::from_raw_parts((lib.logical)(obj.sexp()) as *const i32, len),
                dims,
            )),
            SexpType::IntSxp => BufferView::Int(ArrayView::from_parts(
                std::slice::from_raw_parts((lib.integer)(obj.sexp()) as *const i32, len),
                dims,
            )),
            SexpType::RealSxp => BufferView::Real(ArrayView::from_parts(
                std::slice::from_raw_parts((lib.real)(obj.sexp()) as *const f64, len),
                dims,
            )),
            _ => BufferView::Raw(ArrayView::from_parts(
                std::slice::from_raw_parts((lib.raw)(obj.sexp()) as *const u8, len),
                dims,
            )),
        };
        Ok(view)
    })
}

wrapper! {
    /// An R integer vector. Elements are `Option<i32>`, with `None` for
    /// `NA_integer_`.
    IntVector => SexpType::IntSxp
}

impl IntVector {
    /// Allocate a vector of `len` elements, all zero.
    pub fn new(len: usize) -> LinkResult<Self> {
        Self::from_object(allocate(Self::KIND, len)?)
    }

    /// Build a vector from host values; `None` becomes `NA_integer_`.
    ///
    /// `Some(i32::MIN)` collides with the NA sentinel and is rejected.
    pub fn from_slice(values: &[Option<i32>]) -> LinkResult<Self> {
        for (i, value) in values.iter().enumerate() {
            if *value == Some(na::NA_INTEGER) {
                return Err(LinkError::Conversion(format!(
                    "element {} is i32::MIN, which is the NA sentinel",
                    i
                )));
            }
        }
        let v = Self::new(values.len())?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let data = (lib.integer)(v.obj.sexp());
            for (i, value) in values.iter().enumerate() {
                *data.add(i) = value.unwrap_or(na::NA_INTEGER);
            }
        });
        Ok(v)
    }

    pub fn len(&self) -> LinkResult<usize> {
        self.obj.len()
    }

    pub fn is_empty(&self) -> LinkResult<bool> {
        self.obj.is_empty()
    }

    pub fn get(&self, index: i64) -> LinkResult<Option<i32>> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        let raw = session::with_lock(|| unsafe { *(lib.integer)(self.obj.sexp()).add(at) });
        Ok(if na::is_na_integer(raw) { None } else { Some(raw) })
    }

    pub fn set(&self, index: i64, value: Option<i32>) -> LinkResult<()> {
        if value == Some(na::NA_INTEGER) {
            return Err(LinkError::Conversion(
                "i32::MIN is the NA sentinel; pass None for a missing value".to_string(),
            ));
        }
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            *(lib.integer)(self.obj.sexp()).add(at) = value.unwrap_or(na::NA_INTEGER);
        });
        Ok(())
    }

    /// Copy the half-open range `[start, end)` into a new vector.
    pub fn slice(&self, start: i64, end: i64) -> LinkResult<Self> {
        let len = self.len()?;
        let (s, e) = resolve_range(start, end, len)?;
        let out = Self::new(e - s)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let src = (lib.integer)(self.obj.sexp());
            let dst = (lib.integer)(out.obj.sexp());
            for i in 0..(e - s) {
                *dst.add(i) = *src.add(s + i);
            }
        });
        Ok(out)
    }

    /// A zero-copy view of the buffer, shaped by the `dim` attribute.
    pub fn view(&self) -> LinkResult<ArrayView<'_, i32>> {
        let len = self.len()?;
        let dims = dims_of(&self.obj, len)?;
        let lib = r_library()?;
        let data = session::with_lock(|| unsafe {
            std::slice::from_raw_parts((lib.integer)(self.obj.sexp()) as *const i32, len)
        });
        Ok(ArrayView::from_parts(data, dims))
    }

    pub fn to_vec(&self) -> LinkResult<Vec<Option<i32>>> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.get(i as i64)?);
        }
        Ok(out)
    }
}

wrapper! {
    /// An R double vector. Elements are `Option<f64>`, with `None` for
    /// `NA_real_`. Ordinary NaNs pass through unchanged.
    RealVector => SexpType::RealSxp
}

impl RealVector {
    pub fn new(len: usize) -> LinkResult<Self> {
        Self::from_object(allocate(Self::KIND, len)?)
    }

    pub fn from_slice(values: &[Option<f64>]) -> LinkResult<Self> {
        let v = Self::new(values.len())?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let data = (lib.real)(v.obj.sexp());
            for (i, value) in values.iter().enumerate() {
                *data.add(i) = value.unwrap_or_else(na::na_real);
            }
        });
        Ok(v)
    }

    pub fn len(&self) -> LinkResult<usize> {
        self.obj.len()
    }

    pub fn is_empty(&self) -> LinkResult<bool> {
        self.obj.is_empty()
    }

    pub fn get(&self, index: i64) -> LinkResult<Option<f64>> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        let raw = session::with_lock(|| unsafe { *(lib.real)(self.obj.sexp()).add(at) });
        Ok(if na::is_na_real(raw) { None } else { Some(raw) })
    }

    pub fn set(&self, index: i64, value: Option<f64>) -> LinkResult<()> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            *(lib.real)(self.obj.sexp()).add(at) = value.unwrap_or_else(na::na_real);
        });
        Ok(())
    }

    pub fn slice(&self, start: i64, end: i64) -> LinkResult<Self> {
        let len = self.len()?;
        let (s, e) = resolve_range(start, end, len)?;
        let out = Self::new(e - s)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let src = (lib.real)(self.obj.sexp());
            let dst = (lib.real)(out.obj.sexp());
            for i in 0..(e - s) {
                *dst.add(i) = *src.add(s + i);
            }
        });
        Ok(out)
    }

    pub fn view(&self) -> LinkResult<ArrayView<'_, f64>> {
        let len = self.len()?;
        let dims = dims_of(&self.obj, len)?;
        let lib = r_library()?;
        let data = session::with_lock(|| unsafe {
            std::slice::from_raw_parts((lib.real)(self.obj.sexp()) as *const f64, len)
        });
        Ok(ArrayView::from_parts(data, dims))
    }

    pub fn to_vec(&self) -> LinkResult<Vec<Option<f64>>> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.get(i as i64)?);
        }
        Ok(out)
    }
}

wrapper! {
    /// An R logical vector. Elements are tri-state `Option<bool>`.
    LogicalVector => SexpType::LglSxp
}

impl LogicalVector {
    pub fn new(len: usize) -> LinkResult<Self> {
        Self::from_object(allocate(Self::KIND, len)?)
    }

    pub fn from_slice(values: &[Option<bool>]) -> LinkResult<Self> {
        let v = Self::new(values.len())?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let data = (lib.logical)(v.obj.sexp());
            for (i, value) in values.iter().enumerate() {
                *data.add(i) = match value {
                    Some(true) => 1,
                    Some(false) => 0,
                    None => na::NA_LOGICAL,
                };
            }
        });
        Ok(v)
    }

    pub fn len(&self) -> LinkResult<usize> {
        self.obj.len()
    }

    pub fn is_empty(&self) -> LinkResult<bool> {
        self.obj.is_empty()
    }

    pub fn get(&self, index: i64) -> LinkResult<Option<bool>> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        let raw = session::with_lock(|| unsafe { *(lib.logical)(self.obj.sexp()).add(at) });
        Ok(if na::is_na_logical(raw) {
            None
        } else {
            Some(raw != 0)
        })
    }

    pub fn set(&self, index: i64, value: Option<bool>) -> LinkResult<()> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            *(lib.logical)(self.obj.sexp()).add(at) = match value {
                Some(true) => 1,
                Some(false) => 0,
                None => na::NA_LOGICAL,
            };
        });
        Ok(())
    }

    pub fn slice(&self, start: i64, end: i64) -> LinkResult<Self> {
        let len = self.len()?;
        let (s, e) = resolve_range(start, end, len)?;
        let out = Self::new(e - s)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let src = (lib.logical)(self.obj.sexp());
            let dst = (lib.logical)(out.obj.sexp());
            for i in 0..(e - s) {
                *dst.add(i) = *src.add(s + i);
            }
        });
        Ok(out)
    }

    /// A zero-copy view of the raw tri-state buffer (0, 1 or the NA
    /// sentinel).
    pub fn view(&self) -> LinkResult<ArrayView<'_, i32>> {
        let len = self.len()?;
        let dims = dims_of(&self.obj, len)?;
        let lib = r_library()?;
        let data = session::with_lock(|| unsafe {
            std::slice::from_raw_parts((lib.logical)(self.obj.sexp()) as *const i32, len)
        });
        Ok(ArrayView::from_parts(data, dims))
    }

    pub fn to_vec(&self) -> LinkResult<Vec<Option<bool>>> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.get(i as i64)?);
        }
        Ok(out)
    }
}

wrapper! {
    /// An R raw (byte) vector. Raw vectors have no NA representation.
    RawVector => SexpType::RawSxp
}

impl RawVector {
    pub fn new(len: usize) -> LinkResult<Self> {
        Self::from_object(allocate(Self::KIND, len)?)
    }

    pub fn from_slice(values: &[u8]) -> LinkResult<Self> {
        let v = Self::new(values.len())?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let data = (lib.raw)(v.obj.sexp());
            std::ptr::copy_nonoverlapping(values.as_ptr(), data, values.len());
        });
        Ok(v)
    }

    pub fn len(&self) -> LinkResult<usize> {
        self.obj.len()
    }

    pub fn is_empty(&self) -> LinkResult<bool> {
        self.obj.is_empty()
    }

    pub fn get(&self, index: i64) -> LinkResult<u8> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        Ok(session::with_lock(|| unsafe {
            *(lib.raw)(self.obj.sexp()).add(at)
        }))
    }

    pub fn set(&self, index: i64, value: u8) -> LinkResult<()> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            *(lib.raw)(self.obj.sexp()).add(at) = value;
        });
        Ok(())
    }

    pub fn slice(&self, start: i64, end: i64) -> LinkResult<Self> {
        let len = self.len()?;
        let (s, e) = resolve_range(start, end, len)?;
        let out = Self::new(e - s)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let src = (lib.raw)(self.obj.sexp());
            let dst = (lib.raw)(out.obj.sexp());
            std::ptr::copy_nonoverlapping(src.add(s), dst, e - s);
        });
        Ok(out)
    }

    pub fn view(&self) -> LinkResult<ArrayView<'_, u8>> {
        let len = self.len()?;
        let dims = dims_of(&self.obj, len)?;
        let lib = r_library()?;
        let data = session::with_lock(|| unsafe {
            std::slice::from_raw_parts((lib.raw)(self.obj.sexp()) as *const u8, len)
        });
        Ok(ArrayView::from_parts(data, dims))
    }

    pub fn to_vec(&self) -> LinkResult<Vec<u8>> {
        let len = self.len()?;
        let lib = r_library()?;
        Ok(session::with_lock(|| unsafe {
            std::slice::from_raw_parts((lib.raw)(self.obj.sexp()) as *const u8, len).to_vec()
        }))
    }
}

wrapper! {
    /// An R complex vector. Elements are `Option<(f64, f64)>` pairs of
    /// real and imaginary parts; `NA_complex_` has the NA bit pattern in
    /// its real part.
    ComplexVector => SexpType::CplxSxp
}

impl ComplexVector {
    pub fn new(len: usize) -> LinkResult<Self> {
        Self::from_object(allocate(Self::KIND, len)?)
    }

    pub fn from_slice(values: &[Option<(f64, f64)>]) -> LinkResult<Self> {
        let v = Self::new(values.len())?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let data = (lib.complex)(v.obj.sexp());
            for (i, value) in values.iter().enumerate() {
                *data.add(i) = match value {
                    Some((re, im)) => Rcomplex { r: *re, i: *im },
                    None => Rcomplex {
                        r: na::na_real(),
                        i: na::na_real(),
                    },
                };
            }
        });
        Ok(v)
    }

    pub fn len(&self) -> LinkResult<usize> {
        self.obj.len()
    }

    pub fn is_empty(&self) -> LinkResult<bool> {
        self.obj.is_empty()
    }

    pub fn get(&self, index: i64) -> LinkResult<Option<(f64, f64)>> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        let raw = session::with_lock(|| unsafe { *(lib.complex)(self.obj.sexp()).add(at) });
        Ok(if na::is_na_real(raw.r) {
            None
        } else {
            Some((raw.r, raw.i))
        })
    }

    pub fn set(&self, index: i64, value: Option<(f64, f64)>) -> LinkResult<()> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            *(lib.complex)(self.obj.sexp()).add(at) = match value {
                Some((re, im)) => Rcomplex { r: re, i: im },
                None => Rcomplex {
                    r: na::na_real(),
                    i: na::na_real(),
                },
            };
        });
        Ok(())
    }

    pub fn slice(&self, start: i64, end: i64) -> LinkResult<Self> {
        let len = self.len()?;
        let (s, e) = resolve_range(start, end, len)?;
        let out = Self::new(e - s)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let src = (lib.complex)(self.obj.sexp());
            let dst = (lib.complex)(out.obj.sexp());
            for i in 0..(e - s) {
                *dst.add(i) = *src.add(s + i);
            }
        });
        Ok(out)
    }

    pub fn to_vec(&self) -> LinkResult<Vec<Option<(f64, f64)>>> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.get(i as i64)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handle::RHandle;
    use rlink_libr::SEXP;

    #[test]
    fn buffer_view_rejects_pointer_element_kinds() {
        // The kind check fires before any library access, so no R
        // installation is needed here.
        let obj =
            unsafe { RObject::from_handle(RHandle::new(0x31000 as SEXP, SexpType::StrSxp)) };
        assert!(matches!(
            buffer_view(&obj),
            Err(LinkError::NoBufferView {
                actual: SexpType::StrSxp
            })
        ));
    }
}
