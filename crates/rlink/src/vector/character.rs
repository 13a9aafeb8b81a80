//! Character vectors.

use super::{numeric::allocate, resolve_index, resolve_range, wrapper};
use crate::error::{LinkError, LinkResult};
use crate::object::charsxp_to_string;
use crate::session;
use rlink_libr::{SexpType, r_library, r_na_string};
use std::ffi::CString;

wrapper! {
    /// An R character vector. Elements are `Option<String>`, with `None`
    /// for `NA_character_` (the `R_NaString` singleton).
    StrVector => SexpType::StrSxp
}

impl StrVector {
    /// Allocate a vector of `len` elements, all empty strings.
    pub fn new(len: usize) -> LinkResult<Self> {
        Self::from_object(allocate(Self::KIND, len)?)
    }

    /// Build a vector from host strings; `None` becomes `NA_character_`.
    ///
    /// An element with an interior NUL byte cannot cross into R and fails
    /// the whole construction, naming its position.
    pub fn from_slice<S: AsRef<str>>(values: &[Option<S>]) -> LinkResult<Self> {
        let mut elements = Vec::with_capacity(values.len());
        for (i, value) in values.iter().enumerate() {
            match value {
                Some(s) => {
                    let c = CString::new(s.as_ref()).map_err(|_| {
                        LinkError::Conversion(format!(
                            "element {} contains an interior NUL byte",
                            i
                        ))
                    })?;
                    elements.push(Some(c));
                }
                None => elements.push(None),
            }
        }

        let v = Self::new(values.len())?;
        let lib = r_library()?;
        let na = r_na_string()?;
        session::with_lock(|| unsafe {
            for (i, element) in elements.iter().enumerate() {
                let charsxp = match element {
                    Some(c) => (lib.rf_mkchar)(c.as_ptr()),
                    None => na,
                };
                (lib.set_string_elt)(v.obj.sexp(), i as isize, charsxp);
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

    pub fn get(&self, index: i64) -> LinkResult<Option<String>> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        let na = r_na_string()?;
        session::with_lock(|| unsafe {
            let elt = (lib.string_elt)(self.obj.sexp(), at as isize);
            if elt == na {
                Ok(None)
            } else {
                Ok(Some(charsxp_to_string(elt)?))
            }
        })
    }

    pub fn set(&self, index: i64, value: Option<&str>) -> LinkResult<()> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        let na = r_na_string()?;
        let value_c = match value {
            Some(s) => Some(CString::new(s).map_err(|_| LinkError::InvalidString)?),
            None => None,
        };
        session::with_lock(|| unsafe {
            let charsxp = match &value_c {
                Some(c) => (lib.rf_mkchar)(c.as_ptr()),
                None => na,
            };
            (lib.set_string_elt)(self.obj.sexp(), at as isize, charsxp);
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
            for i in 0..(e - s) {
                let elt = (lib.string_elt)(self.obj.sexp(), (s + i) as isize);
                (lib.set_string_elt)(out.obj.sexp(), i as isize, elt);
            }
        });
        Ok(out)
    }

    pub fn to_vec(&self) -> LinkResult<Vec<Option<String>>> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.get(i as i64)?);
        }
        Ok(out)
    }
}
