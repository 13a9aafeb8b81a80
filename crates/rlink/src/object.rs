//! Managed R objects with automatic protection.

use crate::error::{LinkError, LinkResult};
use crate::handle::RHandle;
use crate::protect;
use crate::session;
use std::ffi::{CStr, CString};

use rlink_libr::{SEXP, SexpType, r_library, r_nil_value};

/// An owned, protected reference to an R object.
///
/// Creating an `RObject` registers one reference in the protection
/// registry; dropping it releases that reference. Cloning re-registers,
/// so any number of owners may share one underlying R object and the
/// object stays alive until the last owner is gone.
#[derive(Debug)]
pub struct RObject {
    handle: RHandle,
}

impl RObject {
    /// Take ownership of a raw SEXP, reading its type tag from R.
    ///
    /// # Safety
    /// The caller must ensure that `sexp` is a valid R object.
    pub unsafe fn new(sexp: SEXP) -> LinkResult<Self> {
        let lib = r_library()?;
        let raw = session::with_lock(|| unsafe { (lib.rf_typeof)(sexp) });
        let sexp_type = SexpType::from_raw(raw)
            .ok_or_else(|| LinkError::RRuntime(format!("unknown SEXP type tag {}", raw)))?;
        Ok(unsafe { Self::from_handle(RHandle::new(sexp, sexp_type)) })
    }

    /// Take ownership of a handle whose type tag is already known.
    ///
    /// # Safety
    /// The caller must ensure the handle refers to a valid R object.
    pub unsafe fn from_handle(handle: RHandle) -> Self {
        session::with_lock(|| unsafe {
            protect::acquire(handle.addr(), handle.sexp());
        });
        RObject { handle }
    }

    /// The unmanaged handle for this object.
    pub fn handle(&self) -> RHandle {
        self.handle
    }

    /// Get the raw SEXP pointer.
    pub fn sexp(&self) -> SEXP {
        self.handle.sexp()
    }

    /// The type tag observed when this object was created.
    pub fn sexp_type(&self) -> SexpType {
        self.handle.sexp_type()
    }

    /// The referent's address.
    pub fn addr(&self) -> usize {
        self.handle.addr()
    }

    /// Check if this object is R's NULL.
    pub fn is_null(&self) -> bool {
        match r_nil_value() {
            Ok(nil) => self.sexp() == nil,
            Err(_) => false,
        }
    }

    /// Number of elements, read live from R.
    pub fn len(&self) -> LinkResult<usize> {
        let lib = r_library()?;
        let n = session::with_lock(|| unsafe { (lib.rf_xlength)(self.sexp()) });
        Ok(n as usize)
    }

    /// Whether the object has zero elements.
    pub fn is_empty(&self) -> LinkResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Point this object at a different R value of the same type.
    ///
    /// The new referent is protected before the old one is released, so a
    /// rebind to the same object never lets its count touch zero.
    pub fn rebind(&mut self, new: RHandle) -> LinkResult<()> {
        if new.sexp_type() != self.handle.sexp_type() {
            return Err(LinkError::TypeMismatch {
                expected: self.handle.sexp_type(),
                actual: new.sexp_type(),
            });
        }
        let old = self.handle;
        session::with_lock(|| unsafe {
            protect::acquire(new.addr(), new.sexp());
            protect::release(old.addr(), old.sexp());
        });
        self.handle = new;
        Ok(())
    }

    /// Get an attribute by name, or `None` if unset.
    pub fn attribute(&self, name: &str) -> LinkResult<Option<RObject>> {
        let lib = r_library()?;
        let name_c = CString::new(name).map_err(|_| LinkError::InvalidString)?;
        let nil = r_nil_value()?;
        session::with_lock(|| unsafe {
            let sym = (lib.rf_install)(name_c.as_ptr());
            let value = (lib.rf_getattrib)(self.sexp(), sym);
            if value == nil {
                Ok(None)
            } else {
                Ok(Some(RObject::new(value)?))
            }
        })
    }

    /// Set an attribute by name.
    pub fn set_attribute(&self, name: &str, value: &RObject) -> LinkResult<()> {
        let lib = r_library()?;
        let name_c = CString::new(name).map_err(|_| LinkError::InvalidString)?;
        session::with_lock(|| unsafe {
            let sym = (lib.rf_install)(name_c.as_ptr());
            (lib.rf_setattrib)(self.sexp(), sym, value.sexp());
        });
        Ok(())
    }

    /// The object's `class` attribute as strings, most specific first.
    ///
    /// Returns an empty vector when no class attribute is set.
    pub fn class_names(&self) -> LinkResult<Vec<String>> {
        let lib = r_library()?;
        let nil = r_nil_value()?;
        session::with_lock(|| unsafe {
            let class_attr = (lib.rf_getattrib)(self.sexp(), *lib.r_classsymbol);
            if class_attr == nil {
                return Ok(Vec::new());
            }
            let n = (lib.rf_xlength)(class_attr);
            let mut names = Vec::with_capacity(n as usize);
            for i in 0..n {
                let elt = (lib.string_elt)(class_attr, i);
                names.push(charsxp_to_string(elt)?);
            }
            Ok(names)
        })
    }
}

impl Clone for RObject {
    fn clone(&self) -> Self {
        unsafe { Self::from_handle(self.handle) }
    }
}

impl Drop for RObject {
    fn drop(&mut self) {
        let handle = self.handle;
        session::with_lock(|| unsafe {
            protect::release(handle.addr(), handle.sexp());
        });
    }
}

/// Decode a CHARSXP to a Rust string, translating to UTF-8.
///
/// # Safety
/// `charsxp` must be a valid CHARSXP and the R library must be loaded.
pub(crate) unsafe fn charsxp_to_string(charsxp: SEXP) -> LinkResult<String> {
    let lib = r_library()?;
    unsafe {
        let c_str = (lib.rf_translatecharutf8)(charsxp);
        if c_str.is_null() {
            return Err(LinkError::RRuntime(
                "string translation returned NULL".to_string(),
            ));
        }
        Ok(CStr::from_ptr(c_str).to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Without a loaded R library the protection registry skips FFI, so
    // ownership bookkeeping can be verified with synthetic handles.

    fn fake_handle(addr: usize, sexp_type: SexpType) -> RHandle {
        unsafe { RHandle::new(addr as SEXP, sexp_type) }
    }

    #[test]
    fn clone_and_drop_balance_the_count() {
        let addr = 0x11000;
        let a = unsafe { RObject::from_handle(fake_handle(addr, SexpType::IntSxp)) };
        assert_eq!(protect::protection_count(addr), 1);
        let b = a.clone();
        assert_eq!(protect::protection_count(addr), 2);
        drop(a);
        assert_eq!(protect::protection_count(addr), 1);
        drop(b);
        assert_eq!(protect::protection_count(addr), 0);
    }

    #[test]
    fn rebind_rejects_a_different_type() {
        let addr = 0x12000;
        let mut obj = unsafe { RObject::from_handle(fake_handle(addr, SexpType::IntSxp)) };
        let err = obj
            .rebind(fake_handle(0x12100, SexpType::RealSxp))
            .unwrap_err();
        assert!(matches!(
            err,
            LinkError::TypeMismatch {
                expected: SexpType::IntSxp,
                actual: SexpType::RealSxp,
            }
        ));
        // The failed rebind must not disturb the original protection
        assert_eq!(protect::protection_count(addr), 1);
        drop(obj);
    }

    #[test]
    fn rebind_moves_protection_to_the_new_referent() {
        let old_addr = 0x13000;
        let new_addr = 0x13100;
        let mut obj = unsafe { RObject::from_handle(fake_handle(old_addr, SexpType::StrSxp)) };
        obj.rebind(fake_handle(new_addr, SexpType::StrSxp)).unwrap();
        assert_eq!(protect::protection_count(old_addr), 0);
        assert_eq!(protect::protection_count(new_addr), 1);
        assert_eq!(obj.addr(), new_addr);
        drop(obj);
        assert_eq!(protect::protection_count(new_addr), 0);
    }

    #[test]
    fn rebind_to_self_keeps_the_object_protected() {
        let addr = 0x14000;
        let mut obj = unsafe { RObject::from_handle(fake_handle(addr, SexpType::VecSxp)) };
        obj.rebind(fake_handle(addr, SexpType::VecSxp)).unwrap();
        assert_eq!(protect::protection_count(addr), 1);
        drop(obj);
        assert_eq!(protect::protection_count(addr), 0);
    }
}
