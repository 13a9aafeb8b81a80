//! Heterogeneous containers, calls and opaque object wrappers.

use super::{numeric::allocate, resolve_index, resolve_range, wrapper};
use crate::error::{LinkError, LinkResult};
use crate::eval;
use crate::object::{RObject, charsxp_to_string};
use crate::protect::{self, LocalProtect};
use crate::session;
use rlink_libr::{SexpType, r_library, r_nil_value};
use std::any::Any;
use std::ffi::c_void;

wrapper! {
    /// An R generic list (`VECSXP`). Elements are arbitrary R objects.
    ListVector => SexpType::VecSxp
}

impl ListVector {
    /// Allocate a list of `len` elements, all NULL.
    pub fn new(len: usize) -> LinkResult<Self> {
        Self::from_object(allocate(Self::KIND, len)?)
    }

    pub fn from_objects(values: &[RObject]) -> LinkResult<Self> {
        let v = Self::new(values.len())?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            for (i, value) in values.iter().enumerate() {
                (lib.set_vector_elt)(v.obj.sexp(), i as isize, value.sexp());
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

    pub fn get(&self, index: i64) -> LinkResult<RObject> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let elt = (lib.vector_elt)(self.obj.sexp(), at as isize);
            RObject::new(elt)
        })
    }

    pub fn set(&self, index: i64, value: &RObject) -> LinkResult<()> {
        let at = resolve_index(index, self.len()?)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            (lib.set_vector_elt)(self.obj.sexp(), at as isize, value.sexp());
        });
        Ok(())
    }

    /// Copy the half-open range `[start, end)` into a new list.
    ///
    /// The elements themselves are shared, but replacing an element of
    /// the copy never shows through the source.
    pub fn slice(&self, start: i64, end: i64) -> LinkResult<Self> {
        let len = self.len()?;
        let (s, e) = resolve_range(start, end, len)?;
        let out = Self::new(e - s)?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            for i in 0..(e - s) {
                let elt = (lib.vector_elt)(self.obj.sexp(), (s + i) as isize);
                (lib.set_vector_elt)(out.obj.sexp(), i as isize, elt);
            }
        });
        Ok(out)
    }

    /// The `names` attribute, element by element.
    pub fn names(&self) -> LinkResult<Vec<Option<String>>> {
        names_attribute(&self.obj, self.len()?)
    }

    pub fn to_vec(&self) -> LinkResult<Vec<RObject>> {
        let len = self.len()?;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            out.push(self.get(i as i64)?);
        }
        Ok(out)
    }
}

/// Read an object's `names` attribute, padding with `None` when absent.
pub(crate) fn names_attribute(obj: &RObject, len: usize) -> LinkResult<Vec<Option<String>>> {
    let lib = r_library()?;
    let nil = r_nil_value()?;
    let na = rlink_libr::r_na_string()?;
    session::with_lock(|| unsafe {
        let names = (lib.rf_getattrib)(obj.sexp(), *lib.r_namessymbol);
        if names == nil {
            return Ok(vec![None; len]);
        }
        let n = (lib.rf_xlength)(names) as usize;
        let mut out = Vec::with_capacity(len);
        for i in 0..len {
            if i < n {
                let elt = (lib.string_elt)(names, i as isize);
                if elt == na {
                    out.push(None);
                } else {
                    let name = charsxp_to_string(elt)?;
                    out.push(if name.is_empty() { None } else { Some(name) });
                }
            } else {
                out.push(None);
            }
        }
        Ok(out)
    })
}

wrapper! {
    /// An R pairlist (`LISTSXP`), the cons-cell list R uses for call
    /// arguments and attributes.
    PairList => SexpType::ListSxp
}

impl PairList {
    /// Build a pairlist from tagged values.
    ///
    /// `pairs` must be non-empty: R represents the empty pairlist as
    /// NULL, which is not a `LISTSXP`.
    pub fn from_pairs(pairs: &[(Option<&str>, RObject)]) -> LinkResult<Self> {
        session::assert_ready()?;
        if pairs.is_empty() {
            return Err(LinkError::Conversion(
                "an empty pairlist is NULL in R".to_string(),
            ));
        }
        let lib = r_library()?;
        let nil = r_nil_value()?;
        session::with_lock(|| unsafe {
            let mut protect = LocalProtect::new();
            let mut tail = nil;
            for (name, value) in pairs.iter().rev() {
                tail = protect.protect((lib.rf_cons)(value.sexp(), tail));
                if let Some(name) = name {
                    let sym = eval::install(name)?;
                    (lib.set_tag)(tail, sym.sexp());
                }
            }
            Self::from_object(RObject::new(tail)?)
        })
    }

    /// Number of cons cells.
    pub fn len(&self) -> LinkResult<usize> {
        self.obj.len()
    }

    pub fn is_empty(&self) -> LinkResult<bool> {
        self.obj.is_empty()
    }

    /// Walk the cells, collecting tag names and values in order.
    pub fn pairs(&self) -> LinkResult<Vec<(Option<String>, RObject)>> {
        let lib = r_library()?;
        let nil = r_nil_value()?;
        session::with_lock(|| unsafe {
            let mut out = Vec::new();
            let mut cell = self.obj.sexp();
            while cell != nil {
                let tag = (lib.tag)(cell);
                let name = if tag == nil {
                    None
                } else {
                    Some(charsxp_to_string((lib.printname)(tag))?)
                };
                out.push((name, RObject::new((lib.car)(cell))?));
                cell = (lib.cdr)(cell);
            }
            Ok(out)
        })
    }
}

wrapper! {
    /// An unevaluated R call (`LANGSXP`).
    LangCall => SexpType::LangSxp
}

impl LangCall {
    /// Build a call to the named function with tagged arguments.
    pub fn build(function: &str, args: &[(Option<&str>, RObject)]) -> LinkResult<Self> {
        session::assert_ready()?;
        let fn_sym = eval::install(function)?;
        Self::build_with(&fn_sym, args)
    }

    /// Build a call whose head is an arbitrary callable object.
    pub fn build_with(callable: &RObject, args: &[(Option<&str>, RObject)]) -> LinkResult<Self> {
        session::assert_ready()?;
        let lib = r_library()?;
        let nil = r_nil_value()?;
        session::with_lock(|| unsafe {
            let mut protect = LocalProtect::new();
            let mut tail = nil;
            for (name, value) in args.iter().rev() {
                tail = protect.protect((lib.rf_cons)(value.sexp(), tail));
                if let Some(name) = name {
                    let sym = eval::install(name)?;
                    (lib.set_tag)(tail, sym.sexp());
                }
            }
            let call = protect.protect((lib.rf_lcons)(callable.sexp(), tail));
            Self::from_object(RObject::new(call)?)
        })
    }

    /// Evaluate the call, trapping R-side errors.
    ///
    /// `env` defaults to the global environment.
    pub fn eval(&self, env: Option<&RObject>) -> LinkResult<RObject> {
        session::assert_ready()?;
        let global;
        let env = match env {
            Some(env) => env,
            None => {
                global = session::global_env()?;
                &global
            }
        };
        session::with_lock(|| unsafe {
            let mut protect = LocalProtect::new();
            let result = protect.protect(eval::try_eval(self.obj.sexp(), env.sexp())?);
            RObject::new(result)
        })
    }
}

wrapper! {
    /// An R closure (`CLOSXP`).
    Closure => SexpType::ClosSxp
}

impl Closure {
    /// Call the closure with tagged arguments in the global environment.
    pub fn call(&self, args: &[(Option<&str>, RObject)]) -> LinkResult<RObject> {
        LangCall::build_with(&self.obj, args)?.eval(None)
    }
}

wrapper! {
    /// An R symbol (`SYMSXP`).
    Symbol => SexpType::SymSxp
}

impl Symbol {
    /// Intern a symbol by name.
    pub fn install(name: &str) -> LinkResult<Self> {
        Self::from_object(eval::install(name)?)
    }

    /// The symbol's print name.
    pub fn name(&self) -> LinkResult<String> {
        let lib = r_library()?;
        session::with_lock(|| unsafe { charsxp_to_string((lib.printname)(self.obj.sexp())) })
    }
}

wrapper! {
    /// An S4 object (`S4SXP`). Slots are attributes.
    S4Object => SexpType::S4Sxp
}

impl S4Object {
    pub fn slot(&self, name: &str) -> LinkResult<Option<RObject>> {
        self.obj.attribute(name)
    }

    pub fn set_slot(&self, name: &str, value: &RObject) -> LinkResult<()> {
        self.obj.set_attribute(name, value)
    }
}

wrapper! {
    /// An R external pointer (`EXTPTRSXP`) carrying a host value.
    ///
    /// The host value rides in the protection registry's passenger table,
    /// so it stays alive exactly as long as the pointer object is
    /// protected on the host side.
    ExternalPtr => SexpType::ExtptrSxp
}

impl ExternalPtr {
    /// Wrap a host value into an external pointer.
    pub fn wrap<T: Any + Send>(value: T) -> LinkResult<Self> {
        session::assert_ready()?;
        let lib = r_library()?;
        let nil = r_nil_value()?;
        let boxed = Box::new(value);
        let raw = (&*boxed as *const T).cast_mut().cast::<c_void>();
        session::with_lock(|| unsafe {
            let mut protect = LocalProtect::new();
            let sexp = protect.protect((lib.r_makeexternalptr)(raw, nil, nil));
            let wrapped = Self::from_object(RObject::new(sexp)?)?;
            // The object is registered by RObject::new above, so the
            // passenger has an anchor.
            protect::attach_passenger(wrapped.obj.addr(), boxed);
            Ok(wrapped)
        })
    }

    /// The raw host pointer stored in the external pointer.
    pub fn payload_ptr(&self) -> LinkResult<*mut c_void> {
        let lib = r_library()?;
        Ok(session::with_lock(|| unsafe {
            (lib.r_externalptraddr)(self.obj.sexp())
        }))
    }

    /// Borrow the host value.
    ///
    /// # Safety
    /// `T` must be the exact type passed to [`ExternalPtr::wrap`] for
    /// this pointer.
    pub unsafe fn payload<T: Any>(&self) -> LinkResult<Option<&T>> {
        let ptr = self.payload_ptr()?;
        if ptr.is_null() {
            return Ok(None);
        }
        Ok(Some(unsafe { &*(ptr as *const T) }))
    }
}

