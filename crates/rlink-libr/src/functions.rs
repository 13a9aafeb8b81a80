//! R function bindings loaded at runtime.

use crate::error::{RError, RResult};
use crate::types::*;
use libloading::{Library, Symbol};
use once_cell::sync::OnceCell;
use std::ffi::c_void;
use std::os::raw::{c_char, c_int};
use std::path::Path;

/// Global R library instance.
static R_LIBRARY: OnceCell<RLibrary> = OnceCell::new();

/// Container for the loaded R library and function pointers.
pub struct RLibrary {
    _library: Library,

    // Lifecycle
    pub rf_initialize_r: unsafe extern "C" fn(c_int, *const *const c_char) -> c_int,
    pub setup_rmainloop: unsafe extern "C" fn(),
    pub rf_endembeddedr: unsafe extern "C" fn(c_int),
    pub r_runexitfinalizers: unsafe extern "C" fn(),
    pub r_gc: unsafe extern "C" fn(),

    // GC bridge
    pub r_preserveobject: unsafe extern "C" fn(SEXP),
    pub r_releaseobject: unsafe extern "C" fn(SEXP),
    pub rf_protect: unsafe extern "C" fn(SEXP) -> SEXP,
    pub rf_unprotect: unsafe extern "C" fn(c_int),

    // Allocation and typed access
    pub rf_allocvector: unsafe extern "C" fn(c_int, isize) -> SEXP,
    pub rf_xlength: unsafe extern "C" fn(SEXP) -> isize,
    pub rf_typeof: unsafe extern "C" fn(SEXP) -> c_int,
    pub logical: unsafe extern "C" fn(SEXP) -> *mut c_int,
    pub integer: unsafe extern "C" fn(SEXP) -> *mut c_int,
    pub real: unsafe extern "C" fn(SEXP) -> *mut f64,
    pub raw: unsafe extern "C" fn(SEXP) -> *mut u8,
    pub complex: unsafe extern "C" fn(SEXP) -> *mut Rcomplex,
    pub string_elt: unsafe extern "C" fn(SEXP, isize) -> SEXP,
    pub set_string_elt: unsafe extern "C" fn(SEXP, isize, SEXP),
    pub vector_elt: unsafe extern "C" fn(SEXP, isize) -> SEXP,
    pub set_vector_elt: unsafe extern "C" fn(SEXP, isize, SEXP) -> SEXP,

    // Strings
    pub rf_mkchar: unsafe extern "C" fn(*const c_char) -> SEXP,
    pub rf_mkstring: unsafe extern "C" fn(*const c_char) -> SEXP,
    pub rf_translatecharutf8: unsafe extern "C" fn(SEXP) -> *const c_char,

    // Attributes and symbols
    pub rf_getattrib: unsafe extern "C" fn(SEXP, SEXP) -> SEXP,
    pub rf_setattrib: unsafe extern "C" fn(SEXP, SEXP, SEXP) -> SEXP,
    pub rf_install: unsafe extern "C" fn(*const c_char) -> SEXP,
    pub printname: unsafe extern "C" fn(SEXP) -> SEXP,

    // Parsing and evaluation
    pub r_parsevector: unsafe extern "C" fn(SEXP, c_int, *mut ParseStatus, SEXP) -> SEXP,
    pub r_tryevalsilent: unsafe extern "C" fn(SEXP, SEXP, *mut c_int) -> SEXP,
    pub r_curerrorbuf: unsafe extern "C" fn() -> *const c_char,

    // Pairlist and call construction
    pub rf_lcons: unsafe extern "C" fn(SEXP, SEXP) -> SEXP,
    pub rf_cons: unsafe extern "C" fn(SEXP, SEXP) -> SEXP,
    pub car: unsafe extern "C" fn(SEXP) -> SEXP,
    pub cdr: unsafe extern "C" fn(SEXP) -> SEXP,
    pub tag: unsafe extern "C" fn(SEXP) -> SEXP,
    pub set_tag: unsafe extern "C" fn(SEXP, SEXP),

    // Environments
    pub rf_findvar: unsafe extern "C" fn(SEXP, SEXP) -> SEXP,
    pub rf_definevar: unsafe extern "C" fn(SEXP, SEXP, SEXP),
    pub r_environmentislocked: unsafe extern "C" fn(SEXP) -> Rboolean,
    pub r_lsinternal3: unsafe extern "C" fn(SEXP, Rboolean, Rboolean) -> SEXP,
    // R >= 4.0; absent on older installations
    pub r_removevarfromframe: Option<unsafe extern "C" fn(SEXP, SEXP)>,
    // R >= 4.1; absent on older installations
    pub r_newenv: Option<unsafe extern "C" fn(SEXP, c_int, c_int) -> SEXP>,

    // External pointers
    pub r_makeexternalptr: unsafe extern "C" fn(*mut c_void, SEXP, SEXP) -> SEXP,
    pub r_externalptraddr: unsafe extern "C" fn(SEXP) -> *mut c_void,

    // Global symbols
    pub r_nilvalue: *mut SEXP,
    pub r_globalenv: *mut SEXP,
    pub r_baseenv: *mut SEXP,
    pub r_emptyenv: *mut SEXP,
    pub r_unboundvalue: *mut SEXP,
    pub r_nastring: *mut SEXP,
    pub r_dimsymbol: *mut SEXP,
    pub r_classsymbol: *mut SEXP,
    pub r_namessymbol: *mut SEXP,

    // R state variables
    pub r_cstacklimit: *mut usize,
    pub r_interactive: *mut c_int,
    pub r_signalhandlers: *mut c_int,
    pub r_interrupts_pending: *mut c_int,
}

// Safety: RLibrary contains only function pointers and raw pointers that are
// used in a thread-safe manner (all calls into R are serialized by the
// session lock; R itself is single-threaded anyway).
unsafe impl Send for RLibrary {}
unsafe impl Sync for RLibrary {}

impl RLibrary {
    /// Load the R library from the given path.
    ///
    /// On Unix, the library is loaded with RTLD_GLOBAL so that R packages
    /// can find libR.so symbols when loading their own shared libraries.
    #[cfg(unix)]
    pub fn load(library_path: &Path) -> RResult<Self> {
        unsafe {
            let library = {
                use libloading::os::unix::Library as UnixLibrary;
                // RTLD_NOW = 0x2, RTLD_GLOBAL = 0x100
                const RTLD_NOW: libc::c_int = 0x2;
                const RTLD_GLOBAL: libc::c_int = 0x100;
                let unix_lib = UnixLibrary::open(Some(library_path), RTLD_NOW | RTLD_GLOBAL)?;
                Library::from(unix_lib)
            };

            macro_rules! load_symbol {
                ($name:ident, $sym:expr) => {
                    let $name: Symbol<_> = library.get($sym).map_err(|_| {
                        RError::FunctionNotFound(String::from_utf8_lossy($sym).to_string())
                    })?;
                    let $name = *$name;
                };
            }

            // Optional symbols only appear in newer R releases.
            macro_rules! load_optional {
                ($name:ident, $sym:expr, $ty:ty) => {
                    let $name: Option<$ty> = library.get::<$ty>($sym).ok().map(|s| *s);
                };
            }

            // Global symbol pointers: take the address of the symbol, not its value.
            macro_rules! load_ptr {
                ($name:ident, $sym:expr, $ty:ty) => {
                    let $name: Symbol<$ty> = library.get($sym).map_err(|_| {
                        RError::FunctionNotFound(String::from_utf8_lossy($sym).to_string())
                    })?;
                    let $name = $name.into_raw().into_raw() as *mut $ty;
                };
            }

            // Lifecycle
            load_symbol!(rf_initialize_r, b"Rf_initialize_R\0");
            load_symbol!(setup_rmainloop, b"setup_Rmainloop\0");
            load_symbol!(rf_endembeddedr, b"Rf_endEmbeddedR\0");
            load_symbol!(r_runexitfinalizers, b"R_RunExitFinalizers\0");
            load_symbol!(r_gc, b"R_gc\0");

            // GC bridge
            load_symbol!(r_preserveobject, b"R_PreserveObject\0");
            load_symbol!(r_releaseobject, b"R_ReleaseObject\0");
            load_symbol!(rf_protect, b"Rf_protect\0");
            load_symbol!(rf_unprotect, b"Rf_unprotect\0");

            // Allocation and typed access
            load_symbol!(rf_allocvector, b"Rf_allocVector\0");
            load_symbol!(rf_xlength, b"Rf_xlength\0");
            load_symbol!(rf_typeof, b"TYPEOF\0");
            load_symbol!(logical, b"LOGICAL\0");
            load_symbol!(integer, b"INTEGER\0");
            load_symbol!(real, b"REAL\0");
            load_symbol!(raw, b"RAW\0");
            load_symbol!(complex, b"COMPLEX\0");
            load_symbol!(string_elt, b"STRING_ELT\0");
            load_symbol!(set_string_elt, b"SET_STRING_ELT\0");
            load_symbol!(vector_elt, b"VECTOR_ELT\0");
            load_symbol!(set_vector_elt, b"SET_VECTOR_ELT\0");

            // Strings
            load_symbol!(rf_mkchar, b"Rf_mkChar\0");
            load_symbol!(rf_mkstring, b"Rf_mkString\0");
            load_symbol!(rf_translatecharutf8, b"Rf_translateCharUTF8\0");

            // Attributes and symbols
            load_symbol!(rf_getattrib, b"Rf_getAttrib\0");
            load_symbol!(rf_setattrib, b"Rf_setAttrib\0");
            load_symbol!(rf_install, b"Rf_install\0");
            load_symbol!(printname, b"PRINTNAME\0");

            // Parsing and evaluation
            load_symbol!(r_parsevector, b"R_ParseVector\0");
            load_symbol!(r_tryevalsilent, b"R_tryEvalSilent\0");
            load_symbol!(r_curerrorbuf, b"R_curErrorBuf\0");

            // Pairlist and call construction
            load_symbol!(rf_lcons, b"Rf_lcons\0");
            load_symbol!(rf_cons, b"Rf_cons\0");
            load_symbol!(car, b"CAR\0");
            load_symbol!(cdr, b"CDR\0");
            load_symbol!(tag, b"TAG\0");
            load_symbol!(set_tag, b"SET_TAG\0");

            // Environments
            load_symbol!(rf_findvar, b"Rf_findVar\0");
            load_symbol!(rf_definevar, b"Rf_defineVar\0");
            load_symbol!(r_environmentislocked, b"R_EnvironmentIsLocked\0");
            load_symbol!(r_lsinternal3, b"R_lsInternal3\0");
            load_optional!(
                r_removevarfromframe,
                b"R_removeVarFromFrame\0",
                unsafe extern "C" fn(SEXP, SEXP)
            );
            load_optional!(
                r_newenv,
                b"R_NewEnv\0",
                unsafe extern "C" fn(SEXP, c_int, c_int) -> SEXP
            );

            // External pointers
            load_symbol!(r_makeexternalptr, b"R_MakeExternalPtr\0");
            load_symbol!(r_externalptraddr, b"R_ExternalPtrAddr\0");

            // Global symbols
            load_ptr!(r_nilvalue, b"R_NilValue\0", SEXP);
            load_ptr!(r_globalenv, b"R_GlobalEnv\0", SEXP);
            load_ptr!(r_baseenv, b"R_BaseEnv\0", SEXP);
            load_ptr!(r_emptyenv, b"R_EmptyEnv\0", SEXP);
            load_ptr!(r_unboundvalue, b"R_UnboundValue\0", SEXP);
            load_ptr!(r_nastring, b"R_NaString\0", SEXP);
            load_ptr!(r_dimsymbol, b"R_DimSymbol\0", SEXP);
            load_ptr!(r_classsymbol, b"R_ClassSymbol\0", SEXP);
            load_ptr!(r_namessymbol, b"R_NamesSymbol\0", SEXP);

            // R state variables
            load_ptr!(r_cstacklimit, b"R_CStackLimit\0", usize);
            let r_interactive: *mut c_int = library
                .get::<c_int>(b"R_Interactive\0")
                .map(|s| s.into_raw().into_raw() as *mut c_int)
                .unwrap_or(std::ptr::null_mut());
            let r_signalhandlers: *mut c_int = library
                .get::<c_int>(b"R_SignalHandlers\0")
                .map(|s| s.into_raw().into_raw() as *mut c_int)
                .unwrap_or(std::ptr::null_mut());
            let r_interrupts_pending: *mut c_int = library
                .get::<c_int>(b"R_interrupts_pending\0")
                .map(|s| s.into_raw().into_raw() as *mut c_int)
                .unwrap_or(std::ptr::null_mut());

            Ok(RLibrary {
                _library: library,
                rf_initialize_r,
                setup_rmainloop,
                rf_endembeddedr,
                r_runexitfinalizers,
                r_gc,
                r_preserveobject,
                r_releaseobject,
                rf_protect,
                rf_unprotect,
                rf_allocvector,
                rf_xlength,
                rf_typeof,
                logical,
                integer,
                real,
                raw,
                complex,
                string_elt,
                set_string_elt,
                vector_elt,
                set_vector_elt,
                rf_mkchar,
                rf_mkstring,
                rf_translatecharutf8,
                rf_getattrib,
                rf_setattrib,
                rf_install,
                printname,
                r_parsevector,
                r_tryevalsilent,
                r_curerrorbuf,
                rf_lcons,
                rf_cons,
                car,
                cdr,
                tag,
                set_tag,
                rf_findvar,
                rf_definevar,
                r_environmentislocked,
                r_lsinternal3,
                r_removevarfromframe,
                r_newenv,
                r_makeexternalptr,
                r_externalptraddr,
                r_nilvalue,
                r_globalenv,
                r_baseenv,
                r_emptyenv,
                r_unboundvalue,
                r_nastring,
                r_dimsymbol,
                r_classsymbol,
                r_namessymbol,
                r_cstacklimit,
                r_interactive,
                r_signalhandlers,
                r_interrupts_pending,
            })
        }
    }

    /// Loading the R library is only supported on Unix platforms.
    #[cfg(not(unix))]
    pub fn load(library_path: &Path) -> RResult<Self> {
        let _ = library_path;
        Err(RError::LibraryNotFound(
            "embedded R is only supported on Unix platforms".to_string(),
        ))
    }
}

/// Initialize the global R library.
pub fn init_r_library(library_path: &Path) -> RResult<()> {
    R_LIBRARY
        .set(RLibrary::load(library_path)?)
        .map_err(|_| RError::AlreadyInitialized)
}

/// Get a reference to the global R library.
pub fn r_library() -> RResult<&'static RLibrary> {
    R_LIBRARY.get().ok_or(RError::NotInitialized)
}

/// Get R_NilValue.
pub fn r_nil_value() -> RResult<SEXP> {
    let lib = r_library()?;
    unsafe { Ok(*lib.r_nilvalue) }
}

/// Get R_GlobalEnv.
pub fn r_global_env() -> RResult<SEXP> {
    let lib = r_library()?;
    unsafe { Ok(*lib.r_globalenv) }
}

/// Get R_BaseEnv.
pub fn r_base_env() -> RResult<SEXP> {
    let lib = r_library()?;
    unsafe { Ok(*lib.r_baseenv) }
}

/// Get R_EmptyEnv.
pub fn r_empty_env() -> RResult<SEXP> {
    let lib = r_library()?;
    unsafe { Ok(*lib.r_emptyenv) }
}

/// Get R_UnboundValue, the sentinel for a missing binding.
pub fn r_unbound_value() -> RResult<SEXP> {
    let lib = r_library()?;
    unsafe { Ok(*lib.r_unboundvalue) }
}

/// Get R_NaString, the CHARSXP singleton representing a missing string.
pub fn r_na_string() -> RResult<SEXP> {
    let lib = r_library()?;
    unsafe { Ok(*lib.r_nastring) }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn load_surfaces_dlopen_failures() {
        let err = RLibrary::load(Path::new("/nonexistent/libR.so"))
            .err()
            .unwrap();
        assert!(matches!(err, RError::LoadError(_)));
    }
}
