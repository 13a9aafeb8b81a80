//! Parsing and evaluation at the foreign-call boundary.

use crate::error::{LinkError, LinkResult};
use crate::object::RObject;
use crate::protect::LocalProtect;
use crate::session;
use rlink_libr::{ParseStatus, RError, SEXP, r_library, r_nil_value};
use std::ffi::{CStr, CString};

/// Intern an R symbol by name.
pub fn install(name: &str) -> LinkResult<RObject> {
    session::assert_ready()?;
    let lib = r_library()?;
    let name_c = CString::new(name).map_err(|_| LinkError::InvalidString)?;
    session::with_lock(|| unsafe {
        let sym = (lib.rf_install)(name_c.as_ptr());
        RObject::new(sym)
    })
}

/// Parse R source code into an expression vector.
///
/// Incomplete or malformed input surfaces as a parse error; the input is
/// never partially evaluated.
pub fn parse(code: &str) -> LinkResult<RObject> {
    session::assert_ready()?;
    let lib = r_library()?;
    let code_c = CString::new(code).map_err(|_| LinkError::InvalidString)?;
    let nil = r_nil_value()?;
    session::with_lock(|| unsafe {
        let mut protect = LocalProtect::new();
        let code_sexp = protect.protect((lib.rf_mkstring)(code_c.as_ptr()));

        let mut status = ParseStatus::Null;
        let parsed = protect.protect((lib.r_parsevector)(code_sexp, -1, &mut status, nil));

        match status {
            ParseStatus::Ok => RObject::new(parsed),
            ParseStatus::Incomplete => Err(LinkError::Libr(RError::ParseError(
                "incomplete expression".to_string(),
            ))),
            ParseStatus::Error => Err(LinkError::Libr(RError::ParseError(format!(
                "parse error in {:?}",
                truncate_for_message(code)
            )))),
            other => Err(LinkError::Libr(RError::ParseError(format!(
                "unexpected parse status: {:?}",
                other
            )))),
        }
    })
}

/// Evaluate a single expression in `env`, trapping R-side errors.
///
/// On failure the message is read back from `R_curErrorBuf` so the error
/// crosses the boundary as data instead of a longjmp.
///
/// # Safety
/// `expr` and `env` must be valid R objects, and the caller must hold the
/// session lock.
pub(crate) unsafe fn try_eval(expr: SEXP, env: SEXP) -> LinkResult<SEXP> {
    let lib = r_library()?;
    let mut error_occurred: std::os::raw::c_int = 0;
    let result = unsafe { (lib.r_tryevalsilent)(expr, env, &mut error_occurred) };
    if error_occurred != 0 {
        return Err(LinkError::RRuntime(last_error_message()?));
    }
    Ok(result)
}

/// Parse and evaluate R code in the global environment.
///
/// Each top-level expression is evaluated in order; the value of the last
/// one is returned. An R-side error stops evaluation and surfaces as
/// [`LinkError::RRuntime`] with the interpreter's message.
pub fn parse_eval(code: &str) -> LinkResult<RObject> {
    session::assert_ready()?;
    let lib = r_library()?;
    let parsed = parse(code)?;
    let global = session::global_env()?;
    session::with_lock(|| unsafe {
        let mut protect = LocalProtect::new();
        let n = (lib.rf_xlength)(parsed.sexp());
        let mut last = r_nil_value()?;
        for i in 0..n {
            let expr = (lib.vector_elt)(parsed.sexp(), i);
            last = protect.protect(try_eval(expr, global.sexp())?);
        }
        RObject::new(last)
    })
}

/// The most recent R error message, from `R_curErrorBuf`.
pub fn last_error_message() -> LinkResult<String> {
    let lib = r_library()?;
    let message = session::with_lock(|| unsafe {
        let buf = (lib.r_curerrorbuf)();
        if buf.is_null() {
            String::new()
        } else {
            CStr::from_ptr(buf).to_string_lossy().trim_end().to_string()
        }
    });
    Ok(message)
}

fn truncate_for_message(code: &str) -> String {
    const LIMIT: usize = 80;
    if code.len() <= LIMIT {
        code.to_string()
    } else {
        let mut end = LIMIT;
        while !code.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &code[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_requires_a_ready_session() {
        // These tests run without R initialized, so the boundary check
        // fires before any FFI is attempted.
        assert!(matches!(parse("1 + 1"), Err(LinkError::NotReady)));
        assert!(matches!(parse_eval("1 + 1"), Err(LinkError::NotReady)));
        assert!(matches!(install("sum"), Err(LinkError::NotReady)));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let short = "x <- 1";
        assert_eq!(truncate_for_message(short), short);

        let long = "あ".repeat(60);
        let truncated = truncate_for_message(&long);
        assert!(truncated.ends_with("..."));
        assert!(truncated.len() <= 83);
    }
}
