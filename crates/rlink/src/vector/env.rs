//! R environments.

use super::{StrVector, wrapper};
use crate::error::{LinkError, LinkResult};
use crate::eval;
use crate::object::{RObject, charsxp_to_string};
use crate::protect::LocalProtect;
use crate::session;
use rlink_libr::{R_TRUE, SexpType, r_library, r_unbound_value};

wrapper! {
    /// An R environment (`ENVSXP`): a mutable name-to-value frame.
    Environment => SexpType::EnvSxp
}

impl Environment {
    /// The global environment.
    pub fn global() -> LinkResult<Self> {
        Self::from_object(session::global_env()?)
    }

    /// The base environment. Base is locked; mutation through it fails.
    pub fn base() -> LinkResult<Self> {
        Self::from_object(session::base_env()?)
    }

    /// The empty environment, the root of the search path.
    pub fn empty() -> LinkResult<Self> {
        Self::from_object(session::empty_env()?)
    }

    /// Create a fresh environment whose parent is the global environment.
    pub fn new() -> LinkResult<Self> {
        session::assert_ready()?;
        let lib = r_library()?;
        match lib.r_newenv {
            Some(r_newenv) => {
                let global = session::global_env()?;
                session::with_lock(|| unsafe {
                    let mut protect = LocalProtect::new();
                    // hashed, default size
                    let env = protect.protect(r_newenv(global.sexp(), 1, 29));
                    Self::from_object(RObject::new(env)?)
                })
            }
            // R_NewEnv only exists from R 4.1; older installations go
            // through the interpreter
            None => Self::from_object(eval::parse_eval("new.env()")?),
        }
    }

    /// Look up a binding, or `None` when the name is unbound.
    pub fn get(&self, name: &str) -> LinkResult<Option<RObject>> {
        session::assert_ready()?;
        let lib = r_library()?;
        let sym = eval::install(name)?;
        let unbound = r_unbound_value()?;
        session::with_lock(|| unsafe {
            let value = (lib.rf_findvar)(sym.sexp(), self.obj.sexp());
            if value == unbound {
                Ok(None)
            } else {
                Ok(Some(RObject::new(value)?))
            }
        })
    }

    /// Bind `name` to `value`.
    ///
    /// Locked environments (base, empty, sealed namespaces) reject the
    /// mutation before R is asked to perform it.
    pub fn set(&self, name: &str, value: &RObject) -> LinkResult<()> {
        session::assert_ready()?;
        self.check_unlocked(name)?;
        let lib = r_library()?;
        let sym = eval::install(name)?;
        session::with_lock(|| unsafe {
            (lib.rf_definevar)(sym.sexp(), value.sexp(), self.obj.sexp());
        });
        Ok(())
    }

    /// Remove a binding. Removing an unbound name is a no-op.
    pub fn remove(&self, name: &str) -> LinkResult<()> {
        session::assert_ready()?;
        self.check_unlocked(name)?;
        let lib = r_library()?;
        match lib.r_removevarfromframe {
            Some(remove_var) => {
                let sym = eval::install(name)?;
                session::with_lock(|| unsafe {
                    remove_var(sym.sexp(), self.obj.sexp());
                });
                Ok(())
            }
            // R_removeVarFromFrame only exists from R 4.0
            None => {
                let names = StrVector::from_slice(&[Some(name)])?;
                crate::vector::LangCall::build(
                    "rm",
                    &[
                        (Some("list"), names.into_object()),
                        (Some("envir"), self.obj.clone()),
                    ],
                )?
                .eval(None)?;
                Ok(())
            }
        }
    }

    /// The names bound in this environment, including hidden ones.
    pub fn names(&self) -> LinkResult<Vec<String>> {
        session::assert_ready()?;
        let lib = r_library()?;
        session::with_lock(|| unsafe {
            let mut protect = LocalProtect::new();
            let listing = protect.protect((lib.r_lsinternal3)(self.obj.sexp(), R_TRUE, R_TRUE));
            let n = (lib.rf_xlength)(listing);
            let mut out = Vec::with_capacity(n as usize);
            for i in 0..n {
                out.push(charsxp_to_string((lib.string_elt)(listing, i))?);
            }
            Ok(out)
        })
    }

    /// Whether R has locked this environment against mutation.
    pub fn is_locked(&self) -> LinkResult<bool> {
        session::assert_ready()?;
        let lib = r_library()?;
        let locked =
            session::with_lock(|| unsafe { (lib.r_environmentislocked)(self.obj.sexp()) });
        Ok(locked != 0)
    }

    fn check_unlocked(&self, name: &str) -> LinkResult<()> {
        if self.is_locked()? {
            return Err(LinkError::LockedEnvironment {
                name: name.to_string(),
            });
        }
        Ok(())
    }
}
