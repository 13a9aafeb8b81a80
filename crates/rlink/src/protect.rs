//! Protection bookkeeping for R objects held by host code.
//!
//! R's garbage collector only respects two forms of protection: the
//! PROTECT/UNPROTECT stack, which is strictly scoped, and the preserved
//! list maintained by `R_PreserveObject`/`R_ReleaseObject`. Host-side
//! handles can outlive any scope, so long-lived objects go through a
//! refcounted registry layered over the preserved list: the first
//! acquisition of an address preserves the object, further acquisitions
//! only bump a count, and the preserved-list release happens exactly when
//! the count returns to zero.

use rlink_libr::{SEXP, r_library};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Mutex;

static REGISTRY: Mutex<Option<ProtectionRegistry>> = Mutex::new(None);

struct ProtectionRegistry {
    counts: HashMap<usize, u64>,
    /// Host values kept alive for as long as the keyed R object is
    /// protected. Used to back external pointers.
    passengers: HashMap<usize, Vec<Box<dyn Any + Send>>>,
}

impl ProtectionRegistry {
    fn new() -> Self {
        ProtectionRegistry {
            counts: HashMap::new(),
            passengers: HashMap::new(),
        }
    }
}

fn with_registry<T>(f: impl FnOnce(&mut ProtectionRegistry) -> T) -> T {
    let mut guard = match REGISTRY.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    f(guard.get_or_insert_with(ProtectionRegistry::new))
}

/// Register one reference to the object at `addr`.
///
/// On the first reference, `R_PreserveObject` is called; later references
/// only increment the count. Returns the new count.
///
/// # Safety
/// `sexp` must be a valid R object whose address is `addr`.
pub(crate) unsafe fn acquire(addr: usize, sexp: SEXP) -> u64 {
    with_registry(|reg| {
        let count = reg.counts.entry(addr).or_insert(0);
        if *count == 0 {
            // Tests run without a loaded R library; skip the FFI there
            // and exercise the bookkeeping alone.
            if let Ok(lib) = r_library() {
                unsafe { (lib.r_preserveobject)(sexp) };
            }
        }
        *count += 1;
        log::trace!("protect: acquire {:#x} -> {}", addr, *count);
        *count
    })
}

/// Drop one reference to the object at `addr`.
///
/// When the count reaches zero the object is released back to R's garbage
/// collector and any passenger values stored for it are dropped. Returns
/// the remaining count.
///
/// # Panics
/// Panics if `addr` is not currently registered. A release without a
/// matching acquire means host-side bookkeeping is corrupt, and continuing
/// would let R collect an object some handle still points at.
pub(crate) unsafe fn release(addr: usize, sexp: SEXP) -> u64 {
    with_registry(|reg| {
        let count = match reg.counts.get_mut(&addr) {
            Some(count) => count,
            None => panic!(
                "released R object at {:#x} that was not protected; \
                 handle bookkeeping is corrupt",
                addr
            ),
        };
        *count -= 1;
        let remaining = *count;
        if remaining == 0 {
            reg.counts.remove(&addr);
            reg.passengers.remove(&addr);
            if let Ok(lib) = r_library() {
                unsafe { (lib.r_releaseobject)(sexp) };
            }
        }
        log::trace!("protect: release {:#x} -> {}", addr, remaining);
        remaining
    })
}

/// The current reference count for `addr`, or zero if unregistered.
pub fn protection_count(addr: usize) -> u64 {
    with_registry(|reg| reg.counts.get(&addr).copied().unwrap_or(0))
}

/// Whether the object at `addr` holds at least one registered reference.
pub fn is_protected(addr: usize) -> bool {
    protection_count(addr) > 0
}

/// Attach a host value to the protected object at `addr`.
///
/// The value lives until the object's protection count drops to zero.
/// `addr` must already be registered; attaching to an unprotected address
/// would leak the value with nothing to anchor its lifetime to.
pub(crate) fn attach_passenger(addr: usize, value: Box<dyn Any + Send>) -> bool {
    with_registry(|reg| {
        if !reg.counts.contains_key(&addr) {
            return false;
        }
        reg.passengers.entry(addr).or_default().push(value);
        true
    })
}

/// Number of passenger values currently attached to `addr`.
pub fn passenger_count(addr: usize) -> usize {
    with_registry(|reg| reg.passengers.get(&addr).map(Vec::len).unwrap_or(0))
}

/// RAII guard for R's PROTECT stack, for temporaries inside a single call.
///
/// When dropped, all objects protected through it are unprotected in one
/// `Rf_unprotect` call. Protection through this guard must stay balanced
/// within a scope; cross-call lifetimes belong to the registry above.
#[derive(Debug, Default)]
pub struct LocalProtect {
    count: i32,
}

impl LocalProtect {
    pub fn new() -> Self {
        LocalProtect { count: 0 }
    }

    /// Protect a SEXP for the lifetime of this guard.
    ///
    /// # Safety
    /// The caller must ensure that `sexp` is a valid R object.
    pub unsafe fn protect(&mut self, sexp: SEXP) -> SEXP {
        if let Ok(lib) = r_library() {
            let protected = unsafe { (lib.rf_protect)(sexp) };
            self.count += 1;
            protected
        } else {
            sexp
        }
    }

    pub fn count(&self) -> i32 {
        self.count
    }
}

impl Drop for LocalProtect {
    fn drop(&mut self) {
        if self.count > 0
            && let Ok(lib) = r_library()
        {
            unsafe { (lib.rf_unprotect)(self.count) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Synthetic addresses; without a loaded R library the registry skips
    // the FFI calls, so the count bookkeeping is testable on its own.
    // Each test uses a distinct address range because the registry is
    // process-global and tests run in parallel.

    fn fake_sexp(addr: usize) -> SEXP {
        addr as SEXP
    }

    #[test]
    fn acquire_increments_and_release_decrements() {
        let addr = 0x1000;
        unsafe {
            assert_eq!(acquire(addr, fake_sexp(addr)), 1);
            assert_eq!(acquire(addr, fake_sexp(addr)), 2);
            assert_eq!(protection_count(addr), 2);
            assert_eq!(release(addr, fake_sexp(addr)), 1);
            assert_eq!(protection_count(addr), 1);
            assert_eq!(release(addr, fake_sexp(addr)), 0);
        }
        assert_eq!(protection_count(addr), 0);
    }

    #[test]
    fn interleaved_handles_share_one_count() {
        let addr = 0x2000;
        unsafe {
            acquire(addr, fake_sexp(addr));
            acquire(addr, fake_sexp(addr));
            acquire(addr, fake_sexp(addr));
            release(addr, fake_sexp(addr));
            assert_eq!(protection_count(addr), 2);
            release(addr, fake_sexp(addr));
            release(addr, fake_sexp(addr));
        }
        assert_eq!(protection_count(addr), 0);
    }

    #[test]
    #[should_panic(expected = "not protected")]
    fn release_of_unregistered_address_panics() {
        let addr = 0x3000;
        unsafe {
            release(addr, fake_sexp(addr));
        }
    }

    #[test]
    fn passengers_dropped_when_count_reaches_zero() {
        let addr = 0x4000;
        unsafe {
            acquire(addr, fake_sexp(addr));
        }
        assert!(attach_passenger(addr, Box::new(String::from("payload"))));
        assert!(attach_passenger(addr, Box::new(42u32)));
        assert_eq!(passenger_count(addr), 2);
        unsafe {
            release(addr, fake_sexp(addr));
        }
        assert_eq!(passenger_count(addr), 0);
    }

    #[test]
    fn passenger_requires_registered_address() {
        let addr = 0x5000;
        assert!(!attach_passenger(addr, Box::new(1u8)));
        assert_eq!(passenger_count(addr), 0);
    }
}
