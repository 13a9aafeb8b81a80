//! Platform-specific R library discovery and embedded initialization.

use crate::error::{RError, RResult};
use crate::functions::{init_r_library, r_library};
use std::env;
use std::ffi::CString;
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::process::Command;

/// Default R library paths by platform.
#[cfg(target_os = "linux")]
const R_LIB_PATHS: &[&str] = &[
    "/opt/R/current/lib/R/lib/libR.so",
    "/usr/lib/R/lib/libR.so",
    "/usr/local/lib/R/lib/libR.so",
];

#[cfg(target_os = "macos")]
const R_LIB_PATHS: &[&str] = &[
    "/Library/Frameworks/R.framework/Versions/Current/Resources/lib/libR.dylib",
    "/opt/R/arm64/lib/R/lib/libR.dylib",
    "/usr/local/lib/R/lib/libR.dylib",
];

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
const R_LIB_PATHS: &[&str] = &[];

#[cfg(target_os = "linux")]
fn r_lib_name() -> &'static str {
    "libR.so"
}

#[cfg(target_os = "macos")]
fn r_lib_name() -> &'static str {
    "libR.dylib"
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn r_lib_name() -> &'static str {
    "libR.so"
}

/// Find the R shared library path.
pub fn find_r_library() -> RResult<PathBuf> {
    // First, check R_HOME environment variable
    if let Ok(r_home) = env::var("R_HOME") {
        let lib_path = PathBuf::from(&r_home).join("lib").join(r_lib_name());
        if lib_path.exists() {
            return Ok(lib_path);
        }
    }

    // Try to get R_HOME from R itself
    if let Ok(output) = Command::new("R").args(["RHOME"]).output()
        && output.status.success()
    {
        let r_home = String::from_utf8_lossy(&output.stdout).trim().to_string();
        let lib_path = PathBuf::from(&r_home).join("lib").join(r_lib_name());
        if lib_path.exists() {
            return Ok(lib_path);
        }
    }

    // Try default paths
    for path in R_LIB_PATHS {
        let path = PathBuf::from(path);
        if path.exists() {
            return Ok(path);
        }
    }

    Err(RError::LibraryNotFound(
        "Could not find R library. Please set R_HOME or ensure R is in PATH.".to_string(),
    ))
}

/// Get R_HOME from the environment or by asking R itself.
pub fn get_r_home() -> RResult<PathBuf> {
    if let Ok(r_home) = env::var("R_HOME") {
        return Ok(PathBuf::from(r_home));
    }

    let output = Command::new("R")
        .args(["RHOME"])
        .output()
        .map_err(|e| RError::LibraryNotFound(format!("Failed to run R RHOME: {}", e)))?;

    if output.status.success() {
        let r_home = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(PathBuf::from(r_home))
    } else {
        Err(RError::LibraryNotFound(
            "R RHOME failed. Is R installed and in PATH?".to_string(),
        ))
    }
}

/// Initialize embedded R with default arguments.
///
/// # Safety
/// This function initializes R's global state and must only be called once
/// per process.
pub unsafe fn initialize_r_embedded() -> RResult<()> {
    unsafe { initialize_r_embedded_with_args(&["--quiet", "--no-save", "--no-restore-data"]) }
}

/// Initialize embedded R with custom command-line arguments.
///
/// The `r_args` parameter should contain R command-line arguments like
/// `["--quiet", "--no-save", "--no-restore-data"]`.
///
/// # Safety
/// This function initializes R's global state and must only be called once
/// per process.
pub unsafe fn initialize_r_embedded_with_args(r_args: &[&str]) -> RResult<()> {
    // Find and load R library
    let lib_path = find_r_library()?;
    init_r_library(&lib_path)?;

    // Set R_HOME if not already set; R refuses to start without it
    if env::var("R_HOME").is_err()
        && let Ok(r_home) = get_r_home()
    {
        // SAFETY: single-threaded initialization, before R starts
        unsafe { env::set_var("R_HOME", &r_home) };
    }

    // Set R_LIBS_SITE so R can find base packages
    if env::var("R_LIBS_SITE").is_err()
        && let Ok(r_home) = get_r_home()
    {
        let site_lib = r_home.join("library");
        if site_lib.exists() {
            // SAFETY: single-threaded initialization, before R starts
            unsafe { env::set_var("R_LIBS_SITE", site_lib.to_string_lossy().as_ref()) };
        }
    }

    let lib = r_library()?;

    unsafe {
        // Disable R's signal handlers before initialization so the host
        // process keeps its own SIGINT handling
        if !lib.r_signalhandlers.is_null() {
            *lib.r_signalhandlers = 0;
        }

        let mut args: Vec<CString> = Vec::with_capacity(r_args.len() + 1);
        args.push(CString::new("rlink").map_err(|e| RError::LibraryNotFound(e.to_string()))?);
        for arg in r_args {
            if let Ok(cstr) = CString::new(*arg) {
                args.push(cstr);
            }
        }
        let arg_ptrs: Vec<*const c_char> = args.iter().map(|s| s.as_ptr()).collect();

        (lib.rf_initialize_r)(args.len() as c_int, arg_ptrs.as_ptr());

        // Disable stack checking; the embedding thread's stack bounds are
        // unknown to R and the default limit causes spurious C stack errors
        if !lib.r_cstacklimit.is_null() {
            *lib.r_cstacklimit = usize::MAX;
        }

        // Run non-interactively
        if !lib.r_interactive.is_null() {
            *lib.r_interactive = 0;
        }

        (lib.setup_rmainloop)();
    }

    log::debug!("embedded R initialized from {}", lib_path.display());

    Ok(())
}

/// Shut down the embedded R interpreter.
///
/// Runs registered exit finalizers, forces a final garbage collection and
/// calls `Rf_endEmbeddedR`. After this returns, no R API may be called.
///
/// # Safety
/// R must have been initialized, and no R objects may be used afterwards.
pub unsafe fn end_r_embedded() -> RResult<()> {
    let lib = r_library()?;
    unsafe {
        (lib.r_runexitfinalizers)();
        (lib.r_gc)();
        (lib.rf_endembeddedr)(0);
    }
    Ok(())
}
