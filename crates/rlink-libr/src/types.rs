//! R type definitions.
//!
//! These types mirror R's internal C types.

use std::os::raw::c_int;

/// R's SEXPREC structure (opaque).
#[repr(C)]
pub struct SEXPREC {
    _private: [u8; 0],
}

/// SEXP is a pointer to SEXPREC.
pub type SEXP = *mut SEXPREC;

/// R's Rboolean type.
pub type Rboolean = c_int;

/// R TRUE value.
pub const R_TRUE: Rboolean = 1;

/// R FALSE value.
pub const R_FALSE: Rboolean = 0;

/// R's complex number type (a pair of doubles).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rcomplex {
    pub r: f64,
    pub i: f64,
}

/// Parse status returned by R_ParseVector.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Null = 0,
    Ok = 1,
    Incomplete = 2,
    Error = 3,
    Eof = 4,
}

/// SEXP type tags.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SexpType {
    NilSxp = 0,
    SymSxp = 1,
    ListSxp = 2,
    ClosSxp = 3,
    EnvSxp = 4,
    PromSxp = 5,
    LangSxp = 6,
    SpecialSxp = 7,
    BuiltinSxp = 8,
    CharSxp = 9,
    LglSxp = 10,
    IntSxp = 13,
    RealSxp = 14,
    CplxSxp = 15,
    StrSxp = 16,
    DotSxp = 17,
    AnySxp = 18,
    VecSxp = 19,
    ExprSxp = 20,
    BcodeSxp = 21,
    ExtptrSxp = 22,
    WeakrefSxp = 23,
    RawSxp = 24,
    S4Sxp = 25,
}

impl SexpType {
    /// Convert a raw `TYPEOF` result to a type tag.
    pub fn from_raw(raw: c_int) -> Option<SexpType> {
        match raw as u32 {
            0 => Some(SexpType::NilSxp),
            1 => Some(SexpType::SymSxp),
            2 => Some(SexpType::ListSxp),
            3 => Some(SexpType::ClosSxp),
            4 => Some(SexpType::EnvSxp),
            5 => Some(SexpType::PromSxp),
            6 => Some(SexpType::LangSxp),
            7 => Some(SexpType::SpecialSxp),
            8 => Some(SexpType::BuiltinSxp),
            9 => Some(SexpType::CharSxp),
            10 => Some(SexpType::LglSxp),
            13 => Some(SexpType::IntSxp),
            14 => Some(SexpType::RealSxp),
            15 => Some(SexpType::CplxSxp),
            16 => Some(SexpType::StrSxp),
            17 => Some(SexpType::DotSxp),
            18 => Some(SexpType::AnySxp),
            19 => Some(SexpType::VecSxp),
            20 => Some(SexpType::ExprSxp),
            21 => Some(SexpType::BcodeSxp),
            22 => Some(SexpType::ExtptrSxp),
            23 => Some(SexpType::WeakrefSxp),
            24 => Some(SexpType::RawSxp),
            25 => Some(SexpType::S4Sxp),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_round_trips_known_tags() {
        for tag in [
            SexpType::NilSxp,
            SexpType::SymSxp,
            SexpType::ListSxp,
            SexpType::EnvSxp,
            SexpType::LangSxp,
            SexpType::LglSxp,
            SexpType::IntSxp,
            SexpType::RealSxp,
            SexpType::CplxSxp,
            SexpType::StrSxp,
            SexpType::VecSxp,
            SexpType::ExtptrSxp,
            SexpType::RawSxp,
            SexpType::S4Sxp,
        ] {
            assert_eq!(SexpType::from_raw(tag as c_int), Some(tag));
        }
    }

    #[test]
    fn from_raw_rejects_unknown_tags() {
        assert_eq!(SexpType::from_raw(11), None);
        assert_eq!(SexpType::from_raw(99), None);
        assert_eq!(SexpType::from_raw(-1), None);
    }
}
