//! Interned string identifiers.
//!
//! A [`Quark`] is a small integer standing for a string. Interning is
//! process-wide and monotonic: the table only grows, and an interned string
//! stays valid for the rest of the process. Quarks key the named data
//! slots of native objects (see [`Object::set_data`](crate::Object::set_data))
//! and name error domains.

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt;
use std::num::NonZeroU32;

use crate::ffi::{self, NQuark};

/// Interned string identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Quark(NonZeroU32);

impl Quark {
    /// Intern `name`, returning the same quark for equal strings.
    ///
    /// # Panics
    ///
    /// Panics if `name` contains a NUL byte, which the native table cannot
    /// store.
    pub fn intern(name: &str) -> Quark {
        let name = match CString::new(name) {
            Ok(name) => name,
            Err(_) => panic!("quark name {:?} contains a NUL byte", name),
        };
        Self::intern_c(&name)
    }

    /// Intern a C string.
    pub fn intern_c(name: &CStr) -> Quark {
        let raw = unsafe { ffi::nquark_from_string(name.as_ptr()) };
        match Self::from_native(raw) {
            Some(quark) => quark,
            None => unreachable!("interning always yields a valid quark"),
        }
    }

    /// The quark of `name` if it was interned before. Never interns.
    pub fn lookup(name: &str) -> Option<Quark> {
        let name = CString::new(name).ok()?;
        Self::from_native(unsafe { ffi::nquark_try_string(name.as_ptr()) })
    }

    /// The interned string.
    ///
    /// # Panics
    ///
    /// Panics if this quark was built with [`Quark::from_raw`] from a
    /// number that was never interned.
    pub fn name(self) -> Cow<'static, str> {
        match self.c_name() {
            Some(name) => name.to_string_lossy(),
            None => panic!("quark {} was never interned", self.0),
        }
    }

    /// Create a quark from its integer value. Zero is not a quark.
    pub fn from_raw(raw: u32) -> Option<Quark> {
        NonZeroU32::new(raw).map(Quark)
    }

    /// The integer value.
    pub fn into_raw(self) -> u32 {
        self.0.get()
    }

    pub(crate) fn from_native(raw: NQuark) -> Option<Quark> {
        Self::from_raw(raw.0)
    }

    pub(crate) fn to_native(self) -> NQuark {
        NQuark(self.0.get())
    }

    fn c_name(self) -> Option<&'static CStr> {
        let ptr = ffi::nquark_to_string(self.to_native());
        if ptr.is_null() {
            None
        } else {
            // interned strings are never freed
            Some(unsafe { CStr::from_ptr(ptr) })
        }
    }
}

impl fmt::Debug for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.c_name() {
            Some(name) => write!(f, "Quark({}, {:?})", self.0, name),
            None => write!(f, "Quark({})", self.0),
        }
    }
}

impl fmt::Display for Quark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.c_name() {
            Some(name) => f.write_str(&name.to_string_lossy()),
            None => write!(f, "#{}", self.0),
        }
    }
}

impl From<&str> for Quark {
    fn from(name: &str) -> Self {
        Quark::intern(name)
    }
}
