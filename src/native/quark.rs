//! Process-wide string interning.
//!
//! The table is append-only: interned strings are leaked and live for the
//! rest of the process, so the pointers handed out stay valid forever.

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::c_char;
use std::ptr;
use std::sync::{Mutex, OnceLock};

use super::lock;
use crate::ffi::NQuark;

#[derive(Default)]
struct QuarkTable {
    names: Vec<&'static CStr>,
    index: HashMap<&'static CStr, NQuark>,
}

fn table() -> &'static Mutex<QuarkTable> {
    static TABLE: OnceLock<Mutex<QuarkTable>> = OnceLock::new();
    TABLE.get_or_init(Default::default)
}

/// Intern a string, returning its quark. Repeated calls with equal strings
/// return the same quark.
pub(crate) fn intern(name: &CStr) -> NQuark {
    let mut table = lock(table());
    if let Some(&quark) = table.index.get(name) {
        return quark;
    }
    let leaked: &'static CStr = Box::leak(name.to_owned().into_boxed_c_str());
    table.names.push(leaked);
    let quark = NQuark(table.names.len() as u32);
    table.index.insert(leaked, quark);
    quark
}

/// Look up the string of a quark.
pub(crate) fn name_of(quark: NQuark) -> Option<&'static CStr> {
    if !quark.is_valid() {
        return None;
    }
    lock(table()).names.get(quark.0 as usize - 1).copied()
}

/// Intern a NUL-terminated string.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn nquark_from_string(name: *const c_char) -> NQuark {
    assert!(!name.is_null(), "nquark_from_string: null string");
    intern(CStr::from_ptr(name))
}

/// Return the quark of an already interned string, or the invalid quark.
/// Never adds to the table.
///
/// # Safety
///
/// `name` must be null or a valid NUL-terminated string.
pub unsafe extern "C" fn nquark_try_string(name: *const c_char) -> NQuark {
    if name.is_null() {
        return NQuark::invalid();
    }
    lock(table())
        .index
        .get(CStr::from_ptr(name))
        .copied()
        .unwrap_or_default()
}

/// Return the interned string of a quark, or null if it was never interned.
pub extern "C" fn nquark_to_string(quark: NQuark) -> *const c_char {
    name_of(quark).map_or(ptr::null(), CStr::as_ptr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_is_idempotent() {
        let a = intern(c"native-quark-idempotent");
        let b = intern(c"native-quark-idempotent");
        assert_eq!(a, b);
        assert!(a.is_valid());
        assert_eq!(name_of(a), Some(c"native-quark-idempotent"));
    }

    #[test]
    fn test_try_string_does_not_intern() {
        let name = c"native-quark-never-interned";
        unsafe {
            assert!(!nquark_try_string(name.as_ptr()).is_valid());
            assert!(!nquark_try_string(name.as_ptr()).is_valid());
        }
    }

    #[test]
    fn test_unknown_quark_has_no_name() {
        assert!(nquark_to_string(NQuark::invalid()).is_null());
        assert!(nquark_to_string(NQuark(u32::MAX)).is_null());
    }
}
