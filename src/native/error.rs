//! Error records and the error-slot convention.
//!
//! A fallible function takes a nullable `*mut *mut NError`. On failure it
//! allocates a record and stores it in the slot; the slot's owner frees it.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_int};
use std::ptr;

use super::quark::intern;
use crate::ffi::{NError, NQuark};

/// Domain of errors raised by the native runtime itself.
pub extern "C" fn nobject_error_quark() -> NQuark {
    intern(c"nobject-error-quark")
}

/// Allocate an error record with a verbatim message.
///
/// # Safety
///
/// `message` must be null or a valid NUL-terminated string.
pub unsafe extern "C" fn nerror_new_literal(
    domain: NQuark,
    code: c_int,
    message: *const c_char,
) -> *mut NError {
    let message = if message.is_null() {
        ptr::null_mut()
    } else {
        CStr::from_ptr(message).to_owned().into_raw()
    };
    Box::into_raw(Box::new(NError {
        domain,
        code,
        message,
    }))
}

/// Deep-copy an error record.
///
/// # Safety
///
/// `err` must be a record returned by this module.
pub unsafe extern "C" fn nerror_copy(err: *const NError) -> *mut NError {
    assert!(!err.is_null(), "nerror_copy: null error");
    let err = &*err;
    nerror_new_literal(err.domain, err.code, err.message)
}

/// Free an error record. Null is ignored.
///
/// # Safety
///
/// `err` must be null or a record returned by this module that has not
/// been freed yet.
pub unsafe extern "C" fn nerror_free(err: *mut NError) {
    if err.is_null() {
        return;
    }
    let err = Box::from_raw(err);
    if !err.message.is_null() {
        drop(CString::from_raw(err.message));
    }
}

/// Whether `err` is non-null and carries `domain` and `code`.
///
/// # Safety
///
/// `err` must be null or a valid record.
pub unsafe extern "C" fn nerror_matches(err: *const NError, domain: NQuark, code: c_int) -> bool {
    match err.as_ref() {
        Some(err) => err.domain == domain && err.code == code,
        None => false,
    }
}

/// Store a new error in `slot`. A null slot means the caller ignores
/// errors. Filling a slot that already holds an error is a caller bug.
///
/// # Safety
///
/// `slot` must be null or point to a valid error pointer, and `message`
/// must be a valid NUL-terminated string.
pub unsafe extern "C" fn nset_error_literal(
    slot: *mut *mut NError,
    domain: NQuark,
    code: c_int,
    message: *const c_char,
) {
    if slot.is_null() {
        return;
    }
    assert!((*slot).is_null(), "error slot filled twice");
    *slot = nerror_new_literal(domain, code, message);
}

/// Move `src` into `dest`, or free it if `dest` is null.
///
/// # Safety
///
/// `src` must be an owned record; `dest` must be null or point to an empty
/// error pointer.
pub unsafe extern "C" fn npropagate_error(dest: *mut *mut NError, src: *mut NError) {
    if dest.is_null() {
        nerror_free(src);
        return;
    }
    assert!((*dest).is_null(), "error slot filled twice");
    *dest = src;
}

/// Set `slot` from a Rust string, replacing interior NULs.
pub(crate) fn set_error(slot: *mut *mut NError, domain: NQuark, code: c_int, message: &str) {
    let message = CString::new(message.replace('\0', " ")).unwrap_or_default();
    unsafe { nset_error_literal(slot, domain, code, message.as_ptr()) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_is_independent() {
        unsafe {
            let domain = nobject_error_quark();
            let err = nerror_new_literal(domain, 3, c"boom".as_ptr());
            let copy = nerror_copy(err);
            assert_ne!((*err).message, (*copy).message);
            nerror_free(err);
            assert!(nerror_matches(copy, domain, 3));
            assert_eq!(CStr::from_ptr((*copy).message), c"boom");
            nerror_free(copy);
        }
    }

    #[test]
    fn test_propagate_to_null_slot_frees() {
        unsafe {
            let err = nerror_new_literal(nobject_error_quark(), 1, c"dropped".as_ptr());
            npropagate_error(ptr::null_mut(), err);
        }
    }

    #[test]
    fn test_set_error_fills_slot() {
        let mut slot: *mut NError = ptr::null_mut();
        set_error(&mut slot, nobject_error_quark(), 2, "bad\0input");
        unsafe {
            assert!(nerror_matches(slot, nobject_error_quark(), 2));
            assert_eq!(CStr::from_ptr((*slot).message), c"bad input");
            nerror_free(slot);
        }
    }
}
