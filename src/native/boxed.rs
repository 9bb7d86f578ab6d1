//! Boxed records: fixed-layout values copied and freed through functions
//! registered with their type, never reference counted.

use std::os::raw::{c_int, c_void};
use std::sync::OnceLock;

use super::types::{boxed_funcs, ntype_register_boxed};
use crate::ffi::{NRect, NType};

/// Copy a record of a boxed type.
///
/// # Safety
///
/// `record` must point to a valid record of type `tag`.
pub unsafe extern "C" fn nboxed_copy(tag: NType, record: *const c_void) -> *mut c_void {
    assert!(!record.is_null(), "nboxed_copy: null record");
    match boxed_funcs(tag) {
        Some((Some(copy), _)) => copy(record),
        _ => panic!("nboxed_copy: type {} is not a boxed type", tag.0),
    }
}

/// Free a record of a boxed type. Null is ignored.
///
/// # Safety
///
/// `record` must be null or an owned record of type `tag`.
pub unsafe extern "C" fn nboxed_free(tag: NType, record: *mut c_void) {
    if record.is_null() {
        return;
    }
    match boxed_funcs(tag) {
        Some((_, Some(free))) => free(record),
        _ => panic!("nboxed_free: type {} is not a boxed type", tag.0),
    }
}

/// Allocate a rectangle.
pub extern "C" fn nrect_new(x: c_int, y: c_int, width: c_int, height: c_int) -> *mut NRect {
    Box::into_raw(Box::new(NRect {
        x,
        y,
        width,
        height,
    }))
}

/// Copy a rectangle.
///
/// # Safety
///
/// `rect` must point to a valid rectangle.
pub unsafe extern "C" fn nrect_copy(rect: *const NRect) -> *mut NRect {
    assert!(!rect.is_null(), "nrect_copy: null rectangle");
    Box::into_raw(Box::new(*rect))
}

/// Free a rectangle allocated by `nrect_new` or `nrect_copy`.
///
/// # Safety
///
/// `rect` must be null or an owned rectangle.
pub unsafe extern "C" fn nrect_free(rect: *mut NRect) {
    if !rect.is_null() {
        drop(Box::from_raw(rect));
    }
}

unsafe extern "C" fn rect_copy_erased(record: *const c_void) -> *mut c_void {
    nrect_copy(record.cast()).cast()
}

unsafe extern "C" fn rect_free_erased(record: *mut c_void) {
    nrect_free(record.cast())
}

/// Boxed type tag of [`NRect`].
pub extern "C" fn nrect_get_type() -> NType {
    static TAG: OnceLock<NType> = OnceLock::new();
    *TAG.get_or_init(|| unsafe {
        ntype_register_boxed(
            c"NRect".as_ptr(),
            Some(rect_copy_erased),
            Some(rect_free_erased),
        )
    })
}
