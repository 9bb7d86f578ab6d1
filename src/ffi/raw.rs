//! Raw C-layout records and function pointer types of the native ABI.
//!
//! The functions operating on these records live in [`crate::native`] and
//! are re-exported from [`crate::ffi`]. Users should prefer the safe
//! wrappers in the parent modules.

use std::os::raw::{c_char, c_int, c_void};

use super::handles::*;
use crate::native::NObject;

/// Error code carried in an [`NError`] record.
pub type NErrorCode = c_int;

// Codes used by the native runtime in its own error domain
// (`nobject_error_quark()`).
pub const NOBJECT_ERROR_UNKNOWN_SIGNAL: NErrorCode = 2;
pub const NOBJECT_ERROR_INVALID_ARGUMENT: NErrorCode = 3;
pub const NOBJECT_ERROR_THREAD: NErrorCode = 4;

/// C error structure.
///
/// Allocated by the native side and owned by whoever holds the error slot
/// it was written into; released with `nerror_free`.
#[repr(C)]
#[derive(Debug)]
pub struct NError {
    pub domain: NQuark,
    pub code: NErrorCode,
    pub message: *mut c_char,
}

// Value tags
pub type NValueTag = c_int;

pub const NVALUE_NONE: NValueTag = 0;
pub const NVALUE_INT: NValueTag = 1;
pub const NVALUE_DOUBLE: NValueTag = 2;
pub const NVALUE_BOOL: NValueTag = 3;
pub const NVALUE_STRING: NValueTag = 4;
pub const NVALUE_STRV: NValueTag = 5;
pub const NVALUE_INT_ARRAY: NValueTag = 6;
pub const NVALUE_BOOL_ARRAY: NValueTag = 7;
pub const NVALUE_OBJECT: NValueTag = 8;

/// Counted array payload of an [`NValue`].
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct NArray {
    pub data: *const c_void,
    pub len: usize,
}

/// Payload of an [`NValue`]; which field is live is given by the tag.
#[repr(C)]
#[derive(Clone, Copy)]
pub union NValueData {
    pub v_int: i64,
    pub v_double: f64,
    pub v_bool: bool,
    pub v_string: *const c_char,
    pub v_strv: *const *const c_char,
    pub v_array: NArray,
    pub v_object: *mut NObject,
}

/// Tagged argument or return value passed through signal emission.
///
/// Values never own what they point to: strings, string vectors, arrays
/// and objects stay owned by the emitter for the duration of the call.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct NValue {
    pub tag: NValueTag,
    pub data: NValueData,
}

impl NValue {
    pub const fn none() -> Self {
        Self {
            tag: NVALUE_NONE,
            data: NValueData { v_int: 0 },
        }
    }

    pub const fn int(v: i64) -> Self {
        Self {
            tag: NVALUE_INT,
            data: NValueData { v_int: v },
        }
    }

    pub const fn double(v: f64) -> Self {
        Self {
            tag: NVALUE_DOUBLE,
            data: NValueData { v_double: v },
        }
    }

    pub const fn boolean(v: bool) -> Self {
        Self {
            tag: NVALUE_BOOL,
            data: NValueData { v_bool: v },
        }
    }

    pub const fn string(s: *const c_char) -> Self {
        Self {
            tag: NVALUE_STRING,
            data: NValueData { v_string: s },
        }
    }

    pub const fn strv(v: *const *const c_char) -> Self {
        Self {
            tag: NVALUE_STRV,
            data: NValueData { v_strv: v },
        }
    }

    pub const fn int_array(data: *const i64, len: usize) -> Self {
        Self {
            tag: NVALUE_INT_ARRAY,
            data: NValueData {
                v_array: NArray {
                    data: data as *const c_void,
                    len,
                },
            },
        }
    }

    pub const fn bool_array(data: *const bool, len: usize) -> Self {
        Self {
            tag: NVALUE_BOOL_ARRAY,
            data: NValueData {
                v_array: NArray {
                    data: data as *const c_void,
                    len,
                },
            },
        }
    }

    pub const fn object(obj: *mut NObject) -> Self {
        Self {
            tag: NVALUE_OBJECT,
            data: NValueData { v_object: obj },
        }
    }

    /// Human readable name of the tag, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        tag_name(self.tag)
    }
}

impl Default for NValue {
    fn default() -> Self {
        Self::none()
    }
}

impl std::fmt::Debug for NValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NValue")
            .field("tag", &self.type_name())
            .finish_non_exhaustive()
    }
}

/// Name of a value tag.
pub fn tag_name(tag: NValueTag) -> &'static str {
    match tag {
        NVALUE_NONE => "none",
        NVALUE_INT => "int",
        NVALUE_DOUBLE => "double",
        NVALUE_BOOL => "bool",
        NVALUE_STRING => "string",
        NVALUE_STRV => "string vector",
        NVALUE_INT_ARRAY => "int array",
        NVALUE_BOOL_ARRAY => "bool array",
        NVALUE_OBJECT => "object",
        _ => "unknown",
    }
}

/// Rectangle record, the built-in boxed type.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NRect {
    pub x: c_int,
    pub y: c_int,
    pub width: c_int,
    pub height: c_int,
}

/// Destroy notifier attached to user data.
pub type NDestroyNotify = Option<unsafe extern "C" fn(data: *mut c_void)>;

/// Signal handler entry point.
///
/// Receives the emitting instance, the argument vector, the user data given
/// at connection time, and an error slot the handler may fill.
pub type NSignalCallback = Option<
    unsafe extern "C" fn(
        instance: *mut NObject,
        args: *const NValue,
        n_args: usize,
        user_data: *mut c_void,
        error: *mut *mut NError,
    ) -> NValue,
>;

/// Copy function of a boxed record type.
pub type NBoxedCopyFunc = Option<unsafe extern "C" fn(record: *const c_void) -> *mut c_void>;

/// Free function of a boxed record type.
pub type NBoxedFreeFunc = Option<unsafe extern "C" fn(record: *mut c_void)>;

/// Task entry point of a thread pool.
pub type NFunc = Option<unsafe extern "C" fn(data: *mut c_void, user_data: *mut c_void)>;
