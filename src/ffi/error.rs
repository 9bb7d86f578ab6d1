//! Error conversion utilities for FFI.

use super::raw::NError;
use crate::error::{BridgeError, Error};

/// Convert a native error record to a Rust [`Error`], taking ownership.
///
/// A null record yields an empty error.
///
/// # Safety
///
/// `err` must be null or a record allocated by the native runtime that no
/// one else will free.
pub unsafe fn error_from_native(err: *mut NError) -> Error {
    Error::from_raw(err)
}

/// Check the outcome of a native call that reports failure through both a
/// boolean and an error slot.
///
/// A failed call that left the slot empty still yields an error, so a
/// failure is never swallowed.
pub fn check_error(ok: bool, err: Error) -> crate::Result<()> {
    if err.is_set() {
        return Err(err);
    }
    if ok {
        Ok(())
    } else {
        Err(BridgeError::Failed("native call failed without reporting an error".into()).into())
    }
}
