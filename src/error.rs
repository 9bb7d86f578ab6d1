//! Error types for the bridge.
//!
//! [`Error`] adapts the native error-slot convention into an owned value:
//! it is either empty or owns exactly one native error record. It is the
//! error type of every fallible bridge call, so it can be returned as
//! `Err` and propagated with `?`, or kept around as an out-parameter and
//! checked with [`Error::is_set`].

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt;
use std::mem;
use std::ptr::{self, NonNull};

use thiserror::Error as ThisError;

use crate::ffi::{self, NError};
use crate::quark::Quark;

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message reported by an empty [`Error`].
pub const UNDEFINED_MESSAGE: &str = "Undefined error";

/// Recoverable error value.
///
/// `Clone` makes an independent deep copy of the record; dropping a set
/// error frees its record.
pub struct Error {
    raw: Option<NonNull<NError>>,
}

// The record is plain heap data owned by this value; the native error
// functions keep no per-thread state.
unsafe impl Send for Error {}
unsafe impl Sync for Error {}

impl Error {
    /// An empty error.
    pub const fn none() -> Self {
        Self { raw: None }
    }

    /// Create an error whose message is produced by formatting `args`.
    ///
    /// Use [`Error::new_literal`] for text that did not come from a format
    /// string written in the program, such as messages received from
    /// elsewhere.
    ///
    /// ```
    /// use objbridge::{Error, Quark};
    ///
    /// let domain = Quark::intern("my-app-error");
    /// let err = Error::new(domain, 7, format_args!("bad value: {}", 5));
    /// assert_eq!(err.message(), "bad value: 5");
    /// ```
    pub fn new(domain: Quark, code: i32, args: fmt::Arguments<'_>) -> Self {
        match args.as_str() {
            Some(message) => Self::new_literal(domain, code, message),
            None => Self::new_literal(domain, code, &fmt::format(args)),
        }
    }

    /// Create an error with a verbatim message.
    ///
    /// Native error messages are C strings; anything from an interior NUL
    /// onward is dropped.
    pub fn new_literal(domain: Quark, code: i32, message: &str) -> Self {
        let message = to_c_message(message);
        unsafe {
            ffi::error_from_native(ffi::nerror_new_literal(
                domain.to_native(),
                code,
                message.as_ptr(),
            ))
        }
    }

    /// Fill an empty error with a formatted message.
    ///
    /// # Panics
    ///
    /// Panics if the error is already set; filling an error twice would
    /// leak the first record.
    pub fn set(&mut self, domain: Quark, code: i32, args: fmt::Arguments<'_>) {
        assert!(!self.is_set(), "Error::set called on an error that is already set");
        *self = Self::new(domain, code, args);
    }

    /// Fill an empty error with a verbatim message.
    ///
    /// # Panics
    ///
    /// Panics if the error is already set.
    pub fn set_literal(&mut self, domain: Quark, code: i32, message: &str) {
        assert!(
            !self.is_set(),
            "Error::set_literal called on an error that is already set"
        );
        *self = Self::new_literal(domain, code, message);
    }

    /// Free the record, leaving the error empty.
    pub fn clear(&mut self) {
        if let Some(raw) = self.raw.take() {
            unsafe { ffi::nerror_free(raw.as_ptr()) };
        }
    }

    /// Move `other`'s record into `self`, leaving `other` empty.
    ///
    /// Any record `self` held before is freed first.
    pub fn propagate(&mut self, other: &mut Error) {
        self.clear();
        self.raw = other.raw.take();
    }

    /// Whether the error holds a record.
    pub fn is_set(&self) -> bool {
        self.raw.is_some()
    }

    /// Whether the error is set with the given domain and code.
    pub fn matches(&self, domain: Quark, code: i32) -> bool {
        unsafe { ffi::nerror_matches(self.as_ptr(), domain.to_native(), code) }
    }

    /// Error domain, or `None` when empty.
    pub fn domain(&self) -> Option<Quark> {
        self.record().and_then(|r| Quark::from_native(r.domain))
    }

    /// Error code, or `None` when empty.
    pub fn code(&self) -> Option<i32> {
        self.record().map(|r| r.code)
    }

    /// Error message. An empty error reports [`UNDEFINED_MESSAGE`], so the
    /// result is always printable.
    pub fn message(&self) -> Cow<'_, str> {
        match self.record() {
            Some(r) if !r.message.is_null() => unsafe { CStr::from_ptr(r.message) }.to_string_lossy(),
            Some(_) => Cow::Borrowed(""),
            None => Cow::Borrowed(UNDEFINED_MESSAGE),
        }
    }

    /// `Ok(())` if empty, otherwise `Err(self)`.
    pub fn into_result(self) -> Result<()> {
        if self.is_set() {
            Err(self)
        } else {
            Ok(())
        }
    }

    /// Take ownership of a native record. Null gives an empty error.
    ///
    /// # Safety
    ///
    /// `raw` must be null or an owned record that no one else will free.
    pub unsafe fn from_raw(raw: *mut NError) -> Self {
        Self {
            raw: NonNull::new(raw),
        }
    }

    /// Release ownership of the record. Empty errors give null.
    pub fn into_raw(self) -> *mut NError {
        let raw = self.raw.map_or(ptr::null_mut(), NonNull::as_ptr);
        mem::forget(self);
        raw
    }

    /// Read-only view for native functions that inspect an error.
    pub fn as_ptr(&self) -> *const NError {
        self.raw.map_or(ptr::null(), |raw| raw.as_ptr() as *const NError)
    }

    /// Error slot for native functions that may fill in an error.
    ///
    /// # Panics
    ///
    /// Panics if the error is already set.
    pub fn as_out_ptr(&mut self) -> *mut *mut NError {
        assert!(
            !self.is_set(),
            "error slot requested from an error that is already set"
        );
        // Option<NonNull<T>> has the layout of a nullable *mut T
        &mut self.raw as *mut Option<NonNull<NError>> as *mut *mut NError
    }

    /// Hand the record to a native error slot, or drop it if the caller
    /// passed no slot.
    ///
    /// # Safety
    ///
    /// `slot` must be null or point to an empty error pointer.
    pub unsafe fn propagate_into(self, slot: *mut *mut NError) {
        if !self.is_set() {
            return;
        }
        if slot.is_null() {
            tracing::warn!(error = %self, "caller passed no error slot, dropping error");
        }
        ffi::npropagate_error(slot, self.into_raw());
    }

    fn record(&self) -> Option<&NError> {
        self.raw.map(|raw| unsafe { &*raw.as_ptr() })
    }
}

fn to_c_message(message: &str) -> CString {
    let bytes = message.as_bytes();
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    CString::new(&bytes[..end]).unwrap_or_default()
}

impl Default for Error {
    fn default() -> Self {
        Self::none()
    }
}

impl Clone for Error {
    fn clone(&self) -> Self {
        match self.raw {
            Some(raw) => unsafe { ffi::error_from_native(ffi::nerror_copy(raw.as_ptr())) },
            None => Self::none(),
        }
    }
}

impl Drop for Error {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.record() {
            Some(r) => f
                .debug_struct("Error")
                .field("domain", &Quark::from_native(r.domain))
                .field("code", &r.code)
                .field("message", &self.message())
                .finish(),
            None => f.write_str("Error(none)"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl std::error::Error for Error {}

/// Failures of the bridge itself, reported in the `objbridge-error`
/// domain.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    /// A native call failed without saying why.
    #[error("{0}")]
    Failed(String),

    /// A name contains a NUL byte or is empty.
    #[error("invalid name: {0:?}")]
    InvalidName(String),

    /// The type could not be registered.
    #[error("type '{0}' conflicts with an existing registration")]
    TypeConflict(String),

    /// The type cannot be instantiated as an object.
    #[error("type '{0}' is not an instantiable object type")]
    NotInstantiable(String),

    /// A string value contains a NUL byte and cannot cross the ABI.
    #[error("argument {0} contains an interior NUL byte")]
    InteriorNul(usize),
}

impl BridgeError {
    /// Domain of bridge errors.
    pub fn domain() -> Quark {
        Quark::intern("objbridge-error")
    }

    /// Code of this error in [`BridgeError::domain`].
    pub fn code(&self) -> i32 {
        match self {
            BridgeError::Failed(_) => 1,
            BridgeError::InvalidName(_) => 2,
            BridgeError::TypeConflict(_) => 3,
            BridgeError::NotInstantiable(_) => 4,
            BridgeError::InteriorNul(_) => 5,
        }
    }
}

impl From<BridgeError> for Error {
    fn from(err: BridgeError) -> Self {
        Error::new_literal(BridgeError::domain(), err.code(), &err.to_string())
    }
}

/// Malformed callback arguments, reported in the `objbridge-decode-error`
/// domain.
#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Wrong number of arguments.
    #[error("expected {expected} callback arguments, got {actual}")]
    Arity {
        /// Arguments the callback takes.
        expected: usize,
        /// Arguments the emitter passed.
        actual: usize,
    },

    /// The argument has a different type tag.
    #[error("argument {index}: expected {expected}, found {found}")]
    TypeMismatch {
        /// Position of the argument.
        index: usize,
        /// Type the callback takes.
        expected: &'static str,
        /// Type the emitter passed.
        found: &'static str,
    },

    /// A string is not valid UTF-8.
    #[error("argument {index}: string is not valid UTF-8")]
    InvalidUtf8 {
        /// Position of the argument.
        index: usize,
    },

    /// A null pointer where a value is required.
    #[error("argument {index}: unexpected null")]
    Null {
        /// Position of the argument.
        index: usize,
    },

    /// An integer does not fit the callback's parameter type.
    #[error("argument {index}: {value} is out of range for {target}")]
    OutOfRange {
        /// Position of the argument.
        index: usize,
        /// Value passed.
        value: i64,
        /// Parameter type.
        target: &'static str,
    },

    /// An object argument is not an instance of the expected wrapper type.
    #[error("argument {index}: object of type '{found}' is not a {expected}")]
    ObjectType {
        /// Position of the argument.
        index: usize,
        /// Wrapper type the callback takes.
        expected: &'static str,
        /// Native type of the object passed.
        found: String,
    },

    /// The emitting instance could not be resolved to a wrapper.
    #[error("signal emitted on a null instance")]
    NullInstance,
}

impl DecodeError {
    /// Domain of decode errors.
    pub fn domain() -> Quark {
        Quark::intern("objbridge-decode-error")
    }

    /// Code of this error in [`DecodeError::domain`].
    pub fn code(&self) -> i32 {
        match self {
            DecodeError::Arity { .. } => 1,
            DecodeError::TypeMismatch { .. } => 2,
            DecodeError::InvalidUtf8 { .. } => 3,
            DecodeError::Null { .. } => 4,
            DecodeError::OutOfRange { .. } => 5,
            DecodeError::ObjectType { .. } => 6,
            DecodeError::NullInstance => 7,
        }
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        Error::new_literal(DecodeError::domain(), err.code(), &err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain() -> Quark {
        Quark::intern("objbridge-error-unit-test")
    }

    #[test]
    fn test_empty_error() {
        let err = Error::none();
        assert!(!err.is_set());
        assert_eq!(err.message(), UNDEFINED_MESSAGE);
        assert_eq!(err.domain(), None);
        assert_eq!(err.code(), None);
        assert!(!err.matches(domain(), 0));
        assert!(err.as_ptr().is_null());
    }

    #[test]
    fn test_out_ptr_fills_error() {
        let mut err = Error::none();
        let message = CString::new("filled").unwrap();
        unsafe {
            ffi::nset_error_literal(
                err.as_out_ptr(),
                domain().to_native(),
                4,
                message.as_ptr(),
            );
        }
        assert!(err.matches(domain(), 4));
        assert_eq!(err.message(), "filled");
    }

    #[test]
    #[should_panic(expected = "already set")]
    fn test_out_ptr_on_set_error_panics() {
        let mut err = Error::new_literal(domain(), 1, "first");
        let _ = err.as_out_ptr();
    }

    #[test]
    fn test_interior_nul_truncates() {
        let err = Error::new_literal(domain(), 1, "head\0tail");
        assert_eq!(err.message(), "head");
    }

    #[test]
    fn test_into_raw_round_trip() {
        let err = Error::new_literal(domain(), 9, "raw");
        let raw = err.into_raw();
        let back = unsafe { Error::from_raw(raw) };
        assert!(back.matches(domain(), 9));
    }

    #[test]
    fn test_bridge_error_conversion() {
        let err: Error = BridgeError::TypeConflict("Widget".into()).into();
        assert!(err.matches(BridgeError::domain(), 3));
        assert_eq!(
            err.message(),
            "type 'Widget' conflicts with an existing registration"
        );
    }
}
