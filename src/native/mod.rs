//! In-process native object runtime.
//!
//! Implements the C ABI the bridge is written against: interned quarks, a
//! single-inheritance type table, floating reference-counted objects with
//! named data slots, signals with destroy-notified user data, error records,
//! boxed records, and threading primitives. Everything is exposed as
//! `extern "C"` functions over raw pointers, so the bridge talks to it
//! exactly as it would to a foreign library.
//!
//! Precondition violations (null handles, unbalanced unrefs, unlocking an
//! unheld mutex) panic. A panic cannot unwind out of an `extern "C"`
//! function, so they abort the process, the same way the foreign library
//! would assert.

pub mod boxed;
pub mod error;
pub mod object;
pub mod quark;
pub mod signal;
pub mod thread;
pub mod types;

pub use boxed::*;
pub use error::*;
pub use object::*;
pub use quark::*;
pub use signal::*;
pub use thread::*;
pub use types::*;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a runtime table, ignoring poisoning.
///
/// Table updates are single assignments, so a panic mid-update cannot leave
/// them inconsistent.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
