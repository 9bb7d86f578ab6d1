//! Low-level native ABI.
//!
//! This module contains the C-layout records, identifier types and entry
//! points of the native object system. Users should prefer the safe
//! wrappers in the parent modules; the facade layer built on top of the
//! bridge is the intended consumer of this module.

pub mod error;
pub mod handles;
pub mod raw;

pub use error::{check_error, error_from_native};
pub use handles::*;
pub use raw::*;

pub use crate::native::*;
