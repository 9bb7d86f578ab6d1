//! Safe bridge to a reference-counted native object system.
//!
//! Native objects are opaque handles with a manual reference count, a
//! "floating" initial reference, a runtime type tag and named data slots.
//! This crate gives them Rust ownership:
//!
//! - a [`Context`] hands out exactly one wrapper per native object, shared
//!   through counted [`Pointer`]s, and releases the native reference when
//!   the last pointer goes away;
//! - [`Boxed`] gives value semantics to small records copied and freed by
//!   type-specific functions;
//! - [`Error`] owns a native error record and doubles as the crate's error
//!   type;
//! - [`Pointer::connect`] turns typed closures into native signal handlers.
//!
//! # Example
//!
//! ```
//! use objbridge::{Context, Object, ObjectType, Pointer, TypeTag, Value};
//!
//! struct Counter {
//!     parent: Object,
//! }
//!
//! impl ObjectType for Counter {
//!     type Parent = Object;
//!
//!     fn static_type() -> TypeTag {
//!         let tag = TypeTag::register_object(TypeTag::object(), "DocCounter").unwrap();
//!         tag.add_signal("increment").unwrap();
//!         tag
//!     }
//!
//!     fn from_parent(parent: Object) -> Self {
//!         Counter { parent }
//!     }
//!
//!     fn parent(&self) -> &Object {
//!         &self.parent
//!     }
//! }
//!
//! fn main() -> objbridge::Result<()> {
//!     let ctx = Context::new();
//!     let counter: Pointer<Counter> = ctx.create()?;
//!
//!     // Floating references are sunk: the wrapper owns the only one.
//!     assert!(!counter.object().is_floating());
//!     assert_eq!(counter.object().ref_count(), 1);
//!
//!     // Wrapping the handle again yields the same wrapper.
//!     let again = unsafe { ctx.wrap::<Counter>(counter.as_ptr()) }.unwrap();
//!     assert_eq!(counter, again);
//!
//!     counter.connect("increment", |_counter, (by,): (i64,)| by + 1)?;
//!     assert_eq!(counter.emit("increment", &[Value::Int(41)])?, Value::Int(42));
//!     Ok(())
//! }
//! ```

pub mod boxed;
pub mod context;
pub mod error;
pub mod ffi;
mod native;
pub mod object;
pub mod quark;
pub mod signal;
pub mod thread;
pub mod types;
pub mod value;

// Re-export main types at the crate root
pub use boxed::{Boxed, BoxedRecord, Rectangle};
pub use context::{Context, ContextOptions};
pub use error::{BridgeError, DecodeError, Error, Result};
pub use object::{Object, ObjectType, Pointer, RefState};
pub use quark::Quark;
pub use signal::{FromArgs, FromValue, IntoReturn, SignalHandlerId};
pub use thread::{Lock, Mutex, ReaderLock, RwLock, ThreadPool, WriterLock};
pub use types::TypeTag;
pub use value::Value;
