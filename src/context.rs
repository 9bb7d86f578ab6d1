//! The wrapper registry.
//!
//! A [`Context`] maps native object handles to their wrappers. The mapping
//! lives on the objects themselves: each wrapped object carries a
//! back-pointer to its wrapper in a named-data slot keyed by the context's
//! reserved quark. The context also holds the class table used to pick the
//! most-derived wrapper class for a handle wrapped without a static type.

use std::any::{type_name, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::ptr::NonNull;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{BridgeError, Result};
use crate::ffi::{self, NObject};
use crate::object::{AnyObject, ObjectType, Pointer, RefState, WrapperCell};
use crate::quark::Quark;
use crate::types::TypeTag;

/// Prefix of every back-pointer quark. Named data under such keys is
/// reserved for the registry.
pub(crate) const WRAPPER_KEY_PREFIX: &str = "objbridge-wrapper-";

static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(1);

/// Context configuration.
#[derive(Debug, Clone, Default)]
pub struct ContextOptions {
    /// Suffix of the back-pointer key. Contexts created with the same key
    /// share wrappers. A fresh unique key is used when unset.
    pub wrapper_key: Option<String>,

    /// Panic instead of logging a warning when disconnecting a handler that
    /// is not connected.
    pub strict_disconnect: bool,
}

struct ClassEntry {
    type_id: TypeId,
    name: &'static str,
    build: fn(NonNull<NObject>) -> Box<dyn AnyObject>,
}

fn build<T: ObjectType>(raw: NonNull<NObject>) -> Box<dyn AnyObject> {
    Box::new(T::construct(raw))
}

pub(crate) struct ContextInner {
    pub(crate) key: Quark,
    pub(crate) live: Cell<usize>,
    options: ContextOptions,
    classes: RefCell<HashMap<TypeTag, ClassEntry>>,
}

/// Handle to a wrapper registry.
///
/// Cloning is cheap and yields a handle to the same registry. A context is
/// bound to the thread that created it, like the objects it wraps.
#[derive(Clone)]
pub struct Context {
    inner: Rc<ContextInner>,
}

impl Context {
    /// Create a context with default options.
    pub fn new() -> Self {
        Self::with_options(ContextOptions::default())
    }

    /// Create a context.
    pub fn with_options(options: ContextOptions) -> Self {
        let key = match &options.wrapper_key {
            Some(suffix) => Quark::intern(&format!("{WRAPPER_KEY_PREFIX}{suffix}")),
            None => {
                let n = NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed);
                Quark::intern(&format!("{WRAPPER_KEY_PREFIX}{n}"))
            }
        };
        let ctx = Context {
            inner: Rc::new(ContextInner {
                key,
                live: Cell::new(0),
                options,
                classes: RefCell::new(HashMap::new()),
            }),
        };
        ctx.register::<crate::Object>();
        tracing::debug!(key = %key, "created context");
        ctx
    }

    pub(crate) fn from_inner(inner: Rc<ContextInner>) -> Self {
        Context { inner }
    }

    /// The context's options.
    pub fn options(&self) -> &ContextOptions {
        &self.inner.options
    }

    /// Quark under which wrapped objects store their back-pointer.
    pub fn wrapper_key(&self) -> Quark {
        self.inner.key
    }

    /// Number of wrappers currently alive in this context.
    pub fn live_wrappers(&self) -> usize {
        self.inner.live.get()
    }

    /// Register `T` and its parent classes for dynamic dispatch.
    ///
    /// The first class registered for a native type wins; registering a
    /// different Rust class for the same type later is ignored.
    ///
    /// # Panics
    ///
    /// Panics if the native type of `T` does not derive from the native type
    /// of `T::Parent`.
    pub fn register<T: ObjectType>(&self) {
        if TypeId::of::<T::Parent>() != TypeId::of::<T>() {
            self.register::<T::Parent>();
        }
        let tag = T::static_type();
        let parent = T::Parent::static_type();
        assert!(
            parent.is_ancestor_of(tag),
            "{} wraps '{}', which does not derive from '{}'",
            type_name::<T>(),
            tag,
            parent
        );

        let mut classes = self.inner.classes.borrow_mut();
        match classes.get(&tag) {
            Some(entry) if entry.type_id == TypeId::of::<T>() => {}
            Some(entry) => {
                tracing::warn!(
                    native = %tag,
                    existing = entry.name,
                    ignored = type_name::<T>(),
                    "native type already has a wrapper class"
                );
            }
            None => {
                classes.insert(
                    tag,
                    ClassEntry {
                        type_id: TypeId::of::<T>(),
                        name: type_name::<T>(),
                        build: build::<T>,
                    },
                );
                tracing::debug!(native = %tag, class = type_name::<T>(), "registered wrapper class");
            }
        }
    }

    /// Whether `T` is the wrapper class registered for its native type.
    pub fn is_registered<T: ObjectType>(&self) -> bool {
        self.inner
            .classes
            .borrow()
            .get(&T::static_type())
            .is_some_and(|entry| entry.type_id == TypeId::of::<T>())
    }

    /// Builder of the most-derived registered class for `tag`.
    fn class_for(&self, tag: TypeTag) -> Option<fn(NonNull<NObject>) -> Box<dyn AnyObject>> {
        let classes = self.inner.classes.borrow();
        let mut current = Some(tag);
        while let Some(tag) = current {
            if let Some(entry) = classes.get(&tag) {
                return Some(entry.build);
            }
            current = tag.parent();
        }
        None
    }

    unsafe fn existing(&self, raw: NonNull<NObject>) -> Option<NonNull<WrapperCell>> {
        let data = ffi::nobject_get_qdata(raw.as_ptr(), self.inner.key.to_native());
        NonNull::new(data as *mut WrapperCell)
    }

    /// Resolve a handle to its wrapper as `T`, creating the wrapper if the
    /// object has none. Fails with the object's native type if it cannot
    /// be viewed as `T`.
    ///
    /// # Safety
    ///
    /// `raw` must be a live object.
    pub(crate) unsafe fn try_wrap<T: ObjectType>(
        &self,
        raw: NonNull<NObject>,
    ) -> std::result::Result<Pointer<T>, TypeTag> {
        let tag = match TypeTag::from_native(ffi::nobject_type(raw.as_ptr())) {
            Some(tag) => tag,
            None => unreachable!("live objects always have a type"),
        };
        let cell = match self.existing(raw) {
            Some(cell) => {
                cell.as_ref().retain();
                cell
            }
            None => {
                self.register::<T>();
                if !T::static_type().is_ancestor_of(tag) {
                    return Err(tag);
                }
                let Some(build) = self.class_for(tag) else {
                    return Err(tag);
                };
                WrapperCell::install(&self.inner, raw, build(raw), RefState::Floating)
            }
        };
        match Pointer::from_cell(cell) {
            Some(pointer) => Ok(pointer),
            None => {
                drop(Pointer::<crate::Object>::from_cell(cell));
                Err(tag)
            }
        }
    }

    /// The wrapper of `raw`, viewed as `T`.
    ///
    /// Returns the existing wrapper if the object has one. Otherwise a new
    /// wrapper of the most-derived registered class is created, sinking the
    /// handle. Returns `None` only for a null handle.
    ///
    /// # Safety
    ///
    /// `raw` must be null or a live object.
    ///
    /// # Panics
    ///
    /// Panics if the object is not an instance of `T`.
    pub unsafe fn wrap<T: ObjectType>(&self, raw: *mut NObject) -> Option<Pointer<T>> {
        let raw = NonNull::new(raw)?;
        match self.try_wrap::<T>(raw) {
            Ok(pointer) => Some(pointer),
            Err(tag) => panic!(
                "cannot wrap object of type '{}' as {}",
                tag,
                type_name::<T>()
            ),
        }
    }

    /// Create the wrapper of a handle that was just created.
    ///
    /// With [`RefState::Floating`] the handle is sunk; with
    /// [`RefState::Owned`] the caller's reference is adopted.
    ///
    /// # Safety
    ///
    /// `raw` must be a live object, and with `RefState::Owned` the caller
    /// must own a reference it gives up.
    ///
    /// # Panics
    ///
    /// Panics if `raw` is null, already has a wrapper in this context, or is
    /// not an instance of `T`.
    pub unsafe fn wrap_new<T: ObjectType>(&self, raw: *mut NObject, state: RefState) -> Pointer<T> {
        let Some(raw) = NonNull::new(raw) else {
            panic!("wrap_new: null object handle");
        };
        assert!(
            self.existing(raw).is_none(),
            "wrap_new: object {:p} already has a wrapper",
            raw
        );
        self.register::<T>();
        let tag = match TypeTag::from_native(ffi::nobject_type(raw.as_ptr())) {
            Some(tag) => tag,
            None => unreachable!("live objects always have a type"),
        };
        assert!(
            T::static_type().is_ancestor_of(tag),
            "cannot wrap object of type '{}' as {}",
            tag,
            type_name::<T>()
        );
        let build = match self.class_for(tag) {
            Some(build) => build,
            None => unreachable!("{} is registered", type_name::<T>()),
        };
        let cell = WrapperCell::install(&self.inner, raw, build(raw), state);
        match Pointer::from_cell(cell) {
            Some(pointer) => pointer,
            None => panic!(
                "wrapper class registered for '{}' does not derive from {}",
                tag,
                type_name::<T>()
            ),
        }
    }

    /// Create a new native instance of `T` and wrap it.
    pub fn create<T: ObjectType>(&self) -> Result<Pointer<T>> {
        let tag = T::static_type();
        let raw = ffi::nobject_new(tag.to_native());
        if raw.is_null() {
            return Err(BridgeError::NotInstantiable(tag.name().into_owned()).into());
        }
        Ok(unsafe { self.wrap_new(raw, RefState::Floating) })
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("key", &self.inner.key)
            .field("classes", &self.inner.classes.borrow().len())
            .field("live", &self.inner.live.get())
            .finish()
    }
}
