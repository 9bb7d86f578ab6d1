//! Wrappers for native objects.
//!
//! Every native object seen by a [`Context`] is represented by at most one
//! wrapper at a time. The wrapper owns exactly one native reference and is
//! shared through [`Pointer`], which counts wrapper references the way the
//! native side counts object references. When the last `Pointer` goes away
//! the wrapper removes its back-pointer from the object and then releases
//! its native reference.

use std::any::{Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::os::raw::c_void;
use std::ptr::NonNull;
use std::rc::Rc;

use crate::context::{Context, ContextInner, WRAPPER_KEY_PREFIX};
use crate::ffi::{self, NObject};
use crate::quark::Quark;
use crate::types::TypeTag;

/// How a wrapper acquires its native reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefState {
    /// The handle may still be floating: sink it. On a handle someone else
    /// already owns, sinking adds a reference of our own.
    Floating,
    /// The caller transfers a reference it owns; nothing is added.
    Owned,
}

/// A wrapper class for a native object type.
///
/// Wrapper classes mirror the native single-inheritance tree: each class
/// names its parent class and embeds it. [`Object`] is the root.
///
/// ```
/// use objbridge::{Object, ObjectType, TypeTag};
///
/// pub struct Widget {
///     parent: Object,
/// }
///
/// impl ObjectType for Widget {
///     type Parent = Object;
///
///     fn static_type() -> TypeTag {
///         TypeTag::register_object(TypeTag::object(), "DocWidget").unwrap()
///     }
///
///     fn from_parent(parent: Object) -> Self {
///         Widget { parent }
///     }
///
///     fn parent(&self) -> &Object {
///         &self.parent
///     }
/// }
/// ```
pub trait ObjectType: Any + Sized {
    /// Wrapper class this one derives from.
    type Parent: ObjectType;

    /// Native type this class wraps.
    fn static_type() -> TypeTag;

    /// Build the wrapper around an already built parent part.
    fn from_parent(parent: Self::Parent) -> Self;

    /// The embedded parent part.
    fn parent(&self) -> &Self::Parent;

    #[doc(hidden)]
    fn construct(raw: NonNull<NObject>) -> Self {
        Self::from_parent(Self::Parent::construct(raw))
    }

    #[doc(hidden)]
    fn find_part(&self, target: TypeId) -> Option<&dyn Any> {
        if TypeId::of::<Self>() == target {
            Some(self as &dyn Any)
        } else {
            ObjectType::find_part(self.parent(), target)
        }
    }
}

/// Type-erased wrapper value.
pub(crate) trait AnyObject {
    fn find_part(&self, target: TypeId) -> Option<&dyn Any>;
    fn root(&self) -> &Object;
    fn class_name(&self) -> &'static str;
}

impl<T: ObjectType> AnyObject for T {
    fn find_part(&self, target: TypeId) -> Option<&dyn Any> {
        ObjectType::find_part(self, target)
    }

    fn root(&self) -> &Object {
        match ObjectType::find_part(self, TypeId::of::<Object>()).and_then(|a| a.downcast_ref()) {
            Some(object) => object,
            None => unreachable!("every wrapper class derives from Object"),
        }
    }

    fn class_name(&self) -> &'static str {
        std::any::type_name::<T>()
    }
}

/// Heap cell shared by all `Pointer`s to one wrapper.
pub(crate) struct WrapperCell {
    raw: NonNull<NObject>,
    refs: std::cell::Cell<usize>,
    key: Quark,
    context: Rc<ContextInner>,
    value: Box<dyn AnyObject>,
}

impl WrapperCell {
    /// Claim a native reference and store the back-pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be a live object without a back-pointer under the
    /// context's key.
    pub(crate) unsafe fn install(
        context: &Rc<ContextInner>,
        raw: NonNull<NObject>,
        value: Box<dyn AnyObject>,
        state: RefState,
    ) -> NonNull<WrapperCell> {
        match state {
            RefState::Floating => {
                ffi::nobject_ref_sink(raw.as_ptr());
            }
            RefState::Owned => {
                // an adopted floating reference still has to lose its flag
                if ffi::nobject_is_floating(raw.as_ptr()) {
                    ffi::nobject_ref_sink(raw.as_ptr());
                }
            }
        }
        let class = value.class_name();
        let cell = NonNull::from(Box::leak(Box::new(WrapperCell {
            raw,
            refs: std::cell::Cell::new(1),
            key: context.key,
            context: Rc::clone(context),
            value,
        })));
        ffi::nobject_set_qdata_full(
            raw.as_ptr(),
            context.key.to_native(),
            cell.as_ptr() as *mut c_void,
            None,
        );
        context.live.set(context.live.get() + 1);
        tracing::debug!(handle = ?raw, class, ?state, "created wrapper");
        cell
    }

    /// Destroy a cell whose reference count reached zero.
    unsafe fn destroy(cell: NonNull<WrapperCell>) {
        let cell = Box::from_raw(cell.as_ptr());
        let WrapperCell {
            raw,
            key,
            context,
            value,
            ..
        } = *cell;
        // the back-pointer must be gone before anything the release triggers
        // can observe it
        let stolen = ffi::nobject_steal_qdata(raw.as_ptr(), key.to_native());
        debug_assert!(!stolen.is_null(), "wrapper back-pointer missing");
        let class = value.class_name();
        drop(value);
        context.live.set(context.live.get() - 1);
        ffi::nobject_unref(raw.as_ptr());
        tracing::debug!(handle = ?raw, class, "destroyed wrapper");
    }

    pub(crate) fn retain(&self) {
        self.refs.set(self.refs.get() + 1);
    }
}

/// Counted reference to a wrapper.
///
/// Cloning a `Pointer` never creates another wrapper; all clones and all
/// later [`Context::wrap`] calls for the same object share one.
pub struct Pointer<T: ObjectType> {
    cell: NonNull<WrapperCell>,
    part: NonNull<T>,
    _marker: PhantomData<Rc<T>>,
}

impl<T: ObjectType> Pointer<T> {
    /// Build a pointer to the `T` part of a cell, taking over one of the
    /// cell's references.
    ///
    /// # Safety
    ///
    /// `cell` must be a live cell and the caller must own one of its
    /// references.
    pub(crate) unsafe fn from_cell(cell: NonNull<WrapperCell>) -> Option<Self> {
        let value = &*cell.as_ref().value;
        let part = value
            .find_part(TypeId::of::<T>())
            .and_then(|any| any.downcast_ref::<T>())?;
        Some(Self {
            cell,
            part: NonNull::from(part),
            _marker: PhantomData,
        })
    }

    fn cell(&self) -> &WrapperCell {
        unsafe { self.cell.as_ref() }
    }

    /// The wrapped native handle.
    pub fn as_ptr(&self) -> *mut NObject {
        self.cell().raw.as_ptr()
    }

    /// The root part of the wrapper.
    pub fn object(&self) -> &Object {
        self.cell().value.root()
    }

    /// Another view of the same wrapper as `U`, if its class is or derives
    /// from `U`.
    pub fn cast<U: ObjectType>(&self) -> Option<Pointer<U>> {
        let cell = self.cell();
        cell.retain();
        let cast = unsafe { Pointer::from_cell(self.cell) };
        if cast.is_none() {
            cell.refs.set(cell.refs.get() - 1);
        }
        cast
    }

    /// View the wrapper as its root class.
    pub fn upcast(&self) -> Pointer<Object> {
        self.cell().retain();
        Pointer {
            cell: self.cell,
            part: NonNull::from(self.object()),
            _marker: PhantomData,
        }
    }

    /// Whether two pointers refer to the same wrapper.
    pub fn ptr_eq<U: ObjectType>(this: &Self, other: &Pointer<U>) -> bool {
        this.cell == other.cell
    }

    /// Number of live `Pointer`s to this wrapper.
    pub fn wrapper_refs(&self) -> usize {
        self.cell().refs.get()
    }

    /// Rust type name of the wrapper class chosen for the object.
    pub fn class_name(&self) -> &'static str {
        self.cell().value.class_name()
    }

    /// The context the wrapper belongs to.
    pub fn context(&self) -> Context {
        Context::from_inner(Rc::clone(&self.cell().context))
    }
}

impl<T: ObjectType> Clone for Pointer<T> {
    fn clone(&self) -> Self {
        self.cell().retain();
        Self {
            cell: self.cell,
            part: self.part,
            _marker: PhantomData,
        }
    }
}

impl<T: ObjectType> Drop for Pointer<T> {
    fn drop(&mut self) {
        let cell = self.cell();
        let refs = cell.refs.get();
        assert!(refs > 0, "wrapper released more often than retained");
        cell.refs.set(refs - 1);
        if refs == 1 {
            unsafe { WrapperCell::destroy(self.cell) };
        }
    }
}

impl<T: ObjectType> Deref for Pointer<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.part.as_ref() }
    }
}

impl<T: ObjectType, U: ObjectType> PartialEq<Pointer<U>> for Pointer<T> {
    fn eq(&self, other: &Pointer<U>) -> bool {
        Pointer::ptr_eq(self, other)
    }
}

impl<T: ObjectType> Eq for Pointer<T> {}

impl<T: ObjectType> fmt::Debug for Pointer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pointer")
            .field("class", &self.class_name())
            .field("handle", &self.as_ptr())
            .field("refs", &self.wrapper_refs())
            .finish()
    }
}

unsafe extern "C" fn drop_data(data: *mut c_void) {
    drop(Box::from_raw(data as *mut Box<dyn Any>));
}

fn check_data_key(key: Quark) {
    assert!(
        !key.name().starts_with(WRAPPER_KEY_PREFIX),
        "quark {} is reserved for wrapper back-pointers",
        key
    );
}

/// Root wrapper class, standing for the native `NObject` type.
pub struct Object {
    raw: NonNull<NObject>,
}

impl ObjectType for Object {
    type Parent = Object;

    fn static_type() -> TypeTag {
        TypeTag::object()
    }

    fn from_parent(parent: Object) -> Self {
        parent
    }

    fn parent(&self) -> &Object {
        self
    }

    fn construct(raw: NonNull<NObject>) -> Self {
        Object { raw }
    }

    fn find_part(&self, target: TypeId) -> Option<&dyn Any> {
        (target == TypeId::of::<Object>()).then_some(self as &dyn Any)
    }
}

impl Object {
    /// The native handle.
    pub fn as_ptr(&self) -> *mut NObject {
        self.raw.as_ptr()
    }

    /// Runtime type of the native object.
    pub fn type_tag(&self) -> TypeTag {
        let tag = unsafe { ffi::nobject_type(self.as_ptr()) };
        match TypeTag::from_native(tag) {
            Some(tag) => tag,
            None => unreachable!("live objects always have a type"),
        }
    }

    /// Native reference count.
    pub fn ref_count(&self) -> u32 {
        unsafe { ffi::nobject_ref_count(self.as_ptr()) }
    }

    /// Whether the native object is still floating.
    pub fn is_floating(&self) -> bool {
        unsafe { ffi::nobject_is_floating(self.as_ptr()) }
    }

    /// Attach a value under `key`, dropping any value stored there before.
    /// The value is dropped when replaced or when the object is finalized.
    ///
    /// # Panics
    ///
    /// Panics if `key` is a wrapper back-pointer key.
    pub fn set_data<D: Any>(&self, key: Quark, value: D) {
        check_data_key(key);
        let boxed: Box<Box<dyn Any>> = Box::new(Box::new(value));
        unsafe {
            ffi::nobject_set_qdata_full(
                self.as_ptr(),
                key.to_native(),
                Box::into_raw(boxed) as *mut c_void,
                Some(drop_data),
            );
        }
    }

    /// A copy of the value stored under `key`, if it has type `D`.
    pub fn data<D: Any + Clone>(&self, key: Quark) -> Option<D> {
        check_data_key(key);
        self.with_data(key, |value: &D| value.clone())
    }

    /// Run `f` on the value stored under `key`, if it has type `D`.
    ///
    /// The entry is detached from the object while `f` runs: inside `f`
    /// the key reads as empty, and a value stored under it by `f` replaces
    /// the borrowed one once `f` returns.
    pub fn with_data<D: Any, R>(&self, key: Quark, f: impl FnOnce(&D) -> R) -> Option<R> {
        check_data_key(key);
        let entry = self.detach_data(key)?;
        let result = entry.value().downcast_ref::<D>().map(f);
        result
    }

    /// Remove and return the value stored under `key`, if it has type `D`.
    /// A value of another type is left in place.
    pub fn steal_data<D: Any>(&self, key: Quark) -> Option<D> {
        check_data_key(key);
        let mut entry = self.detach_data(key)?;
        if !entry.value().is::<D>() {
            return None;
        }
        let value = entry.value.take()?;
        value.downcast::<D>().ok().map(|value| *value)
    }

    fn detach_data(&self, key: Quark) -> Option<DetachedData<'_>> {
        let ptr = unsafe { ffi::nobject_steal_qdata(self.as_ptr(), key.to_native()) };
        if ptr.is_null() {
            return None;
        }
        Some(DetachedData {
            object: self,
            key,
            value: Some(unsafe { *Box::from_raw(ptr as *mut Box<dyn Any>) }),
        })
    }
}

/// A named-data entry taken out of its slot. Dropping it puts the value
/// back unless the slot was filled in the meantime.
struct DetachedData<'a> {
    object: &'a Object,
    key: Quark,
    value: Option<Box<dyn Any>>,
}

impl DetachedData<'_> {
    fn value(&self) -> &dyn Any {
        match &self.value {
            Some(value) => &**value,
            None => unreachable!("entry value taken before drop"),
        }
    }
}

impl Drop for DetachedData<'_> {
    fn drop(&mut self) {
        let Some(value) = self.value.take() else {
            return;
        };
        let raw = self.object.as_ptr();
        let key = self.key.to_native();
        unsafe {
            if !ffi::nobject_get_qdata(raw, key).is_null() {
                // replaced while detached; the newer value stays
                return;
            }
            let boxed: Box<Box<dyn Any>> = Box::new(value);
            ffi::nobject_set_qdata_full(raw, key, Box::into_raw(boxed) as *mut c_void, Some(drop_data));
        }
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("type", &self.type_tag())
            .field("handle", &self.raw)
            .finish()
    }
}
