//! Value wrappers for boxed native records.
//!
//! A boxed record is copied and freed through functions registered with its
//! type; it has no reference count. [`Boxed`] is either a view onto a
//! record someone else owns, or an owned deep copy.

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::os::raw::c_void;
use std::ptr::NonNull;

use crate::ffi::{self, NRect};
use crate::types::TypeTag;

/// A native record type with registered copy and free functions.
///
/// # Safety
///
/// `static_type` must return a boxed type whose copy and free functions
/// operate on records with the layout of `Self`.
pub unsafe trait BoxedRecord: 'static {
    /// The record's boxed type.
    fn static_type() -> TypeTag;
}

/// Boxed record with value semantics.
///
/// Cloning always produces an owned deep copy, whether the source owns its
/// record or only views it.
pub struct Boxed<R: BoxedRecord> {
    ptr: NonNull<R>,
    owned: bool,
}

impl<R: BoxedRecord> Boxed<R> {
    /// View a record without taking ownership. Nothing is copied or freed.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a valid record that outlives the view.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is null.
    pub unsafe fn borrowed(ptr: *mut R) -> Self {
        Self {
            ptr: NonNull::new(ptr).expect("Boxed::borrowed: null record"),
            owned: false,
        }
    }

    /// Make an owned copy of a record with the type's copy function.
    ///
    /// # Safety
    ///
    /// `ptr` must point to a valid record.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is null.
    pub unsafe fn copied(ptr: *const R) -> Self {
        assert!(!ptr.is_null(), "Boxed::copied: null record");
        Self {
            ptr: copy_record(ptr),
            owned: true,
        }
    }

    /// Take ownership of a record allocated by the native side.
    ///
    /// # Safety
    ///
    /// `ptr` must be an owned record that the type's free function can
    /// release.
    ///
    /// # Panics
    ///
    /// Panics if `ptr` is null.
    pub unsafe fn from_raw_full(ptr: *mut R) -> Self {
        Self {
            ptr: NonNull::new(ptr).expect("Boxed::from_raw_full: null record"),
            owned: true,
        }
    }

    /// Whether this value owns its record.
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// The record pointer.
    pub fn as_ptr(&self) -> *const R {
        self.ptr.as_ptr()
    }

    /// The record pointer, for native calls that modify it.
    pub fn as_mut_ptr(&mut self) -> *mut R {
        self.ptr.as_ptr()
    }

    /// Release an owned record to the caller. A view is copied first so
    /// the caller always receives a record it owns.
    pub fn into_raw(self) -> *mut R {
        let this = if self.owned { self } else { self.clone() };
        let ptr = this.ptr.as_ptr();
        std::mem::forget(this);
        ptr
    }
}

unsafe fn copy_record<R: BoxedRecord>(ptr: *const R) -> NonNull<R> {
    let copy = ffi::nboxed_copy(R::static_type().to_native(), ptr as *const c_void);
    match NonNull::new(copy as *mut R) {
        Some(copy) => copy,
        None => panic!("copy function of {} returned null", R::static_type()),
    }
}

impl<R: BoxedRecord> Clone for Boxed<R> {
    fn clone(&self) -> Self {
        Self {
            ptr: unsafe { copy_record(self.ptr.as_ptr()) },
            owned: true,
        }
    }

    /// Assignment: a no-op when both refer to the same record, otherwise
    /// frees the owned record and copies the source.
    fn clone_from(&mut self, source: &Self) {
        if self.ptr == source.ptr {
            return;
        }
        if self.owned {
            unsafe { free_record(self.ptr) };
        }
        self.ptr = unsafe { copy_record(source.ptr.as_ptr()) };
        self.owned = true;
    }
}

unsafe fn free_record<R: BoxedRecord>(ptr: NonNull<R>) {
    ffi::nboxed_free(R::static_type().to_native(), ptr.as_ptr() as *mut c_void);
}

impl<R: BoxedRecord> Drop for Boxed<R> {
    fn drop(&mut self) {
        if self.owned {
            unsafe { free_record(self.ptr) };
        }
    }
}

impl<R: BoxedRecord> Deref for Boxed<R> {
    type Target = R;

    fn deref(&self) -> &R {
        unsafe { self.ptr.as_ref() }
    }
}

impl<R: BoxedRecord> DerefMut for Boxed<R> {
    fn deref_mut(&mut self) -> &mut R {
        unsafe { self.ptr.as_mut() }
    }
}

impl<R: BoxedRecord + fmt::Debug> fmt::Debug for Boxed<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Boxed")
            .field("record", &**self)
            .field("owned", &self.owned)
            .finish()
    }
}

impl<R: BoxedRecord + PartialEq> PartialEq for Boxed<R> {
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

unsafe impl BoxedRecord for NRect {
    fn static_type() -> TypeTag {
        match TypeTag::from_native(ffi::nrect_get_type()) {
            Some(tag) => tag,
            None => unreachable!("NRect is registered on first use"),
        }
    }
}

/// Rectangle with value semantics.
pub type Rectangle = Boxed<NRect>;

impl Boxed<NRect> {
    /// Allocate an owned rectangle.
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        unsafe { Self::from_raw_full(ffi::nrect_new(x, y, width, height)) }
    }

    /// Whether the point lies inside the rectangle.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        let (x, y) = (i64::from(x), i64::from(y));
        x >= i64::from(self.x) && y >= i64::from(self.y) && x < self.right() && y < self.bottom()
    }

    /// Overlapping area of two rectangles, if any.
    pub fn intersection(&self, other: &Self) -> Option<Rectangle> {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        // both extents are bounded by one of the source widths/heights
        let width = i32::try_from(right - i64::from(x)).ok()?;
        let height = i32::try_from(bottom - i64::from(y)).ok()?;
        (width > 0 && height > 0).then(|| Rectangle::new(x, y, width, height))
    }

    fn right(&self) -> i64 {
        i64::from(self.x) + i64::from(self.width)
    }

    fn bottom(&self) -> i64 {
        i64::from(self.y) + i64::from(self.height)
    }
}
