//! Floating reference-counted objects with named data slots.
//!
//! Objects are born floating with one reference. `nobject_ref_sink` claims
//! a floating reference without adding one; on an owned object it adds a
//! reference. When the last reference goes, the object first destroys its
//! signal handlers, then clears its named data (firing destroy notifiers
//! for both), then frees itself.

use std::cell::{Cell, RefCell};
use std::os::raw::c_void;
use std::ptr;

use super::signal::SignalTable;
use super::types::ntype_is_object;
use crate::ffi::{NDestroyNotify, NQuark, NType};

struct QData {
    key: NQuark,
    data: *mut c_void,
    destroy: NDestroyNotify,
}

impl QData {
    unsafe fn notify(self) {
        if let Some(destroy) = self.destroy {
            destroy(self.data);
        }
    }
}

/// Opaque native object.
pub struct NObject {
    type_tag: NType,
    ref_count: Cell<u32>,
    floating: Cell<bool>,
    qdata: RefCell<Vec<QData>>,
    pub(crate) signals: SignalTable,
}

/// Borrow a live object behind a handle.
///
/// # Safety
///
/// `obj` must be null or point to an object that has not been freed.
pub(crate) unsafe fn live<'a>(obj: *mut NObject) -> &'a NObject {
    assert!(!obj.is_null(), "null object handle");
    let obj = &*obj;
    assert!(obj.ref_count.get() > 0, "object used after finalization");
    obj
}

impl NObject {
    fn dispose(&self) {
        self.signals.destroy_all();
        loop {
            // notifiers may touch the table, so release the borrow first
            let entry = self.qdata.borrow_mut().pop();
            match entry {
                Some(entry) => unsafe { entry.notify() },
                None => break,
            }
        }
    }
}

/// Create a new floating instance of an object type.
///
/// Returns null if `tag` is not an object type.
pub extern "C" fn nobject_new(tag: NType) -> *mut NObject {
    if !ntype_is_object(tag) {
        return ptr::null_mut();
    }
    Box::into_raw(Box::new(NObject {
        type_tag: tag,
        ref_count: Cell::new(1),
        floating: Cell::new(true),
        qdata: RefCell::new(Vec::new()),
        signals: SignalTable::default(),
    }))
}

/// Add a reference.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nobject_ref(obj: *mut NObject) -> *mut NObject {
    let o = live(obj);
    o.ref_count.set(o.ref_count.get() + 1);
    obj
}

/// Drop a reference, finalizing the object when it was the last one.
///
/// # Safety
///
/// `obj` must be a live object the caller holds a reference to.
pub unsafe extern "C" fn nobject_unref(obj: *mut NObject) {
    let o = live(obj);
    if o.ref_count.get() == 1 {
        o.dispose();
        // a destroy notifier may have resurrected the object
        if o.ref_count.get() == 1 {
            o.ref_count.set(0);
            drop(Box::from_raw(obj));
            return;
        }
    }
    o.ref_count.set(o.ref_count.get() - 1);
}

/// Claim a floating reference, or add a reference if the object is
/// already owned.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nobject_ref_sink(obj: *mut NObject) -> *mut NObject {
    let o = live(obj);
    if !o.floating.replace(false) {
        o.ref_count.set(o.ref_count.get() + 1);
    }
    obj
}

/// Whether no owner has claimed the initial reference yet.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nobject_is_floating(obj: *mut NObject) -> bool {
    live(obj).floating.get()
}

/// Current reference count.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nobject_ref_count(obj: *mut NObject) -> u32 {
    live(obj).ref_count.get()
}

/// Runtime type of an object.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nobject_type(obj: *mut NObject) -> NType {
    live(obj).type_tag
}

/// Attach data under `key`, replacing (and destroy-notifying) any previous
/// entry. Null data removes the entry.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nobject_set_qdata_full(
    obj: *mut NObject,
    key: NQuark,
    data: *mut c_void,
    destroy: NDestroyNotify,
) {
    let o = live(obj);
    assert!(key.is_valid(), "nobject_set_qdata_full: invalid key");
    let previous = {
        let mut qdata = o.qdata.borrow_mut();
        let previous = qdata
            .iter()
            .position(|entry| entry.key == key)
            .map(|index| qdata.swap_remove(index));
        if !data.is_null() {
            qdata.push(QData { key, data, destroy });
        }
        previous
    };
    if let Some(previous) = previous {
        previous.notify();
    }
}

/// Data attached under `key`, or null.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nobject_get_qdata(obj: *mut NObject, key: NQuark) -> *mut c_void {
    live(obj)
        .qdata
        .borrow()
        .iter()
        .find(|entry| entry.key == key)
        .map_or(ptr::null_mut(), |entry| entry.data)
}

/// Detach the data under `key` without calling its destroy notifier.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nobject_steal_qdata(obj: *mut NObject, key: NQuark) -> *mut c_void {
    let mut qdata = live(obj).qdata.borrow_mut();
    match qdata.iter().position(|entry| entry.key == key) {
        Some(index) => qdata.swap_remove(index).data,
        None => ptr::null_mut(),
    }
}
