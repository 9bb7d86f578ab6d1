//! Signal connection and emission.
//!
//! Every connection carries a callback, opaque user data and a destroy
//! notifier. The notifier fires exactly once: on disconnect, or when the
//! object is finalized with the connection still in place. A handler that
//! is disconnected while running keeps its user data until it returns.

use std::cell::{Cell, RefCell};
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::rc::Rc;

use super::error::{nobject_error_quark, npropagate_error, set_error};
use super::object::{live, nobject_ref, nobject_unref, NObject};
use super::types::{has_signal, type_name};
use crate::ffi::{
    NDestroyNotify, NError, NHandlerId, NSignalCallback, NValue, NOBJECT_ERROR_INVALID_ARGUMENT,
    NOBJECT_ERROR_UNKNOWN_SIGNAL,
};

struct Handler {
    id: NHandlerId,
    signal: CString,
    callback: unsafe extern "C" fn(
        *mut NObject,
        *const NValue,
        usize,
        *mut c_void,
        *mut *mut NError,
    ) -> NValue,
    data: *mut c_void,
    destroy: NDestroyNotify,
    connected: Cell<bool>,
    running: Cell<u32>,
    notified: Cell<bool>,
}

impl Handler {
    fn release(&self) {
        self.connected.set(false);
        if self.running.get() == 0 {
            self.notify();
        }
    }

    fn notify(&self) {
        if self.notified.replace(true) {
            return;
        }
        if let Some(destroy) = self.destroy {
            unsafe { destroy(self.data) };
        }
    }
}

/// Per-object handler list.
#[derive(Default)]
pub(crate) struct SignalTable {
    handlers: RefCell<Vec<Rc<Handler>>>,
    next_id: Cell<u64>,
}

impl SignalTable {
    fn take(&self, id: NHandlerId) -> Option<Rc<Handler>> {
        let mut handlers = self.handlers.borrow_mut();
        let index = handlers.iter().position(|h| h.id == id)?;
        Some(handlers.remove(index))
    }

    fn matching(&self, signal: &CStr) -> Vec<Rc<Handler>> {
        self.handlers
            .borrow()
            .iter()
            .filter(|h| h.signal.as_c_str() == signal)
            .cloned()
            .collect()
    }

    /// Destroy every handler, as done during finalization.
    pub(crate) fn destroy_all(&self) {
        loop {
            let handler = self.handlers.borrow_mut().pop();
            match handler {
                Some(handler) => handler.release(),
                None => break,
            }
        }
    }

    fn len(&self) -> usize {
        self.handlers.borrow().len()
    }
}

fn type_label(tag: crate::ffi::NType) -> String {
    type_name(tag)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<unknown>".to_string())
}

/// Connect a handler to `signal` on `obj`.
///
/// Returns the invalid id and fills `error` if the object's type has no
/// such signal or no callback was given. In that case the destroy notifier
/// is never called and `data` stays owned by the caller.
///
/// # Safety
///
/// `obj` must be a live object, `signal` a valid NUL-terminated string,
/// and `error` null or a pointer to an empty error slot.
pub unsafe extern "C" fn nsignal_connect(
    obj: *mut NObject,
    signal: *const c_char,
    callback: NSignalCallback,
    data: *mut c_void,
    destroy: NDestroyNotify,
    error: *mut *mut NError,
) -> NHandlerId {
    let o = live(obj);
    assert!(!signal.is_null(), "nsignal_connect: null signal name");
    let signal = CStr::from_ptr(signal);
    let tag = super::object::nobject_type(obj);

    let Some(callback) = callback else {
        set_error(
            error,
            nobject_error_quark(),
            NOBJECT_ERROR_INVALID_ARGUMENT,
            "no callback given",
        );
        return NHandlerId::invalid();
    };
    if !has_signal(tag, signal) {
        set_error(
            error,
            nobject_error_quark(),
            NOBJECT_ERROR_UNKNOWN_SIGNAL,
            &format!(
                "type '{}' has no signal '{}'",
                type_label(tag),
                signal.to_string_lossy()
            ),
        );
        return NHandlerId::invalid();
    }

    let id = NHandlerId(o.signals.next_id.get() + 1);
    o.signals.next_id.set(id.0);
    o.signals.handlers.borrow_mut().push(Rc::new(Handler {
        id,
        signal: signal.to_owned(),
        callback,
        data,
        destroy,
        connected: Cell::new(true),
        running: Cell::new(0),
        notified: Cell::new(false),
    }));
    id
}

/// Disconnect a handler, firing its destroy notifier. Returns false if no
/// handler with that id is connected.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nsignal_disconnect(obj: *mut NObject, id: NHandlerId) -> bool {
    match live(obj).signals.take(id) {
        Some(handler) => {
            handler.release();
            true
        }
        None => false,
    }
}

/// Number of connected handlers.
///
/// # Safety
///
/// `obj` must be a live object.
pub unsafe extern "C" fn nsignal_handler_count(obj: *mut NObject) -> usize {
    live(obj).signals.len()
}

/// Emit `signal` on `obj`.
///
/// Handlers run in connection order. The return value of the last handler
/// is written to `ret`. The first handler that fills its error slot stops
/// the emission; its error is moved into `error` and false is returned.
///
/// # Safety
///
/// `obj` must be a live object, `signal` a valid NUL-terminated string,
/// `args` must point to `n_args` values (or be null with `n_args == 0`),
/// `ret` null or writable, `error` null or a pointer to an empty slot.
pub unsafe extern "C" fn nsignal_emit(
    obj: *mut NObject,
    signal: *const c_char,
    args: *const NValue,
    n_args: usize,
    ret: *mut NValue,
    error: *mut *mut NError,
) -> bool {
    let o = live(obj);
    assert!(!signal.is_null(), "nsignal_emit: null signal name");
    let signal = CStr::from_ptr(signal);
    let tag = super::object::nobject_type(obj);
    if !has_signal(tag, signal) {
        set_error(
            error,
            nobject_error_quark(),
            NOBJECT_ERROR_UNKNOWN_SIGNAL,
            &format!(
                "type '{}' has no signal '{}'",
                type_label(tag),
                signal.to_string_lossy()
            ),
        );
        return false;
    }

    nobject_ref(obj);
    let mut result = NValue::none();
    let mut ok = true;
    for handler in o.signals.matching(signal) {
        if !handler.connected.get() {
            continue;
        }
        let mut local: *mut NError = std::ptr::null_mut();
        handler.running.set(handler.running.get() + 1);
        let value = (handler.callback)(obj, args, n_args, handler.data, &mut local);
        handler.running.set(handler.running.get() - 1);
        if !handler.connected.get() && handler.running.get() == 0 {
            handler.notify();
        }
        if !local.is_null() {
            npropagate_error(error, local);
            ok = false;
            break;
        }
        result = value;
    }
    if !ret.is_null() {
        *ret = result;
    }
    nobject_unref(obj);
    ok
}
