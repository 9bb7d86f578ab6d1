//! Signal connection and marshaling tests.

mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use common::{init_tracing, Button, Widget};
use objbridge::ffi;
use objbridge::{
    Context, ContextOptions, DecodeError, Error, Pointer, Quark, SignalHandlerId, Value,
};

/// Counts how often it is dropped.
struct DropCounter(Rc<Cell<u32>>);

impl Drop for DropCounter {
    fn drop(&mut self) {
        self.0.set(self.0.get() + 1);
    }
}

fn counter() -> (Rc<Cell<u32>>, DropCounter) {
    let drops = Rc::new(Cell::new(0));
    let guard = DropCounter(Rc::clone(&drops));
    (drops, guard)
}

fn native_error_domain() -> Quark {
    Quark::from_raw(ffi::nobject_error_quark().0).expect("error quark should be valid")
}

#[test]
fn test_emit_calls_handler_with_arguments() {
    init_tracing();
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");

    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    widget
        .connect("size-allocate", move |_w, (width, height): (i32, i32)| {
            sink.borrow_mut().push((width, height));
        })
        .expect("connect should succeed");

    let ret = widget
        .emit("size-allocate", &[Value::Int(640), Value::Int(480)])
        .expect("emit should succeed");

    assert_eq!(ret, Value::None);
    assert_eq!(*seen.borrow(), vec![(640, 480)]);
}

#[test]
fn test_last_handler_return_wins() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    widget
        .connect("query", |_w, (): ()| 1i64)
        .expect("connect should succeed");
    widget
        .connect("query", |_w, (): ()| true)
        .expect("connect should succeed");

    let ret = widget.emit("query", &[]).expect("emit should succeed");
    assert_eq!(ret, Value::Bool(true));
    assert_eq!(widget.handler_count(), 2);
}

#[test]
fn test_disconnect_frees_closure_once() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let (drops, guard) = counter();

    let id = widget
        .connect("destroy", move |_w, (): ()| {
            let _keep = &guard;
        })
        .expect("connect should succeed");
    assert_eq!(drops.get(), 0);

    assert!(widget.disconnect(id));
    assert_eq!(drops.get(), 1, "disconnect should free the closure");

    drop(widget);
    assert_eq!(drops.get(), 1, "finalization should not free it again");
}

#[test]
fn test_finalization_frees_connected_closure_once() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let (drops, guard) = counter();

    widget
        .connect("destroy", move |_w, (): ()| {
            let _keep = &guard;
        })
        .expect("connect should succeed");

    drop(widget);
    assert_eq!(drops.get(), 1, "finalization should free the closure");
}

#[test]
fn test_disconnect_during_emission_defers_free() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let (drops, guard) = counter();
    let id_slot: Rc<Cell<Option<SignalHandlerId>>> = Rc::new(Cell::new(None));
    let observed = Rc::new(Cell::new(u32::MAX));

    let slot = Rc::clone(&id_slot);
    let drops_inside = Rc::clone(&drops);
    let seen = Rc::clone(&observed);
    let id = widget
        .connect("destroy", move |w: &Pointer<Widget>, (): ()| {
            let _keep = &guard;
            let id = slot.get().expect("id should be stored before emission");
            assert!(w.disconnect(id));
            seen.set(drops_inside.get());
        })
        .expect("connect should succeed");
    id_slot.set(Some(id));

    widget.emit("destroy", &[]).expect("emit should succeed");

    assert_eq!(observed.get(), 0, "closure should stay alive while running");
    assert_eq!(drops.get(), 1, "closure should be freed once it returns");
    assert_eq!(widget.handler_count(), 0);
}

#[test]
fn test_connect_unknown_signal_frees_closure() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let (drops, guard) = counter();

    let err = widget
        .connect("clicked", move |_w, (): ()| {
            let _keep = &guard;
        })
        .expect_err("Widget has no clicked signal");

    assert!(err.matches(native_error_domain(), ffi::NOBJECT_ERROR_UNKNOWN_SIGNAL));
    assert_eq!(err.message(), "type 'TestWidget' has no signal 'clicked'");
    assert_eq!(drops.get(), 1, "failed connection should free the closure");
    assert_eq!(widget.handler_count(), 0);
}

#[test]
fn test_subclass_inherits_signals() {
    let ctx = Context::new();
    let button = ctx.create::<Button>().expect("create should succeed");
    let clicks = Rc::new(Cell::new(0));

    let c = Rc::clone(&clicks);
    button
        .connect("clicked", move |b: &Pointer<Button>, (): ()| {
            assert_eq!(b.label(), "button");
            c.set(c.get() + 1);
        })
        .expect("connect should succeed");
    let d = Rc::clone(&clicks);
    button
        .connect("destroy", move |_b: &Pointer<Button>, (): ()| d.set(d.get() + 10))
        .expect("inherited signal should connect");

    button.emit("clicked", &[]).expect("emit should succeed");
    button.emit("destroy", &[]).expect("emit should succeed");
    assert_eq!(clicks.get(), 11);
}

#[test]
fn test_handler_error_stops_emission() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let domain = Quark::intern("test-signal-handler");
    let later = Rc::new(Cell::new(false));

    widget
        .connect("query", move |_w, (): ()| -> objbridge::Result<bool> {
            Err(Error::new(domain, 12, format_args!("rejected {}", "query")))
        })
        .expect("connect should succeed");
    let flag = Rc::clone(&later);
    widget
        .connect("query", move |_w, (): ()| flag.set(true))
        .expect("connect should succeed");

    let err = widget.emit("query", &[]).expect_err("emit should fail");

    assert!(err.matches(domain, 12));
    assert_eq!(err.message(), "rejected query");
    assert!(!later.get(), "handlers after a failure should not run");
}

#[test]
fn test_malformed_argument_is_reported() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let called = Rc::new(Cell::new(false));

    let c = Rc::clone(&called);
    widget
        .connect("event", move |_w, (_name,): (String,)| c.set(true))
        .expect("connect should succeed");

    let err = widget
        .emit("event", &[Value::Int(3)])
        .expect_err("emit should fail");
    assert!(err.matches(DecodeError::domain(), 2));
    assert_eq!(err.message(), "argument 0: expected string, found int");

    let err = widget.emit("event", &[]).expect_err("emit should fail");
    assert!(err.matches(DecodeError::domain(), 1));
    assert!(!called.get(), "handler should not run with malformed arguments");
}

#[test]
fn test_string_vector_and_flags() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let strings = Rc::new(RefCell::new(Vec::new()));
    let flags = Rc::new(RefCell::new(Vec::new()));

    let s = Rc::clone(&strings);
    widget
        .connect("strings", move |_w, (list, label): (Vec<String>, Option<String>)| {
            *s.borrow_mut() = list;
            label.map_or(0i64, |l| l.len() as i64)
        })
        .expect("connect should succeed");
    let f = Rc::clone(&flags);
    widget
        .connect("flags", move |_w, (bits,): (Vec<bool>,)| {
            *f.borrow_mut() = bits;
        })
        .expect("connect should succeed");

    let ret = widget
        .emit(
            "strings",
            &[
                Value::StrV(vec!["a".into(), "".into(), "c".into()]),
                Value::None,
            ],
        )
        .expect("emit should succeed");
    assert_eq!(ret, Value::Int(0));
    assert_eq!(*strings.borrow(), vec!["a", "", "c"]);

    widget
        .emit("flags", &[Value::BoolArray(vec![true, false, false, true])])
        .expect("emit should succeed");
    assert_eq!(*flags.borrow(), vec![true, false, false, true]);
}

#[test]
fn test_object_arguments_resolve_to_wrappers() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let button = ctx.create::<Button>().expect("create should succeed");
    let matched = Rc::new(Cell::new(false));

    let target = button.clone();
    let m = Rc::clone(&matched);
    widget
        .connect("event", move |_w, (source,): (Pointer<Button>,)| {
            m.set(Pointer::ptr_eq(&source, &target));
        })
        .expect("connect should succeed");

    widget
        .emit("event", &[Value::from(&button)])
        .expect("emit should succeed");
    assert!(matched.get(), "argument should resolve to the existing wrapper");

    let err = widget
        .emit("event", &[Value::from(&widget)])
        .expect_err("a Widget is not a Button");
    assert!(err.matches(DecodeError::domain(), 6));

    let err = widget
        .emit("event", &[Value::Object(None)])
        .expect_err("null object should be rejected");
    assert!(err.matches(DecodeError::domain(), 4));
}

#[test]
fn test_emit_unknown_signal_fails() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let err = widget.emit("toggled", &[]).expect_err("emit should fail");
    assert!(err.matches(native_error_domain(), ffi::NOBJECT_ERROR_UNKNOWN_SIGNAL));
}

#[test]
fn test_disconnect_unknown_handler_warns() {
    let ctx = Context::new();
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let id = widget
        .connect("destroy", |_w, (): ()| {})
        .expect("connect should succeed");
    assert!(widget.disconnect(id));
    assert!(!widget.disconnect(id), "second disconnect should report false");
}

#[test]
#[should_panic(expected = "is not connected")]
fn test_strict_disconnect_panics() {
    let ctx = Context::with_options(ContextOptions {
        strict_disconnect: true,
        ..Default::default()
    });
    let widget = ctx.create::<Widget>().expect("create should succeed");
    let id = widget
        .connect("destroy", |_w, (): ()| {})
        .expect("connect should succeed");
    widget.disconnect(id);
    widget.disconnect(id);
}
