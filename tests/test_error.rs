//! Recoverable error value tests.

use objbridge::{BridgeError, Error, Quark, Result};

fn domain() -> Quark {
    Quark::intern("test-error-domain")
}

#[test]
fn test_formatted_error() {
    let domain = Quark::from_raw(42).expect("42 should be a valid quark");
    let err = Error::new(domain, 7, format_args!("bad value: {}", 5));

    assert!(err.is_set());
    assert_eq!(err.message(), "bad value: 5");
    assert_eq!(err.code(), Some(7));
    assert_eq!(err.domain(), Some(domain));
    assert!(err.matches(domain, 7));
    assert!(!err.matches(domain, 8));
}

#[test]
fn test_literal_round_trip() {
    let messages = ["", "plain", "100% sure: %d %s", "ünïcödé", "tab\tand\nnewline"];
    for (code, message) in messages.iter().enumerate() {
        let err = Error::new_literal(domain(), code as i32, message);
        assert_eq!(err.domain(), Some(domain()));
        assert_eq!(err.code(), Some(code as i32));
        assert_eq!(err.message(), *message, "message should round-trip verbatim");
    }
}

#[test]
fn test_empty_error_is_printable() {
    let err = Error::default();
    assert!(!err.is_set());
    assert_eq!(err.message(), "Undefined error");
    assert_eq!(err.to_string(), "Undefined error");
    assert!(err.into_result().is_ok());
}

#[test]
fn test_propagate_moves_record() {
    let mut source = Error::new_literal(domain(), 3, "inner failure");
    let mut dest = Error::none();

    dest.propagate(&mut source);

    assert!(!source.is_set(), "source should be empty after propagate");
    assert!(dest.is_set());
    assert!(dest.matches(domain(), 3));
    assert_eq!(dest.message(), "inner failure");
}

#[test]
fn test_propagate_replaces_previous_record() {
    let mut dest = Error::new_literal(domain(), 1, "old");
    let mut source = Error::new_literal(domain(), 2, "new");

    dest.propagate(&mut source);

    assert!(dest.matches(domain(), 2));
    assert_eq!(dest.message(), "new");
}

#[test]
fn test_clone_is_deep() {
    let original = Error::new_literal(domain(), 5, "copied");
    let copy = original.clone();
    assert_ne!(original.as_ptr(), copy.as_ptr(), "clone should own a new record");
    drop(original);
    assert!(copy.matches(domain(), 5));
    assert_eq!(copy.message(), "copied");
}

#[test]
fn test_set_then_clear() {
    let mut err = Error::none();
    err.set(domain(), 9, format_args!("{}-{}", "a", 1));
    assert_eq!(err.message(), "a-1");
    err.clear();
    assert!(!err.is_set());
    err.set_literal(domain(), 10, "again");
    assert!(err.matches(domain(), 10));
}

#[test]
#[should_panic(expected = "already set")]
fn test_out_slot_requires_empty_error() {
    let mut err = Error::new_literal(domain(), 1, "set");
    let _ = err.as_out_ptr();
}

#[test]
#[should_panic(expected = "already set")]
fn test_double_set_panics() {
    let mut err = Error::new_literal(domain(), 1, "first");
    err.set_literal(domain(), 2, "second");
}

#[test]
fn test_question_mark_propagation() {
    fn inner() -> Result<()> {
        Err(Error::new_literal(domain(), 4, "from inner"))
    }

    fn outer() -> Result<u32> {
        inner()?;
        Ok(1)
    }

    let err = outer().expect_err("outer should fail");
    assert!(err.matches(domain(), 4));
}

#[test]
fn test_bridge_errors_have_their_own_domain() {
    let err: Error = BridgeError::InvalidName("a\0b".into()).into();
    assert_eq!(err.domain(), Some(BridgeError::domain()));
    assert_eq!(err.code(), Some(2));
    assert!(!err.matches(domain(), 2));
}

#[test]
fn test_usable_as_std_error() {
    let err: Box<dyn std::error::Error> = Box::new(Error::new_literal(domain(), 1, "boxed"));
    assert_eq!(err.to_string(), "boxed");
}

#[test]
fn test_error_crosses_threads() {
    fn assert_send_sync<T: Send + Sync + 'static>() {}
    assert_send_sync::<Error>();

    let worker = std::thread::spawn(|| -> Result<()> {
        Err(Error::new_literal(domain(), 11, "from worker"))
    });
    let err = worker
        .join()
        .expect("worker should not panic")
        .expect_err("worker should fail");
    assert!(err.matches(domain(), 11));

    let boxed: Box<dyn std::error::Error + Send + Sync> = Box::new(err);
    assert_eq!(boxed.to_string(), "from worker");
}
