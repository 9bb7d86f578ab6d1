//! Quark registry tests.

use objbridge::Quark;

#[test]
fn test_intern_is_idempotent() {
    let a = Quark::intern("test-quark-idempotent");
    let b = Quark::intern("test-quark-idempotent");
    assert_eq!(a, b);
    assert_eq!(a.name(), "test-quark-idempotent");
}

#[test]
fn test_distinct_strings_get_distinct_quarks() {
    let a = Quark::intern("test-quark-left");
    let b = Quark::intern("test-quark-right");
    assert_ne!(a, b);
}

#[test]
fn test_lookup_does_not_intern() {
    let name = "test-quark-never-interned";
    assert_eq!(Quark::lookup(name), None);
    assert_eq!(Quark::lookup(name), None, "lookup should not add the string");

    let q = Quark::intern(name);
    assert_eq!(Quark::lookup(name), Some(q));
}

#[test]
fn test_raw_round_trip() {
    let q = Quark::from("test-quark-raw");
    assert_eq!(Quark::from_raw(q.into_raw()), Some(q));
    assert_eq!(q.to_string(), "test-quark-raw");
}

#[test]
fn test_intern_from_threads() {
    let handles: Vec<_> = (0..8)
        .map(|_| std::thread::spawn(|| Quark::intern("test-quark-threads").into_raw()))
        .collect();
    let values: Vec<u32> = handles
        .into_iter()
        .map(|h| h.join().expect("thread should not panic"))
        .collect();
    assert!(values.windows(2).all(|w| w[0] == w[1]));
}

#[test]
#[should_panic(expected = "NUL")]
fn test_interior_nul_panics() {
    let _ = Quark::intern("bad\0quark");
}
