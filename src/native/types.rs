//! Runtime type table.
//!
//! Object types form a single-inheritance tree rooted at `NObject`. Boxed
//! record types are flat and carry their copy/free functions.

use std::collections::HashMap;
use std::ffi::{CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::{Mutex, OnceLock};

use super::lock;
use crate::ffi::{NBoxedCopyFunc, NBoxedFreeFunc, NType};

/// Tag of the root object type.
pub const NTYPE_OBJECT: NType = NType(1);

#[derive(Clone, Copy)]
enum TypeKind {
    Object,
    Boxed {
        copy: NBoxedCopyFunc,
        free: NBoxedFreeFunc,
    },
}

struct TypeNode {
    name: &'static CStr,
    parent: NType,
    kind: TypeKind,
    signals: Vec<CString>,
}

struct TypeTable {
    nodes: Vec<TypeNode>,
    by_name: HashMap<&'static CStr, NType>,
}

impl TypeTable {
    fn new() -> Self {
        let mut table = Self {
            nodes: Vec::new(),
            by_name: HashMap::new(),
        };
        table.insert(c"NObject", NType::invalid(), TypeKind::Object);
        table
    }

    fn insert(&mut self, name: &CStr, parent: NType, kind: TypeKind) -> NType {
        let name: &'static CStr = Box::leak(name.to_owned().into_boxed_c_str());
        self.nodes.push(TypeNode {
            name,
            parent,
            kind,
            signals: Vec::new(),
        });
        let tag = NType(self.nodes.len());
        self.by_name.insert(name, tag);
        tag
    }

    fn node(&self, tag: NType) -> Option<&TypeNode> {
        if !tag.is_valid() {
            return None;
        }
        self.nodes.get(tag.0 - 1)
    }

    fn node_mut(&mut self, tag: NType) -> Option<&mut TypeNode> {
        if !tag.is_valid() {
            return None;
        }
        self.nodes.get_mut(tag.0 - 1)
    }

    fn is_object(&self, tag: NType) -> bool {
        matches!(self.node(tag), Some(node) if matches!(node.kind, TypeKind::Object))
    }

    fn is_ancestor(&self, ancestor: NType, mut tag: NType) -> bool {
        if self.node(ancestor).is_none() {
            return false;
        }
        while let Some(node) = self.node(tag) {
            if tag == ancestor {
                return true;
            }
            tag = node.parent;
        }
        false
    }

    fn has_signal(&self, mut tag: NType, name: &CStr) -> bool {
        while let Some(node) = self.node(tag) {
            if node.signals.iter().any(|s| s.as_c_str() == name) {
                return true;
            }
            tag = node.parent;
        }
        false
    }
}

fn table() -> &'static Mutex<TypeTable> {
    static TABLE: OnceLock<Mutex<TypeTable>> = OnceLock::new();
    TABLE.get_or_init(|| Mutex::new(TypeTable::new()))
}

/// Name of a type, if registered.
pub(crate) fn type_name(tag: NType) -> Option<&'static CStr> {
    lock(table()).node(tag).map(|node| node.name)
}

/// Copy and free functions of a boxed type.
pub(crate) fn boxed_funcs(tag: NType) -> Option<(NBoxedCopyFunc, NBoxedFreeFunc)> {
    match lock(table()).node(tag)?.kind {
        TypeKind::Boxed { copy, free } => Some((copy, free)),
        TypeKind::Object => None,
    }
}

/// Whether `tag` names an object type with `name` among its signals or
/// its ancestors' signals.
pub(crate) fn has_signal(tag: NType, name: &CStr) -> bool {
    lock(table()).has_signal(tag, name)
}

/// Tag of the root object type.
pub extern "C" fn ntype_object() -> NType {
    NTYPE_OBJECT
}

/// Register an object type deriving from `parent`.
///
/// Registering the same name under the same parent again returns the
/// existing tag. Returns the invalid tag if the parent is not an object
/// type or the name is taken by an unrelated type.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn ntype_register_object(parent: NType, name: *const c_char) -> NType {
    assert!(!name.is_null(), "ntype_register_object: null name");
    let name = CStr::from_ptr(name);
    if name.to_bytes().is_empty() {
        return NType::invalid();
    }
    let mut table = lock(table());
    if !table.is_object(parent) {
        return NType::invalid();
    }
    if let Some(&existing) = table.by_name.get(name) {
        return match table.node(existing) {
            Some(node) if node.parent == parent && matches!(node.kind, TypeKind::Object) => {
                existing
            }
            _ => NType::invalid(),
        };
    }
    table.insert(name, parent, TypeKind::Object)
}

/// Whether two registered copy/free pairs are the same functions.
fn same_funcs(a: (NBoxedCopyFunc, NBoxedFreeFunc), b: (NBoxedCopyFunc, NBoxedFreeFunc)) -> bool {
    match (a, b) {
        ((Some(copy_a), Some(free_a)), (Some(copy_b), Some(free_b))) => {
            ptr::fn_addr_eq(copy_a, copy_b) && ptr::fn_addr_eq(free_a, free_b)
        }
        _ => false,
    }
}

/// Register a boxed record type with its copy and free functions.
///
/// Registering the same name with the same functions again returns the
/// existing tag; any other reuse of the name returns the invalid tag.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string, and the functions must
/// copy and free records of one consistent layout.
pub unsafe extern "C" fn ntype_register_boxed(
    name: *const c_char,
    copy: NBoxedCopyFunc,
    free: NBoxedFreeFunc,
) -> NType {
    assert!(!name.is_null(), "ntype_register_boxed: null name");
    let name = CStr::from_ptr(name);
    if name.to_bytes().is_empty() || copy.is_none() || free.is_none() {
        return NType::invalid();
    }
    let mut table = lock(table());
    if let Some(&existing) = table.by_name.get(name) {
        return match table.node(existing).map(|node| node.kind) {
            Some(TypeKind::Boxed {
                copy: old_copy,
                free: old_free,
            }) if same_funcs((old_copy, old_free), (copy, free)) => existing,
            _ => NType::invalid(),
        };
    }
    table.insert(name, NType::invalid(), TypeKind::Boxed { copy, free })
}

/// Parent of a type, or the invalid tag for roots and unknown types.
pub extern "C" fn ntype_parent(tag: NType) -> NType {
    lock(table())
        .node(tag)
        .map(|node| node.parent)
        .unwrap_or_default()
}

/// Name of a type, or null if unknown.
pub extern "C" fn ntype_name(tag: NType) -> *const c_char {
    type_name(tag).map_or(ptr::null(), CStr::as_ptr)
}

/// Look up a type by name.
///
/// # Safety
///
/// `name` must be null or a valid NUL-terminated string.
pub unsafe extern "C" fn ntype_from_name(name: *const c_char) -> NType {
    if name.is_null() {
        return NType::invalid();
    }
    lock(table())
        .by_name
        .get(CStr::from_ptr(name))
        .copied()
        .unwrap_or_default()
}

/// Whether `ancestor` is `tag` or one of its ancestors.
pub extern "C" fn ntype_is_ancestor(ancestor: NType, tag: NType) -> bool {
    lock(table()).is_ancestor(ancestor, tag)
}

/// Whether `tag` is an object type.
pub extern "C" fn ntype_is_object(tag: NType) -> bool {
    lock(table()).is_object(tag)
}

/// Whether `tag` is a boxed record type.
pub extern "C" fn ntype_is_boxed(tag: NType) -> bool {
    boxed_funcs(tag).is_some()
}

/// Declare a signal on an object type. Declaring a signal the type already
/// has (directly or inherited) succeeds without change.
///
/// # Safety
///
/// `name` must be a valid NUL-terminated string.
pub unsafe extern "C" fn ntype_add_signal(tag: NType, name: *const c_char) -> bool {
    assert!(!name.is_null(), "ntype_add_signal: null name");
    let name = CStr::from_ptr(name);
    if name.to_bytes().is_empty() {
        return false;
    }
    let mut table = lock(table());
    if !table.is_object(tag) {
        return false;
    }
    if table.has_signal(tag, name) {
        return true;
    }
    match table.node_mut(tag) {
        Some(node) => {
            node.signals.push(name.to_owned());
            true
        }
        None => false,
    }
}

/// Whether instances of `tag` can emit `name`.
///
/// # Safety
///
/// `name` must be null or a valid NUL-terminated string.
pub unsafe extern "C" fn ntype_has_signal(tag: NType, name: *const c_char) -> bool {
    if name.is_null() {
        return false;
    }
    has_signal(tag, CStr::from_ptr(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::raw::c_void;

    #[test]
    fn test_register_is_idempotent_per_parent() {
        unsafe {
            let a = ntype_register_object(NTYPE_OBJECT, c"NativeTypesWidget".as_ptr());
            let b = ntype_register_object(NTYPE_OBJECT, c"NativeTypesWidget".as_ptr());
            assert!(a.is_valid());
            assert_eq!(a, b);

            let child = ntype_register_object(a, c"NativeTypesButton".as_ptr());
            let conflict = ntype_register_object(NTYPE_OBJECT, c"NativeTypesButton".as_ptr());
            assert!(child.is_valid());
            assert!(!conflict.is_valid());
        }
    }

    #[test]
    fn test_ancestry() {
        unsafe {
            let base = ntype_register_object(NTYPE_OBJECT, c"NativeTypesBase".as_ptr());
            let derived = ntype_register_object(base, c"NativeTypesDerived".as_ptr());
            assert!(ntype_is_ancestor(NTYPE_OBJECT, derived));
            assert!(ntype_is_ancestor(base, derived));
            assert!(ntype_is_ancestor(derived, derived));
            assert!(!ntype_is_ancestor(derived, base));
            assert_eq!(ntype_parent(derived), base);
            assert_eq!(ntype_from_name(c"NativeTypesDerived".as_ptr()), derived);
        }
    }

    #[test]
    fn test_signals_are_inherited() {
        unsafe {
            let base = ntype_register_object(NTYPE_OBJECT, c"NativeTypesEmitter".as_ptr());
            let derived = ntype_register_object(base, c"NativeTypesSubEmitter".as_ptr());
            assert!(ntype_add_signal(base, c"changed".as_ptr()));
            assert!(ntype_has_signal(derived, c"changed".as_ptr()));
            assert!(!ntype_has_signal(base, c"missing".as_ptr()));
        }
    }

    unsafe extern "C" fn copy_byte(record: *const c_void) -> *mut c_void {
        Box::into_raw(Box::new(*(record as *const u8))) as *mut c_void
    }

    unsafe extern "C" fn free_byte(record: *mut c_void) {
        drop(Box::from_raw(record as *mut u8));
    }

    unsafe extern "C" fn free_byte_again(record: *mut c_void) {
        drop(Box::from_raw(record as *mut u8));
    }

    #[test]
    fn test_boxed_reregistration_compares_functions() {
        unsafe {
            let name = c"NativeTypesByte".as_ptr();
            let tag = ntype_register_boxed(name, Some(copy_byte), Some(free_byte));
            assert!(tag.is_valid());
            assert_eq!(ntype_register_boxed(name, Some(copy_byte), Some(free_byte)), tag);
            assert!(!ntype_register_boxed(name, Some(copy_byte), Some(free_byte_again)).is_valid());
            assert!(!ntype_register_object(NTYPE_OBJECT, name).is_valid());
        }
    }
}
