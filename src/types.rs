//! Runtime type tags.

use std::borrow::Cow;
use std::ffi::{CStr, CString};
use std::fmt;
use std::os::raw::c_void;

use crate::error::{BridgeError, Result};
use crate::ffi::{self, NType};

/// Identifier of a native runtime class.
///
/// Object types form a single-inheritance tree rooted at
/// [`TypeTag::object`]; boxed record types stand alone.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeTag(NType);

fn c_name(name: &str) -> Result<CString> {
    if name.is_empty() {
        return Err(BridgeError::InvalidName(name.to_string()).into());
    }
    CString::new(name).map_err(|_| BridgeError::InvalidName(name.to_string()).into())
}

impl TypeTag {
    /// The root object type.
    pub fn object() -> TypeTag {
        TypeTag(ffi::ntype_object())
    }

    /// Register an object type deriving from `parent`.
    ///
    /// Registering the same name under the same parent again returns the
    /// existing tag.
    pub fn register_object(parent: TypeTag, name: &str) -> Result<TypeTag> {
        let c = c_name(name)?;
        let tag = unsafe { ffi::ntype_register_object(parent.0, c.as_ptr()) };
        if !tag.is_valid() {
            if !parent.is_object() {
                return Err(BridgeError::NotInstantiable(parent.name().into_owned()).into());
            }
            return Err(BridgeError::TypeConflict(name.to_string()).into());
        }
        tracing::debug!(name, parent = %parent, "registered object type");
        Ok(TypeTag(tag))
    }

    /// Register a boxed record type.
    ///
    /// # Safety
    ///
    /// `copy` must return an owned deep copy of a record of one consistent
    /// layout, and `free` must release records returned by `copy`.
    pub unsafe fn register_boxed(
        name: &str,
        copy: unsafe extern "C" fn(*const c_void) -> *mut c_void,
        free: unsafe extern "C" fn(*mut c_void),
    ) -> Result<TypeTag> {
        let c = c_name(name)?;
        let tag = ffi::ntype_register_boxed(c.as_ptr(), Some(copy), Some(free));
        if !tag.is_valid() {
            return Err(BridgeError::TypeConflict(name.to_string()).into());
        }
        Ok(TypeTag(tag))
    }

    /// Look up a registered type by name.
    pub fn from_name(name: &str) -> Option<TypeTag> {
        let c = CString::new(name).ok()?;
        Self::from_native(unsafe { ffi::ntype_from_name(c.as_ptr()) })
    }

    /// The type's name.
    pub fn name(self) -> Cow<'static, str> {
        let ptr = ffi::ntype_name(self.0);
        if ptr.is_null() {
            return Cow::Borrowed("<invalid>");
        }
        // type names are never freed
        unsafe { CStr::from_ptr(ptr) }.to_string_lossy()
    }

    /// Parent type, `None` for roots.
    pub fn parent(self) -> Option<TypeTag> {
        Self::from_native(ffi::ntype_parent(self.0))
    }

    /// Whether `self` is `other` or one of its ancestors.
    pub fn is_ancestor_of(self, other: TypeTag) -> bool {
        ffi::ntype_is_ancestor(self.0, other.0)
    }

    /// Whether `self` is `ancestor` or derives from it.
    pub fn is_a(self, ancestor: TypeTag) -> bool {
        ancestor.is_ancestor_of(self)
    }

    /// Whether this is an object type.
    pub fn is_object(self) -> bool {
        ffi::ntype_is_object(self.0)
    }

    /// Whether this is a boxed record type.
    pub fn is_boxed(self) -> bool {
        ffi::ntype_is_boxed(self.0)
    }

    /// Declare a signal on this object type.
    pub fn add_signal(self, name: &str) -> Result<()> {
        let c = c_name(name)?;
        if unsafe { ffi::ntype_add_signal(self.0, c.as_ptr()) } {
            Ok(())
        } else {
            Err(BridgeError::NotInstantiable(self.name().into_owned()).into())
        }
    }

    /// Whether instances of this type can emit `name`.
    pub fn has_signal(self, name: &str) -> bool {
        match CString::new(name) {
            Ok(c) => unsafe { ffi::ntype_has_signal(self.0, c.as_ptr()) },
            Err(_) => false,
        }
    }

    /// Wrap a native tag; the invalid tag gives `None`.
    pub fn from_native(tag: NType) -> Option<TypeTag> {
        tag.is_valid().then_some(TypeTag(tag))
    }

    /// The native tag.
    pub fn to_native(self) -> NType {
        self.0
    }
}

impl fmt::Debug for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeTag({}, {:?})", self.0 .0, self.name())
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_is_root() {
        let object = TypeTag::object();
        assert_eq!(object.name(), "NObject");
        assert_eq!(object.parent(), None);
        assert!(object.is_object());
        assert!(!object.is_boxed());
    }

    #[test]
    fn test_register_rejects_bad_names() {
        assert!(TypeTag::register_object(TypeTag::object(), "").is_err());
        assert!(TypeTag::register_object(TypeTag::object(), "Bad\0Name").is_err());
    }

    #[test]
    fn test_boxed_parent_is_not_instantiable() {
        let rect = TypeTag::from_native(ffi::nrect_get_type()).unwrap();
        let err = TypeTag::register_object(rect, "TypesUnderRect").unwrap_err();
        assert!(err.matches(BridgeError::domain(), 4));
    }
}
