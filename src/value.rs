//! Owned signal values.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::os::raw::c_char;
use std::ptr;

use crate::context::Context;
use crate::error::{BridgeError, Result};
use crate::ffi::{self, NValue};
use crate::object::{Object, ObjectType, Pointer};

/// A signal argument or return value owned by Rust.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value.
    #[default]
    None,
    /// Integer.
    Int(i64),
    /// Floating point number.
    Double(f64),
    /// Boolean.
    Bool(bool),
    /// UTF-8 string.
    Str(String),
    /// List of strings.
    StrV(Vec<String>),
    /// Integer array.
    IntArray(Vec<i64>),
    /// Boolean array.
    BoolArray(Vec<bool>),
    /// Object, possibly null.
    Object(Option<Pointer<Object>>),
}

impl Value {
    /// Name of the value's type, as used in decode errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Bool(_) => "bool",
            Value::Str(_) => "string",
            Value::StrV(_) => "strv",
            Value::IntArray(_) => "int[]",
            Value::BoolArray(_) => "bool[]",
            Value::Object(_) => "object",
        }
    }

    /// Copy a native value. Strings that are not valid UTF-8 are converted
    /// lossily, and objects are resolved through `context`.
    ///
    /// # Safety
    ///
    /// Every pointer in `value` must be valid for its tag.
    pub unsafe fn from_native(value: &NValue, context: &Context) -> Value {
        let data = &value.data;
        match value.tag {
            ffi::NVALUE_INT => Value::Int(data.v_int),
            ffi::NVALUE_DOUBLE => Value::Double(data.v_double),
            ffi::NVALUE_BOOL => Value::Bool(data.v_bool),
            ffi::NVALUE_STRING if data.v_string.is_null() => Value::None,
            ffi::NVALUE_STRING => Value::Str(lossy(data.v_string)),
            ffi::NVALUE_STRV => {
                let mut strings = Vec::new();
                let mut cursor = data.v_strv;
                while !cursor.is_null() && !(*cursor).is_null() {
                    strings.push(lossy(*cursor));
                    cursor = cursor.add(1);
                }
                Value::StrV(strings)
            }
            ffi::NVALUE_INT_ARRAY => {
                Value::IntArray(array(data.v_array.data as *const i64, data.v_array.len))
            }
            ffi::NVALUE_BOOL_ARRAY => {
                Value::BoolArray(array(data.v_array.data as *const bool, data.v_array.len))
            }
            ffi::NVALUE_OBJECT => Value::Object(context.wrap::<Object>(data.v_object)),
            _ => Value::None,
        }
    }
}

unsafe fn lossy(s: *const c_char) -> String {
    CStr::from_ptr(s).to_string_lossy().into_owned()
}

/// Copy `len` elements; a null pointer reads as empty.
pub(crate) unsafe fn array<T: Copy>(data: *const T, len: usize) -> Vec<T> {
    if data.is_null() || len == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(data, len).to_vec()
    }
}

macro_rules! impl_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

impl_from! {
    i64 => Int,
    i32 => Int,
    u32 => Int,
    f64 => Double,
    bool => Bool,
    String => Str,
    &str => Str,
    Vec<String> => StrV,
    Vec<i64> => IntArray,
    Vec<bool> => BoolArray,
}

impl<T: ObjectType> From<Pointer<T>> for Value {
    fn from(p: Pointer<T>) -> Self {
        Value::Object(Some(p.upcast()))
    }
}

impl<T: ObjectType> From<&Pointer<T>> for Value {
    fn from(p: &Pointer<T>) -> Self {
        Value::Object(Some(p.upcast()))
    }
}

/// Native view of a slice of values, valid while the slice is borrowed.
pub(crate) struct NativeArgs<'a> {
    values: Vec<NValue>,
    _strings: Vec<CString>,
    _vectors: Vec<Vec<*const c_char>>,
    _marker: PhantomData<&'a [Value]>,
}

fn c_string(s: &str, index: usize) -> Result<CString> {
    CString::new(s).map_err(|_| BridgeError::InteriorNul(index).into())
}

impl<'a> NativeArgs<'a> {
    pub(crate) fn new(args: &'a [Value]) -> Result<Self> {
        let mut strings = Vec::new();
        let mut vectors = Vec::new();
        let mut values = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let value = match arg {
                Value::None => NValue::none(),
                Value::Int(v) => NValue::int(*v),
                Value::Double(v) => NValue::double(*v),
                Value::Bool(v) => NValue::boolean(*v),
                Value::Str(s) => {
                    let c = c_string(s, index)?;
                    let value = NValue::string(c.as_ptr());
                    strings.push(c);
                    value
                }
                Value::StrV(list) => {
                    let mut pointers = Vec::with_capacity(list.len() + 1);
                    for s in list {
                        let c = c_string(s, index)?;
                        pointers.push(c.as_ptr());
                        strings.push(c);
                    }
                    pointers.push(ptr::null());
                    let value = NValue::strv(pointers.as_ptr());
                    vectors.push(pointers);
                    value
                }
                Value::IntArray(v) => NValue::int_array(v.as_ptr(), v.len()),
                Value::BoolArray(v) => NValue::bool_array(v.as_ptr(), v.len()),
                Value::Object(obj) => {
                    NValue::object(obj.as_ref().map_or(ptr::null_mut(), |p| p.as_ptr()))
                }
            };
            values.push(value);
        }
        Ok(Self {
            values,
            _strings: strings,
            _vectors: vectors,
            _marker: PhantomData,
        })
    }

    pub(crate) fn as_ptr(&self) -> *const NValue {
        if self.values.is_empty() {
            ptr::null()
        } else {
            self.values.as_ptr()
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_args_keep_strings_alive() {
        let args = vec![
            Value::from("hello"),
            Value::from(vec!["a".to_string(), "b".to_string()]),
            Value::from(7i32),
        ];
        let native = NativeArgs::new(&args).unwrap();
        assert_eq!(native.len(), 3);

        let ctx = Context::new();
        let back: Vec<Value> = unsafe {
            std::slice::from_raw_parts(native.as_ptr(), native.len())
                .iter()
                .map(|v| Value::from_native(v, &ctx))
                .collect()
        };
        assert_eq!(back, args);
    }

    #[test]
    fn test_interior_nul_is_rejected() {
        let args = [Value::Int(1), Value::from("bad\0string")];
        let err = NativeArgs::new(&args).err().unwrap();
        assert!(err.matches(BridgeError::domain(), 5));
        assert_eq!(err.message(), "argument 1 contains an interior NUL byte");
    }

    #[test]
    fn test_empty_args_pass_null() {
        let native = NativeArgs::new(&[]).unwrap();
        assert!(native.as_ptr().is_null());
        assert_eq!(native.len(), 0);
    }
}
