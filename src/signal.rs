//! Typed signal handlers.
//!
//! A closure connected with [`Pointer::connect`] is boxed together with the
//! context it was connected from, and handed to the native runtime as the
//! opaque data of a connection. The runtime calls back through one
//! trampoline per closure signature, which decodes the native argument
//! vector, runs the closure and encodes its result. The boxed closure is
//! freed by the connection's destroy notifier, which the runtime fires
//! exactly once: on disconnect, or when the object is finalized.

use std::any::type_name;
use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::ptr::NonNull;
use std::slice;

use crate::context::Context;
use crate::error::{BridgeError, DecodeError, Error, Result};
use crate::ffi::{self, NError, NHandlerId, NObject, NValue};
use crate::object::{ObjectType, Pointer};
use crate::value::{array, NativeArgs, Value};

type DecodeResult<T> = std::result::Result<T, DecodeError>;

/// Token of a signal connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SignalHandlerId(NHandlerId);

impl SignalHandlerId {
    /// The native connection id.
    pub fn as_raw(self) -> u64 {
        self.0 .0
    }
}

fn expect_tag(value: &NValue, tag: ffi::NValueTag, index: usize) -> DecodeResult<()> {
    if value.tag == tag {
        Ok(())
    } else {
        Err(DecodeError::TypeMismatch {
            index,
            expected: ffi::tag_name(tag),
            found: value.type_name(),
        })
    }
}

/// A type a native signal argument can be decoded into.
pub trait FromValue: Sized {
    /// Decode the argument at position `index`. Anything the value points
    /// to is copied; nothing is retained past the call.
    ///
    /// # Safety
    ///
    /// Every pointer in `value` must be valid for its tag.
    unsafe fn from_value(
        value: &NValue,
        index: usize,
        context: &Context,
    ) -> DecodeResult<Self>;
}

impl FromValue for i64 {
    unsafe fn from_value(value: &NValue, index: usize, _: &Context) -> DecodeResult<Self> {
        expect_tag(value, ffi::NVALUE_INT, index)?;
        Ok(value.data.v_int)
    }
}

macro_rules! narrow_int {
    ($($ty:ty),*) => {
        $(
            impl FromValue for $ty {
                unsafe fn from_value(
                    value: &NValue,
                    index: usize,
                    context: &Context,
                ) -> DecodeResult<Self> {
                    let wide = i64::from_value(value, index, context)?;
                    <$ty>::try_from(wide).map_err(|_| DecodeError::OutOfRange {
                        index,
                        value: wide,
                        target: stringify!($ty),
                    })
                }
            }
        )*
    };
}

narrow_int!(i32, u32);

impl FromValue for f64 {
    unsafe fn from_value(value: &NValue, index: usize, _: &Context) -> DecodeResult<Self> {
        expect_tag(value, ffi::NVALUE_DOUBLE, index)?;
        Ok(value.data.v_double)
    }
}

impl FromValue for bool {
    unsafe fn from_value(value: &NValue, index: usize, _: &Context) -> DecodeResult<Self> {
        expect_tag(value, ffi::NVALUE_BOOL, index)?;
        Ok(value.data.v_bool)
    }
}

unsafe fn owned_string(s: *const c_char, index: usize) -> DecodeResult<String> {
    CStr::from_ptr(s)
        .to_str()
        .map(str::to_owned)
        .map_err(|_| DecodeError::InvalidUtf8 { index })
}

impl FromValue for String {
    unsafe fn from_value(value: &NValue, index: usize, _: &Context) -> DecodeResult<Self> {
        expect_tag(value, ffi::NVALUE_STRING, index)?;
        let s = value.data.v_string;
        if s.is_null() {
            return Err(DecodeError::Null { index });
        }
        owned_string(s, index)
    }
}

impl FromValue for Option<String> {
    unsafe fn from_value(
        value: &NValue,
        index: usize,
        context: &Context,
    ) -> DecodeResult<Self> {
        if value.tag == ffi::NVALUE_NONE
            || (value.tag == ffi::NVALUE_STRING && value.data.v_string.is_null())
        {
            return Ok(None);
        }
        String::from_value(value, index, context).map(Some)
    }
}

impl FromValue for Vec<String> {
    unsafe fn from_value(value: &NValue, index: usize, _: &Context) -> DecodeResult<Self> {
        expect_tag(value, ffi::NVALUE_STRV, index)?;
        let mut cursor = value.data.v_strv;
        if cursor.is_null() {
            return Err(DecodeError::Null { index });
        }
        let mut strings = Vec::new();
        while !(*cursor).is_null() {
            strings.push(owned_string(*cursor, index)?);
            cursor = cursor.add(1);
        }
        Ok(strings)
    }
}

unsafe fn counted<T: Copy>(
    value: &NValue,
    tag: ffi::NValueTag,
    index: usize,
) -> DecodeResult<Vec<T>> {
    expect_tag(value, tag, index)?;
    let arr = value.data.v_array;
    if arr.data.is_null() && arr.len > 0 {
        return Err(DecodeError::Null { index });
    }
    Ok(array(arr.data as *const T, arr.len))
}

impl FromValue for Vec<i64> {
    unsafe fn from_value(value: &NValue, index: usize, _: &Context) -> DecodeResult<Self> {
        counted(value, ffi::NVALUE_INT_ARRAY, index)
    }
}

// Decoded by count: a false element is data, not a terminator.
impl FromValue for Vec<bool> {
    unsafe fn from_value(value: &NValue, index: usize, _: &Context) -> DecodeResult<Self> {
        counted(value, ffi::NVALUE_BOOL_ARRAY, index)
    }
}

unsafe fn object_arg<U: ObjectType>(
    raw: NonNull<NObject>,
    index: usize,
    context: &Context,
) -> DecodeResult<Pointer<U>> {
    context
        .try_wrap::<U>(raw)
        .map_err(|found| DecodeError::ObjectType {
            index,
            expected: type_name::<U>(),
            found: found.name().into_owned(),
        })
}

impl<U: ObjectType> FromValue for Pointer<U> {
    unsafe fn from_value(
        value: &NValue,
        index: usize,
        context: &Context,
    ) -> DecodeResult<Self> {
        expect_tag(value, ffi::NVALUE_OBJECT, index)?;
        match NonNull::new(value.data.v_object) {
            Some(raw) => object_arg(raw, index, context),
            None => Err(DecodeError::Null { index }),
        }
    }
}

impl<U: ObjectType> FromValue for Option<Pointer<U>> {
    unsafe fn from_value(
        value: &NValue,
        index: usize,
        context: &Context,
    ) -> DecodeResult<Self> {
        if value.tag == ffi::NVALUE_NONE {
            return Ok(None);
        }
        expect_tag(value, ffi::NVALUE_OBJECT, index)?;
        match NonNull::new(value.data.v_object) {
            Some(raw) => object_arg(raw, index, context).map(Some),
            None => Ok(None),
        }
    }
}

/// A tuple of handler parameters decoded from a native argument vector.
pub trait FromArgs: Sized {
    /// Number of arguments the tuple takes.
    const ARITY: usize;

    /// Decode the whole argument vector.
    ///
    /// # Safety
    ///
    /// Every value in `args` must be valid for its tag.
    unsafe fn from_args(args: &[NValue], context: &Context) -> DecodeResult<Self>;
}

macro_rules! impl_from_args {
    ($n:expr; $($ty:ident => $idx:tt),*) => {
        impl<$($ty: FromValue),*> FromArgs for ($($ty,)*) {
            const ARITY: usize = $n;

            #[allow(unused_variables)]
            unsafe fn from_args(
                args: &[NValue],
                context: &Context,
            ) -> DecodeResult<Self> {
                if args.len() != Self::ARITY {
                    return Err(DecodeError::Arity {
                        expected: Self::ARITY,
                        actual: args.len(),
                    });
                }
                Ok(($($ty::from_value(&args[$idx], $idx, context)?,)*))
            }
        }
    };
}

impl_from_args!(0;);
impl_from_args!(1; A => 0);
impl_from_args!(2; A => 0, B => 1);
impl_from_args!(3; A => 0, B => 1, C => 2);
impl_from_args!(4; A => 0, B => 1, C => 2, D => 3);

/// A handler result that can be returned to the native emitter.
pub trait IntoReturn {
    /// Encode the result. An `Err` is written to the emitter's error slot.
    fn into_return(self) -> Result<NValue>;
}

impl IntoReturn for () {
    fn into_return(self) -> Result<NValue> {
        Ok(NValue::none())
    }
}

impl IntoReturn for bool {
    fn into_return(self) -> Result<NValue> {
        Ok(NValue::boolean(self))
    }
}

impl IntoReturn for i32 {
    fn into_return(self) -> Result<NValue> {
        Ok(NValue::int(self.into()))
    }
}

impl IntoReturn for i64 {
    fn into_return(self) -> Result<NValue> {
        Ok(NValue::int(self))
    }
}

impl IntoReturn for f64 {
    fn into_return(self) -> Result<NValue> {
        Ok(NValue::double(self))
    }
}

impl<R: IntoReturn> IntoReturn for Result<R> {
    fn into_return(self) -> Result<NValue> {
        self.and_then(IntoReturn::into_return)
    }
}

type HandlerFn<T, A, R> = dyn Fn(&Pointer<T>, A) -> R;

struct Closure<T: ObjectType, A, R> {
    func: Box<HandlerFn<T, A, R>>,
    context: Context,
    signal: CString,
}

impl<T: ObjectType, A: FromArgs, R: IntoReturn> Closure<T, A, R> {
    unsafe fn invoke(&self, instance: *mut NObject, args: &[NValue]) -> Result<NValue> {
        let raw = NonNull::new(instance).ok_or(DecodeError::NullInstance)?;
        let instance = self.context.try_wrap::<T>(raw).map_err(|found| DecodeError::ObjectType {
            index: 0,
            expected: type_name::<T>(),
            found: found.name().into_owned(),
        })?;
        let args = A::from_args(args, &self.context)?;
        (self.func)(&instance, args).into_return()
    }
}

unsafe extern "C" fn marshal<T: ObjectType, A: FromArgs, R: IntoReturn>(
    instance: *mut NObject,
    args: *const NValue,
    n_args: usize,
    data: *mut c_void,
    error: *mut *mut NError,
) -> NValue {
    let closure = &*(data as *const Closure<T, A, R>);
    let args = if args.is_null() || n_args == 0 {
        &[][..]
    } else {
        slice::from_raw_parts(args, n_args)
    };
    tracing::trace!(signal = ?closure.signal, n_args, "dispatching signal");
    match closure.invoke(instance, args) {
        Ok(value) => value,
        Err(err) => {
            tracing::trace!(signal = ?closure.signal, error = %err, "handler failed");
            err.propagate_into(error);
            NValue::none()
        }
    }
}

unsafe extern "C" fn release_closure<T: ObjectType, A, R>(data: *mut c_void) {
    let closure = Box::from_raw(data as *mut Closure<T, A, R>);
    tracing::trace!(signal = ?closure.signal, "released handler");
    drop(closure);
}

impl<T: ObjectType> Pointer<T> {
    /// Connect `handler` to `signal`.
    ///
    /// The handler receives this object's wrapper and the decoded
    /// arguments. It runs until disconnected or until the object is
    /// finalized, and is dropped exactly once.
    ///
    /// ```
    /// use objbridge::{Context, Object, TypeTag};
    ///
    /// let tag = TypeTag::object();
    /// tag.add_signal("doc-notify").unwrap();
    /// let ctx = Context::new();
    /// let obj = ctx.create::<Object>().unwrap();
    /// let id = obj
    ///     .connect("doc-notify", |_obj, (name,): (String,)| name.len() as i64)
    ///     .unwrap();
    /// let ret = obj.emit("doc-notify", &["hello".into()]).unwrap();
    /// assert_eq!(ret, objbridge::Value::Int(5));
    /// assert!(obj.disconnect(id));
    /// ```
    pub fn connect<A, R, F>(&self, signal: &str, handler: F) -> Result<SignalHandlerId>
    where
        A: FromArgs + 'static,
        R: IntoReturn + 'static,
        F: Fn(&Pointer<T>, A) -> R + 'static,
    {
        let name = CString::new(signal).map_err(|_| BridgeError::InvalidName(signal.to_string()))?;
        let closure = Box::new(Closure::<T, A, R> {
            func: Box::new(handler),
            context: self.context(),
            signal: name,
        });
        let signal_ptr = closure.signal.as_ptr();
        let data = Box::into_raw(closure) as *mut c_void;

        let mut err = Error::none();
        let id = unsafe {
            ffi::nsignal_connect(
                self.as_ptr(),
                signal_ptr,
                Some(marshal::<T, A, R>),
                data,
                Some(release_closure::<T, A, R>),
                err.as_out_ptr(),
            )
        };
        if !id.is_valid() {
            // the destroy notifier was never registered
            drop(unsafe { Box::from_raw(data as *mut Closure<T, A, R>) });
            return Err(if err.is_set() {
                err
            } else {
                BridgeError::Failed(format!("connecting to '{signal}' failed")).into()
            });
        }
        tracing::debug!(signal, id = id.0, "connected handler");
        Ok(SignalHandlerId(id))
    }

    /// Disconnect a handler. Its closure is dropped, or, if it is running,
    /// dropped as soon as it returns. Returns false if the handler was not
    /// connected.
    ///
    /// # Panics
    ///
    /// Panics on an unknown handler if the context was created with
    /// `strict_disconnect`.
    pub fn disconnect(&self, id: SignalHandlerId) -> bool {
        if unsafe { ffi::nsignal_disconnect(self.as_ptr(), id.0) } {
            tracing::debug!(id = id.0 .0, "disconnected handler");
            return true;
        }
        if self.context().options().strict_disconnect {
            panic!("handler {} is not connected", id.0 .0);
        }
        tracing::warn!(id = id.0 .0, "disconnecting a handler that is not connected");
        false
    }

    /// Number of handlers connected to this object.
    pub fn handler_count(&self) -> usize {
        unsafe { ffi::nsignal_handler_count(self.as_ptr()) }
    }

    /// Emit `signal` with `args`, returning the last handler's result.
    ///
    /// Fails if the object's type lacks the signal, if an argument cannot
    /// be passed to the native side, or with the error of the first handler
    /// that fails.
    pub fn emit(&self, signal: &str, args: &[Value]) -> Result<Value> {
        let name = CString::new(signal).map_err(|_| BridgeError::InvalidName(signal.to_string()))?;
        let native = NativeArgs::new(args)?;
        let mut ret = NValue::none();
        let mut err = Error::none();
        let ok = unsafe {
            ffi::nsignal_emit(
                self.as_ptr(),
                name.as_ptr(),
                native.as_ptr(),
                native.len(),
                &mut ret,
                err.as_out_ptr(),
            )
        };
        ffi::check_error(ok, err)?;
        Ok(unsafe { Value::from_native(&ret, &self.context()) })
    }
}
