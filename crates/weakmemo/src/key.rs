//! Argument values and key classification
//!
//! Every argument is routed into one of two storage classes: primitives are
//! keyed by value, objects and functions by allocation identity.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Shared, type-erased handle used for object and function arguments
pub type Handle = Arc<dyn Any + Send + Sync>;

/// Native function stored behind a [`Value::Function`] handle
pub struct NativeFunction(Box<dyn Fn(&[Value]) -> Value + Send + Sync>);

/// A dynamically typed call argument, receiver or result
#[derive(Clone)]
pub enum Value {
    /// Absent value
    Undefined,
    /// Explicit null
    Null,
    /// Boolean
    Bool(bool),
    /// Double-precision number
    Number(f64),
    /// Immutable string
    String(Arc<str>),
    /// Object, compared by identity
    Object(Handle),
    /// Function, compared by identity
    Function(Handle),
}

/// Storage class of a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyClass {
    /// Keyed by value equality
    Value,
    /// Keyed by identity, held weakly
    Reference,
}

/// Hashable form of a primitive value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum PrimitiveKey {
    Undefined,
    Null,
    Bool(bool),
    Number(u64),
    String(Arc<str>),
}

/// A classified key, ready for a branch table lookup
pub(crate) enum Key<'a> {
    Primitive(PrimitiveKey),
    Reference(&'a Handle),
}

/// Canonical bit pattern: every NaN collapses to one key, -0 to +0
fn number_bits(n: f64) -> u64 {
    if n.is_nan() {
        f64::NAN.to_bits()
    } else if n == 0.0 {
        0
    } else {
        n.to_bits()
    }
}

/// Address of the shared allocation behind a handle
pub(crate) fn identity(handle: &Handle) -> usize {
    Arc::as_ptr(handle) as *const () as usize
}

impl Value {
    /// Wrap any value as an object argument with a fresh identity
    pub fn object<T: Any + Send + Sync>(value: T) -> Self {
        Value::Object(Arc::new(value))
    }

    /// Wrap a closure as a function argument with a fresh identity
    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + Send + Sync + 'static,
    {
        Value::Function(Arc::new(NativeFunction(Box::new(f))))
    }

    /// Reuse an existing handle, keeping its identity
    pub fn from_handle(handle: Handle) -> Self {
        Value::Object(handle)
    }

    /// Route the value into its branch table
    ///
    /// This is the only place classification happens; calls and clears both
    /// go through it.
    pub(crate) fn key(&self) -> Key<'_> {
        match self {
            Value::Object(handle) | Value::Function(handle) => Key::Reference(handle),
            Value::Undefined => Key::Primitive(PrimitiveKey::Undefined),
            Value::Null => Key::Primitive(PrimitiveKey::Null),
            Value::Bool(b) => Key::Primitive(PrimitiveKey::Bool(*b)),
            Value::Number(n) => Key::Primitive(PrimitiveKey::Number(number_bits(*n))),
            Value::String(s) => Key::Primitive(PrimitiveKey::String(Arc::clone(s))),
        }
    }

    /// Storage class of this value as a key
    pub fn classify(&self) -> KeyClass {
        match self.key() {
            Key::Primitive(_) => KeyClass::Value,
            Key::Reference(_) => KeyClass::Reference,
        }
    }

    /// Check for the no-receiver state
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Shared handle of an object or function
    pub fn handle(&self) -> Option<&Handle> {
        match self {
            Value::Object(handle) | Value::Function(handle) => Some(handle),
            _ => None,
        }
    }

    /// Borrow the payload of an object or function
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.handle().and_then(|handle| handle.downcast_ref::<T>())
    }

    /// Invoke a function created with [`Value::function`]
    ///
    /// Returns `None` for anything that is not a native function.
    pub fn apply(&self, args: &[Value]) -> Option<Value> {
        match self {
            Value::Function(handle) => handle
                .downcast_ref::<NativeFunction>()
                .map(|native| (native.0)(args)),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    /// Key equality: SameValueZero for primitives, identity for references
    fn eq(&self, other: &Self) -> bool {
        match (self.key(), other.key()) {
            (Key::Primitive(a), Key::Primitive(b)) => a == b,
            (Key::Reference(a), Key::Reference(b)) => identity(a) == identity(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "Undefined"),
            Value::Null => write!(f, "Null"),
            Value::Bool(b) => write!(f, "Bool({})", b),
            Value::Number(n) => write!(f, "Number({})", n),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Object(handle) => write!(f, "Object({:#x})", identity(handle)),
            Value::Function(handle) => write!(f, "Function({:#x})", identity(handle)),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(Arc::from(s))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
