//! Dynamic value model
//!
//! Observed state is a tree of [`Value`]s. Primitives are stored inline;
//! containers ([`Object`], [`Array`]) are shared handles, so cloning a
//! `Value` that holds a container never copies the container itself.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::array::Array;
use crate::object::Object;
use crate::observer::Observer;

/// A dynamically typed value that can live inside observed state
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// A key-value container
    Object(Object),
    /// An indexable sequence
    Array(Array),
    /// A host object that is not a plain container (class instances,
    /// render output, handles). Never observed.
    Opaque(Rc<dyn Any>),
}

impl Value {
    /// Wrap an arbitrary host value
    pub fn opaque<T: Any>(value: T) -> Self {
        Value::Opaque(Rc::new(value))
    }

    /// `undefined`, `null`, booleans, numbers and strings
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined | Value::Null | Value::Bool(_) | Value::Number(_) | Value::String(_)
        )
    }

    pub fn is_nullish(&self) -> bool {
        matches!(self, Value::Undefined | Value::Null)
    }

    /// Plain key-value container or indexable sequence
    pub fn is_container(&self) -> bool {
        matches!(self, Value::Object(_) | Value::Array(_))
    }

    /// Any non-primitive value, including opaque host objects
    pub fn is_object_like(&self) -> bool {
        !self.is_primitive()
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, Value::Number(n) if n.is_nan())
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn downcast_opaque<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(inner) => inner.downcast_ref::<T>(),
            _ => None,
        }
    }

    /// The observer attached to this container, if it has been observed
    pub fn observer(&self) -> Option<Observer> {
        match self {
            Value::Object(obj) => obj.observer(),
            Value::Array(arr) => arr.observer(),
            _ => None,
        }
    }

    /// Short type label used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Object(_) => "object",
            Value::Array(_) => "array",
            Value::Opaque(_) => "opaque",
        }
    }

    /// String coercion with the same rules the default array sort uses.
    ///
    /// Nested reads go through the raw storage and never register
    /// dependencies.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Undefined => "undefined".to_string(),
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => number_to_string(*n),
            Value::String(s) => s.to_string(),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Array(arr) => arr
                .raw_items()
                .iter()
                .map(|item| {
                    if item.is_nullish() {
                        String::new()
                    } else {
                        item.to_display_string()
                    }
                })
                .collect::<Vec<_>>()
                .join(","),
            Value::Opaque(_) => "[object Opaque]".to_string(),
        }
    }
}

fn number_to_string(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let label = if n > 0.0 { "Infinity" } else { "-Infinity" };
        label.to_string()
    } else if n == 0.0 {
        "0".to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e21 {
        format!("{n:.0}")
    } else {
        format!("{n}")
    }
}

/// Strict equality: primitives by value, containers by identity
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Opaque(a), Value::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("Undefined"),
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => write!(f, "Bool({b})"),
            Value::Number(n) => write!(f, "Number({n})"),
            Value::String(s) => write!(f, "String({s:?})"),
            Value::Object(obj) => obj.fmt(f),
            Value::Array(arr) => arr.fmt(f),
            Value::Opaque(_) => f.write_str("Opaque"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value as f64)
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Number(value as f64)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Rc::from(value))
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Undefined
    }
}

/// Key used by the `set` / `del` helpers
///
/// Names that spell a canonical non-negative integer (`"3"`, not `"03"` or
/// `"+3"`) are valid array indices.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Name(String),
    Index(usize),
}

/// Array indices are below 2^32 - 1; larger integers are plain names
pub const MAX_ARRAY_INDEX: usize = u32::MAX as usize - 1;

impl PropertyKey {
    /// The array index this key spells, if it is a canonical integer no
    /// larger than [`MAX_ARRAY_INDEX`]
    pub fn as_index(&self) -> Option<usize> {
        let index = match self {
            PropertyKey::Index(i) => *i,
            PropertyKey::Name(name) => name
                .parse::<usize>()
                .ok()
                .filter(|i| i.to_string() == *name)?,
        };
        (index <= MAX_ARRAY_INDEX).then_some(index)
    }

    pub fn to_name(&self) -> String {
        match self {
            PropertyKey::Name(name) => name.clone(),
            PropertyKey::Index(i) => i.to_string(),
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyKey::Name(name) => f.write_str(name),
            PropertyKey::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(value: &str) -> Self {
        PropertyKey::Name(value.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(value: String) -> Self {
        PropertyKey::Name(value)
    }
}

impl From<usize> for PropertyKey {
    fn from(value: usize) -> Self {
        PropertyKey::Index(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strict_equality() {
        assert_eq!(Value::from(1), Value::from(1.0));
        assert_eq!(Value::from(0.0), Value::from(-0.0));
        assert_ne!(Value::from(f64::NAN), Value::from(f64::NAN));
        assert_eq!(Value::from("a"), Value::from("a".to_string()));
        assert_ne!(Value::Null, Value::Undefined);

        let a = Object::new();
        let b = Object::new();
        assert_eq!(Value::from(a.clone()), Value::from(a));
        assert_ne!(Value::from(Object::new()), Value::from(b));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(Value::from(3).to_display_string(), "3");
        assert_eq!(Value::from(2.5).to_display_string(), "2.5");
        assert_eq!(Value::from(f64::NAN).to_display_string(), "NaN");
        assert_eq!(Value::from(-0.0).to_display_string(), "0");
        assert_eq!(Value::Null.to_display_string(), "null");

        let arr = Array::from_values([Value::from(1), Value::Null, Value::from("x")]);
        assert_eq!(Value::from(arr).to_display_string(), "1,,x");
    }

    #[test]
    fn test_property_key_index() {
        assert_eq!(PropertyKey::from(4).as_index(), Some(4));
        assert_eq!(PropertyKey::from("12").as_index(), Some(12));
        assert_eq!(PropertyKey::from("012").as_index(), None);
        assert_eq!(PropertyKey::from("-1").as_index(), None);
        assert_eq!(PropertyKey::from("name").as_index(), None);
        assert_eq!(
            PropertyKey::from("4294967294").as_index(),
            Some(MAX_ARRAY_INDEX)
        );
        assert_eq!(PropertyKey::from("4294967295").as_index(), None);
        assert_eq!(PropertyKey::from(usize::MAX).as_index(), None);
    }

    #[test]
    fn test_opaque_is_not_container() {
        struct Node;
        let v = Value::opaque(Node);
        assert!(v.is_object_like());
        assert!(!v.is_container());
        assert!(v.downcast_opaque::<Node>().is_some());
    }
}
