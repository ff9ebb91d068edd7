//! The dynamic value model.
//!
//! [`Value`] is the runtime datum the codec serializes: primitives, binary
//! blobs, fixed-width numeric arrays, and composite sequences/mappings.
//! Composites (`Array`, `Object`) are `Rc<RefCell<_>>` handles, so cloning
//! a `Value` is shallow and identity-preserving: two clones of the same
//! array observe each other's mutations, and the codec deduplicates them
//! by `Rc` pointer identity on the wire.
//!
//! Because composites are reference-counted, a decoded cyclic graph holds
//! an `Rc` cycle and will not be freed until the caller breaks the cycle
//! (e.g. by clearing one of the participating containers).

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;
use num_bigint::BigInt;

use crate::error::{RefcodeError, Result};

/// Shared handle to an ordered sequence of values.
pub type ArrayRef = Rc<RefCell<Vec<Value>>>;

/// Shared handle to an insertion-ordered string-keyed mapping.
pub type ObjectRef = Rc<RefCell<IndexMap<String, Value>>>;

/// Element type of a fixed-width numeric array or raw blob.
///
/// Discriminants are the wire ids; id 0 is reserved/invalid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElemKind {
    /// Unsigned 8-bit elements (also plain byte blobs).
    U8 = 1,
    /// Signed 8-bit elements.
    I8 = 2,
    /// Unsigned 16-bit elements.
    U16 = 3,
    /// Signed 16-bit elements.
    I16 = 4,
    /// Unsigned 32-bit elements.
    U32 = 5,
    /// Signed 32-bit elements.
    I32 = 6,
    /// Unsigned 64-bit elements.
    U64 = 7,
    /// Signed 64-bit elements.
    I64 = 8,
    /// 32-bit float elements.
    F32 = 9,
    /// 64-bit float elements.
    F64 = 10,
}

impl ElemKind {
    /// Decodes a wire element-type id.
    pub fn from_wire(id: u8) -> Result<Self> {
        Ok(match id {
            1 => Self::U8,
            2 => Self::I8,
            3 => Self::U16,
            4 => Self::I16,
            5 => Self::U32,
            6 => Self::I32,
            7 => Self::U64,
            8 => Self::I64,
            9 => Self::F32,
            10 => Self::F64,
            other => {
                return Err(RefcodeError::Corrupt(format!(
                    "invalid element kind id {other}"
                )))
            }
        })
    }

    /// The wire id of this element kind.
    pub fn as_wire(self) -> u8 {
        self as u8
    }

    /// Size of one element in bytes.
    pub fn elem_size(self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16 | Self::I16 => 2,
            Self::U32 | Self::I32 | Self::F32 => 4,
            Self::U64 | Self::I64 | Self::F64 => 8,
        }
    }
}

/// A binary blob or fixed-width numeric array: raw bytes plus the element
/// kind they are to be viewed as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByteArray {
    /// Element type of the array.
    pub kind: ElemKind,
    /// Raw little-endian element bytes.
    pub data: Vec<u8>,
}

impl ByteArray {
    /// Number of whole elements in the array.
    pub fn len_elems(&self) -> usize {
        self.data.len() / self.kind.elem_size()
    }
}

/// A value carrying an explicit embedded type tag.
///
/// `tag: Some(..)` names the subprotocol that serializes the value
/// (classifier rule 3); `tag: None` models an opaque custom value the
/// classifier rejects with `UntaggedCustomType`.
#[derive(Debug)]
pub struct Tagged {
    /// The subprotocol tag, if any.
    pub tag: Option<String>,
    /// The wrapped state.
    pub state: RefCell<Value>,
}

/// A runtime value the codec can (attempt to) serialize.
#[derive(Debug, Clone)]
pub enum Value {
    /// Absence of a value (`undefined`).
    Undefined,
    /// An explicit null.
    Null,
    /// A boolean.
    Bool(bool),
    /// A 64-bit float number.
    Number(f64),
    /// An arbitrary-magnitude integer.
    BigInt(BigInt),
    /// A UTF-8 string.
    Str(String),
    /// A binary blob or fixed-width numeric array.
    Bytes(Rc<ByteArray>),
    /// An ordered sequence with shared identity.
    Array(ArrayRef),
    /// An insertion-ordered mapping with shared identity.
    Object(ObjectRef),
    /// A value carrying an explicit embedded type tag.
    Tagged(Rc<Tagged>),
    /// A host-runtime identifier with no serialization meaning.
    ///
    /// Symbols fail classification with `UnsupportedType`; as mapping
    /// entry values they are silently skipped instead.
    Symbol(Rc<str>),
    /// A reference placeholder standing in for the composite at
    /// identity-slot `id`. Never observable after a successful decode.
    Ref(u32),
}

impl Value {
    /// Builds an array value from its elements.
    pub fn array(items: Vec<Value>) -> Value {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    /// Builds an object value from key/value entries, preserving order.
    pub fn object<I>(entries: I) -> Value
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        Value::Object(Rc::new(RefCell::new(entries.into_iter().collect())))
    }

    /// Builds an empty object value.
    pub fn empty_object() -> Value {
        Value::Object(Rc::new(RefCell::new(IndexMap::new())))
    }

    /// Builds a string value.
    pub fn str(s: impl Into<String>) -> Value {
        Value::Str(s.into())
    }

    /// Builds a binary value from an element kind and raw bytes.
    pub fn bytes(kind: ElemKind, data: Vec<u8>) -> Value {
        Value::Bytes(Rc::new(ByteArray { kind, data }))
    }

    /// Builds a plain byte blob (element kind `U8`).
    pub fn blob(data: Vec<u8>) -> Value {
        Value::bytes(ElemKind::U8, data)
    }

    /// Builds a custom value with an explicit type tag.
    pub fn tagged(tag: impl Into<String>, state: Value) -> Value {
        Value::Tagged(Rc::new(Tagged {
            tag: Some(tag.into()),
            state: RefCell::new(state),
        }))
    }

    /// Builds an opaque custom value without a type tag.
    ///
    /// Serializing it fails with `UntaggedCustomType`.
    pub fn custom_untagged(state: Value) -> Value {
        Value::Tagged(Rc::new(Tagged {
            tag: None,
            state: RefCell::new(state),
        }))
    }

    /// Builds a symbol value.
    pub fn symbol(name: impl Into<String>) -> Value {
        Value::Symbol(Rc::from(name.into().into_boxed_str()))
    }

    /// Returns the boolean payload, if any.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Returns the number payload, if any.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Returns the string payload, if any.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the big-integer payload, if any.
    pub fn as_bigint(&self) -> Option<&BigInt> {
        match self {
            Value::BigInt(b) => Some(b),
            _ => None,
        }
    }

    /// Returns the array handle, if this is an array.
    pub fn as_array(&self) -> Option<&ArrayRef> {
        match self {
            Value::Array(rc) => Some(rc),
            _ => None,
        }
    }

    /// Returns the object handle, if this is an object.
    pub fn as_object(&self) -> Option<&ObjectRef> {
        match self {
            Value::Object(rc) => Some(rc),
            _ => None,
        }
    }

    /// Returns the byte-array payload, if any.
    pub fn as_bytes(&self) -> Option<&ByteArray> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    /// True for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// True for `Value::Undefined`.
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// True for a reference placeholder.
    pub fn is_ref(&self) -> bool {
        matches!(self, Value::Ref(_))
    }

    /// A short human-readable name of the value's kind, for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::BigInt(_) => "bigint",
            Value::Str(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Tagged(_) => "tagged",
            Value::Symbol(_) => "symbol",
            Value::Ref(_) => "reference",
        }
    }

    /// Identity address for composite values, used for wire-level
    /// deduplication. Non-composites have no identity.
    pub(crate) fn identity(&self) -> Option<*const ()> {
        match self {
            Value::Array(rc) => Some(Rc::as_ptr(rc).cast()),
            Value::Object(rc) => Some(Rc::as_ptr(rc).cast()),
            _ => None,
        }
    }

    /// Walks the reachable graph and returns the id of the first
    /// [`Value::Ref`] placeholder encountered, if any.
    ///
    /// A successful decode guarantees this returns `None` for the result.
    pub fn find_placeholder(&self) -> Option<u32> {
        let mut visited = HashSet::new();
        find_placeholder_inner(self, &mut visited)
    }

    /// Structural equality that tolerates shared and cyclic substructure.
    ///
    /// A derived `PartialEq` would recurse forever on cycles; this walk
    /// keys visited pairs by pointer identity instead. Numbers compare by
    /// bit pattern or numeric equality, so NaN equals NaN.
    pub fn deep_eq(&self, other: &Value) -> bool {
        let mut seen = HashSet::new();
        deep_eq_inner(self, other, &mut seen)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Number(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<BigInt> for Value {
    fn from(v: BigInt) -> Self {
        Value::BigInt(v)
    }
}

fn find_placeholder_inner(value: &Value, visited: &mut HashSet<usize>) -> Option<u32> {
    match value {
        Value::Ref(id) => Some(*id),
        Value::Array(rc) => {
            if !visited.insert(Rc::as_ptr(rc) as usize) {
                return None;
            }
            rc.borrow()
                .iter()
                .find_map(|item| find_placeholder_inner(item, visited))
        }
        Value::Object(rc) => {
            if !visited.insert(Rc::as_ptr(rc) as usize) {
                return None;
            }
            rc.borrow()
                .values()
                .find_map(|item| find_placeholder_inner(item, visited))
        }
        Value::Tagged(rc) => {
            if !visited.insert(Rc::as_ptr(rc) as usize) {
                return None;
            }
            find_placeholder_inner(&rc.state.borrow(), visited)
        }
        _ => None,
    }
}

fn deep_eq_inner(a: &Value, b: &Value, seen: &mut HashSet<(usize, usize)>) -> bool {
    match (a, b) {
        (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x.to_bits() == y.to_bits() || x == y,
        (Value::BigInt(x), Value::BigInt(y)) => x == y,
        (Value::Str(x), Value::Str(y)) => x == y,
        (Value::Bytes(x), Value::Bytes(y)) => x == y,
        (Value::Symbol(x), Value::Symbol(y)) => x == y,
        (Value::Ref(x), Value::Ref(y)) => x == y,
        (Value::Array(x), Value::Array(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let key = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if !seen.insert(key) {
                // Revisiting a pair mid-comparison means both sides cycle
                // at the same positions; treat as equal here.
                return true;
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            xs.len() == ys.len()
                && xs
                    .iter()
                    .zip(ys.iter())
                    .all(|(xi, yi)| deep_eq_inner(xi, yi, seen))
        }
        (Value::Object(x), Value::Object(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let key = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if !seen.insert(key) {
                return true;
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            xs.len() == ys.len()
                && xs.iter().all(|(k, xv)| {
                    ys.get(k)
                        .map(|yv| deep_eq_inner(xv, yv, seen))
                        .unwrap_or(false)
                })
        }
        (Value::Tagged(x), Value::Tagged(y)) => {
            if Rc::ptr_eq(x, y) {
                return true;
            }
            let key = (Rc::as_ptr(x) as usize, Rc::as_ptr(y) as usize);
            if !seen.insert(key) {
                return true;
            }
            x.tag == y.tag && deep_eq_inner(&x.state.borrow(), &y.state.borrow(), seen)
        }
        _ => false,
    }
}
