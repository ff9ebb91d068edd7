//! The type classifier: maps a runtime [`Value`] to its subprotocol tag.

use crate::error::{RefcodeError, Result};
use crate::value::Value;

/// Built-in subprotocol tag names.
pub mod tags {
    /// Absence of a value.
    pub const UNDEF: &str = "undef";
    /// Explicit null.
    pub const NULL: &str = "null";
    /// Boolean.
    pub const BOOL: &str = "bool";
    /// 64-bit float number.
    pub const NUMBER: &str = "number";
    /// Arbitrary-magnitude integer.
    pub const BIGINT: &str = "bigint";
    /// UTF-8 string.
    pub const STRING: &str = "string";
    /// Binary blob / fixed-width numeric array.
    pub const BYTES: &str = "bytes";
    /// Ordered sequence.
    pub const ARRAY: &str = "array";
    /// String-keyed mapping.
    pub const OBJECT: &str = "object";
    /// Reference placeholder.
    pub const REFERENCE: &str = "reference";
}

/// Determines which subprotocol tag applies to `value`.
///
/// Resolution order, first match wins:
/// 1. absence / null
/// 2. primitive kinds (bool, number, bigint, string)
/// 3. explicit embedded type tag on the value
/// 4. recognized binary container
/// 5. array-like sequence
/// 6. plain key/value mapping
///
/// Symbols fail with [`RefcodeError::UnsupportedType`]; custom values
/// lacking a tag fail with [`RefcodeError::UntaggedCustomType`].
pub fn classify(value: &Value) -> Result<&str> {
    match value {
        Value::Undefined => Ok(tags::UNDEF),
        Value::Null => Ok(tags::NULL),
        Value::Bool(_) => Ok(tags::BOOL),
        Value::Number(_) => Ok(tags::NUMBER),
        Value::BigInt(_) => Ok(tags::BIGINT),
        Value::Str(_) => Ok(tags::STRING),
        Value::Tagged(t) => match &t.tag {
            Some(tag) => Ok(tag.as_str()),
            None => Err(RefcodeError::UntaggedCustomType(
                "custom value carries no embedded type tag".into(),
            )),
        },
        Value::Bytes(_) => Ok(tags::BYTES),
        Value::Array(_) => Ok(tags::ARRAY),
        Value::Object(_) => Ok(tags::OBJECT),
        Value::Ref(_) => Ok(tags::REFERENCE),
        Value::Symbol(name) => Err(RefcodeError::UnsupportedType(format!(
            "symbol {name:?} has no serialization meaning"
        ))),
    }
}
