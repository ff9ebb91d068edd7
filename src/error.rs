//! Centralized error handling for refcode.
//!
//! Every failure in the library is surfaced through the [`RefcodeError`]
//! enum and the crate-wide [`Result`] alias. There are no panics on the
//! library paths (enforced by clippy lints at the crate root) and no
//! internal retry: a failure at any depth aborts the whole serialize or
//! deserialize call, and partially written buffers must be discarded.
//!
//! ## Error Categories
//!
//! - **Classification** ([`RefcodeError::UnsupportedType`],
//!   [`RefcodeError::UntaggedCustomType`]): the input value cannot be
//!   mapped to any subprotocol tag.
//! - **Registration** ([`RefcodeError::DuplicateTag`],
//!   [`RefcodeError::HashCollision`]): conflicts while building a
//!   [`Registry`](crate::Registry).
//! - **Dispatch** ([`RefcodeError::UnknownTag`],
//!   [`RefcodeError::UnknownTagHash`]): the tag (or its wire hash) is not
//!   registered; typically version skew between the encoding and decoding
//!   registries.
//! - **Input** ([`RefcodeError::DanglingReferenceId`],
//!   [`RefcodeError::Corrupt`]): truncated or malformed payload bytes.
//! - **Internal** ([`RefcodeError::UnresolvedReference`],
//!   [`RefcodeError::Internal`]): consistency checks that only fail on a
//!   codec bug; never caused by well-formed or even hostile input alone.
//!
//! ## Example
//!
//! ```rust
//! use refcode::{Registry, RefcodeError};
//!
//! let registry = Registry::new();
//! // Four zero bytes are a tag-hash envelope naming no registered tag.
//! let err = registry.deserialize_value(&[0, 0, 0, 0]).unwrap_err();
//! assert!(matches!(err, RefcodeError::UnknownTagHash(0)));
//! ```

use std::fmt;

/// A specialized `Result` type for refcode operations.
pub type Result<T> = std::result::Result<T, RefcodeError>;

/// The master error enum covering all failure domains in refcode.
///
/// All variants are fatal to the current call. The distinction that
/// matters to callers is *input* errors (anything up to and including
/// [`DanglingReferenceId`](Self::DanglingReferenceId) and
/// [`Corrupt`](Self::Corrupt)) versus *defects*
/// ([`UnresolvedReference`](Self::UnresolvedReference) and
/// [`Internal`](Self::Internal)), which indicate a bug in the codec or a
/// registered subprotocol and should be reported rather than handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefcodeError {
    /// The value is a host-runtime datum with no serialization meaning
    /// (e.g. a [`Value::Symbol`](crate::Value::Symbol)).
    UnsupportedType(String),

    /// A custom value lacking both a recognized built-in shape and an
    /// explicit embedded type tag.
    UntaggedCustomType(String),

    /// The tag is already registered and `force` was not requested.
    DuplicateTag(String),

    /// Two distinct tags map to the same wire hash. Rejected regardless
    /// of `force`, since the decoder could no longer distinguish them.
    HashCollision {
        /// The tag whose registration was rejected.
        tag: String,
        /// The previously registered tag owning the hash.
        existing: String,
        /// The colliding hash value.
        hash: u32,
    },

    /// Dispatch against a tag that is not registered.
    UnknownTag(String),

    /// The 4-byte wire hash names no registered tag.
    UnknownTagHash(u32),

    /// A reference placeholder's id has no corresponding table entry.
    /// Indicates truncated or corrupted input.
    DanglingReferenceId(u32),

    /// A reference placeholder survived the substitution pass. This is an
    /// internal-consistency failure: a substitution was never registered
    /// for some placeholder, which is a codec defect, not bad input.
    UnresolvedReference(u32),

    /// The payload bytes are truncated or structurally malformed.
    Corrupt(String),

    /// Logic error in the codec or a registered subprotocol. Should not
    /// occur in production; please report with a reproduction case.
    Internal(String),
}

impl fmt::Display for RefcodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedType(s) => write!(f, "unsupported type: {s}"),
            Self::UntaggedCustomType(s) => write!(f, "custom value without a type tag: {s}"),
            Self::DuplicateTag(tag) => write!(f, "tag already registered: {tag:?}"),
            Self::HashCollision { tag, existing, hash } => write!(
                f,
                "tag hash collision: {tag:?} and {existing:?} both hash to {hash:#010x}"
            ),
            Self::UnknownTag(tag) => write!(f, "no subprotocol registered for tag {tag:?}"),
            Self::UnknownTagHash(hash) => {
                write!(f, "no subprotocol registered for wire hash {hash:#010x}")
            }
            Self::DanglingReferenceId(id) => {
                write!(f, "reference id {id} has no reference-table entry")
            }
            Self::UnresolvedReference(id) => write!(
                f,
                "reference id {id} was never substituted (codec defect, please report)"
            ),
            Self::Corrupt(s) => write!(f, "corrupt payload: {s}"),
            Self::Internal(s) => write!(f, "internal logic error: {s}"),
        }
    }
}

impl std::error::Error for RefcodeError {}
