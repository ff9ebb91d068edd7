//! # refcode
//!
//! A self-describing binary serialization engine for dynamically-typed
//! value graphs, with pluggable type handlers ("subprotocols") and
//! cycle-safe reference resolution.
//!
//! ## Overview
//!
//! refcode flattens arbitrarily nested, potentially cyclic object/array
//! graphs into a byte stream and reconstructs them faithfully, restoring
//! shared-identity (aliased) substructure and cyclic self-references. It
//! stays extensible to arbitrary user-defined types through a protocol
//! registry: each type tag is bound to an encode/decode pair, and the tag
//! travels on the wire as a compact 4-byte hash instead of the string.
//!
//! ### Key Features
//!
//! *   **Cycle safety:** composite bodies are deferred to a flat,
//!     id-addressed reference table written once at the root, so `a`
//!     containing `b` containing `a` encodes and decodes without infinite
//!     recursion.
//! *   **Identity preservation:** a substructure reachable through two
//!     paths round-trips as *one* shared object, not two equal copies.
//! *   **Pluggable subprotocols:** register byte-level codecs with
//!     [`Registry::sub`], or project-and-rebuild codecs with
//!     [`Registry::derive`] for types that round-trip through a plain
//!     data shape.
//! *   **Self-describing envelopes:** every value is prefixed with its
//!     tag hash, so a decoder needs nothing but a compatible registry.
//!
//! ## Usage
//!
//! ```rust
//! use refcode::{Registry, Value};
//!
//! let registry = Registry::new();
//!
//! let shared = Value::object([("x".to_string(), Value::from(1))]);
//! let root = Value::object([
//!     ("a".to_string(), shared.clone()),
//!     ("b".to_string(), Value::object([("c".to_string(), shared)])),
//! ]);
//!
//! let bytes = registry.serialize_value(&root)?;
//! let decoded = registry.deserialize_value(&bytes)?;
//! assert!(decoded.deep_eq(&root));
//! # Ok::<(), refcode::RefcodeError>(())
//! ```
//!
//! ## Concurrency
//!
//! Everything is single-threaded and synchronous: a serialize or
//! deserialize call is one unbroken computation on the calling thread.
//! A [`Registry`] is read-only during any single call; registering new
//! tags concurrently with in-flight calls is caller-managed (build the
//! registry once at startup, or lock externally). Contexts are never
//! shared across threads.
//!
//! ## Resource bounds
//!
//! Malformed input (e.g. a corrupt length prefix) fails decoding with a
//! [`RefcodeError::Corrupt`], but refcode performs no internal
//! resource-consumption guards beyond bounds-checked reads; callers
//! decoding untrusted bytes should bound input size up front.
//!
//! ### Safety and Error Handling
//!
//! * **No unsafe:** the crate contains no `unsafe` code.
//! * **No panics:** no `unwrap()` or `panic!()` on library paths
//!   (enforced by clippy lints).
//! * **Comprehensive errors:** every failure maps to a [`RefcodeError`].

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![warn(missing_docs)]

// --- PUBLIC API MODULES ---
pub mod classify;
pub mod context;
pub mod cursor;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod value;

// --- INTERNAL IMPLEMENTATION MODULES (Hidden from Docs) ---
#[doc(hidden)]
pub mod codec;

// --- RE-EXPORTS ---

pub use classify::{classify, tags};
pub use context::{DeserializeCtx, PendingSlot, RebuildFn, SerializeCtx};
pub use cursor::{ByteReader, ByteWriter};
pub use error::{RefcodeError, Result};
pub use protocol::ClosureProtocol;
pub use registry::{default_tag_hash, Registry, Subprotocol, TagHasher};
pub use value::{ArrayRef, ByteArray, ElemKind, ObjectRef, Tagged, Value};

/// Constants used throughout the library.
pub mod constants {
    /// Default growth increment of the writer's backing buffer.
    pub const DEFAULT_GROWTH_INCREMENT: usize = 256;
}
