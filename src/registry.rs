//! The subprotocol registry and generic dispatch.
//!
//! A [`Registry`] maps each string type tag to a [`Subprotocol`] (an
//! encode/decode pair behind dynamic dispatch) together with a compact
//! numeric hash of the tag used on the wire instead of the variable-length
//! string. The reverse hash index resolves incoming payloads back to their
//! tag.
//!
//! Registries are built incrementally (see the builder methods in
//! [`protocol`](crate::protocol)) and are read-only during any single
//! serialize or deserialize call. Registering new tags concurrently with
//! in-flight calls is not synchronized internally; callers that mutate a
//! shared registry after startup must provide their own locking.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hasher;

use twox_hash::XxHash32;

use crate::classify::classify;
use crate::context::{DeserializeCtx, SerializeCtx};
use crate::cursor::{ByteReader, ByteWriter};
use crate::error::{RefcodeError, Result};
use crate::value::Value;

/// The tag-hashing function: maps a tag string to its 4-byte wire hash.
///
/// Pluggable per registry; both sides of a wire exchange must agree on it.
pub type TagHasher = fn(&str) -> u32;

/// The default tag hasher: XXH32 with seed 0 over the tag's UTF-8 bytes.
pub fn default_tag_hash(tag: &str) -> u32 {
    let mut hasher = XxHash32::with_seed(0);
    hasher.write(tag.as_bytes());
    hasher.finish() as u32
}

/// An (encode, decode) function pair bound to one type tag.
///
/// Implementations may be *primitive* (no recursion), *composite*
/// (recurse into nested values through [`Registry::serialize_into`] /
/// [`Registry::deserialize_from`]), or *derived* (project to plain data
/// and rebuild, see [`Registry::derive`](crate::Registry::derive)).
pub trait Subprotocol: fmt::Debug {
    /// Writes `value`'s payload bytes (the tag-hash envelope has already
    /// been written by the dispatcher).
    fn encode(
        &self,
        registry: &Registry,
        ctx: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()>;

    /// Reads one payload back into a value.
    fn decode(
        &self,
        registry: &Registry,
        ctx: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value>;
}

#[derive(Debug)]
struct Entry {
    hash: u32,
    proto: Box<dyn Subprotocol>,
}

/// Mapping from type tags to subprotocols, plus the reverse hash index.
#[derive(Debug)]
pub struct Registry {
    by_tag: HashMap<String, Entry>,
    by_hash: HashMap<u32, String>,
    hasher: TagHasher,
}

impl Registry {
    /// Creates a registry with all built-in subprotocols and the default
    /// tag hasher.
    pub fn new() -> Self {
        let mut registry = Self::with_hasher(default_tag_hash);
        registry.install_defaults_unchecked();
        registry
    }

    /// Creates an empty registry with a custom tag hasher.
    ///
    /// No built-ins are installed; call
    /// [`install_defaults`](Self::install_defaults) to add them (which may
    /// now fail, since a degenerate hasher can make built-in tags collide).
    pub fn with_hasher(hasher: TagHasher) -> Self {
        Self {
            by_tag: HashMap::new(),
            by_hash: HashMap::new(),
            hasher,
        }
    }

    /// Registers a subprotocol for `tag`.
    ///
    /// Fails with [`RefcodeError::DuplicateTag`] if the tag is already
    /// registered and `force` is false. Fails with
    /// [`RefcodeError::HashCollision`] if the tag's hash is already owned
    /// by a *different* tag, regardless of `force`.
    pub fn register(
        &mut self,
        tag: &str,
        proto: Box<dyn Subprotocol>,
        force: bool,
    ) -> Result<()> {
        if self.by_tag.contains_key(tag) && !force {
            return Err(RefcodeError::DuplicateTag(tag.to_string()));
        }
        let hash = (self.hasher)(tag);
        if let Some(existing) = self.by_hash.get(&hash) {
            if existing != tag {
                return Err(RefcodeError::HashCollision {
                    tag: tag.to_string(),
                    existing: existing.clone(),
                    hash,
                });
            }
        }
        self.by_tag.insert(tag.to_string(), Entry { hash, proto });
        self.by_hash.insert(hash, tag.to_string());
        Ok(())
    }

    /// Unconditional insertion, bypassing the duplicate and collision
    /// checks. Only for tag sets already known to be conflict-free.
    pub(crate) fn insert(&mut self, tag: &str, proto: Box<dyn Subprotocol>) {
        let hash = (self.hasher)(tag);
        self.by_tag.insert(tag.to_string(), Entry { hash, proto });
        self.by_hash.insert(hash, tag.to_string());
    }

    /// True if `tag` has a registered subprotocol.
    pub fn contains_tag(&self, tag: &str) -> bool {
        self.by_tag.contains_key(tag)
    }

    /// The wire hash this registry assigns to `tag`.
    pub fn hash_for(&self, tag: &str) -> u32 {
        (self.hasher)(tag)
    }

    /// The tag owning `hash`, if any.
    pub fn tag_for_hash(&self, hash: u32) -> Option<&str> {
        self.by_hash.get(&hash).map(String::as_str)
    }

    /// Serializes `value` into a fresh byte buffer.
    ///
    /// Writes the top-level envelope: 4-byte tag hash, then the tag's
    /// payload. A fresh [`SerializeCtx`] is used and discarded.
    pub fn serialize_value(&self, value: &Value) -> Result<Vec<u8>> {
        let mut ctx = SerializeCtx::new();
        self.serialize_with(&mut ctx, value)
    }

    /// Serializes `value` using a caller-supplied context.
    ///
    /// Sharing one context across *sequential* calls deduplicates
    /// references across the payloads; the decoding side must mirror the
    /// same sharing. Sharing across concurrent calls is not supported.
    pub fn serialize_with(&self, ctx: &mut SerializeCtx, value: &Value) -> Result<Vec<u8>> {
        let mut writer = ByteWriter::new();
        self.serialize_into(ctx, &mut writer, value)?;
        Ok(writer.finish())
    }

    /// The generic serialize entry point used by composite and derived
    /// subprotocols to recurse into nested values.
    pub fn serialize_into(
        &self,
        ctx: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        let tag = classify(value)?;
        let entry = self
            .by_tag
            .get(tag)
            .ok_or_else(|| RefcodeError::UnknownTag(tag.to_string()))?;
        writer.write_u32(entry.hash);
        entry.proto.encode(self, ctx, writer, value)
    }

    /// Deserializes a value from `bytes`.
    ///
    /// The whole input must be consumed, every reference placeholder must
    /// resolve, and a fresh [`DeserializeCtx`] is used and discarded.
    pub fn deserialize_value(&self, bytes: &[u8]) -> Result<Value> {
        let mut ctx = DeserializeCtx::new();
        let mut reader = ByteReader::new(bytes);
        let value = self.deserialize_from(&mut ctx, &mut reader)?;
        if let Some(id) = ctx.first_pending_id() {
            // A pending substitution outside any reference table means the
            // payload carried a nested composite with no root to resolve it.
            return Err(RefcodeError::DanglingReferenceId(id));
        }
        if let Some(id) = value.find_placeholder() {
            return Err(RefcodeError::Corrupt(format!(
                "reference placeholder {id} outside a reference table"
            )));
        }
        if reader.remaining() > 0 {
            return Err(RefcodeError::Corrupt(format!(
                "{} trailing bytes after payload",
                reader.remaining()
            )));
        }
        Ok(value)
    }

    /// Deserializes one value using a caller-supplied context and reader,
    /// mirroring [`serialize_with`](Self::serialize_with).
    ///
    /// The context accumulates every reference id it resolves, so a
    /// later payload may point into objects an earlier one produced.
    /// Unlike [`deserialize_value`](Self::deserialize_value), this does
    /// not audit for unconsumed input; the reader is left positioned
    /// after the payload and the caller owns any end-of-stream check.
    pub fn deserialize_with(
        &self,
        ctx: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        self.deserialize_from(ctx, reader)
    }

    /// The generic deserialize entry point used by composite and derived
    /// subprotocols: reads the 4-byte tag hash, resolves the tag through
    /// the hash index, and dispatches its decoder.
    pub fn deserialize_from(
        &self,
        ctx: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        let hash = reader.read_u32()?;
        let tag = self
            .by_hash
            .get(&hash)
            .ok_or(RefcodeError::UnknownTagHash(hash))?;
        let entry = self
            .by_tag
            .get(tag)
            .ok_or_else(|| RefcodeError::Internal("hash index out of sync".into()))?;
        entry.proto.decode(self, ctx, reader)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
