//! The object/array codec: reference-resolving encode and decode of
//! composite values.
//!
//! Two structurally different paths run depending on root-vs-nested
//! position. A nested composite writes its fields inline, but every
//! composite *field* is replaced by a [`Value::Ref`] placeholder; the
//! actual bodies are all deferred to a flat, id-addressed reference table
//! written exactly once, at the root of each top-level call. This
//! indirection is what makes cyclic and shared substructure encodable at
//! all: a naive depth-first encode of `a -> b -> a` could never finish
//! either object first.
//!
//! The table's entry count is unknowable until traversal completes
//! (serializing one body may discover further shared composites), so the
//! writer reserves the count and back-patches it via `tell`/`seek`.
//! Decoding mirrors this: placeholders found in decoded composites are
//! registered as pending substitutions, and once all table entries exist
//! they are overwritten in place with the real objects.
//!
//! Under a shared context, each payload flushes only the identities its
//! own traversal discovered; placeholders pointing at earlier payloads
//! resolve against the context's accumulated table instead.

use std::rc::Rc;

use crate::context::{DeserializeCtx, PendingSlot, SerializeCtx};
use crate::cursor::{wire_len, ByteReader, ByteWriter};
use crate::error::{RefcodeError, Result};
use crate::registry::Registry;
use crate::value::Value;

/// Encodes a composite (array or object) value.
///
/// Shared entry point of the `"array"` and `"object"` subprotocols; the
/// array-likeness is carried in the flags byte, not the tag.
pub fn encode_composite(
    registry: &Registry,
    ctx: &mut SerializeCtx,
    writer: &mut ByteWriter,
    value: &Value,
) -> Result<()> {
    // Root position means no reference table is being written in this
    // top-level call yet; a context shared across calls still gets one
    // table per payload.
    let is_root = !ctx.table_active();
    let is_array = matches!(value, Value::Array(_));
    if !is_array && !matches!(value, Value::Object(_)) {
        return Err(RefcodeError::Internal(format!(
            "composite codec invoked on {} value",
            value.kind_name()
        )));
    }
    let id = ctx.intern(value).ok_or_else(|| {
        RefcodeError::Internal(format!("{} value has no identity", value.kind_name()))
    })?;
    writer.write_flags(&[is_root, is_array])?;
    if is_root {
        ctx.set_table_active(true);
        let result = write_reference_table(registry, ctx, writer, id);
        ctx.set_table_active(false);
        result
    } else {
        write_inline_body(registry, ctx, writer, value)
    }
}

/// Flushes every unwritten identity into the flat reference table.
///
/// Serializing one entry may discover new identities and extend the
/// table, so this is not a fixed worklist: the loop keeps draining ids
/// upward until none remain unwritten, then back-patches the count.
/// Ids below the context's flushed watermark were carried by an earlier
/// payload's table; a root that was itself already flushed is re-sent as
/// a single reference entry so the decoder can still name it.
fn write_reference_table(
    registry: &Registry,
    ctx: &mut SerializeCtx,
    writer: &mut ByteWriter,
    root_id: u32,
) -> Result<()> {
    let count_pos = writer.tell();
    writer.write_u32(0);
    let start = ctx.flushed() as u32;
    let mut entries: u32 = 0;
    if root_id < start {
        writer.write_u32(root_id);
        registry.serialize_into(ctx, writer, &Value::Ref(root_id))?;
        entries += 1;
    }
    let mut next = start;
    while (next as usize) < ctx.len() {
        writer.write_u32(next);
        let value = ctx
            .pinned(next)
            .ok_or_else(|| RefcodeError::Internal(format!("identity {next} not pinned")))?
            .clone();
        registry.serialize_into(ctx, writer, &value)?;
        next += 1;
        entries += 1;
    }
    ctx.set_flushed(next as usize);
    writer.patch_u32(count_pos, entries)
}

fn write_inline_body(
    registry: &Registry,
    ctx: &mut SerializeCtx,
    writer: &mut ByteWriter,
    value: &Value,
) -> Result<()> {
    match value {
        Value::Array(rc) => {
            let items = rc.borrow();
            writer.write_u32(wire_len(items.len())?);
            for item in items.iter() {
                let wire = ctx.ref_for(item);
                registry.serialize_into(ctx, writer, &wire)?;
            }
            Ok(())
        }
        Value::Object(rc) => {
            let entries = rc.borrow();
            // Symbol-valued entries are dropped from the wire; the count
            // must reflect only retained entries.
            let retained = entries
                .iter()
                .filter(|(_, v)| !matches!(v, Value::Symbol(_)))
                .count();
            writer.write_u32(wire_len(retained)?);
            for (key, entry) in entries.iter() {
                if matches!(entry, Value::Symbol(_)) {
                    continue;
                }
                writer.write_str(key)?;
                let wire = ctx.ref_for(entry);
                registry.serialize_into(ctx, writer, &wire)?;
            }
            Ok(())
        }
        other => Err(RefcodeError::Internal(format!(
            "inline body encode on {} value",
            other.kind_name()
        ))),
    }
}

/// Decodes a composite value, mirroring [`encode_composite`].
pub fn decode_composite(
    registry: &Registry,
    ctx: &mut DeserializeCtx,
    reader: &mut ByteReader<'_>,
) -> Result<Value> {
    let flags = reader.read_flags()?;
    let (is_root, is_array) = (flags[0], flags[1]);
    if is_root {
        read_reference_table(registry, ctx, reader)
    } else {
        read_inline_body(registry, ctx, reader, is_array)
    }
}

fn read_inline_body(
    registry: &Registry,
    ctx: &mut DeserializeCtx,
    reader: &mut ByteReader<'_>,
    is_array: bool,
) -> Result<Value> {
    let count = reader.read_u32()? as usize;
    if is_array {
        // Capacity bounded by remaining input, not the untrusted count.
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(registry.deserialize_from(ctx, reader)?);
        }
        let value = Value::array(items);
        if let Some(rc) = value.as_array() {
            for (index, item) in rc.borrow().iter().enumerate() {
                if let Value::Ref(id) = item {
                    ctx.push_pending(*id, PendingSlot::ArrayElem(Rc::clone(rc), index));
                }
            }
        }
        Ok(value)
    } else {
        let mut entries = indexmap::IndexMap::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let key = reader.read_str()?;
            let entry = registry.deserialize_from(ctx, reader)?;
            entries.insert(key, entry);
        }
        let value = Value::Object(Rc::new(std::cell::RefCell::new(entries)));
        if let Some(rc) = value.as_object() {
            for (key, entry) in rc.borrow().iter() {
                if let Value::Ref(id) = entry {
                    ctx.push_pending(*id, PendingSlot::ObjectEntry(Rc::clone(rc), key.clone()));
                }
            }
        }
        Ok(value)
    }
}

/// Reads the flat reference table and resolves every pending
/// substitution against the context's accumulated resolutions.
///
/// The payload's root is the first entry of its own table (id 0 for a
/// fresh context). An already-shared root arrives as a reference entry
/// pointing at an object an earlier payload produced. After substitution,
/// the reachable graph is audited for surviving placeholders, which
/// would indicate a codec defect.
fn read_reference_table(
    registry: &Registry,
    ctx: &mut DeserializeCtx,
    reader: &mut ByteReader<'_>,
) -> Result<Value> {
    let count = reader.read_u32()?;
    let mut first_id: Option<u32> = None;
    for _ in 0..count {
        let id = reader.read_u32()?;
        let entry = registry.deserialize_from(ctx, reader)?;
        if first_id.is_none() {
            first_id = Some(id);
        }
        match entry {
            Value::Ref(target) if target == id => {
                if ctx.resolved(id).is_none() {
                    return Err(RefcodeError::DanglingReferenceId(id));
                }
            }
            Value::Ref(target) => {
                return Err(RefcodeError::Corrupt(format!(
                    "reference table entry {id} points at foreign id {target}"
                )));
            }
            _ => {
                if ctx.insert_resolved(id, entry).is_some() {
                    return Err(RefcodeError::Corrupt(format!(
                        "duplicate reference id {id} in table"
                    )));
                }
            }
        }
    }
    for (id, slot) in ctx.take_pending() {
        let target = ctx
            .resolved(id)
            .ok_or(RefcodeError::DanglingReferenceId(id))?
            .clone();
        slot.fill(target)?;
    }
    let root_id = first_id
        .ok_or_else(|| RefcodeError::Corrupt("reference table has no entries".into()))?;
    let root = ctx
        .resolved(root_id)
        .ok_or_else(|| RefcodeError::Corrupt("reference table has no root entry".into()))?
        .clone();
    if let Some(id) = root.find_placeholder() {
        return Err(RefcodeError::UnresolvedReference(id));
    }
    Ok(root)
}
