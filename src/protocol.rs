//! Built-in subprotocols and the protocol builder API.
//!
//! The builder methods on [`Registry`] let callers extend the codec to
//! arbitrary user types:
//!
//! - [`Registry::sub`] registers fully custom byte-level encode/decode
//!   closures, for layout- or performance-sensitive types.
//! - [`Registry::derive`] registers a *derived* subprotocol: a `filter`
//!   projecting the value to a plain-data shape, and a `rebuild`
//!   reconstructing the typed value from that shape on decode. The
//!   projection is serialized through the generic dispatcher, so its
//!   nested fields get full reference-resolution treatment.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::classify::tags;
use crate::codec::{decode_composite, encode_composite};
use crate::context::{DeserializeCtx, PendingSlot, RebuildFn, SerializeCtx};
use crate::cursor::{wire_len, ByteReader, ByteWriter};
use crate::error::{RefcodeError, Result};
use crate::registry::{Registry, Subprotocol};
use crate::value::{ByteArray, ElemKind, Tagged, Value};

fn type_mismatch(expected: &str, value: &Value) -> RefcodeError {
    RefcodeError::Internal(format!(
        "{expected} subprotocol dispatched on {} value",
        value.kind_name()
    ))
}

#[derive(Debug)]
struct UndefProto;

impl Subprotocol for UndefProto {
    fn encode(
        &self,
        _: &Registry,
        _: &mut SerializeCtx,
        _: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Undefined => Ok(()),
            other => Err(type_mismatch("undef", other)),
        }
    }

    fn decode(
        &self,
        _: &Registry,
        _: &mut DeserializeCtx,
        _: &mut ByteReader<'_>,
    ) -> Result<Value> {
        Ok(Value::Undefined)
    }
}

#[derive(Debug)]
struct NullProto;

impl Subprotocol for NullProto {
    fn encode(
        &self,
        _: &Registry,
        _: &mut SerializeCtx,
        _: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            other => Err(type_mismatch("null", other)),
        }
    }

    fn decode(
        &self,
        _: &Registry,
        _: &mut DeserializeCtx,
        _: &mut ByteReader<'_>,
    ) -> Result<Value> {
        Ok(Value::Null)
    }
}

#[derive(Debug)]
struct BoolProto;

impl Subprotocol for BoolProto {
    fn encode(
        &self,
        _: &Registry,
        _: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Bool(b) => {
                writer.write_byte(u8::from(*b));
                Ok(())
            }
            other => Err(type_mismatch("bool", other)),
        }
    }

    fn decode(
        &self,
        _: &Registry,
        _: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        Ok(Value::Bool(reader.read_byte()? != 0))
    }
}

#[derive(Debug)]
struct NumberProto;

impl Subprotocol for NumberProto {
    fn encode(
        &self,
        _: &Registry,
        _: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Number(n) => {
                writer.write_f64(*n);
                Ok(())
            }
            other => Err(type_mismatch("number", other)),
        }
    }

    fn decode(
        &self,
        _: &Registry,
        _: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        Ok(Value::Number(reader.read_f64()?))
    }
}

#[derive(Debug)]
struct BigIntProto;

impl Subprotocol for BigIntProto {
    fn encode(
        &self,
        _: &Registry,
        _: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::BigInt(b) => writer.write_bigint(b),
            other => Err(type_mismatch("bigint", other)),
        }
    }

    fn decode(
        &self,
        _: &Registry,
        _: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        Ok(Value::BigInt(reader.read_bigint()?))
    }
}

#[derive(Debug)]
struct StringProto;

impl Subprotocol for StringProto {
    fn encode(
        &self,
        _: &Registry,
        _: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Str(s) => writer.write_str(s),
            other => Err(type_mismatch("string", other)),
        }
    }

    fn decode(
        &self,
        _: &Registry,
        _: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        Ok(Value::Str(reader.read_str()?))
    }
}

#[derive(Debug)]
struct BytesProto;

impl Subprotocol for BytesProto {
    fn encode(
        &self,
        _: &Registry,
        _: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Bytes(b) => {
                writer.write_byte(b.kind.as_wire());
                writer.write_u32(wire_len(b.data.len())?);
                writer.write_bytes(&b.data);
                Ok(())
            }
            other => Err(type_mismatch("bytes", other)),
        }
    }

    fn decode(
        &self,
        _: &Registry,
        _: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        let kind = ElemKind::from_wire(reader.read_byte()?)?;
        let len = reader.read_u32()? as usize;
        let data = reader.read_bytes(len)?.to_vec();
        Ok(Value::Bytes(Rc::new(ByteArray { kind, data })))
    }
}

#[derive(Debug)]
struct ReferenceProto;

impl Subprotocol for ReferenceProto {
    fn encode(
        &self,
        _: &Registry,
        _: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        match value {
            Value::Ref(id) => {
                writer.write_u32(*id);
                Ok(())
            }
            other => Err(type_mismatch("reference", other)),
        }
    }

    fn decode(
        &self,
        _: &Registry,
        _: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        Ok(Value::Ref(reader.read_u32()?))
    }
}

/// Backs both the `"array"` and `"object"` tags; array-likeness travels
/// in the composite flags byte.
#[derive(Debug)]
struct CompositeProto;

impl Subprotocol for CompositeProto {
    fn encode(
        &self,
        registry: &Registry,
        ctx: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        encode_composite(registry, ctx, writer, value)
    }

    fn decode(
        &self,
        registry: &Registry,
        ctx: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        decode_composite(registry, ctx, reader)
    }
}

/// A [`Subprotocol`] built from a pair of closures.
///
/// Useful with [`Registry::register`] directly when `force` semantics are
/// needed; [`Registry::sub`] is the fluent non-forcing form.
pub struct ClosureProtocol {
    encode: EncodeFn,
    decode: DecodeFn,
}

type EncodeFn =
    Box<dyn Fn(&Registry, &mut SerializeCtx, &mut ByteWriter, &Value) -> Result<()>>;
type DecodeFn =
    Box<dyn Fn(&Registry, &mut DeserializeCtx, &mut ByteReader<'_>) -> Result<Value>>;

impl ClosureProtocol {
    /// Wraps an encode/decode closure pair.
    pub fn new<E, D>(encode: E, decode: D) -> Self
    where
        E: Fn(&Registry, &mut SerializeCtx, &mut ByteWriter, &Value) -> Result<()> + 'static,
        D: Fn(&Registry, &mut DeserializeCtx, &mut ByteReader<'_>) -> Result<Value> + 'static,
    {
        Self {
            encode: Box::new(encode),
            decode: Box::new(decode),
        }
    }
}

impl fmt::Debug for ClosureProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClosureProtocol").finish_non_exhaustive()
    }
}

impl Subprotocol for ClosureProtocol {
    fn encode(
        &self,
        registry: &Registry,
        ctx: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        (self.encode)(registry, ctx, writer, value)
    }

    fn decode(
        &self,
        registry: &Registry,
        ctx: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        (self.decode)(registry, ctx, reader)
    }
}

type FilterFn = Box<dyn Fn(&Value) -> Result<Value>>;

struct DerivedProtocol {
    tag: String,
    filter: FilterFn,
    rebuild: Rc<RebuildFn>,
}

impl fmt::Debug for DerivedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedProtocol")
            .field("tag", &self.tag)
            .finish_non_exhaustive()
    }
}

impl Subprotocol for DerivedProtocol {
    fn encode(
        &self,
        registry: &Registry,
        ctx: &mut SerializeCtx,
        writer: &mut ByteWriter,
        value: &Value,
    ) -> Result<()> {
        let projection = (self.filter)(value)?;
        // In nested position a composite projection must become a table
        // reference: writing its body inline here would duplicate it if
        // the same object is reachable elsewhere in the graph, splitting
        // one identity into two on decode. At the root the projection
        // serializes directly and carries the table itself.
        let wire = if ctx.table_active() {
            ctx.ref_for(&projection)
        } else {
            projection
        };
        registry.serialize_into(ctx, writer, &wire)
    }

    fn decode(
        &self,
        registry: &Registry,
        ctx: &mut DeserializeCtx,
        reader: &mut ByteReader<'_>,
    ) -> Result<Value> {
        let projection = registry.deserialize_from(ctx, reader)?;
        if let Value::Ref(id) = projection {
            // The projection's body lives in the reference table. Embed a
            // wrapper now and rebuild once the table resolves the id.
            let cell = Rc::new(Tagged {
                tag: Some(self.tag.clone()),
                state: RefCell::new(Value::Ref(id)),
            });
            ctx.push_pending(
                id,
                PendingSlot::TaggedState {
                    cell: Rc::clone(&cell),
                    rebuild: Rc::clone(&self.rebuild),
                },
            );
            return Ok(Value::Tagged(cell));
        }
        (self.rebuild)(projection)
    }
}

fn builtins() -> Vec<(&'static str, Box<dyn Subprotocol>)> {
    vec![
        (tags::UNDEF, Box::new(UndefProto) as Box<dyn Subprotocol>),
        (tags::NULL, Box::new(NullProto)),
        (tags::BOOL, Box::new(BoolProto)),
        (tags::NUMBER, Box::new(NumberProto)),
        (tags::BIGINT, Box::new(BigIntProto)),
        (tags::STRING, Box::new(StringProto)),
        (tags::BYTES, Box::new(BytesProto)),
        (tags::ARRAY, Box::new(CompositeProto)),
        (tags::OBJECT, Box::new(CompositeProto)),
        (tags::REFERENCE, Box::new(ReferenceProto)),
    ]
}

impl Registry {
    /// Registers all built-in subprotocols.
    ///
    /// A custom hasher can make two built-in tags collide, which fails
    /// like any other registration.
    pub fn install_defaults(&mut self) -> Result<()> {
        for (tag, proto) in builtins() {
            self.register(tag, proto, false)?;
        }
        Ok(())
    }

    /// Built-in installation under the default hasher, whose fixed tag
    /// set is known collision-free.
    pub(crate) fn install_defaults_unchecked(&mut self) {
        for (tag, proto) in builtins() {
            self.insert(tag, proto);
        }
    }

    /// Registers fully custom byte-level encode/decode logic for `tag`.
    ///
    /// The escape hatch for layout-sensitive types; most callers want
    /// [`derive`](Self::derive) instead.
    pub fn sub<E, D>(&mut self, tag: &str, encode: E, decode: D) -> Result<&mut Self>
    where
        E: Fn(&Registry, &mut SerializeCtx, &mut ByteWriter, &Value) -> Result<()> + 'static,
        D: Fn(&Registry, &mut DeserializeCtx, &mut ByteReader<'_>) -> Result<Value> + 'static,
    {
        self.register(tag, Box::new(ClosureProtocol::new(encode, decode)), false)?;
        Ok(self)
    }

    /// Registers a derived subprotocol for `tag`.
    ///
    /// `filter` projects the value to a plain-data shape which is then
    /// serialized through the generic dispatcher (so shared and cyclic
    /// substructure inside the projection is resolved as usual);
    /// `rebuild` reconstructs the typed value from the decoded shape.
    ///
    /// A composite projection nested inside a larger graph travels
    /// through the reference table, and `rebuild` then runs only after
    /// the projection resolves; its result is adopted into the wrapper
    /// already embedded in the graph. A rebuilt tagged value contributes
    /// its state, any other rebuilt value becomes the state directly.
    pub fn derive<F, R>(&mut self, tag: &str, filter: F, rebuild: R) -> Result<&mut Self>
    where
        F: Fn(&Value) -> Result<Value> + 'static,
        R: Fn(Value) -> Result<Value> + 'static,
    {
        self.register(
            tag,
            Box::new(DerivedProtocol {
                tag: tag.to_owned(),
                filter: Box::new(filter),
                rebuild: Rc::new(rebuild),
            }),
            false,
        )?;
        Ok(self)
    }
}
