use std::any::TypeId;

use tempest_wire::{FrameReader, FrameWriter};

use crate::context::{Deserializable, PolyValue, SerializeContext, Serializable};
use crate::error::{SerializeError, SerializeResult};

/// Writes a polymorphic field: a nullability bool, then (if present) a
/// packed `u16` header `(type_id << 1) | 1` followed by the value's body.
/// `value` must have been registered on this connection's [`SerializeContext`]
/// via [`SerializeContext::register`] before the first call.
pub fn write_polymorphic(
    value: Option<&dyn PolyValue>,
    ctx: &SerializeContext,
    writer: &mut FrameWriter,
) -> SerializeResult<()> {
    match value {
        None => {
            writer.write_bool(false);
            Ok(())
        }
        Some(value) => {
            writer.write_bool(true);
            let addr = std::ptr::addr_of!(*value) as *const () as usize;
            ctx.enter(addr)?;
            let concrete = value.concrete_type_id();
            let id = ctx.poly_id_for(concrete);
            let header = (u32::from(id) << 1) | 1;
            writer.write_u16(header as u16);
            let result = value.write_body(ctx, writer);
            ctx.exit(addr);
            result
        }
    }
}

/// Reads a polymorphic field written by [`write_polymorphic`].
pub fn read_polymorphic(
    ctx: &SerializeContext,
    reader: &mut FrameReader<'_>,
) -> SerializeResult<Option<Box<dyn PolyValue>>> {
    if !reader.read_bool()? {
        return Ok(None);
    }
    let header = reader.read_u16()?;
    if header == 0 {
        return Ok(None);
    }
    let id = (header >> 1) as u16;
    let type_id: TypeId = ctx.type_id_for_poly_id(id)?;
    let value = ctx
        .with_factory(type_id, |factory| factory(ctx, reader))
        .ok_or(SerializeError::UnknownTypeId(id))??;
    Ok(Some(value))
}

/// Writes a homogeneous array field: nullability bool, then (if present) a
/// variable-length count followed by each element via its static-type
/// writer (no polymorphic header per element — the caller supplies the
/// writer function matching the element's static type).
pub fn write_array<T>(
    values: Option<&[T]>,
    ctx: &SerializeContext,
    writer: &mut FrameWriter,
    mut write_elem: impl FnMut(&T, &SerializeContext, &mut FrameWriter) -> SerializeResult<()>,
) -> SerializeResult<()> {
    match values {
        None => {
            writer.write_bool(false);
            Ok(())
        }
        Some(values) => {
            writer.write_bool(true);
            writer.write_var_u32(values.len() as u32);
            for value in values {
                write_elem(value, ctx, writer)?;
            }
            Ok(())
        }
    }
}

/// Reads an array field written by [`write_array`].
pub fn read_array<T>(
    ctx: &SerializeContext,
    reader: &mut FrameReader<'_>,
    mut read_elem: impl FnMut(&SerializeContext, &mut FrameReader<'_>) -> SerializeResult<T>,
) -> SerializeResult<Option<Vec<T>>> {
    if !reader.read_bool()? {
        return Ok(None);
    }
    let len = reader.read_var_u32()? as usize;
    let mut out = Vec::with_capacity(len.min(1 << 16));
    for _ in 0..len {
        out.push(read_elem(ctx, reader)?);
    }
    Ok(Some(out))
}

/// Writes a concrete (non-polymorphic) `Serializable` value directly, with
/// no nullability bool and no header — used for fields whose static type is
/// exactly the concrete type (the "skip header" recursion of spec.md §4.B
/// step 3).
pub fn write_concrete<T: Serializable>(
    value: &T,
    ctx: &SerializeContext,
    writer: &mut FrameWriter,
) -> SerializeResult<()> {
    value.write_body(ctx, writer)
}

/// Reads a concrete value written by [`write_concrete`].
pub fn read_concrete<T: Deserializable>(
    ctx: &SerializeContext,
    reader: &mut FrameReader<'_>,
) -> SerializeResult<T> {
    T::read_body(ctx, reader)
}

macro_rules! impl_primitive {
    ($ty:ty, $write:ident, $read:ident) => {
        impl Serializable for $ty {
            fn write_body(
                &self,
                _ctx: &SerializeContext,
                writer: &mut FrameWriter,
            ) -> SerializeResult<()> {
                writer.$write(*self);
                Ok(())
            }
        }

        impl Deserializable for $ty {
            fn read_body(
                _ctx: &SerializeContext,
                reader: &mut FrameReader<'_>,
            ) -> SerializeResult<Self> {
                Ok(reader.$read()?)
            }
        }
    };
}

impl_primitive!(bool, write_bool, read_bool);
impl_primitive!(u8, write_u8, read_u8);
impl_primitive!(i8, write_i8, read_i8);
impl_primitive!(u16, write_u16, read_u16);
impl_primitive!(i16, write_i16, read_i16);
impl_primitive!(u32, write_u32, read_u32);
impl_primitive!(i32, write_i32, read_i32);
impl_primitive!(u64, write_u64, read_u64);
impl_primitive!(i64, write_i64, read_i64);
impl_primitive!(f32, write_single, read_single);
impl_primitive!(f64, write_double, read_double);

/// Arrays get the dedicated treatment from spec.md §4.B step 2: a
/// nullability bool (always `true` here — a bare `Vec<T>` field is never
/// absent; wrap in `Option<Vec<T>>` for a field that can be null), then a
/// variable-length count, then each element via its own `write_body`.
impl<T: Serializable> Serializable for Vec<T> {
    fn write_body(&self, ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        writer.write_bool(true);
        writer.write_var_u32(self.len() as u32);
        for item in self {
            item.write_body(ctx, writer)?;
        }
        Ok(())
    }
}

impl<T: Deserializable> Deserializable for Vec<T> {
    fn read_body(ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<Self> {
        if !reader.read_bool()? {
            return Ok(Vec::new());
        }
        let len = reader.read_var_u32()? as usize;
        let mut out = Vec::with_capacity(len.min(1 << 16));
        for _ in 0..len {
            out.push(T::read_body(ctx, reader)?);
        }
        Ok(out)
    }
}

/// A field that may be absent: the nullability bool from spec.md §4.B step
/// 3, with the wrapped value's own body following when present. Used for
/// recursive struct fields (e.g. a tree node's optional child) rather than
/// the polymorphic path, since the static type is already known.
impl<T: Serializable> Serializable for Option<T> {
    fn write_body(&self, ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        match self {
            None => {
                writer.write_bool(false);
                Ok(())
            }
            Some(value) => {
                writer.write_bool(true);
                value.write_body(ctx, writer)
            }
        }
    }
}

impl<T: Deserializable> Deserializable for Option<T> {
    fn read_body(ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<Self> {
        if !reader.read_bool()? {
            return Ok(None);
        }
        Ok(Some(T::read_body(ctx, reader)?))
    }
}

/// A heap-allocated field forwards straight through to the pointee's body
/// with no header of its own — used to give recursive struct definitions
/// (e.g. `Option<Box<Node>>`) a finite size.
impl<T: Serializable> Serializable for Box<T> {
    fn write_body(&self, ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        (**self).write_body(ctx, writer)
    }
}

impl<T: Deserializable> Deserializable for Box<T> {
    fn read_body(ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<Self> {
        Ok(Box::new(T::read_body(ctx, reader)?))
    }
}

impl Serializable for String {
    fn write_body(&self, _ctx: &SerializeContext, writer: &mut FrameWriter) -> SerializeResult<()> {
        writer.write_string(Some(self));
        Ok(())
    }
}

impl Deserializable for String {
    fn read_body(_ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<Self> {
        reader
            .read_string()?
            .ok_or(SerializeError::Wire(tempest_wire::WireError::MalformedFrame(
                "expected non-null string body",
            )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq)]
    struct Point {
        x: i32,
        y: i32,
    }

    impl Serializable for Point {
        fn write_body(
            &self,
            ctx: &SerializeContext,
            writer: &mut FrameWriter,
        ) -> SerializeResult<()> {
            self.x.write_body(ctx, writer)?;
            self.y.write_body(ctx, writer)
        }
    }

    impl Deserializable for Point {
        fn read_body(ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<Self> {
            Ok(Point {
                x: i32::read_body(ctx, reader)?,
                y: i32::read_body(ctx, reader)?,
            })
        }
    }

    #[test]
    fn concrete_struct_round_trips() {
        let ctx = SerializeContext::new();
        let mut writer = FrameWriter::new();
        let point = Point { x: 3, y: -4 };
        write_concrete(&point, &ctx, &mut writer).unwrap();
        let bytes = writer.flush();
        let mut reader = FrameReader::new(&bytes);
        let back: Point = read_concrete(&ctx, &mut reader).unwrap();
        assert_eq!(back, point);
    }

    #[test]
    fn array_of_primitives_round_trips() {
        let ctx = SerializeContext::new();
        let mut writer = FrameWriter::new();
        let values = vec![3i32, 2, 1];
        write_array(Some(values.as_slice()), &ctx, &mut writer, |v, c, w| {
            v.write_body(c, w)
        })
        .unwrap();
        let bytes = writer.flush();
        let mut reader = FrameReader::new(&bytes);
        let back = read_array(&ctx, &mut reader, i32::read_body).unwrap();
        assert_eq!(back, Some(values));
    }

    #[derive(Debug)]
    struct Base {
        text: String,
        number: i32,
    }

    impl Serializable for Base {
        fn write_body(
            &self,
            ctx: &SerializeContext,
            writer: &mut FrameWriter,
        ) -> SerializeResult<()> {
            self.text.write_body(ctx, writer)?;
            self.number.write_body(ctx, writer)
        }
    }

    impl Deserializable for Base {
        fn read_body(ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<Self> {
            Ok(Base {
                text: String::read_body(ctx, reader)?,
                number: i32::read_body(ctx, reader)?,
            })
        }
    }

    #[derive(Debug)]
    struct Derived {
        text: String,
        extra: String,
        number: i32,
    }

    impl Serializable for Derived {
        fn write_body(
            &self,
            ctx: &SerializeContext,
            writer: &mut FrameWriter,
        ) -> SerializeResult<()> {
            self.text.write_body(ctx, writer)?;
            self.extra.write_body(ctx, writer)?;
            self.number.write_body(ctx, writer)
        }
    }

    impl Deserializable for Derived {
        fn read_body(ctx: &SerializeContext, reader: &mut FrameReader<'_>) -> SerializeResult<Self> {
            Ok(Derived {
                text: String::read_body(ctx, reader)?,
                extra: String::read_body(ctx, reader)?,
                number: i32::read_body(ctx, reader)?,
            })
        }
    }

    #[test]
    fn polymorphic_array_preserves_runtime_types() {
        let ctx = SerializeContext::new();
        ctx.register::<Base>();
        ctx.register::<Derived>();

        let values: Vec<Box<dyn PolyValue>> = vec![
            Box::new(Base {
                text: "t".into(),
                number: 5,
            }),
            Box::new(Derived {
                text: "t2".into(),
                extra: "e".into(),
                number: 42,
            }),
        ];

        let mut writer = FrameWriter::new();
        writer.write_bool(true);
        writer.write_var_u32(values.len() as u32);
        for value in &values {
            write_polymorphic(Some(value.as_ref()), &ctx, &mut writer).unwrap();
        }
        let bytes = writer.flush();

        let mut reader = FrameReader::new(&bytes);
        assert!(reader.read_bool().unwrap());
        let len = reader.read_var_u32().unwrap();
        let mut restored = Vec::new();
        for _ in 0..len {
            restored.push(read_polymorphic(&ctx, &mut reader).unwrap().unwrap());
        }

        let base = restored[0].as_any().downcast_ref::<Base>().unwrap();
        assert_eq!(base.text, "t");
        assert_eq!(base.number, 5);
        let derived = restored[1].as_any().downcast_ref::<Derived>().unwrap();
        assert_eq!(derived.text, "t2");
        assert_eq!(derived.extra, "e");
        assert_eq!(derived.number, 42);
    }

    #[derive(Debug, PartialEq, tempest_types_derive::Serializable)]
    struct Node {
        number: i32,
        text: String,
        numbers: Vec<i32>,
        private_set: bool,
        child: Option<Box<Node>>,
    }

    #[test]
    fn nested_object_round_trips() {
        let ctx = SerializeContext::new();
        let tree = Node {
            number: 1,
            text: "one".into(),
            numbers: Vec::new(),
            private_set: false,
            child: Some(Box::new(Node {
                number: 2,
                text: "two".into(),
                numbers: vec![3, 2, 1],
                private_set: false,
                child: Some(Box::new(Node {
                    number: 3,
                    text: "Three".into(),
                    numbers: Vec::new(),
                    private_set: true,
                    child: None,
                })),
            })),
        };

        let mut writer = FrameWriter::new();
        write_concrete(&tree, &ctx, &mut writer).unwrap();
        let bytes = writer.flush();
        let mut reader = FrameReader::new(&bytes);
        let back: Node = read_concrete(&ctx, &mut reader).unwrap();
        assert_eq!(back, tree);
    }
}
