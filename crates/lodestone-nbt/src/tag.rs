use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use lodestone_common::{LodestoneError, Result};
use std::io::{self, Read, Write};
use std::ops::Index;

/// Wire discriminant of a tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TagType {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
}

impl TagType {
    pub fn from_u8(value: u8) -> Option<TagType> {
        match value {
            0 => Some(TagType::End),
            1 => Some(TagType::Byte),
            2 => Some(TagType::Short),
            3 => Some(TagType::Int),
            4 => Some(TagType::Long),
            5 => Some(TagType::Float),
            6 => Some(TagType::Double),
            7 => Some(TagType::ByteArray),
            8 => Some(TagType::String),
            9 => Some(TagType::List),
            10 => Some(TagType::Compound),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TagType::End => "End",
            TagType::Byte => "Byte",
            TagType::Short => "Short",
            TagType::Int => "Int",
            TagType::Long => "Long",
            TagType::Float => "Float",
            TagType::Double => "Double",
            TagType::ByteArray => "ByteArray",
            TagType::String => "String",
            TagType::List => "List",
            TagType::Compound => "Compound",
        }
    }
}

/// A homogeneous list. The element type is fixed while the list is
/// non-empty; an empty list adopts the type of the first pushed element.
#[derive(Debug, Clone, PartialEq)]
pub struct TagList {
    element_type: TagType,
    items: Vec<Tag>,
}

impl TagList {
    pub fn new(element_type: TagType) -> Self {
        TagList {
            element_type,
            items: Vec::new(),
        }
    }

    pub fn element_type(&self) -> TagType {
        self.element_type
    }

    pub fn push(&mut self, tag: Tag) -> Result<()> {
        let ty = tag.tag_type();
        if self.items.is_empty() {
            self.element_type = ty;
        } else if ty != self.element_type {
            return Err(LodestoneError::CastError {
                expected: self.element_type.name(),
                actual: ty.name(),
            });
        }
        self.items.push(tag);
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&Tag> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Tag> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Tag> {
        self.items.iter_mut()
    }
}

/// A name -> tag mapping. Entries keep insertion order so the encoder
/// round-trips byte-identically; equality ignores order.
#[derive(Debug, Clone, Default)]
pub struct TagCompound {
    entries: Vec<(String, Tag)>,
}

impl TagCompound {
    pub fn new() -> Self {
        TagCompound {
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.iter().any(|(n, _)| n == name)
    }

    pub fn get(&self, name: &str) -> Option<&Tag> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Tag> {
        self.entries
            .iter_mut()
            .find(|(n, _)| n == name)
            .map(|(_, t)| t)
    }

    /// Replaces in place when the name exists; appends otherwise. Returns
    /// the previous value. An End tag is never stored as an entry.
    pub fn insert(&mut self, name: impl Into<String>, tag: Tag) -> Option<Tag> {
        debug_assert!(!matches!(tag, Tag::End), "End is not a storable value");
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => Some(std::mem::replace(slot, tag)),
            None => {
                self.entries.push((name, tag));
                None
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Tag> {
        let pos = self.entries.iter().position(|(n, _)| n == name)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tag)> {
        self.entries.iter().map(|(n, t)| (n.as_str(), t))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }
}

impl PartialEq for TagCompound {
    fn eq(&self, other: &Self) -> bool {
        self.entries.len() == other.entries.len()
            && self
                .entries
                .iter()
                .all(|(n, t)| other.get(n) == Some(t))
    }
}

impl Index<&str> for TagCompound {
    type Output = Tag;

    fn index(&self, name: &str) -> &Tag {
        self.get(name)
            .unwrap_or_else(|| panic!("no tag named {:?} in compound", name))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Tag {
    End,
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    List(TagList),
    Compound(TagCompound),
}

impl Tag {
    pub fn tag_type(&self) -> TagType {
        match self {
            Tag::End => TagType::End,
            Tag::Byte(_) => TagType::Byte,
            Tag::Short(_) => TagType::Short,
            Tag::Int(_) => TagType::Int,
            Tag::Long(_) => TagType::Long,
            Tag::Float(_) => TagType::Float,
            Tag::Double(_) => TagType::Double,
            Tag::ByteArray(_) => TagType::ByteArray,
            Tag::String(_) => TagType::String,
            Tag::List(_) => TagType::List,
            Tag::Compound(_) => TagType::Compound,
        }
    }

    /// Whether this tag can stand in for `target`. Numeric tags widen
    /// along Byte -> Short -> Int -> Long and Float -> Double; everything
    /// else only matches itself.
    pub fn is_castable_to(&self, target: TagType) -> bool {
        let ty = self.tag_type();
        if ty == target {
            return true;
        }
        matches!(
            (ty, target),
            (TagType::Byte, TagType::Short)
                | (TagType::Byte, TagType::Int)
                | (TagType::Byte, TagType::Long)
                | (TagType::Short, TagType::Int)
                | (TagType::Short, TagType::Long)
                | (TagType::Int, TagType::Long)
                | (TagType::Float, TagType::Double)
        )
    }

    pub fn as_byte(&self) -> Option<i8> {
        match self {
            Tag::Byte(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_short(&self) -> Option<i16> {
        match self {
            Tag::Short(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Tag::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Tag::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f32> {
        match self {
            Tag::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Tag::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_byte_array(&self) -> Option<&[u8]> {
        match self {
            Tag::ByteArray(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Tag::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&TagList> {
        match self {
            Tag::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_list_mut(&mut self) -> Option<&mut TagList> {
        match self {
            Tag::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&TagCompound> {
        match self {
            Tag::Compound(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_compound_mut(&mut self) -> Option<&mut TagCompound> {
        match self {
            Tag::Compound(v) => Some(v),
            _ => None,
        }
    }

    /// Widening read: Byte or Short.
    pub fn to_short(&self) -> Option<i16> {
        match self {
            Tag::Byte(v) => Some(*v as i16),
            Tag::Short(v) => Some(*v),
            _ => None,
        }
    }

    /// Widening read: Byte, Short or Int.
    pub fn to_int(&self) -> Option<i32> {
        match self {
            Tag::Byte(v) => Some(*v as i32),
            Tag::Short(v) => Some(*v as i32),
            Tag::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Widening read: any integer tag.
    pub fn to_long(&self) -> Option<i64> {
        match self {
            Tag::Byte(v) => Some(*v as i64),
            Tag::Short(v) => Some(*v as i64),
            Tag::Int(v) => Some(*v as i64),
            Tag::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Widening read: Float or Double.
    pub fn to_double(&self) -> Option<f64> {
        match self {
            Tag::Float(v) => Some(*v as f64),
            Tag::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// Reads one named entry: type byte, name, payload. An End tag has
    /// neither name nor payload.
    pub fn read<R: Read>(reader: &mut R) -> Result<(String, Tag)> {
        let type_byte = reader.read_u8().map_err(read_err)?;
        let ty = TagType::from_u8(type_byte)
            .ok_or_else(|| LodestoneError::FormatError(format!("invalid tag type {}", type_byte)))?;
        if ty == TagType::End {
            return Ok((String::new(), Tag::End));
        }

        let name = read_string(reader)?;
        let tag = Tag::read_payload(reader, ty)?;
        Ok((name, tag))
    }

    pub(crate) fn read_payload<R: Read>(reader: &mut R, ty: TagType) -> Result<Tag> {
        match ty {
            TagType::End => Ok(Tag::End),
            TagType::Byte => Ok(Tag::Byte(reader.read_i8().map_err(read_err)?)),
            TagType::Short => Ok(Tag::Short(reader.read_i16::<BigEndian>().map_err(read_err)?)),
            TagType::Int => Ok(Tag::Int(reader.read_i32::<BigEndian>().map_err(read_err)?)),
            TagType::Long => Ok(Tag::Long(reader.read_i64::<BigEndian>().map_err(read_err)?)),
            TagType::Float => Ok(Tag::Float(reader.read_f32::<BigEndian>().map_err(read_err)?)),
            TagType::Double => Ok(Tag::Double(
                reader.read_f64::<BigEndian>().map_err(read_err)?,
            )),
            TagType::ByteArray => {
                let length = reader.read_i32::<BigEndian>().map_err(read_err)?;
                if length < 0 {
                    return Err(LodestoneError::FormatError(format!(
                        "negative byte array length {}",
                        length
                    )));
                }
                let mut bytes = vec![0u8; length as usize];
                reader.read_exact(&mut bytes).map_err(read_err)?;
                Ok(Tag::ByteArray(bytes))
            }
            TagType::String => Ok(Tag::String(read_string(reader)?)),
            TagType::List => {
                let elem_byte = reader.read_u8().map_err(read_err)?;
                let elem = TagType::from_u8(elem_byte).ok_or_else(|| {
                    LodestoneError::FormatError(format!("invalid list element type {}", elem_byte))
                })?;
                let length = reader.read_i32::<BigEndian>().map_err(read_err)?;
                if length < 0 {
                    return Err(LodestoneError::FormatError(format!(
                        "negative list length {}",
                        length
                    )));
                }
                let mut items = Vec::with_capacity(length as usize);
                for _ in 0..length {
                    items.push(Tag::read_payload(reader, elem)?);
                }
                Ok(Tag::List(TagList {
                    element_type: elem,
                    items,
                }))
            }
            TagType::Compound => {
                let mut compound = TagCompound::new();
                loop {
                    let (name, tag) = Tag::read(reader)?;
                    if let Tag::End = tag {
                        break;
                    }
                    compound.insert(name, tag);
                }
                Ok(Tag::Compound(compound))
            }
        }
    }

    /// Writes one named entry: type byte, name, payload.
    pub fn write<W: Write>(&self, writer: &mut W, name: &str) -> Result<()> {
        writer.write_u8(self.tag_type() as u8)?;

        if !matches!(self, Tag::End) {
            write_string(writer, name)?;
        }

        self.write_payload(writer)
    }

    pub(crate) fn write_payload<W: Write>(&self, writer: &mut W) -> Result<()> {
        match self {
            Tag::End => Ok(()),
            Tag::Byte(v) => Ok(writer.write_i8(*v)?),
            Tag::Short(v) => Ok(writer.write_i16::<BigEndian>(*v)?),
            Tag::Int(v) => Ok(writer.write_i32::<BigEndian>(*v)?),
            Tag::Long(v) => Ok(writer.write_i64::<BigEndian>(*v)?),
            Tag::Float(v) => Ok(writer.write_f32::<BigEndian>(*v)?),
            Tag::Double(v) => Ok(writer.write_f64::<BigEndian>(*v)?),
            Tag::ByteArray(v) => {
                if v.len() > i32::MAX as usize {
                    return Err(LodestoneError::FormatError(
                        "byte array too long to encode".to_string(),
                    ));
                }
                writer.write_i32::<BigEndian>(v.len() as i32)?;
                writer.write_all(v)?;
                Ok(())
            }
            Tag::String(v) => write_string(writer, v),
            Tag::List(list) => {
                writer.write_u8(list.element_type as u8)?;
                writer.write_i32::<BigEndian>(list.items.len() as i32)?;
                for tag in &list.items {
                    tag.write_payload(writer)?;
                }
                Ok(())
            }
            Tag::Compound(compound) => write_compound_payload(compound, writer),
        }
    }
}

pub(crate) fn write_compound_payload<W: Write>(
    compound: &TagCompound,
    writer: &mut W,
) -> Result<()> {
    for (name, tag) in compound.iter() {
        tag.write(writer, name)?;
    }
    Tag::End.write(writer, "")
}

/// 2-byte big-endian signed length, then Latin-1 bytes. A negative length
/// is malformed.
fn read_string<R: Read>(reader: &mut R) -> Result<String> {
    let length = reader.read_i16::<BigEndian>().map_err(read_err)?;
    if length < 0 {
        return Err(LodestoneError::FormatError(format!(
            "negative string length {}",
            length
        )));
    }
    let mut bytes = vec![0u8; length as usize];
    reader.read_exact(&mut bytes).map_err(read_err)?;
    Ok(bytes.iter().map(|&b| b as char).collect())
}

pub(crate) fn write_string<W: Write>(writer: &mut W, value: &str) -> Result<()> {
    let mut bytes = Vec::with_capacity(value.len());
    for c in value.chars() {
        let code = c as u32;
        if code > 0xFF {
            return Err(LodestoneError::FormatError(format!(
                "character {:?} is outside Latin-1",
                c
            )));
        }
        bytes.push(code as u8);
    }
    if bytes.len() > i16::MAX as usize {
        return Err(LodestoneError::FormatError(
            "string too long to encode".to_string(),
        ));
    }
    writer.write_i16::<BigEndian>(bytes.len() as i16)?;
    writer.write_all(&bytes)?;
    Ok(())
}

/// Running out of bytes mid-field is a malformed stream, not an IO fault.
fn read_err(err: io::Error) -> LodestoneError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        LodestoneError::FormatError("unexpected end of stream".to_string())
    } else {
        LodestoneError::IoError(err)
    }
}
