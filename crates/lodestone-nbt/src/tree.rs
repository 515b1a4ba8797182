use byteorder::WriteBytesExt;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use lodestone_common::{LodestoneError, Result};
use std::io::{Read, Write};

use crate::tag::{write_compound_payload, write_string, Tag, TagCompound, TagType};

/// A rooted document: a single named compound entry. The root name is
/// conventionally empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    name: String,
    root: TagCompound,
}

impl Tree {
    pub fn new(root: TagCompound) -> Self {
        Tree {
            name: String::new(),
            root,
        }
    }

    pub fn with_name(name: impl Into<String>, root: TagCompound) -> Self {
        Tree {
            name: name.into(),
            root,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root(&self) -> &TagCompound {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut TagCompound {
        &mut self.root
    }

    pub fn into_root(self) -> TagCompound {
        self.root
    }

    pub fn read<R: Read>(reader: &mut R) -> Result<Self> {
        let (name, tag) = Tag::read(reader)?;
        match tag {
            Tag::Compound(root) => Ok(Tree { name, root }),
            other => Err(LodestoneError::FormatError(format!(
                "root tag is not a compound (found {})",
                other.tag_type().name()
            ))),
        }
    }

    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u8(TagType::Compound as u8)?;
        write_string(writer, &self.name)?;
        write_compound_payload(&self.root, writer)
    }

    pub fn read_gzip<R: Read>(reader: &mut R) -> Result<Self> {
        let mut decoder = GzDecoder::new(reader);
        Self::read(&mut decoder)
    }

    pub fn write_gzip<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mut encoder = GzEncoder::new(writer, Compression::default());
        self.write(&mut encoder)?;
        encoder.finish()?;
        Ok(())
    }

    /// Loose-file open: try gzip first, fall back to the raw codec.
    pub fn read_auto<R: Read>(reader: &mut R) -> Result<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;

        let mut inflated = Vec::new();
        match GzDecoder::new(&raw[..]).read_to_end(&mut inflated) {
            Ok(_) => Self::read(&mut &inflated[..]),
            Err(_) => Self::read(&mut &raw[..]),
        }
    }
}
