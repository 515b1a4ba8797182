use crate::tag::{Tag, TagCompound, TagList, TagType};

/// Per-node verification options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaOptions {
    /// A missing tag is not a failure.
    pub optional: bool,
    /// A missing tag is synthesized from the node's default.
    pub create_on_missing: bool,
}

impl SchemaOptions {
    pub const NONE: SchemaOptions = SchemaOptions {
        optional: false,
        create_on_missing: false,
    };
    pub const OPTIONAL: SchemaOptions = SchemaOptions {
        optional: true,
        create_on_missing: false,
    };
    pub const CREATE_ON_MISSING: SchemaOptions = SchemaOptions {
        optional: false,
        create_on_missing: true,
    };
}

/// An expected shape for one tag in a tree.
#[derive(Debug, Clone)]
pub enum SchemaNode {
    Scalar {
        name: String,
        ty: TagType,
        opts: SchemaOptions,
    },
    String {
        name: String,
        /// Exact required value when set.
        value: Option<String>,
        /// Maximum length; 0 means unconstrained.
        max_len: usize,
        opts: SchemaOptions,
    },
    Array {
        name: String,
        /// Exact required length; 0 means unconstrained.
        length: usize,
        opts: SchemaOptions,
    },
    List {
        name: String,
        element_type: TagType,
        /// Schema applied to every element when set.
        item: Option<Box<SchemaNode>>,
        opts: SchemaOptions,
    },
    Compound {
        name: String,
        children: Vec<SchemaNode>,
        opts: SchemaOptions,
    },
}

impl SchemaNode {
    pub fn scalar(name: &str, ty: TagType) -> Self {
        SchemaNode::Scalar {
            name: name.to_string(),
            ty,
            opts: SchemaOptions::NONE,
        }
    }

    pub fn scalar_opts(name: &str, ty: TagType, opts: SchemaOptions) -> Self {
        SchemaNode::Scalar {
            name: name.to_string(),
            ty,
            opts,
        }
    }

    pub fn array(name: &str, length: usize) -> Self {
        SchemaNode::Array {
            name: name.to_string(),
            length,
            opts: SchemaOptions::NONE,
        }
    }

    pub fn array_opts(name: &str, length: usize, opts: SchemaOptions) -> Self {
        SchemaNode::Array {
            name: name.to_string(),
            length,
            opts,
        }
    }

    pub fn list(name: &str, element_type: TagType) -> Self {
        SchemaNode::List {
            name: name.to_string(),
            element_type,
            item: None,
            opts: SchemaOptions::NONE,
        }
    }

    pub fn list_opts(name: &str, element_type: TagType, opts: SchemaOptions) -> Self {
        SchemaNode::List {
            name: name.to_string(),
            element_type,
            item: None,
            opts,
        }
    }

    pub fn compound(name: &str, children: Vec<SchemaNode>) -> Self {
        SchemaNode::Compound {
            name: name.to_string(),
            children,
            opts: SchemaOptions::NONE,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SchemaNode::Scalar { name, .. }
            | SchemaNode::String { name, .. }
            | SchemaNode::Array { name, .. }
            | SchemaNode::List { name, .. }
            | SchemaNode::Compound { name, .. } => name,
        }
    }

    pub fn options(&self) -> SchemaOptions {
        match self {
            SchemaNode::Scalar { opts, .. }
            | SchemaNode::String { opts, .. }
            | SchemaNode::Array { opts, .. }
            | SchemaNode::List { opts, .. }
            | SchemaNode::Compound { opts, .. } => *opts,
        }
    }

    /// The tag synthesized for a CREATE_ON_MISSING repair.
    pub fn default_tag(&self) -> Tag {
        match self {
            SchemaNode::Scalar { ty, .. } => match ty {
                TagType::Byte => Tag::Byte(0),
                TagType::Short => Tag::Short(0),
                TagType::Int => Tag::Int(0),
                TagType::Long => Tag::Long(0),
                TagType::Float => Tag::Float(0.0),
                TagType::Double => Tag::Double(0.0),
                _ => Tag::Byte(0),
            },
            SchemaNode::String { value, .. } => {
                Tag::String(value.clone().unwrap_or_default())
            }
            SchemaNode::Array { length, .. } => Tag::ByteArray(vec![0; *length]),
            SchemaNode::List { element_type, .. } => Tag::List(TagList::new(*element_type)),
            SchemaNode::Compound { children, .. } => {
                let mut compound = TagCompound::new();
                for child in children {
                    compound.insert(child.name(), child.default_tag());
                }
                Tag::Compound(compound)
            }
        }
    }
}

/// Receives verification failures. Verification itself never aborts.
pub trait VerifySink {
    fn missing_tag(&mut self, name: &str);
    fn invalid_tag_type(&mut self, name: &str, expected: TagType, actual: TagType);
    fn invalid_tag_value(&mut self, name: &str);
}

/// Discards every report.
pub struct NullSink;

impl VerifySink for NullSink {
    fn missing_tag(&mut self, _name: &str) {}
    fn invalid_tag_type(&mut self, _name: &str, _expected: TagType, _actual: TagType) {}
    fn invalid_tag_value(&mut self, _name: &str) {}
}

impl SchemaNode {
    /// Checks `tag` against this schema, repairing CREATE_ON_MISSING
    /// children in place. Returns whether the tree passed.
    pub fn verify(&self, tag: &mut Tag, sink: &mut dyn VerifySink) -> bool {
        match self {
            SchemaNode::Scalar { name, ty, .. } => {
                if !tag.is_castable_to(*ty) {
                    sink.invalid_tag_type(name, *ty, tag.tag_type());
                    return false;
                }
                true
            }
            SchemaNode::String {
                name,
                value,
                max_len,
                ..
            } => {
                let actual = tag.tag_type();
                let Some(s) = tag.as_string() else {
                    sink.invalid_tag_type(name, TagType::String, actual);
                    return false;
                };
                if *max_len > 0 && s.len() > *max_len {
                    sink.invalid_tag_value(name);
                    return false;
                }
                if let Some(expected) = value {
                    if s != expected {
                        sink.invalid_tag_value(name);
                        return false;
                    }
                }
                true
            }
            SchemaNode::Array { name, length, .. } => {
                let actual = tag.tag_type();
                let Some(bytes) = tag.as_byte_array() else {
                    sink.invalid_tag_type(name, TagType::ByteArray, actual);
                    return false;
                };
                if *length > 0 && bytes.len() != *length {
                    sink.invalid_tag_value(name);
                    return false;
                }
                true
            }
            SchemaNode::List {
                name,
                element_type,
                item,
                ..
            } => {
                let actual = tag.tag_type();
                let Some(list) = tag.as_list_mut() else {
                    sink.invalid_tag_type(name, TagType::List, actual);
                    return false;
                };
                if !list.is_empty() && list.element_type() != *element_type {
                    sink.invalid_tag_type(name, *element_type, list.element_type());
                    return false;
                }
                let mut pass = true;
                if let Some(item_schema) = item {
                    for element in list.iter_mut() {
                        pass &= item_schema.verify(element, sink);
                    }
                }
                pass
            }
            SchemaNode::Compound { name, children, .. } => {
                let actual = tag.tag_type();
                let Some(compound) = tag.as_compound_mut() else {
                    sink.invalid_tag_type(name, TagType::Compound, actual);
                    return false;
                };
                let mut pass = true;
                for child in children {
                    match compound.get_mut(child.name()) {
                        Some(child_tag) => {
                            pass &= child.verify(child_tag, sink);
                        }
                        None => {
                            let opts = child.options();
                            if opts.create_on_missing {
                                compound.insert(child.name(), child.default_tag());
                            } else if !opts.optional {
                                sink.missing_tag(child.name());
                                pass = false;
                            }
                        }
                    }
                }
                pass
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct RecordingSink {
        missing: Vec<String>,
        bad_type: Vec<String>,
        bad_value: Vec<String>,
    }

    impl VerifySink for RecordingSink {
        fn missing_tag(&mut self, name: &str) {
            self.missing.push(name.to_string());
        }
        fn invalid_tag_type(&mut self, name: &str, _expected: TagType, _actual: TagType) {
            self.bad_type.push(name.to_string());
        }
        fn invalid_tag_value(&mut self, name: &str) {
            self.bad_value.push(name.to_string());
        }
    }

    fn sample_schema() -> SchemaNode {
        SchemaNode::compound(
            "",
            vec![
                SchemaNode::scalar("xPos", TagType::Int),
                SchemaNode::array("Blocks", 4),
                SchemaNode::scalar_opts("LastUpdate", TagType::Long, SchemaOptions::CREATE_ON_MISSING),
                SchemaNode::scalar_opts("Extra", TagType::Byte, SchemaOptions::OPTIONAL),
            ],
        )
    }

    #[test]
    fn test_verify_pass_with_widening() {
        let mut compound = TagCompound::new();
        // Byte widens to the Int scalar.
        compound.insert("xPos", Tag::Byte(3));
        compound.insert("Blocks", Tag::ByteArray(vec![0; 4]));
        compound.insert("LastUpdate", Tag::Long(9));
        let mut tag = Tag::Compound(compound);

        let mut sink = RecordingSink::default();
        assert!(sample_schema().verify(&mut tag, &mut sink));
        assert!(sink.missing.is_empty());
    }

    #[test]
    fn test_verify_reports_all_three_classes() {
        let mut compound = TagCompound::new();
        compound.insert("xPos", Tag::String("three".to_string()));
        compound.insert("Blocks", Tag::ByteArray(vec![0; 2]));
        let mut schema_children = match sample_schema() {
            SchemaNode::Compound { children, .. } => children,
            _ => unreachable!(),
        };
        schema_children.push(SchemaNode::scalar("yPos", TagType::Int));
        let schema = SchemaNode::compound("", schema_children);
        let mut tag = Tag::Compound(compound);

        let mut sink = RecordingSink::default();
        assert!(!schema.verify(&mut tag, &mut sink));
        assert_eq!(sink.bad_type, vec!["xPos"]);
        assert_eq!(sink.bad_value, vec!["Blocks"]);
        assert_eq!(sink.missing, vec!["yPos"]);
    }

    #[test]
    fn test_create_on_missing_repairs() {
        let mut compound = TagCompound::new();
        compound.insert("xPos", Tag::Int(1));
        compound.insert("Blocks", Tag::ByteArray(vec![0; 4]));
        let mut tag = Tag::Compound(compound);

        let mut sink = RecordingSink::default();
        assert!(sample_schema().verify(&mut tag, &mut sink));
        assert_eq!(
            tag.as_compound().unwrap().get("LastUpdate"),
            Some(&Tag::Long(0))
        );
        assert!(sink.missing.is_empty());
    }

    #[test]
    fn test_list_element_schema() {
        let mut list = TagList::new(TagType::Compound);
        let mut good = TagCompound::new();
        good.insert("id", Tag::String("a".to_string()));
        list.push(Tag::Compound(good)).unwrap();
        let bad = TagCompound::new();
        list.push(Tag::Compound(bad)).unwrap();

        let schema = SchemaNode::List {
            name: "Entities".to_string(),
            element_type: TagType::Compound,
            item: Some(Box::new(SchemaNode::compound(
                "",
                vec![SchemaNode::scalar("id", TagType::String)],
            ))),
            opts: SchemaOptions::NONE,
        };

        let mut tag = Tag::List(list);
        let mut sink = RecordingSink::default();
        assert!(!schema.verify(&mut tag, &mut sink));
        assert_eq!(sink.missing, vec!["id"]);
    }

    #[test]
    fn test_scalar_schema_mismatch_in_string_node() {
        let schema = SchemaNode::String {
            name: "Name".to_string(),
            value: None,
            max_len: 3,
            opts: SchemaOptions::NONE,
        };
        let mut tag = Tag::String("toolong".to_string());
        let mut sink = RecordingSink::default();
        assert!(!schema.verify(&mut tag, &mut sink));
        assert_eq!(sink.bad_value, vec!["Name"]);
    }
}
