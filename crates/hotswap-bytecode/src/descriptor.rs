//! Type and method descriptors
//!
//! Provides [`JavaType`] and [`MethodDescriptor`] with parsing from and
//! formatting to the compact descriptor syntax (`(ILjava/lang/String;)V`).

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

/// Errors while parsing descriptors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DescriptorError {
    /// Descriptor was empty where a type was expected
    #[error("empty descriptor")]
    Empty,

    /// Unknown type tag
    #[error("unknown type tag '{tag}' in descriptor {descriptor}")]
    UnknownTag { tag: char, descriptor: String },

    /// Object type without terminating ';'
    #[error("unterminated object type in descriptor {0}")]
    Unterminated(String),

    /// Method descriptor without parentheses
    #[error("not a method descriptor: {0}")]
    NotAMethod(String),

    /// Input left over after a complete descriptor
    #[error("trailing characters in descriptor {0}")]
    Trailing(String),

    /// Array type nested deeper than the format allows
    #[error("{dimensions} array dimensions exceed the limit of {MAX_ARRAY_DIMENSIONS}")]
    TooManyDimensions { dimensions: usize },
}

/// Deepest array nesting a descriptor may declare
pub const MAX_ARRAY_DIMENSIONS: usize = 255;

/// The eight primitive kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Primitive {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

impl Primitive {
    /// All primitive kinds in descriptor-tag order
    pub const ALL: [Primitive; 8] = [
        Primitive::Boolean,
        Primitive::Byte,
        Primitive::Char,
        Primitive::Short,
        Primitive::Int,
        Primitive::Long,
        Primitive::Float,
        Primitive::Double,
    ];

    /// Single-character descriptor tag
    #[inline]
    #[must_use]
    pub const fn tag(self) -> char {
        match self {
            Primitive::Boolean => 'Z',
            Primitive::Byte => 'B',
            Primitive::Char => 'C',
            Primitive::Short => 'S',
            Primitive::Int => 'I',
            Primitive::Long => 'J',
            Primitive::Float => 'F',
            Primitive::Double => 'D',
        }
    }

    /// Internal name of the standard wrapper type
    #[inline]
    #[must_use]
    pub const fn wrapper(self) -> &'static str {
        match self {
            Primitive::Boolean => "java/lang/Boolean",
            Primitive::Byte => "java/lang/Byte",
            Primitive::Char => "java/lang/Character",
            Primitive::Short => "java/lang/Short",
            Primitive::Int => "java/lang/Integer",
            Primitive::Long => "java/lang/Long",
            Primitive::Float => "java/lang/Float",
            Primitive::Double => "java/lang/Double",
        }
    }

    /// Descriptor of the wrapper's `valueOf` factory, e.g. `(I)Ljava/lang/Integer;`
    #[must_use]
    pub fn box_descriptor(self) -> String {
        format!("({})L{};", self.tag(), self.wrapper())
    }

    /// Name of the wrapper's unboxing accessor, e.g. `intValue`
    #[inline]
    #[must_use]
    pub const fn unbox_method(self) -> &'static str {
        match self {
            Primitive::Boolean => "booleanValue",
            Primitive::Byte => "byteValue",
            Primitive::Char => "charValue",
            Primitive::Short => "shortValue",
            Primitive::Int => "intValue",
            Primitive::Long => "longValue",
            Primitive::Float => "floatValue",
            Primitive::Double => "doubleValue",
        }
    }

    /// Operand stack / local variable slots occupied
    #[inline]
    #[must_use]
    pub const fn slots(self) -> u16 {
        match self {
            Primitive::Long | Primitive::Double => 2,
            _ => 1,
        }
    }

    /// Load opcode for a local of this kind
    #[inline]
    #[must_use]
    pub const fn load_opcode(self) -> u8 {
        use crate::opcodes::{DLOAD, FLOAD, ILOAD, LLOAD};
        match self {
            Primitive::Long => LLOAD,
            Primitive::Float => FLOAD,
            Primitive::Double => DLOAD,
            _ => ILOAD,
        }
    }

    /// Store opcode for a local of this kind
    #[inline]
    #[must_use]
    pub const fn store_opcode(self) -> u8 {
        use crate::opcodes::{DSTORE, FSTORE, ISTORE, LSTORE};
        match self {
            Primitive::Long => LSTORE,
            Primitive::Float => FSTORE,
            Primitive::Double => DSTORE,
            _ => ISTORE,
        }
    }

    /// Look a primitive up by its descriptor tag
    #[must_use]
    pub fn from_tag(tag: char) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.tag() == tag)
    }

    /// Look a primitive up by its wrapper's internal name
    #[must_use]
    pub fn from_wrapper(internal_name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.wrapper() == internal_name)
    }
}

/// A field type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JavaType {
    /// One of the eight primitive kinds
    Primitive(Primitive),
    /// Reference to a named type, internal form (`a/b/C`)
    Object(String),
    /// Array of the element type
    Array(Box<JavaType>),
}

impl JavaType {
    /// Reference type by internal name
    #[inline]
    #[must_use]
    pub fn object(internal_name: impl Into<String>) -> Self {
        JavaType::Object(internal_name.into())
    }

    /// Parse a single field descriptor
    ///
    /// # Errors
    /// Returns error if the descriptor is malformed or has trailing input
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let (ty, rest) = parse_one(descriptor, descriptor)?;
        if !rest.is_empty() {
            return Err(DescriptorError::Trailing(descriptor.to_string()));
        }
        Ok(ty)
    }

    /// Slots on the operand stack
    #[inline]
    #[must_use]
    pub fn slots(&self) -> u16 {
        match self {
            JavaType::Primitive(p) => p.slots(),
            _ => 1,
        }
    }

    /// The primitive kind, if any
    #[inline]
    #[must_use]
    pub fn as_primitive(&self) -> Option<Primitive> {
        match self {
            JavaType::Primitive(p) => Some(*p),
            _ => None,
        }
    }

    /// Load opcode for a local of this type
    #[inline]
    #[must_use]
    pub fn load_opcode(&self) -> u8 {
        self.as_primitive()
            .map_or(crate::opcodes::ALOAD, Primitive::load_opcode)
    }

    /// Store opcode for a local of this type
    #[inline]
    #[must_use]
    pub fn store_opcode(&self) -> u8 {
        self.as_primitive()
            .map_or(crate::opcodes::ASTORE, Primitive::store_opcode)
    }

    /// Name used in type instructions and class constants: the internal name
    /// for objects, the full descriptor for arrays
    #[must_use]
    pub fn class_constant_name(&self) -> String {
        match self {
            JavaType::Object(name) => name.clone(),
            other => other.to_string(),
        }
    }
}

impl Display for JavaType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            JavaType::Primitive(p) => write!(f, "{}", p.tag()),
            JavaType::Object(name) => write!(f, "L{name};"),
            JavaType::Array(elem) => write!(f, "[{elem}"),
        }
    }
}

impl FromStr for JavaType {
    type Err = DescriptorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Return type of a method
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnType {
    Void,
    Value(JavaType),
}

impl ReturnType {
    /// Slots pushed on return
    #[inline]
    #[must_use]
    pub fn slots(&self) -> u16 {
        match self {
            ReturnType::Void => 0,
            ReturnType::Value(ty) => ty.slots(),
        }
    }
}

/// Parsed method descriptor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MethodDescriptor {
    /// Parameter types in declaration order
    pub params: Vec<JavaType>,
    /// Return type
    pub ret: ReturnType,
}

impl MethodDescriptor {
    /// Parse a method descriptor
    ///
    /// # Errors
    /// Returns error if the descriptor is malformed
    pub fn parse(descriptor: &str) -> Result<Self, DescriptorError> {
        let inner = descriptor
            .strip_prefix('(')
            .ok_or_else(|| DescriptorError::NotAMethod(descriptor.to_string()))?;
        let close = inner
            .find(')')
            .ok_or_else(|| DescriptorError::NotAMethod(descriptor.to_string()))?;

        let mut params = Vec::new();
        let mut rest = &inner[..close];
        while !rest.is_empty() {
            let (ty, tail) = parse_one(rest, descriptor)?;
            params.push(ty);
            rest = tail;
        }

        let ret_str = &inner[close + 1..];
        let ret = if ret_str == "V" {
            ReturnType::Void
        } else {
            let (ty, tail) = parse_one(ret_str, descriptor)?;
            if !tail.is_empty() {
                return Err(DescriptorError::Trailing(descriptor.to_string()));
            }
            ReturnType::Value(ty)
        };

        Ok(Self { params, ret })
    }

    /// Total argument slots
    #[must_use]
    pub fn arg_slots(&self) -> u16 {
        self.params.iter().map(JavaType::slots).sum()
    }
}

impl Display for MethodDescriptor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for p in &self.params {
            write!(f, "{p}")?;
        }
        f.write_str(")")?;
        match &self.ret {
            ReturnType::Void => f.write_str("V"),
            ReturnType::Value(ty) => write!(f, "{ty}"),
        }
    }
}

fn parse_one<'a>(input: &'a str, whole: &str) -> Result<(JavaType, &'a str), DescriptorError> {
    let element = input.trim_start_matches('[');
    let dimensions = input.len() - element.len();
    if dimensions > MAX_ARRAY_DIMENSIONS {
        return Err(DescriptorError::TooManyDimensions { dimensions });
    }

    let mut chars = element.chars();
    let tag = chars.next().ok_or(DescriptorError::Empty)?;
    let rest = chars.as_str();

    let (mut ty, tail) = if let Some(p) = Primitive::from_tag(tag) {
        (JavaType::Primitive(p), rest)
    } else if tag == 'L' {
        let end = rest
            .find(';')
            .ok_or_else(|| DescriptorError::Unterminated(whole.to_string()))?;
        (JavaType::Object(rest[..end].to_string()), &rest[end + 1..])
    } else {
        return Err(DescriptorError::UnknownTag {
            tag,
            descriptor: whole.to_string(),
        });
    };

    for _ in 0..dimensions {
        ty = JavaType::Array(Box::new(ty));
    }
    Ok((ty, tail))
}
