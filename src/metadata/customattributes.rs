//! Custom attributes and their argument blobs.
//!
//! An attribute is stored as the name of its attribute type plus a value blob. The blob keeps
//! the ECMA-335 II.23.3 framing (prolog `0x0001`, fixed arguments, named arguments) but tags
//! every fixed argument with its serialization type, so it can be decoded without resolving the
//! attribute constructor. Constructor arguments the weaver reads (prefix strings, mode enums,
//! `typeof(..)` arguments) are therefore available from the image alone.
//!
//! # Example
//!
//! ```rust
//! use dotweave::metadata::customattributes::{CustomAttribute, CustomAttributeArgument};
//! use dotweave::metadata::typesystem::TypeName;
//!
//! let attribute = CustomAttribute::new(
//!     TypeName::new("GenericSerializeReference", "GenericSerializeReference", "GenericSerializeReferenceAttribute"),
//!     vec![CustomAttributeArgument::String("_serialized".into())],
//! );
//! let blob = attribute.encode_value()?;
//! let decoded = CustomAttribute::decode_value(attribute.attribute_type.clone(), &blob)?;
//! assert_eq!(decoded.fixed_string(0), Some("_serialized"));
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    file::{parser::Parser, writer::Writer},
    metadata::{
        signatures::{encode_type_sig, parse_type_sig},
        typesystem::{TypeName, TypeSig},
    },
    Result,
};

const PROLOG: u16 = 0x0001;
const NAMED_FIELD: u8 = 0x53;
const NAMED_PROPERTY: u8 = 0x54;
const MAX_ARRAY_LENGTH: u32 = 0x0010_0000;

#[allow(non_snake_case, missing_docs)]
/// Serialization type tags of attribute values (ECMA-335 II.23.3)
pub mod SERIALIZATION_TYPE {
    pub const BOOLEAN: u8 = 0x02;
    pub const CHAR: u8 = 0x03;
    pub const I1: u8 = 0x04;
    pub const U1: u8 = 0x05;
    pub const I2: u8 = 0x06;
    pub const U2: u8 = 0x07;
    pub const I4: u8 = 0x08;
    pub const U4: u8 = 0x09;
    pub const I8: u8 = 0x0A;
    pub const U8: u8 = 0x0B;
    pub const R4: u8 = 0x0C;
    pub const R8: u8 = 0x0D;
    pub const STRING: u8 = 0x0E;
    pub const SZARRAY: u8 = 0x1D;
    pub const TYPE: u8 = 0x50;
    pub const ENUM: u8 = 0x55;
}

/// A single attribute argument value
#[derive(Debug, Clone, PartialEq)]
pub enum CustomAttributeArgument {
    /// `bool`
    Bool(bool),
    /// `char`
    Char(char),
    /// `sbyte`
    I1(i8),
    /// `byte`
    U1(u8),
    /// `short`
    I2(i16),
    /// `ushort`
    U2(u16),
    /// `int`
    I4(i32),
    /// `uint`
    U4(u32),
    /// `long`
    I8(i64),
    /// `ulong`
    U8(u64),
    /// `float`
    R4(f32),
    /// `double`
    R8(f64),
    /// `string`
    String(String),
    /// `typeof(..)`
    Type(TypeSig),
    /// Enum value: enum type full name plus underlying value
    Enum(String, Box<CustomAttributeArgument>),
    /// Single-dimensional array
    Array(Vec<CustomAttributeArgument>),
}

impl CustomAttributeArgument {
    /// Integer value of integral and enum arguments
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CustomAttributeArgument::I1(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U1(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I2(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U2(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I4(value) => Some(i64::from(*value)),
            CustomAttributeArgument::U4(value) => Some(i64::from(*value)),
            CustomAttributeArgument::I8(value) => Some(*value),
            CustomAttributeArgument::U8(value) => i64::try_from(*value).ok(),
            CustomAttributeArgument::Enum(_, value) => value.as_i64(),
            _ => None,
        }
    }

    /// String value of string arguments
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            CustomAttributeArgument::String(value) => Some(value),
            _ => None,
        }
    }

    /// Type value of `typeof(..)` arguments
    #[must_use]
    pub fn as_type(&self) -> Option<&TypeSig> {
        match self {
            CustomAttributeArgument::Type(value) => Some(value),
            _ => None,
        }
    }
}

/// A named field or property assignment of an attribute
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttributeNamedArgument {
    /// True for a field, false for a property
    pub is_field: bool,
    /// Field or property name
    pub name: String,
    /// Assigned value
    pub value: CustomAttributeArgument,
}

/// An attribute applied to a type, member or the module itself
#[derive(Debug, Clone, PartialEq)]
pub struct CustomAttribute {
    /// The attribute class
    pub attribute_type: TypeName,
    /// Positional constructor arguments
    pub fixed_args: Vec<CustomAttributeArgument>,
    /// Named field and property assignments
    pub named_args: Vec<CustomAttributeNamedArgument>,
}

impl CustomAttribute {
    /// An attribute with positional arguments only
    #[must_use]
    pub fn new(attribute_type: TypeName, fixed_args: Vec<CustomAttributeArgument>) -> Self {
        CustomAttribute {
            attribute_type,
            fixed_args,
            named_args: Vec::new(),
        }
    }

    /// Add a named assignment
    #[must_use]
    pub fn with_named(mut self, name: &str, is_field: bool, value: CustomAttributeArgument) -> Self {
        self.named_args.push(CustomAttributeNamedArgument {
            is_field,
            name: name.to_string(),
            value,
        });
        self
    }

    /// True if the attribute class has the given `Namespace.Name` full name
    #[must_use]
    pub fn is(&self, fullname: &str) -> bool {
        self.attribute_type.fullname() == fullname
    }

    /// Positional argument at `index`
    #[must_use]
    pub fn fixed(&self, index: usize) -> Option<&CustomAttributeArgument> {
        self.fixed_args.get(index)
    }

    /// Positional string argument at `index`
    #[must_use]
    pub fn fixed_string(&self, index: usize) -> Option<&str> {
        self.fixed(index).and_then(CustomAttributeArgument::as_str)
    }

    /// Named argument by name
    #[must_use]
    pub fn named(&self, name: &str) -> Option<&CustomAttributeArgument> {
        self.named_args
            .iter()
            .find(|arg| arg.name == name)
            .map(|arg| &arg.value)
    }

    /// Encode the argument blob.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a string or array exceeds the encodable length.
    pub fn encode_value(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new();
        writer.write_le::<u16>(PROLOG);
        writer.write_compressed_uint(self.fixed_args.len() as u32)?;
        for arg in &self.fixed_args {
            encode_argument(&mut writer, arg)?;
        }
        writer.write_le::<u16>(self.named_args.len() as u16);
        for named in &self.named_args {
            writer.write_le::<u8>(if named.is_field {
                NAMED_FIELD
            } else {
                NAMED_PROPERTY
            });
            writer.write_compressed_string_utf8(&named.name)?;
            encode_argument(&mut writer, &named.value)?;
        }
        Ok(writer.into_data())
    }

    /// Decode an argument blob for the given attribute class.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for a missing prolog, unknown tags or trailing data.
    pub fn decode_value(attribute_type: TypeName, data: &[u8]) -> Result<Self> {
        let mut parser = Parser::new(data);
        let prolog = parser.read_le::<u16>()?;
        if prolog != PROLOG {
            return Err(malformed_error!(
                "Invalid custom attribute prolog - 0x{:04x}",
                prolog
            ));
        }

        let fixed_count = parser.read_compressed_uint()?;
        let mut fixed_args = Vec::with_capacity(fixed_count.min(16) as usize);
        for _ in 0..fixed_count {
            fixed_args.push(parse_argument(&mut parser)?);
        }

        let named_count = parser.read_le::<u16>()?;
        let mut named_args = Vec::with_capacity(usize::from(named_count.min(16)));
        for _ in 0..named_count {
            let is_field = match parser.read_le::<u8>()? {
                NAMED_FIELD => true,
                NAMED_PROPERTY => false,
                other => {
                    return Err(malformed_error!(
                        "Invalid named argument kind - 0x{:02x}",
                        other
                    ))
                }
            };
            let name = parser.read_compressed_string_utf8()?;
            let value = parse_argument(&mut parser)?;
            named_args.push(CustomAttributeNamedArgument {
                is_field,
                name,
                value,
            });
        }

        if parser.has_more_data() {
            return Err(malformed_error!(
                "Trailing data in custom attribute blob - {} bytes",
                parser.remaining()
            ));
        }

        Ok(CustomAttribute {
            attribute_type,
            fixed_args,
            named_args,
        })
    }
}

fn encode_argument(writer: &mut Writer, arg: &CustomAttributeArgument) -> Result<()> {
    match arg {
        CustomAttributeArgument::Bool(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::BOOLEAN);
            writer.write_le::<u8>(u8::from(*value));
        }
        CustomAttributeArgument::Char(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::CHAR);
            writer.write_le::<u32>(u32::from(*value));
        }
        CustomAttributeArgument::I1(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::I1);
            writer.write_le::<i8>(*value);
        }
        CustomAttributeArgument::U1(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::U1);
            writer.write_le::<u8>(*value);
        }
        CustomAttributeArgument::I2(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::I2);
            writer.write_le::<i16>(*value);
        }
        CustomAttributeArgument::U2(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::U2);
            writer.write_le::<u16>(*value);
        }
        CustomAttributeArgument::I4(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::I4);
            writer.write_le::<i32>(*value);
        }
        CustomAttributeArgument::U4(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::U4);
            writer.write_le::<u32>(*value);
        }
        CustomAttributeArgument::I8(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::I8);
            writer.write_le::<i64>(*value);
        }
        CustomAttributeArgument::U8(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::U8);
            writer.write_le::<u64>(*value);
        }
        CustomAttributeArgument::R4(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::R4);
            writer.write_le::<f32>(*value);
        }
        CustomAttributeArgument::R8(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::R8);
            writer.write_le::<f64>(*value);
        }
        CustomAttributeArgument::String(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::STRING);
            writer.write_compressed_string_utf8(value)?;
        }
        CustomAttributeArgument::Type(value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::TYPE);
            encode_type_sig(writer, value)?;
        }
        CustomAttributeArgument::Enum(enum_type, value) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::ENUM);
            writer.write_compressed_string_utf8(enum_type)?;
            encode_argument(writer, value)?;
        }
        CustomAttributeArgument::Array(values) => {
            writer.write_le::<u8>(SERIALIZATION_TYPE::SZARRAY);
            writer.write_compressed_uint(values.len() as u32)?;
            for value in values {
                encode_argument(writer, value)?;
            }
        }
    }
    Ok(())
}

fn parse_argument(parser: &mut Parser) -> Result<CustomAttributeArgument> {
    let tag = parser.read_le::<u8>()?;
    Ok(match tag {
        SERIALIZATION_TYPE::BOOLEAN => CustomAttributeArgument::Bool(parser.read_le::<u8>()? != 0),
        SERIALIZATION_TYPE::CHAR => {
            let raw = parser.read_le::<u32>()?;
            CustomAttributeArgument::Char(
                char::from_u32(raw).ok_or(malformed_error!("Invalid char value - {}", raw))?,
            )
        }
        SERIALIZATION_TYPE::I1 => CustomAttributeArgument::I1(parser.read_le::<i8>()?),
        SERIALIZATION_TYPE::U1 => CustomAttributeArgument::U1(parser.read_le::<u8>()?),
        SERIALIZATION_TYPE::I2 => CustomAttributeArgument::I2(parser.read_le::<i16>()?),
        SERIALIZATION_TYPE::U2 => CustomAttributeArgument::U2(parser.read_le::<u16>()?),
        SERIALIZATION_TYPE::I4 => CustomAttributeArgument::I4(parser.read_le::<i32>()?),
        SERIALIZATION_TYPE::U4 => CustomAttributeArgument::U4(parser.read_le::<u32>()?),
        SERIALIZATION_TYPE::I8 => CustomAttributeArgument::I8(parser.read_le::<i64>()?),
        SERIALIZATION_TYPE::U8 => CustomAttributeArgument::U8(parser.read_le::<u64>()?),
        SERIALIZATION_TYPE::R4 => CustomAttributeArgument::R4(parser.read_le::<f32>()?),
        SERIALIZATION_TYPE::R8 => CustomAttributeArgument::R8(parser.read_le::<f64>()?),
        SERIALIZATION_TYPE::STRING => {
            CustomAttributeArgument::String(parser.read_compressed_string_utf8()?)
        }
        SERIALIZATION_TYPE::TYPE => CustomAttributeArgument::Type(parse_type_sig(parser)?),
        SERIALIZATION_TYPE::ENUM => {
            let enum_type = parser.read_compressed_string_utf8()?;
            let value = parse_argument(parser)?;
            if value.as_i64().is_none() {
                return Err(malformed_error!(
                    "Enum {} with non-integral underlying value",
                    enum_type
                ));
            }
            CustomAttributeArgument::Enum(enum_type, Box::new(value))
        }
        SERIALIZATION_TYPE::SZARRAY => {
            let count = parser.read_compressed_uint()?;
            if count > MAX_ARRAY_LENGTH {
                return Err(malformed_error!("Attribute array too large - {}", count));
            }
            let mut values = Vec::with_capacity(count.min(64) as usize);
            for _ in 0..count {
                values.push(parse_argument(parser)?);
            }
            CustomAttributeArgument::Array(values)
        }
        _ => {
            return Err(malformed_error!(
                "Unsupported serialization type - 0x{:02x}",
                tag
            ))
        }
    })
}
