//! Binary encoding of type, method, field and local signatures.
//!
//! The layout follows ECMA-335 II.23.2 with one difference: a named type is stored inline as
//! three compressed strings (scope, namespace, name) after its `CLASS` / `VALUETYPE` element
//! byte instead of a coded `TypeDefOrRef` index. This keeps signatures self-contained so a
//! module image needs no separate type reference table.

use crate::{
    file::{parser::Parser, writer::Writer},
    metadata::typesystem::{
        MethodSig, PrimitiveKind, TypeName, TypeSig, CALLING_CONVENTION, ELEMENT_TYPE,
    },
    Result,
};

const MAX_RECURSION_DEPTH: usize = 64;

/// Decode a single type.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown element types or nesting deeper than the
/// supported limit, and [`crate::Error::OutOfBounds`] for truncated data.
pub fn parse_type_sig(parser: &mut Parser) -> Result<TypeSig> {
    parse_type_sig_at(parser, 0)
}

fn parse_type_sig_at(parser: &mut Parser, depth: usize) -> Result<TypeSig> {
    if depth >= MAX_RECURSION_DEPTH {
        return Err(malformed_error!(
            "Type signature nesting exceeds {}",
            MAX_RECURSION_DEPTH
        ));
    }

    let element_type = parser.read_le::<u8>()?;
    if let Some(kind) = PrimitiveKind::from_element_type(element_type) {
        return Ok(TypeSig::Primitive(kind));
    }

    match element_type {
        ELEMENT_TYPE::CLASS => Ok(TypeSig::Class(parse_type_name(parser)?)),
        ELEMENT_TYPE::VALUETYPE => Ok(TypeSig::ValueType(parse_type_name(parser)?)),
        ELEMENT_TYPE::VAR => Ok(TypeSig::Var(parser.read_compressed_uint()?)),
        ELEMENT_TYPE::MVAR => Ok(TypeSig::MVar(parser.read_compressed_uint()?)),
        ELEMENT_TYPE::SZARRAY => Ok(TypeSig::SzArray(Box::new(parse_type_sig_at(
            parser,
            depth + 1,
        )?))),
        ELEMENT_TYPE::BYREF => Ok(TypeSig::ByRef(Box::new(parse_type_sig_at(
            parser,
            depth + 1,
        )?))),
        ELEMENT_TYPE::GENERICINST => {
            let base = parse_type_sig_at(parser, depth + 1)?;
            if !matches!(base, TypeSig::Class(_) | TypeSig::ValueType(_)) {
                return Err(malformed_error!(
                    "Generic instantiation of a non-definition - {}",
                    base
                ));
            }

            let count = parser.read_compressed_uint()?;
            if count == 0 {
                return Err(malformed_error!("Generic instantiation without arguments"));
            }

            let mut args = Vec::with_capacity(count.min(16) as usize);
            for _ in 0..count {
                args.push(parse_type_sig_at(parser, depth + 1)?);
            }
            Ok(TypeSig::GenericInst(Box::new(base), args))
        }
        _ => Err(malformed_error!(
            "Unsupported element type - 0x{:02x}",
            element_type
        )),
    }
}

fn parse_type_name(parser: &mut Parser) -> Result<TypeName> {
    let scope = parser.read_compressed_string_utf8()?;
    let namespace = parser.read_compressed_string_utf8()?;
    let name = parser.read_compressed_string_utf8()?;
    if name.is_empty() {
        return Err(malformed_error!("Type reference without a name"));
    }
    Ok(TypeName {
        scope,
        namespace,
        name,
    })
}

/// Encode a single type.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a length exceeds the compressed integer range.
pub fn encode_type_sig(writer: &mut Writer, sig: &TypeSig) -> Result<()> {
    match sig {
        TypeSig::Primitive(kind) => writer.write_le::<u8>(kind.element_type()),
        TypeSig::Class(name) => {
            writer.write_le::<u8>(ELEMENT_TYPE::CLASS);
            encode_type_name(writer, name)?;
        }
        TypeSig::ValueType(name) => {
            writer.write_le::<u8>(ELEMENT_TYPE::VALUETYPE);
            encode_type_name(writer, name)?;
        }
        TypeSig::GenericInst(base, args) => {
            writer.write_le::<u8>(ELEMENT_TYPE::GENERICINST);
            encode_type_sig(writer, base)?;
            writer.write_compressed_uint(args.len() as u32)?;
            for arg in args {
                encode_type_sig(writer, arg)?;
            }
        }
        TypeSig::Var(index) => {
            writer.write_le::<u8>(ELEMENT_TYPE::VAR);
            writer.write_compressed_uint(*index)?;
        }
        TypeSig::MVar(index) => {
            writer.write_le::<u8>(ELEMENT_TYPE::MVAR);
            writer.write_compressed_uint(*index)?;
        }
        TypeSig::SzArray(inner) => {
            writer.write_le::<u8>(ELEMENT_TYPE::SZARRAY);
            encode_type_sig(writer, inner)?;
        }
        TypeSig::ByRef(inner) => {
            writer.write_le::<u8>(ELEMENT_TYPE::BYREF);
            encode_type_sig(writer, inner)?;
        }
    }
    Ok(())
}

fn encode_type_name(writer: &mut Writer, name: &TypeName) -> Result<()> {
    writer.write_compressed_string_utf8(&name.scope)?;
    writer.write_compressed_string_utf8(&name.namespace)?;
    writer.write_compressed_string_utf8(&name.name)
}

/// Decode a method signature (calling convention, parameter count, return, parameters).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for a field/local/property lead byte or a bad type.
pub fn parse_method_sig(parser: &mut Parser) -> Result<MethodSig> {
    let convention = parser.read_le::<u8>()?;
    if convention & 0x0F != CALLING_CONVENTION::DEFAULT {
        return Err(malformed_error!(
            "Unsupported calling convention - 0x{:02x}",
            convention
        ));
    }

    let generic_param_count = if convention & CALLING_CONVENTION::GENERIC != 0 {
        parser.read_compressed_uint()?
    } else {
        0
    };

    let param_count = parser.read_compressed_uint()?;
    let ret = parse_type_sig(parser)?;
    let mut params = Vec::with_capacity(param_count.min(32) as usize);
    for _ in 0..param_count {
        params.push(parse_type_sig(parser)?);
    }

    Ok(MethodSig {
        has_this: convention & CALLING_CONVENTION::HASTHIS != 0,
        explicit_this: convention & CALLING_CONVENTION::EXPLICITTHIS != 0,
        generic_param_count,
        ret,
        params,
    })
}

/// Encode a method signature.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if a count exceeds the compressed integer range.
pub fn encode_method_sig(writer: &mut Writer, sig: &MethodSig) -> Result<()> {
    let mut convention = CALLING_CONVENTION::DEFAULT;
    if sig.has_this {
        convention |= CALLING_CONVENTION::HASTHIS;
    }
    if sig.explicit_this {
        convention |= CALLING_CONVENTION::EXPLICITTHIS;
    }
    if sig.generic_param_count > 0 {
        convention |= CALLING_CONVENTION::GENERIC;
    }

    writer.write_le::<u8>(convention);
    if sig.generic_param_count > 0 {
        writer.write_compressed_uint(sig.generic_param_count)?;
    }
    writer.write_compressed_uint(sig.params.len() as u32)?;
    encode_type_sig(writer, &sig.ret)?;
    for param in &sig.params {
        encode_type_sig(writer, param)?;
    }
    Ok(())
}

/// Decode a field signature (`FIELD` lead byte followed by the type).
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the lead byte is not `FIELD`.
pub fn parse_field_sig(parser: &mut Parser) -> Result<TypeSig> {
    let lead = parser.read_le::<u8>()?;
    if lead != CALLING_CONVENTION::FIELD {
        return Err(malformed_error!("Invalid field signature lead - 0x{:02x}", lead));
    }
    parse_type_sig(parser)
}

/// Encode a field signature.
///
/// # Errors
/// Propagates encoding errors of the field type.
pub fn encode_field_sig(writer: &mut Writer, sig: &TypeSig) -> Result<()> {
    writer.write_le::<u8>(CALLING_CONVENTION::FIELD);
    encode_type_sig(writer, sig)
}

/// Decode a local variable signature.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the lead byte is not `LOCAL_SIG`.
pub fn parse_local_sig(parser: &mut Parser) -> Result<Vec<TypeSig>> {
    let lead = parser.read_le::<u8>()?;
    if lead != CALLING_CONVENTION::LOCAL_SIG {
        return Err(malformed_error!("Invalid local signature lead - 0x{:02x}", lead));
    }
    let count = parser.read_compressed_uint()?;
    let mut locals = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        locals.push(parse_type_sig(parser)?);
    }
    Ok(locals)
}

/// Encode a local variable signature.
///
/// # Errors
/// Propagates encoding errors of the local types.
pub fn encode_local_sig(writer: &mut Writer, locals: &[TypeSig]) -> Result<()> {
    writer.write_le::<u8>(CALLING_CONVENTION::LOCAL_SIG);
    writer.write_compressed_uint(locals.len() as u32)?;
    for local in locals {
        encode_type_sig(writer, local)?;
    }
    Ok(())
}
