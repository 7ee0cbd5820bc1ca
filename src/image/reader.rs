use std::{collections::HashMap, sync::Arc};

use crate::{
    file::parser::Parser,
    image::{
        writer::{KIND_FIELD, KIND_LOCALS, KIND_METHOD},
        FORMAT_VERSION, IMAGE_MAGIC, SYMBOLS_MAGIC,
    },
    metadata::{
        customattributes::CustomAttribute,
        members::{FieldDef, MemberRef, MemberRefSignature, MethodSpec, PropertyDef},
        method::{MethodBody, MethodDef},
        module::{ModuleImage, StandAloneSignature},
        sequencepoints::parse_sequence_points,
        signatures::{parse_field_sig, parse_local_sig, parse_method_sig, parse_type_sig},
        token::{table, Token},
        typesystem::{GenericParam, TypeDef, TypeName, TypeSig},
    },
    Error::{NotSupported, SymbolMismatch},
    Result,
};

/// Upper bound for nesting depth while computing nested type names
const MAX_NESTING_DEPTH: usize = 64;

struct RawType {
    token: Token,
    namespace: String,
    name: String,
    flags: u32,
    enclosing: Token,
    base: Option<TypeSig>,
    generic_params: Vec<GenericParam>,
    interfaces: Vec<TypeSig>,
    attributes: Vec<CustomAttribute>,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    properties: Vec<PropertyDef>,
}

/// Loads a [`ModuleImage`] from an image and, optionally, its symbol stream.
pub struct ImageReader;

impl ImageReader {
    /// Read a module image.
    ///
    /// ## Arguments
    /// * 'image'   - The image bytes
    /// * 'symbols' - The symbol stream written together with `image`, if available
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] for empty input, [`crate::Error::NotSupported`] for
    /// unknown magic or versions, [`crate::Error::SymbolMismatch`] if the symbols belong to a
    /// different image, and [`crate::Error::Malformed`] / [`crate::Error::OutOfBounds`] for
    /// damaged data.
    pub fn read(image: &[u8], symbols: Option<&[u8]>) -> Result<ModuleImage> {
        if image.is_empty() {
            return Err(crate::Error::Empty);
        }

        let mut parser = Parser::new(image);
        let id = read_header(&mut parser, IMAGE_MAGIC)?;
        let module = ModuleImage::new(parser.read_compressed_string_utf8()?);

        for _ in 0..parser.read_compressed_uint()? {
            module.add_reference(parser.read_compressed_string_utf8()?);
        }
        for attribute in read_attributes(&mut parser)? {
            module.add_assembly_attribute(attribute);
        }

        let type_count = parser.read_compressed_uint()?;
        let mut raw_types = Vec::with_capacity(type_count.min(1024) as usize);
        for _ in 0..type_count {
            raw_types.push(read_type(&mut parser)?);
        }
        register_types(&module, raw_types)?;

        for _ in 0..parser.read_compressed_uint()? {
            let parent = parse_type_sig(&mut parser)?;
            let name = parser.read_compressed_string_utf8()?;
            let signature = match parser.read_le::<u8>()? {
                KIND_FIELD => MemberRefSignature::Field(parse_field_sig(&mut parser)?),
                KIND_METHOD => MemberRefSignature::Method(parse_method_sig(&mut parser)?),
                other => return Err(malformed_error!("Invalid member reference kind - {}", other)),
            };
            module.push_member_ref(MemberRef {
                parent,
                name,
                signature,
            });
        }

        for _ in 0..parser.read_compressed_uint()? {
            module.push_type_spec(parse_type_sig(&mut parser)?);
        }

        for _ in 0..parser.read_compressed_uint()? {
            let method = parser.read_token()?;
            let instantiation = read_sigs(&mut parser)?;
            module.add_method_spec(MethodSpec {
                method,
                instantiation,
            });
        }

        for _ in 0..parser.read_compressed_uint()? {
            let sig = match parser.read_le::<u8>()? {
                KIND_LOCALS => StandAloneSignature::Locals(parse_local_sig(&mut parser)?),
                KIND_METHOD => StandAloneSignature::Method(parse_method_sig(&mut parser)?),
                other => return Err(malformed_error!("Invalid standalone signature kind - {}", other)),
            };
            module.add_standalone_sig(sig);
        }

        for _ in 0..parser.read_compressed_uint()? {
            module.add_user_string(parser.read_compressed_string_utf8()?);
        }

        if parser.has_more_data() {
            return Err(malformed_error!(
                "{} trailing bytes after the user string table",
                parser.remaining()
            ));
        }

        if let Some(symbols) = symbols {
            read_symbols(&module, id, symbols)?;
        }

        tracing::debug!(
            module = module.name(),
            types = module.types().len(),
            "read module image"
        );
        Ok(module)
    }

    /// Read only the module name and references of an image
    ///
    /// # Errors
    /// Returns [`crate::Error::NotSupported`] for unknown magic or versions, and
    /// [`crate::Error::Malformed`] for damaged headers.
    pub fn read_references(image: &[u8]) -> Result<(String, Vec<String>)> {
        let mut parser = Parser::new(image);
        read_header(&mut parser, IMAGE_MAGIC)?;
        let name = parser.read_compressed_string_utf8()?;
        let mut references = Vec::new();
        for _ in 0..parser.read_compressed_uint()? {
            references.push(parser.read_compressed_string_utf8()?);
        }
        Ok((name, references))
    }
}

fn read_header(parser: &mut Parser, magic: &[u8; 4]) -> Result<uguid::Guid> {
    if parser.read_bytes(4)? != magic {
        return Err(NotSupported);
    }
    let version = parser.read_le::<u16>()?;
    if version != FORMAT_VERSION {
        return Err(NotSupported);
    }

    let bytes: [u8; 16] = parser
        .read_bytes(16)?
        .try_into()
        .map_err(|_| out_of_bounds_error!())?;
    Ok(uguid::Guid::from_bytes(bytes))
}

fn read_symbols(module: &ModuleImage, expected: uguid::Guid, symbols: &[u8]) -> Result<()> {
    let mut parser = Parser::new(symbols);
    let found = read_header(&mut parser, SYMBOLS_MAGIC)?;
    if found != expected {
        return Err(SymbolMismatch { expected, found });
    }

    for _ in 0..parser.read_compressed_uint()? {
        let token = parser.read_token()?;
        let points = parse_sequence_points(parser.read_compressed_blob()?)?;
        let Some((_, method)) = module.method(token) else {
            return Err(malformed_error!("Sequence points for unknown method {}", token));
        };
        *write_lock!(method.sequence_points) = points.0;
    }
    Ok(())
}

fn read_type(parser: &mut Parser) -> Result<RawType> {
    let token = parser.read_token()?;
    if !token.is_table(table::TYPEDEF) {
        return Err(crate::Error::InvalidToken(token));
    }
    let namespace = parser.read_compressed_string_utf8()?;
    let name = parser.read_compressed_string_utf8()?;
    let flags = parser.read_le::<u32>()?;
    let enclosing = parser.read_token()?;
    let base = match parser.read_le::<u8>()? {
        0 => None,
        _ => Some(parse_type_sig(parser)?),
    };

    let mut generic_params = Vec::new();
    for number in 0..parser.read_compressed_uint()? {
        let number = u16::try_from(number)
            .map_err(|_| malformed_error!("Too many generic parameters - {}", number))?;
        let mut param = GenericParam::new(number, parser.read_compressed_string_utf8()?);
        param.flags = parser.read_le::<u16>()?;
        param.constraints = read_sigs(parser)?;
        generic_params.push(param);
    }

    let interfaces = read_sigs(parser)?;
    let attributes = read_attributes(parser)?;

    let mut fields = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        let token = parser.read_token()?;
        let name = parser.read_compressed_string_utf8()?;
        let flags = parser.read_le::<u32>()?;
        let field = FieldDef::new(token, name, flags, parse_field_sig(parser)?);
        for attribute in read_attributes(parser)? {
            field.custom_attributes.push(attribute);
        }
        fields.push(field);
    }

    let mut methods = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        methods.push(read_method(parser)?);
    }

    let mut properties = Vec::new();
    for _ in 0..parser.read_compressed_uint()? {
        let token = parser.read_token()?;
        let name = parser.read_compressed_string_utf8()?;
        let flags = parser.read_le::<u32>()?;
        let signature = parse_type_sig(parser)?;
        let getter = parser.read_token()?;
        let setter = parser.read_token()?;
        let mut property = PropertyDef::new(
            token,
            name,
            signature,
            (!getter.is_null()).then_some(getter),
            (!setter.is_null()).then_some(setter),
        );
        property.flags = flags;
        for attribute in read_attributes(parser)? {
            property.custom_attributes.push(attribute);
        }
        properties.push(property);
    }

    Ok(RawType {
        token,
        namespace,
        name,
        flags,
        enclosing,
        base,
        generic_params,
        interfaces,
        attributes,
        fields,
        methods,
        properties,
    })
}

fn read_method(parser: &mut Parser) -> Result<MethodDef> {
    let token = parser.read_token()?;
    let name = parser.read_compressed_string_utf8()?;
    let flags = parser.read_le::<u32>()?;
    let impl_flags = parser.read_le::<u32>()?;
    let signature = parse_method_sig(parser)?;

    let mut method = MethodDef::new(token, name, flags, signature);
    method.impl_flags = impl_flags;
    for _ in 0..parser.read_compressed_uint()? {
        method.param_names.push(parser.read_compressed_string_utf8()?);
    }
    for attribute in read_attributes(parser)? {
        method.custom_attributes.push(attribute);
    }

    if parser.read_le::<u8>()? != 0 {
        let body = MethodBody::from(parser.read_compressed_blob()?)?;
        method = method.with_body(body);
    }
    Ok(method)
}

fn register_types(module: &ModuleImage, raw_types: Vec<RawType>) -> Result<()> {
    let index_of: HashMap<Token, usize> = raw_types
        .iter()
        .enumerate()
        .map(|(index, raw)| (raw.token, index))
        .collect();

    let mut fullnames = Vec::with_capacity(raw_types.len());
    for raw in &raw_types {
        fullnames.push(fullname_of(raw, &raw_types, &index_of, 0)?);
    }

    let mut registered = Vec::with_capacity(raw_types.len());
    for raw in raw_types {
        let enclosing = if raw.enclosing.is_null() {
            None
        } else {
            let outer = index_of
                .get(&raw.enclosing)
                .and_then(|index| fullnames.get(*index))
                .ok_or_else(|| malformed_error!("Unknown enclosing type {}", raw.enclosing))?;
            Some((raw.enclosing, outer.as_str()))
        };

        let ty = Arc::new(TypeDef::new(
            raw.token,
            module.name_arc().clone(),
            raw.namespace,
            raw.name,
            raw.flags,
            raw.base,
            raw.generic_params,
            enclosing,
        ));
        for interface in raw.interfaces {
            ty.interfaces.push(interface);
        }
        for attribute in raw.attributes {
            ty.custom_attributes.push(attribute);
        }
        for field in raw.fields {
            module.observe_token(field.token);
            ty.fields.push(Arc::new(field));
        }
        for method in raw.methods {
            module.observe_token(method.token);
            ty.methods.push(Arc::new(method));
        }
        for property in raw.properties {
            module.observe_token(property.token);
            ty.properties.push(Arc::new(property));
        }

        module.types().insert(ty.clone())?;
        registered.push(ty);
    }

    for ty in &registered {
        if let Some(outer) = ty.enclosing.and_then(|token| module.types().get(&token)) {
            outer.nested_types.push(ty.token);
        }
    }
    Ok(())
}

fn fullname_of(
    raw: &RawType,
    raw_types: &[RawType],
    index_of: &HashMap<Token, usize>,
    depth: usize,
) -> Result<String> {
    if depth > MAX_NESTING_DEPTH {
        return Err(malformed_error!("Nested type chain too deep at {}", raw.token));
    }
    if raw.enclosing.is_null() {
        return Ok(TypeName::new("", raw.namespace.as_str(), raw.name.as_str()).fullname());
    }

    let outer = index_of
        .get(&raw.enclosing)
        .and_then(|index| raw_types.get(*index))
        .ok_or_else(|| malformed_error!("Unknown enclosing type {}", raw.enclosing))?;
    Ok(format!(
        "{}/{}",
        fullname_of(outer, raw_types, index_of, depth + 1)?,
        raw.name
    ))
}

fn read_attributes(parser: &mut Parser) -> Result<Vec<CustomAttribute>> {
    let count = parser.read_compressed_uint()?;
    let mut attributes = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        let scope = parser.read_compressed_string_utf8()?;
        let namespace = parser.read_compressed_string_utf8()?;
        let name = parser.read_compressed_string_utf8()?;
        let blob = parser.read_compressed_blob()?;
        attributes.push(CustomAttribute::decode_value(
            TypeName::new(scope, namespace, name),
            blob,
        )?);
    }
    Ok(attributes)
}

fn read_sigs(parser: &mut Parser) -> Result<Vec<TypeSig>> {
    let count = parser.read_compressed_uint()?;
    let mut sigs = Vec::with_capacity(count.min(64) as usize);
    for _ in 0..count {
        sigs.push(parse_type_sig(parser)?);
    }
    Ok(sigs)
}
