use sha1::{Digest, Sha1};

use crate::{
    file::writer::Writer,
    image::{InMemoryImage, FORMAT_VERSION, IMAGE_ID_OFFSET, IMAGE_MAGIC, SYMBOLS_MAGIC},
    metadata::{
        customattributes::CustomAttribute,
        members::{FieldDef, MemberRefSignature, PropertyDef},
        method::MethodDef,
        module::{ModuleImage, StandAloneSignature},
        sequencepoints::encode_sequence_points,
        signatures::{encode_field_sig, encode_local_sig, encode_method_sig, encode_type_sig},
        typesystem::{TypeDef, TypeSig},
    },
    Result,
};

/// Tag bytes of member reference and standalone signature kinds
pub(crate) const KIND_FIELD: u8 = 0;
pub(crate) const KIND_METHOD: u8 = 1;
pub(crate) const KIND_LOCALS: u8 = 2;

/// Serializes a [`ModuleImage`] into an image and a matching symbol stream.
pub struct ImageWriter;

impl ImageWriter {
    /// Encode `module`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if a signature, attribute or method body cannot be
    /// encoded.
    pub fn write(module: &ModuleImage) -> Result<InMemoryImage> {
        let mut writer = Writer::new();
        writer.write_bytes(IMAGE_MAGIC);
        writer.write_le::<u16>(FORMAT_VERSION);
        writer.write_bytes(&[0u8; 16]);
        writer.write_compressed_string_utf8(module.name())?;

        let references = module.references();
        write_count(&mut writer, references.len())?;
        for reference in &references {
            writer.write_compressed_string_utf8(reference)?;
        }
        write_attributes(&mut writer, module.assembly_attributes())?;

        write_count(&mut writer, module.types().len())?;
        for ty in module.types().iter() {
            write_type(&mut writer, &ty)?;
        }

        write_count(&mut writer, module.member_refs().count())?;
        for (_, member) in module.member_refs().iter() {
            encode_type_sig(&mut writer, &member.parent)?;
            writer.write_compressed_string_utf8(&member.name)?;
            match &member.signature {
                MemberRefSignature::Field(sig) => {
                    writer.write_le::<u8>(KIND_FIELD);
                    encode_field_sig(&mut writer, sig)?;
                }
                MemberRefSignature::Method(sig) => {
                    writer.write_le::<u8>(KIND_METHOD);
                    encode_method_sig(&mut writer, sig)?;
                }
            }
        }

        write_count(&mut writer, module.type_specs().count())?;
        for (_, sig) in module.type_specs().iter() {
            encode_type_sig(&mut writer, sig)?;
        }

        write_count(&mut writer, module.method_specs().count())?;
        for (_, spec) in module.method_specs().iter() {
            writer.write_token(spec.method);
            write_sigs(&mut writer, &spec.instantiation)?;
        }

        write_count(&mut writer, module.standalone_sigs().count())?;
        for (_, sig) in module.standalone_sigs().iter() {
            match sig {
                StandAloneSignature::Locals(locals) => {
                    writer.write_le::<u8>(KIND_LOCALS);
                    encode_local_sig(&mut writer, locals)?;
                }
                StandAloneSignature::Method(method) => {
                    writer.write_le::<u8>(KIND_METHOD);
                    encode_method_sig(&mut writer, method)?;
                }
            }
        }

        write_count(&mut writer, module.user_strings().count())?;
        for (_, value) in module.user_strings().iter() {
            writer.write_compressed_string_utf8(value)?;
        }

        let mut image = writer.into_data();
        let id = image_id(&image);
        match image.get_mut(IMAGE_ID_OFFSET..IMAGE_ID_OFFSET + 16) {
            Some(slot) => slot.copy_from_slice(&id.to_bytes()),
            None => return Err(out_of_bounds_error!()),
        }

        let symbols = write_symbols(module, id)?;
        tracing::debug!(
            module = module.name(),
            image_len = image.len(),
            symbols_len = symbols.len(),
            "wrote module image"
        );

        Ok(InMemoryImage { image, symbols })
    }
}

/// SHA-1 derived id of an image whose id field is still zeroed
pub(crate) fn image_id(image: &[u8]) -> uguid::Guid {
    let mut hasher = Sha1::new();
    hasher.update(image);
    let digest = hasher.finalize();

    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    // RFC 4122 version 5 (name based, SHA-1) and variant bits
    bytes[7] = (bytes[7] & 0x0F) | 0x50;
    bytes[8] = (bytes[8] & 0x3F) | 0x80;
    uguid::Guid::from_bytes(bytes)
}

fn write_symbols(module: &ModuleImage, id: uguid::Guid) -> Result<Vec<u8>> {
    let mut entries = Vec::new();
    for ty in module.types().iter() {
        for (_, method) in ty.methods.iter() {
            let points = method.sequence_points();
            if !points.is_empty() {
                entries.push((method.token, encode_sequence_points(&points)?));
            }
        }
    }

    let mut writer = Writer::new();
    writer.write_bytes(SYMBOLS_MAGIC);
    writer.write_le::<u16>(FORMAT_VERSION);
    writer.write_bytes(&id.to_bytes());
    write_count(&mut writer, entries.len())?;
    for (token, blob) in entries {
        writer.write_token(token);
        writer.write_compressed_blob(&blob)?;
    }
    Ok(writer.into_data())
}

fn write_type(writer: &mut Writer, ty: &TypeDef) -> Result<()> {
    writer.write_token(ty.token);
    writer.write_compressed_string_utf8(&ty.namespace)?;
    writer.write_compressed_string_utf8(&ty.name)?;
    writer.write_le::<u32>(ty.flags);
    writer.write_token(ty.enclosing.unwrap_or_default());
    write_optional_sig(writer, ty.base.as_ref())?;

    write_count(writer, ty.generic_params.len())?;
    for param in &ty.generic_params {
        writer.write_compressed_string_utf8(&param.name)?;
        writer.write_le::<u16>(param.flags);
        write_sigs(writer, &param.constraints)?;
    }

    let interfaces: Vec<TypeSig> = ty.interfaces.iter().map(|(_, sig)| sig.clone()).collect();
    write_sigs(writer, &interfaces)?;
    write_attributes(writer, &ty.custom_attributes)?;

    write_count(writer, ty.fields.count())?;
    for (_, field) in ty.fields.iter() {
        write_field(writer, field)?;
    }
    write_count(writer, ty.methods.count())?;
    for (_, method) in ty.methods.iter() {
        write_method(writer, method)?;
    }
    write_count(writer, ty.properties.count())?;
    for (_, property) in ty.properties.iter() {
        write_property(writer, property)?;
    }
    Ok(())
}

fn write_field(writer: &mut Writer, field: &FieldDef) -> Result<()> {
    writer.write_token(field.token);
    writer.write_compressed_string_utf8(&field.name)?;
    writer.write_le::<u32>(field.flags);
    encode_field_sig(writer, &field.signature)?;
    write_attributes(writer, &field.custom_attributes)
}

fn write_method(writer: &mut Writer, method: &MethodDef) -> Result<()> {
    writer.write_token(method.token);
    writer.write_compressed_string_utf8(&method.name)?;
    writer.write_le::<u32>(method.flags);
    writer.write_le::<u32>(method.impl_flags);
    encode_method_sig(writer, &method.signature)?;
    write_count(writer, method.param_names.len())?;
    for name in &method.param_names {
        writer.write_compressed_string_utf8(name)?;
    }
    write_attributes(writer, &method.custom_attributes)?;

    match method.body() {
        Some(body) => {
            writer.write_le::<u8>(1);
            writer.write_compressed_blob(&body.encode()?)?;
        }
        None => writer.write_le::<u8>(0),
    }
    Ok(())
}

fn write_property(writer: &mut Writer, property: &PropertyDef) -> Result<()> {
    writer.write_token(property.token);
    writer.write_compressed_string_utf8(&property.name)?;
    writer.write_le::<u32>(property.flags);
    encode_type_sig(writer, &property.signature)?;
    writer.write_token(property.getter.unwrap_or_default());
    writer.write_token(property.setter.unwrap_or_default());
    write_attributes(writer, &property.custom_attributes)
}

fn write_attributes(writer: &mut Writer, attributes: &boxcar::Vec<CustomAttribute>) -> Result<()> {
    write_count(writer, attributes.count())?;
    for (_, attribute) in attributes.iter() {
        writer.write_compressed_string_utf8(&attribute.attribute_type.scope)?;
        writer.write_compressed_string_utf8(&attribute.attribute_type.namespace)?;
        writer.write_compressed_string_utf8(&attribute.attribute_type.name)?;
        writer.write_compressed_blob(&attribute.encode_value()?)?;
    }
    Ok(())
}

fn write_optional_sig(writer: &mut Writer, sig: Option<&TypeSig>) -> Result<()> {
    match sig {
        Some(sig) => {
            writer.write_le::<u8>(1);
            encode_type_sig(writer, sig)
        }
        None => {
            writer.write_le::<u8>(0);
            Ok(())
        }
    }
}

fn write_sigs(writer: &mut Writer, sigs: &[TypeSig]) -> Result<()> {
    write_count(writer, sigs.len())?;
    for sig in sigs {
        encode_type_sig(writer, sig)?;
    }
    Ok(())
}

fn write_count(writer: &mut Writer, count: usize) -> Result<()> {
    let count = u32::try_from(count).map_err(|_| malformed_error!("Table too large - {}", count))?;
    writer.write_compressed_uint(count)
}
