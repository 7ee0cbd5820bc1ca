//! Fluent construction of modules and type definitions.
//!
//! [`ModuleBuilder`] creates an empty [`ModuleImage`]; [`ClassBuilder`] adds one class or
//! interface to it, together with fields, auto-properties, constructors and methods whose
//! bodies are given as instruction lists. The weaver emits all of its generated types through
//! these builders, and hosts use them to create fixture modules.
//!
//! # Example
//!
//! ```rust
//! use dotweave::metadata::{
//!     builder::{ClassBuilder, ModuleBuilder},
//!     typesystem::{PrimitiveKind, TypeSig},
//! };
//!
//! let module = ModuleBuilder::new("Game").reference("mscorlib").build();
//! let player = ClassBuilder::new(&module, "Game", "Player")
//!     .auto_property("Health", TypeSig::Primitive(PrimitiveKind::I4), Vec::new())
//!     .default_constructor()
//!     .build()?;
//!
//! assert!(player.property("Health").is_some());
//! assert!(player.field("<Health>k__BackingField").is_some());
//! assert!(player.default_constructor().is_some());
//! # Ok::<(), dotweave::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    assembly::{compute_max_stack, Instruction, InstructionStream},
    metadata::{
        customattributes::CustomAttribute,
        members::{FieldAttributes, FieldDef, MemberRef, PropertyDef},
        method::{MethodAccessFlags, MethodBody, MethodDef, MethodModifiers},
        module::ModuleImage,
        typesystem::{GenericParam, MethodSig, TypeAttributes, TypeDef, TypeRc, TypeSig},
    },
    Result,
};

/// Method attributes of accessors: `public hidebysig specialname`
pub const ACCESSOR_FLAGS: u32 = MethodAccessFlags::PUBLIC.bits()
    | MethodModifiers::HIDE_BY_SIG.bits()
    | MethodModifiers::SPECIAL_NAME.bits();

/// Method attributes of constructors: `public hidebysig specialname rtspecialname`
pub const CONSTRUCTOR_FLAGS: u32 = ACCESSOR_FLAGS | MethodModifiers::RTSPECIAL_NAME.bits();

/// Creates an empty module with references and assembly attributes.
pub struct ModuleBuilder {
    module: ModuleImage,
}

impl ModuleBuilder {
    /// Start a module named `name`
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        ModuleBuilder {
            module: ModuleImage::new(name),
        }
    }

    /// Declare a referenced module
    #[must_use]
    pub fn reference(self, module: &str) -> Self {
        self.module.add_reference(module);
        self
    }

    /// Add an assembly-level custom attribute
    #[must_use]
    pub fn assembly_attribute(self, attribute: CustomAttribute) -> Self {
        self.module.add_assembly_attribute(attribute);
        self
    }

    /// Finish the module
    #[must_use]
    pub fn build(self) -> ModuleImage {
        self.module
    }
}

enum PendingMember {
    Field {
        name: String,
        flags: u32,
        signature: TypeSig,
        attributes: Vec<CustomAttribute>,
    },
    Property {
        name: String,
        signature: TypeSig,
        setter: bool,
        attributes: Vec<CustomAttribute>,
    },
    DefaultConstructor,
    Method {
        name: String,
        flags: u32,
        signature: MethodSig,
        code: Option<Vec<Instruction>>,
    },
}

/// Provides a fluent API for building one class or interface of a module.
pub struct ClassBuilder<'a> {
    module: &'a ModuleImage,
    namespace: String,
    name: String,
    flags: u32,
    base: Option<TypeSig>,
    interfaces: Vec<TypeSig>,
    generic_params: Vec<GenericParam>,
    enclosing: Option<TypeRc>,
    attributes: Vec<CustomAttribute>,
    members: Vec<PendingMember>,
}

impl<'a> ClassBuilder<'a> {
    /// Start a public class deriving from `System.Object`
    ///
    /// ## Arguments
    /// * 'module'    - The module the class is added to
    /// * 'namespace' - Namespace, empty for the global namespace
    /// * 'name'      - Simple name, including a generic arity suffix for generic classes
    pub fn new(module: &'a ModuleImage, namespace: &str, name: &str) -> Self {
        ClassBuilder {
            module,
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags: TypeAttributes::PUBLIC,
            base: Some(TypeSig::object()),
            interfaces: Vec::new(),
            generic_params: Vec::new(),
            enclosing: None,
            attributes: Vec::new(),
            members: Vec::new(),
        }
    }

    /// Start a public interface
    ///
    /// ## Arguments
    /// * 'module'    - The module the interface is added to
    /// * 'namespace' - Namespace, empty for the global namespace
    /// * 'name'      - Simple name
    pub fn interface(module: &'a ModuleImage, namespace: &str, name: &str) -> Self {
        ClassBuilder {
            flags: TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT,
            base: None,
            ..ClassBuilder::new(module, namespace, name)
        }
    }

    /// Replace all type attribute flags
    #[must_use]
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Replace the visibility bits
    #[must_use]
    pub fn visibility(mut self, visibility: u32) -> Self {
        self.flags = (self.flags & !TypeAttributes::VISIBILITY_MASK)
            | (visibility & TypeAttributes::VISIBILITY_MASK);
        self
    }

    /// Mark the type abstract
    #[must_use]
    pub fn abstract_type(mut self) -> Self {
        self.flags |= TypeAttributes::ABSTRACT;
        self
    }

    /// Mark the type sealed
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.flags |= TypeAttributes::SEALED;
        self
    }

    /// Declare the next generic parameter
    #[must_use]
    pub fn generic_param(mut self, name: &str) -> Self {
        let number = u16::try_from(self.generic_params.len()).unwrap_or(u16::MAX);
        self.generic_params.push(GenericParam::new(number, name));
        self
    }

    /// Declare the next generic parameter with [`crate::metadata::typesystem::GenericParamAttributes`]
    #[must_use]
    pub fn constrained_param(mut self, name: &str, flags: u16) -> Self {
        let number = u16::try_from(self.generic_params.len()).unwrap_or(u16::MAX);
        let mut param = GenericParam::new(number, name);
        param.flags = flags;
        self.generic_params.push(param);
        self
    }

    /// Set the base type
    #[must_use]
    pub fn extends(mut self, base: TypeSig) -> Self {
        self.base = Some(base);
        self
    }

    /// Add an implemented interface
    #[must_use]
    pub fn implements(mut self, interface: TypeSig) -> Self {
        self.interfaces.push(interface);
        self
    }

    /// Nest the type inside `outer`; a public type becomes nested public
    #[must_use]
    pub fn nested_in(mut self, outer: &TypeRc) -> Self {
        if self.flags & TypeAttributes::VISIBILITY_MASK == TypeAttributes::PUBLIC {
            self = self.visibility(TypeAttributes::NESTED_PUBLIC);
        } else if self.flags & TypeAttributes::VISIBILITY_MASK == TypeAttributes::NOT_PUBLIC {
            self = self.visibility(TypeAttributes::NESTED_ASSEMBLY);
        }
        self.namespace = outer.namespace.clone();
        self.enclosing = Some(outer.clone());
        self
    }

    /// Apply a custom attribute to the type
    #[must_use]
    pub fn attribute(mut self, attribute: CustomAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add a field
    ///
    /// ## Arguments
    /// * 'name'       - Field name
    /// * 'flags'      - [`FieldAttributes`] flags
    /// * 'signature'  - Field type
    /// * 'attributes' - Custom attributes of the field
    #[must_use]
    pub fn field(
        mut self,
        name: &str,
        flags: u32,
        signature: TypeSig,
        attributes: Vec<CustomAttribute>,
    ) -> Self {
        self.members.push(PendingMember::Field {
            name: name.to_string(),
            flags,
            signature,
            attributes,
        });
        self
    }

    /// Add an auto-property with compiler-style backing field, getter and setter
    #[must_use]
    pub fn auto_property(
        mut self,
        name: &str,
        signature: TypeSig,
        attributes: Vec<CustomAttribute>,
    ) -> Self {
        self.members.push(PendingMember::Property {
            name: name.to_string(),
            signature,
            setter: true,
            attributes,
        });
        self
    }

    /// Add an auto-property that only has a getter
    #[must_use]
    pub fn getter_only_property(
        mut self,
        name: &str,
        signature: TypeSig,
        attributes: Vec<CustomAttribute>,
    ) -> Self {
        self.members.push(PendingMember::Property {
            name: name.to_string(),
            signature,
            setter: false,
            attributes,
        });
        self
    }

    /// Add a public parameterless constructor calling the base constructor
    #[must_use]
    pub fn default_constructor(mut self) -> Self {
        self.members.push(PendingMember::DefaultConstructor);
        self
    }

    /// Add a method; `code` is `None` for abstract methods
    #[must_use]
    pub fn method(
        mut self,
        name: &str,
        flags: u32,
        signature: MethodSig,
        code: Option<Vec<Instruction>>,
    ) -> Self {
        self.members.push(PendingMember::Method {
            name: name.to_string(),
            flags,
            signature,
            code,
        });
        self
    }

    /// Create the type, its members and register it with the module.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateTypeRegistration`] if the full name is taken, and
    /// [`crate::Error::Malformed`] or [`crate::Error::StackImbalance`] for method bodies that
    /// cannot be encoded.
    pub fn build(self) -> Result<TypeRc> {
        let registry = self.module.types();
        let ty = Arc::new(TypeDef::new(
            registry.next_token(),
            self.module.name_arc().clone(),
            self.namespace,
            self.name,
            self.flags,
            self.base,
            self.generic_params,
            self.enclosing
                .as_ref()
                .map(|outer| (outer.token, outer.fullname.as_str())),
        ));

        for interface in self.interfaces {
            ty.interfaces.push(interface);
        }
        for attribute in self.attributes {
            ty.custom_attributes.push(attribute);
        }

        for member in self.members {
            match member {
                PendingMember::Field {
                    name,
                    flags,
                    signature,
                    attributes,
                } => {
                    let field = FieldDef::new(self.module.next_field_token(), name, flags, signature);
                    for attribute in attributes {
                        field.custom_attributes.push(attribute);
                    }
                    ty.fields.push(Arc::new(field));
                }
                PendingMember::Property {
                    name,
                    signature,
                    setter,
                    attributes,
                } => add_auto_property(self.module, &ty, &name, signature, setter, attributes)?,
                PendingMember::DefaultConstructor => {
                    let base = ty.base.clone().unwrap_or_else(TypeSig::object);
                    let method = constructor(self.module, base)?;
                    ty.methods.push(Arc::new(method));
                }
                PendingMember::Method {
                    name,
                    flags,
                    signature,
                    code,
                } => {
                    let mut method = MethodDef::new(self.module.next_method_token(), name, flags, signature);
                    if let Some(code) = code {
                        let body = encode_body(self.module, code, &method.signature)?;
                        method = method.with_body(body);
                    }
                    ty.methods.push(Arc::new(method));
                }
            }
        }

        registry.insert(ty.clone())?;
        if let Some(outer) = &self.enclosing {
            outer.nested_types.push(ty.token);
        }
        Ok(ty)
    }
}

/// The name of the compiler-generated backing field of an auto-property
#[must_use]
pub fn backing_field_name(property: &str) -> String {
    format!("<{property}>k__BackingField")
}

/// The property name behind a compiler-generated backing field name
#[must_use]
pub fn property_of_backing_field(field: &str) -> Option<&str> {
    field.strip_prefix('<')?.strip_suffix(">k__BackingField")
}

/// A `public hidebysig specialname rtspecialname` constructor whose body is
/// `ldarg.0; call instance void <base>::.ctor(); ret`, calling through a member reference.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the body cannot be encoded.
pub fn constructor(module: &ModuleImage, base: TypeSig) -> Result<MethodDef> {
    let base_ctor = module.add_member_ref(MemberRef::default_constructor(base));
    let signature = MethodSig::instance(TypeSig::void(), Vec::new());
    let code = vec![
        Instruction::simple("ldarg.0")?,
        Instruction::with_token("call", base_ctor)?,
        Instruction::simple("ret")?,
    ];
    let body = encode_body(module, code, &signature)?;
    Ok(MethodDef::new(module.next_method_token(), ".ctor", CONSTRUCTOR_FLAGS, signature).with_body(body))
}

/// Encode an instruction list as a method body with computed `max_stack`.
///
/// # Errors
/// Returns [`crate::Error::StackImbalance`] if the code does not balance and
/// [`crate::Error::Malformed`] if it cannot be encoded.
pub fn encode_body(module: &ModuleImage, code: Vec<Instruction>, signature: &MethodSig) -> Result<MethodBody> {
    let stream = InstructionStream::new(code);
    let max_stack = compute_max_stack(&stream, signature.stack_pushes() == 1, module)?;
    let (body, _) = stream.to_body(&MethodBody::new(Vec::new(), 0), max_stack)?;
    Ok(body)
}

fn add_auto_property(
    module: &ModuleImage,
    ty: &TypeRc,
    name: &str,
    signature: TypeSig,
    setter: bool,
    attributes: Vec<CustomAttribute>,
) -> Result<()> {
    let backing = FieldDef::new(
        module.next_field_token(),
        backing_field_name(name),
        FieldAttributes::PRIVATE,
        signature.clone(),
    );
    let backing_token = backing.token;
    ty.fields.push(Arc::new(backing));

    let getter_sig = MethodSig::instance(signature.clone(), Vec::new());
    let getter_body = encode_body(
        module,
        vec![
            Instruction::simple("ldarg.0")?,
            Instruction::with_token("ldfld", backing_token)?,
            Instruction::simple("ret")?,
        ],
        &getter_sig,
    )?;
    let getter = MethodDef::new(module.next_method_token(), format!("get_{name}"), ACCESSOR_FLAGS, getter_sig)
        .with_body(getter_body);
    let getter_token = getter.token;
    ty.methods.push(Arc::new(getter));

    let setter_token = if setter {
        let setter_sig = MethodSig::instance(TypeSig::void(), vec![signature.clone()]);
        let setter_body = encode_body(
            module,
            vec![
                Instruction::simple("ldarg.0")?,
                Instruction::simple("ldarg.1")?,
                Instruction::with_token("stfld", backing_token)?,
                Instruction::simple("ret")?,
            ],
            &setter_sig,
        )?;
        let mut method =
            MethodDef::new(module.next_method_token(), format!("set_{name}"), ACCESSOR_FLAGS, setter_sig)
                .with_body(setter_body);
        method.param_names.push("value".to_string());
        let token = method.token;
        ty.methods.push(Arc::new(method));
        Some(token)
    } else {
        None
    };

    let property = PropertyDef::new(
        module.next_property_token(),
        name,
        signature,
        Some(getter_token),
        setter_token,
    );
    for attribute in attributes {
        property.custom_attributes.push(attribute);
    }
    ty.properties.push(Arc::new(property));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::decode_stream,
        metadata::typesystem::{PrimitiveKind, TypeName},
        Error,
    };

    #[test]
    fn class_with_members() {
        let module = ModuleBuilder::new("Game").build();
        let base = ClassBuilder::new(&module, "Game", "Base")
            .default_constructor()
            .build()
            .unwrap();
        let derived = ClassBuilder::new(&module, "Game", "Derived")
            .extends(base.definition_sig())
            .auto_property("Value", TypeSig::Primitive(PrimitiveKind::I4), Vec::new())
            .default_constructor()
            .build()
            .unwrap();

        let property = derived.property("Value").unwrap();
        let getter = derived.method(property.getter.unwrap()).unwrap();
        let getter_code = decode_stream(&getter.body().unwrap().code).unwrap();
        assert_eq!(getter_code.len(), 3);
        assert_eq!(getter_code[0].mnemonic, "ldarg.0");
        assert_eq!(getter_code[1].mnemonic, "ldfld");
        assert_eq!(getter.body().unwrap().max_stack, 1);

        let setter = derived.method(property.setter.unwrap()).unwrap();
        assert_eq!(setter.body().unwrap().max_stack, 2);

        let ctor = derived.default_constructor().unwrap();
        let code = decode_stream(&ctor.body().unwrap().code).unwrap();
        let reference = module.member_ref(code[1].token().unwrap()).unwrap();
        assert_eq!(reference.parent, TypeSig::Class(TypeName::new("Game", "Game", "Base")));
        assert_eq!(ctor.flags, CONSTRUCTOR_FLAGS);
    }

    #[test]
    fn nested_and_interfaces() {
        let module = ModuleBuilder::new("Game").build();
        let outer = ClassBuilder::new(&module, "Game", "Outer").build().unwrap();
        let marker = ClassBuilder::interface(&module, "", "IBase")
            .nested_in(&outer)
            .build()
            .unwrap();

        assert_eq!(marker.fullname, "Game.Outer/IBase");
        assert!(marker.is_interface());
        assert_eq!(marker.flags & TypeAttributes::VISIBILITY_MASK, TypeAttributes::NESTED_PUBLIC);
        assert_eq!(outer.nested_types.count(), 1);
        assert!(module.types().get_by_fullname("Game.Outer/IBase").is_some());

        let duplicate = ClassBuilder::new(&module, "Game", "Outer").build();
        assert!(matches!(duplicate, Err(Error::DuplicateTypeRegistration(_))));
    }

    #[test]
    fn backing_field_names() {
        assert_eq!(backing_field_name("Data"), "<Data>k__BackingField");
        assert_eq!(property_of_backing_field("<Data>k__BackingField"), Some("Data"));
        assert_eq!(property_of_backing_field("_data"), None);
    }
}
