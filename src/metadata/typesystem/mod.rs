//! Type definitions, type signatures and their lookup across modules.
//!
//! - [`TypeDef`] is one row of a module's type table together with its members. Members can be
//!   appended through a shared reference, which lets the weaver add fields, nested types and
//!   interfaces to types that are already referenced from the type tree.
//! - [`TypeSig`] is a type as it appears in a signature: primitives, named definitions, generic
//!   instantiations and generic parameters.
//! - [`TypeRegistry`] indexes the types of one module by token and full name.
//! - [`TypeUniverse`] resolves [`TypeName`]s across every loaded module.

mod registry;
mod signature;
mod universe;

use std::sync::Arc;

pub use registry::TypeRegistry;
pub use signature::{
    MethodSig, PrimitiveKind, TypeName, TypeSig, CALLING_CONVENTION, ELEMENT_TYPE,
};
pub use universe::TypeUniverse;

use crate::metadata::{
    customattributes::CustomAttribute,
    members::{FieldRc, PropertyRc},
    method::MethodRc,
    token::{Token, TypeKey},
};

/// A reference counted type definition
pub type TypeRc = Arc<TypeDef>;

#[allow(non_snake_case)]
/// Type attribute flag constants (ECMA-335 II.23.1.15)
pub mod TypeAttributes {
    /// Mask for the visibility bits
    pub const VISIBILITY_MASK: u32 = 0x0000_0007;
    /// Top-level type, not visible outside its module
    pub const NOT_PUBLIC: u32 = 0x0000_0000;
    /// Top-level type, visible everywhere
    pub const PUBLIC: u32 = 0x0000_0001;
    /// Nested type with public visibility
    pub const NESTED_PUBLIC: u32 = 0x0000_0002;
    /// Nested type with private visibility
    pub const NESTED_PRIVATE: u32 = 0x0000_0003;
    /// Nested type visible to subtypes
    pub const NESTED_FAMILY: u32 = 0x0000_0004;
    /// Nested type visible inside its assembly
    pub const NESTED_ASSEMBLY: u32 = 0x0000_0005;
    /// Nested type visible to subtypes inside its assembly
    pub const NESTED_FAM_AND_ASSEM: u32 = 0x0000_0006;
    /// Nested type visible to subtypes or inside its assembly
    pub const NESTED_FAM_OR_ASSEM: u32 = 0x0000_0007;
    /// Mask for class semantics
    pub const CLASS_SEMANTICS_MASK: u32 = 0x0000_0020;
    /// Type is a class
    pub const CLASS: u32 = 0x0000_0000;
    /// Type is an interface
    pub const INTERFACE: u32 = 0x0000_0020;
    /// Type is abstract
    pub const ABSTRACT: u32 = 0x0000_0080;
    /// Type cannot be derived from
    pub const SEALED: u32 = 0x0000_0100;
    /// Name is special
    pub const SPECIAL_NAME: u32 = 0x0000_0400;
    /// Type is serializable
    pub const SERIALIZABLE: u32 = 0x0000_2000;
    /// Static initialization may run any time before the first static field access
    pub const BEFORE_FIELD_INIT: u32 = 0x0010_0000;
}

#[allow(non_snake_case)]
/// Generic parameter attribute flag constants (ECMA-335 II.23.1.7)
pub mod GenericParamAttributes {
    /// Mask for the variance bits
    pub const VARIANCE_MASK: u16 = 0x0003;
    /// Covariant parameter
    pub const COVARIANT: u16 = 0x0001;
    /// Contravariant parameter
    pub const CONTRAVARIANT: u16 = 0x0002;
    /// Mask for the special constraint bits
    pub const SPECIAL_CONSTRAINT_MASK: u16 = 0x001C;
    /// `where T : class`
    pub const REFERENCE_TYPE_CONSTRAINT: u16 = 0x0004;
    /// `where T : struct`
    pub const NOT_NULLABLE_VALUE_TYPE_CONSTRAINT: u16 = 0x0008;
    /// `where T : new()`
    pub const DEFAULT_CONSTRUCTOR_CONSTRAINT: u16 = 0x0010;
}

/// A generic parameter declared by a type or method
#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    /// Position in the owner's parameter list
    pub number: u16,
    /// Declared name, e.g. `T`
    pub name: String,
    /// [`GenericParamAttributes`] flags
    pub flags: u16,
    /// Type constraints
    pub constraints: Vec<TypeSig>,
}

impl GenericParam {
    /// An unconstrained parameter
    pub fn new(number: u16, name: impl Into<String>) -> Self {
        GenericParam {
            number,
            name: name.into(),
            flags: 0,
            constraints: Vec::new(),
        }
    }

    /// Check the `class` / `struct` special constraints against a candidate argument.
    ///
    /// Arguments that are still open always pass; the check is repeated once they are bound.
    #[must_use]
    pub fn accepts(&self, argument: &TypeSig) -> bool {
        if argument.is_open() {
            return true;
        }
        if self.flags & GenericParamAttributes::REFERENCE_TYPE_CONSTRAINT != 0
            && argument.is_value_type()
        {
            return false;
        }
        if self.flags & GenericParamAttributes::NOT_NULLABLE_VALUE_TYPE_CONSTRAINT != 0
            && !argument.is_value_type()
        {
            return false;
        }
        true
    }
}

/// A type definition of one module.
pub struct TypeDef {
    /// `TypeDef` token
    pub token: Token,
    /// Name of the owning module
    pub module: Arc<str>,
    /// Namespace of the outermost enclosing type
    pub namespace: String,
    /// Simple name, including a generic arity suffix such as `` `2``
    pub name: String,
    /// Full name, `Namespace.Outer/Inner`
    pub fullname: String,
    /// [`TypeAttributes`] flags
    pub flags: u32,
    /// Base type, `None` for interfaces and `System.Object` itself
    pub base: Option<TypeSig>,
    /// Declared interfaces
    pub interfaces: boxcar::Vec<TypeSig>,
    /// Declared generic parameters
    pub generic_params: Vec<GenericParam>,
    /// Enclosing type of a nested type
    pub enclosing: Option<Token>,
    /// Directly nested types
    pub nested_types: boxcar::Vec<Token>,
    /// Fields
    pub fields: boxcar::Vec<FieldRc>,
    /// Methods
    pub methods: boxcar::Vec<MethodRc>,
    /// Properties
    pub properties: boxcar::Vec<PropertyRc>,
    /// Custom attributes
    pub custom_attributes: boxcar::Vec<CustomAttribute>,
}

impl TypeDef {
    /// Create a type definition without members.
    ///
    /// `enclosing` carries the token and full name of the enclosing type of a nested type.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        token: Token,
        module: Arc<str>,
        namespace: String,
        name: String,
        flags: u32,
        base: Option<TypeSig>,
        generic_params: Vec<GenericParam>,
        enclosing: Option<(Token, &str)>,
    ) -> Self {
        let fullname = match enclosing {
            Some((_, outer)) => format!("{outer}/{name}"),
            None if namespace.is_empty() => name.clone(),
            None => format!("{namespace}.{name}"),
        };

        TypeDef {
            token,
            module,
            namespace,
            name,
            fullname,
            flags,
            base,
            interfaces: boxcar::Vec::new(),
            generic_params,
            enclosing: enclosing.map(|(token, _)| token),
            nested_types: boxcar::Vec::new(),
            fields: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            properties: boxcar::Vec::new(),
            custom_attributes: boxcar::Vec::new(),
        }
    }

    /// Identity of this type across modules
    #[must_use]
    pub fn key(&self) -> TypeKey {
        TypeKey::new(self.module.clone(), self.token)
    }

    /// A [`TypeName`] that resolves back to this definition
    #[must_use]
    pub fn type_name(&self) -> TypeName {
        let name = if self.namespace.is_empty() {
            self.fullname.as_str()
        } else {
            self.fullname
                .strip_prefix(self.namespace.as_str())
                .and_then(|rest| rest.strip_prefix('.'))
                .unwrap_or(&self.fullname)
        };
        TypeName::new(self.module.as_ref(), self.namespace.as_str(), name)
    }

    /// The open signature of this definition, `Class(..)` or `ValueType(..)`
    #[must_use]
    pub fn definition_sig(&self) -> TypeSig {
        if self.is_value_type() {
            TypeSig::ValueType(self.type_name())
        } else {
            TypeSig::Class(self.type_name())
        }
    }

    /// This definition instantiated with its own parameters, `Foo<!0, !1>`
    #[must_use]
    pub fn self_sig(&self) -> TypeSig {
        let args = (0..self.generic_params.len())
            .map(|index| TypeSig::Var(index as u32))
            .collect();
        TypeSig::instantiate(self.definition_sig(), args)
    }

    /// True for interfaces
    #[must_use]
    pub fn is_interface(&self) -> bool {
        self.flags & TypeAttributes::CLASS_SEMANTICS_MASK == TypeAttributes::INTERFACE
    }

    /// True for abstract types (interfaces included)
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.flags & TypeAttributes::ABSTRACT != 0
    }

    /// True for sealed types
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.flags & TypeAttributes::SEALED != 0
    }

    /// True for non-interface types
    #[must_use]
    pub fn is_class(&self) -> bool {
        !self.is_interface()
    }

    /// True for types deriving from `System.ValueType` or `System.Enum`
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match &self.base {
            Some(TypeSig::Class(name)) => {
                name.namespace == "System" && (name.name == "ValueType" || name.name == "Enum")
            }
            _ => false,
        }
    }

    /// True for nested types
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.enclosing.is_some()
    }

    /// True if the type declares generic parameters
    #[must_use]
    pub fn is_generic(&self) -> bool {
        !self.generic_params.is_empty()
    }

    /// True if the visibility bits of this type alone are public
    #[must_use]
    pub fn is_public(&self) -> bool {
        matches!(
            self.flags & TypeAttributes::VISIBILITY_MASK,
            TypeAttributes::PUBLIC | TypeAttributes::NESTED_PUBLIC
        )
    }

    /// The name without its generic arity suffix
    #[must_use]
    pub fn short_name(&self) -> &str {
        self.name.split('`').next().unwrap_or(&self.name)
    }

    /// Find a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldRc> {
        self.fields
            .iter()
            .find(|(_, field)| field.name == name)
            .map(|(_, field)| field.clone())
    }

    /// Find a method by token
    #[must_use]
    pub fn method(&self, token: Token) -> Option<MethodRc> {
        self.methods
            .iter()
            .find(|(_, method)| method.token == token)
            .map(|(_, method)| method.clone())
    }

    /// Find a property by name
    #[must_use]
    pub fn property(&self, name: &str) -> Option<PropertyRc> {
        self.properties
            .iter()
            .find(|(_, property)| property.name == name)
            .map(|(_, property)| property.clone())
    }

    /// The instance constructor without parameters, if declared
    #[must_use]
    pub fn default_constructor(&self) -> Option<MethodRc> {
        self.methods
            .iter()
            .map(|(_, method)| method)
            .find(|method| method.is_instance_constructor() && method.signature.params.is_empty())
            .cloned()
    }

    /// True if an attribute with the given full name is applied to this type
    #[must_use]
    pub fn has_attribute(&self, fullname: &str) -> bool {
        self.custom_attributes
            .iter()
            .any(|(_, attribute)| attribute.is(fullname))
    }
}

impl std::fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDef")
            .field("token", &self.token)
            .field("module", &self.module)
            .field("fullname", &self.fullname)
            .field("flags", &format_args!("0x{:08x}", self.flags))
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}
