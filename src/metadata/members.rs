//! Fields, properties and the reference tables method bodies point into.

use std::sync::Arc;

use crate::metadata::{
    customattributes::CustomAttribute,
    token::Token,
    typesystem::{MethodSig, TypeSig},
};

/// A reference counted field
pub type FieldRc = Arc<FieldDef>;
/// A reference counted property
pub type PropertyRc = Arc<PropertyDef>;

#[allow(non_snake_case)]
/// Field attribute flag constants (ECMA-335 II.23.1.5)
pub mod FieldAttributes {
    /// Mask for the access bits
    pub const FIELD_ACCESS_MASK: u32 = 0x0007;
    /// Accessible only by the parent type
    pub const PRIVATE: u32 = 0x0001;
    /// Accessible inside the assembly
    pub const ASSEMBLY: u32 = 0x0003;
    /// Accessible by the type and its sub-types
    pub const FAMILY: u32 = 0x0004;
    /// Accessible everywhere
    pub const PUBLIC: u32 = 0x0006;
    /// Defined on the type, else per instance
    pub const STATIC: u32 = 0x0010;
    /// Only assignable during initialization
    pub const INIT_ONLY: u32 = 0x0020;
    /// Field is special
    pub const SPECIAL_NAME: u32 = 0x0200;
}

#[allow(non_snake_case)]
/// Property attribute flag constants (ECMA-335 II.23.1.14)
pub mod PropertyAttributes {
    /// Property is special
    pub const SPECIAL_NAME: u32 = 0x0200;
    /// Runtime checks the name encoding
    pub const RT_SPECIAL_NAME: u32 = 0x0400;
    /// Property has a default value
    pub const HAS_DEFAULT: u32 = 0x1000;
}

/// A field definition
#[derive(Debug)]
pub struct FieldDef {
    /// `Field` token
    pub token: Token,
    /// Field name
    pub name: String,
    /// [`FieldAttributes`] flags
    pub flags: u32,
    /// Field type
    pub signature: TypeSig,
    /// Custom attributes
    pub custom_attributes: boxcar::Vec<CustomAttribute>,
}

impl FieldDef {
    /// Create a field without attributes
    pub fn new(token: Token, name: impl Into<String>, flags: u32, signature: TypeSig) -> Self {
        FieldDef {
            token,
            name: name.into(),
            flags,
            signature,
            custom_attributes: boxcar::Vec::new(),
        }
    }

    /// True for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags & FieldAttributes::STATIC != 0
    }

    /// Custom attributes with the given attribute type full name
    pub fn attributes_of<'a>(
        &'a self,
        fullname: &'a str,
    ) -> impl Iterator<Item = &'a CustomAttribute> + 'a {
        self.custom_attributes
            .iter()
            .map(|(_, attribute)| attribute)
            .filter(move |attribute| attribute.is(fullname))
    }
}

/// A property definition
#[derive(Debug)]
pub struct PropertyDef {
    /// `Property` token
    pub token: Token,
    /// Property name
    pub name: String,
    /// [`PropertyAttributes`] flags
    pub flags: u32,
    /// Property type
    pub signature: TypeSig,
    /// `get_` accessor method
    pub getter: Option<Token>,
    /// `set_` accessor method
    pub setter: Option<Token>,
    /// Custom attributes
    pub custom_attributes: boxcar::Vec<CustomAttribute>,
}

impl PropertyDef {
    /// Create a property without attributes
    pub fn new(
        token: Token,
        name: impl Into<String>,
        signature: TypeSig,
        getter: Option<Token>,
        setter: Option<Token>,
    ) -> Self {
        PropertyDef {
            token,
            name: name.into(),
            flags: 0,
            signature,
            getter,
            setter,
            custom_attributes: boxcar::Vec::new(),
        }
    }

    /// Custom attributes with the given attribute type full name
    pub fn attributes_of<'a>(
        &'a self,
        fullname: &'a str,
    ) -> impl Iterator<Item = &'a CustomAttribute> + 'a {
        self.custom_attributes
            .iter()
            .map(|(_, attribute)| attribute)
            .filter(move |attribute| attribute.is(fullname))
    }
}

/// Signature of a member reference
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MemberRefSignature {
    /// Reference to a field of the given type
    Field(TypeSig),
    /// Reference to a method
    Method(MethodSig),
}

/// A reference to a field or method through the signature of its declaring type.
///
/// Member references are how a body calls into instantiated generic types, e.g. the base
/// constructor of `TInt<int>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberRef {
    /// Declaring type, possibly a generic instantiation
    pub parent: TypeSig,
    /// Member name
    pub name: String,
    /// Member signature
    pub signature: MemberRefSignature,
}

impl MemberRef {
    /// A reference to the parameterless instance constructor of `parent`
    #[must_use]
    pub fn default_constructor(parent: TypeSig) -> Self {
        MemberRef {
            parent,
            name: ".ctor".to_string(),
            signature: MemberRefSignature::Method(MethodSig::instance(TypeSig::void(), Vec::new())),
        }
    }
}

/// An instantiation of a generic method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSpec {
    /// `MethodDef` or `MemberRef` token of the generic method
    pub method: Token,
    /// Generic arguments
    pub instantiation: Vec<TypeSig>,
}
