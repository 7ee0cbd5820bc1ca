//! One loaded module and its reference tables.
//!
//! A [`ModuleImage`] owns the type registry of one module plus every table that method bodies
//! point into through tokens: member references, type specs, method specs, standalone
//! signatures and user strings. All tables are append-only and can be extended through a shared
//! reference; a table row's token is its 1-based position.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crate::{
    assembly::CallResolver,
    metadata::{
        customattributes::CustomAttribute,
        members::{FieldRc, MemberRef, MemberRefSignature, MethodSpec},
        method::MethodRc,
        token::{table, Token},
        typesystem::{MethodSig, TypeRc, TypeRegistry, TypeSig},
    },
};

/// A row of the standalone signature table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StandAloneSignature {
    /// Local variable types of a method body
    Locals(Vec<TypeSig>),
    /// Call site signature of `calli`
    Method(MethodSig),
}

/// A module: its types, assembly-level attributes and reference tables.
pub struct ModuleImage {
    name: Arc<str>,
    references: boxcar::Vec<String>,
    assembly_attributes: boxcar::Vec<CustomAttribute>,
    types: Arc<TypeRegistry>,
    member_refs: boxcar::Vec<MemberRef>,
    type_specs: boxcar::Vec<TypeSig>,
    method_specs: boxcar::Vec<MethodSpec>,
    standalone_sigs: boxcar::Vec<StandAloneSignature>,
    user_strings: boxcar::Vec<String>,
    next_field: AtomicU32,
    next_method: AtomicU32,
    next_property: AtomicU32,
}

impl ModuleImage {
    /// Create an empty module
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        let name = name.into();
        ModuleImage {
            types: Arc::new(TypeRegistry::new(name.clone())),
            name,
            references: boxcar::Vec::new(),
            assembly_attributes: boxcar::Vec::new(),
            member_refs: boxcar::Vec::new(),
            type_specs: boxcar::Vec::new(),
            method_specs: boxcar::Vec::new(),
            standalone_sigs: boxcar::Vec::new(),
            user_strings: boxcar::Vec::new(),
            next_field: AtomicU32::new(1),
            next_method: AtomicU32::new(1),
            next_property: AtomicU32::new(1),
        }
    }

    /// Module name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Module name as shared string
    #[must_use]
    pub fn name_arc(&self) -> &Arc<str> {
        &self.name
    }

    /// Names of the referenced modules, in declaration order
    #[must_use]
    pub fn references(&self) -> Vec<String> {
        self.references.iter().map(|(_, name)| name.clone()).collect()
    }

    /// True if `module` is among the referenced modules
    #[must_use]
    pub fn references_module(&self, module: &str) -> bool {
        self.references.iter().any(|(_, name)| name == module)
    }

    /// Declare a module reference; duplicates are ignored
    pub fn add_reference(&self, module: impl Into<String>) {
        let module = module.into();
        if !self.references_module(&module) {
            self.references.push(module);
        }
    }

    /// Assembly-level custom attributes
    #[must_use]
    pub fn assembly_attributes(&self) -> &boxcar::Vec<CustomAttribute> {
        &self.assembly_attributes
    }

    /// Add an assembly-level custom attribute
    pub fn add_assembly_attribute(&self, attribute: CustomAttribute) {
        self.assembly_attributes.push(attribute);
    }

    /// The type definitions of this module
    #[must_use]
    pub fn types(&self) -> &Arc<TypeRegistry> {
        &self.types
    }

    /// Reserve the next `Field` token
    pub fn next_field_token(&self) -> Token {
        Token::from_parts(table::FIELD, self.next_field.fetch_add(1, Ordering::Relaxed))
    }

    /// Reserve the next `MethodDef` token
    pub fn next_method_token(&self) -> Token {
        Token::from_parts(table::METHODDEF, self.next_method.fetch_add(1, Ordering::Relaxed))
    }

    /// Reserve the next `Property` token
    pub fn next_property_token(&self) -> Token {
        Token::from_parts(table::PROPERTY, self.next_property.fetch_add(1, Ordering::Relaxed))
    }

    /// Make sure later reservations never hand out `token` again
    pub fn observe_token(&self, token: Token) {
        let counter = match token.table() {
            table::FIELD => &self.next_field,
            table::METHODDEF => &self.next_method,
            table::PROPERTY => &self.next_property,
            _ => return,
        };
        counter.fetch_max(token.row() + 1, Ordering::Relaxed);
    }

    /// Add a member reference, reusing an identical existing row
    pub fn add_member_ref(&self, member: MemberRef) -> Token {
        if let Some((index, _)) = self.member_refs.iter().find(|(_, existing)| **existing == member) {
            return row_token(table::MEMBERREF, index);
        }
        row_token(table::MEMBERREF, self.member_refs.push(member))
    }

    /// Append a member reference row as is, keeping the row numbers of a loaded image
    pub(crate) fn push_member_ref(&self, member: MemberRef) -> Token {
        row_token(table::MEMBERREF, self.member_refs.push(member))
    }

    /// Append a type spec row as is, keeping the row numbers of a loaded image
    pub(crate) fn push_type_spec(&self, sig: TypeSig) -> Token {
        row_token(table::TYPESPEC, self.type_specs.push(sig))
    }

    /// Look up a member reference
    #[must_use]
    pub fn member_ref(&self, token: Token) -> Option<&MemberRef> {
        self.member_refs.get(row_index(token, table::MEMBERREF)?)
    }

    /// All member references in token order
    #[must_use]
    pub fn member_refs(&self) -> &boxcar::Vec<MemberRef> {
        &self.member_refs
    }

    /// Add a type spec, reusing an identical existing row
    pub fn add_type_spec(&self, sig: TypeSig) -> Token {
        if let Some((index, _)) = self.type_specs.iter().find(|(_, existing)| **existing == sig) {
            return row_token(table::TYPESPEC, index);
        }
        row_token(table::TYPESPEC, self.type_specs.push(sig))
    }

    /// Look up a type spec
    #[must_use]
    pub fn type_spec(&self, token: Token) -> Option<&TypeSig> {
        self.type_specs.get(row_index(token, table::TYPESPEC)?)
    }

    /// All type specs in token order
    #[must_use]
    pub fn type_specs(&self) -> &boxcar::Vec<TypeSig> {
        &self.type_specs
    }

    /// Add a generic method instantiation
    pub fn add_method_spec(&self, spec: MethodSpec) -> Token {
        row_token(table::METHODSPEC, self.method_specs.push(spec))
    }

    /// Look up a generic method instantiation
    #[must_use]
    pub fn method_spec(&self, token: Token) -> Option<&MethodSpec> {
        self.method_specs.get(row_index(token, table::METHODSPEC)?)
    }

    /// All method specs in token order
    #[must_use]
    pub fn method_specs(&self) -> &boxcar::Vec<MethodSpec> {
        &self.method_specs
    }

    /// Add a standalone signature
    pub fn add_standalone_sig(&self, sig: StandAloneSignature) -> Token {
        row_token(table::STANDALONESIG, self.standalone_sigs.push(sig))
    }

    /// Look up a standalone signature
    #[must_use]
    pub fn standalone_sig(&self, token: Token) -> Option<&StandAloneSignature> {
        self.standalone_sigs.get(row_index(token, table::STANDALONESIG)?)
    }

    /// All standalone signatures in token order
    #[must_use]
    pub fn standalone_sigs(&self) -> &boxcar::Vec<StandAloneSignature> {
        &self.standalone_sigs
    }

    /// Add a user string for `ldstr`
    pub fn add_user_string(&self, value: impl Into<String>) -> Token {
        row_token(table::USERSTRING, self.user_strings.push(value.into()))
    }

    /// Look up a user string
    #[must_use]
    pub fn user_string(&self, token: Token) -> Option<&str> {
        self.user_strings
            .get(row_index(token, table::USERSTRING)?)
            .map(String::as_str)
    }

    /// All user strings in token order
    #[must_use]
    pub fn user_strings(&self) -> &boxcar::Vec<String> {
        &self.user_strings
    }

    /// Find a field definition and its declaring type
    #[must_use]
    pub fn field(&self, token: Token) -> Option<(TypeRc, FieldRc)> {
        self.types.iter().find_map(|ty| {
            let field = ty
                .fields
                .iter()
                .find(|(_, field)| field.token == token)
                .map(|(_, field)| field.clone())?;
            Some((ty, field))
        })
    }

    /// Find a method definition and its declaring type
    #[must_use]
    pub fn method(&self, token: Token) -> Option<(TypeRc, MethodRc)> {
        self.types.iter().find_map(|ty| {
            let method = ty.method(token)?;
            Some((ty, method))
        })
    }
}

impl CallResolver for ModuleImage {
    fn call_signature(&self, token: Token) -> Option<MethodSig> {
        match token.table() {
            table::METHODDEF => self.method(token).map(|(_, method)| method.signature.clone()),
            table::MEMBERREF => match &self.member_ref(token)?.signature {
                MemberRefSignature::Method(sig) => Some(sig.clone()),
                MemberRefSignature::Field(_) => None,
            },
            table::METHODSPEC => self.call_signature(self.method_spec(token)?.method),
            _ => None,
        }
    }
}

impl std::fmt::Debug for ModuleImage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleImage")
            .field("name", &self.name)
            .field("types", &self.types.len())
            .field("member_refs", &self.member_refs.count())
            .finish_non_exhaustive()
    }
}

fn row_token(table: u8, index: usize) -> Token {
    Token::from_parts(table, u32::try_from(index + 1).unwrap_or(u32::MAX))
}

fn row_index(token: Token, table: u8) -> Option<usize> {
    if !token.is_table(table) {
        return None;
    }
    Some(token.row() as usize - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::{PrimitiveKind, TypeName};

    #[test]
    fn reference_tables_dedupe() {
        let module = ModuleImage::new("Game");
        let parent = TypeSig::Class(TypeName::new("Game", "Game", "A"));

        let first = module.add_member_ref(MemberRef::default_constructor(parent.clone()));
        let second = module.add_member_ref(MemberRef::default_constructor(parent));
        assert_eq!(first, second);
        assert_eq!(first, Token::new(0x0A00_0001));
        assert_eq!(module.member_refs().count(), 1);

        let spec = module.add_type_spec(TypeSig::Primitive(PrimitiveKind::I4));
        assert_eq!(spec, Token::new(0x1B00_0001));
        assert_eq!(module.type_spec(spec), Some(&TypeSig::Primitive(PrimitiveKind::I4)));
        assert!(module.type_spec(Token::new(0x1B00_0002)).is_none());
        assert!(module.type_spec(first).is_none());

        let text = module.add_user_string("hello");
        assert_eq!(module.user_string(text), Some("hello"));
    }

    #[test]
    fn call_signatures() {
        let module = ModuleImage::new("Game");
        let ctor = module.add_member_ref(MemberRef::default_constructor(TypeSig::object()));
        let sig = module.call_signature(ctor).unwrap();
        assert_eq!(sig.stack_pops(), 1);
        assert_eq!(sig.stack_pushes(), 0);
        assert!(module.call_signature(Token::new(0x0600_0001)).is_none());
    }

    #[test]
    fn token_counters() {
        let module = ModuleImage::new("Game");
        assert_eq!(module.next_field_token(), Token::new(0x0400_0001));
        module.observe_token(Token::new(0x0400_0009));
        assert_eq!(module.next_field_token(), Token::new(0x0400_000A));
        assert_eq!(module.next_method_token(), Token::new(0x0600_0001));

        module.add_reference("mscorlib");
        module.add_reference("mscorlib");
        assert_eq!(module.references(), vec!["mscorlib".to_string()]);
    }
}
