use std::sync::Arc;

use dashmap::DashMap;

use crate::metadata::{
    token::TypeKey,
    typesystem::{TypeAttributes, TypeDef, TypeName, TypeRc, TypeRegistry, TypeSig},
};

/// Name resolution across every loaded module.
///
/// Signatures reference type definitions by [`TypeName`]; the universe maps such a name to the
/// definition in the module named by its scope. Names whose scope is not loaded (framework
/// assemblies, stripped references) do not resolve.
#[derive(Default)]
pub struct TypeUniverse {
    registries: DashMap<Arc<str>, Arc<TypeRegistry>>,
}

impl TypeUniverse {
    /// Create an empty universe
    #[must_use]
    pub fn new() -> Self {
        TypeUniverse {
            registries: DashMap::new(),
        }
    }

    /// Make the types of one module resolvable. A module added twice keeps its first registry.
    pub fn add(&self, registry: Arc<TypeRegistry>) {
        self.registries
            .entry(registry.module().clone())
            .or_insert(registry);
    }

    /// The registry of a loaded module
    #[must_use]
    pub fn registry(&self, module: &str) -> Option<Arc<TypeRegistry>> {
        self.registries.get(module).map(|entry| entry.value().clone())
    }

    /// Names of all loaded modules
    #[must_use]
    pub fn modules(&self) -> Vec<Arc<str>> {
        let mut modules: Vec<Arc<str>> =
            self.registries.iter().map(|entry| entry.key().clone()).collect();
        modules.sort();
        modules
    }

    /// Resolve a type name to its definition
    #[must_use]
    pub fn resolve(&self, name: &TypeName) -> Option<TypeRc> {
        self.registries
            .get(name.scope.as_str())?
            .get_by_fullname(&name.fullname())
    }

    /// Resolve the definition behind a signature (the open definition of an instantiation)
    #[must_use]
    pub fn resolve_sig(&self, sig: &TypeSig) -> Option<TypeRc> {
        self.resolve(sig.definition_name()?)
    }

    /// The identity key of the definition behind a signature
    #[must_use]
    pub fn key_of(&self, sig: &TypeSig) -> Option<TypeKey> {
        self.resolve_sig(sig).map(|ty| ty.key())
    }

    /// Look up a definition by key
    #[must_use]
    pub fn get(&self, key: &TypeKey) -> Option<TypeRc> {
        self.registries.get(key.module.as_ref())?.get(&key.token)
    }

    /// Structural type identity: named types compare by resolved key, falling back to the
    /// name when a side does not resolve; primitives compare by kind.
    #[must_use]
    pub fn same_type(&self, left: &TypeSig, right: &TypeSig) -> bool {
        match (left, right) {
            (TypeSig::Primitive(a), TypeSig::Primitive(b)) => a == b,
            (TypeSig::Class(a), TypeSig::Class(b))
            | (TypeSig::ValueType(a), TypeSig::ValueType(b))
            | (TypeSig::Class(a), TypeSig::ValueType(b))
            | (TypeSig::ValueType(a), TypeSig::Class(b)) => self.same_name(a, b),
            (TypeSig::GenericInst(base_a, args_a), TypeSig::GenericInst(base_b, args_b)) => {
                args_a.len() == args_b.len()
                    && self.same_type(base_a, base_b)
                    && args_a
                        .iter()
                        .zip(args_b.iter())
                        .all(|(a, b)| self.same_type(a, b))
            }
            (TypeSig::Var(a), TypeSig::Var(b)) | (TypeSig::MVar(a), TypeSig::MVar(b)) => a == b,
            (TypeSig::SzArray(a), TypeSig::SzArray(b)) | (TypeSig::ByRef(a), TypeSig::ByRef(b)) => {
                self.same_type(a, b)
            }
            _ => false,
        }
    }

    fn same_name(&self, left: &TypeName, right: &TypeName) -> bool {
        match (self.resolve(left), self.resolve(right)) {
            (Some(a), Some(b)) => a.key() == b.key(),
            (None, None) => left == right,
            _ => false,
        }
    }

    /// The enclosing type of a nested type
    #[must_use]
    pub fn enclosing(&self, ty: &TypeDef) -> Option<TypeRc> {
        let token = ty.enclosing?;
        self.registries.get(ty.module.as_ref())?.get(&token)
    }

    /// True if the type and every enclosing type are public
    #[must_use]
    pub fn is_effectively_public(&self, ty: &TypeDef) -> bool {
        if !ty.is_nested() {
            return ty.flags & TypeAttributes::VISIBILITY_MASK == TypeAttributes::PUBLIC;
        }
        if ty.flags & TypeAttributes::VISIBILITY_MASK != TypeAttributes::NESTED_PUBLIC {
            return false;
        }
        match self.enclosing(ty) {
            Some(outer) => self.is_effectively_public(&outer),
            None => false,
        }
    }

    /// The chain of enclosing types, outermost first, ending with `ty` itself
    #[must_use]
    pub fn enclosing_chain(&self, ty: &TypeRc) -> Vec<TypeRc> {
        let mut chain = vec![ty.clone()];
        let mut current = ty.clone();
        while let Some(outer) = self.enclosing(&current) {
            if chain.iter().any(|seen| seen.token == outer.token) {
                break;
            }
            chain.push(outer.clone());
            current = outer;
        }
        chain.reverse();
        chain
    }

    /// Every type of every loaded module, module by module in name order
    #[must_use]
    pub fn all_types(&self) -> Vec<TypeRc> {
        self.modules()
            .iter()
            .filter_map(|module| self.registry(module))
            .flat_map(|registry| registry.iter().collect::<Vec<_>>())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{
        token::Token,
        typesystem::{PrimitiveKind, TypeAttributes},
    };

    fn add(registry: &TypeRegistry, name: &str, flags: u32, enclosing: Option<&TypeRc>) -> TypeRc {
        let ty = Arc::new(TypeDef::new(
            registry.next_token(),
            registry.module().clone(),
            "Game".to_string(),
            name.to_string(),
            flags,
            Some(TypeSig::object()),
            Vec::new(),
            enclosing.map(|outer| (outer.token, outer.fullname.as_str())),
        ));
        registry.insert(ty.clone()).unwrap();
        if let Some(outer) = enclosing {
            outer.nested_types.push(ty.token);
        }
        ty
    }

    #[test]
    fn resolve_across_modules() {
        let core = Arc::new(TypeRegistry::new("Game.Core"));
        let main = Arc::new(TypeRegistry::new("Assembly-CSharp"));
        let a = add(&core, "A", TypeAttributes::PUBLIC, None);
        let b = add(&main, "A", TypeAttributes::PUBLIC, None);

        let universe = TypeUniverse::new();
        universe.add(core);
        universe.add(main);

        let resolved = universe
            .resolve(&TypeName::new("Game.Core", "Game", "A"))
            .unwrap();
        assert_eq!(resolved.key(), a.key());
        assert_ne!(resolved.key(), b.key());
        assert!(universe.resolve(&TypeName::new("mscorlib", "System", "Object")).is_none());
        assert_eq!(universe.get(&b.key()).unwrap().module.as_ref(), "Assembly-CSharp");
        assert_eq!(universe.all_types().len(), 2);
    }

    #[test]
    fn same_type_by_key() {
        let core = Arc::new(TypeRegistry::new("Game.Core"));
        add(&core, "A", TypeAttributes::PUBLIC, None);
        let universe = TypeUniverse::new();
        universe.add(core);

        let a = TypeSig::Class(TypeName::new("Game.Core", "Game", "A"));
        let list = |arg: TypeSig| {
            TypeSig::GenericInst(
                Box::new(TypeSig::Class(TypeName::new("mscorlib", "System.Collections.Generic", "List`1"))),
                vec![arg],
            )
        };
        assert!(universe.same_type(&a, &a.clone()));
        assert!(universe.same_type(&list(a.clone()), &list(a.clone())));
        assert!(!universe.same_type(&list(a), &list(TypeSig::Primitive(PrimitiveKind::I4))));
        assert!(!universe.same_type(&TypeSig::Var(0), &TypeSig::MVar(0)));
    }

    #[test]
    fn effective_visibility() {
        let core = Arc::new(TypeRegistry::new("Game.Core"));
        let outer = add(&core, "Outer", TypeAttributes::PUBLIC, None);
        let hidden = add(&core, "Hidden", TypeAttributes::NOT_PUBLIC, None);
        let inner = add(&core, "Inner", TypeAttributes::NESTED_PUBLIC, Some(&outer));
        let private = add(&core, "Private", TypeAttributes::NESTED_PRIVATE, Some(&outer));
        let under_hidden = add(&core, "Inner", TypeAttributes::NESTED_PUBLIC, Some(&hidden));

        let universe = TypeUniverse::new();
        universe.add(core);

        assert!(universe.is_effectively_public(&outer));
        assert!(universe.is_effectively_public(&inner));
        assert!(!universe.is_effectively_public(&private));
        assert!(!universe.is_effectively_public(&hidden));
        assert!(!universe.is_effectively_public(&under_hidden));

        let chain: Vec<Token> = universe.enclosing_chain(&inner).iter().map(|t| t.token).collect();
        assert_eq!(chain, vec![outer.token, inner.token]);
    }
}
