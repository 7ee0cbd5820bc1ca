use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;

use crate::{
    metadata::{
        token::{table, Token, TypeKey},
        typesystem::TypeRc,
    },
    Error::DuplicateTypeRegistration,
    Result,
};

/// The type definitions of one module, indexed by token and by full name.
///
/// Types are kept in token order, which is also the order the image writer emits them in.
/// Insertion works through a shared reference so that generated types can be added while other
/// parts of the weaver still hold the registry.
pub struct TypeRegistry {
    module: Arc<str>,
    types: SkipMap<Token, TypeRc>,
    next_row: AtomicU32,
    types_by_fullname: DashMap<String, Token>,
}

impl TypeRegistry {
    /// Create an empty registry for `module`
    pub fn new(module: impl Into<Arc<str>>) -> Self {
        TypeRegistry {
            module: module.into(),
            types: SkipMap::new(),
            next_row: AtomicU32::new(1),
            types_by_fullname: DashMap::new(),
        }
    }

    /// Name of the owning module
    #[must_use]
    pub fn module(&self) -> &Arc<str> {
        &self.module
    }

    /// Reserve the token of the next type definition
    pub fn next_token(&self) -> Token {
        Token::from_parts(table::TYPEDEF, self.next_row.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a type definition.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateTypeRegistration`] if the token or the full name is
    /// already taken by another definition; the registry is left unchanged.
    pub fn insert(&self, new_type: TypeRc) -> Result<()> {
        if self.types.contains_key(&new_type.token) {
            return Err(DuplicateTypeRegistration(new_type.key()));
        }

        match self.types_by_fullname.entry(new_type.fullname.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                return Err(DuplicateTypeRegistration(new_type.key()));
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(new_type.token);
            }
        }

        self.next_row
            .fetch_max(new_type.token.row() + 1, Ordering::Relaxed);
        self.types.insert(new_type.token, new_type);
        Ok(())
    }

    /// Look up a type by token
    #[must_use]
    pub fn get(&self, token: &Token) -> Option<TypeRc> {
        self.types.get(token).map(|entry| entry.value().clone())
    }

    /// Look up a type by key; `None` if the key belongs to another module
    #[must_use]
    pub fn get_by_key(&self, key: &TypeKey) -> Option<TypeRc> {
        if key.module != self.module {
            return None;
        }
        self.get(&key.token)
    }

    /// Look up a type by `Namespace.Outer/Inner` full name
    #[must_use]
    pub fn get_by_fullname(&self, fullname: &str) -> Option<TypeRc> {
        let token = *self.types_by_fullname.get(fullname)?;
        self.get(&token)
    }

    /// True if a type with this full name exists
    #[must_use]
    pub fn contains_fullname(&self, fullname: &str) -> bool {
        self.types_by_fullname.contains_key(fullname)
    }

    /// All types in token order
    pub fn iter(&self) -> impl Iterator<Item = TypeRc> + '_ {
        self.types.iter().map(|entry| entry.value().clone())
    }

    /// Number of registered types
    #[must_use]
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// True if no type is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::typesystem::{TypeAttributes, TypeDef, TypeSig},
        Error,
    };

    fn make(registry: &TypeRegistry, name: &str) -> TypeRc {
        Arc::new(TypeDef::new(
            registry.next_token(),
            registry.module().clone(),
            "Game".to_string(),
            name.to_string(),
            TypeAttributes::PUBLIC,
            Some(TypeSig::object()),
            Vec::new(),
            None,
        ))
    }

    #[test]
    fn insert_and_lookup() {
        let registry = TypeRegistry::new("Game");
        let a = make(&registry, "A");
        let b = make(&registry, "B");
        registry.insert(b.clone()).unwrap();
        registry.insert(a.clone()).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&a.token).unwrap().name, "A");
        assert_eq!(registry.get_by_fullname("Game.B").unwrap().token, b.token);
        assert!(registry.get_by_key(&TypeKey::new("Other", a.token)).is_none());

        let order: Vec<String> = registry.iter().map(|ty| ty.name.clone()).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    #[test]
    fn duplicate_registration() {
        let registry = TypeRegistry::new("Game");
        let a = make(&registry, "A");
        registry.insert(a.clone()).unwrap();
        assert!(matches!(
            registry.insert(a),
            Err(Error::DuplicateTypeRegistration(_))
        ));

        let same_name = make(&registry, "A");
        assert!(registry.insert(same_name).is_err());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn next_token_follows_inserted_rows() {
        let registry = TypeRegistry::new("Game");
        let ty = Arc::new(TypeDef::new(
            Token::from_parts(table::TYPEDEF, 7),
            registry.module().clone(),
            String::new(),
            "Seven".to_string(),
            TypeAttributes::PUBLIC,
            None,
            Vec::new(),
            None,
        ));
        registry.insert(ty).unwrap();
        assert_eq!(registry.next_token(), Token::from_parts(table::TYPEDEF, 8));
    }
}
