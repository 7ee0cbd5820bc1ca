//! Inheritance and implementation index over the types of several modules.
//!
//! ```text
//!   A <-+-- B(I) <---- C
//!       |
//!       +-- D(I) <-+-- E(I)
//!                  |
//!                  +-- F
//!
//! tree:       A ( B ( C ) + D ( E + F ) )
//! interface:  I ( B + D )
//! ```
//!
//! Every type is a node keyed by its [`TypeKey`]. A class is a child of its base class; an
//! interface is the parent of the types that introduce it, i.e. implement it without inheriting
//! it from their base (`E` above is reached through `D`, not directly from `I`). Generic
//! instantiations are indexed by their open definition, so the tree itself never binds generic
//! arguments: [`TypeTree::all_descendants_of_sig`] ignores them, and
//! [`TypeTree::bound_descendants`] binds them one edge at a time with the
//! [`GenericResolver`].

use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use crate::{
    metadata::{
        token::TypeKey,
        typesystem::{TypeRc, TypeSig, TypeUniverse},
    },
    weaver::{
        diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics},
        generics::GenericResolver,
    },
    Error::{DuplicateTypeRegistration, NotConcrete, NotInTree},
    Result,
};

/// One indexed type.
#[derive(Debug, Clone)]
pub struct TypeNode {
    /// The type definition
    pub ty: TypeRc,
    /// Interfaces implemented by the type or any ancestor
    pub interfaces: HashSet<TypeKey>,
    /// Key of the base type node, if the base resolved
    pub base: Option<TypeKey>,
    /// Direct descendants: subclasses, or for interfaces the introducing implementers
    pub subs: Vec<TypeKey>,
}

/// Filters for [`TypeTree::bound_descendants`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescendantQuery {
    /// Drop descendants that are not public at every nesting level
    pub public_only: bool,
}

/// Inheritance forest over a set of type definitions.
pub struct TypeTree {
    universe: Arc<TypeUniverse>,
    nodes: HashMap<TypeKey, TypeNode>,
    order: Vec<TypeKey>,
}

impl TypeTree {
    /// Index `types` and every base type and interface they reach through `universe`.
    ///
    /// Unresolvable bases turn a type into a root and are logged at debug level. Cyclic base
    /// chains and conflicting registrations are logged as errors; construction continues with
    /// the offending edge dropped.
    ///
    /// ## Arguments
    /// * 'universe'    - Resolves base and interface signatures
    /// * 'types'       - The types to index
    /// * 'diagnostics' - Receives construction problems
    pub fn build(universe: Arc<TypeUniverse>, types: &[TypeRc], diagnostics: &Diagnostics) -> Self {
        let mut tree = TypeTree {
            universe,
            nodes: HashMap::new(),
            order: Vec::new(),
        };
        let mut in_progress = HashSet::new();
        for ty in types {
            tree.create(ty, &mut in_progress, diagnostics);
        }
        diagnostics.debug(format!("type tree indexed {} types", tree.len()));
        tree
    }

    fn create(
        &mut self,
        ty: &TypeRc,
        in_progress: &mut HashSet<TypeKey>,
        diagnostics: &Diagnostics,
    ) -> Option<TypeKey> {
        let key = ty.key();
        if let Some(existing) = self.nodes.get(&key) {
            if existing.ty.fullname != ty.fullname {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticSeverity::Error,
                        DuplicateTypeRegistration(key.clone()).to_string(),
                    )
                    .with_module(&ty.module)
                    .with_type(&ty.fullname),
                );
            }
            return Some(key);
        }
        if !in_progress.insert(key.clone()) {
            diagnostics.push(
                Diagnostic::new(DiagnosticSeverity::Error, "cyclic inheritance, edge dropped")
                    .with_module(&ty.module)
                    .with_type(&ty.fullname),
            );
            return None;
        }

        let mut interfaces = HashSet::new();
        for (_, sig) in ty.interfaces.iter() {
            match self.universe.resolve_sig(sig) {
                Some(interface) => {
                    if let Some(interface_key) = self.create(&interface, in_progress, diagnostics) {
                        interfaces.insert(interface_key);
                    }
                }
                None => diagnostics.push(
                    Diagnostic::new(
                        DiagnosticSeverity::Debug,
                        format!("interface {sig} does not resolve"),
                    )
                    .with_type(&ty.fullname),
                ),
            }
        }

        let base = match &ty.base {
            Some(sig) => match self.universe.resolve_sig(sig) {
                Some(base_ty) => self.create(&base_ty, in_progress, diagnostics),
                None => {
                    if sig.definition_name().is_some() {
                        diagnostics.push(
                            Diagnostic::new(
                                DiagnosticSeverity::Debug,
                                format!("base {sig} does not resolve, indexed as root"),
                            )
                            .with_type(&ty.fullname),
                        );
                    }
                    None
                }
            },
            None => None,
        };

        let mut introduced: Vec<TypeKey> = interfaces.iter().cloned().collect();
        if let Some(base_node) = base.as_ref().and_then(|base_key| self.nodes.get_mut(base_key)) {
            if !base_node.subs.contains(&key) {
                base_node.subs.push(key.clone());
            }
            introduced.retain(|interface| !base_node.interfaces.contains(interface));
            interfaces.extend(base_node.interfaces.iter().cloned());
        }
        introduced.sort();
        for interface in introduced {
            if let Some(interface_node) = self.nodes.get_mut(&interface) {
                if !interface_node.subs.contains(&key) {
                    interface_node.subs.push(key.clone());
                }
            }
        }

        self.nodes.insert(
            key.clone(),
            TypeNode {
                ty: ty.clone(),
                interfaces,
                base,
                subs: Vec::new(),
            },
        );
        self.order.push(key.clone());
        in_progress.remove(&key);
        Some(key)
    }

    /// The universe the tree resolves signatures with
    #[must_use]
    pub fn universe(&self) -> &Arc<TypeUniverse> {
        &self.universe
    }

    /// Number of indexed types
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing is indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True if `key` is indexed
    #[must_use]
    pub fn contains(&self, key: &TypeKey) -> bool {
        self.nodes.contains_key(key)
    }

    /// The node of an indexed type
    #[must_use]
    pub fn node(&self, key: &TypeKey) -> Option<&TypeNode> {
        self.nodes.get(key)
    }

    /// All indexed types in the order they were added
    pub fn types(&self) -> impl Iterator<Item = &TypeRc> {
        self.order
            .iter()
            .filter_map(|key| self.nodes.get(key))
            .map(|node| &node.ty)
    }

    /// Every type reachable from `base` through descendant edges, `base` excluded.
    ///
    /// The result is in pre-order and has no duplicates; an indexed interface without
    /// implementers yields an empty list.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotInTree`] if `base` was never indexed.
    pub fn all_descendants(&self, base: &TypeKey) -> Result<Vec<TypeRc>> {
        let node = self.lookup(base)?;
        let mut visited = HashSet::from([base.clone()]);
        let mut result = Vec::new();
        let mut stack: Vec<&TypeKey> = node.subs.iter().rev().collect();
        while let Some(key) = stack.pop() {
            if !visited.insert(key.clone()) {
                continue;
            }
            if let Some(node) = self.nodes.get(key) {
                result.push(node.ty.clone());
                stack.extend(node.subs.iter().rev());
            }
        }
        Ok(result)
    }

    /// The direct descendants of `base`.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotInTree`] if `base` was never indexed.
    pub fn direct_descendants(&self, base: &TypeKey) -> Result<Vec<TypeRc>> {
        let node = self.lookup(base)?;
        Ok(node
            .subs
            .iter()
            .filter_map(|key| self.nodes.get(key))
            .map(|node| node.ty.clone())
            .collect())
    }

    /// [`TypeTree::all_descendants`] of the definition behind `sig`, ignoring its generic
    /// arguments: `IGeneric<int, int>` and `IGeneric<,>` give the same result.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotInTree`] if the definition does not resolve or was never
    /// indexed.
    pub fn all_descendants_of_sig(&self, sig: &TypeSig) -> Result<Vec<TypeRc>> {
        let key = self
            .universe
            .key_of(sig)
            .ok_or_else(|| NotInTree(sig.fullname()))?;
        self.all_descendants(&key)
    }

    /// The descendants of `concrete_base` with their generic arguments bound, e.g.
    /// `TInt<int>` for `IGeneric<int, int>` and `TInt<T> : IGeneric<T, int>`.
    ///
    /// Each child is resolved against the bound signature of its parent. Children that do not
    /// unify are skipped together with their subtree. Results that still have open parameters
    /// are returned but not descended into.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotConcrete`] if `concrete_base` has open parameters and
    /// [`crate::Error::NotInTree`] if its definition was never indexed.
    pub fn bound_descendants(
        &self,
        concrete_base: &TypeSig,
        query: DescendantQuery,
    ) -> Result<Vec<TypeSig>> {
        if concrete_base.is_open() {
            return Err(NotConcrete(concrete_base.fullname()));
        }
        let root = self
            .universe
            .key_of(concrete_base)
            .ok_or_else(|| NotInTree(concrete_base.fullname()))?;
        let root_node = self.lookup(&root)?;

        let resolver = GenericResolver::new(&self.universe);
        let mut visited = HashSet::from([root.clone()]);
        let mut result = Vec::new();
        let mut stack: Vec<(&TypeKey, TypeSig)> = root_node
            .subs
            .iter()
            .rev()
            .map(|key| (key, concrete_base.clone()))
            .collect();

        while let Some((key, parent)) = stack.pop() {
            if visited.contains(key) {
                continue;
            }
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            let bound = match resolver.bind(&node.ty, &parent) {
                Ok(bound) => bound,
                Err(error) => {
                    tracing::debug!(descendant = %node.ty.fullname, %parent, %error, "descendant skipped");
                    continue;
                }
            };
            visited.insert(key.clone());

            if !query.public_only || self.universe.is_effectively_public(&node.ty) {
                result.push(bound.clone());
            }
            if !bound.is_open() {
                stack.extend(node.subs.iter().rev().map(|sub| (sub, bound.clone())));
            }
        }
        Ok(result)
    }

    fn lookup(&self, key: &TypeKey) -> Result<&TypeNode> {
        self.nodes.get(key).ok_or_else(|| {
            let name = self
                .universe
                .get(key)
                .map_or_else(|| key.to_string(), |ty| ty.fullname.clone());
            NotInTree(name)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::{
            builder::{ClassBuilder, ModuleBuilder},
            module::ModuleImage,
            typesystem::{PrimitiveKind, TypeAttributes, TypeDef, TypeName},
        },
        Error,
    };

    fn build(module: &ModuleImage) -> TypeTree {
        let universe = Arc::new(TypeUniverse::new());
        universe.add(Arc::clone(module.types()));
        let types: Vec<TypeRc> = module.types().iter().collect();
        TypeTree::build(universe, &types, &Diagnostics::default())
    }

    fn names(types: &[TypeRc]) -> Vec<&str> {
        let mut names: Vec<&str> = types.iter().map(|ty| ty.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    #[test]
    fn subtree_and_interfaces() {
        let module = ModuleBuilder::new("Game").build();
        let i = ClassBuilder::interface(&module, "Game", "I").build().unwrap();
        let a = ClassBuilder::new(&module, "Game", "A").build().unwrap();
        let b = ClassBuilder::new(&module, "Game", "B")
            .extends(a.definition_sig())
            .implements(i.definition_sig())
            .build()
            .unwrap();
        let c = ClassBuilder::new(&module, "Game", "C")
            .extends(b.definition_sig())
            .build()
            .unwrap();
        let d = ClassBuilder::new(&module, "Game", "D")
            .extends(a.definition_sig())
            .implements(i.definition_sig())
            .build()
            .unwrap();
        ClassBuilder::new(&module, "Game", "E")
            .extends(d.definition_sig())
            .implements(i.definition_sig())
            .build()
            .unwrap();
        ClassBuilder::new(&module, "Game", "F")
            .extends(d.definition_sig())
            .build()
            .unwrap();

        let tree = build(&module);
        assert_eq!(names(&tree.all_descendants(&a.key()).unwrap()), ["B", "C", "D", "E", "F"]);
        assert_eq!(names(&tree.direct_descendants(&a.key()).unwrap()), ["B", "D"]);
        assert_eq!(names(&tree.direct_descendants(&i.key()).unwrap()), ["B", "D"]);
        assert_eq!(names(&tree.all_descendants(&i.key()).unwrap()), ["B", "C", "D", "E", "F"]);
        assert!(tree.all_descendants(&c.key()).unwrap().is_empty());

        let node = tree.node(&c.key()).unwrap();
        assert_eq!(node.base, Some(b.key()));
        assert!(node.interfaces.contains(&i.key()));
    }

    #[test]
    fn not_in_tree() {
        let module = ModuleBuilder::new("Game").build();
        ClassBuilder::new(&module, "Game", "A").build().unwrap();
        let tree = build(&module);

        let other = ModuleBuilder::new("Other").build();
        let stranger = ClassBuilder::new(&other, "Other", "Stranger").build().unwrap();
        assert!(matches!(tree.all_descendants(&stranger.key()), Err(Error::NotInTree(_))));
        assert!(matches!(tree.direct_descendants(&stranger.key()), Err(Error::NotInTree(_))));
        assert!(matches!(
            tree.all_descendants_of_sig(&stranger.definition_sig()),
            Err(Error::NotInTree(_))
        ));
    }

    #[test]
    fn unresolved_base_is_root() {
        let module = ModuleBuilder::new("Game").build();
        let behaviour = TypeSig::Class(crate::metadata::typesystem::TypeName::new(
            "UnityEngine.CoreModule",
            "UnityEngine",
            "MonoBehaviour",
        ));
        let player = ClassBuilder::new(&module, "Game", "Player")
            .extends(behaviour)
            .build()
            .unwrap();
        let universe = Arc::new(TypeUniverse::new());
        universe.add(Arc::clone(module.types()));
        let diagnostics = Diagnostics::new(DiagnosticSeverity::Debug);
        let tree = TypeTree::build(universe, &[player.clone()], &diagnostics);

        assert_eq!(tree.node(&player.key()).unwrap().base, None);
        assert!(diagnostics
            .iter()
            .any(|d| d.message.contains("does not resolve")));
    }

    #[test]
    fn bound_mode_filters_visibility() {
        let module = ModuleBuilder::new("Game").build();
        let ibox = ClassBuilder::interface(&module, "Game", "IBox`1")
            .generic_param("T")
            .build()
            .unwrap();
        let int = TypeSig::Primitive(PrimitiveKind::I4);
        let boxed = TypeSig::instantiate(ibox.definition_sig(), vec![int.clone()]);
        ClassBuilder::new(&module, "Game", "Visible")
            .implements(boxed.clone())
            .build()
            .unwrap();
        ClassBuilder::new(&module, "Game", "Hidden")
            .visibility(TypeAttributes::NOT_PUBLIC)
            .implements(boxed.clone())
            .build()
            .unwrap();

        let tree = build(&module);
        let all = tree.bound_descendants(&boxed, DescendantQuery::default()).unwrap();
        assert_eq!(all.len(), 2);
        let public = tree
            .bound_descendants(&boxed, DescendantQuery { public_only: true })
            .unwrap();
        assert_eq!(public.len(), 1);
        assert_eq!(public[0].fullname(), "Game.Visible");

        let open = TypeSig::instantiate(ibox.definition_sig(), vec![TypeSig::Var(0)]);
        assert!(matches!(
            tree.bound_descendants(&open, DescendantQuery::default()),
            Err(Error::NotConcrete(_))
        ));
    }

    #[test]
    fn cyclic_bases_terminate() {
        let module = ModuleBuilder::new("Game").build();
        let a = ClassBuilder::new(&module, "Game", "A")
            .extends(TypeSig::Class(TypeName::parse("Game", "Game.B")))
            .build()
            .unwrap();
        let b = ClassBuilder::new(&module, "Game", "B")
            .extends(a.definition_sig())
            .build()
            .unwrap();

        let universe = Arc::new(TypeUniverse::new());
        universe.add(Arc::clone(module.types()));
        let diagnostics = Diagnostics::default();
        let tree = TypeTree::build(universe, &[a.clone(), b.clone()], &diagnostics);

        assert_eq!(tree.len(), 2);
        assert_eq!(diagnostics.count_of(DiagnosticSeverity::Error), 1);
        assert!(diagnostics.iter().any(|d| d.message.contains("cyclic")));
        assert!(tree.all_descendants(&a.key()).unwrap().len() <= 1);
        assert!(tree.all_descendants(&b.key()).unwrap().len() <= 1);
    }

    #[test]
    fn conflicting_registration_keeps_the_first() {
        let module = ModuleBuilder::new("Game").build();
        let player = ClassBuilder::new(&module, "Game", "Player").build().unwrap();
        let impostor: TypeRc = Arc::new(TypeDef::new(
            player.token,
            player.module.clone(),
            "Game".to_string(),
            "Impostor".to_string(),
            TypeAttributes::PUBLIC,
            None,
            Vec::new(),
            None,
        ));

        let universe = Arc::new(TypeUniverse::new());
        universe.add(Arc::clone(module.types()));
        let diagnostics = Diagnostics::default();
        let tree = TypeTree::build(universe, &[player.clone(), impostor], &diagnostics);

        assert_eq!(tree.len(), 1);
        assert_eq!(tree.node(&player.key()).unwrap().ty.fullname, "Game.Player");
        assert!(diagnostics.iter().any(|d| d.severity == DiagnosticSeverity::Error
            && d.message.starts_with("Duplicate type registration")));
    }
}
