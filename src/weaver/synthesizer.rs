//! Emitting wrapper types, marker interfaces and concrete classes.
//!
//! Generation is done in two steps. [`Synthesizer::plan`] walks the bound descendants of a
//! member type and decides which classes to emit and under which names; nothing is added to the
//! module, so a plan that fails leaves no trace. [`Synthesizer::emit`] then creates the planned
//! classes inside a wrapper:
//!
//! ```text
//! Holder
//! └── <Value>__generic_serialize_reference      nested private, sealed abstract
//!     ├── IBase                                 nested public interface (the marker)
//!     ├── TInt    : TInt<int>, IBase            nested public, .ctor -> TInt<int>::.ctor
//!     └── IntInt  : IntInt, IBase
//! ```
//!
//! Members whose classes are generated by another module share a bucket wrapper per concrete
//! base and marker, e.g. `<GenericSerializeReference>Game.Game_IGeneric`2<int,int>`.

use std::collections::{HashMap, HashSet};

use crate::{
    metadata::{
        builder::ClassBuilder,
        module::ModuleImage,
        typesystem::{TypeAttributes, TypeName, TypeRc, TypeSig},
    },
    weaver::{
        diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics},
        tree::{DescendantQuery, TypeTree},
    },
    Error::{InaccessibleMarker, NameCollision, NoParameterlessConstructor},
    Result,
};

/// Name of the marker interface nested in embed wrappers
pub const MARKER_NAME: &str = "IBase";

/// Namespace prefix of bucket wrappers
pub const BUCKET_NAMESPACE_PREFIX: &str = "<GenericSerializeReference>";

/// The name of the embed wrapper of a member
#[must_use]
pub fn wrapper_name(member: &str) -> String {
    format!("<{member}>__generic_serialize_reference")
}

/// The marker interface an embed wrapper of `member` in `declaring` will contain
#[must_use]
pub fn embed_marker_name(declaring: &TypeRc, member: &str) -> TypeName {
    declaring
        .type_name()
        .nested(&wrapper_name(member))
        .nested(MARKER_NAME)
}

/// A class decided on by [`Synthesizer::plan`].
#[derive(Debug, Clone, PartialEq)]
pub struct PlannedClass {
    /// Simple name of the class inside its wrapper
    pub name: String,
    /// The bound descendant it derives from
    pub base: TypeSig,
}

/// A class created by [`Synthesizer::emit`].
#[derive(Debug, Clone)]
pub struct GeneratedType {
    /// The created class
    pub ty: TypeRc,
    /// The bound descendant it derives from
    pub base: TypeSig,
}

/// The wrapper and marker interface created for one embedded member.
#[derive(Debug, Clone)]
pub struct EmbedScope {
    /// `<Member>__generic_serialize_reference`
    pub wrapper: TypeRc,
    /// The nested `IBase` interface, absent when the member names its own interface
    pub marker: Option<TypeRc>,
}

/// Shape of the wrapper created by [`Synthesizer::embed_scope`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeShape {
    /// Create the nested `IBase` marker
    pub marker: bool,
    /// Nest the wrapper public, so other modules can implement its marker
    pub public: bool,
}

/// Creates generated types in one module.
pub struct Synthesizer<'a> {
    module: &'a ModuleImage,
    tree: &'a TypeTree,
    diagnostics: &'a Diagnostics,
    public_only: bool,
    buckets: HashMap<(TypeSig, TypeSig), TypeRc>,
}

impl<'a> Synthesizer<'a> {
    /// Create a synthesizer emitting into `module`.
    ///
    /// ## Arguments
    /// * 'module'      - Receives the generated types
    /// * 'tree'        - Provides the descendants of member types
    /// * 'diagnostics' - Receives skipped descendants
    /// * 'public_only' - Skip descendants that are not public at every nesting level
    pub fn new(
        module: &'a ModuleImage,
        tree: &'a TypeTree,
        diagnostics: &'a Diagnostics,
        public_only: bool,
    ) -> Self {
        Synthesizer {
            module,
            tree,
            diagnostics,
            public_only,
            buckets: HashMap::new(),
        }
    }

    /// Decide which classes to generate for the concrete generic `base`.
    ///
    /// Descendants that are open, value types, abstract, interfaces, violate a `class` or
    /// `struct` constraint, or lack an accessible parameterless constructor are skipped and
    /// logged. `taken` are the names already used in the target wrapper.
    ///
    /// # Errors
    /// Returns [`crate::Error::NotConcrete`] or [`crate::Error::NotInTree`] for unusable bases
    /// and [`crate::Error::NameCollision`] if two descendants cannot be told apart by name.
    pub fn plan(&self, base: &TypeSig, taken: &HashSet<String>) -> Result<Vec<PlannedClass>> {
        let query = DescendantQuery {
            public_only: self.public_only,
        };
        let mut names = taken.clone();
        let mut plan = Vec::new();

        for bound in self.tree.bound_descendants(base, query)? {
            let Some(descendant) = self.tree.universe().resolve_sig(&bound) else {
                continue;
            };
            if let Err(reason) = self.check_instantiable(&descendant, &bound) {
                self.skip(&descendant, base, reason);
                continue;
            }

            let mut name = descendant.short_name().to_string();
            if names.contains(&name) {
                name = self.qualified_name(&descendant);
            }
            if names.contains(&name) {
                return Err(NameCollision(format!(
                    "{name} is generated twice for {base}"
                )));
            }
            names.insert(name.clone());
            plan.push(PlannedClass { name, base: bound });
        }
        Ok(plan)
    }

    fn check_instantiable(&self, descendant: &TypeRc, bound: &TypeSig) -> std::result::Result<(), String> {
        if bound.is_open() {
            return Err("generic arguments remain open".to_string());
        }
        if descendant.is_interface() {
            return Err("interface".to_string());
        }
        if descendant.is_abstract() {
            return Err("abstract".to_string());
        }
        if descendant.is_value_type() {
            return Err("value type".to_string());
        }
        let violates = descendant
            .generic_params
            .iter()
            .zip(bound.generic_args())
            .any(|(param, argument)| !param.accepts(argument));
        if violates {
            return Err("generic constraint violated".to_string());
        }
        match descendant.default_constructor() {
            Some(ctor) if ctor.is_accessible_from_subclass() => Ok(()),
            _ => Err(NoParameterlessConstructor(descendant.fullname.clone()).to_string()),
        }
    }

    fn skip(&self, descendant: &TypeRc, base: &TypeSig, reason: String) {
        self.diagnostics.push(
            Diagnostic::new(
                DiagnosticSeverity::Debug,
                format!("skip {} for {base}: {reason}", descendant.fullname),
            )
            .with_module(self.module.name())
            .with_type(&descendant.fullname),
        );
    }

    fn qualified_name(&self, descendant: &TypeRc) -> String {
        let mut parts: Vec<String> = Vec::new();
        if !descendant.namespace.is_empty() {
            parts.push(descendant.namespace.replace('.', "_"));
        }
        parts.extend(
            self.tree
                .universe()
                .enclosing_chain(descendant)
                .iter()
                .map(|ty| ty.short_name().to_string()),
        );
        parts.join("_")
    }

    /// Create the wrapper of an embedded member inside `declaring`, and its marker interface
    /// when `shape.marker` is set.
    ///
    /// Every name the wrapper will contain, `plan` included, is checked before anything is
    /// added to the module.
    ///
    /// ## Arguments
    /// * 'declaring' - The type declaring the member
    /// * 'member'    - The member name
    /// * 'shape'     - Marker and visibility of the wrapper
    /// * 'plan'      - The classes that [`Synthesizer::emit`] will add to the wrapper
    ///
    /// # Errors
    /// Returns [`crate::Error::NameCollision`] if the wrapper already exists or a planned
    /// class would clash with the marker.
    pub fn embed_scope(
        &self,
        declaring: &TypeRc,
        member: &str,
        shape: ScopeShape,
        plan: &[PlannedClass],
    ) -> Result<EmbedScope> {
        let name = wrapper_name(member);
        let fullname = format!("{}/{name}", declaring.fullname);
        if self.module.types().contains_fullname(&fullname) {
            return Err(NameCollision(fullname));
        }
        let mut names = HashSet::new();
        if shape.marker {
            names.insert(MARKER_NAME);
        }
        for planned in plan {
            if !names.insert(planned.name.as_str()) {
                return Err(NameCollision(format!("{fullname}/{}", planned.name)));
            }
        }

        let visibility = if shape.public {
            TypeAttributes::NESTED_PUBLIC
        } else {
            TypeAttributes::NESTED_PRIVATE
        };
        let wrapper = ClassBuilder::new(self.module, "", &name)
            .flags(
                visibility
                    | TypeAttributes::SEALED
                    | TypeAttributes::ABSTRACT
                    | TypeAttributes::BEFORE_FIELD_INIT,
            )
            .nested_in(declaring)
            .build()?;
        let marker = if shape.marker {
            Some(
                ClassBuilder::interface(self.module, "", MARKER_NAME)
                    .nested_in(&wrapper)
                    .build()?,
            )
        } else {
            None
        };

        tracing::debug!(wrapper = %wrapper.fullname, "embed scope created");
        Ok(EmbedScope { wrapper, marker })
    }

    /// True if a bucket for `base` and `marker` was created by this synthesizer
    #[must_use]
    pub fn has_bucket(&self, base: &TypeSig, marker: &TypeSig) -> bool {
        self.buckets.contains_key(&(base.clone(), marker.clone()))
    }

    /// The bucket wrapper for `base` and `marker`, and whether it was created by this call.
    ///
    /// # Errors
    /// Returns [`crate::Error::InaccessibleMarker`] if `marker` is defined in another module
    /// and is not public at every nesting level, and [`crate::Error::NameCollision`] if no
    /// free wrapper name exists.
    pub fn bucket(&mut self, base: &TypeSig, marker: &TypeSig) -> Result<(TypeRc, bool)> {
        let key = (base.clone(), marker.clone());
        if let Some(existing) = self.buckets.get(&key) {
            return Ok((existing.clone(), false));
        }
        let universe = self.tree.universe();
        if let Some(definition) = universe.resolve_sig(marker) {
            if &*definition.module != self.module.name() && !universe.is_effectively_public(&definition) {
                return Err(InaccessibleMarker(definition.fullname.clone()));
            }
        }

        let namespace = format!(
            "{BUCKET_NAMESPACE_PREFIX}{}",
            base.definition_name()
                .map(|name| name.namespace.as_str())
                .unwrap_or_default()
        );
        let mut name = base.fullname().replace('.', "_");
        if self.bucket_taken(&namespace, &name) {
            let suffix = marker
                .definition_name()
                .map_or_else(|| marker.fullname(), |marker| marker.simple_name().to_string());
            name = format!("{name}_{}", suffix.replace('.', "_"));
        }
        if self.bucket_taken(&namespace, &name) {
            return Err(NameCollision(format!("{namespace}.{name}")));
        }

        let wrapper = ClassBuilder::new(self.module, &namespace, &name)
            .flags(
                TypeAttributes::PUBLIC
                    | TypeAttributes::SEALED
                    | TypeAttributes::ABSTRACT
                    | TypeAttributes::BEFORE_FIELD_INIT,
            )
            .build()?;
        self.buckets.insert(key, wrapper.clone());
        tracing::debug!(wrapper = %wrapper.fullname, "bucket created");
        Ok((wrapper, true))
    }

    fn bucket_taken(&self, namespace: &str, name: &str) -> bool {
        self.module
            .types()
            .contains_fullname(&format!("{namespace}.{name}"))
    }

    /// Names of the types nested in `wrapper`
    #[must_use]
    pub fn nested_names(&self, wrapper: &TypeRc) -> HashSet<String> {
        wrapper
            .nested_types
            .iter()
            .filter_map(|(_, token)| self.module.types().get(token))
            .map(|ty| ty.name.clone())
            .collect()
    }

    /// Create the planned classes inside `wrapper`, each deriving from its bound descendant,
    /// implementing `marker` and having a constructor that calls the base constructor.
    ///
    /// # Errors
    /// Returns [`crate::Error::DuplicateTypeRegistration`] if a name is taken after all, and
    /// [`crate::Error::Malformed`] if a constructor body cannot be encoded.
    pub fn emit(
        &self,
        wrapper: &TypeRc,
        marker: &TypeSig,
        plan: Vec<PlannedClass>,
    ) -> Result<Vec<GeneratedType>> {
        let mut generated = Vec::with_capacity(plan.len());
        for planned in plan {
            let ty = ClassBuilder::new(self.module, "", &planned.name)
                .flags(TypeAttributes::PUBLIC | TypeAttributes::BEFORE_FIELD_INIT)
                .nested_in(wrapper)
                .extends(planned.base.clone())
                .implements(marker.clone())
                .default_constructor()
                .build()?;
            self.diagnostics.push(
                Diagnostic::new(
                    DiagnosticSeverity::Debug,
                    format!("generate {} : {}", ty.fullname, planned.base),
                )
                .with_module(self.module.name())
                .with_type(&ty.fullname),
            );
            generated.push(GeneratedType {
                ty,
                base: planned.base,
            });
        }
        Ok(generated)
    }
}
