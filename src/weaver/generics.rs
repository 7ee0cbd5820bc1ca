//! Binding a descendant's generic parameters against a concrete base.
//!
//! A descendant names its parents through partially bound references such as
//! `IGeneric<!0, int>`. Given the concrete base `IGeneric<string, int>`, the resolver unifies the
//! partial reference with it slot by slot and reports what each of the descendant's own
//! parameters has to be: `[string]`. Parameters the partial reference never mentions stay
//! `Var(i)`, which marks the result as still open.

use crate::{
    metadata::typesystem::{TypeDef, TypeSig, TypeUniverse},
    Error::{NoUnification, NotConcrete, TypeMismatch},
    Result,
};

/// Computes generic argument substitutions for descendants of a concrete base.
pub struct GenericResolver<'a> {
    universe: &'a TypeUniverse,
}

impl<'a> GenericResolver<'a> {
    /// Create a resolver that compares types through `universe`
    #[must_use]
    pub fn new(universe: &'a TypeUniverse) -> Self {
        GenericResolver { universe }
    }

    /// Compute the arguments that make `descendant` derive from `concrete_base`.
    ///
    /// The result has one entry per generic parameter of `descendant`, in declaration order; it
    /// is empty for non-generic descendants. The parent references of `descendant` (base type,
    /// then interfaces) whose definition matches the one of `concrete_base` are tried in order
    /// and the first that unifies completely wins.
    ///
    /// # Errors
    /// - [`crate::Error::NotConcrete`] if `concrete_base` has open parameters
    /// - [`crate::Error::TypeMismatch`] if the only candidate reference disagrees with
    ///   `concrete_base` in a concrete slot
    /// - [`crate::Error::NoUnification`] if no reference matches, or several match and none
    ///   unifies
    pub fn resolve(&self, descendant: &TypeDef, concrete_base: &TypeSig) -> Result<Vec<TypeSig>> {
        if concrete_base.is_open() {
            return Err(NotConcrete(concrete_base.fullname()));
        }

        let candidates: Vec<&TypeSig> = self
            .parent_refs(descendant)
            .into_iter()
            .filter(|candidate| self.same_definition(candidate, concrete_base))
            .collect();

        let param_count = descendant.generic_params.len();
        let mut last_error = None;
        for candidate in &candidates {
            let mut bindings = vec![None; param_count];
            match self.unify(candidate, concrete_base, &mut bindings) {
                Ok(()) => {
                    return Ok(bindings
                        .into_iter()
                        .enumerate()
                        .map(|(index, bound)| bound.unwrap_or(TypeSig::Var(index as u32)))
                        .collect());
                }
                Err(error) => last_error = Some(error),
            }
        }

        match (candidates.len(), last_error) {
            (1, Some(error)) => Err(error),
            _ => Err(NoUnification(format!(
                "{} does not derive from {}",
                descendant.fullname, concrete_base
            ))),
        }
    }

    /// The descendant bound with the result of [`GenericResolver::resolve`], e.g. `TInt<int>`
    ///
    /// # Errors
    /// Same as [`GenericResolver::resolve`].
    pub fn bind(&self, descendant: &TypeDef, concrete_base: &TypeSig) -> Result<TypeSig> {
        let args = self.resolve(descendant, concrete_base)?;
        Ok(TypeSig::instantiate(descendant.definition_sig(), args))
    }

    fn parent_refs<'t>(&self, descendant: &'t TypeDef) -> Vec<&'t TypeSig> {
        descendant
            .base
            .iter()
            .chain(descendant.interfaces.iter().map(|(_, sig)| sig))
            .collect()
    }

    fn same_definition(&self, left: &TypeSig, right: &TypeSig) -> bool {
        match (left.definition_name(), right.definition_name()) {
            (Some(a), Some(b)) => self
                .universe
                .same_type(&TypeSig::Class(a.clone()), &TypeSig::Class(b.clone())),
            _ => self.universe.same_type(left, right),
        }
    }

    fn unify(
        &self,
        partial: &TypeSig,
        concrete: &TypeSig,
        bindings: &mut [Option<TypeSig>],
    ) -> Result<()> {
        match (partial, concrete) {
            (TypeSig::Var(index), _) => {
                let slot = bindings
                    .get_mut(*index as usize)
                    .ok_or_else(|| mismatch(concrete, partial))?;
                if let Some(bound) = slot.as_ref() {
                    if self.universe.same_type(bound, concrete) {
                        return Ok(());
                    }
                    return Err(mismatch(concrete, bound));
                }
                *slot = Some(concrete.clone());
                Ok(())
            }
            (TypeSig::GenericInst(partial_def, partial_args), TypeSig::GenericInst(def, args)) => {
                if partial_args.len() != args.len() || !self.same_definition(partial_def, def) {
                    return Err(mismatch(concrete, partial));
                }
                for (partial_arg, arg) in partial_args.iter().zip(args.iter()) {
                    self.unify(partial_arg, arg, bindings)?;
                }
                Ok(())
            }
            (TypeSig::SzArray(partial_inner), TypeSig::SzArray(inner))
            | (TypeSig::ByRef(partial_inner), TypeSig::ByRef(inner)) => {
                self.unify(partial_inner, inner, bindings)
            }
            _ if !partial.is_open() && self.universe.same_type(partial, concrete) => Ok(()),
            _ => Err(mismatch(concrete, partial)),
        }
    }
}

fn mismatch(expected: &TypeSig, found: &TypeSig) -> crate::Error {
    TypeMismatch {
        expected: expected.fullname(),
        found: found.fullname(),
    }
}
