//! Routing property accessors through the generated backing field.
//!
//! The getter returns the backing field when it holds a value and falls back to the original
//! code otherwise:
//!
//! ```text
//!     ldarg.0
//!     ldfld      <backing>
//!     dup
//!     brtrue     <last ret>     ; the field value is returned
//!     pop
//!     ...original code...       ; existing branches keep their targets
//! ```
//!
//! The setter clears the backing field before every `ret`, so after an assignment the getter
//! sees the freshly assigned value again:
//!
//! ```text
//!     ...original code...
//!     ldarg.0                   ; branches to the `ret` now land here
//!     ldnull
//!     stfld      <backing>
//!     ret
//! ```
//!
//! Rewriting is split into pure stream transformations ([`rewrite_getter`], [`rewrite_setter`])
//! and [`patch_getter`] / [`patch_setter`], which produce a re-encoded body with recomputed
//! `max_stack` without touching the method. [`inject`] prepares both accessors of a property
//! and [`AccessorPatch::apply`] installs them together.

use crate::{
    assembly::{compute_max_stack, BranchPolicy, Instruction, InstructionStream},
    metadata::{
        members::PropertyDef,
        method::{MethodBody, MethodDef, MethodRc},
        module::ModuleImage,
        sequencepoints::SequencePoint,
        token::Token,
        typesystem::TypeDef,
    },
    weaver::config::SetterPolicy,
    Error::MissingAccessor,
    Result,
};

/// A re-encoded accessor body, ready to replace the current one.
#[derive(Debug, Clone)]
pub struct PatchedBody {
    /// The new body
    pub body: MethodBody,
    /// Sequence points remapped to the new code
    pub sequence_points: Vec<SequencePoint>,
}

impl PatchedBody {
    /// Replace body and sequence points of `method`
    pub fn apply(self, method: &MethodDef) {
        method.replace_body(self.body, self.sequence_points);
    }
}

/// Both rewritten accessors of one property.
#[derive(Debug, Clone)]
pub struct AccessorPatch {
    /// The getter and its new body
    pub getter: (MethodRc, PatchedBody),
    /// The setter and its new body; `None` for getter-only properties
    pub setter: Option<(MethodRc, PatchedBody)>,
}

impl AccessorPatch {
    /// Install the new bodies
    pub fn apply(self) {
        let (getter, body) = self.getter;
        body.apply(&getter);
        if let Some((setter, body)) = self.setter {
            body.apply(&setter);
        }
    }
}

/// Prepare the accessors of `property` to go through `field`.
///
/// ## Arguments
/// * 'module'    - Resolves call signatures for the stack analysis
/// * 'declaring' - The type declaring `property` and its accessors
/// * 'property'  - The instrumented property
/// * 'field'     - Token the accessors load and store the backing field with
/// * 'policy'    - Treatment of a missing setter
///
/// # Errors
/// Returns [`crate::Error::MissingAccessor`] if the getter is missing, or the setter under
/// [`SetterPolicy::RequireBoth`], and the errors of [`patch_getter`] otherwise.
pub fn inject(
    module: &ModuleImage,
    declaring: &TypeDef,
    property: &PropertyDef,
    field: Token,
    policy: SetterPolicy,
) -> Result<AccessorPatch> {
    let missing = |accessor: &'static str| MissingAccessor {
        member: format!("{}::{}", declaring.fullname, property.name),
        accessor,
    };

    let getter = property
        .getter
        .and_then(|token| declaring.method(token))
        .ok_or_else(|| missing("getter"))?;
    let setter = property.setter.and_then(|token| declaring.method(token));
    if setter.is_none() && policy == SetterPolicy::RequireBoth {
        return Err(missing("setter"));
    }

    let getter_body = patch_getter(module, &getter, field)?;
    let setter = match setter {
        Some(setter) => {
            let body = patch_setter(module, &setter, field)?;
            Some((setter, body))
        }
        None => None,
    };
    Ok(AccessorPatch {
        getter: (getter, getter_body),
        setter,
    })
}

/// Prepend the null-coalescing read of `field` to a getter.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the getter has no `ret`.
pub fn rewrite_getter(stream: &InstructionStream, field: Token) -> Result<InstructionStream> {
    let Some(last_ret) = stream.returns().last().copied() else {
        return Err(malformed_error!("Getter without ret"));
    };
    let code = vec![
        Instruction::simple("ldarg.0")?,
        Instruction::with_token("ldfld", field)?,
        Instruction::simple("dup")?,
        Instruction::branch("brtrue", last_ret)?,
        Instruction::simple("pop")?,
    ];
    stream.insert(0, code, BranchPolicy::KeepTargets)
}

/// Clear `field` before every `ret` of a setter.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the setter has no `ret`.
pub fn rewrite_setter(stream: &InstructionStream, field: Token) -> Result<InstructionStream> {
    let returns = stream.returns();
    if returns.is_empty() {
        return Err(malformed_error!("Setter without ret"));
    }
    let mut insertions = Vec::with_capacity(returns.len());
    for at in returns {
        insertions.push((
            at,
            vec![
                Instruction::simple("ldarg.0")?,
                Instruction::simple("ldnull")?,
                Instruction::with_token("stfld", field)?,
            ],
        ));
    }
    stream.insert_all(insertions, BranchPolicy::Redirect)
}

/// The getter `method` rewritten to read `field` first.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] if the method has no body or cannot be decoded, and
/// [`crate::Error::StackImbalance`] if the rewritten body does not verify.
pub fn patch_getter(module: &ModuleImage, method: &MethodDef, field: Token) -> Result<PatchedBody> {
    patch(module, method, |stream| rewrite_getter(stream, field))
}

/// The setter `method` rewritten to clear `field` on every exit.
///
/// # Errors
/// Same as [`patch_getter`].
pub fn patch_setter(module: &ModuleImage, method: &MethodDef, field: Token) -> Result<PatchedBody> {
    patch(module, method, |stream| rewrite_setter(stream, field))
}

fn patch(
    module: &ModuleImage,
    method: &MethodDef,
    rewrite: impl FnOnce(&InstructionStream) -> Result<InstructionStream>,
) -> Result<PatchedBody> {
    let Some(body) = method.body() else {
        return Err(malformed_error!("Method {} has no body", method.name));
    };
    let stream = InstructionStream::from_body(&body, &method.sequence_points())?;
    let rewritten = rewrite(&stream)?;
    let max_stack = compute_max_stack(&rewritten, method.signature.stack_pushes() == 1, module)?;
    let (body, sequence_points) = rewritten.to_body(&body, max_stack)?;
    Ok(PatchedBody {
        body,
        sequence_points,
    })
}
