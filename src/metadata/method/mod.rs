//! Method definitions and their bodies.
//!
//! # Key Types
//! - [`MethodDef`] - A method of a type: signature, flags and an optional CIL body
//! - [`MethodBody`] - Header, code and exception handlers of one body
//! - [`ExceptionHandler`] - One try/catch/finally/fault clause

mod body;
mod exceptions;
mod types;

use std::sync::{Arc, RwLock};

pub use body::MethodBody;
pub use exceptions::{ExceptionHandler, ExceptionHandlerFlags};
pub use types::*;

use crate::metadata::{
    customattributes::CustomAttribute, sequencepoints::SequencePoint, token::Token,
    typesystem::MethodSig,
};

/// A reference counted method
pub type MethodRc = Arc<MethodDef>;

/// A method definition.
///
/// The body and the debug sequence points sit behind locks so accessor rewriting can replace
/// them while the declaring type is shared.
pub struct MethodDef {
    /// `MethodDef` token
    pub token: Token,
    /// Method name
    pub name: String,
    /// Raw method attributes, see [`MethodAccessFlags`] and [`MethodModifiers`]
    pub flags: u32,
    /// Raw implementation flags, see [`MethodImplFlags`]
    pub impl_flags: u32,
    /// Signature
    pub signature: MethodSig,
    /// Parameter names, in signature order
    pub param_names: Vec<String>,
    /// CIL body, `None` for abstract and runtime-implemented methods
    pub body: RwLock<Option<MethodBody>>,
    /// Debug sequence points of the body
    pub sequence_points: RwLock<Vec<SequencePoint>>,
    /// Custom attributes
    pub custom_attributes: boxcar::Vec<CustomAttribute>,
}

impl MethodDef {
    /// Create a method without body
    pub fn new(token: Token, name: impl Into<String>, flags: u32, signature: MethodSig) -> Self {
        MethodDef {
            token,
            name: name.into(),
            flags,
            impl_flags: 0,
            signature,
            param_names: Vec::new(),
            body: RwLock::new(None),
            sequence_points: RwLock::new(Vec::new()),
            custom_attributes: boxcar::Vec::new(),
        }
    }

    /// Attach a body
    #[must_use]
    pub fn with_body(self, body: MethodBody) -> Self {
        write_lock!(self.body).replace(body);
        self
    }

    /// Member access of this method
    #[must_use]
    pub fn access(&self) -> MethodAccessFlags {
        MethodAccessFlags::from_method_flags(self.flags)
    }

    /// Modifier flags of this method
    #[must_use]
    pub fn modifiers(&self) -> MethodModifiers {
        MethodModifiers::from_method_flags(self.flags)
    }

    /// True for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.modifiers().contains(MethodModifiers::STATIC)
    }

    /// True for abstract methods
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        self.modifiers().contains(MethodModifiers::ABSTRACT)
    }

    /// True for `.ctor`
    #[must_use]
    pub fn is_instance_constructor(&self) -> bool {
        self.name == ".ctor" && !self.is_static()
    }

    /// True if code outside the declaring type's family can call this method
    #[must_use]
    pub fn is_accessible_from_subclass(&self) -> bool {
        matches!(
            self.access(),
            MethodAccessFlags::PUBLIC
                | MethodAccessFlags::FAMILY
                | MethodAccessFlags::FAM_OR_ASSEM
                | MethodAccessFlags::FAM_AND_ASSEM
        )
    }

    /// True if the method has a body
    #[must_use]
    pub fn has_body(&self) -> bool {
        read_lock!(self.body).is_some()
    }

    /// A copy of the current body
    #[must_use]
    pub fn body(&self) -> Option<MethodBody> {
        read_lock!(self.body).clone()
    }

    /// A copy of the current sequence points
    #[must_use]
    pub fn sequence_points(&self) -> Vec<SequencePoint> {
        read_lock!(self.sequence_points).clone()
    }

    /// Replace body and sequence points together
    pub fn replace_body(&self, body: MethodBody, sequence_points: Vec<SequencePoint>) {
        *write_lock!(self.body) = Some(body);
        *write_lock!(self.sequence_points) = sequence_points;
    }
}

impl std::fmt::Debug for MethodDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MethodDef")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("flags", &format_args!("0x{:04x}", self.flags))
            .field("signature", &self.signature)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeSig;

    #[test]
    fn constructor_detection() {
        let ctor = MethodDef::new(
            Token::new(0x0600_0001),
            ".ctor",
            0x0006 | 0x0080 | 0x0800 | 0x1000,
            MethodSig::instance(TypeSig::void(), Vec::new()),
        );
        assert!(ctor.is_instance_constructor());
        assert!(ctor.is_accessible_from_subclass());
        assert!(!ctor.has_body());

        let cctor = MethodDef::new(
            Token::new(0x0600_0002),
            ".ctor",
            0x0001 | 0x0010,
            MethodSig::static_method(TypeSig::void(), Vec::new()),
        );
        assert!(!cctor.is_instance_constructor());
        assert!(!cctor.is_accessible_from_subclass());
    }

    #[test]
    fn replace_body() {
        let method = MethodDef::new(
            Token::new(0x0600_0001),
            "get_Value",
            0x0006,
            MethodSig::instance(TypeSig::object(), Vec::new()),
        )
        .with_body(MethodBody::new(vec![0x14, 0x2A], 1));
        assert_eq!(method.body().map(|body| body.code), Some(vec![0x14, 0x2A]));

        method.replace_body(MethodBody::new(vec![0x2A], 0), Vec::new());
        assert_eq!(method.body().map(|body| body.code), Some(vec![0x2A]));
    }
}
