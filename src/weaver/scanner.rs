//! Finding the members of a module that request processing.

use crate::{
    metadata::{
        builder::property_of_backing_field,
        customattributes::CustomAttribute,
        members::PropertyRc,
        module::ModuleImage,
        typesystem::{TypeRc, TypeSig},
    },
    weaver::{
        attributes::MemberAttribute,
        config::WeaverConfig,
        diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics},
    },
};

/// A member that carries a processing attribute.
#[derive(Debug, Clone)]
pub struct CandidateMember {
    /// The type declaring the member
    pub declaring: TypeRc,
    /// The annotated property; annotated backing fields are mapped to their property
    pub property: PropertyRc,
    /// The processing request
    pub attribute: MemberAttribute,
}

impl CandidateMember {
    /// `Declaring.Type::Member`, used in diagnostics
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}::{}", self.declaring.fullname, self.property.name)
    }

    /// The generic type of the member
    #[must_use]
    pub fn signature(&self) -> &TypeSig {
        &self.property.signature
    }

    /// A diagnostic carrying this member as context
    #[must_use]
    pub fn diagnostic(&self, severity: DiagnosticSeverity, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(severity, message)
            .with_module(&self.declaring.module)
            .with_type(&self.declaring.fullname)
            .with_member(&self.property.name)
    }
}

/// Scans the types of one module for annotated members.
pub struct MemberScanner;

impl MemberScanner {
    /// Collect every annotated member of a non-abstract class of `module`, nested classes
    /// included, in type and declaration order.
    ///
    /// Properties qualify when their type is a generic instantiation. Annotated fields qualify
    /// through the auto-property they back; any other annotated field is reported and skipped,
    /// as are attributes with unreadable arguments.
    ///
    /// ## Arguments
    /// * 'module'      - The module to scan
    /// * 'config'      - Provides the attribute names
    /// * 'diagnostics' - Receives skipped members
    pub fn scan(
        module: &ModuleImage,
        config: &WeaverConfig,
        diagnostics: &Diagnostics,
    ) -> Vec<CandidateMember> {
        let mut candidates = Vec::new();
        for ty in module.types().iter() {
            if !ty.is_class() || ty.is_abstract() {
                continue;
            }
            Self::scan_properties(&ty, config, diagnostics, &mut candidates);
            Self::scan_fields(&ty, config, diagnostics, &mut candidates);
        }
        candidates
    }

    fn scan_properties(
        ty: &TypeRc,
        config: &WeaverConfig,
        diagnostics: &Diagnostics,
        candidates: &mut Vec<CandidateMember>,
    ) {
        for (_, property) in ty.properties.iter() {
            let Some(attribute) = Self::request_of(
                property.custom_attributes.iter().map(|(_, attribute)| attribute),
                ty,
                &property.name,
                config,
                diagnostics,
            ) else {
                continue;
            };
            if !Self::is_polymorphic(ty, &property, diagnostics) {
                continue;
            }
            candidates.push(CandidateMember {
                declaring: ty.clone(),
                property: property.clone(),
                attribute,
            });
        }
    }

    fn scan_fields(
        ty: &TypeRc,
        config: &WeaverConfig,
        diagnostics: &Diagnostics,
        candidates: &mut Vec<CandidateMember>,
    ) {
        for (_, field) in ty.fields.iter() {
            let Some(attribute) = Self::request_of(
                field.custom_attributes.iter().map(|(_, attribute)| attribute),
                ty,
                &field.name,
                config,
                diagnostics,
            ) else {
                continue;
            };

            let property = property_of_backing_field(&field.name).and_then(|name| ty.property(name));
            let Some(property) = property else {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticSeverity::Warning,
                        "annotated field does not back an auto-property",
                    )
                    .with_module(&ty.module)
                    .with_type(&ty.fullname)
                    .with_member(&field.name),
                );
                continue;
            };

            let already_listed = candidates.iter().any(|candidate| {
                candidate.declaring.token == ty.token && candidate.property.token == property.token
            });
            if already_listed {
                continue;
            }
            if !Self::is_polymorphic(ty, &property, diagnostics) {
                continue;
            }
            candidates.push(CandidateMember {
                declaring: ty.clone(),
                property,
                attribute,
            });
        }
    }

    /// Only generic reference types can hold a generated subclass.
    fn is_polymorphic(ty: &TypeRc, property: &PropertyRc, diagnostics: &Diagnostics) -> bool {
        let problem = if !property.signature.is_generic_instance() {
            "is not a generic instance"
        } else if property.signature.is_value_type() {
            "is a value type"
        } else {
            return true;
        };
        diagnostics.push(
            Diagnostic::new(
                DiagnosticSeverity::Warning,
                format!("property type {} {problem}", property.signature),
            )
            .with_module(&ty.module)
            .with_type(&ty.fullname)
            .with_member(&property.name),
        );
        false
    }

    fn request_of<'a>(
        attributes: impl Iterator<Item = &'a CustomAttribute>,
        ty: &TypeRc,
        member: &str,
        config: &WeaverConfig,
        diagnostics: &Diagnostics,
    ) -> Option<MemberAttribute> {
        for attribute in attributes {
            match MemberAttribute::from_attribute(attribute, config) {
                Ok(Some(request)) => return Some(request),
                Ok(None) => {}
                Err(error) => {
                    diagnostics.push(
                        Diagnostic::new(DiagnosticSeverity::Warning, error.to_string())
                            .with_module(&ty.module)
                            .with_type(&ty.fullname)
                            .with_member(member),
                    );
                    return None;
                }
            }
        }
        None
    }
}
