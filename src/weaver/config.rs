//! Configuration for the weaver.
//!
//! The defaults match the attribute and module names of the `GenericSerializeReference`
//! runtime; hosts that ship the runtime under different names override them here.

use crate::{metadata::typesystem::TypeName, weaver::diagnostics::DiagnosticSeverity};

/// What happens to members whose property has a getter but no setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SetterPolicy {
    /// Instrument the getter and skip setter injection
    #[default]
    AllowGetterOnly,
    /// Skip the whole member with a warning
    RequireBoth,
}

/// Configuration of a [`crate::weaver::Weaver`].
#[derive(Debug, Clone)]
pub struct WeaverConfig {
    /// Name of the runtime module declaring the attributes and the shared marker
    pub runtime_module: String,

    /// Name of the module hosting the weaver itself; never processed
    pub weaver_module: String,

    /// Full name of the per-member processing attribute
    pub member_attribute: String,

    /// Full name of the library attribute that requests a field typed with an explicit
    /// interface, with concrete classes generated by the target module
    pub target_module_attribute: String,

    /// Full name of the assembly-level logger attribute
    pub logger_attribute: String,

    /// Full name of the attribute marking generated backing fields
    pub generated_field_attribute: String,

    /// The attribute that makes the serializer store a field as managed reference
    pub serialize_attribute: TypeName,

    /// Full name of the shared marker interface in the runtime module
    pub shared_marker: String,

    /// Backing field prefix when the attribute does not set one (default: `_`)
    pub default_prefix: String,

    /// Module that generates concrete classes for members in bucket modes
    /// (default: `Assembly-CSharp`)
    pub default_target_module: String,

    /// Module that takes over class generation from the default target module when the
    /// default target references it
    pub override_target_module: String,

    /// Modules whose name starts with one of these are never indexed
    pub excluded_prefixes: Vec<String>,

    /// Treatment of getter-only members
    pub setter_policy: SetterPolicy,

    /// Minimum severity of diagnostics returned to the host; the logger attribute of the
    /// processed module overrides it
    pub min_level: DiagnosticSeverity,

    /// Only generate classes for descendants that are public at every nesting level
    /// (default: true)
    pub public_only: bool,
}

impl Default for WeaverConfig {
    fn default() -> Self {
        Self {
            runtime_module: "GenericSerializeReference".to_string(),
            weaver_module: "Unity.GenericSerializeReference.CodeGen".to_string(),
            member_attribute: "GenericSerializeReference.GenericSerializeReferenceAttribute"
                .to_string(),
            target_module_attribute:
                "GenericSerializeReference.Library.GenericSerializeReferenceInAssemblyCSharpAttribute"
                    .to_string(),
            logger_attribute: "GenericSerializeReference.GenericSerializeReferenceLoggerAttribute"
                .to_string(),
            generated_field_attribute:
                "GenericSerializeReference.GenericSerializeReferenceGeneratedFieldAttribute"
                    .to_string(),
            serialize_attribute: TypeName::new(
                "UnityEngine.CoreModule",
                "UnityEngine",
                "SerializeReference",
            ),
            shared_marker: "GenericSerializeReference.IBase".to_string(),
            default_prefix: "_".to_string(),
            default_target_module: "Assembly-CSharp".to_string(),
            override_target_module: "GenericSerializeReference.OverrideAssemblyCSharp".to_string(),
            excluded_prefixes: vec![
                "Unity.".to_string(),
                "UnityEditor.".to_string(),
                "UnityEngine.".to_string(),
            ],
            setter_policy: SetterPolicy::default(),
            min_level: DiagnosticSeverity::Info,
            public_only: true,
        }
    }
}

impl WeaverConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the runtime module name.
    #[must_use]
    pub fn with_runtime_module(mut self, name: &str) -> Self {
        self.runtime_module = name.to_string();
        self
    }

    /// Sets the module that generates classes for bucket modes.
    #[must_use]
    pub fn with_default_target_module(mut self, name: &str) -> Self {
        self.default_target_module = name.to_string();
        self
    }

    /// Sets the module that replaces the default target module.
    #[must_use]
    pub fn with_override_target_module(mut self, name: &str) -> Self {
        self.override_target_module = name.to_string();
        self
    }

    /// Sets the default backing field prefix.
    #[must_use]
    pub fn with_default_prefix(mut self, prefix: &str) -> Self {
        self.default_prefix = prefix.to_string();
        self
    }

    /// Sets the getter-only member policy.
    #[must_use]
    pub fn with_setter_policy(mut self, policy: SetterPolicy) -> Self {
        self.setter_policy = policy;
        self
    }

    /// Sets the minimum diagnostic severity.
    #[must_use]
    pub fn with_min_level(mut self, level: DiagnosticSeverity) -> Self {
        self.min_level = level;
        self
    }

    /// Enables or disables the public-only descendant filter.
    #[must_use]
    pub fn with_public_only(mut self, public_only: bool) -> Self {
        self.public_only = public_only;
        self
    }

    /// Replaces the excluded module prefixes.
    #[must_use]
    pub fn with_excluded_prefixes(mut self, prefixes: &[&str]) -> Self {
        self.excluded_prefixes = prefixes.iter().map(|prefix| (*prefix).to_string()).collect();
        self
    }

    /// True if `module` generates the classes of members targeting `target`. The override
    /// module stands in for the default target module.
    #[must_use]
    pub fn generates_for(&self, module: &str, target: &str) -> bool {
        module == target
            || (module == self.override_target_module && target == self.default_target_module)
    }

    /// True if types of `module` are left out of the type tree
    #[must_use]
    pub fn is_excluded(&self, module: &str) -> bool {
        self.excluded_prefixes
            .iter()
            .any(|prefix| module.starts_with(prefix.as_str()))
    }
}
