//! Processing attributes read from member and assembly metadata.
//!
//! Two member attributes request processing. The runtime attribute takes an optional prefix and
//! mode as constructor arguments and accepts the same values, plus an explicit interface and
//! target module, as named arguments. The library attribute carries an explicit interface type
//! and a prefix and always selects [`GenerateMode::TargetModule`].

use crate::{
    metadata::{
        customattributes::{CustomAttribute, CustomAttributeArgument},
        module::ModuleImage,
        typesystem::{TypeName, TypeSig},
    },
    weaver::{config::WeaverConfig, diagnostics::DiagnosticSeverity},
    Result,
};

/// Named argument: backing field prefix
pub const ARG_PREFIX: &str = "SerializedFieldPrefix";
/// Named argument: generation mode
pub const ARG_MODE: &str = "Mode";
/// Named argument: explicit marker interface
pub const ARG_INTERFACE: &str = "InterfaceType";
/// Named argument: module that generates the concrete classes
pub const ARG_TARGET_MODULE: &str = "TargetModule";

/// Prefix used by the library attribute when none is given
pub const LIBRARY_DEFAULT_PREFIX: &str = "__";

/// How the concrete classes of a member are provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GenerateMode {
    /// Nested marker interface plus generated classes next to it, in the declaring module
    #[default]
    Embed,
    /// Nested marker interface and backing field here; classes come from the target module
    InterfaceOnly,
    /// Backing field typed with an explicit or shared interface; classes come from the target
    /// module
    TargetModule,
}

impl GenerateMode {
    /// Map the enum value stored in attribute blobs
    #[must_use]
    pub fn from_value(value: i64) -> Option<Self> {
        match value {
            0 => Some(GenerateMode::Embed),
            1 => Some(GenerateMode::InterfaceOnly),
            2 => Some(GenerateMode::TargetModule),
            _ => None,
        }
    }

    /// The enum value stored in attribute blobs
    #[must_use]
    pub fn value(self) -> i32 {
        match self {
            GenerateMode::Embed => 0,
            GenerateMode::InterfaceOnly => 1,
            GenerateMode::TargetModule => 2,
        }
    }

    /// True for modes whose classes are generated by a bucket pass
    #[must_use]
    pub fn uses_bucket(self) -> bool {
        !matches!(self, GenerateMode::Embed)
    }
}

/// The processing request attached to one member.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberAttribute {
    /// Generation mode
    pub mode: GenerateMode,
    /// Backing field name prefix
    pub prefix: String,
    /// Explicit marker interface
    pub interface: Option<TypeSig>,
    /// Module generating the concrete classes, `None` for the configured default
    pub target_module: Option<String>,
}

impl MemberAttribute {
    /// An `Embed` request with the given prefix
    #[must_use]
    pub fn embed(prefix: &str) -> Self {
        MemberAttribute {
            mode: GenerateMode::Embed,
            prefix: prefix.to_string(),
            interface: None,
            target_module: None,
        }
    }

    /// Read the request from a custom attribute.
    ///
    /// Returns `Ok(None)` for attributes that do not request processing.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an argument has the wrong kind or the mode value
    /// is unknown.
    pub fn from_attribute(attribute: &CustomAttribute, config: &WeaverConfig) -> Result<Option<Self>> {
        if attribute.is(&config.member_attribute) {
            return Self::from_runtime_attribute(attribute, config).map(Some);
        }
        if attribute.is(&config.target_module_attribute) {
            return Self::from_library_attribute(attribute).map(Some);
        }
        Ok(None)
    }

    fn from_runtime_attribute(attribute: &CustomAttribute, config: &WeaverConfig) -> Result<Self> {
        let mut request = MemberAttribute::embed(&config.default_prefix);

        if let Some(prefix) = attribute.fixed(0) {
            request.prefix = string_argument(prefix, ARG_PREFIX)?;
        }
        if let Some(mode) = attribute.fixed(1) {
            request.mode = mode_argument(mode)?;
        }
        if let Some(prefix) = attribute.named(ARG_PREFIX) {
            request.prefix = string_argument(prefix, ARG_PREFIX)?;
        }
        if let Some(mode) = attribute.named(ARG_MODE) {
            request.mode = mode_argument(mode)?;
        }
        if let Some(interface) = attribute.named(ARG_INTERFACE) {
            request.interface = Some(type_argument(interface, ARG_INTERFACE)?);
        }
        if let Some(module) = attribute.named(ARG_TARGET_MODULE) {
            request.target_module = Some(string_argument(module, ARG_TARGET_MODULE)?);
        }
        Ok(request)
    }

    fn from_library_attribute(attribute: &CustomAttribute) -> Result<Self> {
        let interface = match attribute.fixed(0) {
            Some(argument) => type_argument(argument, ARG_INTERFACE)?,
            None => return Err(malformed_error!("Library attribute without interface type")),
        };
        let prefix = match attribute.fixed(1) {
            Some(argument) => string_argument(argument, ARG_PREFIX)?,
            None => LIBRARY_DEFAULT_PREFIX.to_string(),
        };
        Ok(MemberAttribute {
            mode: GenerateMode::TargetModule,
            prefix,
            interface: Some(interface),
            target_module: None,
        })
    }

    /// The module that generates the concrete classes of this member
    #[must_use]
    pub fn target_module<'a>(&'a self, config: &'a WeaverConfig) -> &'a str {
        self.target_module
            .as_deref()
            .unwrap_or(config.default_target_module.as_str())
    }

    /// Encode the request as runtime attribute, the inverse of [`MemberAttribute::from_attribute`]
    #[must_use]
    pub fn to_attribute(&self, config: &WeaverConfig) -> CustomAttribute {
        let mut attribute = CustomAttribute::new(
            TypeName::parse(config.runtime_module.as_str(), &config.member_attribute),
            vec![
                CustomAttributeArgument::String(self.prefix.clone()),
                CustomAttributeArgument::I4(self.mode.value()),
            ],
        );
        if let Some(interface) = &self.interface {
            attribute = attribute.with_named(
                ARG_INTERFACE,
                true,
                CustomAttributeArgument::Type(interface.clone()),
            );
        }
        if let Some(module) = &self.target_module {
            attribute = attribute.with_named(
                ARG_TARGET_MODULE,
                true,
                CustomAttributeArgument::String(module.clone()),
            );
        }
        attribute
    }
}

/// The minimum level requested by the assembly-level logger attribute of `module`
#[must_use]
pub fn logger_level(module: &ModuleImage, config: &WeaverConfig) -> Option<DiagnosticSeverity> {
    module
        .assembly_attributes()
        .iter()
        .find(|(_, attribute)| attribute.is(&config.logger_attribute))
        .and_then(|(_, attribute)| attribute.fixed(0))
        .and_then(CustomAttributeArgument::as_i64)
        .and_then(DiagnosticSeverity::from_log_level)
}

/// The logger attribute requesting `level`
#[must_use]
pub fn logger_attribute(level: DiagnosticSeverity, config: &WeaverConfig) -> CustomAttribute {
    CustomAttribute::new(
        TypeName::parse(config.runtime_module.as_str(), &config.logger_attribute),
        vec![CustomAttributeArgument::I4(level as i32)],
    )
}

fn string_argument(argument: &CustomAttributeArgument, name: &str) -> Result<String> {
    argument
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed_error!("Argument {} is not a string", name))
}

fn type_argument(argument: &CustomAttributeArgument, name: &str) -> Result<TypeSig> {
    argument
        .as_type()
        .cloned()
        .ok_or_else(|| malformed_error!("Argument {} is not a type", name))
}

fn mode_argument(argument: &CustomAttributeArgument) -> Result<GenerateMode> {
    let value = argument
        .as_i64()
        .ok_or_else(|| malformed_error!("Argument {} is not an enum value", ARG_MODE))?;
    GenerateMode::from_value(value).ok_or_else(|| malformed_error!("Unknown generate mode {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::builder::ModuleBuilder;

    fn runtime(config: &WeaverConfig, fixed: Vec<CustomAttributeArgument>) -> CustomAttribute {
        CustomAttribute::new(
            TypeName::parse(config.runtime_module.as_str(), &config.member_attribute),
            fixed,
        )
    }

    #[test]
    fn runtime_attribute_defaults() {
        let config = WeaverConfig::default();
        let request = MemberAttribute::from_attribute(&runtime(&config, Vec::new()), &config)
            .unwrap()
            .unwrap();
        assert_eq!(request, MemberAttribute::embed("_"));
        assert_eq!(request.target_module(&config), "Assembly-CSharp");
    }

    #[test]
    fn runtime_attribute_arguments() {
        let config = WeaverConfig::default();
        let interface = TypeSig::Class(TypeName::new("Game", "Game", "IWeapon"));
        let attribute = runtime(
            &config,
            vec![
                CustomAttributeArgument::String("m_".to_string()),
                CustomAttributeArgument::Enum(
                    "GenericSerializeReference.GenerateMode".to_string(),
                    Box::new(CustomAttributeArgument::I4(1)),
                ),
            ],
        )
        .with_named(ARG_INTERFACE, true, CustomAttributeArgument::Type(interface.clone()))
        .with_named(ARG_TARGET_MODULE, true, CustomAttributeArgument::String("Game".to_string()));

        let request = MemberAttribute::from_attribute(&attribute, &config).unwrap().unwrap();
        assert_eq!(request.prefix, "m_");
        assert_eq!(request.mode, GenerateMode::InterfaceOnly);
        assert_eq!(request.interface, Some(interface));
        assert_eq!(request.target_module(&config), "Game");
        assert_eq!(MemberAttribute::from_attribute(&request.to_attribute(&config), &config).unwrap(), Some(request));
    }

    #[test]
    fn library_attribute() {
        let config = WeaverConfig::default();
        let interface = TypeSig::Class(TypeName::new("Game", "Game", "IWeapon"));
        let attribute = CustomAttribute::new(
            TypeName::parse("GenericSerializeReference.Library", &config.target_module_attribute),
            vec![CustomAttributeArgument::Type(interface.clone())],
        );
        let request = MemberAttribute::from_attribute(&attribute, &config).unwrap().unwrap();
        assert_eq!(request.mode, GenerateMode::TargetModule);
        assert_eq!(request.prefix, LIBRARY_DEFAULT_PREFIX);
        assert_eq!(request.interface, Some(interface));
    }

    #[test]
    fn rejected_arguments() {
        let config = WeaverConfig::default();
        let bad_mode = runtime(
            &config,
            vec![
                CustomAttributeArgument::String("_".to_string()),
                CustomAttributeArgument::I4(7),
            ],
        );
        assert!(MemberAttribute::from_attribute(&bad_mode, &config).is_err());

        let bad_prefix = runtime(&config, vec![CustomAttributeArgument::I4(0)]);
        assert!(MemberAttribute::from_attribute(&bad_prefix, &config).is_err());

        let unrelated = CustomAttribute::new(TypeName::new("mscorlib", "System", "ObsoleteAttribute"), Vec::new());
        assert!(MemberAttribute::from_attribute(&unrelated, &config).unwrap().is_none());
    }

    #[test]
    fn logger() {
        let config = WeaverConfig::default();
        let module = ModuleBuilder::new("Game")
            .assembly_attribute(logger_attribute(DiagnosticSeverity::Warning, &config))
            .build();
        assert_eq!(logger_level(&module, &config), Some(DiagnosticSeverity::Warning));
        assert_eq!(logger_level(&ModuleBuilder::new("Other").build(), &config), None);
    }
}
