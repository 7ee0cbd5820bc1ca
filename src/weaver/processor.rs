//! The weaving pipeline for one compiled module.
//!
//! [`Weaver::process`] loads the module and every referenced module, indexes their types once,
//! and then runs two passes over the loaded members:
//!
//! - the member pass handles the annotated members declared in the processed module: it adds
//!   the backing field, routes the accessors through it and, depending on the mode, creates the
//!   wrapper with its marker interface and concrete classes;
//! - the bucket pass handles the members of every loaded module whose concrete classes are
//!   generated by the processed module, creating them in shared bucket wrappers.
//!
//! Failures of single members are reported and do not stop the run. Failures that affect the
//! whole invocation (unreadable images, write errors) produce no output and one error.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    file::File,
    image::{ImageReader, ImageWriter, InMemoryImage},
    metadata::{
        customattributes::{CustomAttribute, CustomAttributeArgument},
        members::{FieldAttributes, FieldDef, MemberRef, MemberRefSignature},
        module::ModuleImage,
        token::Token,
        typesystem::{TypeName, TypeRc, TypeSig, TypeUniverse},
    },
    weaver::{
        accessor::inject,
        attributes::{logger_level, GenerateMode},
        config::WeaverConfig,
        diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics},
        scanner::{CandidateMember, MemberScanner},
        synthesizer::{embed_marker_name, ScopeShape, Synthesizer, MARKER_NAME},
        tree::TypeTree,
    },
    Error::{MissingAccessor, NameCollision},
    Result,
};

/// One module handed over by the build host.
#[derive(Debug, Clone, Default)]
pub struct CompiledModule {
    /// Module name, without extension
    pub name: String,
    /// The module image
    pub image: Vec<u8>,
    /// Debug symbols of the image, empty if there are none
    pub symbols: Vec<u8>,
    /// Paths of the images of every referenced module
    pub references: Vec<PathBuf>,
}

impl CompiledModule {
    /// Load an image and its symbols from disk.
    ///
    /// The module name is the file stem of `image_path`; missing symbols are tolerated.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the image cannot be read.
    pub fn load(image_path: &Path, references: Vec<PathBuf>) -> Result<Self> {
        let image = std::fs::read(image_path)?;
        let symbols = std::fs::read(InMemoryImage::symbols_path(image_path)).unwrap_or_default();
        let name = image_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(CompiledModule {
            name,
            image,
            symbols,
            references,
        })
    }

    /// True if one of the references has `module` as file stem
    #[must_use]
    pub fn references_module(&self, module: &str) -> bool {
        self.references
            .iter()
            .any(|path| path.file_stem().is_some_and(|stem| stem == module))
    }
}

/// The outcome of [`Weaver::process`].
#[derive(Debug, Clone, Default)]
pub struct ProcessResult {
    /// The rewritten image, `None` if nothing was changed
    pub output: Option<InMemoryImage>,
    /// Diagnostics at or above the minimum level
    pub diagnostics: Vec<Diagnostic>,
}

impl ProcessResult {
    /// True if the module was rewritten
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.output.is_some()
    }

    /// True if any error was reported
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity == DiagnosticSeverity::Error)
    }
}

/// The referenced images opened for one invocation; every mapping is released on drop.
struct ReferenceSet {
    files: Vec<File>,
}

impl ReferenceSet {
    fn open(paths: &[PathBuf]) -> Result<Self> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            files.push(File::from_file(path)?);
        }
        Ok(ReferenceSet { files })
    }

    fn iter(&self) -> impl Iterator<Item = &File> {
        self.files.iter()
    }
}

impl Drop for ReferenceSet {
    fn drop(&mut self) {
        tracing::debug!(count = self.files.len(), "references released");
    }
}

/// Weaves compiled modules.
///
/// # Example
///
/// ```rust,no_run
/// use dotweave::weaver::{CompiledModule, Weaver, WeaverConfig};
/// use std::path::Path;
///
/// let compiled = CompiledModule::load(
///     Path::new("Library/Game.dwm"),
///     vec!["Library/GenericSerializeReference.dwm".into()],
/// )?;
/// let weaver = Weaver::new(WeaverConfig::default());
/// if weaver.will_process(&compiled) {
///     let result = weaver.process(&compiled);
///     for diagnostic in &result.diagnostics {
///         println!("{diagnostic}");
///     }
///     if let Some(output) = result.output {
///         output.save(Path::new("Library/Game.dwm"))?;
///     }
/// }
/// # Ok::<(), dotweave::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct Weaver {
    config: WeaverConfig,
}

impl Weaver {
    /// Create a weaver with the given configuration
    #[must_use]
    pub fn new(config: WeaverConfig) -> Self {
        Weaver { config }
    }

    /// The configuration
    #[must_use]
    pub fn config(&self) -> &WeaverConfig {
        &self.config
    }

    /// True if `compiled` needs processing: it is neither the runtime nor the weaver module,
    /// and it references the runtime module or generates classes for other modules. The
    /// default target module hands class generation over to the override module when it
    /// references it.
    #[must_use]
    pub fn will_process(&self, compiled: &CompiledModule) -> bool {
        if compiled.name == self.config.runtime_module || compiled.name == self.config.weaver_module {
            return false;
        }
        if compiled.references_module(&self.config.runtime_module)
            || compiled.name == self.config.override_target_module
        {
            return true;
        }
        compiled.name == self.config.default_target_module
            && !compiled.references_module(&self.config.override_target_module)
    }

    /// Weave `compiled`.
    ///
    /// Never fails: problems are reported through the diagnostics of the result. A result
    /// without output means the module is unchanged.
    #[must_use]
    pub fn process(&self, compiled: &CompiledModule) -> ProcessResult {
        let diagnostics = Diagnostics::new(self.config.min_level);
        match self.run(compiled, &diagnostics) {
            Ok(output) => ProcessResult {
                output,
                diagnostics: diagnostics.reported(),
            },
            Err(error) => {
                let failure = Diagnostic::new(DiagnosticSeverity::Error, error.to_string())
                    .with_module(&compiled.name);
                diagnostics.push(failure.clone());
                ProcessResult {
                    output: None,
                    diagnostics: vec![failure],
                }
            }
        }
    }

    fn run(&self, compiled: &CompiledModule, diagnostics: &Diagnostics) -> Result<Option<InMemoryImage>> {
        let symbols = (!compiled.symbols.is_empty()).then_some(compiled.symbols.as_slice());
        let module = ImageReader::read(&compiled.image, symbols)?;
        if let Some(level) = logger_level(&module, &self.config) {
            diagnostics.set_min_level(level);
        }
        diagnostics.push(
            Diagnostic::new(DiagnosticSeverity::Info, "process generic serialize reference")
                .with_module(module.name()),
        );

        let universe = Arc::new(TypeUniverse::new());
        universe.add(Arc::clone(module.types()));
        let mut loaded = Vec::new();
        {
            let references = ReferenceSet::open(&compiled.references)?;
            for file in references.iter() {
                let reference = ImageReader::read(file.data(), None)?;
                universe.add(Arc::clone(reference.types()));
                loaded.push(reference);
            }
        }

        let types: Vec<TypeRc> = universe
            .all_types()
            .into_iter()
            .filter(|ty| !self.config.is_excluded(&ty.module))
            .collect();
        let tree = TypeTree::build(Arc::clone(&universe), &types, diagnostics);
        let mut synthesizer = Synthesizer::new(&module, &tree, diagnostics, self.config.public_only);
        let mut modified = false;

        let own = MemberScanner::scan(&module, &self.config, diagnostics);
        for candidate in &own {
            match self.weave_member(&module, &synthesizer, candidate, diagnostics) {
                Ok(()) => modified = true,
                Err(error) => {
                    let severity = match error {
                        MissingAccessor { .. } => DiagnosticSeverity::Warning,
                        _ => DiagnosticSeverity::Error,
                    };
                    diagnostics.push(candidate.diagnostic(severity, error.to_string()));
                }
            }
        }

        let quiet = Diagnostics::new(DiagnosticSeverity::Error);
        let foreign = loaded
            .iter()
            .flat_map(|reference| MemberScanner::scan(reference, &self.config, &quiet));
        let targeted: Vec<CandidateMember> = own
            .iter()
            .cloned()
            .chain(foreign)
            .filter(|candidate| {
                candidate.attribute.mode.uses_bucket()
                    && self
                        .config
                        .generates_for(module.name(), candidate.attribute.target_module(&self.config))
            })
            .collect();
        for candidate in &targeted {
            match self.fill_bucket(&mut synthesizer, candidate, diagnostics) {
                Ok(true) => modified = true,
                Ok(false) => {}
                Err(error) => {
                    diagnostics.push(candidate.diagnostic(DiagnosticSeverity::Error, error.to_string()));
                }
            }
        }

        if !modified {
            diagnostics.debug(format!("{} left unchanged", module.name()));
            return Ok(None);
        }
        let output = ImageWriter::write(&module)?;
        diagnostics.push(
            Diagnostic::new(
                DiagnosticSeverity::Info,
                format!("wrote {} bytes", output.image.len()),
            )
            .with_module(module.name()),
        );
        Ok(Some(output))
    }

    /// Member pass for one member of the processed module. Nothing is added to the module
    /// unless every step up to the accessor rewrite succeeds.
    fn weave_member(
        &self,
        module: &ModuleImage,
        synthesizer: &Synthesizer<'_>,
        candidate: &CandidateMember,
        diagnostics: &Diagnostics,
    ) -> Result<()> {
        let declaring = &candidate.declaring;
        let property = &candidate.property;
        let attribute = &candidate.attribute;

        let field_name = format!("{}{}", attribute.prefix, property.name);
        if declaring.field(&field_name).is_some() {
            return Err(NameCollision(format!("{}::{field_name}", declaring.fullname)));
        }

        let shape = ScopeShape {
            marker: attribute.interface.is_none(),
            public: attribute.mode.uses_bucket()
                && attribute.target_module(&self.config) != module.name(),
        };
        let marker = match (&attribute.interface, attribute.mode) {
            (Some(interface), _) => interface.clone(),
            (None, GenerateMode::TargetModule) => TypeSig::Class(TypeName::parse(
                self.config.runtime_module.as_str(),
                &self.config.shared_marker,
            )),
            (None, _) => TypeSig::Class(embed_marker_name(declaring, &property.name)),
        };
        let plan = if attribute.mode == GenerateMode::Embed {
            let mut taken = HashSet::new();
            if shape.marker {
                taken.insert(MARKER_NAME.to_string());
            }
            synthesizer.plan(candidate.signature(), &taken)?
        } else {
            Vec::new()
        };

        let field = FieldDef::new(
            module.next_field_token(),
            field_name,
            FieldAttributes::PRIVATE,
            marker.clone(),
        );
        let access = self.field_access(module, declaring, &field);
        let patch = inject(module, declaring, property, access, self.config.setter_policy)?;

        let needs_scope = match attribute.mode {
            GenerateMode::Embed => true,
            GenerateMode::InterfaceOnly => shape.marker,
            GenerateMode::TargetModule => false,
        };
        if needs_scope {
            let scope = synthesizer.embed_scope(declaring, &property.name, shape, &plan)?;
            let generated = synthesizer.emit(&scope.wrapper, &marker, plan)?;
            diagnostics.push(candidate.diagnostic(
                DiagnosticSeverity::Debug,
                format!("{} with {} classes", scope.wrapper.fullname, generated.len()),
            ));
        }

        field
            .custom_attributes
            .push(CustomAttribute::new(self.config.serialize_attribute.clone(), Vec::new()));
        field.custom_attributes.push(CustomAttribute::new(
            TypeName::parse(
                self.config.runtime_module.as_str(),
                &self.config.generated_field_attribute,
            ),
            vec![CustomAttributeArgument::Type(property.signature.clone())],
        ));
        diagnostics.push(candidate.diagnostic(
            DiagnosticSeverity::Debug,
            format!("add field {} : {marker}", field.name),
        ));
        declaring.fields.push(Arc::new(field));

        if patch.setter.is_none() {
            diagnostics.push(candidate.diagnostic(
                DiagnosticSeverity::Debug,
                "no setter, only the getter is instrumented",
            ));
        }
        patch.apply();
        Ok(())
    }

    /// The token accessors use for `field`: the definition itself, or a member reference
    /// through the open instantiation when the declaring type is generic.
    fn field_access(&self, module: &ModuleImage, declaring: &TypeRc, field: &FieldDef) -> Token {
        if !declaring.is_generic() {
            return field.token;
        }
        module.add_member_ref(MemberRef {
            parent: declaring.self_sig(),
            name: field.name.clone(),
            signature: MemberRefSignature::Field(field.signature.clone()),
        })
    }

    /// Bucket pass for one member targeting the processed module. Returns true if a bucket was
    /// created.
    fn fill_bucket(
        &self,
        synthesizer: &mut Synthesizer<'_>,
        candidate: &CandidateMember,
        diagnostics: &Diagnostics,
    ) -> Result<bool> {
        let field_name = format!("{}{}", candidate.attribute.prefix, candidate.property.name);
        let Some(field) = candidate.declaring.field(&field_name) else {
            diagnostics.push(candidate.diagnostic(
                DiagnosticSeverity::Warning,
                format!("backing field {field_name} not found, module not woven yet"),
            ));
            return Ok(false);
        };

        let base = candidate.signature();
        let marker = &field.signature;
        if synthesizer.has_bucket(base, marker) {
            diagnostics.push(candidate.diagnostic(
                DiagnosticSeverity::Debug,
                format!("shares the bucket of {base}"),
            ));
            return Ok(false);
        }

        let plan = synthesizer.plan(base, &HashSet::new())?;
        let (wrapper, _) = synthesizer.bucket(base, marker)?;
        let generated = synthesizer.emit(&wrapper, marker, plan)?;
        diagnostics.push(candidate.diagnostic(
            DiagnosticSeverity::Debug,
            format!("{} with {} classes", wrapper.fullname, generated.len()),
        ));
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        metadata::builder::{ClassBuilder, ModuleBuilder},
        weaver::attributes::MemberAttribute,
    };

    fn compiled(name: &str, references: &[&str]) -> CompiledModule {
        CompiledModule {
            name: name.to_string(),
            references: references
                .iter()
                .map(|reference| PathBuf::from(format!("Library/{reference}.dwm")))
                .collect(),
            ..CompiledModule::default()
        }
    }

    #[test]
    fn will_process() {
        let weaver = Weaver::default();
        assert!(weaver.will_process(&compiled("Game", &["mscorlib", "GenericSerializeReference"])));
        assert!(weaver.will_process(&compiled("Assembly-CSharp", &["mscorlib"])));
        assert!(!weaver.will_process(&compiled(
            "Assembly-CSharp",
            &["mscorlib", "GenericSerializeReference.OverrideAssemblyCSharp"]
        )));
        assert!(weaver.will_process(&compiled(
            "GenericSerializeReference.OverrideAssemblyCSharp",
            &["mscorlib"]
        )));
        assert!(!weaver.will_process(&compiled("Game", &["mscorlib"])));
        assert!(!weaver.will_process(&compiled("GenericSerializeReference", &["GenericSerializeReference"])));
        assert!(!weaver.will_process(&compiled(
            "Unity.GenericSerializeReference.CodeGen",
            &["GenericSerializeReference"]
        )));
    }

    #[test]
    fn unreadable_input_is_one_error() {
        let weaver = Weaver::default();
        let result = weaver.process(&CompiledModule {
            name: "Game".to_string(),
            image: b"MZ\x90\x00".to_vec(),
            ..CompiledModule::default()
        });
        assert!(!result.is_modified());
        assert_eq!(result.diagnostics.len(), 1);
        assert!(result.has_errors());

        let module = ModuleBuilder::new("Game").build();
        let written = ImageWriter::write(&module).unwrap();
        let result = weaver.process(&CompiledModule {
            name: "Game".to_string(),
            image: written.image,
            symbols: written.symbols,
            references: vec![PathBuf::from("/nonexistent/GenericSerializeReference.dwm")],
        });
        assert!(!result.is_modified());
        assert_eq!(result.diagnostics.len(), 1);
    }

    #[test]
    fn unchanged_module_has_no_output() {
        let module = ModuleBuilder::new("Game").build();
        ClassBuilder::new(&module, "Game", "Player").default_constructor().build().unwrap();
        let written = ImageWriter::write(&module).unwrap();

        let result = Weaver::default().process(&CompiledModule {
            name: "Game".to_string(),
            image: written.image,
            symbols: written.symbols,
            references: Vec::new(),
        });
        assert!(!result.is_modified());
        assert!(!result.has_errors());
    }

    #[test]
    fn existing_field_fails_member_only() {
        let config = WeaverConfig::default();
        let module = ModuleBuilder::new("Game").build();
        let ibox = ClassBuilder::interface(&module, "Game", "IBox`1")
            .generic_param("T")
            .build()
            .unwrap();
        let boxed = TypeSig::instantiate(ibox.definition_sig(), vec![TypeSig::object()]);
        let request = MemberAttribute::embed("_").to_attribute(&config);
        ClassBuilder::new(&module, "Game", "Clash")
            .auto_property("Value", boxed.clone(), vec![request.clone()])
            .field("_Value", FieldAttributes::PRIVATE, TypeSig::object(), Vec::new())
            .build()
            .unwrap();
        ClassBuilder::new(&module, "Game", "Fine")
            .auto_property("Value", boxed, vec![request])
            .build()
            .unwrap();
        let written = ImageWriter::write(&module).unwrap();

        let result = Weaver::new(config).process(&CompiledModule {
            name: "Game".to_string(),
            image: written.image,
            symbols: written.symbols,
            references: Vec::new(),
        });
        assert!(result.is_modified());
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.severity == DiagnosticSeverity::Error
                && d.type_name.as_deref() == Some("Game.Clash")));

        let output = result.output.unwrap();
        let woven = ImageReader::read(&output.image, Some(&output.symbols)).unwrap();
        assert!(woven
            .types()
            .get_by_fullname("Game.Fine/<Value>__generic_serialize_reference/IBase")
            .is_some());
        assert!(woven
            .types()
            .get_by_fullname("Game.Clash/<Value>__generic_serialize_reference")
            .is_none());
    }
}
