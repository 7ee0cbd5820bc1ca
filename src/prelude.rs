//! # dotweave Prelude
//!
//! The types most programs need to load modules, inspect them and run the weaver.
//!
//! ```rust,no_run
//! use dotweave::prelude::*;
//!
//! let compiled = CompiledModule::load(std::path::Path::new("Library/Game.dwm"), Vec::new())?;
//! let result = Weaver::new(WeaverConfig::default()).process(&compiled);
//! println!("{} diagnostics", result.diagnostics.len());
//! # Ok::<(), dotweave::Error>(())
//! ```

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all operations
pub use crate::Error;

/// The result type used throughout the crate
pub use crate::Result;

/// Input files and binary parsing
pub use crate::{File, Parser};

// ================================================================================================
// Weaving
// ================================================================================================

/// The pipeline and its inputs and outputs
pub use crate::weaver::{CompiledModule, ProcessResult, Weaver};

/// Configuration
pub use crate::weaver::{SetterPolicy, WeaverConfig};

/// Diagnostics reported to the build host
pub use crate::weaver::{Diagnostic, DiagnosticSeverity, Diagnostics};

/// Processing requests
pub use crate::weaver::{GenerateMode, MemberAttribute};

/// Type tree and generic binding
pub use crate::weaver::{DescendantQuery, GenericResolver, TypeTree};

// ================================================================================================
// Images and Metadata
// ================================================================================================

/// Module images
pub use crate::image::{ImageReader, ImageWriter, InMemoryImage};

/// The loaded module
pub use crate::metadata::module::ModuleImage;

/// Tokens
pub use crate::metadata::token::{Token, TypeKey};

/// Types and signatures
pub use crate::metadata::typesystem::{
    PrimitiveKind, TypeDef, TypeName, TypeRc, TypeRegistry, TypeSig, TypeUniverse,
};

/// Members
pub use crate::metadata::members::{FieldDef, FieldRc, PropertyDef, PropertyRc};

/// Methods
pub use crate::metadata::method::{MethodBody, MethodDef, MethodRc};

/// Custom attributes
pub use crate::metadata::customattributes::{CustomAttribute, CustomAttributeArgument};

/// Builders
pub use crate::metadata::builder::{ClassBuilder, ModuleBuilder};

// ================================================================================================
// CIL
// ================================================================================================

/// Instructions and body editing
pub use crate::assembly::{BranchPolicy, Instruction, InstructionStream, Operand};
