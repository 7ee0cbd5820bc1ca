//! Generation of concrete serializable classes for generic interface members.
//!
//! A serializer that only stores concrete, non-generic types cannot persist a field of type
//! `IBox<int>`. For every member annotated with the serialize-reference attribute the weaver
//! adds a backing field typed as a marker interface, routes the accessors through it and
//! generates one concrete class per implementation of the generic interface. Each generated
//! class extends the implementation bound to the member's type arguments and implements the
//! marker, so an editor can offer and persist it.
//!
//! # Key Components
//!
//! - [`Weaver`] - Entry point; decides which modules to process and runs the pipeline
//! - [`TypeTree`] - Inheritance and implementation graph over every loaded type
//! - [`GenericResolver`] - Binds the generic parameters of a descendant through its ancestry
//! - [`MemberScanner`] - Finds annotated members
//! - [`Synthesizer`] - Plans and emits wrappers, markers and generated classes
//! - [`accessor`] - Rewrites getter and setter bodies around the backing field
//! - [`Diagnostics`] - Messages reported back to the build host
//!
//! # Generation modes
//!
//! - [`GenerateMode::Embed`] - Classes live in a wrapper nested in the declaring type
//! - [`GenerateMode::InterfaceOnly`] - Only the wrapper and its marker are created; classes
//!   are expected from another module
//! - [`GenerateMode::TargetModule`] - Classes are generated by the target module in a bucket
//!   wrapper shared by every member with the same type and marker
//!
//! # Example
//!
//! ```rust,no_run
//! use dotweave::weaver::{CompiledModule, DiagnosticSeverity, Weaver, WeaverConfig};
//! use std::path::Path;
//!
//! let config = WeaverConfig::default().with_min_level(DiagnosticSeverity::Debug);
//! let weaver = Weaver::new(config);
//! let compiled = CompiledModule::load(Path::new("Library/Assembly-CSharp.dwm"), Vec::new())?;
//! let result = weaver.process(&compiled);
//! println!("modified: {}", result.is_modified());
//! # Ok::<(), dotweave::Error>(())
//! ```

pub mod accessor;
pub mod attributes;
pub mod config;
pub mod diagnostics;
pub mod generics;
pub mod processor;
pub mod scanner;
pub mod synthesizer;
pub mod tree;

pub use attributes::{GenerateMode, MemberAttribute};
pub use config::{SetterPolicy, WeaverConfig};
pub use diagnostics::{Diagnostic, DiagnosticSeverity, Diagnostics};
pub use generics::GenericResolver;
pub use processor::{CompiledModule, ProcessResult, Weaver};
pub use scanner::{CandidateMember, MemberScanner};
pub use synthesizer::{GeneratedType, PlannedClass, Synthesizer};
pub use tree::{DescendantQuery, TypeNode, TypeTree};
