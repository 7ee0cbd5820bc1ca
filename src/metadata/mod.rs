//! In-memory metadata model of a module.
//!
//! # Key Components
//!
//! - [`module::ModuleImage`] - One module with its types and reference tables
//! - [`typesystem`] - Type definitions, type signatures, per-module registries and the
//!   cross-module [`typesystem::TypeUniverse`]
//! - [`members`] - Fields, properties, member references and method specs
//! - [`method`] - Method definitions, CIL bodies and exception handlers
//! - [`customattributes`] - Custom attribute values and their blob encoding
//! - [`sequencepoints`] - Debug sequence points per method
//! - [`signatures`] - Binary encoding of type, method, field and local signatures
//! - [`token`] - Metadata tokens and the cross-module [`token::TypeKey`]
//! - [`builder`] - Fluent construction of modules and types
//!
//! # Examples
//!
//! ```rust
//! use dotweave::metadata::{builder::{ClassBuilder, ModuleBuilder}, typesystem::TypeSig};
//!
//! let module = ModuleBuilder::new("Game").build();
//! let base = ClassBuilder::new(&module, "Game", "Weapon").default_constructor().build()?;
//! ClassBuilder::new(&module, "Game", "Sword")
//!     .extends(base.definition_sig())
//!     .default_constructor()
//!     .build()?;
//!
//! println!("Types: {}", module.types().len());
//! # Ok::<(), dotweave::Error>(())
//! ```

/// Fluent builders for modules and type definitions
pub mod builder;
/// Implementation of custom attribute values and their encoding
pub mod customattributes;
/// Fields, properties and reference table rows
pub mod members;
/// Method definitions and bodies
pub mod method;
/// A loaded module and its reference tables
pub mod module;
/// Debug sequence points
pub mod sequencepoints;
/// Implementation of method, field and type signatures
pub mod signatures;
/// Commonly used metadata token type
pub mod token;
/// Implementation of the type system
pub mod typesystem;
