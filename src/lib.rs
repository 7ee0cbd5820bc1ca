// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(dead_code)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # dotweave
//!
//! A build-time CIL weaver that makes members typed as generic interfaces serializable.
//!
//! Serializers of game engines persist polymorphic references only for concrete, non-generic
//! classes. A property of type `IBox<int>` is invisible to them. `dotweave` runs after
//! compilation, finds every annotated property, and rewrites the compiled module:
//!
//! - a backing field typed as a marker interface is added next to the property;
//! - the getter returns the backing field when it is set, the setter clears it;
//! - for every implementation of the generic interface a concrete class is generated that
//!   extends the implementation bound to the property's type arguments and implements the
//!   marker.
//!
//! ## Features
//!
//! - **📦 Efficient memory access** - Referenced images are memory-mapped for the time of one run
//! - **🌳 Cross-module type tree** - One index over the processed module and every reference
//! - **🧬 Generic binding** - Type arguments are propagated through base classes and interfaces
//! - **✂️ Precise body edits** - Branches, exception regions and sequence points survive insertion
//! - **🩺 Diagnostics** - Every skipped member and failure is reported back to the build host
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dotweave::prelude::*;
//! use std::path::Path;
//!
//! let weaver = Weaver::new(WeaverConfig::default());
//! let compiled = CompiledModule::load(
//!     Path::new("Library/Game.dwm"),
//!     vec!["Library/GenericSerializeReference.dwm".into()],
//! )?;
//!
//! if weaver.will_process(&compiled) {
//!     let result = weaver.process(&compiled);
//!     for diagnostic in &result.diagnostics {
//!         eprintln!("{diagnostic}");
//!     }
//!     if let Some(output) = result.output {
//!         output.save(Path::new("Library/Game.dwm"))?;
//!     }
//! }
//! # Ok::<(), dotweave::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - Memory-mapped and in-memory input with a little-endian [`Parser`]
//! - [`image`] - Reading and writing module images and their debug symbols
//! - [`metadata`] - The in-memory model: modules, types, members, signatures, attributes
//! - [`assembly`] - CIL decoding, editing with branch remapping, encoding and stack analysis
//! - [`weaver`] - The type tree, generic binding, member scanning, class synthesis and the
//!   processing pipeline
//!
//! ## Error Handling
//!
//! Fallible operations return [`Result`]. Inside [`weaver::Weaver::process`] errors never
//! escape: member failures become diagnostics, invocation failures an empty result with one
//! error diagnostic.

#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// File access, parsing and writing of little-endian binary data
pub mod file;

/// Convenient re-exports of the most commonly used types.
///
/// # Example
///
/// ```rust
/// use dotweave::prelude::*;
///
/// let config = WeaverConfig::default().with_public_only(true);
/// let weaver = Weaver::new(config);
/// assert!(weaver.config().public_only);
/// ```
pub mod prelude;

/// CIL instructions: decoding, editing, encoding and stack analysis
///
/// Method bodies are edited as instruction lists whose branch operands are instruction indices.
/// See [`assembly::InstructionStream`] for the insertion semantics.
///
/// # Examples
///
/// ```rust
/// use dotweave::assembly::{decode_stream, encode_stream};
///
/// let code = [0x14, 0x2A]; // ldnull; ret
/// let instructions = decode_stream(&code)?;
/// assert_eq!(instructions[1].mnemonic, "ret");
/// assert_eq!(encode_stream(&instructions)?.code, code);
/// # Ok::<(), dotweave::Error>(())
/// ```
pub mod assembly;

/// Module images and their symbol streams
pub mod image;

/// The metadata model of modules, types and members
///
/// # Examples
///
/// ```rust
/// use dotweave::metadata::{builder::{ClassBuilder, ModuleBuilder}, typesystem::TypeSig};
///
/// let module = ModuleBuilder::new("Game").build();
/// let weapon = ClassBuilder::new(&module, "Game", "Weapon").build()?;
/// assert_eq!(weapon.fullname, "Game.Weapon");
/// # Ok::<(), dotweave::Error>(())
/// ```
pub mod metadata;

/// The weaving pipeline
pub mod weaver;

/// `dotweave` Result type
///
/// A type alias for `std::result::Result<T, Error>` where the error type is always [`Error`].
///
/// # Example
///
/// ```rust
/// use dotweave::{Error, Result};
///
/// fn checked(value: u32) -> Result<u32> {
///     if value == 0 {
///         Err(Error::Empty)
///     } else {
///         Ok(value)
///     }
/// }
/// assert!(checked(0).is_err());
/// ```
pub type Result<T> = std::result::Result<T, Error>;

/// `dotweave` Error type
///
/// The main error type for all operations in this crate. Provides detailed error information
/// for image parsing, type resolution, body editing and class generation.
///
/// # Example
///
/// ```rust,no_run
/// use dotweave::{Error, image::ImageReader};
///
/// let image = std::fs::read("Game.dwm")?;
/// match ImageReader::read(&image, None) {
///     Ok(module) => println!("Loaded {}", module.name()),
///     Err(Error::NotSupported) => println!("Image format not supported"),
///     Err(Error::Malformed { message, .. }) => println!("Malformed: {}", message),
///     Err(e) => println!("Error: {}", e),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub use error::Error;

/// Provides access to low-level file and memory parsing utilities.
///
/// # Example
///
/// ```rust
/// use dotweave::Parser;
///
/// let data = [0x2A, 0x00, 0x01, 0x00];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u8>()?, 0x2A);
/// # Ok::<(), dotweave::Error>(())
/// ```
pub use file::{parser::Parser, File};
