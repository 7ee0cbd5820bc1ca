//! Binary module images and their debug symbols.
//!
//! A module image is a little-endian container holding one [`ModuleImage`]:
//!
//! | Part | Content |
//! |------|---------|
//! | Header | magic `DWMI`, format version, image id, module name, references, assembly attributes |
//! | Types | in token order: generic params, interfaces, fields, methods with CIL bodies, properties, attributes |
//! | Tables | member refs, type specs, method specs, standalone signatures, user strings |
//!
//! Signatures use ECMA-335 element type bytes and compressed integers, method bodies the
//! ECMA-335 tiny/fat header format. The symbol stream (magic `DWMS`) carries the image id it
//! belongs to and one delta-encoded sequence point blob per method. The image id is derived from
//! a SHA-1 digest of the image with the id field zeroed, so an image and its symbols always
//! match and any change to the image changes the id.
//!
//! # Example
//!
//! ```rust
//! use dotweave::{
//!     image::{ImageReader, ImageWriter},
//!     metadata::builder::{ClassBuilder, ModuleBuilder},
//! };
//!
//! let module = ModuleBuilder::new("Game").reference("mscorlib").build();
//! ClassBuilder::new(&module, "Game", "Player").default_constructor().build()?;
//!
//! let written = ImageWriter::write(&module)?;
//! let loaded = ImageReader::read(&written.image, Some(&written.symbols))?;
//! assert_eq!(loaded.name(), "Game");
//! assert!(loaded.types().get_by_fullname("Game.Player").is_some());
//! # Ok::<(), dotweave::Error>(())
//! ```
//!
//! [`ModuleImage`]: crate::metadata::module::ModuleImage

mod reader;
mod writer;

use std::path::{Path, PathBuf};

pub use reader::ImageReader;
pub use writer::ImageWriter;

use crate::Result;

/// Magic bytes of a module image
pub const IMAGE_MAGIC: &[u8; 4] = b"DWMI";
/// Magic bytes of a symbol stream
pub const SYMBOLS_MAGIC: &[u8; 4] = b"DWMS";
/// Current format version of images and symbol streams
pub const FORMAT_VERSION: u16 = 1;
/// Offset of the image id inside the image header
pub(crate) const IMAGE_ID_OFFSET: usize = 6;

/// An encoded module image together with its debug symbols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryImage {
    /// The module image
    pub image: Vec<u8>,
    /// The symbol stream belonging to `image`
    pub symbols: Vec<u8>,
}

impl InMemoryImage {
    /// The path the symbols of an image stored at `image_path` are written to
    #[must_use]
    pub fn symbols_path(image_path: &Path) -> PathBuf {
        image_path.with_extension("dws")
    }

    /// Store image and symbols next to each other.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if either file cannot be written.
    pub fn save(&self, image_path: &Path) -> Result<()> {
        std::fs::write(image_path, &self.image)?;
        std::fs::write(Self::symbols_path(image_path), &self.symbols)?;
        Ok(())
    }
}
