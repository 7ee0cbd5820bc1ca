//! Access to raw module images.
//!
//! A [`File`] owns the bytes of one module image, either as an owned buffer or as a read-only
//! memory mapping of a file on disk. Referenced modules are opened through [`File::from_file`]
//! and stay mapped only as long as the `File` lives.
//!
//! # Example
//!
//! ```rust,no_run
//! use dotweave::File;
//! use std::path::Path;
//!
//! let file = File::from_file(Path::new("Library/Game.Core.dwm"))?;
//! println!("{} bytes mapped", file.len());
//! # Ok::<(), dotweave::Error>(())
//! ```

pub mod io;
pub mod parser;
pub mod writer;

mod memory;
mod physical;

use std::path::{Path, PathBuf};

use crate::{Error::Empty, Result};
use memory::Memory;
use physical::Physical;

/// Storage of an image: owned memory or a file mapping.
pub trait Backend: Send + Sync {
    /// Borrow `len` bytes starting at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// Borrow the complete data
    fn data(&self) -> &[u8];

    /// Length of the data
    fn len(&self) -> usize;
}

/// An opened module image.
pub struct File {
    data: Box<dyn Backend>,
    path: Option<PathBuf>,
}

impl File {
    /// Memory map the image at `file`.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened and
    /// [`crate::Error::Empty`] for an empty file.
    pub fn from_file(file: &Path) -> Result<File> {
        let input = Physical::new(file)?;

        Self::load(input, Some(file.to_path_buf()))
    }

    /// Wrap an owned buffer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Empty`] if `data` is empty.
    pub fn from_mem(data: Vec<u8>) -> Result<File> {
        let input = Memory::new(data);

        Self::load(input, None)
    }

    fn load<T: Backend + 'static>(data: T, path: Option<PathBuf>) -> Result<File> {
        if data.len() == 0 {
            return Err(Empty);
        }

        Ok(File {
            data: Box::new(data),
            path,
        })
    }

    /// Length of the image in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// True if the image has no data
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The complete image
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.data.data()
    }

    /// Borrow `len` bytes at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the image.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.data.data_slice(offset, len)
    }

    /// The path this image was mapped from, if any
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

impl std::fmt::Debug for File {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("File")
            .field("path", &self.path)
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn from_mem() {
        let file = File::from_mem(vec![1, 2, 3]).unwrap();
        assert_eq!(file.len(), 3);
        assert_eq!(file.data_slice(1, 2).unwrap(), &[2, 3]);
        assert!(file.path().is_none());
    }

    #[test]
    fn from_mem_empty() {
        assert!(matches!(File::from_mem(Vec::new()), Err(crate::Error::Empty)));
    }

    #[test]
    fn from_file() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"DWMI").unwrap();
        tmp.flush().unwrap();

        let file = File::from_file(tmp.path()).unwrap();
        assert_eq!(file.data(), b"DWMI");
        assert_eq!(file.path(), Some(tmp.path()));
    }
}
