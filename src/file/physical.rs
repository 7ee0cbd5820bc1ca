use super::Backend;
use crate::{Error::FileError, Result};

use memmap2::Mmap;
use std::{fs, path::Path};

/// A read-only memory mapping of an image on disk.
///
/// The mapping and the underlying file handle are released when the value is dropped.
#[derive(Debug)]
pub struct Physical {
    data: Mmap,
}

impl Physical {
    /// Map the file at `path` into memory.
    ///
    /// # Errors
    /// Returns [`crate::Error::FileError`] if the file cannot be opened or mapped.
    pub fn new(path: impl AsRef<Path>) -> Result<Physical> {
        let file = fs::File::open(path).map_err(FileError)?;

        // The mapping is never written through and the file is not truncated while mapped.
        let mmap = unsafe { Mmap::map(&file) }.map_err(FileError)?;

        Ok(Physical { data: mmap })
    }
}

impl Backend for Physical {
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let Some(offset_end) = offset.checked_add(len) else {
            return Err(out_of_bounds_error!());
        };

        if offset_end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        Ok(&self.data[offset..offset_end])
    }

    fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn physical() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x44, 0x57, 0x4D, 0x49, 0x01, 0x02]).unwrap();
        file.flush().unwrap();

        let physical = Physical::new(file.path()).unwrap();
        assert_eq!(physical.len(), 6);
        assert_eq!(physical.data()[0], 0x44);
        assert_eq!(physical.data_slice(4, 2).unwrap(), &[0x01, 0x02]);
        assert!(physical.data_slice(5, 2).is_err());
    }

    #[test]
    fn physical_missing_file() {
        assert!(matches!(
            Physical::new("/nonexistent/reference.dwm"),
            Err(crate::Error::FileError(_))
        ));
    }
}
