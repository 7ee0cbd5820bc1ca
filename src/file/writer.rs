//! Append-only counterpart to [`crate::Parser`].

use crate::{
    file::io::{write_le_at, CilIO},
    metadata::token::Token,
    Result,
};

/// A growable little-endian output buffer.
#[derive(Debug, Default)]
pub struct Writer {
    data: Vec<u8>,
}

impl Writer {
    /// Create an empty writer
    #[must_use]
    pub fn new() -> Self {
        Writer { data: Vec::new() }
    }

    /// Current length, which is also the offset of the next write
    #[must_use]
    pub fn pos(&self) -> usize {
        self.data.len()
    }

    /// Append a little-endian value
    pub fn write_le<T: CilIO>(&mut self, value: T) {
        self.data.extend_from_slice(value.to_le_bytes().as_ref());
    }

    /// Overwrite a previously written value at `offset`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `offset` was never written.
    pub fn patch_le<T: CilIO>(&mut self, offset: usize, value: T) -> Result<()> {
        let mut offset = offset;
        write_le_at(&mut self.data, &mut offset, value)
    }

    /// Append a 4-byte metadata token
    pub fn write_token(&mut self, token: Token) {
        self.write_le::<u32>(token.value());
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Append an ECMA-335 II.23.2 compressed unsigned integer.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for values above `0x1FFF_FFFF`.
    pub fn write_compressed_uint(&mut self, value: u32) -> Result<()> {
        match value {
            0..=0x7F => self.data.push(value as u8),
            0x80..=0x3FFF => {
                self.data.push(0x80 | (value >> 8) as u8);
                self.data.push(value as u8);
            }
            0x4000..=0x1FFF_FFFF => {
                self.data.push(0xC0 | (value >> 24) as u8);
                self.data.push((value >> 16) as u8);
                self.data.push((value >> 8) as u8);
                self.data.push(value as u8);
            }
            _ => {
                return Err(malformed_error!(
                    "Value too large for compressed encoding - {}",
                    value
                ))
            }
        }
        Ok(())
    }

    /// Append a compressed signed integer (sign carried in the lowest bit).
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the magnitude does not fit.
    #[allow(clippy::cast_sign_loss)]
    pub fn write_compressed_int(&mut self, value: i32) -> Result<()> {
        let encoded = if value >= 0 {
            (value as u32) << 1
        } else {
            (((-(value + 1)) as u32) << 1) | 1
        };
        self.write_compressed_uint(encoded)
    }

    /// Append a string prefixed with its compressed byte length.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for strings longer than the compressed range.
    pub fn write_compressed_string_utf8(&mut self, value: &str) -> Result<()> {
        self.write_compressed_blob(value.as_bytes())
    }

    /// Append a blob prefixed with its compressed byte length.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for blobs longer than the compressed range.
    pub fn write_compressed_blob(&mut self, value: &[u8]) -> Result<()> {
        let Ok(length) = u32::try_from(value.len()) else {
            return Err(malformed_error!("Blob too large - {}", value.len()));
        };
        self.write_compressed_uint(length)?;
        self.data.extend_from_slice(value);
        Ok(())
    }

    /// Borrow the bytes written so far
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Consume the writer and return its buffer
    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}
