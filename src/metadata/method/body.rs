//! CIL method bodies: header, code and exception handling sections.
//!
//! Supports both tiny and fat method headers as specified by ECMA-335 II.25.4. Encoding picks the
//! tiny header whenever the body allows it and the small exception section layout whenever every
//! clause fits.
//!
//! # Examples
//!
//! ```rust
//! use dotweave::metadata::method::MethodBody;
//!
//! // ldarg.0; ret
//! let body = MethodBody::new(vec![0x02, 0x2A], 1);
//! let bytes = body.encode()?;
//! assert_eq!(bytes, vec![0x0A, 0x02, 0x2A]);
//!
//! let parsed = MethodBody::from(&bytes)?;
//! assert_eq!(parsed.code, body.code);
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    file::{
        io::{read_le, read_le_at},
        writer::Writer,
    },
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBodyFlags, SectionFlags},
        token::Token,
    },
    Result,
};

const TINY_MAX_CODE: usize = 64;
const TINY_MAX_STACK: u16 = 8;
const FAT_HEADER_SIZE: u16 = 12;
const SMALL_CLAUSE_SIZE: usize = 12;
const FAT_CLAUSE_SIZE: usize = 24;

/// The body of one method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodBody {
    /// Maximum number of items on the operand stack
    pub max_stack: u16,
    /// Zero-initialize all locals
    pub init_locals: bool,
    /// `StandAloneSig` token of the local variable signature, null without locals
    pub local_var_sig_token: Token,
    /// CIL bytecode
    pub code: Vec<u8>,
    /// Exception handling clauses
    pub exception_handlers: Vec<ExceptionHandler>,
}

impl MethodBody {
    /// A body without locals or exception handlers
    #[must_use]
    pub fn new(code: Vec<u8>, max_stack: u16) -> Self {
        MethodBody {
            max_stack,
            init_locals: false,
            local_var_sig_token: Token::new(0),
            code,
            exception_handlers: Vec::new(),
        }
    }

    /// Parse a method body from its header onwards.
    ///
    /// # Arguments
    /// * `data` - The bytes of the header, the code and any trailing data sections
    ///
    /// # Errors
    /// Returns an error if the data is empty, truncated, or the header is neither tiny nor fat.
    pub fn from(data: &[u8]) -> Result<MethodBody> {
        if data.is_empty() {
            return Err(malformed_error!("Provided data for body parsing is empty"));
        }

        let first_byte = read_le::<u8>(data)?;
        match MethodBodyFlags::from_bits_truncate(u16::from(first_byte & 0b_0000_0011_u8)) {
            MethodBodyFlags::TINY_FORMAT => {
                let size_code = (first_byte >> 2) as usize;
                if size_code + 1 > data.len() {
                    return Err(out_of_bounds_error!());
                }

                Ok(MethodBody {
                    max_stack: TINY_MAX_STACK,
                    init_locals: false,
                    local_var_sig_token: Token::new(0),
                    code: data[1..=size_code].to_vec(),
                    exception_handlers: Vec::new(),
                })
            }
            MethodBodyFlags::FAT_FORMAT => {
                if data.len() < usize::from(FAT_HEADER_SIZE) {
                    return Err(out_of_bounds_error!());
                }

                let first_duo = read_le::<u16>(data)?;
                let size_header = usize::from(first_duo >> 12) * 4;
                if size_header < usize::from(FAT_HEADER_SIZE) {
                    return Err(malformed_error!(
                        "Fat method header too small - {} bytes",
                        size_header
                    ));
                }

                let max_stack = read_le::<u16>(&data[2..])?;
                let size_code = read_le::<u32>(&data[4..])? as usize;
                let local_var_sig_token = Token::new(read_le::<u32>(&data[8..])?);
                let code_end = size_header
                    .checked_add(size_code)
                    .ok_or(out_of_bounds_error!())?;
                if data.len() < code_end {
                    return Err(out_of_bounds_error!());
                }

                let flags_header =
                    MethodBodyFlags::from_bits_truncate(first_duo & 0b_0000_1111_1111_1111_u16);

                let mut exception_handlers = Vec::new();
                if flags_header.contains(MethodBodyFlags::MORE_SECTS) {
                    let mut cursor = (code_end + 3) & !3;
                    loop {
                        let section = data.get(cursor..).ok_or(out_of_bounds_error!())?;
                        let section_flags = SectionFlags::from_bits_truncate(read_le::<u8>(section)?);
                        if !section_flags.contains(SectionFlags::EHTABLE) {
                            return Err(malformed_error!(
                                "Unsupported method data section - 0x{:02x}",
                                section_flags.bits()
                            ));
                        }

                        let section_start = cursor;
                        if section_flags.contains(SectionFlags::FAT_FORMAT) {
                            let section_size = (read_le::<u32>(section)? >> 8) as usize;
                            if section_size < 4 || data.len() < section_start + section_size {
                                return Err(out_of_bounds_error!());
                            }

                            cursor += 4;
                            for _ in 0..(section_size - 4) / FAT_CLAUSE_SIZE {
                                #[allow(clippy::cast_possible_truncation)]
                                let flags = ExceptionHandlerFlags::from_bits_truncate(
                                    read_le_at::<u32>(data, &mut cursor)? as u16,
                                );
                                exception_handlers.push(ExceptionHandler {
                                    flags,
                                    try_offset: read_le_at::<u32>(data, &mut cursor)?,
                                    try_length: read_le_at::<u32>(data, &mut cursor)?,
                                    handler_offset: read_le_at::<u32>(data, &mut cursor)?,
                                    handler_length: read_le_at::<u32>(data, &mut cursor)?,
                                    filter_offset: read_le_at::<u32>(data, &mut cursor)?,
                                });
                            }
                            cursor = section_start + section_size;
                        } else {
                            let section_size = usize::from(read_le::<u8>(&section[1..])?);
                            if section_size < 4 || data.len() < section_start + section_size {
                                return Err(out_of_bounds_error!());
                            }

                            cursor += 4;
                            for _ in 0..(section_size - 4) / SMALL_CLAUSE_SIZE {
                                exception_handlers.push(ExceptionHandler {
                                    flags: ExceptionHandlerFlags::from_bits_truncate(
                                        read_le_at::<u16>(data, &mut cursor)?,
                                    ),
                                    try_offset: u32::from(read_le_at::<u16>(data, &mut cursor)?),
                                    try_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                                    handler_offset: u32::from(read_le_at::<u16>(
                                        data,
                                        &mut cursor,
                                    )?),
                                    handler_length: u32::from(read_le_at::<u8>(data, &mut cursor)?),
                                    filter_offset: read_le_at::<u32>(data, &mut cursor)?,
                                });
                            }
                            cursor = section_start + section_size;
                        }

                        if !section_flags.contains(SectionFlags::MORE_SECTS) {
                            break;
                        }
                        cursor = (cursor + 3) & !3;
                    }
                }

                Ok(MethodBody {
                    max_stack,
                    init_locals: flags_header.contains(MethodBodyFlags::INIT_LOCALS),
                    local_var_sig_token,
                    code: data[size_header..code_end].to_vec(),
                    exception_handlers,
                })
            }
            _ => Err(malformed_error!(
                "MethodHeader is neither FAT nor TINY - {}",
                first_byte
            )),
        }
    }

    /// True if this body can use the one-byte tiny header
    #[must_use]
    pub fn is_tiny(&self) -> bool {
        self.code.len() < TINY_MAX_CODE
            && self.max_stack <= TINY_MAX_STACK
            && !self.init_locals
            && self.local_var_sig_token.is_null()
            && self.exception_handlers.is_empty()
    }

    /// Encode header, code and exception section.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code or exception section exceeds the format limits.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::new();

        if self.is_tiny() {
            #[allow(clippy::cast_possible_truncation)]
            writer.write_le::<u8>(((self.code.len() as u8) << 2) | 0x2);
            writer.write_bytes(&self.code);
            return Ok(writer.into_data());
        }

        let mut flags = MethodBodyFlags::FAT_FORMAT;
        if self.init_locals {
            flags |= MethodBodyFlags::INIT_LOCALS;
        }
        if !self.exception_handlers.is_empty() {
            flags |= MethodBodyFlags::MORE_SECTS;
        }

        let code_size = u32::try_from(self.code.len())
            .map_err(|_| malformed_error!("Method code too large - {} bytes", self.code.len()))?;

        writer.write_le::<u16>(flags.bits() | ((FAT_HEADER_SIZE / 4) << 12));
        writer.write_le::<u16>(self.max_stack);
        writer.write_le::<u32>(code_size);
        writer.write_token(self.local_var_sig_token);
        writer.write_bytes(&self.code);

        if self.exception_handlers.is_empty() {
            return Ok(writer.into_data());
        }

        while writer.pos() % 4 != 0 {
            writer.write_le::<u8>(0);
        }

        let small_size = 4 + self.exception_handlers.len() * SMALL_CLAUSE_SIZE;
        let small = small_size <= usize::from(u8::MAX)
            && self.exception_handlers.iter().all(ExceptionHandler::fits_small);

        if small {
            writer.write_le::<u8>(SectionFlags::EHTABLE.bits());
            #[allow(clippy::cast_possible_truncation)]
            writer.write_le::<u8>(small_size as u8);
            writer.write_le::<u16>(0);
            for handler in &self.exception_handlers {
                #[allow(clippy::cast_possible_truncation)]
                {
                    writer.write_le::<u16>(handler.flags.bits());
                    writer.write_le::<u16>(handler.try_offset as u16);
                    writer.write_le::<u8>(handler.try_length as u8);
                    writer.write_le::<u16>(handler.handler_offset as u16);
                    writer.write_le::<u8>(handler.handler_length as u8);
                }
                writer.write_le::<u32>(handler.filter_offset);
            }
        } else {
            let fat_size = 4 + self.exception_handlers.len() * FAT_CLAUSE_SIZE;
            if fat_size > 0x00FF_FFFF {
                return Err(malformed_error!(
                    "Too many exception handlers - {}",
                    self.exception_handlers.len()
                ));
            }

            #[allow(clippy::cast_possible_truncation)]
            let header = u32::from((SectionFlags::EHTABLE | SectionFlags::FAT_FORMAT).bits())
                | ((fat_size as u32) << 8);
            writer.write_le::<u32>(header);
            for handler in &self.exception_handlers {
                writer.write_le::<u32>(u32::from(handler.flags.bits()));
                writer.write_le::<u32>(handler.try_offset);
                writer.write_le::<u32>(handler.try_length);
                writer.write_le::<u32>(handler.handler_offset);
                writer.write_le::<u32>(handler.handler_length);
                writer.write_le::<u32>(handler.filter_offset);
            }
        }

        Ok(writer.into_data())
    }
}
