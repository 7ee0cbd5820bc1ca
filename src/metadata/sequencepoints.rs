//! Sequence points, mapping IL offsets of a method body to source locations.
//!
//! # Blob Format
//!
//! Each method's points are stored as one delta-encoded blob:
//! - **IL Offset**: compressed unsigned int, absolute for the first entry, delta afterwards
//! - **Start Line**: compressed unsigned int for the first entry, compressed signed delta afterwards
//! - **Start Column**: same as the start line
//! - **End Line Delta**: compressed unsigned int, added to the start line
//! - **End Column Delta**: compressed unsigned int, added to the start column
//!
//! A start line of `0xFEEFEE` marks a hidden point.
//!
//! ```rust
//! use dotweave::metadata::sequencepoints::parse_sequence_points;
//!
//! let blob: &[u8] = &[1, 10, 2, 0, 5];
//! let points = parse_sequence_points(blob)?;
//! assert_eq!(points.0.len(), 1);
//! assert_eq!(points.0[0].end_col, 7);
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    file::{parser::Parser, writer::Writer},
    Result,
};

/// Start line of hidden sequence points
pub const HIDDEN_LINE: u32 = 0x00FE_EFEE;

/// A mapping from one IL offset to a source range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequencePoint {
    /// IL offset in the method body
    pub il_offset: u32,
    /// Starting line number (1-based)
    pub start_line: u32,
    /// Starting column number (1-based)
    pub start_col: u16,
    /// Ending line number (1-based)
    pub end_line: u32,
    /// Ending column number (1-based)
    pub end_col: u16,
    /// Point is hidden from debuggers
    pub is_hidden: bool,
}

/// The sequence points of one method.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SequencePoints(pub Vec<SequencePoint>);

impl SequencePoints {
    /// Find the point at an exact IL offset
    #[must_use]
    pub fn find_by_il_offset(&self, il_offset: u32) -> Option<&SequencePoint> {
        self.0.iter().find(|sp| sp.il_offset == il_offset)
    }
}

/// Parse a sequence points blob.
///
/// # Errors
/// Returns an error if the blob is truncated or contains invalid compressed integers.
pub fn parse_sequence_points(blob: &[u8]) -> Result<SequencePoints> {
    let mut parser = Parser::new(blob);
    let mut points = Vec::new();
    let mut il_offset = 0u32;
    let mut start_line = 0u32;
    let mut start_col = 0u16;
    let mut first = true;

    while parser.has_more_data() {
        let il_offset_delta = parser.read_compressed_uint()?;
        il_offset = if first {
            il_offset_delta
        } else {
            il_offset
                .checked_add(il_offset_delta)
                .ok_or(malformed_error!("Sequence point offset overflow"))?
        };

        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        if first {
            start_line = parser.read_compressed_uint()?;
            start_col = parser.read_compressed_uint()? as u16;
        } else {
            start_line = start_line.wrapping_add(parser.read_compressed_int()? as u32);
            start_col = start_col.wrapping_add(parser.read_compressed_int()? as u16);
        }

        let end_line_delta = parser.read_compressed_uint()?;
        #[allow(clippy::cast_possible_truncation)]
        let end_col_delta = parser.read_compressed_uint()? as u16;

        points.push(SequencePoint {
            il_offset,
            start_line,
            start_col,
            end_line: start_line.wrapping_add(end_line_delta),
            end_col: start_col.wrapping_add(end_col_delta),
            is_hidden: start_line == HIDDEN_LINE,
        });
        first = false;
    }
    Ok(SequencePoints(points))
}

/// Encode sequence points into a blob, ordered by IL offset.
///
/// # Errors
/// Returns an error if a line or column delta exceeds the compressed integer range.
pub fn encode_sequence_points(points: &[SequencePoint]) -> Result<Vec<u8>> {
    let mut sorted: Vec<&SequencePoint> = points.iter().collect();
    sorted.sort_by_key(|point| point.il_offset);

    let mut writer = Writer::new();
    let mut previous: Option<&SequencePoint> = None;
    for point in sorted {
        match previous {
            None => {
                writer.write_compressed_uint(point.il_offset)?;
                writer.write_compressed_uint(point.start_line)?;
                writer.write_compressed_uint(u32::from(point.start_col))?;
            }
            Some(previous) => {
                writer.write_compressed_uint(point.il_offset - previous.il_offset)?;
                #[allow(clippy::cast_possible_wrap)]
                {
                    writer.write_compressed_int(
                        point.start_line.wrapping_sub(previous.start_line) as i32,
                    )?;
                    writer.write_compressed_int(i32::from(
                        point.start_col.wrapping_sub(previous.start_col) as i16,
                    ))?;
                }
            }
        }
        writer.write_compressed_uint(point.end_line.wrapping_sub(point.start_line))?;
        writer.write_compressed_uint(u32::from(point.end_col.wrapping_sub(point.start_col)))?;
        previous = Some(point);
    }
    Ok(writer.into_data())
}
