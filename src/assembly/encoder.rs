//! CIL bytecode encoding.
//!
//! The reverse of [`crate::assembly::decode_stream`]: lays out an index-addressed instruction
//! list as bytes. Every branch starts out in its short form and is widened to the long form
//! only when its displacement does not fit a signed byte; widening can move other targets out
//! of range, so the layout is iterated until it is stable.
//!
//! ```rust
//! use dotweave::assembly::{encode_stream, Instruction};
//!
//! let instructions = vec![
//!     Instruction::simple("ldarg.0")?,
//!     Instruction::branch("brtrue", 3)?,
//!     Instruction::simple("nop")?,
//!     Instruction::simple("ret")?,
//! ];
//! let encoded = encode_stream(&instructions)?;
//! assert_eq!(encoded.code, vec![0x02, 0x2D, 0x01, 0x00, 0x2A]);
//! # Ok::<(), dotweave::Error>(())
//! ```

use crate::{
    assembly::{
        instruction::{Immediate, Instruction, Operand, OperandType},
        instructions::{long_branch_form, lookup_opcode, short_branch_form},
        opcodes::FE_PREFIX,
    },
    file::writer::Writer,
    Result,
};

/// Encoded code bytes with the byte offset of every instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedCode {
    /// CIL bytecode
    pub code: Vec<u8>,
    /// Offset of each instruction, plus the code length as the final entry
    pub offsets: Vec<u32>,
}

impl EncodedCode {
    /// Byte offset of the instruction at `index`; `index == len` maps to the code end
    #[must_use]
    pub fn offset_of(&self, index: usize) -> Option<u32> {
        self.offsets.get(index).copied()
    }
}

/// Encode an instruction list.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for branch targets past the end of the list and for
/// operands that do not match their opcode.
pub fn encode_stream(instructions: &[Instruction]) -> Result<EncodedCode> {
    let count = instructions.len();
    for (index, instruction) in instructions.iter().enumerate() {
        if let Some(target) = instruction.branch_targets().into_iter().find(|target| *target > count) {
            return Err(malformed_error!(
                "Instruction {} ({}) targets {} past the end of {} instructions",
                index,
                instruction.mnemonic,
                target,
                count
            ));
        }
    }

    let mut long = vec![false; count];
    let offsets = loop {
        let offsets = layout(instructions, &long)?;
        let mut changed = false;

        for (index, instruction) in instructions.iter().enumerate() {
            if long[index] || !is_shortenable(instruction) {
                continue;
            }
            if let Operand::Target(target) = instruction.operand {
                let next = i64::from(offsets[index + 1]);
                let displacement = i64::from(offsets[target]) - next;
                if i8::try_from(displacement).is_err() {
                    long[index] = true;
                    changed = true;
                }
            }
        }

        if !changed {
            break offsets;
        }
    };

    let mut writer = Writer::new();
    for (index, instruction) in instructions.iter().enumerate() {
        let opcode = branch_opcode(instruction, long[index]);
        if instruction.prefix == FE_PREFIX {
            writer.write_le::<u8>(FE_PREFIX);
        }
        writer.write_le::<u8>(opcode);

        let next = i64::from(offsets[index + 1]);
        match &instruction.operand {
            Operand::None => {}
            Operand::Immediate(value) => match *value {
                Immediate::Int8(v) => writer.write_le::<i8>(v),
                Immediate::UInt8(v) => writer.write_le::<u8>(v),
                Immediate::UInt16(v) => writer.write_le::<u16>(v),
                Immediate::Int32(v) => writer.write_le::<i32>(v),
                Immediate::Int64(v) => writer.write_le::<i64>(v),
                Immediate::Float32(v) => writer.write_le::<f32>(v),
                Immediate::Float64(v) => writer.write_le::<f64>(v),
            },
            Operand::Token(token) => writer.write_token(*token),
            Operand::Target(target) => {
                let displacement = i64::from(offsets[*target]) - next;
                if is_shortenable(instruction) && !long[index] {
                    writer.write_le::<i8>(to_i8(displacement)?);
                } else {
                    writer.write_le::<i32>(to_i32(displacement)?);
                }
            }
            Operand::Switch(targets) => {
                writer.write_le::<u32>(to_u32(targets.len())?);
                for target in targets {
                    writer.write_le::<i32>(to_i32(i64::from(offsets[*target]) - next)?);
                }
            }
        }
    }

    Ok(EncodedCode {
        code: writer.into_data(),
        offsets,
    })
}

fn layout(instructions: &[Instruction], long: &[bool]) -> Result<Vec<u32>> {
    let mut offsets = Vec::with_capacity(instructions.len() + 1);
    let mut position = 0usize;
    for (index, instruction) in instructions.iter().enumerate() {
        offsets.push(to_u32(position)?);
        position += encoded_size(instruction, long[index])?;
    }
    offsets.push(to_u32(position)?);
    Ok(offsets)
}

fn encoded_size(instruction: &Instruction, long: bool) -> Result<usize> {
    let opcode_size = if instruction.prefix == FE_PREFIX { 2 } else { 1 };
    let entry = lookup_opcode(instruction.prefix, branch_opcode(instruction, long))
        .ok_or_else(|| malformed_error!("Unknown opcode {:02X}{:02X}", instruction.prefix, instruction.opcode))?;

    let operand_size = match (&instruction.operand, entry.op_type) {
        (Operand::Switch(targets), OperandType::Switch) => 4 + 4 * targets.len(),
        (Operand::Switch(_), _) | (_, OperandType::Switch) => {
            return Err(malformed_error!("Switch operand mismatch on {}", instruction.mnemonic))
        }
        (_, op_type) => op_type.size().unwrap_or(0),
    };
    Ok(opcode_size + operand_size)
}

fn is_shortenable(instruction: &Instruction) -> bool {
    matches!(instruction.operand, Operand::Target(_))
        && instruction.prefix == 0
        && short_branch_form(instruction.opcode) != long_branch_form(instruction.opcode)
}

fn branch_opcode(instruction: &Instruction, long: bool) -> u8 {
    if !is_shortenable(instruction) {
        instruction.opcode
    } else if long {
        long_branch_form(instruction.opcode)
    } else {
        short_branch_form(instruction.opcode)
    }
}

fn to_i8(value: i64) -> Result<i8> {
    i8::try_from(value).map_err(|_| malformed_error!("Short branch out of range - {}", value))
}

fn to_i32(value: i64) -> Result<i32> {
    i32::try_from(value).map_err(|_| malformed_error!("Branch out of range - {}", value))
}

fn to_u32(value: usize) -> Result<u32> {
    u32::try_from(value).map_err(|_| malformed_error!("Code too large - {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::decode_stream, metadata::token::Token};

    #[test]
    fn simple_instruction_encoding() {
        let instructions = vec![
            Instruction::simple("ldarg.0").unwrap(),
            Instruction::with_token("ldfld", Token::new(0x0400_0002)).unwrap(),
            Instruction::simple("ret").unwrap(),
        ];
        let encoded = encode_stream(&instructions).unwrap();
        assert_eq!(encoded.code, vec![0x02, 0x7B, 0x02, 0x00, 0x00, 0x04, 0x2A]);
        assert_eq!(encoded.offsets, vec![0, 1, 6, 7]);
        assert_eq!(encoded.offset_of(3), Some(7));
    }

    #[test]
    fn long_branch_stays_short_when_it_fits() {
        let instructions = vec![
            Instruction::branch("br", 1).unwrap(),
            Instruction::simple("ret").unwrap(),
        ];
        assert_eq!(encode_stream(&instructions).unwrap().code, vec![0x2B, 0x00, 0x2A]);
    }

    #[test]
    fn widen_far_branches() {
        let mut instructions = vec![Instruction::branch("brtrue.s", 201).unwrap()];
        for _ in 0..200 {
            instructions.push(Instruction::simple("nop").unwrap());
        }
        instructions.push(Instruction::simple("ret").unwrap());

        let encoded = encode_stream(&instructions).unwrap();
        assert_eq!(encoded.code[0], 0x3A);
        assert_eq!(&encoded.code[1..5], &200i32.to_le_bytes());

        let decoded = decode_stream(&encoded.code).unwrap();
        assert_eq!(decoded[0].operand, Operand::Target(201));
    }

    #[test]
    fn backward_and_switch_targets() {
        let instructions = vec![
            Instruction::simple("nop").unwrap(),
            Instruction::simple("ldc.i4.0").unwrap(),
            Instruction::new("switch", Operand::Switch(vec![0, 4])).unwrap(),
            Instruction::branch("br.s", 0).unwrap(),
            Instruction::simple("ret").unwrap(),
        ];
        let encoded = encode_stream(&instructions).unwrap();
        let decoded = decode_stream(&encoded.code).unwrap();
        assert_eq!(decoded[2].operand, Operand::Switch(vec![0, 4]));
        assert_eq!(decoded[3].operand, Operand::Target(0));
        assert_eq!(decoded[3].mnemonic, "br.s");
    }

    #[test]
    fn reject_target_past_end() {
        let instructions = vec![Instruction::branch("br.s", 5).unwrap()];
        assert!(encode_stream(&instructions).is_err());
    }
}
