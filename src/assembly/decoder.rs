//! CIL bytecode decoding.
//!
//! [`decode_stream`] turns the code bytes of one method body into an index-addressed list of
//! [`Instruction`]s. Branch displacements are resolved to absolute byte offsets while decoding
//! and then rebound to the index of the instruction starting at that offset, so later edits can
//! insert instructions without touching any displacement.
//!
//! ```rust
//! use dotweave::assembly::{decode_stream, Operand};
//!
//! // ldarg.0; brtrue.s +1; nop; ret
//! let code = [0x02, 0x2D, 0x01, 0x00, 0x2A];
//! let instructions = decode_stream(&code)?;
//! assert_eq!(instructions.len(), 4);
//! assert_eq!(instructions[1].operand, Operand::Target(3));
//! # Ok::<(), dotweave::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    assembly::{
        instruction::{Immediate, Instruction, Operand, OperandType},
        instructions::{INSTRUCTIONS, INSTRUCTIONS_FE},
        opcodes::FE_PREFIX,
    },
    file::parser::Parser,
    metadata::token::Token,
    Result,
};

/// Upper bound for switch tables, far beyond anything a compiler emits
const MAX_SWITCH_TARGETS: u32 = 0x0001_0000;

/// Decode a complete code buffer.
///
/// Every instruction records its byte offset in [`Instruction::offset`]; branch and switch
/// operands hold instruction indices.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown opcodes, truncated operands and branches that
/// do not land on an instruction boundary.
pub fn decode_stream(code: &[u8]) -> Result<Vec<Instruction>> {
    let mut parser = Parser::new(code);
    let mut instructions = Vec::new();
    let mut index_of = HashMap::new();

    while parser.has_more_data() {
        index_of.insert(parser.pos(), instructions.len());
        instructions.push(decode_instruction(&mut parser)?);
    }
    index_of.insert(code.len(), instructions.len());

    for instruction in &mut instructions {
        let at = instruction.offset;
        let rebind = |target: usize| -> Result<usize> {
            index_of.get(&target).copied().ok_or_else(|| {
                malformed_error!(
                    "Branch at IL_{:04x} targets IL_{:04x}, which is not an instruction boundary",
                    at,
                    target
                )
            })
        };

        match &mut instruction.operand {
            Operand::Target(target) => *target = rebind(*target)?,
            Operand::Switch(targets) => {
                for target in targets.iter_mut() {
                    *target = rebind(*target)?;
                }
            }
            _ => {}
        }
    }

    Ok(instructions)
}

/// Decode one instruction at the parser's position.
///
/// Branch and switch operands hold absolute byte offsets into the code buffer.
///
/// # Errors
/// Returns [`crate::Error::Malformed`] for unknown or reserved opcodes and truncated operands.
fn decode_instruction(parser: &mut Parser) -> Result<Instruction> {
    let offset = parser.pos();
    let first_byte = parser.read_le::<u8>()?;

    let (entry, prefix, opcode) = if first_byte == FE_PREFIX {
        let second_byte = parser.read_le::<u8>()?;
        match INSTRUCTIONS_FE.get(usize::from(second_byte)) {
            Some(entry) => (entry, FE_PREFIX, second_byte),
            None => return Err(malformed_error!("Invalid opcode: FE {:02X}", second_byte)),
        }
    } else {
        match INSTRUCTIONS.get(usize::from(first_byte)) {
            Some(entry) => (entry, 0, first_byte),
            None => return Err(malformed_error!("Invalid opcode: {:02X}", first_byte)),
        }
    };

    if entry.instr.is_empty() {
        return Err(malformed_error!(
            "Reserved opcode: {:02X}{:02X}",
            prefix,
            opcode
        ));
    }

    let branch = crate::assembly::instruction::is_branch_flow(entry.flow);
    let operand = match entry.op_type {
        OperandType::None => Operand::None,
        OperandType::Int8 if branch => {
            let displacement = i64::from(parser.read_le::<i8>()?);
            Operand::Target(absolute_target(parser.pos(), displacement)?)
        }
        OperandType::Int32 if branch => {
            let displacement = i64::from(parser.read_le::<i32>()?);
            Operand::Target(absolute_target(parser.pos(), displacement)?)
        }
        OperandType::Int8 => Operand::Immediate(Immediate::Int8(parser.read_le::<i8>()?)),
        OperandType::UInt8 => Operand::Immediate(Immediate::UInt8(parser.read_le::<u8>()?)),
        OperandType::UInt16 => Operand::Immediate(Immediate::UInt16(parser.read_le::<u16>()?)),
        OperandType::Int32 => Operand::Immediate(Immediate::Int32(parser.read_le::<i32>()?)),
        OperandType::Int64 => Operand::Immediate(Immediate::Int64(parser.read_le::<i64>()?)),
        OperandType::Float32 => Operand::Immediate(Immediate::Float32(parser.read_le::<f32>()?)),
        OperandType::Float64 => Operand::Immediate(Immediate::Float64(parser.read_le::<f64>()?)),
        OperandType::Token => Operand::Token(Token::new(parser.read_le::<u32>()?)),
        OperandType::Switch => {
            let case_count = parser.read_le::<u32>()?;
            if case_count > MAX_SWITCH_TARGETS {
                return Err(malformed_error!("Switch table too large - {}", case_count));
            }

            let mut displacements = Vec::with_capacity(case_count as usize);
            for _ in 0..case_count {
                displacements.push(i64::from(parser.read_le::<i32>()?));
            }

            let next = parser.pos();
            let targets = displacements
                .into_iter()
                .map(|displacement| absolute_target(next, displacement))
                .collect::<Result<Vec<_>>>()?;
            Operand::Switch(targets)
        }
    };

    let mut instruction = Instruction::from_table(prefix, opcode, entry, operand);
    instruction.offset = u32::try_from(offset)
        .map_err(|_| malformed_error!("Instruction offset out of range - {}", offset))?;
    Ok(instruction)
}

fn absolute_target(next: usize, displacement: i64) -> Result<usize> {
    #[allow(clippy::cast_possible_wrap)]
    let target = next as i64 + displacement;
    usize::try_from(target).map_err(|_| malformed_error!("Branch target before code start - {}", target))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{assembly::FlowType, Error};

    #[test]
    fn decode_instruction_basic() {
        // ldloc.s 10
        let mut parser = Parser::new(&[0x11, 0x0A]);
        let result = decode_instruction(&mut parser).unwrap();

        assert_eq!(result.mnemonic, "ldloc.s");
        assert_eq!(result.operand, Operand::Immediate(Immediate::UInt8(10)));
        assert_eq!(result.flow_type, FlowType::Sequential);
        assert_eq!(parser.pos(), 2);
    }

    #[test]
    fn decode_prefixed() {
        // ceq; initobj 0x01000002
        let code = [0xFE, 0x01, 0xFE, 0x15, 0x02, 0x00, 0x00, 0x01];
        let instructions = decode_stream(&code).unwrap();
        assert_eq!(instructions.len(), 2);
        assert_eq!(instructions[0].mnemonic, "ceq");
        assert_eq!(instructions[1].mnemonic, "initobj");
        assert_eq!(instructions[1].offset, 2);
        assert_eq!(instructions[1].token(), Some(Token::new(0x0100_0002)));
    }

    #[test]
    fn decode_branches_to_indices() {
        // IL_0000: ldarg.0
        // IL_0001: brfalse IL_000B
        // IL_0006: ldnull
        // IL_0007: br.s IL_000C
        // IL_0009: nop
        // IL_000A: nop
        // IL_000B: nop
        // IL_000C: ret
        let code = [
            0x02, 0x39, 0x05, 0x00, 0x00, 0x00, 0x14, 0x2B, 0x03, 0x00, 0x00, 0x00, 0x2A,
        ];
        let instructions = decode_stream(&code).unwrap();
        assert_eq!(instructions.len(), 8);
        assert_eq!(instructions[1].operand, Operand::Target(6));
        assert_eq!(instructions[3].operand, Operand::Target(7));
        assert!(instructions[7].is_return());
    }

    #[test]
    fn decode_backward_switch() {
        // IL_0000: nop
        // IL_0001: ldc.i4.0
        // IL_0002: switch (IL_0000, IL_000F)
        // IL_000F: ret
        let code = [
            0x00, 0x16, 0x45, 0x02, 0x00, 0x00, 0x00, 0xF1, 0xFF, 0xFF, 0xFF, 0x00, 0x00, 0x00,
            0x00, 0x2A,
        ];
        let instructions = decode_stream(&code).unwrap();
        assert_eq!(instructions[2].operand, Operand::Switch(vec![0, 3]));
    }

    #[test]
    fn reject_invalid() {
        assert!(matches!(decode_stream(&[0x24]), Err(Error::Malformed { .. })));
        assert!(decode_stream(&[0xFE, 0xFF]).is_err());
        assert!(decode_stream(&[0x7B, 0x01]).is_err());
        // br.s into the middle of ldc.i4
        assert!(decode_stream(&[0x2B, 0x01, 0x20, 0x00, 0x00, 0x00, 0x00, 0x2A]).is_err());
        // br.s before the start
        assert!(decode_stream(&[0x2B, 0xF0]).is_err());
    }
}
