//! Decoded CIL instructions.
//!
//! An [`Instruction`] lives in an index-addressed list: branch operands hold the index of their
//! target instruction, not a byte displacement. Byte layout, including the choice between short
//! and long branch forms, is decided only when the list is encoded.

use std::fmt;

use crate::{
    assembly::instructions::{lookup_mnemonic, lookup_opcode, CilInstruction, VAR},
    metadata::token::Token,
    Result,
};

/// Inline operand of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer, also short branch displacements
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer, also long branch displacements
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
    /// Switch table operand
    Switch,
}

impl OperandType {
    /// Size in bytes of fixed-size operands, `None` for switch tables
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            OperandType::None => Some(0),
            OperandType::Int8 | OperandType::UInt8 => Some(1),
            OperandType::UInt16 => Some(2),
            OperandType::Int32 | OperandType::Float32 | OperandType::Token => Some(4),
            OperandType::Int64 | OperandType::Float64 => Some(8),
            OperandType::Switch => None,
        }
    }
}

/// An immediate operand value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit integer
    Int8(i8),
    /// Unsigned 8-bit integer
    UInt8(u8),
    /// Unsigned 16-bit integer
    UInt16(u16),
    /// Signed 32-bit integer
    Int32(i32),
    /// Signed 64-bit integer
    Int64(i64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
}

impl Immediate {
    fn operand_type(&self) -> OperandType {
        match self {
            Immediate::Int8(_) => OperandType::Int8,
            Immediate::UInt8(_) => OperandType::UInt8,
            Immediate::UInt16(_) => OperandType::UInt16,
            Immediate::Int32(_) => OperandType::Int32,
            Immediate::Int64(_) => OperandType::Int64,
            Immediate::Float32(_) => OperandType::Float32,
            Immediate::Float64(_) => OperandType::Float64,
        }
    }
}

/// The operand of an instruction
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand
    None,
    /// An immediate value
    Immediate(Immediate),
    /// Index of the branch target instruction
    Target(usize),
    /// A metadata token
    Token(Token),
    /// Indices of the switch targets
    Switch(Vec<usize>),
}

/// Control flow behaviour of an opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Execution continues with the next instruction
    Sequential,
    /// Branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Calls a method and continues
    Call,
    /// Leaves the method
    Return,
    /// Multi-way branch that falls through on a miss
    Switch,
    /// Raises an exception
    Throw,
    /// Ends a finally, fault or filter block
    EndFinally,
    /// Leaves a protected region, emptying the stack
    Leave,
}

/// Stack effect of an instruction; [`VAR`] marks counts that depend on a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackBehavior {
    /// Number of items popped from stack
    pub pops: u8,
    /// Number of items pushed to stack
    pub pushes: u8,
}

impl StackBehavior {
    /// True if either count depends on the call site
    #[must_use]
    pub fn is_variable(&self) -> bool {
        self.pops == VAR || self.pushes == VAR
    }
}

/// One CIL instruction.
#[derive(Clone, PartialEq)]
pub struct Instruction {
    /// Byte offset in the body this instruction was decoded from, 0 for synthesized code
    pub offset: u32,
    /// Opcode byte (the second byte for prefixed opcodes)
    pub opcode: u8,
    /// `0xFE` for two-byte opcodes, else 0
    pub prefix: u8,
    /// Mnemonic, e.g. `ldfld`
    pub mnemonic: &'static str,
    /// Control flow behaviour
    pub flow_type: FlowType,
    /// Stack effect
    pub stack_behavior: StackBehavior,
    /// Operand
    pub operand: Operand,
}

impl Instruction {
    pub(crate) fn from_table(prefix: u8, opcode: u8, entry: &CilInstruction, operand: Operand) -> Self {
        Instruction {
            offset: 0,
            opcode,
            prefix,
            mnemonic: entry.instr,
            flow_type: entry.flow,
            stack_behavior: StackBehavior {
                pops: entry.stack_pops,
                pushes: entry.stack_pushes,
            },
            operand,
        }
    }

    /// Create an instruction from its mnemonic, checking that the operand fits the opcode.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown mnemonics and mismatching operands.
    pub fn new(mnemonic: &str, operand: Operand) -> Result<Self> {
        let Some((prefix, opcode, entry)) = lookup_mnemonic(mnemonic) else {
            return Err(malformed_error!("Unknown mnemonic - {}", mnemonic));
        };

        let valid = match (&operand, entry.op_type) {
            (Operand::None, OperandType::None) => true,
            (Operand::Token(_), OperandType::Token) => true,
            (Operand::Switch(_), OperandType::Switch) => true,
            (Operand::Target(_), OperandType::Int8 | OperandType::Int32) => {
                is_branch_flow(entry.flow)
            }
            (Operand::Immediate(value), expected) => {
                !is_branch_flow(entry.flow) && value.operand_type() == expected
            }
            _ => false,
        };
        if !valid {
            return Err(malformed_error!(
                "Operand {:?} does not fit {}",
                operand,
                mnemonic
            ));
        }

        Ok(Instruction::from_table(prefix, opcode, entry, operand))
    }

    /// An instruction without operand.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown mnemonics or opcodes that take an operand.
    pub fn simple(mnemonic: &str) -> Result<Self> {
        Instruction::new(mnemonic, Operand::None)
    }

    /// An instruction with a token operand
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown mnemonics or opcodes without token operand.
    pub fn with_token(mnemonic: &str, token: Token) -> Result<Self> {
        Instruction::new(mnemonic, Operand::Token(token))
    }

    /// A branch to the instruction at `target`
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] for unknown mnemonics or non-branch opcodes.
    pub fn branch(mnemonic: &str, target: usize) -> Result<Self> {
        Instruction::new(mnemonic, Operand::Target(target))
    }

    /// The static description of this opcode
    #[must_use]
    pub fn description(&self) -> Option<&'static CilInstruction> {
        lookup_opcode(self.prefix, self.opcode)
    }

    /// True for conditional and unconditional branches, `leave` and `switch`
    #[must_use]
    pub fn is_branch(&self) -> bool {
        is_branch_flow(self.flow_type) || self.flow_type == FlowType::Switch
    }

    /// True for `ret`
    #[must_use]
    pub fn is_return(&self) -> bool {
        self.prefix == 0 && self.opcode == crate::assembly::opcodes::RET
    }

    /// True if execution never falls through to the next instruction
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.flow_type,
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// Indices of all branch targets
    #[must_use]
    pub fn branch_targets(&self) -> Vec<usize> {
        match &self.operand {
            Operand::Target(target) => vec![*target],
            Operand::Switch(targets) => targets.clone(),
            _ => Vec::new(),
        }
    }

    /// The token operand, if any
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }

    /// Rewrite every branch target through `map`
    pub fn remap_targets(&mut self, map: impl Fn(usize) -> usize) {
        match &mut self.operand {
            Operand::Target(target) => *target = map(*target),
            Operand::Switch(targets) => {
                for target in targets.iter_mut() {
                    *target = map(*target);
                }
            }
            _ => {}
        }
    }
}

pub(crate) fn is_branch_flow(flow: FlowType) -> bool {
    matches!(
        flow,
        FlowType::ConditionalBranch | FlowType::UnconditionalBranch | FlowType::Leave
    )
}

impl fmt::Debug for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic)?;
        match &self.operand {
            Operand::None => Ok(()),
            Operand::Immediate(value) => match value {
                Immediate::Int8(v) => write!(f, " {v}"),
                Immediate::UInt8(v) => write!(f, " {v}"),
                Immediate::UInt16(v) => write!(f, " {v}"),
                Immediate::Int32(v) => write!(f, " {v}"),
                Immediate::Int64(v) => write!(f, " {v}"),
                Immediate::Float32(v) => write!(f, " {v}"),
                Immediate::Float64(v) => write!(f, " {v}"),
            },
            Operand::Target(target) => write!(f, " IL_{target:04}"),
            Operand::Token(token) => write!(f, " {token}"),
            Operand::Switch(targets) => {
                f.write_str(" (")?;
                for (index, target) in targets.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "IL_{target:04}")?;
                }
                f.write_str(")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construct_checked() {
        let ret = Instruction::simple("ret").unwrap();
        assert!(ret.is_return());
        assert!(ret.is_terminal());
        assert!(ret.stack_behavior.is_variable());

        let load = Instruction::with_token("ldfld", Token::new(0x0400_0001)).unwrap();
        assert_eq!(load.token(), Some(Token::new(0x0400_0001)));
        assert_eq!(load.stack_behavior, StackBehavior { pops: 1, pushes: 1 });
        assert!(!load.is_branch());

        let branch = Instruction::branch("brtrue.s", 4).unwrap();
        assert!(branch.is_branch());
        assert!(!branch.is_terminal());
        assert_eq!(branch.branch_targets(), vec![4]);
        assert_eq!(branch.to_string(), "brtrue.s IL_0004");

        assert!(Instruction::simple("ldfld").is_err());
        assert!(Instruction::branch("nop", 1).is_err());
        assert!(Instruction::new("br.s", Operand::Immediate(Immediate::Int8(2))).is_err());
        assert!(Instruction::new("ldc.i4.s", Operand::Immediate(Immediate::Int8(2))).is_ok());
        assert!(Instruction::simple("frobnicate").is_err());
    }

    #[test]
    fn remap() {
        let mut switch = Instruction::new("switch", Operand::Switch(vec![1, 3])).unwrap();
        switch.remap_targets(|target| target + 2);
        assert_eq!(switch.branch_targets(), vec![3, 5]);
        assert_eq!(switch.to_string(), "switch (IL_0003, IL_0005)");
    }
}
