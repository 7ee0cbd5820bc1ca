//! CIL instruction decoding, editing and encoding.
//!
//! Method bodies are edited as index-addressed instruction lists. Decoding rebinds every branch
//! displacement to the index of its target instruction, edits insert instructions and remap
//! those indices, and encoding chooses the branch forms and recomputes all byte offsets.
//!
//! # Key Types
//! - [`Instruction`] - One decoded CIL instruction
//! - [`Operand`] - Instruction operands (immediates, tokens, target indices)
//! - [`InstructionStream`] - A method body with exception regions and sequence points
//! - [`BranchPolicy`] - How references to an insertion point treat inserted code
//!
//! # Main Functions
//! - [`decode_stream`] - Decode code bytes into an instruction list
//! - [`encode_stream`] - Encode an instruction list back to bytes
//! - [`compute_max_stack`] - Verify stack balance and compute `max_stack`
//!
//! # Example
//! ```rust
//! use dotweave::assembly::{BranchPolicy, Instruction, InstructionStream};
//!
//! let stream = InstructionStream::new(vec![
//!     Instruction::simple("ldnull")?,
//!     Instruction::simple("ret")?,
//! ]);
//! let edited = stream.insert(1, vec![Instruction::simple("nop")?], BranchPolicy::Redirect)?;
//! assert_eq!(edited.instructions[1].mnemonic, "nop");
//! # Ok::<(), dotweave::Error>(())
//! ```

mod decoder;
mod encoder;
mod instruction;
mod instructions;
pub mod opcodes;
mod stack;
mod stream;

pub use decoder::decode_stream;
pub use encoder::{encode_stream, EncodedCode};
pub use instruction::{FlowType, Immediate, Instruction, Operand, OperandType, StackBehavior};
pub use instructions::{
    long_branch_form, lookup_mnemonic, lookup_opcode, short_branch_form, CilInstruction,
    INSTRUCTIONS, INSTRUCTIONS_FE, VAR,
};
pub use stack::{compute_max_stack, CallResolver};
pub use stream::{AnchoredPoint, BranchPolicy, ExceptionRegion, InstructionStream};
