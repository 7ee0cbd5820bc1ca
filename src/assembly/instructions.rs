//! The ECMA-335 opcode table (Partition III).
//!
//! [`INSTRUCTIONS`] is indexed by the single opcode byte, [`INSTRUCTIONS_FE`] by the second byte
//! of `0xFE`-prefixed opcodes. Reserved slots carry an empty mnemonic.

use crate::assembly::instruction::{FlowType, OperandType};

/// Stack count that depends on the call site's signature
pub const VAR: u8 = 0xFF;

/// Static description of one opcode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CilInstruction {
    /// Mnemonic, empty for reserved opcodes
    pub instr: &'static str,
    /// Inline operand
    pub op_type: OperandType,
    /// Control flow behaviour
    pub flow: FlowType,
    /// Values popped, or [`VAR`]
    pub stack_pops: u8,
    /// Values pushed, or [`VAR`]
    pub stack_pushes: u8,
}

const RESERVED: CilInstruction = op("", OperandType::None, FlowType::Sequential, 0, 0);

const fn op(
    instr: &'static str,
    op_type: OperandType,
    flow: FlowType,
    stack_pops: u8,
    stack_pushes: u8,
) -> CilInstruction {
    CilInstruction {
        instr,
        op_type,
        flow,
        stack_pops,
        stack_pushes,
    }
}

const fn seq(instr: &'static str, stack_pops: u8, stack_pushes: u8) -> CilInstruction {
    op(instr, OperandType::None, FlowType::Sequential, stack_pops, stack_pushes)
}

const fn tok(instr: &'static str, stack_pops: u8, stack_pushes: u8) -> CilInstruction {
    op(instr, OperandType::Token, FlowType::Sequential, stack_pops, stack_pushes)
}

const fn short_branch(instr: &'static str, stack_pops: u8) -> CilInstruction {
    let flow = if stack_pops == 0 {
        FlowType::UnconditionalBranch
    } else {
        FlowType::ConditionalBranch
    };
    op(instr, OperandType::Int8, flow, stack_pops, 0)
}

const fn long_branch(instr: &'static str, stack_pops: u8) -> CilInstruction {
    let flow = if stack_pops == 0 {
        FlowType::UnconditionalBranch
    } else {
        FlowType::ConditionalBranch
    };
    op(instr, OperandType::Int32, flow, stack_pops, 0)
}

/// Single-byte opcodes `0x00..=0xE0`
pub const INSTRUCTIONS: [CilInstruction; 0xE1] = build_single();

/// Second bytes of `0xFE`-prefixed opcodes `0x00..=0x1E`
pub const INSTRUCTIONS_FE: [CilInstruction; 0x1F] = build_prefixed();

const fn build_single() -> [CilInstruction; 0xE1] {
    let mut t = [RESERVED; 0xE1];

    t[0x00] = seq("nop", 0, 0);
    t[0x01] = seq("break", 0, 0);
    t[0x02] = seq("ldarg.0", 0, 1);
    t[0x03] = seq("ldarg.1", 0, 1);
    t[0x04] = seq("ldarg.2", 0, 1);
    t[0x05] = seq("ldarg.3", 0, 1);
    t[0x06] = seq("ldloc.0", 0, 1);
    t[0x07] = seq("ldloc.1", 0, 1);
    t[0x08] = seq("ldloc.2", 0, 1);
    t[0x09] = seq("ldloc.3", 0, 1);
    t[0x0A] = seq("stloc.0", 1, 0);
    t[0x0B] = seq("stloc.1", 1, 0);
    t[0x0C] = seq("stloc.2", 1, 0);
    t[0x0D] = seq("stloc.3", 1, 0);
    t[0x0E] = op("ldarg.s", OperandType::UInt8, FlowType::Sequential, 0, 1);
    t[0x0F] = op("ldarga.s", OperandType::UInt8, FlowType::Sequential, 0, 1);
    t[0x10] = op("starg.s", OperandType::UInt8, FlowType::Sequential, 1, 0);
    t[0x11] = op("ldloc.s", OperandType::UInt8, FlowType::Sequential, 0, 1);
    t[0x12] = op("ldloca.s", OperandType::UInt8, FlowType::Sequential, 0, 1);
    t[0x13] = op("stloc.s", OperandType::UInt8, FlowType::Sequential, 1, 0);
    t[0x14] = seq("ldnull", 0, 1);
    t[0x15] = seq("ldc.i4.m1", 0, 1);
    t[0x16] = seq("ldc.i4.0", 0, 1);
    t[0x17] = seq("ldc.i4.1", 0, 1);
    t[0x18] = seq("ldc.i4.2", 0, 1);
    t[0x19] = seq("ldc.i4.3", 0, 1);
    t[0x1A] = seq("ldc.i4.4", 0, 1);
    t[0x1B] = seq("ldc.i4.5", 0, 1);
    t[0x1C] = seq("ldc.i4.6", 0, 1);
    t[0x1D] = seq("ldc.i4.7", 0, 1);
    t[0x1E] = seq("ldc.i4.8", 0, 1);
    t[0x1F] = op("ldc.i4.s", OperandType::Int8, FlowType::Sequential, 0, 1);
    t[0x20] = op("ldc.i4", OperandType::Int32, FlowType::Sequential, 0, 1);
    t[0x21] = op("ldc.i8", OperandType::Int64, FlowType::Sequential, 0, 1);
    t[0x22] = op("ldc.r4", OperandType::Float32, FlowType::Sequential, 0, 1);
    t[0x23] = op("ldc.r8", OperandType::Float64, FlowType::Sequential, 0, 1);
    t[0x25] = seq("dup", 1, 2);
    t[0x26] = seq("pop", 1, 0);
    t[0x27] = op("jmp", OperandType::Token, FlowType::Return, 0, 0);
    t[0x28] = op("call", OperandType::Token, FlowType::Call, VAR, VAR);
    t[0x29] = op("calli", OperandType::Token, FlowType::Call, VAR, VAR);
    t[0x2A] = op("ret", OperandType::None, FlowType::Return, VAR, 0);
    t[0x2B] = short_branch("br.s", 0);
    t[0x2C] = short_branch("brfalse.s", 1);
    t[0x2D] = short_branch("brtrue.s", 1);
    t[0x2E] = short_branch("beq.s", 2);
    t[0x2F] = short_branch("bge.s", 2);
    t[0x30] = short_branch("bgt.s", 2);
    t[0x31] = short_branch("ble.s", 2);
    t[0x32] = short_branch("blt.s", 2);
    t[0x33] = short_branch("bne.un.s", 2);
    t[0x34] = short_branch("bge.un.s", 2);
    t[0x35] = short_branch("bgt.un.s", 2);
    t[0x36] = short_branch("ble.un.s", 2);
    t[0x37] = short_branch("blt.un.s", 2);
    t[0x38] = long_branch("br", 0);
    t[0x39] = long_branch("brfalse", 1);
    t[0x3A] = long_branch("brtrue", 1);
    t[0x3B] = long_branch("beq", 2);
    t[0x3C] = long_branch("bge", 2);
    t[0x3D] = long_branch("bgt", 2);
    t[0x3E] = long_branch("ble", 2);
    t[0x3F] = long_branch("blt", 2);
    t[0x40] = long_branch("bne.un", 2);
    t[0x41] = long_branch("bge.un", 2);
    t[0x42] = long_branch("bgt.un", 2);
    t[0x43] = long_branch("ble.un", 2);
    t[0x44] = long_branch("blt.un", 2);
    t[0x45] = op("switch", OperandType::Switch, FlowType::Switch, 1, 0);
    t[0x46] = seq("ldind.i1", 1, 1);
    t[0x47] = seq("ldind.u1", 1, 1);
    t[0x48] = seq("ldind.i2", 1, 1);
    t[0x49] = seq("ldind.u2", 1, 1);
    t[0x4A] = seq("ldind.i4", 1, 1);
    t[0x4B] = seq("ldind.u4", 1, 1);
    t[0x4C] = seq("ldind.i8", 1, 1);
    t[0x4D] = seq("ldind.i", 1, 1);
    t[0x4E] = seq("ldind.r4", 1, 1);
    t[0x4F] = seq("ldind.r8", 1, 1);
    t[0x50] = seq("ldind.ref", 1, 1);
    t[0x51] = seq("stind.ref", 2, 0);
    t[0x52] = seq("stind.i1", 2, 0);
    t[0x53] = seq("stind.i2", 2, 0);
    t[0x54] = seq("stind.i4", 2, 0);
    t[0x55] = seq("stind.i8", 2, 0);
    t[0x56] = seq("stind.r4", 2, 0);
    t[0x57] = seq("stind.r8", 2, 0);
    t[0x58] = seq("add", 2, 1);
    t[0x59] = seq("sub", 2, 1);
    t[0x5A] = seq("mul", 2, 1);
    t[0x5B] = seq("div", 2, 1);
    t[0x5C] = seq("div.un", 2, 1);
    t[0x5D] = seq("rem", 2, 1);
    t[0x5E] = seq("rem.un", 2, 1);
    t[0x5F] = seq("and", 2, 1);
    t[0x60] = seq("or", 2, 1);
    t[0x61] = seq("xor", 2, 1);
    t[0x62] = seq("shl", 2, 1);
    t[0x63] = seq("shr", 2, 1);
    t[0x64] = seq("shr.un", 2, 1);
    t[0x65] = seq("neg", 1, 1);
    t[0x66] = seq("not", 1, 1);
    t[0x67] = seq("conv.i1", 1, 1);
    t[0x68] = seq("conv.i2", 1, 1);
    t[0x69] = seq("conv.i4", 1, 1);
    t[0x6A] = seq("conv.i8", 1, 1);
    t[0x6B] = seq("conv.r4", 1, 1);
    t[0x6C] = seq("conv.r8", 1, 1);
    t[0x6D] = seq("conv.u4", 1, 1);
    t[0x6E] = seq("conv.u8", 1, 1);
    t[0x6F] = op("callvirt", OperandType::Token, FlowType::Call, VAR, VAR);
    t[0x70] = tok("cpobj", 2, 0);
    t[0x71] = tok("ldobj", 1, 1);
    t[0x72] = tok("ldstr", 0, 1);
    t[0x73] = op("newobj", OperandType::Token, FlowType::Call, VAR, 1);
    t[0x74] = tok("castclass", 1, 1);
    t[0x75] = tok("isinst", 1, 1);
    t[0x76] = seq("conv.r.un", 1, 1);
    t[0x79] = tok("unbox", 1, 1);
    t[0x7A] = op("throw", OperandType::None, FlowType::Throw, 1, 0);
    t[0x7B] = tok("ldfld", 1, 1);
    t[0x7C] = tok("ldflda", 1, 1);
    t[0x7D] = tok("stfld", 2, 0);
    t[0x7E] = tok("ldsfld", 0, 1);
    t[0x7F] = tok("ldsflda", 0, 1);
    t[0x80] = tok("stsfld", 1, 0);
    t[0x81] = tok("stobj", 2, 0);
    t[0x82] = seq("conv.ovf.i1.un", 1, 1);
    t[0x83] = seq("conv.ovf.i2.un", 1, 1);
    t[0x84] = seq("conv.ovf.i4.un", 1, 1);
    t[0x85] = seq("conv.ovf.i8.un", 1, 1);
    t[0x86] = seq("conv.ovf.u1.un", 1, 1);
    t[0x87] = seq("conv.ovf.u2.un", 1, 1);
    t[0x88] = seq("conv.ovf.u4.un", 1, 1);
    t[0x89] = seq("conv.ovf.u8.un", 1, 1);
    t[0x8A] = seq("conv.ovf.i.un", 1, 1);
    t[0x8B] = seq("conv.ovf.u.un", 1, 1);
    t[0x8C] = tok("box", 1, 1);
    t[0x8D] = tok("newarr", 1, 1);
    t[0x8E] = seq("ldlen", 1, 1);
    t[0x8F] = tok("ldelema", 2, 1);
    t[0x90] = seq("ldelem.i1", 2, 1);
    t[0x91] = seq("ldelem.u1", 2, 1);
    t[0x92] = seq("ldelem.i2", 2, 1);
    t[0x93] = seq("ldelem.u2", 2, 1);
    t[0x94] = seq("ldelem.i4", 2, 1);
    t[0x95] = seq("ldelem.u4", 2, 1);
    t[0x96] = seq("ldelem.i8", 2, 1);
    t[0x97] = seq("ldelem.i", 2, 1);
    t[0x98] = seq("ldelem.r4", 2, 1);
    t[0x99] = seq("ldelem.r8", 2, 1);
    t[0x9A] = seq("ldelem.ref", 2, 1);
    t[0x9B] = seq("stelem.i", 3, 0);
    t[0x9C] = seq("stelem.i1", 3, 0);
    t[0x9D] = seq("stelem.i2", 3, 0);
    t[0x9E] = seq("stelem.i4", 3, 0);
    t[0x9F] = seq("stelem.i8", 3, 0);
    t[0xA0] = seq("stelem.r4", 3, 0);
    t[0xA1] = seq("stelem.r8", 3, 0);
    t[0xA2] = seq("stelem.ref", 3, 0);
    t[0xA3] = tok("ldelem", 2, 1);
    t[0xA4] = tok("stelem", 3, 0);
    t[0xA5] = tok("unbox.any", 1, 1);
    t[0xB3] = seq("conv.ovf.i1", 1, 1);
    t[0xB4] = seq("conv.ovf.u1", 1, 1);
    t[0xB5] = seq("conv.ovf.i2", 1, 1);
    t[0xB6] = seq("conv.ovf.u2", 1, 1);
    t[0xB7] = seq("conv.ovf.i4", 1, 1);
    t[0xB8] = seq("conv.ovf.u4", 1, 1);
    t[0xB9] = seq("conv.ovf.i8", 1, 1);
    t[0xBA] = seq("conv.ovf.u8", 1, 1);
    t[0xC2] = tok("refanyval", 1, 1);
    t[0xC3] = seq("ckfinite", 1, 1);
    t[0xC6] = tok("mkrefany", 1, 1);
    t[0xD0] = tok("ldtoken", 0, 1);
    t[0xD1] = seq("conv.u2", 1, 1);
    t[0xD2] = seq("conv.u1", 1, 1);
    t[0xD3] = seq("conv.i", 1, 1);
    t[0xD4] = seq("conv.ovf.i", 1, 1);
    t[0xD5] = seq("conv.ovf.u", 1, 1);
    t[0xD6] = seq("add.ovf", 2, 1);
    t[0xD7] = seq("add.ovf.un", 2, 1);
    t[0xD8] = seq("mul.ovf", 2, 1);
    t[0xD9] = seq("mul.ovf.un", 2, 1);
    t[0xDA] = seq("sub.ovf", 2, 1);
    t[0xDB] = seq("sub.ovf.un", 2, 1);
    t[0xDC] = op("endfinally", OperandType::None, FlowType::EndFinally, 0, 0);
    t[0xDD] = op("leave", OperandType::Int32, FlowType::Leave, 0, 0);
    t[0xDE] = op("leave.s", OperandType::Int8, FlowType::Leave, 0, 0);
    t[0xDF] = seq("stind.i", 2, 0);
    t[0xE0] = seq("conv.u", 1, 1);

    t
}

const fn build_prefixed() -> [CilInstruction; 0x1F] {
    let mut t = [RESERVED; 0x1F];

    t[0x00] = seq("arglist", 0, 1);
    t[0x01] = seq("ceq", 2, 1);
    t[0x02] = seq("cgt", 2, 1);
    t[0x03] = seq("cgt.un", 2, 1);
    t[0x04] = seq("clt", 2, 1);
    t[0x05] = seq("clt.un", 2, 1);
    t[0x06] = tok("ldftn", 0, 1);
    t[0x07] = tok("ldvirtftn", 1, 1);
    t[0x09] = op("ldarg", OperandType::UInt16, FlowType::Sequential, 0, 1);
    t[0x0A] = op("ldarga", OperandType::UInt16, FlowType::Sequential, 0, 1);
    t[0x0B] = op("starg", OperandType::UInt16, FlowType::Sequential, 1, 0);
    t[0x0C] = op("ldloc", OperandType::UInt16, FlowType::Sequential, 0, 1);
    t[0x0D] = op("ldloca", OperandType::UInt16, FlowType::Sequential, 0, 1);
    t[0x0E] = op("stloc", OperandType::UInt16, FlowType::Sequential, 1, 0);
    t[0x0F] = seq("localloc", 1, 1);
    t[0x11] = op("endfilter", OperandType::None, FlowType::EndFinally, 1, 0);
    t[0x12] = op("unaligned.", OperandType::UInt8, FlowType::Sequential, 0, 0);
    t[0x13] = seq("volatile.", 0, 0);
    t[0x14] = seq("tail.", 0, 0);
    t[0x15] = tok("initobj", 1, 0);
    t[0x16] = tok("constrained.", 0, 0);
    t[0x17] = seq("cpblk", 3, 0);
    t[0x18] = seq("initblk", 3, 0);
    t[0x19] = op("no.", OperandType::UInt8, FlowType::Sequential, 0, 0);
    t[0x1A] = op("rethrow", OperandType::None, FlowType::Throw, 0, 0);
    t[0x1C] = tok("sizeof", 0, 1);
    t[0x1D] = seq("refanytype", 1, 1);
    t[0x1E] = seq("readonly.", 0, 0);

    t
}

/// Find an opcode by mnemonic, returning `(prefix, opcode, description)`
#[must_use]
pub fn lookup_mnemonic(mnemonic: &str) -> Option<(u8, u8, &'static CilInstruction)> {
    if mnemonic.is_empty() {
        return None;
    }

    #[allow(clippy::cast_possible_truncation)]
    if let Some(index) = INSTRUCTIONS.iter().position(|entry| entry.instr == mnemonic) {
        return Some((0, index as u8, &INSTRUCTIONS[index]));
    }

    #[allow(clippy::cast_possible_truncation)]
    INSTRUCTIONS_FE
        .iter()
        .position(|entry| entry.instr == mnemonic)
        .map(|index| (0xFE, index as u8, &INSTRUCTIONS_FE[index]))
}

/// Look up the description of an opcode
#[must_use]
pub fn lookup_opcode(prefix: u8, opcode: u8) -> Option<&'static CilInstruction> {
    let entry = match prefix {
        0 => INSTRUCTIONS.get(usize::from(opcode))?,
        0xFE => INSTRUCTIONS_FE.get(usize::from(opcode))?,
        _ => return None,
    };
    if entry.instr.is_empty() {
        None
    } else {
        Some(entry)
    }
}

/// The long form of a short branch opcode, or the opcode itself
#[must_use]
pub const fn long_branch_form(opcode: u8) -> u8 {
    match opcode {
        0x2B..=0x37 => opcode + 13,
        0xDE => 0xDD,
        _ => opcode,
    }
}

/// The short form of a long branch opcode, or the opcode itself
#[must_use]
pub const fn short_branch_form(opcode: u8) -> u8 {
    match opcode {
        0x38..=0x44 => opcode - 13,
        0xDD => 0xDE,
        _ => opcode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_lookups() {
        assert_eq!(INSTRUCTIONS[0x2A].instr, "ret");
        assert_eq!(INSTRUCTIONS[0x7D].instr, "stfld");
        assert_eq!(INSTRUCTIONS_FE[0x01].instr, "ceq");
        assert!(lookup_opcode(0, 0x24).is_none());
        assert!(lookup_opcode(0xFE, 0x08).is_none());
        assert!(lookup_opcode(0xFE, 0x40).is_none());

        let (prefix, opcode, entry) = lookup_mnemonic("brtrue.s").unwrap();
        assert_eq!((prefix, opcode), (0, 0x2D));
        assert_eq!(entry.flow, FlowType::ConditionalBranch);

        let (prefix, opcode, _) = lookup_mnemonic("initobj").unwrap();
        assert_eq!((prefix, opcode), (0xFE, 0x15));
        assert!(lookup_mnemonic("bogus").is_none());
        assert!(lookup_mnemonic("").is_none());
    }

    #[test]
    fn branch_forms_pair_up() {
        for short in 0x2B..=0x37u8 {
            let long = long_branch_form(short);
            assert_eq!(short_branch_form(long), short);
            assert_eq!(
                INSTRUCTIONS[usize::from(long)].instr,
                INSTRUCTIONS[usize::from(short)].instr.trim_end_matches(".s")
            );
        }
        assert_eq!(long_branch_form(0xDE), 0xDD);
        assert_eq!(short_branch_form(0x2A), 0x2A);
    }
}
