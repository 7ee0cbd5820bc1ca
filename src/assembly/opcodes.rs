//! Opcode bytes the weaver emits or inspects.
//!
//! Two-byte opcodes share the [`FE_PREFIX`] lead byte; their second byte carries an `FE_` prefix
//! here.
#![allow(missing_docs)]

pub const FE_PREFIX: u8 = 0xFE;

pub const NOP: u8 = 0x00;
pub const LDARG_0: u8 = 0x02;
pub const LDARG_1: u8 = 0x03;
pub const LDARG_S: u8 = 0x0E;
pub const LDLOC_0: u8 = 0x06;
pub const STLOC_0: u8 = 0x0A;
pub const LDNULL: u8 = 0x14;
pub const LDC_I4_0: u8 = 0x16;
pub const LDC_I4_1: u8 = 0x17;
pub const DUP: u8 = 0x25;
pub const POP: u8 = 0x26;
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;
pub const BR_S: u8 = 0x2B;
pub const BRFALSE_S: u8 = 0x2C;
pub const BRTRUE_S: u8 = 0x2D;
pub const BR: u8 = 0x38;
pub const BRFALSE: u8 = 0x39;
pub const BRTRUE: u8 = 0x3A;
pub const SWITCH: u8 = 0x45;
pub const CALLVIRT: u8 = 0x6F;
pub const NEWOBJ: u8 = 0x73;
pub const THROW: u8 = 0x7A;
pub const LDFLD: u8 = 0x7B;
pub const STFLD: u8 = 0x7D;
pub const LEAVE: u8 = 0xDD;
pub const LEAVE_S: u8 = 0xDE;

pub const FE_CEQ: u8 = 0x01;
pub const FE_RETHROW: u8 = 0x1A;
