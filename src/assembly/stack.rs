//! Evaluation stack analysis.
//!
//! Walks every reachable path through an [`InstructionStream`] and records the stack depth on
//! entry to each instruction. All paths reaching an instruction must agree on its depth, no
//! instruction may pop more than is on the stack, and every `ret` must leave exactly the return
//! value behind. The deepest point seen is the body's `max_stack`.

use crate::{
    assembly::{
        instruction::{FlowType, Instruction},
        opcodes::{CALL, CALLVIRT, NEWOBJ},
        stream::InstructionStream,
    },
    metadata::{method::ExceptionHandlerFlags, token::Token, typesystem::MethodSig},
    Error::StackImbalance,
    Result,
};

/// Resolves the signature behind a call site token (`MethodDef` or `MemberRef`).
pub trait CallResolver {
    /// The signature of the called method, `None` if the token is unknown
    fn call_signature(&self, token: Token) -> Option<MethodSig>;
}

impl<F> CallResolver for F
where
    F: Fn(Token) -> Option<MethodSig>,
{
    fn call_signature(&self, token: Token) -> Option<MethodSig> {
        self(token)
    }
}

/// Compute the maximum stack depth of `stream`.
///
/// `returns_value` is true for methods with a non-void return type.
///
/// # Errors
/// Returns [`crate::Error::StackImbalance`] (with the instruction index as offset) for
/// underflows, depth conflicts and unbalanced returns, and [`crate::Error::Malformed`] for
/// unresolvable call targets or code that runs off the end of the body.
pub fn compute_max_stack(
    stream: &InstructionStream,
    returns_value: bool,
    resolver: &dyn CallResolver,
) -> Result<u16> {
    let count = stream.instructions.len();
    let mut depths: Vec<Option<usize>> = vec![None; count];
    let mut pending = Vec::new();

    let enter = |index: usize,
                 depth: usize,
                 depths: &mut Vec<Option<usize>>,
                 pending: &mut Vec<usize>|
     -> Result<()> {
        if index >= count {
            return Err(malformed_error!("Control flow runs past the end of the body"));
        }
        match depths[index] {
            Some(existing) if existing != depth => Err(StackImbalance {
                offset: index,
                expected: existing,
                found: depth,
            }),
            Some(_) => Ok(()),
            None => {
                depths[index] = Some(depth);
                pending.push(index);
                Ok(())
            }
        }
    };

    if count == 0 {
        return Ok(0);
    }
    enter(0, 0, &mut depths, &mut pending)?;
    for region in &stream.regions {
        let handler_depth = if region.flags.contains(ExceptionHandlerFlags::FINALLY)
            || region.flags.contains(ExceptionHandlerFlags::FAULT)
        {
            0
        } else {
            1
        };
        enter(region.handler_start, handler_depth, &mut depths, &mut pending)?;
        if let Some(filter) = region.filter_start {
            enter(filter, 1, &mut depths, &mut pending)?;
        }
    }

    let mut max_depth = 0usize;
    while let Some(index) = pending.pop() {
        let instruction = &stream.instructions[index];
        let depth = depths[index].unwrap_or(0);
        let (pops, pushes) = stack_effect(instruction, returns_value, resolver)?;

        if depth < pops {
            return Err(StackImbalance {
                offset: index,
                expected: pops,
                found: depth,
            });
        }
        let after = depth - pops + pushes;
        max_depth = max_depth.max(depth).max(after);

        match instruction.flow_type {
            FlowType::Return => {
                if after != 0 {
                    return Err(StackImbalance {
                        offset: index,
                        expected: usize::from(returns_value),
                        found: depth,
                    });
                }
            }
            FlowType::Throw | FlowType::EndFinally => {}
            FlowType::Leave => {
                for target in instruction.branch_targets() {
                    enter(target, 0, &mut depths, &mut pending)?;
                }
            }
            FlowType::UnconditionalBranch => {
                for target in instruction.branch_targets() {
                    enter(target, after, &mut depths, &mut pending)?;
                }
            }
            FlowType::ConditionalBranch | FlowType::Switch => {
                for target in instruction.branch_targets() {
                    enter(target, after, &mut depths, &mut pending)?;
                }
                enter(index + 1, after, &mut depths, &mut pending)?;
            }
            FlowType::Sequential | FlowType::Call => {
                enter(index + 1, after, &mut depths, &mut pending)?;
            }
        }
    }

    u16::try_from(max_depth).map_err(|_| malformed_error!("Stack depth too large - {}", max_depth))
}

fn stack_effect(
    instruction: &Instruction,
    returns_value: bool,
    resolver: &dyn CallResolver,
) -> Result<(usize, usize)> {
    let behavior = instruction.stack_behavior;
    if !behavior.is_variable() {
        return Ok((usize::from(behavior.pops), usize::from(behavior.pushes)));
    }

    if instruction.is_return() {
        return Ok((usize::from(returns_value), 0));
    }

    let signature = |token: Option<Token>| -> Result<MethodSig> {
        let token = token.ok_or_else(|| malformed_error!("{} without token", instruction.mnemonic))?;
        resolver
            .call_signature(token)
            .ok_or_else(|| malformed_error!("Unresolved call target {}", token))
    };

    match (instruction.prefix, instruction.opcode) {
        (0, CALL | CALLVIRT) => {
            let sig = signature(instruction.token())?;
            Ok((sig.stack_pops(), sig.stack_pushes()))
        }
        (0, NEWOBJ) => {
            let sig = signature(instruction.token())?;
            Ok((sig.params.len(), 1))
        }
        _ => Err(malformed_error!(
            "Unsupported variable stack effect on {}",
            instruction.mnemonic
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::stream::ExceptionRegion,
        metadata::typesystem::{PrimitiveKind, TypeSig},
        Error,
    };

    fn ins(mnemonic: &str) -> Instruction {
        Instruction::simple(mnemonic).unwrap()
    }

    fn no_calls(_: Token) -> Option<MethodSig> {
        None
    }

    #[test]
    fn straight_line() {
        let stream = InstructionStream::new(vec![ins("ldarg.0"), ins("ldnull"), ins("pop"), ins("ret")]);
        assert_eq!(compute_max_stack(&stream, true, &no_calls).unwrap(), 2);
    }

    #[test]
    fn getter_prologue_balances() {
        let field = Token::new(0x0400_0001);
        let stream = InstructionStream::new(vec![
            ins("ldarg.0"),
            Instruction::with_token("ldfld", field).unwrap(),
            ins("dup"),
            Instruction::branch("brtrue", 7).unwrap(),
            ins("pop"),
            ins("ldarg.0"),
            Instruction::with_token("ldfld", field).unwrap(),
            ins("ret"),
        ]);
        assert_eq!(compute_max_stack(&stream, true, &no_calls).unwrap(), 2);
    }

    #[test]
    fn calls_use_signatures() {
        let ctor = Token::new(0x0A00_0001);
        let resolver = |token: Token| {
            (token == ctor).then(|| MethodSig::instance(TypeSig::void(), Vec::new()))
        };
        let stream = InstructionStream::new(vec![
            ins("ldarg.0"),
            Instruction::with_token("call", ctor).unwrap(),
            ins("ret"),
        ]);
        assert_eq!(compute_max_stack(&stream, false, &resolver).unwrap(), 1);

        let unknown = InstructionStream::new(vec![
            ins("ldarg.0"),
            Instruction::with_token("call", Token::new(0x0A00_0002)).unwrap(),
            ins("ret"),
        ]);
        assert!(compute_max_stack(&unknown, false, &resolver).is_err());

        let create = |token: Token| {
            (token == ctor).then(|| {
                MethodSig::instance(TypeSig::void(), vec![TypeSig::Primitive(PrimitiveKind::I4)])
            })
        };
        let stream = InstructionStream::new(vec![
            ins("ldc.i4.1"),
            Instruction::with_token("newobj", ctor).unwrap(),
            ins("ret"),
        ]);
        assert_eq!(compute_max_stack(&stream, true, &create).unwrap(), 1);
    }

    #[test]
    fn detect_imbalance() {
        let underflow = InstructionStream::new(vec![ins("pop"), ins("ret")]);
        assert!(matches!(
            compute_max_stack(&underflow, false, &no_calls),
            Err(Error::StackImbalance { offset: 0, .. })
        ));

        let leftover = InstructionStream::new(vec![ins("ldnull"), ins("ret")]);
        assert!(matches!(
            compute_max_stack(&leftover, false, &no_calls),
            Err(Error::StackImbalance { offset: 1, .. })
        ));

        // both paths reach the ret, one with an extra value
        let conflict = InstructionStream::new(vec![
            ins("ldarg.0"),
            ins("ldnull"),
            Instruction::branch("brtrue.s", 4).unwrap(),
            ins("ldnull"),
            ins("ret"),
        ]);
        assert!(matches!(
            compute_max_stack(&conflict, true, &no_calls),
            Err(Error::StackImbalance { offset: 4, .. })
        ));
    }

    #[test]
    fn handlers_start_with_exception_object() {
        let mut stream = InstructionStream::new(vec![
            ins("nop"),
            Instruction::branch("leave.s", 4).unwrap(),
            ins("pop"),
            Instruction::branch("leave.s", 4).unwrap(),
            ins("ret"),
        ]);
        stream.regions.push(ExceptionRegion {
            flags: ExceptionHandlerFlags::EXCEPTION,
            try_start: 0,
            try_end: 2,
            handler_start: 2,
            handler_end: 4,
            filter_start: None,
            catch_type: 0x0100_0001,
        });
        assert_eq!(compute_max_stack(&stream, false, &no_calls).unwrap(), 1);
    }

    #[test]
    fn falling_off_the_end() {
        let stream = InstructionStream::new(vec![ins("nop")]);
        assert!(compute_max_stack(&stream, false, &no_calls).is_err());
    }
}
