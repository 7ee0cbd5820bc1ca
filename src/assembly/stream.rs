//! Editable instruction streams.
//!
//! An [`InstructionStream`] is a decoded method body in which everything that points into the
//! code (branch operands, exception regions, sequence points) is expressed as an instruction
//! index. Editing is done through [`InstructionStream::insert`], a pure function that returns a
//! new stream with all of those indices remapped; byte offsets are only recomputed when the
//! stream is turned back into a [`MethodBody`].

use std::collections::HashMap;

use crate::{
    assembly::{decoder::decode_stream, encoder::encode_stream, instruction::Instruction},
    metadata::{
        method::{ExceptionHandler, ExceptionHandlerFlags, MethodBody},
        sequencepoints::SequencePoint,
    },
    Result,
};

/// How existing references to the insertion index treat the inserted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchPolicy {
    /// Branches, region starts and sequence points at the insertion index keep pointing at the
    /// original instruction; the inserted code is only reached by falling into it.
    KeepTargets,
    /// Branches, region starts and sequence points at the insertion index are redirected to
    /// the first inserted instruction.
    Redirect,
}

/// An exception handling clause addressed by instruction index. Ends are exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionRegion {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// First protected instruction
    pub try_start: usize,
    /// One past the last protected instruction
    pub try_end: usize,
    /// First handler instruction
    pub handler_start: usize,
    /// One past the last handler instruction
    pub handler_end: usize,
    /// First filter instruction of `FILTER` clauses
    pub filter_start: Option<usize>,
    /// Raw caught-type token of typed clauses
    pub catch_type: u32,
}

/// A sequence point anchored at an instruction index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchoredPoint {
    /// Instruction the point starts at
    pub index: usize,
    /// Source range; `il_offset` is recomputed on encoding
    pub point: SequencePoint,
}

/// A decoded, index-addressed method body.
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionStream {
    /// Instructions in code order
    pub instructions: Vec<Instruction>,
    /// Exception handling clauses
    pub regions: Vec<ExceptionRegion>,
    /// Debug sequence points
    pub sequence_points: Vec<AnchoredPoint>,
}

impl InstructionStream {
    /// A stream without exception regions or sequence points
    #[must_use]
    pub fn new(instructions: Vec<Instruction>) -> Self {
        InstructionStream {
            instructions,
            regions: Vec::new(),
            sequence_points: Vec::new(),
        }
    }

    /// Decode a method body together with its sequence points.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the code cannot be decoded or a region or sequence
    /// point does not start on an instruction boundary.
    pub fn from_body(body: &MethodBody, sequence_points: &[SequencePoint]) -> Result<Self> {
        let instructions = decode_stream(&body.code)?;

        let mut index_of: HashMap<u32, usize> = instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| (instruction.offset, index))
            .collect();
        let code_len = u32::try_from(body.code.len())
            .map_err(|_| malformed_error!("Method code too large - {}", body.code.len()))?;
        index_of.insert(code_len, instructions.len());

        let lookup = |offset: u32, what: &str| -> Result<usize> {
            index_of.get(&offset).copied().ok_or_else(|| {
                malformed_error!("{} at IL_{:04x} is not on an instruction boundary", what, offset)
            })
        };

        let mut regions = Vec::with_capacity(body.exception_handlers.len());
        for handler in &body.exception_handlers {
            let filter = handler.flags.contains(ExceptionHandlerFlags::FILTER);
            regions.push(ExceptionRegion {
                flags: handler.flags,
                try_start: lookup(handler.try_offset, "Try block start")?,
                try_end: lookup(handler.try_offset.saturating_add(handler.try_length), "Try block end")?,
                handler_start: lookup(handler.handler_offset, "Handler start")?,
                handler_end: lookup(
                    handler.handler_offset.saturating_add(handler.handler_length),
                    "Handler end",
                )?,
                filter_start: if filter {
                    Some(lookup(handler.filter_offset, "Filter start")?)
                } else {
                    None
                },
                catch_type: if filter { 0 } else { handler.filter_offset },
            });
        }

        let mut anchored = Vec::with_capacity(sequence_points.len());
        for point in sequence_points {
            anchored.push(AnchoredPoint {
                index: lookup(point.il_offset, "Sequence point")?,
                point: point.clone(),
            });
        }

        Ok(InstructionStream {
            instructions,
            regions,
            sequence_points: anchored,
        })
    }

    /// Encode the stream into a body, taking locals and init flag from `template`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if the instructions cannot be encoded.
    pub fn to_body(
        &self,
        template: &MethodBody,
        max_stack: u16,
    ) -> Result<(MethodBody, Vec<SequencePoint>)> {
        let encoded = encode_stream(&self.instructions)?;
        let offset = |index: usize| -> Result<u32> {
            encoded
                .offset_of(index)
                .ok_or_else(|| malformed_error!("Index {} past the end of the stream", index))
        };

        let mut exception_handlers = Vec::with_capacity(self.regions.len());
        for region in &self.regions {
            let try_offset = offset(region.try_start)?;
            let handler_offset = offset(region.handler_start)?;
            exception_handlers.push(ExceptionHandler {
                flags: region.flags,
                try_offset,
                try_length: offset(region.try_end)?.saturating_sub(try_offset),
                handler_offset,
                handler_length: offset(region.handler_end)?.saturating_sub(handler_offset),
                filter_offset: match region.filter_start {
                    Some(index) => offset(index)?,
                    None => region.catch_type,
                },
            });
        }

        let mut sequence_points = Vec::with_capacity(self.sequence_points.len());
        for anchored in &self.sequence_points {
            let mut point = anchored.point.clone();
            point.il_offset = offset(anchored.index)?;
            sequence_points.push(point);
        }

        Ok((
            MethodBody {
                max_stack,
                init_locals: template.init_locals,
                local_var_sig_token: template.local_var_sig_token,
                code: encoded.code,
                exception_handlers,
            },
            sequence_points,
        ))
    }

    /// Number of instructions
    #[must_use]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    /// True if the stream has no instructions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Indices of every `ret`, in code order
    #[must_use]
    pub fn returns(&self) -> Vec<usize> {
        self.instructions
            .iter()
            .enumerate()
            .filter(|(_, instruction)| instruction.is_return())
            .map(|(index, _)| index)
            .collect()
    }

    /// Insert `code` before the instruction at `at` and remap every index.
    ///
    /// Branch targets inside `code` refer to instructions of this stream and keep pointing at
    /// them after the insertion. References to `at` itself follow `policy`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if `at` is past the end of the stream.
    pub fn insert(
        &self,
        at: usize,
        code: Vec<Instruction>,
        policy: BranchPolicy,
    ) -> Result<InstructionStream> {
        if at > self.instructions.len() {
            return Err(malformed_error!(
                "Insertion point {} past the end of {} instructions",
                at,
                self.instructions.len()
            ));
        }

        let shift = code.len();
        let start = |index: usize| -> usize {
            match index.cmp(&at) {
                std::cmp::Ordering::Less => index,
                std::cmp::Ordering::Equal if policy == BranchPolicy::Redirect => index,
                _ => index + shift,
            }
        };
        let end = |index: usize| -> usize {
            if index > at {
                index + shift
            } else {
                index
            }
        };
        let original = |index: usize| -> usize {
            if index >= at {
                index + shift
            } else {
                index
            }
        };

        let mut instructions = Vec::with_capacity(self.instructions.len() + shift);
        instructions.extend(self.instructions[..at].iter().cloned());
        instructions.extend(code.into_iter().map(|mut instruction| {
            instruction.offset = 0;
            instruction.remap_targets(original);
            instruction
        }));
        instructions.extend(self.instructions[at..].iter().cloned());
        for (index, instruction) in instructions.iter_mut().enumerate() {
            if index < at || index >= at + shift {
                instruction.remap_targets(start);
            }
        }

        let regions = self
            .regions
            .iter()
            .map(|region| ExceptionRegion {
                flags: region.flags,
                try_start: start(region.try_start),
                try_end: end(region.try_end),
                handler_start: start(region.handler_start),
                handler_end: end(region.handler_end),
                filter_start: region.filter_start.map(start),
                catch_type: region.catch_type,
            })
            .collect();

        let sequence_points = self
            .sequence_points
            .iter()
            .map(|anchored| AnchoredPoint {
                index: start(anchored.index),
                point: anchored.point.clone(),
            })
            .collect();

        Ok(InstructionStream {
            instructions,
            regions,
            sequence_points,
        })
    }

    /// Apply several insertions, each given in indices of this stream, from the highest index to
    /// the lowest so earlier insertion points stay valid.
    ///
    /// # Errors
    /// Returns [`crate::Error::Malformed`] if an insertion point is past the end of the stream.
    pub fn insert_all(
        &self,
        mut insertions: Vec<(usize, Vec<Instruction>)>,
        policy: BranchPolicy,
    ) -> Result<InstructionStream> {
        insertions.sort_by(|a, b| b.0.cmp(&a.0));
        let mut stream = self.clone();
        for (at, code) in insertions {
            stream = stream.insert(at, code, policy)?;
        }
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembly::Operand;

    fn ins(mnemonic: &str) -> Instruction {
        Instruction::simple(mnemonic).unwrap()
    }

    fn point(il_offset: u32, line: u32) -> SequencePoint {
        SequencePoint {
            il_offset,
            start_line: line,
            start_col: 1,
            end_line: line,
            end_col: 10,
            is_hidden: false,
        }
    }

    #[test]
    fn insert_keep_targets() {
        // 0: ldarg.0  1: brtrue 3  2: nop  3: ret
        let stream = InstructionStream::new(vec![
            ins("ldarg.0"),
            Instruction::branch("brtrue.s", 3).unwrap(),
            ins("nop"),
            ins("ret"),
        ]);

        let edited = stream
            .insert(3, vec![ins("ldnull"), ins("pop")], BranchPolicy::KeepTargets)
            .unwrap();
        assert_eq!(edited.len(), 6);
        assert_eq!(edited.instructions[1].operand, Operand::Target(5));
        assert_eq!(edited.instructions[3].mnemonic, "ldnull");
    }

    #[test]
    fn insert_redirect() {
        let stream = InstructionStream::new(vec![
            Instruction::branch("br.s", 2).unwrap(),
            ins("nop"),
            ins("ret"),
        ]);

        let edited = stream
            .insert(2, vec![ins("ldnull"), ins("pop")], BranchPolicy::Redirect)
            .unwrap();
        assert_eq!(edited.instructions[0].operand, Operand::Target(2));
        assert_eq!(edited.instructions[2].mnemonic, "ldnull");
        assert!(edited.instructions[4].is_return());
    }

    #[test]
    fn inserted_branches_point_at_original_instructions() {
        let stream = InstructionStream::new(vec![ins("ldnull"), ins("ret")]);
        let edited = stream
            .insert(
                0,
                vec![ins("ldnull"), Instruction::branch("brtrue.s", 1).unwrap()],
                BranchPolicy::KeepTargets,
            )
            .unwrap();
        assert_eq!(edited.instructions[1].operand, Operand::Target(3));
    }

    #[test]
    fn body_round_trip_remaps_regions_and_points() {
        // IL_0000: nop          (try start)
        // IL_0001: leave.s IL_0005
        // IL_0003: nop          (handler start)
        // IL_0004: endfinally
        // IL_0005: ret
        let mut body = MethodBody::new(vec![0x00, 0xDE, 0x02, 0x00, 0xDC, 0x2A], 1);
        body.exception_handlers.push(ExceptionHandler {
            flags: ExceptionHandlerFlags::FINALLY,
            try_offset: 0,
            try_length: 3,
            handler_offset: 3,
            handler_length: 2,
            filter_offset: 0,
        });
        let points = vec![point(0, 10), point(5, 12)];

        let stream = InstructionStream::from_body(&body, &points).unwrap();
        assert_eq!(stream.regions[0].try_end, 2);
        assert_eq!(stream.regions[0].handler_end, 4);
        assert_eq!(stream.sequence_points[1].index, 4);

        let edited = stream
            .insert(0, vec![ins("ldnull"), ins("pop")], BranchPolicy::KeepTargets)
            .unwrap();
        let (encoded, encoded_points) = edited.to_body(&body, 1).unwrap();

        assert_eq!(encoded.code[..2], [0x14, 0x26]);
        assert_eq!(encoded.exception_handlers[0].try_offset, 2);
        assert_eq!(encoded.exception_handlers[0].try_length, 3);
        assert_eq!(encoded.exception_handlers[0].handler_offset, 5);
        assert_eq!(encoded_points[0].il_offset, 2);
        assert_eq!(encoded_points[1].il_offset, 7);
    }

    #[test]
    fn insert_all_applies_from_the_end() {
        let stream = InstructionStream::new(vec![
            ins("ldarg.0"),
            Instruction::branch("brfalse.s", 3).unwrap(),
            ins("ret"),
            ins("ret"),
        ]);
        let returns = stream.returns();
        assert_eq!(returns, vec![2, 3]);

        let edited = stream
            .insert_all(
                returns.into_iter().map(|at| (at, vec![ins("nop")])).collect(),
                BranchPolicy::Redirect,
            )
            .unwrap();
        let mnemonics: Vec<_> = edited.instructions.iter().map(|i| i.mnemonic).collect();
        assert_eq!(mnemonics, vec!["ldarg.0", "brfalse.s", "nop", "ret", "nop", "ret"]);
        assert_eq!(edited.instructions[1].operand, Operand::Target(4));
    }

    #[test]
    fn reject_insertion_past_end() {
        let stream = InstructionStream::new(vec![ins("ret")]);
        assert!(stream.insert(2, vec![ins("nop")], BranchPolicy::KeepTargets).is_err());
    }
}
