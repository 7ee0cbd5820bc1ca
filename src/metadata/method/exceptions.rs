//! Exception handling clauses of CIL method bodies (ECMA-335 II.25.4.6).

use bitflags::bitflags;

use crate::metadata::token::Token;

bitflags! {
    /// Kind of an exception handling clause.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExceptionHandlerFlags: u16 {
        /// A typed exception clause
        const EXCEPTION = 0x0000;
        /// An exception filter and handler clause
        const FILTER = 0x0001;
        /// A finally clause
        const FINALLY = 0x0002;
        /// A fault clause, a finally that only runs on exception
        const FAULT = 0x0004;
    }
}

/// One exception handling clause, with byte offsets into the method's code.
///
/// ```text
/// try {
///     // try_offset .. try_offset + try_length
/// }
/// catch (ExceptionType) {
///     // handler_offset .. handler_offset + handler_length
/// }
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// Clause kind
    pub flags: ExceptionHandlerFlags,
    /// Start of the protected block
    pub try_offset: u32,
    /// Length of the protected block
    pub try_length: u32,
    /// Start of the handler
    pub handler_offset: u32,
    /// Length of the handler
    pub handler_length: u32,
    /// Filter start for `FILTER` clauses, the caught type's token for typed clauses
    pub filter_offset: u32,
}

impl ExceptionHandler {
    /// The caught exception type of a typed clause
    #[must_use]
    pub fn catch_type(&self) -> Option<Token> {
        if self.flags == ExceptionHandlerFlags::EXCEPTION && self.filter_offset != 0 {
            Some(Token::new(self.filter_offset))
        } else {
            None
        }
    }

    /// True if the clause fits the 12-byte small layout
    #[must_use]
    pub fn fits_small(&self) -> bool {
        self.try_offset <= u32::from(u16::MAX)
            && self.try_length <= u32::from(u8::MAX)
            && self.handler_offset <= u32::from(u16::MAX)
            && self.handler_length <= u32::from(u8::MAX)
    }
}
