//! Metadata tokens and cross-module type identity.
//!
//! A [`Token`] identifies a row inside one module: the upper byte selects the table, the lower
//! 24 bits the 1-based row. Tokens are only unique within their module, so every place that
//! compares types across modules uses a [`TypeKey`] (module name + token) instead.
//!
//! # Example
//!
//! ```rust
//! use dotweave::metadata::token::{table, Token, TypeKey};
//!
//! let token = Token::from_parts(table::TYPEDEF, 5);
//! assert_eq!(token.value(), 0x0200_0005);
//!
//! let a = TypeKey::new("Game.Core", token);
//! let b = TypeKey::new("Game.Core", Token::new(0x0200_0005));
//! assert_eq!(a, b);
//! assert_ne!(a, TypeKey::new("Assembly-CSharp", token));
//! ```

use std::{fmt, sync::Arc};

/// Table identifiers used in the upper byte of a [`Token`].
pub mod table {
    /// `TypeDef` rows: type definitions of a module
    pub const TYPEDEF: u8 = 0x02;
    /// `Field` rows
    pub const FIELD: u8 = 0x04;
    /// `MethodDef` rows
    pub const METHODDEF: u8 = 0x06;
    /// `MemberRef` rows: references to fields and methods through a parent signature
    pub const MEMBERREF: u8 = 0x0A;
    /// `StandAloneSig` rows: local variable signatures
    pub const STANDALONESIG: u8 = 0x11;
    /// `Property` rows
    pub const PROPERTY: u8 = 0x17;
    /// `TypeSpec` rows: type signatures referenced from method bodies
    pub const TYPESPEC: u8 = 0x1B;
    /// `MethodSpec` rows: generic method instantiations
    pub const METHODSPEC: u8 = 0x2B;
    /// User string heap offsets (`ldstr`)
    pub const USERSTRING: u8 = 0x70;
}

/// A metadata token: table byte plus 24-bit row.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Token(pub u32);

impl Token {
    /// Create a token from its raw value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Create a token from a table identifier and a 1-based row
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Raw value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Table identifier
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// 1-based row, 0 for a null token
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// True for the null token
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    /// True if this token belongs to `table`
    #[must_use]
    pub fn is_table(&self, table: u8) -> bool {
        self.table() == table && self.row() != 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

/// Identity of a type definition across every loaded module.
///
/// Two definitions loaded through different resolution paths are distinct objects, so they are
/// never compared by address; the key compares the owning module's name and the `TypeDef` token.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TypeKey {
    /// Name of the module that defines the type
    pub module: Arc<str>,
    /// `TypeDef` token inside that module
    pub token: Token,
}

impl TypeKey {
    /// Create a new key
    pub fn new(module: impl Into<Arc<str>>, token: Token) -> Self {
        TypeKey {
            module: module.into(),
            token,
        }
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({}, {})", self.module, self.token)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]{}", self.module, self.token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};

    #[test]
    fn test_token_parts() {
        let token = Token::from_parts(table::METHODDEF, 1);
        assert_eq!(token.value(), 0x0600_0001);
        assert_eq!(token.table(), 0x06);
        assert_eq!(token.row(), 1);
        assert!(token.is_table(table::METHODDEF));
        assert!(!token.is_table(table::FIELD));

        let token = Token::from_parts(table::TYPEDEF, 0x0100_0001);
        assert_eq!(token.row(), 1);
    }

    #[test]
    fn test_token_is_null() {
        assert!(Token(0).is_null());
        assert!(!Token(0).is_table(0));
        assert!(!Token(0x0600_0001).is_null());
    }

    #[test]
    fn test_token_display() {
        assert_eq!(format!("{}", Token(0x0600_0001)), "0x06000001");
        let debug = format!("{:?}", Token(0x0600_0001));
        assert!(debug.contains("table: 0x06"));
        assert!(debug.contains("row: 1"));
    }

    #[test]
    fn test_token_ordering() {
        assert!(Token(0x0600_0001) < Token(0x0600_0002));
        assert!(Token(0x0600_0002) < Token(0x0700_0001));
    }

    #[test]
    fn test_type_key_value_identity() {
        let module: Arc<str> = Arc::from("Game");
        let a = TypeKey::new(module.clone(), Token(0x0200_0002));
        let b = TypeKey::new(String::from("Game"), Token(0x0200_0002));
        let c = TypeKey::new("Other", Token(0x0200_0002));
        let d = TypeKey::new(module, Token(0x0200_0003));

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);

        let set: HashSet<TypeKey> = [a.clone(), b, c.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);

        let mut map = HashMap::new();
        map.insert(a.clone(), "first");
        assert_eq!(map.get(&TypeKey::new("Game", Token(0x0200_0002))), Some(&"first"));
        assert_eq!(format!("{}", a), "[Game]0x02000002");
    }
}
