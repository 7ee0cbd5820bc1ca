use std::fmt;

use strum::{EnumIter, IntoEnumIterator};

/// Element type constants of ECMA-335 II.23.1.16, as used by signatures in the image format
#[allow(non_snake_case)]
pub mod ELEMENT_TYPE {
    /// Marks the end of a list
    pub const END: u8 = 0x00;
    /// `System.Void`
    pub const VOID: u8 = 0x01;
    /// `System.Boolean`
    pub const BOOLEAN: u8 = 0x02;
    /// `System.Char`
    pub const CHAR: u8 = 0x03;
    /// `System.SByte`
    pub const I1: u8 = 0x04;
    /// `System.Byte`
    pub const U1: u8 = 0x05;
    /// `System.Int16`
    pub const I2: u8 = 0x06;
    /// `System.UInt16`
    pub const U2: u8 = 0x07;
    /// `System.Int32`
    pub const I4: u8 = 0x08;
    /// `System.UInt32`
    pub const U4: u8 = 0x09;
    /// `System.Int64`
    pub const I8: u8 = 0x0a;
    /// `System.UInt64`
    pub const U8: u8 = 0x0b;
    /// `System.Single`
    pub const R4: u8 = 0x0c;
    /// `System.Double`
    pub const R8: u8 = 0x0d;
    /// `System.String`
    pub const STRING: u8 = 0x0e;
    /// Followed by a type: managed reference
    pub const BYREF: u8 = 0x10;
    /// Followed by a type name: value type
    pub const VALUETYPE: u8 = 0x11;
    /// Followed by a type name: reference type
    pub const CLASS: u8 = 0x12;
    /// Followed by a number: generic parameter of the enclosing type
    pub const VAR: u8 = 0x13;
    /// Followed by a type, an argument count and the arguments
    pub const GENERICINST: u8 = 0x15;
    /// `System.TypedReference`
    pub const TYPEDBYREF: u8 = 0x16;
    /// `System.IntPtr`
    pub const I: u8 = 0x18;
    /// `System.UIntPtr`
    pub const U: u8 = 0x19;
    /// `System.Object`
    pub const OBJECT: u8 = 0x1c;
    /// Followed by a type: single-dimensional, zero-based array
    pub const SZARRAY: u8 = 0x1d;
    /// Followed by a number: generic parameter of the enclosing method
    pub const MVAR: u8 = 0x1e;
}

/// Built-in types that signatures encode with a single element type byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter)]
pub enum PrimitiveKind {
    /// `void`
    Void,
    /// `bool`
    Boolean,
    /// `char`
    Char,
    /// `sbyte`
    I1,
    /// `byte`
    U1,
    /// `short`
    I2,
    /// `ushort`
    U2,
    /// `int`
    I4,
    /// `uint`
    U4,
    /// `long`
    I8,
    /// `ulong`
    U8,
    /// `float`
    R4,
    /// `double`
    R8,
    /// `nint`
    I,
    /// `nuint`
    U,
    /// `string`
    String,
    /// `object`
    Object,
    /// `System.TypedReference`
    TypedByRef,
}

impl PrimitiveKind {
    /// The element type byte of this primitive
    #[must_use]
    pub fn element_type(self) -> u8 {
        match self {
            PrimitiveKind::Void => ELEMENT_TYPE::VOID,
            PrimitiveKind::Boolean => ELEMENT_TYPE::BOOLEAN,
            PrimitiveKind::Char => ELEMENT_TYPE::CHAR,
            PrimitiveKind::I1 => ELEMENT_TYPE::I1,
            PrimitiveKind::U1 => ELEMENT_TYPE::U1,
            PrimitiveKind::I2 => ELEMENT_TYPE::I2,
            PrimitiveKind::U2 => ELEMENT_TYPE::U2,
            PrimitiveKind::I4 => ELEMENT_TYPE::I4,
            PrimitiveKind::U4 => ELEMENT_TYPE::U4,
            PrimitiveKind::I8 => ELEMENT_TYPE::I8,
            PrimitiveKind::U8 => ELEMENT_TYPE::U8,
            PrimitiveKind::R4 => ELEMENT_TYPE::R4,
            PrimitiveKind::R8 => ELEMENT_TYPE::R8,
            PrimitiveKind::I => ELEMENT_TYPE::I,
            PrimitiveKind::U => ELEMENT_TYPE::U,
            PrimitiveKind::String => ELEMENT_TYPE::STRING,
            PrimitiveKind::Object => ELEMENT_TYPE::OBJECT,
            PrimitiveKind::TypedByRef => ELEMENT_TYPE::TYPEDBYREF,
        }
    }

    /// Map an element type byte back to a primitive
    #[must_use]
    pub fn from_element_type(element_type: u8) -> Option<Self> {
        PrimitiveKind::iter().find(|kind| kind.element_type() == element_type)
    }

    /// The runtime full name, e.g. `System.Int32`
    #[must_use]
    pub fn fullname(self) -> &'static str {
        match self {
            PrimitiveKind::Void => "System.Void",
            PrimitiveKind::Boolean => "System.Boolean",
            PrimitiveKind::Char => "System.Char",
            PrimitiveKind::I1 => "System.SByte",
            PrimitiveKind::U1 => "System.Byte",
            PrimitiveKind::I2 => "System.Int16",
            PrimitiveKind::U2 => "System.UInt16",
            PrimitiveKind::I4 => "System.Int32",
            PrimitiveKind::U4 => "System.UInt32",
            PrimitiveKind::I8 => "System.Int64",
            PrimitiveKind::U8 => "System.UInt64",
            PrimitiveKind::R4 => "System.Single",
            PrimitiveKind::R8 => "System.Double",
            PrimitiveKind::I => "System.IntPtr",
            PrimitiveKind::U => "System.UIntPtr",
            PrimitiveKind::String => "System.String",
            PrimitiveKind::Object => "System.Object",
            PrimitiveKind::TypedByRef => "System.TypedReference",
        }
    }

    /// True for primitives that are value types
    #[must_use]
    pub fn is_value_type(self) -> bool {
        !matches!(
            self,
            PrimitiveKind::Void | PrimitiveKind::String | PrimitiveKind::Object
        )
    }
}

/// A fully qualified reference to a type definition.
///
/// `scope` is the name of the module that defines the type. Nested types carry the names of
/// their enclosing types in `name`, separated by `/` (`Outer/Inner`), and the namespace of
/// the outermost type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeName {
    /// Defining module
    pub scope: String,
    /// Namespace, empty for the global namespace
    pub namespace: String,
    /// Simple or `/`-joined nested name
    pub name: String,
}

impl TypeName {
    /// Create a new type name
    pub fn new(
        scope: impl Into<String>,
        namespace: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        TypeName {
            scope: scope.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Parse a full name (`Namespace.Outer/Inner`) into a name scoped to `scope`
    pub fn parse(scope: impl Into<String>, fullname: &str) -> Self {
        let outermost_end = fullname.find('/').unwrap_or(fullname.len());
        match fullname[..outermost_end].rfind('.') {
            Some(dot) => TypeName::new(scope, &fullname[..dot], &fullname[dot + 1..]),
            None => TypeName::new(scope, "", fullname),
        }
    }

    /// `Namespace.Name`, or `Name` in the global namespace
    #[must_use]
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// The innermost simple name
    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// The name of a type nested directly inside this one
    #[must_use]
    pub fn nested(&self, name: &str) -> TypeName {
        TypeName::new(
            self.scope.clone(),
            self.namespace.clone(),
            format!("{}/{}", self.name, name),
        )
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.fullname())
    }
}

/// A type as it appears in a signature.
///
/// Type definitions are referenced by name; identity across modules is established by
/// resolving the name to a [`crate::metadata::token::TypeKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeSig {
    /// A built-in type
    Primitive(PrimitiveKind),
    /// A reference type definition
    Class(TypeName),
    /// A value type definition
    ValueType(TypeName),
    /// A generic type instantiated with arguments
    GenericInst(Box<TypeSig>, Vec<TypeSig>),
    /// Generic parameter of the enclosing type
    Var(u32),
    /// Generic parameter of the enclosing method
    MVar(u32),
    /// Single-dimensional zero-based array
    SzArray(Box<TypeSig>),
    /// Managed reference
    ByRef(Box<TypeSig>),
}

impl TypeSig {
    /// Shorthand for `System.Object`
    #[must_use]
    pub fn object() -> Self {
        TypeSig::Primitive(PrimitiveKind::Object)
    }

    /// Shorthand for `System.Void`
    #[must_use]
    pub fn void() -> Self {
        TypeSig::Primitive(PrimitiveKind::Void)
    }

    /// True if any generic parameter remains unbound anywhere inside this signature
    #[must_use]
    pub fn is_open(&self) -> bool {
        match self {
            TypeSig::Var(_) | TypeSig::MVar(_) => true,
            TypeSig::GenericInst(base, args) => base.is_open() || args.iter().any(TypeSig::is_open),
            TypeSig::SzArray(inner) | TypeSig::ByRef(inner) => inner.is_open(),
            TypeSig::Primitive(_) | TypeSig::Class(_) | TypeSig::ValueType(_) => false,
        }
    }

    /// True for an instantiated generic type
    #[must_use]
    pub fn is_generic_instance(&self) -> bool {
        matches!(self, TypeSig::GenericInst(..))
    }

    /// True if this signature denotes a value type
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            TypeSig::Primitive(kind) => kind.is_value_type(),
            TypeSig::ValueType(_) => true,
            TypeSig::GenericInst(base, _) => base.is_value_type(),
            _ => false,
        }
    }

    /// The name of the (open) type definition behind this signature
    #[must_use]
    pub fn definition_name(&self) -> Option<&TypeName> {
        match self {
            TypeSig::Class(name) | TypeSig::ValueType(name) => Some(name),
            TypeSig::GenericInst(base, _) => base.definition_name(),
            _ => None,
        }
    }

    /// The generic arguments of an instantiation, empty otherwise
    #[must_use]
    pub fn generic_args(&self) -> &[TypeSig] {
        match self {
            TypeSig::GenericInst(_, args) => args,
            _ => &[],
        }
    }

    /// Replace every `Var(i)` with `args[i]`; parameters without a replacement stay open
    #[must_use]
    pub fn substitute(&self, args: &[TypeSig]) -> TypeSig {
        match self {
            TypeSig::Var(index) => args
                .get(*index as usize)
                .cloned()
                .unwrap_or(TypeSig::Var(*index)),
            TypeSig::GenericInst(base, inner) => TypeSig::GenericInst(
                Box::new(base.substitute(args)),
                inner.iter().map(|arg| arg.substitute(args)).collect(),
            ),
            TypeSig::SzArray(inner) => TypeSig::SzArray(Box::new(inner.substitute(args))),
            TypeSig::ByRef(inner) => TypeSig::ByRef(Box::new(inner.substitute(args))),
            other => other.clone(),
        }
    }

    /// Instantiate `definition` with `args`, or return it unchanged for an empty argument list
    #[must_use]
    pub fn instantiate(definition: TypeSig, args: Vec<TypeSig>) -> TypeSig {
        if args.is_empty() {
            definition
        } else {
            TypeSig::GenericInst(Box::new(definition), args)
        }
    }

    /// The runtime full name, e.g. ``Game.IGeneric`2<System.Int32,System.Single>``
    #[must_use]
    pub fn fullname(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeSig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSig::Primitive(kind) => f.write_str(kind.fullname()),
            TypeSig::Class(name) | TypeSig::ValueType(name) => write!(f, "{name}"),
            TypeSig::GenericInst(base, args) => {
                write!(f, "{base}<")?;
                for (index, arg) in args.iter().enumerate() {
                    if index > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{arg}")?;
                }
                f.write_str(">")
            }
            TypeSig::Var(index) => write!(f, "!{index}"),
            TypeSig::MVar(index) => write!(f, "!!{index}"),
            TypeSig::SzArray(inner) => write!(f, "{inner}[]"),
            TypeSig::ByRef(inner) => write!(f, "{inner}&"),
        }
    }
}

/// Calling convention flags of a method signature
#[allow(non_snake_case)]
pub mod CALLING_CONVENTION {
    /// Default managed calling convention
    pub const DEFAULT: u8 = 0x00;
    /// Generic method, followed by the generic parameter count
    pub const GENERIC: u8 = 0x10;
    /// Instance method
    pub const HASTHIS: u8 = 0x20;
    /// `this` is passed explicitly as first parameter
    pub const EXPLICITTHIS: u8 = 0x40;
    /// Field signature lead byte
    pub const FIELD: u8 = 0x06;
    /// Local variable signature lead byte
    pub const LOCAL_SIG: u8 = 0x07;
    /// Property signature lead byte
    pub const PROPERTY: u8 = 0x08;
}

/// Signature of a method definition or method reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSig {
    /// Instance method
    pub has_this: bool,
    /// `this` appears in `params`
    pub explicit_this: bool,
    /// Number of generic method parameters
    pub generic_param_count: u32,
    /// Return type
    pub ret: TypeSig,
    /// Parameter types
    pub params: Vec<TypeSig>,
}

impl MethodSig {
    /// An instance method with the given return and parameter types
    #[must_use]
    pub fn instance(ret: TypeSig, params: Vec<TypeSig>) -> Self {
        MethodSig {
            has_this: true,
            explicit_this: false,
            generic_param_count: 0,
            ret,
            params,
        }
    }

    /// A static method with the given return and parameter types
    #[must_use]
    pub fn static_method(ret: TypeSig, params: Vec<TypeSig>) -> Self {
        MethodSig {
            has_this: false,
            ..MethodSig::instance(ret, params)
        }
    }

    /// Values a call pops from the evaluation stack (arguments plus implicit `this`)
    #[must_use]
    pub fn stack_pops(&self) -> usize {
        self.params.len() + usize::from(self.has_this && !self.explicit_this)
    }

    /// Values a call pushes onto the evaluation stack
    #[must_use]
    pub fn stack_pushes(&self) -> usize {
        usize::from(self.ret != TypeSig::void())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generic() -> TypeSig {
        TypeSig::Class(TypeName::new("Game", "Game", "IGeneric`2"))
    }

    #[test]
    fn primitive_element_types() {
        for kind in PrimitiveKind::iter() {
            assert_eq!(PrimitiveKind::from_element_type(kind.element_type()), Some(kind));
        }
        assert_eq!(PrimitiveKind::from_element_type(ELEMENT_TYPE::CLASS), None);
        assert!(PrimitiveKind::I4.is_value_type());
        assert!(!PrimitiveKind::String.is_value_type());
    }

    #[test]
    fn type_name_parse() {
        let name = TypeName::parse("Game", "Game.Items.Outer/Inner");
        assert_eq!(name.namespace, "Game.Items");
        assert_eq!(name.name, "Outer/Inner");
        assert_eq!(name.simple_name(), "Inner");
        assert_eq!(name.fullname(), "Game.Items.Outer/Inner");

        let global = TypeName::parse("Game", "Outer/Inner.Dotted");
        assert_eq!(global.namespace, "");
        assert_eq!(global.name, "Outer/Inner.Dotted");

        assert_eq!(name.nested("IBase").name, "Outer/Inner/IBase");
    }

    #[test]
    fn display_matches_runtime_fullname() {
        let sig = TypeSig::GenericInst(
            Box::new(generic()),
            vec![
                TypeSig::Primitive(PrimitiveKind::I4),
                TypeSig::SzArray(Box::new(TypeSig::Var(0))),
            ],
        );
        assert_eq!(sig.fullname(), "Game.IGeneric`2<System.Int32,!0[]>");
    }

    #[test]
    fn open_and_substitute() {
        let partial = TypeSig::GenericInst(
            Box::new(generic()),
            vec![TypeSig::Var(0), TypeSig::Primitive(PrimitiveKind::I4)],
        );
        assert!(partial.is_open());
        assert!(partial.is_generic_instance());
        assert_eq!(partial.definition_name().map(TypeName::fullname).as_deref(), Some("Game.IGeneric`2"));

        let bound = partial.substitute(&[TypeSig::Primitive(PrimitiveKind::R4)]);
        assert!(!bound.is_open());
        assert_eq!(bound.fullname(), "Game.IGeneric`2<System.Single,System.Int32>");

        let untouched = TypeSig::Var(3).substitute(&[TypeSig::object()]);
        assert_eq!(untouched, TypeSig::Var(3));
    }

    #[test]
    fn method_sig_stack_effect() {
        let ctor = MethodSig::instance(TypeSig::void(), vec![]);
        assert_eq!(ctor.stack_pops(), 1);
        assert_eq!(ctor.stack_pushes(), 0);

        let add = MethodSig::static_method(
            TypeSig::Primitive(PrimitiveKind::I4),
            vec![TypeSig::Primitive(PrimitiveKind::I4); 2],
        );
        assert_eq!(add.stack_pops(), 2);
        assert_eq!(add.stack_pushes(), 1);
    }
}
