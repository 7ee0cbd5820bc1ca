//! Shared fixtures and a small CIL evaluator for the integration tests.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use dotweave::{
    assembly::{decode_stream, Operand},
    image::{ImageReader, ImageWriter},
    metadata::{
        builder::{ClassBuilder, ModuleBuilder},
        method::MethodRc,
        module::ModuleImage,
        token::Token,
        typesystem::{PrimitiveKind, TypeRc, TypeSig, TypeUniverse},
    },
    weaver::{CompiledModule, Diagnostics, GenerateMode, MemberAttribute, TypeTree, WeaverConfig},
    Error, Result,
};

pub const RUNTIME: &str = "GenericSerializeReference";

pub fn int() -> TypeSig {
    TypeSig::Primitive(PrimitiveKind::I4)
}

pub fn float() -> TypeSig {
    TypeSig::Primitive(PrimitiveKind::R4)
}

pub fn generic(definition: &TypeRc, args: Vec<TypeSig>) -> TypeSig {
    TypeSig::instantiate(definition.definition_sig(), args)
}

/// A tree over every type of `module`
pub fn tree_of(module: &ModuleImage) -> TypeTree {
    let universe = Arc::new(TypeUniverse::new());
    universe.add(Arc::clone(module.types()));
    let types: Vec<TypeRc> = module.types().iter().collect();
    TypeTree::build(universe, &types, &Diagnostics::default())
}

pub fn sorted_names(types: &[TypeRc]) -> Vec<String> {
    let mut names: Vec<String> = types.iter().map(|ty| ty.name.clone()).collect();
    names.sort();
    names
}

/// The runtime module that ships the attributes and the shared marker interface
pub fn runtime_module() -> Result<ModuleImage> {
    let module = ModuleBuilder::new(RUNTIME).reference("mscorlib").build();
    ClassBuilder::interface(&module, "GenericSerializeReference", "IBase").build()?;
    ClassBuilder::new(&module, "GenericSerializeReference", "GenericSerializeReferenceAttribute")
        .default_constructor()
        .build()?;
    Ok(module)
}

/// `IBox<T>` with a generic, a closed, a float-only, an abstract and a constructor-less
/// implementation
pub struct BoxFixture {
    pub ibox: TypeRc,
    pub boxed_int: TypeSig,
}

pub fn box_fixture(module: &ModuleImage) -> Result<BoxFixture> {
    let ibox = ClassBuilder::interface(module, "Game", "IBox`1").generic_param("T").build()?;
    ClassBuilder::new(module, "Game", "Box`1")
        .generic_param("T")
        .implements(generic(&ibox, vec![TypeSig::Var(0)]))
        .default_constructor()
        .build()?;
    ClassBuilder::new(module, "Game", "IntBox")
        .implements(generic(&ibox, vec![int()]))
        .default_constructor()
        .build()?;
    ClassBuilder::new(module, "Game", "FloatBox")
        .implements(generic(&ibox, vec![float()]))
        .default_constructor()
        .build()?;
    ClassBuilder::new(module, "Game", "AbstractBox`1")
        .generic_param("T")
        .abstract_type()
        .implements(generic(&ibox, vec![TypeSig::Var(0)]))
        .default_constructor()
        .build()?;
    ClassBuilder::new(module, "Game", "NoCtorBox")
        .implements(generic(&ibox, vec![int()]))
        .build()?;
    let boxed_int = generic(&ibox, vec![int()]);
    Ok(BoxFixture { ibox, boxed_int })
}

pub fn request(mode: GenerateMode, prefix: &str) -> MemberAttribute {
    MemberAttribute {
        mode,
        prefix: prefix.to_string(),
        interface: None,
        target_module: None,
    }
}

pub fn config() -> WeaverConfig {
    WeaverConfig::default().with_public_only(false)
}

/// Write `module` next to the other fixtures and return the image path
pub fn save(module: &ModuleImage, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(format!("{}.dwm", module.name()));
    ImageWriter::write(module)?.save(&path)?;
    Ok(path)
}

pub fn compiled(module: &ModuleImage, references: Vec<PathBuf>) -> Result<CompiledModule> {
    let written = ImageWriter::write(module)?;
    Ok(CompiledModule {
        name: module.name().to_string(),
        image: written.image,
        symbols: written.symbols,
        references,
    })
}

/// Read back the woven output of a run
pub fn reload(output: &dotweave::image::InMemoryImage) -> Result<ModuleImage> {
    ImageReader::read(&output.image, Some(&output.symbols))
}

/// A value on the evaluation stack
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Value {
    Null,
    Object(usize),
}

/// Executes accessor bodies over a heap of plain objects.
///
/// Fields are addressed by the token the body uses, so definition tokens and member
/// references through a generic instantiation are distinct slots.
#[derive(Debug, Default)]
pub struct Evaluator {
    heap: Vec<HashMap<Token, Value>>,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self) -> Value {
        self.heap.push(HashMap::new());
        Value::Object(self.heap.len() - 1)
    }

    pub fn load(&self, object: Value, field: Token) -> Result<Value> {
        match object {
            Value::Object(index) => Ok(self.heap[index].get(&field).copied().unwrap_or(Value::Null)),
            Value::Null => Err(Error::Error("null reference".to_string())),
        }
    }

    pub fn store(&mut self, object: Value, field: Token, value: Value) -> Result<()> {
        match object {
            Value::Object(index) => {
                self.heap[index].insert(field, value);
                Ok(())
            }
            Value::Null => Err(Error::Error("null reference".to_string())),
        }
    }

    /// Run `method` with `this` and `args`; returns the value left by `ret`, if any
    pub fn call(&mut self, method: &MethodRc, this: Value, args: &[Value]) -> Result<Option<Value>> {
        let body = method
            .body()
            .ok_or_else(|| Error::Error(format!("{} has no body", method.name)))?;
        let code = decode_stream(&body.code)?;
        let mut stack: Vec<Value> = Vec::new();
        let mut pc = 0;

        loop {
            let instruction = code
                .get(pc)
                .ok_or_else(|| Error::Error("fell off the end".to_string()))?;
            pc += 1;
            match instruction.mnemonic {
                "nop" => {}
                "ldarg.0" => stack.push(this),
                "ldarg.1" => stack.push(args[0]),
                "ldnull" => stack.push(Value::Null),
                "dup" => {
                    let top = *stack.last().ok_or_else(underflow)?;
                    stack.push(top);
                }
                "pop" => {
                    stack.pop().ok_or_else(underflow)?;
                }
                "ldfld" => {
                    let object = stack.pop().ok_or_else(underflow)?;
                    stack.push(self.load(object, field_token(&instruction.operand)?)?);
                }
                "stfld" => {
                    let value = stack.pop().ok_or_else(underflow)?;
                    let object = stack.pop().ok_or_else(underflow)?;
                    self.store(object, field_token(&instruction.operand)?, value)?;
                }
                "br" | "br.s" => pc = target(&instruction.operand)?,
                "brtrue" | "brtrue.s" => {
                    if stack.pop().ok_or_else(underflow)? != Value::Null {
                        pc = target(&instruction.operand)?;
                    }
                }
                "brfalse" | "brfalse.s" => {
                    if stack.pop().ok_or_else(underflow)? == Value::Null {
                        pc = target(&instruction.operand)?;
                    }
                }
                "ret" => return Ok(stack.pop()),
                other => return Err(Error::Error(format!("unsupported instruction {other}"))),
            }
        }
    }
}

fn underflow() -> Error {
    Error::Error("stack underflow".to_string())
}

fn field_token(operand: &Operand) -> Result<Token> {
    match operand {
        Operand::Token(token) => Ok(*token),
        _ => Err(Error::Error("expected a field token".to_string())),
    }
}

fn target(operand: &Operand) -> Result<usize> {
    match operand {
        Operand::Target(index) => Ok(*index),
        _ => Err(Error::Error("expected a branch target".to_string())),
    }
}
