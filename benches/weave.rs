//! Benchmarks for the weaving pipeline.
//!
//! - Type tree construction over a wide class hierarchy
//! - Bound descendant queries against a generic interface
//! - Accessor rewriting
//! - A complete run over a module with many annotated members

extern crate dotweave;

use criterion::{criterion_group, criterion_main, Criterion};
use dotweave::{
    assembly::{Instruction, InstructionStream},
    image::ImageWriter,
    metadata::{
        builder::{ClassBuilder, ModuleBuilder},
        module::ModuleImage,
        token::Token,
        typesystem::{PrimitiveKind, TypeRc, TypeSig, TypeUniverse},
    },
    weaver::{
        accessor::rewrite_getter, CompiledModule, DescendantQuery, Diagnostics, MemberAttribute,
        TypeTree, Weaver, WeaverConfig,
    },
};
use std::{hint::black_box, sync::Arc};

fn int() -> TypeSig {
    TypeSig::Primitive(PrimitiveKind::I4)
}

/// `IBox<T>` with `width` generic implementations, each with `depth` levels of subclasses
fn boxes(module: &ModuleImage, width: usize, depth: usize) -> TypeSig {
    let ibox = ClassBuilder::interface(module, "Game", "IBox`1")
        .generic_param("T")
        .build()
        .unwrap();
    for index in 0..width {
        let mut parent = ClassBuilder::new(module, "Game", &format!("Box{index}`1"))
            .generic_param("T")
            .implements(TypeSig::instantiate(ibox.definition_sig(), vec![TypeSig::Var(0)]))
            .default_constructor()
            .build()
            .unwrap();
        for level in 0..depth {
            parent = ClassBuilder::new(module, "Game", &format!("Box{index}Sub{level}"))
                .extends(TypeSig::instantiate(parent.definition_sig(), vec![int()]))
                .default_constructor()
                .build()
                .unwrap();
        }
    }
    TypeSig::instantiate(ibox.definition_sig(), vec![int()])
}

fn tree(module: &ModuleImage) -> TypeTree {
    let universe = Arc::new(TypeUniverse::new());
    universe.add(Arc::clone(module.types()));
    let types: Vec<TypeRc> = module.types().iter().collect();
    TypeTree::build(universe, &types, &Diagnostics::default())
}

/// Benchmark building the tree over 200 implementations with 4 subclasses each.
fn bench_tree_build(c: &mut Criterion) {
    let module = ModuleBuilder::new("Game").build();
    boxes(&module, 200, 4);

    c.bench_function("weave_tree_build", |b| {
        b.iter(|| black_box(tree(black_box(&module))));
    });
}

/// Benchmark binding every descendant of `IBox<int>`.
fn bench_bound_descendants(c: &mut Criterion) {
    let module = ModuleBuilder::new("Game").build();
    let base = boxes(&module, 200, 4);
    let tree = tree(&module);

    c.bench_function("weave_bound_descendants", |b| {
        b.iter(|| {
            let bound = tree
                .bound_descendants(black_box(&base), DescendantQuery::default())
                .unwrap();
            black_box(bound)
        });
    });
}

/// Benchmark the getter rewrite on a body with a forward branch.
fn bench_rewrite_getter(c: &mut Criterion) {
    let stream = InstructionStream::new(vec![
        Instruction::simple("nop").unwrap(),
        Instruction::branch("br", 3).unwrap(),
        Instruction::simple("nop").unwrap(),
        Instruction::simple("ldnull").unwrap(),
        Instruction::simple("ret").unwrap(),
    ]);
    let field = Token::new(0x0400_0010);

    c.bench_function("weave_rewrite_getter", |b| {
        b.iter(|| black_box(rewrite_getter(black_box(&stream), field).unwrap()));
    });
}

/// Benchmark a complete run over 50 annotated members.
fn bench_process(c: &mut Criterion) {
    let config = WeaverConfig::default();
    let module = ModuleBuilder::new("Assembly-CSharp").build();
    let base = boxes(&module, 20, 2);
    let request = MemberAttribute::embed("_").to_attribute(&config);
    for index in 0..50 {
        ClassBuilder::new(&module, "Game", &format!("Holder{index}"))
            .auto_property("Value", base.clone(), vec![request.clone()])
            .default_constructor()
            .build()
            .unwrap();
    }
    let written = ImageWriter::write(&module).unwrap();
    let compiled = CompiledModule {
        name: "Assembly-CSharp".to_string(),
        image: written.image,
        symbols: written.symbols,
        references: Vec::new(),
    };
    let weaver = Weaver::new(config);

    c.bench_function("weave_process", |b| {
        b.iter(|| black_box(weaver.process(black_box(&compiled))));
    });
}

criterion_group!(
    benches,
    bench_tree_build,
    bench_bound_descendants,
    bench_rewrite_getter,
    bench_process,
);
criterion_main!(benches);
