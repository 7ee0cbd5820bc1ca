//! Concrete classes generated by the target module for members of referenced modules.

mod common;

use std::path::{Path, PathBuf};

use common::{box_fixture, compiled, config, reload, request, runtime_module, save};
use dotweave::{
    metadata::{
        builder::{ClassBuilder, ModuleBuilder},
        module::ModuleImage,
        typesystem::{TypeAttributes, TypeSig},
    },
    weaver::{DiagnosticSeverity, GenerateMode, Weaver, WeaverConfig},
    Result,
};

const BUCKET: &str = "<GenericSerializeReference>Game.Game_IBox`1<System_Int32>";

/// A library with two members of the same type that leave class generation to the target module
fn library(config: &WeaverConfig) -> Result<ModuleImage> {
    let module = ModuleBuilder::new("Lib").reference("GenericSerializeReference").build();
    let fixture = box_fixture(&module)?;
    let attribute = request(GenerateMode::TargetModule, "_").to_attribute(config);
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property("Value", fixture.boxed_int.clone(), vec![attribute.clone()])
        .build()?;
    ClassBuilder::new(&module, "Game", "Inventory")
        .auto_property("Slot", fixture.boxed_int, vec![attribute])
        .build()?;
    Ok(module)
}

fn woven_library(config: &WeaverConfig, dir: &Path, runtime: &Path) -> Result<PathBuf> {
    let lib = library(config)?;
    let result = Weaver::new(config.clone()).process(&compiled(&lib, vec![runtime.to_path_buf()])?);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    let path = dir.join("Lib.dwm");
    result.output.expect("library is woven").save(&path)?;
    Ok(path)
}

#[test]
fn test_bucket_is_generated_once_per_type_and_marker() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config().with_min_level(DiagnosticSeverity::Debug);
    let runtime = save(&runtime_module()?, dir.path())?;
    let lib = woven_library(&config, dir.path(), &runtime)?;

    let target = ModuleBuilder::new("Assembly-CSharp").reference("Lib").build();
    let weaver = Weaver::new(config);
    let input = compiled(&target, vec![runtime, lib])?;
    assert!(weaver.will_process(&input));

    let result = weaver.process(&input);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    assert!(result
        .diagnostics
        .iter()
        .any(|diagnostic| diagnostic.message.starts_with("shares the bucket")));

    let woven = reload(&result.output.expect("target is woven"))?;
    let types = woven.types();
    let bucket = types.get_by_fullname(BUCKET).expect("bucket");
    assert!(bucket.is_public() && bucket.is_sealed() && bucket.is_abstract());
    assert_eq!(bucket.namespace, "<GenericSerializeReference>Game");

    let int_box = types.get_by_fullname(&format!("{BUCKET}/IntBox")).expect("IntBox");
    assert_eq!(int_box.base.as_ref().map(TypeSig::fullname).as_deref(), Some("Game.IntBox"));
    let implements_shared = int_box
        .interfaces
        .iter()
        .any(|(_, interface)| interface.fullname() == "GenericSerializeReference.IBase");
    assert!(implements_shared);
    assert!(types.get_by_fullname(&format!("{BUCKET}/Box")).is_some());
    assert!(types.get_by_fullname(&format!("{BUCKET}/NoCtorBox")).is_none());

    let buckets = types
        .iter()
        .filter(|ty| ty.namespace.starts_with("<GenericSerializeReference>") && ty.enclosing.is_none())
        .count();
    assert_eq!(buckets, 1);
    Ok(())
}

#[test]
fn test_unwoven_library_is_reported() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config();
    let runtime = save(&runtime_module()?, dir.path())?;
    let lib = save(&library(&config)?, dir.path())?;

    let target = ModuleBuilder::new("Assembly-CSharp").build();
    let result = Weaver::new(config).process(&compiled(&target, vec![runtime, lib])?);
    assert!(!result.is_modified());
    let warnings = result
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity == DiagnosticSeverity::Warning)
        .count();
    assert_eq!(warnings, 2);
    Ok(())
}

#[test]
fn test_other_targets_are_left_alone() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = config();
    let runtime = save(&runtime_module()?, dir.path())?;
    let lib = woven_library(&config, dir.path(), &runtime)?;

    let other = ModuleBuilder::new("Game.Client").build();
    let weaver = Weaver::new(config);
    let input = compiled(&other, vec![runtime, lib])?;
    assert!(weaver.will_process(&input));
    assert!(!weaver.process(&input).is_modified());
    Ok(())
}

#[test]
fn test_missing_reference_is_fatal() -> Result<()> {
    let target = ModuleBuilder::new("Assembly-CSharp").build();
    let result = Weaver::new(config())
        .process(&compiled(&target, vec![PathBuf::from("/nonexistent/Lib.dwm")])?);
    assert!(result.output.is_none());
    assert_eq!(result.diagnostics.len(), 1);
    assert_eq!(result.diagnostics[0].severity, DiagnosticSeverity::Error);
    Ok(())
}

/// A library whose member only gets a marker, with classes generated by the target module
fn interface_only_library(config: &WeaverConfig, visibility: u32) -> Result<ModuleImage> {
    let module = ModuleBuilder::new("Lib").reference("GenericSerializeReference").build();
    let fixture = box_fixture(&module)?;
    ClassBuilder::new(&module, "Game", "Holder")
        .visibility(visibility)
        .auto_property(
            "Value",
            fixture.boxed_int,
            vec![request(GenerateMode::InterfaceOnly, "_").to_attribute(config)],
        )
        .build()?;
    Ok(module)
}

fn weave_into_target(config: &WeaverConfig, lib: &ModuleImage) -> Result<dotweave::weaver::ProcessResult> {
    let dir = tempfile::tempdir()?;
    let runtime = save(&runtime_module()?, dir.path())?;
    let result = Weaver::new(config.clone()).process(&compiled(lib, vec![runtime.clone()])?);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    let woven = dir.path().join("Lib.dwm");
    result.output.expect("library is woven").save(&woven)?;

    let target = ModuleBuilder::new("Assembly-CSharp").reference("Lib").build();
    Ok(Weaver::new(config.clone()).process(&compiled(&target, vec![runtime, woven])?))
}

#[test]
fn test_interface_only_marker_is_implemented_across_modules() -> Result<()> {
    let config = config();
    let lib = interface_only_library(&config, TypeAttributes::PUBLIC)?;
    let result = weave_into_target(&config, &lib)?;
    assert!(!result.has_errors(), "{:?}", result.diagnostics);

    let marker = "Game.Holder/<Value>__generic_serialize_reference/IBase";
    let woven = reload(&result.output.expect("target is woven"))?;
    let int_box = woven.types().get_by_fullname(&format!("{BUCKET}/IntBox")).expect("IntBox");
    assert!(int_box.interfaces.iter().any(|(_, interface)| interface.fullname() == marker));
    Ok(())
}

#[test]
fn test_hidden_marker_is_not_implemented() -> Result<()> {
    let config = config();
    let lib = interface_only_library(&config, TypeAttributes::NOT_PUBLIC)?;
    let result = weave_into_target(&config, &lib)?;
    assert!(!result.is_modified());
    let errors: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity == DiagnosticSeverity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("not accessible"));
    Ok(())
}
