//! Weaving members whose concrete classes are embedded next to the declaring type.

mod common;

use common::{box_fixture, compiled, config, generic, int, reload, request, runtime_module, save};
use dotweave::{
    metadata::{
        builder::{ClassBuilder, ModuleBuilder},
        typesystem::{TypeName, TypeSig},
    },
    weaver::{DiagnosticSeverity, GenerateMode, MemberAttribute, SetterPolicy, Weaver},
    Result,
};

const WRAPPER: &str = "Game.Holder/<Value>__generic_serialize_reference";

#[test]
fn test_embed_generates_one_class_per_instantiable_descendant() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let runtime = save(&runtime_module()?, dir.path())?;

    let config = config();
    let module = ModuleBuilder::new("Game").reference("GenericSerializeReference").build();
    let fixture = box_fixture(&module)?;
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property(
            "Value",
            fixture.boxed_int.clone(),
            vec![request(GenerateMode::Embed, "_").to_attribute(&config)],
        )
        .default_constructor()
        .build()?;

    let weaver = Weaver::new(config.clone());
    let input = compiled(&module, vec![runtime])?;
    assert!(weaver.will_process(&input));

    let result = weaver.process(&input);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    let output = result.output.expect("module is woven");
    let woven = reload(&output)?;
    let types = woven.types();

    let holder = types.get_by_fullname("Game.Holder").expect("holder");
    let field = holder.field("_Value").expect("backing field");
    assert_eq!(field.signature.fullname(), format!("{WRAPPER}/IBase"));
    let attributes: Vec<String> = field
        .custom_attributes
        .iter()
        .map(|(_, attribute)| attribute.attribute_type.fullname())
        .collect();
    assert!(attributes.contains(&"UnityEngine.SerializeReference".to_string()));
    assert!(attributes.contains(&config.generated_field_attribute));

    let wrapper = types.get_by_fullname(WRAPPER).expect("wrapper");
    assert!(wrapper.is_sealed() && wrapper.is_abstract());
    let marker = types.get_by_fullname(&format!("{WRAPPER}/IBase")).expect("marker");
    assert!(marker.is_interface());

    let generic_box = types.get_by_fullname(&format!("{WRAPPER}/Box")).expect("Box");
    assert_eq!(
        generic_box.base.as_ref().map(TypeSig::fullname).as_deref(),
        Some("Game.Box`1<System.Int32>")
    );
    assert!(generic_box.default_constructor().is_some());
    let has_marker = generic_box
        .interfaces
        .iter()
        .any(|(_, interface)| interface.fullname() == format!("{WRAPPER}/IBase"));
    assert!(has_marker);

    let int_box = types.get_by_fullname(&format!("{WRAPPER}/IntBox")).expect("IntBox");
    assert_eq!(int_box.base.as_ref().map(TypeSig::fullname).as_deref(), Some("Game.IntBox"));

    for skipped in ["FloatBox", "AbstractBox", "NoCtorBox"] {
        assert!(types.get_by_fullname(&format!("{WRAPPER}/{skipped}")).is_none(), "{skipped}");
    }
    Ok(())
}

#[test]
fn test_interface_only_adds_marker_without_classes() -> Result<()> {
    let config = config();
    let module = ModuleBuilder::new("Game").reference("GenericSerializeReference").build();
    let fixture = box_fixture(&module)?;
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property(
            "Value",
            fixture.boxed_int,
            vec![request(GenerateMode::InterfaceOnly, "m_").to_attribute(&config)],
        )
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    let woven = reload(&result.output.expect("module is woven"))?;
    let types = woven.types();

    let holder = types.get_by_fullname("Game.Holder").expect("holder");
    assert!(holder.field("m_Value").is_some());
    assert!(types.get_by_fullname(&format!("{WRAPPER}/IBase")).is_some());
    assert!(types.get_by_fullname(&format!("{WRAPPER}/IntBox")).is_none());
    Ok(())
}

#[test]
fn test_explicit_interface_in_target_module_mode() -> Result<()> {
    let config = config();
    let module = ModuleBuilder::new("Game").reference("GenericSerializeReference").build();
    let fixture = box_fixture(&module)?;
    let marker = ClassBuilder::interface(&module, "Game", "IBoxMarker").build()?;
    let attribute = MemberAttribute {
        interface: Some(marker.definition_sig()),
        target_module: Some("Elsewhere".to_string()),
        ..request(GenerateMode::TargetModule, "_")
    };
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property("Value", fixture.boxed_int, vec![attribute.to_attribute(&config)])
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    let woven = reload(&result.output.expect("module is woven"))?;
    let holder = woven.types().get_by_fullname("Game.Holder").expect("holder");
    assert_eq!(holder.field("_Value").expect("field").signature.fullname(), "Game.IBoxMarker");
    assert!(woven.types().get_by_fullname(WRAPPER).is_none());
    Ok(())
}

#[test]
fn test_interface_only_with_explicit_interface() -> Result<()> {
    let config = config();
    let module = ModuleBuilder::new("Game").build();
    let fixture = box_fixture(&module)?;
    let marker = ClassBuilder::interface(&module, "Game", "IBoxMarker").build()?;
    let attribute = MemberAttribute {
        interface: Some(marker.definition_sig()),
        ..request(GenerateMode::InterfaceOnly, "_")
    };
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property("Value", fixture.boxed_int, vec![attribute.to_attribute(&config)])
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    let woven = reload(&result.output.expect("module is woven"))?;
    let holder = woven.types().get_by_fullname("Game.Holder").expect("holder");
    assert_eq!(holder.field("_Value").expect("field").signature.fullname(), "Game.IBoxMarker");
    assert!(woven.types().get_by_fullname(WRAPPER).is_none());
    Ok(())
}

#[test]
fn test_descendant_named_like_the_marker_is_qualified() -> Result<()> {
    let config = config();
    let module = ModuleBuilder::new("Game").build();
    let fixture = box_fixture(&module)?;
    ClassBuilder::new(&module, "Game", "IBase")
        .implements(fixture.boxed_int.clone())
        .default_constructor()
        .build()?;
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property(
            "Value",
            fixture.boxed_int,
            vec![request(GenerateMode::Embed, "_").to_attribute(&config)],
        )
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    assert!(!result.has_errors(), "{:?}", result.diagnostics);
    let woven = reload(&result.output.expect("module is woven"))?;
    let types = woven.types();
    assert!(types.get_by_fullname(&format!("{WRAPPER}/IBase")).expect("marker").is_interface());
    let renamed = types.get_by_fullname(&format!("{WRAPPER}/Game_IBase")).expect("renamed class");
    assert_eq!(renamed.base.as_ref().map(TypeSig::fullname).as_deref(), Some("Game.IBase"));
    assert!(types.get_by_fullname("Game.Holder").expect("holder").field("_Value").is_some());
    Ok(())
}

#[test]
fn test_generic_value_type_member_is_skipped() -> Result<()> {
    let config = config();
    let module = ModuleBuilder::new("Game").reference("GenericSerializeReference").build();
    let pair = TypeSig::instantiate(
        TypeSig::ValueType(TypeName::parse("mscorlib", "System.Collections.Generic.KeyValuePair`2")),
        vec![int(), int()],
    );
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property(
            "Value",
            pair,
            vec![request(GenerateMode::TargetModule, "_").to_attribute(&config)],
        )
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    assert!(!result.is_modified());
    assert!(!result.has_errors());
    let warnings: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity == DiagnosticSeverity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].member.as_deref(), Some("Value"));
    Ok(())
}

#[test]
fn test_generic_declaring_type_accesses_field_through_reference() -> Result<()> {
    let config = config();
    let module = ModuleBuilder::new("Game").build();
    let fixture = box_fixture(&module)?;
    ClassBuilder::new(&module, "Game", "Holder`1")
        .generic_param("T")
        .auto_property(
            "Value",
            fixture.boxed_int,
            vec![request(GenerateMode::TargetModule, "_").to_attribute(&config)],
        )
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    let woven = reload(&result.output.expect("module is woven"))?;
    let holder = woven.types().get_by_fullname("Game.Holder`1").expect("holder");
    let field = holder.field("_Value").expect("field");
    let getter = holder
        .method(holder.property("Value").expect("property").getter.expect("getter"))
        .expect("getter method");

    let code = dotweave::assembly::decode_stream(&getter.body().expect("body").code)?;
    let access = code[1].token().expect("ldfld token");
    assert_ne!(access, field.token);
    let reference = woven.member_ref(access).expect("member reference");
    assert_eq!(reference.name, "_Value");
    assert_eq!(reference.parent.fullname(), "Game.Holder`1<!0>");
    Ok(())
}

#[test]
fn test_member_failures_are_isolated() -> Result<()> {
    let config = config().with_setter_policy(SetterPolicy::RequireBoth);
    let module = ModuleBuilder::new("Game").build();
    let fixture = box_fixture(&module)?;
    let attribute = request(GenerateMode::Embed, "_").to_attribute(&config);
    ClassBuilder::new(&module, "Game", "ReadOnly")
        .getter_only_property("Value", fixture.boxed_int.clone(), vec![attribute.clone()])
        .build()?;
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property("Value", fixture.boxed_int, vec![attribute])
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    assert!(!result.has_errors());
    let warnings: Vec<_> = result
        .diagnostics
        .iter()
        .filter(|diagnostic| diagnostic.severity == DiagnosticSeverity::Warning)
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].type_name.as_deref(), Some("Game.ReadOnly"));

    let woven = reload(&result.output.expect("module is woven"))?;
    assert!(woven.types().get_by_fullname("Game.ReadOnly").expect("type").field("_Value").is_none());
    assert!(woven.types().get_by_fullname(&format!("{WRAPPER}/IntBox")).is_some());
    Ok(())
}

#[test]
fn test_getter_only_member_is_woven_by_default() -> Result<()> {
    let config = config();
    let module = ModuleBuilder::new("Game").build();
    let fixture = box_fixture(&module)?;
    ClassBuilder::new(&module, "Game", "ReadOnly")
        .getter_only_property(
            "Value",
            generic(&fixture.ibox, vec![int()]),
            vec![request(GenerateMode::Embed, "_").to_attribute(&config)],
        )
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    assert!(!result.has_errors());
    let woven = reload(&result.output.expect("module is woven"))?;
    assert!(woven.types().get_by_fullname("Game.ReadOnly").expect("type").field("_Value").is_some());
    Ok(())
}

#[test]
fn test_logger_attribute_lowers_the_level() -> Result<()> {
    let config = config();
    let module = ModuleBuilder::new("Game")
        .assembly_attribute(dotweave::weaver::attributes::logger_attribute(
            DiagnosticSeverity::Debug,
            &config,
        ))
        .build();
    let fixture = box_fixture(&module)?;
    ClassBuilder::new(&module, "Game", "Holder")
        .auto_property(
            "Value",
            fixture.boxed_int,
            vec![request(GenerateMode::Embed, "_").to_attribute(&config)],
        )
        .build()?;

    let result = Weaver::new(config).process(&compiled(&module, Vec::new())?);
    assert!(result
        .diagnostics
        .iter()
        .any(|diagnostic| diagnostic.severity == DiagnosticSeverity::Debug
            && diagnostic.message.contains("skip Game.NoCtorBox")));
    Ok(())
}
