//! Integration tests for the polymorphic codec
//!
//! Covers the full cake graph: templates, specs and runs linked both by
//! embedding and by `link_by_uid` stubs.

use data_concepts::codec::{decode, decode_as, dump, encode};
use data_concepts::entity::{PerformedSource, SampleType, TemplateEntry};
use data_concepts::{
    BaseValue, Bounds, Condition, ConditionTemplate, Entity, Error, FileLink, IngredientRun,
    IngredientSpec, LinkByUid, LinkOr, MaterialRun, MaterialSpec, MaterialTemplate,
    MeasurementRun, MeasurementSpec, MeasurementTemplate, Origin, Parameter, ParameterTemplate, ProcessRun,
    ProcessSpec, ProcessTemplate, Property, PropertyAndConditions, PropertyTemplate, TypeTag,
};
use serde_json::json;

fn oven_template() -> ConditionTemplate {
    ConditionTemplate::new("Oven temperature", Bounds::real(0.0, 300.0, "degC"))
        .with_uid("id", "ct-oven")
}

fn cake_spec() -> MaterialSpec {
    let bake = ProcessSpec::new("Bake")
        .with_template(
            ProcessTemplate::new("Baking")
                .with_condition(TemplateEntry::narrowed(
                    oven_template(),
                    Bounds::real(150.0, 250.0, "degC"),
                ))
                .with_allowed_names(["batter"]),
        )
        .with_condition(
            Condition::new("Oven temperature")
                .with_value(BaseValue::nominal_real(175.0, "degC"))
                .with_template(LinkByUid::new("id", "ct-oven"))
                .with_origin(Origin::Specified),
        )
        .with_parameter(
            Parameter::new("Oven mode").with_value(BaseValue::nominal_categorical("convection")),
        );

    MaterialSpec::new("Cake")
        .with_uid("lab", "cake-spec-1")
        .with_tag("dessert::cake")
        .with_process(bake)
        .with_template(MaterialTemplate::new("Baked good").with_property(TemplateEntry::new(
            PropertyTemplate::new("Tastiness", Bounds::integer(1, 10)),
        )))
        .with_property(PropertyAndConditions::new(
            Property::new("Tastiness").with_value(BaseValue::nominal_integer(9)),
            vec![Condition::new("Altitude").with_value(BaseValue::nominal_real(300.0, "m"))],
        ))
}

#[test]
fn test_dump_round_trip_is_lossless() {
    let spec = cake_spec();
    let decoded: MaterialSpec = decode_as(&dump(&spec).unwrap()).unwrap();
    assert_eq!(decoded, spec);
}

#[test]
fn test_every_type_round_trips_through_entity() {
    let material = MaterialRun::new("cake 1")
        .with_uid("id", "mr-1")
        .with_spec(LinkByUid::new("id", "ms-1"));
    let entities: Vec<Entity> = vec![
        oven_template().into(),
        ParameterTemplate::new("Oven mode", Bounds::categorical(["convection", "static"])).into(),
        PropertyTemplate::new("Tastiness", Bounds::integer(1, 10))
            .with_description("panel score")
            .into(),
        MaterialTemplate::new("Baked good").into(),
        ProcessTemplate::new("Baking").with_allowed_labels(["wet", "dry"]).into(),
        MeasurementTemplate::new("Taste test").into(),
        cake_spec().into(),
        ProcessSpec::new("Mix").into(),
        IngredientSpec::new("flour")
            .with_mass_fraction(BaseValue::nominal_real(0.5, ""))
            .with_label("dry")
            .into(),
        MeasurementSpec::new("Taste").into(),
        material.clone().into(),
        ProcessRun::new("Bake 1")
            .with_source(PerformedSource::new("baker", None))
            .into(),
        IngredientRun::new("flour 1").with_material(material.clone()).into(),
        MeasurementRun::new("Taste 1")
            .with_material(LinkByUid::new("id", "mr-1"))
            .with_property(Property::new("Tastiness").with_value(BaseValue::nominal_integer(8)))
            .into(),
    ];
    assert_eq!(entities.len(), TypeTag::ALL.len());

    for entity in entities {
        let wire = serde_json::to_value(&entity).unwrap();
        assert_eq!(wire["type"], entity.type_tag().as_str());
        let back = decode(&wire).unwrap();
        assert_eq!(back, entity);
    }
}

#[test]
fn test_encode_collapses_registered_and_embeds_new() {
    let spec = cake_spec();
    let wire = encode(&spec).unwrap();

    // Unregistered process and template travel inline.
    assert_eq!(wire["process"]["type"], "process_spec");
    assert_eq!(wire["template"]["type"], "material_template");
    // Registered condition template inside the process template is a link.
    let entry = &wire["process"]["template"]["conditions"][0];
    assert_eq!(entry[0]["type"], "link_by_uid");
    assert_eq!(entry[0]["id"], "ct-oven");
    assert_eq!(entry[1]["lower_bound"], 150.0);
}

#[test]
fn test_encode_then_decode_keeps_links() {
    let run = MaterialRun::new("cake 1")
        .with_uid("id", "mr-1")
        .with_process(ProcessRun::new("Bake 1").with_uid("id", "pr-1"))
        .with_spec(LinkByUid::new("lab", "cake-spec-1"));
    let decoded: MaterialRun = decode_as(&encode(&run).unwrap()).unwrap();

    assert_eq!(
        decoded.process.as_ref().and_then(LinkOr::as_link),
        Some(&LinkByUid::new("id", "pr-1"))
    );
    assert_eq!(decoded.spec, run.spec);
    assert_eq!(decoded.name, run.name);
}

#[test]
fn test_attribute_order_preserved() {
    let spec = ProcessSpec::new("Mix")
        .with_condition(Condition::new("c"))
        .with_condition(Condition::new("a"))
        .with_condition(Condition::new("b"));
    let wire = encode(&spec).unwrap();
    let names: Vec<&str> = wire["conditions"]
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["c", "a", "b"]);
}

#[test]
fn test_link_and_object_both_accepted_on_read() {
    let as_link = json!({
        "type": "material_run",
        "name": "cake",
        "process": {"type": "link_by_uid", "scope": "id", "id": "pr-1"}
    });
    let as_object = json!({
        "type": "material_run",
        "name": "cake",
        "process": {"type": "process_run", "name": "Bake", "uids": {"id": "pr-1"}}
    });
    let linked: MaterialRun = decode_as(&as_link).unwrap();
    let embedded: MaterialRun = decode_as(&as_object).unwrap();
    assert!(linked.process.as_ref().unwrap().as_link().is_some());
    assert_eq!(embedded.process.as_ref().unwrap().as_object().unwrap().name, "Bake");
    assert_eq!(
        linked.process.as_ref().unwrap().to_link(),
        embedded.process.as_ref().unwrap().to_link()
    );
}

#[test]
fn test_wrong_nested_type_rejected() {
    let record = json!({
        "type": "measurement_run",
        "name": "taste",
        "spec": {"type": "process_spec", "name": "Bake"}
    });
    let err = decode(&record).unwrap_err();
    assert!(matches!(err, Error::Decode(ref msg) if msg.contains("type mismatch")));
}

#[test]
fn test_unknown_tag_fails_fast() {
    let err = decode(&json!({"type": "steel_ingot", "name": "x"})).unwrap_err();
    assert!(matches!(err, Error::Decode(ref msg) if msg.contains("steel_ingot")));
}

#[test]
fn test_server_fields_preserved() {
    let record = json!({
        "type": "material_run",
        "name": "cake",
        "uids": {"id": "mr-9"},
        "sample_type": "production",
        "dataset": "d-1",
        "audit_info": {"created_by": "baker", "created_at": "2024-05-01T12:00:00Z"},
        "file_links": [{"type": "file_link", "filename": "photo.png", "url": "files/1"}],
    });
    let run: MaterialRun = decode_as(&record).unwrap();
    assert_eq!(run.sample_type, SampleType::Production);
    assert_eq!(run.core.dataset.as_deref(), Some("d-1"));
    assert_eq!(
        run.core.audit_info.as_ref().and_then(|a| a.created_by.as_deref()),
        Some("baker")
    );
    assert_eq!(run.file_links, vec![FileLink::new("photo.png", "files/1")]);

    let again: MaterialRun = decode_as(&dump(&run).unwrap()).unwrap();
    assert_eq!(again, run);
}
