//! Integration tests for material history reconstruction

use std::sync::Arc;

use data_concepts::collection::{
    IngredientRunCollection, MaterialRunCollection, MeasurementRunCollection,
};
use data_concepts::{
    BaseValue, DataConcept, InMemorySession, IngredientRun, LinkOr, MaterialRun, MaterialSpec,
    MeasurementRun, ProcessRun, Property,
};

struct Bakery {
    runs: MaterialRunCollection,
    cake: MaterialRun,
}

/// flour --(ingredient)--> bake --> cake <-- taste
fn bakery() -> Bakery {
    let store = Arc::new(InMemorySession::with_api_key("key").unwrap());
    let runs = MaterialRunCollection::new("p", Some("d"), store.clone());
    let ingredients = IngredientRunCollection::new("p", Some("d"), store.clone());
    let measurements = MeasurementRunCollection::new("p", Some("d"), store);

    let flour = runs.register(&MaterialRun::new("flour")).unwrap();
    let cake = runs
        .register(
            &MaterialRun::new("cake")
                .with_process(ProcessRun::new("bake"))
                .with_spec(MaterialSpec::new("cake spec")),
        )
        .unwrap();
    let bake = cake.process.as_ref().and_then(LinkOr::to_link).unwrap();

    ingredients
        .register(
            &IngredientRun::new("flour")
                .with_material(flour.to_link().unwrap())
                .with_process(bake)
                .with_mass_fraction(BaseValue::nominal_real(0.6, "")),
        )
        .unwrap();
    measurements
        .register(
            &MeasurementRun::new("taste")
                .with_material(cake.to_link().unwrap())
                .with_property(
                    Property::new("Tastiness").with_value(BaseValue::nominal_integer(9)),
                ),
        )
        .unwrap();

    Bakery { runs, cake }
}

#[test]
fn test_history_inlines_upstream_and_lateral() {
    let Bakery { runs, cake } = bakery();
    let history = runs.get_history("id", cake.uid().unwrap()).unwrap();

    assert_eq!(history.name, "cake");
    let spec = history.spec.as_ref().and_then(LinkOr::as_object).unwrap();
    assert_eq!(spec.name, "cake spec");

    let bake = history.process.as_ref().and_then(LinkOr::as_object).unwrap();
    assert_eq!(bake.name, "bake");
    assert_eq!(bake.ingredients.len(), 1);

    let ingredient = bake.ingredients[0].as_object().unwrap();
    assert_eq!(ingredient.name, "flour");
    let source = ingredient.material.as_ref().and_then(LinkOr::as_object).unwrap();
    assert_eq!(source.name, "flour");

    assert_eq!(history.measurements.len(), 1);
    let taste = history.measurements[0].as_object().unwrap();
    assert_eq!(taste.name, "taste");
    assert_eq!(taste.properties.len(), 1);
}

#[test]
fn test_history_is_a_finite_tree() {
    let Bakery { runs, cake } = bakery();
    let history = runs.get_history("id", cake.uid().unwrap()).unwrap();

    // Links back up the current path stay links.
    let bake = history.process.as_ref().and_then(LinkOr::as_object).unwrap();
    assert_eq!(
        bake.output_material.as_ref().and_then(LinkOr::as_link),
        cake.to_link().as_ref()
    );
    let ingredient = bake.ingredients[0].as_object().unwrap();
    assert!(ingredient.process.as_ref().unwrap().as_link().is_some());
    let taste = history.measurements[0].as_object().unwrap();
    assert!(taste.material.as_ref().unwrap().as_link().is_some());
}

#[test]
fn test_history_is_idempotent() {
    let Bakery { runs, cake } = bakery();
    let first = runs.get_history("id", cake.uid().unwrap()).unwrap();
    let second = runs.get_history("id", cake.uid().unwrap()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_history_of_unknown_run() {
    let Bakery { runs, .. } = bakery();
    assert!(matches!(
        runs.get_history("id", "missing"),
        Err(data_concepts::Error::NotFound(_))
    ));
}
