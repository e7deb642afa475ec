use std::sync::Arc;

use serde_json::json;
use wiring::{Compiler, Container, Instance, Instantiable, Registry, TypeCatalog, instantiable};

mod generated {
    include!("fixtures/container.rs");
}

use generated::AppContainer;

#[derive(Instantiable)]
#[wiring(rust_path = "crate::DateTime")]
pub struct DateTime;

#[derive(Instantiable)]
pub struct Clock;

pub struct Model {
    pub table: String,
}

#[instantiable(rust_path = "crate::Model")]
impl Model {
    #[factory]
    fn factory(table: String) -> Model {
        Model { table }
    }

    #[factory]
    fn label(table: String) -> String {
        format!("table {table}")
    }

    #[factory]
    fn registry() -> Instance {
        Instance::new(vec![String::from("user")])
    }
}

fn container() -> Container {
    let registry = Registry::from_config(&json!({
        "clock": {"settings": {"class": "Clock"}},
        "date": {"settings": {"class": "DateTime"}},
        "label": {"settings": {"class": "Model", "constructor": "label", "arguments": ["user"]}},
        "model": {
            "settings": {"class": "Model", "constructor": "factory", "arguments": ["base"]},
            "user": {"settings": {"arguments": ["user"]}},
        },
        "registry": {"settings": {"class": "Model", "constructor": "registry"}},
    }))
    .unwrap();
    Container::builder()
        .definitions(registry)
        .catalog(
            TypeCatalog::builder()
                .register::<Clock>("Clock")
                .register::<DateTime>("DateTime")
                .register::<Model>("Model")
                .build(),
        )
        .build()
}

#[test]
fn test_fixture_is_up_to_date() {
    let source = Compiler::new(container()).render("AppContainer").unwrap();
    assert_eq!(source, include_str!("fixtures/container.rs"));
}

#[test]
fn test_generated_accessors() {
    let services = AppContainer::new(container());
    services.get_date().unwrap();
    // Paths derived without an override resolve in this crate.
    let _: Arc<Clock> = services.get_clock().unwrap();
    let label: Arc<String> = services.get_label().unwrap();
    assert_eq!(*label, "table user");
    assert_eq!(services.get_model().unwrap().table, "base");
    assert_eq!(services.get_model_user().unwrap().table, "user");
    let registry = services.get_registry().unwrap();
    assert_eq!(
        registry.downcast_ref::<Vec<String>>().unwrap(),
        &["user".to_owned()]
    );
    // The base container stays reachable.
    assert!(services.get("date").unwrap().is::<DateTime>());
}
