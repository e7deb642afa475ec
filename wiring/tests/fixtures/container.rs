// Auto-generated from your services configuration.
// [!!] Changes will be overwritten.

use std::ops::Deref;
use std::sync::Arc;

use wiring::Container;

pub struct AppContainer {
    base: Container,
}

impl AppContainer {
    pub fn new(base: Container) -> Self {
        Self { base }
    }

    pub fn get_clock(&self) -> ::wiring::Result<Arc<crate::Clock>> {
        self.base.get_as::<crate::Clock>("clock")
    }

    pub fn get_date(&self) -> ::wiring::Result<Arc<crate::DateTime>> {
        self.base.get_as::<crate::DateTime>("date")
    }

    pub fn get_label(&self) -> ::wiring::Result<Arc<std::string::String>> {
        self.base.get_as::<std::string::String>("label")
    }

    pub fn get_model(&self) -> ::wiring::Result<Arc<crate::Model>> {
        self.base.get_as::<crate::Model>("model")
    }

    pub fn get_model_user(&self) -> ::wiring::Result<Arc<crate::Model>> {
        self.base.get_as::<crate::Model>("model.user")
    }

    /// Returns mixed: the service type is only known at runtime.
    pub fn get_registry(&self) -> ::wiring::Result<::wiring::Instance> {
        self.base.get("registry")
    }
}

impl Deref for AppContainer {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.base
    }
}
