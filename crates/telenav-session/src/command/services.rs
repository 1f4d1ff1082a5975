//! Type-keyed registry of shared services handed to commands.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

/// Shared services by concrete type.
#[derive(Default)]
pub struct ServiceRegistry {
    services: HashMap<TypeId, (&'static str, Arc<dyn Any + Send + Sync>)>,
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.services.values().map(|(name, _)| *name).collect();
        names.sort_unstable();
        f.debug_struct("ServiceRegistry").field("services", &names).finish()
    }
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a service; replaces any previous one of the same type.
    pub fn insert<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        self.services
            .insert(TypeId::of::<T>(), (std::any::type_name::<T>(), service));
    }

    pub fn with<T: Send + Sync + 'static>(mut self, service: Arc<T>) -> Self {
        self.insert(service);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.services
            .get(&TypeId::of::<T>())
            .and_then(|(_, s)| s.clone().downcast::<T>().ok())
    }

    pub fn contains_type(&self, type_id: TypeId) -> bool {
        self.services.contains_key(&type_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
