use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;
use async_trait::async_trait;
use crate::kernel::error::Result;

/// Lifecycle shared by long-running daemon components (minions)
#[async_trait]
pub trait KernelComponent: Send + Sync + Debug {
    /// Stable identity used for logging and registry lookups
    fn name(&self) -> &'static str;
    async fn start(&self) -> Result<()>;
    /// Stops the component and waits for its background work to finish
    async fn stop(&self) -> Result<()>;
}

/// Registry of active components keyed by name, kept in start order
#[derive(Default, Debug)]
pub struct ComponentRegistry {
    instances: HashMap<&'static str, Arc<dyn KernelComponent>>,
    order: Vec<&'static str>,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            instances: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a component. Re-registering a name replaces the instance but keeps its position.
    pub fn register(&mut self, component: Arc<dyn KernelComponent>) {
        let name = component.name();
        if self.instances.insert(name, component).is_none() {
            self.order.push(name);
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn KernelComponent>> {
        self.instances.get(name).cloned()
    }

    /// Components in registration order
    pub fn in_order(&self) -> Vec<Arc<dyn KernelComponent>> {
        self.order
            .iter()
            .filter_map(|name| self.instances.get(name).cloned())
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.order.clone()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove every component, returning them in registration order
    pub fn drain(&mut self) -> Vec<Arc<dyn KernelComponent>> {
        let drained = self.in_order();
        self.instances.clear();
        self.order.clear();
        drained
    }
}
