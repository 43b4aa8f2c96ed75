//! Name lookup for connection factories and destinations.

use std::collections::HashMap;
use std::sync::Arc;

use super::connection::ConnectionFactory;
use super::message::Destination;
use crate::ClientError;

/// Prefix that resolves any queue address without a binding.
pub const DYNAMIC_QUEUE_PREFIX: &str = "dynamicQueues/";
/// Prefix that resolves any topic address without a binding.
pub const DYNAMIC_TOPIC_PREFIX: &str = "dynamicTopics/";

/// Resolves names to typed handles.
pub trait Context: Send + Sync {
    fn lookup_factory(&self, name: &str) -> Result<Arc<dyn ConnectionFactory>, ClientError>;

    fn lookup_destination(&self, name: &str) -> Result<Destination, ClientError>;
}

/// In-memory name registry.
///
/// ## Example
///
/// ```
/// use smoketest::bus::{Context, Destination, InMemoryBroker, NamingContext};
///
/// let context = NamingContext::new()
///     .bind_factory("messaging", InMemoryBroker::new())
///     .bind_queue("orders", "orders.v1");
///
/// assert_eq!(context.lookup_destination("orders").unwrap(), Destination::queue("orders.v1"));
/// assert_eq!(
///     context.lookup_destination("dynamicTopics/audit").unwrap(),
///     Destination::topic("audit")
/// );
/// assert!(context.lookup_destination("missing").is_err());
/// ```
#[derive(Clone, Default)]
pub struct NamingContext {
    factories: HashMap<String, Arc<dyn ConnectionFactory>>,
    destinations: HashMap<String, Destination>,
}

impl NamingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_factory(
        mut self,
        name: impl Into<String>,
        factory: impl ConnectionFactory + 'static,
    ) -> Self {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn bind_shared_factory(
        mut self,
        name: impl Into<String>,
        factory: Arc<dyn ConnectionFactory>,
    ) -> Self {
        self.factories.insert(name.into(), factory);
        self
    }

    pub fn bind_destination(mut self, name: impl Into<String>, destination: Destination) -> Self {
        self.destinations.insert(name.into(), destination);
        self
    }

    pub fn bind_queue(self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.bind_destination(name, Destination::queue(address))
    }

    pub fn bind_topic(self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.bind_destination(name, Destination::topic(address))
    }

    /// Names of all bound factories, sorted.
    pub fn factory_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }
}

impl Context for NamingContext {
    fn lookup_factory(&self, name: &str) -> Result<Arc<dyn ConnectionFactory>, ClientError> {
        self.factories
            .get(name)
            .cloned()
            .ok_or_else(|| ClientError::lookup("connection factory", name))
    }

    fn lookup_destination(&self, name: &str) -> Result<Destination, ClientError> {
        if let Some(destination) = self.destinations.get(name) {
            return Ok(destination.clone());
        }
        match (
            name.strip_prefix(DYNAMIC_QUEUE_PREFIX),
            name.strip_prefix(DYNAMIC_TOPIC_PREFIX),
        ) {
            (Some(address), _) if !address.is_empty() => Ok(Destination::queue(address)),
            (_, Some(address)) if !address.is_empty() => Ok(Destination::topic(address)),
            _ => Err(ClientError::lookup("destination", name)),
        }
    }
}

impl<T: Context + ?Sized> Context for Arc<T> {
    fn lookup_factory(&self, name: &str) -> Result<Arc<dyn ConnectionFactory>, ClientError> {
        (**self).lookup_factory(name)
    }

    fn lookup_destination(&self, name: &str) -> Result<Destination, ClientError> {
        (**self).lookup_destination(name)
    }
}
