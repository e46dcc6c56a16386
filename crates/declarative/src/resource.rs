//! Resource declarations
//!
//! A Resource is what the caller wants to exist: an identity, a desired
//! configuration and the resources it needs first.

use crate::types::{ResourceId, ResourceKind, ResourceRef};
use serde_json::Value;
use std::collections::BTreeMap;

/// Desired configuration, property name to value
pub type Attributes = BTreeMap<String, Value>;

/// A declared resource
///
/// # Example
///
/// ```
/// use declarative::{Resource, ResourceId, ResourceKind};
///
/// let group = Resource::new(ResourceKind::ResourceGroup, "myResourceGroup")
///     .with_attr("region", "westus2");
/// let vnet = Resource::new(ResourceKind::VirtualNetwork, "myVNet")
///     .with_attr("address_space", "10.0.0.0/16")
///     .depends_on(group.id.clone());
///
/// assert_eq!(vnet.depends_on.len(), 1);
/// assert_eq!(group.attr_str("region"), Some("westus2"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: Attributes,
    pub depends_on: Vec<ResourceRef>,
}

impl Resource {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(kind, name),
            attributes: Attributes::new(),
            depends_on: Vec::new(),
        }
    }

    /// Set a desired property
    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Add a dependency
    pub fn depends_on(mut self, dependency: impl Into<ResourceRef>) -> Self {
        self.depends_on.push(dependency.into());
        self
    }

    /// Add a dependency by bare name
    pub fn depends_on_name(mut self, name: impl Into<String>) -> Self {
        self.depends_on.push(ResourceRef::Name(name.into()));
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.id.kind
    }

    pub fn name(&self) -> &str {
        &self.id.name
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// String-valued property, if present and a string
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attr(key).and_then(Value::as_str)
    }

    /// Region the resource lives in, if declared
    pub fn region(&self) -> Option<&str> {
        self.attr_str("region").or_else(|| self.attr_str("location"))
    }
}
