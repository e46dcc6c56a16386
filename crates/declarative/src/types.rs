//! Core types for declarative resource provisioning

use crate::error::{Error, RemoteError};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Category of a managed cloud resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    ResourceGroup,
    AvailabilitySet,
    PublicIp,
    VirtualNetwork,
    NetworkInterface,
    VirtualMachine,
    Disk,
}

impl ResourceKind {
    /// Canonical snake_case name, as used in declaration files
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "resource_group",
            Self::AvailabilitySet => "availability_set",
            Self::PublicIp => "public_ip",
            Self::VirtualNetwork => "virtual_network",
            Self::NetworkInterface => "network_interface",
            Self::VirtualMachine => "virtual_machine",
            Self::Disk => "disk",
        }
    }

    /// Human-readable label
    pub fn label(&self) -> &'static str {
        match self {
            Self::ResourceGroup => "Resource group",
            Self::AvailabilitySet => "Availability set",
            Self::PublicIp => "Public IP address",
            Self::VirtualNetwork => "Virtual network",
            Self::NetworkInterface => "Network interface",
            Self::VirtualMachine => "Virtual machine",
            Self::Disk => "Managed disk",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "resource_group" | "group" | "rg" => Self::ResourceGroup,
            "availability_set" | "avset" => Self::AvailabilitySet,
            "public_ip" | "public_ip_address" | "pip" => Self::PublicIp,
            "virtual_network" | "vnet" | "network" => Self::VirtualNetwork,
            "network_interface" | "nic" => Self::NetworkInterface,
            "virtual_machine" | "vm" => Self::VirtualMachine,
            "disk" | "managed_disk" => Self::Disk,
            _ => return Err(Error::Declaration(format!("unknown resource kind '{s}'"))),
        };
        Ok(kind)
    }
}

/// Identity of a resource: `(kind, name)`, rendered as `kind/name`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceId {
    pub kind: ResourceKind,
    pub name: String,
}

impl ResourceId {
    pub fn new(kind: ResourceKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

impl FromStr for ResourceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, name) = s
            .split_once('/')
            .ok_or_else(|| Error::Declaration(format!("expected 'kind/name', got '{s}'")))?;
        if name.is_empty() {
            return Err(Error::Declaration(format!("missing name in '{s}'")));
        }
        Ok(Self::new(kind.parse()?, name))
    }
}

/// A dependency reference as written by the caller
///
/// Either a full `kind/name` identifier or a bare name. A bare name must
/// match exactly one declared resource when the graph is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResourceRef {
    Id(ResourceId),
    Name(String),
}

impl ResourceRef {
    /// The name part of the reference
    pub fn name(&self) -> &str {
        match self {
            Self::Id(id) => &id.name,
            Self::Name(name) => name,
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => id.fmt(f),
            Self::Name(name) => f.write_str(name),
        }
    }
}

impl FromStr for ResourceRef {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Declaration("empty dependency reference".into()));
        }
        if s.contains('/') {
            Ok(Self::Id(s.parse()?))
        } else {
            Ok(Self::Name(s.to_string()))
        }
    }
}

impl TryFrom<String> for ResourceRef {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceRef> for String {
    fn from(value: ResourceRef) -> Self {
        value.to_string()
    }
}

impl From<ResourceId> for ResourceRef {
    fn from(id: ResourceId) -> Self {
        Self::Id(id)
    }
}

impl From<&ResourceId> for ResourceRef {
    fn from(id: &ResourceId) -> Self {
        Self::Id(id.clone())
    }
}

/// Runtime state of a resource, written only by the executor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    #[default]
    NotCreated,
    Creating,
    Created,
    Failed,
    Deleting,
    Deleted,
}

impl ResourceState {
    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }

    /// A request is in flight for this resource
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Creating | Self::Deleting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotCreated => "not created",
            Self::Creating => "creating",
            Self::Created => "created",
            Self::Failed => "failed",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final state of one plan slot after execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceOutcome {
    pub id: ResourceId,
    pub state: ResourceState,
    /// Last provider error, set when `state` is `Failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}
