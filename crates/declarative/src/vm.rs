//! Virtual machine lifecycle model
//!
//! A VM's remote state is a `VmInstance`; every lifecycle request is a
//! `VmOperation`. `VmInstance::transition` is pure: it either returns the
//! complete new instance or an error, never a half-applied one.

use crate::resource::Resource;
use crate::types::{ResourceId, ResourceKind};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Size used when a VM declaration does not name one
pub const DEFAULT_VM_SIZE: &str = "Standard_DS1_v2";

/// Power state of a virtual machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    #[default]
    Running,
    Stopped,
    /// Compute released, disks kept
    Deallocated,
    /// A provider-side operation is still in progress
    Transitioning,
}

impl PowerState {
    /// Status code in the provider's `PowerState/<state>` form
    pub fn code(&self) -> &'static str {
        match self {
            Self::Running => "PowerState/running",
            Self::Stopped => "PowerState/stopped",
            Self::Deallocated => "PowerState/deallocated",
            Self::Transitioning => "PowerState/updating",
        }
    }
}

impl fmt::Display for PowerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "VM running",
            Self::Stopped => "VM stopped",
            Self::Deallocated => "VM deallocated",
            Self::Transitioning => "VM updating",
        };
        f.write_str(s)
    }
}

/// Host caching mode for a data disk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CachingType {
    None,
    ReadOnly,
    #[default]
    ReadWrite,
}

impl fmt::Display for CachingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::None => "None",
            Self::ReadOnly => "ReadOnly",
            Self::ReadWrite => "ReadWrite",
        };
        f.write_str(s)
    }
}

impl FromStr for CachingType {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "none" => Ok(Self::None),
            "readonly" => Ok(Self::ReadOnly),
            "readwrite" => Ok(Self::ReadWrite),
            _ => Err(VmError::InvalidCaching(s.to_string())),
        }
    }
}

/// Marketplace image, written `publisher:offer:sku[:version]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub publisher: String,
    pub offer: String,
    pub sku: String,
    pub version: String,
}

impl FromStr for ImageReference {
    type Err = VmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.iter().any(|p| p.trim().is_empty()) {
            return Err(VmError::InvalidImage(s.to_string()));
        }
        match parts.as_slice() {
            [publisher, offer, sku] => Ok(Self {
                publisher: (*publisher).to_string(),
                offer: (*offer).to_string(),
                sku: (*sku).to_string(),
                version: "latest".to_string(),
            }),
            [publisher, offer, sku, version] => Ok(Self {
                publisher: (*publisher).to_string(),
                offer: (*offer).to_string(),
                sku: (*sku).to_string(),
                version: (*version).to_string(),
            }),
            _ => Err(VmError::InvalidImage(s.to_string())),
        }
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.publisher, self.offer, self.sku, self.version
        )
    }
}

/// A data disk attached to a VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDisk {
    pub name: String,
    pub lun: u32,
    pub size_gb: u32,
    pub caching: CachingType,
}

/// Remote state of a virtual machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmInstance {
    pub size: String,
    pub power: PowerState,
    pub computer_name: String,
    #[serde(default)]
    pub admin_username: Option<String>,
    #[serde(default)]
    pub image: Option<ImageReference>,
    pub os_disk: String,
    #[serde(default)]
    pub data_disks: Vec<DataDisk>,
    #[serde(default)]
    pub network_interfaces: Vec<ResourceId>,
    #[serde(default)]
    pub availability_set: Option<ResourceId>,
}

/// A lifecycle request against one VM
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum VmOperation {
    Start,
    Stop,
    Resize {
        size: String,
    },
    AttachDisk {
        lun: u32,
        size_gb: u32,
        #[serde(default)]
        caching: CachingType,
    },
    Deallocate,
}

impl fmt::Display for VmOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => f.write_str("start"),
            Self::Stop => f.write_str("stop"),
            Self::Resize { size } => write!(f, "resize to {size}"),
            Self::AttachDisk {
                lun,
                size_gb,
                caching,
            } => write!(f, "attach {size_gb} GB data disk at LUN {lun} ({caching})"),
            Self::Deallocate => f.write_str("deallocate"),
        }
    }
}

/// Rejected VM declaration or transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VmError {
    #[error("VM is mid-transition; retry once the current operation finishes")]
    Transitioning,

    #[error("LUN {0} is already in use")]
    LunInUse(u32),

    #[error("data disk size must be greater than zero")]
    EmptyDisk,

    #[error("VM size must not be empty")]
    EmptySize,

    #[error("invalid image reference '{0}', expected publisher:offer:sku[:version]")]
    InvalidImage(String),

    #[error("invalid caching type '{0}', expected none, read_only or read_write")]
    InvalidCaching(String),

    #[error("virtual machine requires at least one network interface dependency")]
    MissingNetworkInterface,
}

impl VmInstance {
    /// Desired instance for a VM declaration and its resolved dependencies
    pub fn from_resource(
        resource: &Resource,
        dependencies: &[ResourceId],
    ) -> Result<Self, VmError> {
        let size = resource.attr_str("size").unwrap_or(DEFAULT_VM_SIZE);
        if size.trim().is_empty() {
            return Err(VmError::EmptySize);
        }

        let image = resource
            .attr_str("image")
            .map(str::parse::<ImageReference>)
            .transpose()?;

        let network_interfaces: Vec<ResourceId> = dependencies
            .iter()
            .filter(|d| d.kind == ResourceKind::NetworkInterface)
            .cloned()
            .collect();
        if network_interfaces.is_empty() {
            return Err(VmError::MissingNetworkInterface);
        }

        let availability_set = dependencies
            .iter()
            .find(|d| d.kind == ResourceKind::AvailabilitySet)
            .cloned();

        let computer_name = resource
            .attr_str("computer_name")
            .unwrap_or_else(|| resource.name())
            .to_string();

        Ok(Self {
            size: size.to_string(),
            power: PowerState::Running,
            os_disk: format!("{}_OsDisk_1", resource.name()),
            computer_name,
            admin_username: resource.attr_str("admin_username").map(str::to_string),
            image,
            data_disks: Vec::new(),
            network_interfaces,
            availability_set,
        })
    }

    /// Converge this instance onto a new desired configuration
    ///
    /// Declared properties win; runtime state (power, attached disks,
    /// OS disk name) is kept.
    pub fn converge(&self, desired: Self) -> Self {
        Self {
            power: self.power,
            data_disks: self.data_disks.clone(),
            os_disk: self.os_disk.clone(),
            ..desired
        }
    }

    /// Apply a lifecycle operation, returning the complete new instance
    pub fn transition(&self, op: &VmOperation) -> Result<Self, VmError> {
        if self.power == PowerState::Transitioning && *op != VmOperation::Deallocate {
            return Err(VmError::Transitioning);
        }

        let mut next = self.clone();
        match op {
            VmOperation::Start => next.power = PowerState::Running,
            VmOperation::Stop => {
                if self.power == PowerState::Running {
                    next.power = PowerState::Stopped;
                }
            }
            VmOperation::Resize { size } => {
                if size.trim().is_empty() {
                    return Err(VmError::EmptySize);
                }
                next.size.clone_from(size);
            }
            VmOperation::AttachDisk {
                lun,
                size_gb,
                caching,
            } => {
                if *size_gb == 0 {
                    return Err(VmError::EmptyDisk);
                }
                if self.data_disks.iter().any(|d| d.lun == *lun) {
                    return Err(VmError::LunInUse(*lun));
                }
                next.data_disks.push(DataDisk {
                    name: format!("{}_DataDisk_{}", self.computer_name, lun),
                    lun: *lun,
                    size_gb: *size_gb,
                    caching: *caching,
                });
            }
            VmOperation::Deallocate => next.power = PowerState::Deallocated,
        }
        Ok(next)
    }
}
