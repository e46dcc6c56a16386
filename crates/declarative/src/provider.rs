//! Provider trait and an in-memory provider
//!
//! The orchestrator never talks to a cloud directly. It drives a
//! `Provider`, which it treats as a slow, fallible remote service.

use crate::context::lock;
use crate::error::RemoteError;
use crate::resource::{Attributes, Resource};
use crate::types::{ResourceId, ResourceKind};
use crate::vm::{VmInstance, VmOperation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Remote view of a resource
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteResource {
    pub id: ResourceId,
    #[serde(default)]
    pub attributes: Attributes,
    /// Resources this one references on the provider side
    #[serde(default)]
    pub dependencies: Vec<ResourceId>,
    pub provisioning_state: String,
    /// Present for virtual machines
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vm: Option<VmInstance>,
}

/// Result of a delete request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// Nothing to delete; still a success
    AlreadyAbsent,
}

/// External provider client
///
/// Every call may block on the network and may fail. Authentication is
/// the implementation's concern.
pub trait Provider: Send + Sync {
    /// Converge a remote resource to the declared configuration
    ///
    /// Must be a no-op when the resource already matches.
    fn create_or_update(
        &self,
        resource: &Resource,
        dependencies: &[ResourceId],
    ) -> Result<RemoteResource, RemoteError>;

    /// Read a resource; `Ok(None)` when it does not exist
    fn get(&self, id: &ResourceId) -> Result<Option<RemoteResource>, RemoteError>;

    /// Delete a resource; deleting an absent resource succeeds
    fn delete(&self, id: &ResourceId) -> Result<DeleteOutcome, RemoteError>;

    /// Run a lifecycle operation against an existing virtual machine
    fn transition(&self, id: &ResourceId, op: &VmOperation) -> Result<VmInstance, RemoteError>;
}

/// A request seen by `MemoryProvider`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderCall {
    CreateOrUpdate(ResourceId),
    Get(ResourceId),
    Delete(ResourceId),
    Transition(ResourceId, VmOperation),
}

/// Serializable contents of a `MemoryProvider`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CloudSnapshot {
    #[serde(default)]
    pub resources: Vec<RemoteResource>,
}

/// In-process cloud with referential integrity
///
/// - create fails with `NotFound` when a dependency does not exist
/// - delete fails with `Conflict` while another resource references the target
/// - delete of an absent resource reports `AlreadyAbsent`
#[derive(Debug, Default)]
pub struct MemoryProvider {
    resources: Mutex<BTreeMap<ResourceId, RemoteResource>>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: CloudSnapshot) -> Self {
        let resources = snapshot
            .resources
            .into_iter()
            .map(|r| (r.id.clone(), r))
            .collect();
        Self {
            resources: Mutex::new(resources),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn snapshot(&self) -> CloudSnapshot {
        CloudSnapshot {
            resources: lock(&self.resources).values().cloned().collect(),
        }
    }

    /// Every request received so far, in arrival order
    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.calls).clone()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        lock(&self.resources).contains_key(id)
    }

    pub fn len(&self) -> usize {
        lock(&self.resources).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.resources).is_empty()
    }

    /// Drop a resource without any checks, as if removed out-of-band
    pub fn remove_out_of_band(&self, id: &ResourceId) -> Option<RemoteResource> {
        lock(&self.resources).remove(id)
    }

    fn record(&self, call: ProviderCall) {
        lock(&self.calls).push(call);
    }
}

impl Provider for MemoryProvider {
    fn create_or_update(
        &self,
        resource: &Resource,
        dependencies: &[ResourceId],
    ) -> Result<RemoteResource, RemoteError> {
        self.record(ProviderCall::CreateOrUpdate(resource.id.clone()));
        let mut resources = lock(&self.resources);

        if let Some(missing) = dependencies.iter().find(|d| !resources.contains_key(*d)) {
            return Err(RemoteError::not_found(
                &resource.id,
                format!("dependency {missing} does not exist"),
            ));
        }

        let vm = if resource.kind() == ResourceKind::VirtualMachine {
            let desired = VmInstance::from_resource(resource, dependencies)
                .map_err(|e| RemoteError::validation(&resource.id, e.to_string()))?;
            let current = resources.get(&resource.id).and_then(|r| r.vm.as_ref());
            Some(match current {
                Some(current) => current.converge(desired),
                None => desired,
            })
        } else {
            None
        };

        let remote = RemoteResource {
            id: resource.id.clone(),
            attributes: resource.attributes.clone(),
            dependencies: dependencies.to_vec(),
            provisioning_state: "Succeeded".to_string(),
            vm,
        };

        match resources.get(&resource.id) {
            Some(existing) if *existing == remote => {
                log::debug!("{} already up to date", resource.id);
            }
            Some(_) => log::debug!("Updated {}", resource.id),
            None => log::debug!("Created {}", resource.id),
        }

        resources.insert(resource.id.clone(), remote.clone());
        Ok(remote)
    }

    fn get(&self, id: &ResourceId) -> Result<Option<RemoteResource>, RemoteError> {
        self.record(ProviderCall::Get(id.clone()));
        Ok(lock(&self.resources).get(id).cloned())
    }

    fn delete(&self, id: &ResourceId) -> Result<DeleteOutcome, RemoteError> {
        self.record(ProviderCall::Delete(id.clone()));
        let mut resources = lock(&self.resources);

        if !resources.contains_key(id) {
            return Ok(DeleteOutcome::AlreadyAbsent);
        }

        if let Some(user) = resources
            .values()
            .find(|r| r.dependencies.contains(id))
        {
            return Err(RemoteError::conflict(
                id,
                format!("still referenced by {}", user.id),
            ));
        }

        resources.remove(id);
        Ok(DeleteOutcome::Deleted)
    }

    fn transition(&self, id: &ResourceId, op: &VmOperation) -> Result<VmInstance, RemoteError> {
        self.record(ProviderCall::Transition(id.clone(), op.clone()));
        let mut resources = lock(&self.resources);

        let remote = resources
            .get_mut(id)
            .ok_or_else(|| RemoteError::not_found(id, "virtual machine does not exist"))?;
        let current = remote
            .vm
            .as_ref()
            .ok_or_else(|| RemoteError::validation(id, "not a virtual machine"))?;

        let next = current
            .transition(op)
            .map_err(|e| RemoteError::validation(id, e.to_string()))?;
        remote.vm = Some(next.clone());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::PowerState;

    fn group() -> Resource {
        Resource::new(ResourceKind::ResourceGroup, "g").with_attr("region", "westus2")
    }

    fn nic_id() -> ResourceId {
        ResourceId::new(ResourceKind::NetworkInterface, "nic")
    }

    fn with_vm(provider: &MemoryProvider) -> ResourceId {
        let g = group();
        provider.create_or_update(&g, &[]).unwrap();
        let nic = Resource::new(ResourceKind::NetworkInterface, "nic");
        provider.create_or_update(&nic, &[g.id.clone()]).unwrap();
        let vm = Resource::new(ResourceKind::VirtualMachine, "vm");
        provider
            .create_or_update(&vm, &[g.id.clone(), nic_id()])
            .unwrap();
        vm.id
    }

    #[test]
    fn test_create_requires_dependencies() {
        let provider = MemoryProvider::new();
        let net = Resource::new(ResourceKind::VirtualNetwork, "n");
        let err = provider.create_or_update(&net, &[group().id]).unwrap_err();
        assert_eq!(err.kind, crate::error::RemoteErrorKind::NotFound);
        assert!(provider.is_empty());
    }

    #[test]
    fn test_create_or_update_is_idempotent() {
        let provider = MemoryProvider::new();
        let first = provider.create_or_update(&group(), &[]).unwrap();
        let second = provider.create_or_update(&group(), &[]).unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.len(), 1);
    }

    #[test]
    fn test_delete_conflicts_while_referenced() {
        let provider = MemoryProvider::new();
        let vm = with_vm(&provider);

        let err = provider.delete(&nic_id()).unwrap_err();
        assert_eq!(err.kind, crate::error::RemoteErrorKind::Conflict);
        assert!(provider.contains(&nic_id()));

        assert_eq!(provider.delete(&vm).unwrap(), DeleteOutcome::Deleted);
        assert_eq!(provider.delete(&nic_id()).unwrap(), DeleteOutcome::Deleted);
    }

    #[test]
    fn test_delete_absent_is_success() {
        let provider = MemoryProvider::new();
        assert_eq!(
            provider.delete(&group().id).unwrap(),
            DeleteOutcome::AlreadyAbsent
        );
    }

    #[test]
    fn test_transition_updates_vm() {
        let provider = MemoryProvider::new();
        let vm = with_vm(&provider);
        let stopped = provider.transition(&vm, &VmOperation::Stop).unwrap();
        assert_eq!(stopped.power, PowerState::Stopped);
        let remote = provider.get(&vm).unwrap().unwrap();
        assert_eq!(remote.vm.unwrap().power, PowerState::Stopped);
    }

    #[test]
    fn test_failed_transition_leaves_vm_unchanged() {
        let provider = MemoryProvider::new();
        let vm = with_vm(&provider);
        let before = provider.get(&vm).unwrap().unwrap();
        let err = provider
            .transition(&vm, &VmOperation::Resize { size: " ".into() })
            .unwrap_err();
        assert_eq!(err.kind, crate::error::RemoteErrorKind::Validation);
        assert_eq!(provider.get(&vm).unwrap().unwrap(), before);
    }

    #[test]
    fn test_transition_rejects_non_vm() {
        let provider = MemoryProvider::new();
        provider.create_or_update(&group(), &[]).unwrap();
        assert!(provider.transition(&group().id, &VmOperation::Start).is_err());
    }

    #[test]
    fn test_reapply_keeps_vm_runtime_state() {
        let provider = MemoryProvider::new();
        let vm = with_vm(&provider);
        provider.transition(&vm, &VmOperation::Deallocate).unwrap();

        let decl = Resource::new(ResourceKind::VirtualMachine, "vm");
        let remote = provider
            .create_or_update(&decl, &[group().id, nic_id()])
            .unwrap();
        assert_eq!(remote.vm.unwrap().power, PowerState::Deallocated);
    }

    #[test]
    fn test_snapshot_round_trip_preserves_resources() {
        let provider = MemoryProvider::new();
        with_vm(&provider);
        let restored = MemoryProvider::from_snapshot(provider.snapshot());
        assert_eq!(restored.len(), 3);
        assert!(restored.calls().is_empty());
    }

    #[test]
    fn test_calls_are_recorded_in_order() {
        let provider = MemoryProvider::new();
        provider.create_or_update(&group(), &[]).unwrap();
        provider.delete(&group().id).unwrap();
        assert_eq!(
            provider.calls(),
            vec![
                ProviderCall::CreateOrUpdate(group().id),
                ProviderCall::Delete(group().id),
            ]
        );
    }
}
