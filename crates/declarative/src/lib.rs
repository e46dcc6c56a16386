//! # Declarative
//!
//! Declarative provisioning of interdependent cloud resources.
//!
//! Resources are declared with their configuration and the resources they
//! depend on. The crate validates the declarations into a graph, orders
//! them so every dependency exists before its dependents, and drives a
//! [`Provider`] until the remote side matches. Teardown walks the same
//! order backwards.
//!
//! ## Core Concepts
//!
//! - **Resource**: A declared resource with attributes and dependencies
//! - **ResourceGraph**: Validated declarations with resolved edges
//! - **ExecutionPlan**: Dependency-first (or dependents-first) order
//! - **Executor**: Runs a plan against a provider, optionally level by level
//! - **VmInstance**: Pure lifecycle model for virtual machines
//!
//! ## Example
//!
//! ```
//! use declarative::{
//!     ExecuteOptions, MemoryProvider, Resource, ResourceGraph, ResourceKind, apply_simple,
//! };
//!
//! let graph = ResourceGraph::build(vec![
//!     Resource::new(ResourceKind::ResourceGroup, "myResourceGroup")
//!         .with_attr("region", "westus2"),
//!     Resource::new(ResourceKind::VirtualNetwork, "myVNet").depends_on_name("myResourceGroup"),
//! ])?;
//!
//! let provider = MemoryProvider::new();
//! let report = apply_simple(&graph, &provider, &ExecuteOptions::default())?;
//! assert!(report.is_success());
//! # Ok::<(), declarative::Error>(())
//! ```
//!
//! ## Provider Traits
//!
//! The crate uses traits for dependency injection:
//!
//! - [`Provider`]: The remote service resources are created in
//! - [`ProgressCallback`]: Receives progress updates
//! - [`ConfirmCallback`]: Handles user confirmations
//!
//! This keeps the crate free of any terminal or network dependency.

pub mod context;
pub mod error;
pub mod executor;
pub mod graph;
pub mod planner;
pub mod provider;
pub mod record;
pub mod resource;
pub mod retry;
pub mod types;
pub mod vm;

pub use context::{
    AutoConfirm, AutoDecline, CancelToken, ConfirmCallback, NoProgress, PlanProgress,
    ProgressCallback,
};
pub use error::{Error, RemoteError, RemoteErrorKind, Result};
pub use executor::{
    ApplyReport, DestroyReport, ExecuteOptions, apply, apply_simple, destroy, destroy_simple,
    inspect, vm_operation,
};
pub use graph::{MAX_NAME_LEN, ResourceGraph};
pub use planner::{Direction, ExecutionPlan, PlanStep, plan_apply, plan_destroy};
pub use provider::{
    CloudSnapshot, DeleteOutcome, MemoryProvider, Provider, ProviderCall, RemoteResource,
};
pub use record::ApplyRecord;
pub use resource::{Attributes, Resource};
pub use retry::{RetryConfig, with_retry};
pub use types::{ResourceId, ResourceKind, ResourceOutcome, ResourceRef, ResourceState};
pub use vm::{
    CachingType, DataDisk, ImageReference, PowerState, VmError, VmInstance, VmOperation,
};
