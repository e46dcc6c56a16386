//! Execution engine - drives plans against a provider
//!
//! Apply walks the plan dependency-first and halts at the first failure.
//! Destroy walks it in reverse and keeps going past failures, skipping only
//! what a failed deletion still holds on to.

use crate::context::{
    AutoConfirm, CancelToken, ConfirmCallback, NoProgress, PlanProgress, ProgressCallback, lock,
};
use crate::error::{Error, RemoteError, Result};
use crate::graph::ResourceGraph;
use crate::planner::{Direction, ExecutionPlan, plan_apply};
use crate::provider::{DeleteOutcome, Provider, RemoteResource};
use crate::retry::{RetryConfig, with_retry};
use crate::types::{ResourceId, ResourceKind, ResourceOutcome, ResourceState};
use crate::vm::{VmInstance, VmOperation};
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Mutex;

/// Options for execution
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Worker threads; 1 runs the plan strictly sequentially
    pub jobs: usize,
    /// Retry policy for every provider call
    pub retry: RetryConfig,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            jobs: 1,
            retry: RetryConfig::default(),
        }
    }
}

/// What an apply run did, slot by slot
#[derive(Debug, Clone)]
pub struct ApplyReport {
    pub plan: ExecutionPlan,
    /// One outcome per plan slot, in plan order
    pub outcomes: Vec<ResourceOutcome>,
    /// The run was cancelled before every slot was attempted
    pub cancelled: bool,
}

impl ApplyReport {
    /// Every resource reached `Created`
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.outcomes.iter().all(|o| o.state.is_created())
    }

    pub fn state_of(&self, id: &ResourceId) -> Option<ResourceState> {
        self.outcomes.iter().find(|o| &o.id == id).map(|o| o.state)
    }

    pub fn succeeded(&self) -> Vec<&ResourceId> {
        self.ids_in(ResourceState::Created)
    }

    pub fn failed(&self) -> Vec<&ResourceOutcome> {
        self.outcomes.iter().filter(|o| o.state.is_failed()).collect()
    }

    /// Resources no request was ever issued for
    pub fn unattempted(&self) -> Vec<&ResourceId> {
        self.ids_in(ResourceState::NotCreated)
    }

    fn ids_in(&self, state: ResourceState) -> Vec<&ResourceId> {
        self.outcomes
            .iter()
            .filter(|o| o.state == state)
            .map(|o| &o.id)
            .collect()
    }
}

impl fmt::Display for ApplyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} created", self.succeeded().len())?;
        let failed: Vec<&ResourceId> = self.failed().into_iter().map(|o| &o.id).collect();
        if !failed.is_empty() {
            write!(f, ", {} failed ({})", failed.len(), join_ids(&failed))?;
        }
        let unattempted = self.unattempted();
        if !unattempted.is_empty() {
            write!(
                f,
                ", {} not attempted ({})",
                unattempted.len(),
                join_ids(&unattempted)
            )?;
        }
        if self.cancelled {
            f.write_str(", cancelled")?;
        }
        Ok(())
    }
}

/// What a destroy run did, slot by slot
#[derive(Debug, Clone)]
pub struct DestroyReport {
    pub plan: ExecutionPlan,
    /// One outcome per plan slot, in plan order
    pub outcomes: Vec<ResourceOutcome>,
    /// Resources skipped because a failed deletion still references them
    pub blocked: Vec<ResourceId>,
    pub cancelled: bool,
}

impl DestroyReport {
    /// Every resource reached `Deleted`
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.outcomes.iter().all(|o| o.state == ResourceState::Deleted)
    }

    pub fn state_of(&self, id: &ResourceId) -> Option<ResourceState> {
        self.outcomes.iter().find(|o| &o.id == id).map(|o| o.state)
    }

    pub fn deleted(&self) -> Vec<&ResourceId> {
        self.outcomes
            .iter()
            .filter(|o| o.state == ResourceState::Deleted)
            .map(|o| &o.id)
            .collect()
    }

    pub fn failed(&self) -> Vec<&ResourceOutcome> {
        self.outcomes.iter().filter(|o| o.state.is_failed()).collect()
    }
}

impl fmt::Display for DestroyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} deleted", self.deleted().len())?;
        let failed: Vec<&ResourceId> = self.failed().into_iter().map(|o| &o.id).collect();
        if !failed.is_empty() {
            write!(f, ", {} failed ({})", failed.len(), join_ids(&failed))?;
        }
        if !self.blocked.is_empty() {
            let blocked: Vec<&ResourceId> = self.blocked.iter().collect();
            write!(f, ", {} blocked ({})", blocked.len(), join_ids(&blocked))?;
        }
        if self.cancelled {
            f.write_str(", cancelled")?;
        }
        Ok(())
    }
}

fn join_ids(ids: &[&ResourceId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Drive every declared resource to `Created`
///
/// Plans first, so declaration and cycle errors surface before any
/// remote call. The first failed resource halts the run; resources
/// behind it stay `NotCreated`. Anything short of full success comes
/// back as `Error::PartialApply` carrying the report.
pub fn apply<P, G>(
    graph: &ResourceGraph,
    provider: &P,
    opts: &ExecuteOptions,
    progress: &G,
    cancel: &CancelToken,
) -> Result<ApplyReport>
where
    P: Provider + ?Sized,
    G: ProgressCallback + ?Sized,
{
    let plan = plan_apply(graph)?;
    log::info!("Applying {} resources", plan.len());

    let tracker = PlanProgress::new(&plan, ResourceState::NotCreated);
    progress.on_plan_start(plan.len(), Direction::Apply);

    if opts.jobs <= 1 {
        for slot in 0..plan.len() {
            if cancel.is_cancelled() {
                log::warn!("Apply cancelled, no further requests will be issued");
                break;
            }
            if !create_slot(graph, &plan, slot, provider, &opts.retry, progress, &tracker) {
                break;
            }
        }
    } else {
        let pool = thread_pool(opts.jobs)?;
        for level in plan.levels() {
            if cancel.is_cancelled() {
                log::warn!("Apply cancelled, no further requests will be issued");
                break;
            }
            pool.install(|| {
                level.par_iter().for_each(|&slot| {
                    if !cancel.is_cancelled() {
                        create_slot(graph, &plan, slot, provider, &opts.retry, progress, &tracker);
                    }
                });
            });
            if tracker.any_failed() {
                break;
            }
        }
    }

    progress.on_plan_complete();

    let outcomes = tracker.into_outcomes();
    let cancelled = cancel.is_cancelled()
        && outcomes
            .iter()
            .any(|o| o.state == ResourceState::NotCreated);
    let report = ApplyReport {
        plan,
        outcomes,
        cancelled,
    };

    if report.is_success() {
        log::info!("Apply complete: {report}");
        Ok(report)
    } else {
        log::warn!("Apply incomplete: {report}");
        Err(Error::PartialApply(Box::new(report)))
    }
}

/// Apply without progress reporting or cancellation
pub fn apply_simple<P: Provider + ?Sized>(
    graph: &ResourceGraph,
    provider: &P,
    opts: &ExecuteOptions,
) -> Result<ApplyReport> {
    apply(graph, provider, opts, &NoProgress, &CancelToken::new())
}

fn create_slot<P, G>(
    graph: &ResourceGraph,
    plan: &ExecutionPlan,
    slot: usize,
    provider: &P,
    retry: &RetryConfig,
    progress: &G,
    tracker: &PlanProgress,
) -> bool
where
    P: Provider + ?Sized,
    G: ProgressCallback + ?Sized,
{
    let step = &plan.steps()[slot];
    let Some(resource) = graph.get(&step.id) else {
        tracker.fail(slot, RemoteError::validation(&step.id, "resource is not declared"));
        progress.on_resource_complete(&step.id, ResourceState::Failed);
        return false;
    };

    tracker.set(slot, ResourceState::Creating);
    progress.on_resource_start(&step.id, ResourceState::Creating);
    log::info!("Creating {}", step.id);

    let ok = match with_retry(retry, || provider.create_or_update(resource, &step.depends_on)) {
        Ok(_) => {
            tracker.set(slot, ResourceState::Created);
            true
        }
        Err(e) => {
            log::error!("Failed to create {}: {}", step.id, e);
            tracker.fail(slot, e);
            false
        }
    };

    progress.on_resource_complete(&step.id, tracker.state(slot));
    ok
}

/// Tear down every resource in a plan, dependents first
///
/// An apply-direction plan is reversed before use. The confirm callback
/// is asked once; declining returns `Error::Aborted` with no remote
/// call made. A failed deletion does not stop the run: the resources it
/// still references are reported as blocked and everything else is
/// still attempted.
pub fn destroy<P, G, C>(
    plan: ExecutionPlan,
    provider: &P,
    opts: &ExecuteOptions,
    progress: &G,
    confirm: &mut C,
    cancel: &CancelToken,
) -> Result<DestroyReport>
where
    P: Provider + ?Sized,
    G: ProgressCallback + ?Sized,
    C: ConfirmCallback + ?Sized,
{
    let plan = match plan.direction() {
        Direction::Destroy => plan,
        Direction::Apply => plan.reversed(),
    };

    if plan.is_empty() {
        return Ok(DestroyReport {
            plan,
            outcomes: Vec::new(),
            blocked: Vec::new(),
            cancelled: false,
        });
    }

    let prompt = format!(
        "Destroy {} resources? This cannot be undone.",
        plan.len()
    );
    if !confirm.confirm(&prompt) {
        log::info!("Destroy declined");
        return Err(Error::Aborted);
    }

    log::info!("Destroying {} resources", plan.len());
    let tracker = PlanProgress::new(&plan, ResourceState::Created);
    let blocked: Mutex<HashSet<ResourceId>> = Mutex::new(HashSet::new());
    progress.on_plan_start(plan.len(), Direction::Destroy);

    if opts.jobs <= 1 {
        for slot in 0..plan.len() {
            if cancel.is_cancelled() {
                log::warn!("Destroy cancelled, no further requests will be issued");
                break;
            }
            delete_slot(&plan, slot, provider, &opts.retry, progress, &tracker, &blocked);
        }
    } else {
        let pool = thread_pool(opts.jobs)?;
        for level in plan.levels() {
            if cancel.is_cancelled() {
                log::warn!("Destroy cancelled, no further requests will be issued");
                break;
            }
            pool.install(|| {
                level.par_iter().for_each(|&slot| {
                    if !cancel.is_cancelled() {
                        delete_slot(
                            &plan,
                            slot,
                            provider,
                            &opts.retry,
                            progress,
                            &tracker,
                            &blocked,
                        );
                    }
                });
            });
        }
    }

    progress.on_plan_complete();

    let outcomes = tracker.into_outcomes();
    let blocked_set = match blocked.into_inner() {
        Ok(set) => set,
        Err(poisoned) => poisoned.into_inner(),
    };
    let blocked: Vec<ResourceId> = outcomes
        .iter()
        .filter(|o| o.state != ResourceState::Deleted && blocked_set.contains(&o.id))
        .map(|o| o.id.clone())
        .collect();
    let cancelled = cancel.is_cancelled()
        && outcomes
            .iter()
            .any(|o| o.state == ResourceState::Created && !blocked.contains(&o.id));

    let report = DestroyReport {
        plan,
        outcomes,
        blocked,
        cancelled,
    };

    if report.is_success() {
        log::info!("Destroy complete: {report}");
        Ok(report)
    } else {
        log::warn!("Destroy incomplete: {report}");
        Err(Error::PartialDestroy(Box::new(report)))
    }
}

/// Destroy without progress reporting, confirmation or cancellation
pub fn destroy_simple<P: Provider + ?Sized>(
    plan: ExecutionPlan,
    provider: &P,
    opts: &ExecuteOptions,
) -> Result<DestroyReport> {
    destroy(
        plan,
        provider,
        opts,
        &NoProgress,
        &mut AutoConfirm,
        &CancelToken::new(),
    )
}

fn delete_slot<P, G>(
    plan: &ExecutionPlan,
    slot: usize,
    provider: &P,
    retry: &RetryConfig,
    progress: &G,
    tracker: &PlanProgress,
    blocked: &Mutex<HashSet<ResourceId>>,
) where
    P: Provider + ?Sized,
    G: ProgressCallback + ?Sized,
{
    let step = &plan.steps()[slot];
    if lock(blocked).contains(&step.id) {
        log::warn!(
            "Skipping {}: still referenced by a resource that failed to delete",
            step.id
        );
        return;
    }

    tracker.set(slot, ResourceState::Deleting);
    progress.on_resource_start(&step.id, ResourceState::Deleting);
    log::info!("Deleting {}", step.id);

    match with_retry(retry, || provider.delete(&step.id)) {
        Ok(DeleteOutcome::Deleted) => tracker.set(slot, ResourceState::Deleted),
        Ok(DeleteOutcome::AlreadyAbsent) => {
            log::info!("{} was already absent", step.id);
            tracker.set(slot, ResourceState::Deleted);
        }
        Err(e) => {
            log::error!("Failed to delete {}: {}", step.id, e);
            tracker.fail(slot, e);
            let held = transitive_dependencies(plan, &step.id);
            lock(blocked).extend(held);
        }
    }

    progress.on_resource_complete(&step.id, tracker.state(slot));
}

/// Everything `id` depends on, directly or indirectly, within the plan
fn transitive_dependencies(plan: &ExecutionPlan, id: &ResourceId) -> HashSet<ResourceId> {
    let deps_of: HashMap<&ResourceId, &[ResourceId]> = plan
        .steps()
        .iter()
        .map(|s| (&s.id, s.depends_on.as_slice()))
        .collect();

    let mut seen = HashSet::new();
    let mut stack: Vec<&ResourceId> = deps_of
        .get(id)
        .map(|d| d.iter().collect())
        .unwrap_or_default();
    while let Some(dep) = stack.pop() {
        if seen.insert(dep.clone()) {
            if let Some(next) = deps_of.get(dep) {
                stack.extend(next.iter());
            }
        }
    }
    seen
}

fn thread_pool(jobs: usize) -> Result<rayon::ThreadPool> {
    Ok(rayon::ThreadPoolBuilder::new().num_threads(jobs).build()?)
}

/// Run a lifecycle operation on a created virtual machine
///
/// `recorded` is the state the caller last recorded for the VM; anything
/// but `Created` is rejected before a request is made. Attaching a disk
/// is not idempotent, so it is never retried.
pub fn vm_operation<P: Provider + ?Sized>(
    graph: &ResourceGraph,
    id: &ResourceId,
    recorded: ResourceState,
    provider: &P,
    op: &VmOperation,
    retry: &RetryConfig,
) -> Result<VmInstance> {
    let resource = graph
        .get(id)
        .ok_or_else(|| Error::Declaration(format!("{id} is not declared")))?;

    if resource.kind() != ResourceKind::VirtualMachine {
        return Err(Error::InvalidTransition {
            resource: id.clone(),
            reason: format!("{} is not a virtual machine", resource.kind().label()),
        });
    }
    if !recorded.is_created() {
        return Err(Error::InvalidTransition {
            resource: id.clone(),
            reason: format!("resource is {recorded}, expected created"),
        });
    }

    let retry = match op {
        VmOperation::AttachDisk { .. } => RetryConfig::none(),
        _ => retry.clone(),
    };

    log::info!("Running '{op}' on {id}");
    let vm = with_retry(&retry, || provider.transition(id, op))?;
    log::info!("{id} is now {} ({})", vm.power, vm.size);
    Ok(vm)
}

/// Read the remote view of a resource
pub fn inspect<P: Provider + ?Sized>(
    provider: &P,
    id: &ResourceId,
    retry: &RetryConfig,
) -> Result<RemoteResource> {
    with_retry(retry, || provider.get(id))?
        .ok_or_else(|| Error::Remote(RemoteError::not_found(id, "resource does not exist")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AutoDecline;
    use crate::provider::{MemoryProvider, ProviderCall};
    use crate::resource::Resource;
    use crate::vm::PowerState;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn id(kind: ResourceKind, name: &str) -> ResourceId {
        ResourceId::new(kind, name)
    }

    fn fast() -> ExecuteOptions {
        ExecuteOptions {
            jobs: 1,
            retry: RetryConfig {
                max_attempts: 3,
                base_delay_ms: 0,
                max_delay_ms: 0,
            },
        }
    }

    fn parallel() -> ExecuteOptions {
        ExecuteOptions { jobs: 4, ..fast() }
    }

    /// g <- n <- i <- v
    fn chain() -> ResourceGraph {
        ResourceGraph::build(vec![
            Resource::new(ResourceKind::ResourceGroup, "g"),
            Resource::new(ResourceKind::VirtualNetwork, "n").depends_on_name("g"),
            Resource::new(ResourceKind::NetworkInterface, "i").depends_on_name("n"),
            Resource::new(ResourceKind::VirtualMachine, "v").depends_on_name("i"),
        ])
        .unwrap()
    }

    /// The tutorial topology: group, availability set, public IP, network,
    /// NIC (network + IP), VM (NIC + availability set)
    fn tutorial() -> ResourceGraph {
        ResourceGraph::build(vec![
            Resource::new(ResourceKind::ResourceGroup, "myResourceGroup")
                .with_attr("region", "westus2"),
            Resource::new(ResourceKind::AvailabilitySet, "myAVSet")
                .with_attr("sku", "Aligned")
                .depends_on_name("myResourceGroup"),
            Resource::new(ResourceKind::PublicIp, "myPublicIP")
                .with_attr("allocation", "dynamic")
                .depends_on_name("myResourceGroup"),
            Resource::new(ResourceKind::VirtualNetwork, "myVNet")
                .with_attr("address_space", "10.0.0.0/16")
                .depends_on_name("myResourceGroup"),
            Resource::new(ResourceKind::NetworkInterface, "myNIC")
                .depends_on_name("myVNet")
                .depends_on_name("myPublicIP"),
            Resource::new(ResourceKind::VirtualMachine, "myVM")
                .with_attr("size", "Standard_DS2_v2")
                .depends_on_name("myNIC")
                .depends_on_name("myAVSet"),
        ])
        .unwrap()
    }

    /// Wraps a MemoryProvider and fails selected calls
    #[derive(Default)]
    struct FlakyProvider {
        inner: MemoryProvider,
        fail_create: Option<ResourceId>,
        fail_delete: Option<ResourceId>,
        transient_failures: AtomicUsize,
    }

    impl Provider for FlakyProvider {
        fn create_or_update(
            &self,
            resource: &Resource,
            dependencies: &[ResourceId],
        ) -> std::result::Result<RemoteResource, RemoteError> {
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(RemoteError::transient(&resource.id, "throttled"));
            }
            if self.fail_create.as_ref() == Some(&resource.id) {
                return Err(RemoteError::validation(&resource.id, "quota exceeded"));
            }
            self.inner.create_or_update(resource, dependencies)
        }

        fn get(&self, id: &ResourceId) -> std::result::Result<Option<RemoteResource>, RemoteError> {
            self.inner.get(id)
        }

        fn delete(&self, id: &ResourceId) -> std::result::Result<DeleteOutcome, RemoteError> {
            if self.fail_delete.as_ref() == Some(id) {
                return Err(RemoteError::conflict(id, "locked"));
            }
            self.inner.delete(id)
        }

        fn transition(
            &self,
            id: &ResourceId,
            op: &VmOperation,
        ) -> std::result::Result<VmInstance, RemoteError> {
            self.inner.transition(id, op)
        }
    }

    /// Progress callback that cancels after N completions
    struct CancelAfter {
        token: CancelToken,
        remaining: AtomicUsize,
    }

    impl ProgressCallback for CancelAfter {
        fn on_plan_start(&self, _total: usize, _direction: Direction) {}
        fn on_resource_start(&self, _id: &ResourceId, _state: ResourceState) {}
        fn on_resource_complete(&self, _id: &ResourceId, _state: ResourceState) {
            if self.remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                self.token.cancel();
            }
        }
        fn on_plan_complete(&self) {}
    }

    #[test]
    fn test_apply_creates_everything_in_order() {
        let provider = MemoryProvider::new();
        let report = apply_simple(&tutorial(), &provider, &fast()).unwrap();

        assert!(report.is_success());
        assert_eq!(report.succeeded().len(), 6);
        assert_eq!(provider.len(), 6);
        let names: Vec<&str> = report.plan.steps().iter().map(|s| s.id.name.as_str()).collect();
        assert_eq!(
            names,
            vec!["myResourceGroup", "myAVSet", "myPublicIP", "myVNet", "myNIC", "myVM"]
        );
    }

    #[test]
    fn test_apply_twice_is_idempotent() {
        let provider = MemoryProvider::new();
        let graph = tutorial();
        let first = apply_simple(&graph, &provider, &fast()).unwrap();
        let second = apply_simple(&graph, &provider, &fast()).unwrap();

        assert_eq!(first.outcomes, second.outcomes);
        assert!(second.outcomes.iter().all(|o| o.state == ResourceState::Created));
        assert_eq!(provider.calls().len(), 12);
        assert!(
            provider
                .calls()
                .iter()
                .all(|c| matches!(c, ProviderCall::CreateOrUpdate(_)))
        );
    }

    #[test]
    fn test_failed_dependency_halts_dependents() {
        let provider = FlakyProvider {
            fail_create: Some(id(ResourceKind::NetworkInterface, "i")),
            ..FlakyProvider::default()
        };

        let err = apply_simple(&chain(), &provider, &fast()).unwrap_err();
        let Error::PartialApply(report) = err else {
            panic!("expected partial apply");
        };

        let state = |kind, name| report.state_of(&id(kind, name)).unwrap();
        assert_eq!(state(ResourceKind::ResourceGroup, "g"), ResourceState::Created);
        assert_eq!(state(ResourceKind::VirtualNetwork, "n"), ResourceState::Created);
        assert_eq!(state(ResourceKind::NetworkInterface, "i"), ResourceState::Failed);
        assert_eq!(state(ResourceKind::VirtualMachine, "v"), ResourceState::NotCreated);
        assert_eq!(report.failed()[0].error.as_ref().unwrap().message, "quota exceeded");
        assert_eq!(report.unattempted(), vec![&id(ResourceKind::VirtualMachine, "v")]);
        assert!(!provider.inner.calls().contains(&ProviderCall::CreateOrUpdate(id(
            ResourceKind::VirtualMachine,
            "v"
        ))));
    }

    #[test]
    fn test_cycle_makes_no_remote_calls() {
        let graph = ResourceGraph::build(vec![
            Resource::new(ResourceKind::VirtualNetwork, "a").depends_on_name("b"),
            Resource::new(ResourceKind::NetworkInterface, "b").depends_on_name("a"),
        ])
        .unwrap();
        let provider = MemoryProvider::new();

        let err = apply_simple(&graph, &provider, &fast()).unwrap_err();
        assert!(matches!(err, Error::Cycle { .. }));
        assert!(err.is_pre_execution());
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_transient_errors_are_retried() {
        let provider = FlakyProvider {
            transient_failures: AtomicUsize::new(2),
            ..FlakyProvider::default()
        };
        let report = apply_simple(&chain(), &provider, &fast()).unwrap();
        assert!(report.is_success());
    }

    #[test]
    fn test_transient_errors_exhaust_retries() {
        let provider = FlakyProvider {
            transient_failures: AtomicUsize::new(3),
            ..FlakyProvider::default()
        };
        let Err(Error::PartialApply(report)) = apply_simple(&chain(), &provider, &fast()) else {
            panic!("expected partial apply");
        };
        assert_eq!(report.failed().len(), 1);
        assert_eq!(report.unattempted().len(), 3);
    }

    #[test]
    fn test_parallel_apply_matches_sequential() {
        let provider = MemoryProvider::new();
        let report = apply_simple(&tutorial(), &provider, &parallel()).unwrap();
        assert!(report.is_success());
        assert_eq!(provider.len(), 6);
    }

    #[test]
    fn test_parallel_apply_isolates_sibling_failure() {
        let provider = FlakyProvider {
            fail_create: Some(id(ResourceKind::PublicIp, "myPublicIP")),
            ..FlakyProvider::default()
        };
        let Err(Error::PartialApply(report)) = apply_simple(&tutorial(), &provider, &parallel())
        else {
            panic!("expected partial apply");
        };

        let state = |kind, name| report.state_of(&id(kind, name)).unwrap();
        assert_eq!(state(ResourceKind::AvailabilitySet, "myAVSet"), ResourceState::Created);
        assert_eq!(state(ResourceKind::VirtualNetwork, "myVNet"), ResourceState::Created);
        assert_eq!(state(ResourceKind::PublicIp, "myPublicIP"), ResourceState::Failed);
        assert_eq!(state(ResourceKind::NetworkInterface, "myNIC"), ResourceState::NotCreated);
        assert_eq!(state(ResourceKind::VirtualMachine, "myVM"), ResourceState::NotCreated);
    }

    #[test]
    fn test_cancel_stops_new_requests() {
        let provider = MemoryProvider::new();
        let token = CancelToken::new();
        let progress = CancelAfter {
            token: token.clone(),
            remaining: AtomicUsize::new(2),
        };

        let Err(Error::PartialApply(report)) =
            apply(&chain(), &provider, &fast(), &progress, &token)
        else {
            panic!("expected partial apply");
        };
        assert!(report.cancelled);
        assert_eq!(report.succeeded().len(), 2);
        assert_eq!(report.unattempted().len(), 2);
        assert!(report.outcomes.iter().all(|o| !o.state.is_in_flight()));
        assert_eq!(provider.calls().len(), 2);
    }

    #[test]
    fn test_cancel_parallel_apply_finishes_in_flight_level() {
        let provider = MemoryProvider::new();
        let token = CancelToken::new();
        // Fires on the first completion inside the second level
        let progress = CancelAfter {
            token: token.clone(),
            remaining: AtomicUsize::new(2),
        };

        let Err(Error::PartialApply(report)) =
            apply(&tutorial(), &provider, &parallel(), &progress, &token)
        else {
            panic!("expected partial apply");
        };

        assert!(report.cancelled);
        assert!(report.outcomes.iter().all(|o| !o.state.is_in_flight()));
        assert!((2..=4).contains(&report.succeeded().len()));
        assert_eq!(provider.calls().len(), report.succeeded().len());
        let state = |kind, name| report.state_of(&id(kind, name)).unwrap();
        assert_eq!(state(ResourceKind::NetworkInterface, "myNIC"), ResourceState::NotCreated);
        assert_eq!(state(ResourceKind::VirtualMachine, "myVM"), ResourceState::NotCreated);
    }

    #[test]
    fn test_cancel_stops_new_deletions() {
        let provider = MemoryProvider::new();
        let report = apply_simple(&chain(), &provider, &fast()).unwrap();
        let token = CancelToken::new();
        let progress = CancelAfter {
            token: token.clone(),
            remaining: AtomicUsize::new(2),
        };

        let Err(Error::PartialDestroy(destroyed)) = destroy(
            report.plan,
            &provider,
            &fast(),
            &progress,
            &mut AutoConfirm,
            &token,
        ) else {
            panic!("expected partial destroy");
        };

        assert!(destroyed.cancelled);
        assert!(destroyed.outcomes.iter().all(|o| !o.state.is_in_flight()));
        assert_eq!(
            destroyed.deleted(),
            vec![
                &id(ResourceKind::VirtualMachine, "v"),
                &id(ResourceKind::NetworkInterface, "i"),
            ]
        );
        let state = |kind, name| destroyed.state_of(&id(kind, name)).unwrap();
        assert_eq!(state(ResourceKind::VirtualNetwork, "n"), ResourceState::Created);
        assert_eq!(state(ResourceKind::ResourceGroup, "g"), ResourceState::Created);
        assert_eq!(provider.len(), 2);
    }

    #[test]
    fn test_cancel_parallel_destroy() {
        let provider = MemoryProvider::new();
        let report = apply_simple(&tutorial(), &provider, &fast()).unwrap();
        let token = CancelToken::new();
        let progress = CancelAfter {
            token: token.clone(),
            remaining: AtomicUsize::new(1),
        };

        let Err(Error::PartialDestroy(destroyed)) = destroy(
            report.plan,
            &provider,
            &parallel(),
            &progress,
            &mut AutoConfirm,
            &token,
        ) else {
            panic!("expected partial destroy");
        };

        assert!(destroyed.cancelled);
        assert!(destroyed.outcomes.iter().all(|o| !o.state.is_in_flight()));
        assert_eq!(
            destroyed.deleted(),
            vec![&id(ResourceKind::VirtualMachine, "myVM")]
        );
        assert_eq!(provider.len(), 5);
    }

    #[test]
    fn test_destroy_reverses_apply_order() {
        let provider = MemoryProvider::new();
        let report = apply_simple(&tutorial(), &provider, &fast()).unwrap();
        let destroyed = destroy_simple(report.plan.clone(), &provider, &fast()).unwrap();

        let mut expected = report.plan.order();
        expected.reverse();
        assert_eq!(destroyed.plan.order(), expected);
        let deletes: Vec<ResourceId> = provider
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                ProviderCall::Delete(id) => Some(id),
                _ => None,
            })
            .collect();
        assert_eq!(deletes, expected);
        assert!(provider.is_empty());
    }

    #[test]
    fn test_destroy_tolerates_out_of_band_deletion() {
        let provider = MemoryProvider::new();
        let report = apply_simple(&chain(), &provider, &fast()).unwrap();
        provider.remove_out_of_band(&id(ResourceKind::VirtualMachine, "v"));

        let destroyed = destroy_simple(report.plan, &provider, &fast()).unwrap();
        assert!(destroyed.is_success());
        assert_eq!(destroyed.deleted().len(), 4);
    }

    #[test]
    fn test_destroy_is_rerunnable() {
        let provider = MemoryProvider::new();
        let report = apply_simple(&chain(), &provider, &fast()).unwrap();
        destroy_simple(report.plan.clone(), &provider, &fast()).unwrap();
        let again = destroy_simple(report.plan, &provider, &fast()).unwrap();
        assert!(again.is_success());
    }

    #[test]
    fn test_destroy_continues_past_failure() {
        let provider = FlakyProvider {
            fail_delete: Some(id(ResourceKind::NetworkInterface, "myNIC")),
            ..FlakyProvider::default()
        };
        let report = apply_simple(&tutorial(), &provider, &fast()).unwrap();

        let Err(Error::PartialDestroy(destroyed)) = destroy_simple(report.plan, &provider, &fast())
        else {
            panic!("expected partial destroy");
        };

        let state = |kind, name| destroyed.state_of(&id(kind, name)).unwrap();
        assert_eq!(state(ResourceKind::VirtualMachine, "myVM"), ResourceState::Deleted);
        assert_eq!(state(ResourceKind::AvailabilitySet, "myAVSet"), ResourceState::Deleted);
        assert_eq!(state(ResourceKind::NetworkInterface, "myNIC"), ResourceState::Failed);
        assert_eq!(state(ResourceKind::VirtualNetwork, "myVNet"), ResourceState::Created);
        assert_eq!(state(ResourceKind::PublicIp, "myPublicIP"), ResourceState::Created);
        assert_eq!(
            destroyed.blocked,
            vec![
                id(ResourceKind::VirtualNetwork, "myVNet"),
                id(ResourceKind::PublicIp, "myPublicIP"),
                id(ResourceKind::ResourceGroup, "myResourceGroup"),
            ]
        );
        assert!(provider.inner.contains(&id(ResourceKind::NetworkInterface, "myNIC")));
        assert!(!provider.inner.contains(&id(ResourceKind::AvailabilitySet, "myAVSet")));
    }

    #[test]
    fn test_parallel_destroy_continues_past_failure() {
        let provider = FlakyProvider {
            fail_delete: Some(id(ResourceKind::AvailabilitySet, "myAVSet")),
            ..FlakyProvider::default()
        };
        let report = apply_simple(&tutorial(), &provider, &fast()).unwrap();

        let Err(Error::PartialDestroy(destroyed)) =
            destroy_simple(report.plan, &provider, &parallel())
        else {
            panic!("expected partial destroy");
        };
        assert_eq!(destroyed.deleted().len(), 4);
        assert_eq!(
            destroyed.blocked,
            vec![id(ResourceKind::ResourceGroup, "myResourceGroup")]
        );
    }

    #[test]
    fn test_declined_destroy_makes_no_calls() {
        let provider = MemoryProvider::new();
        let report = apply_simple(&chain(), &provider, &fast()).unwrap();
        let before = provider.calls().len();

        let err = destroy(
            report.plan,
            &provider,
            &fast(),
            &NoProgress,
            &mut AutoDecline,
            &CancelToken::new(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Aborted));
        assert_eq!(provider.calls().len(), before);
        assert_eq!(provider.len(), 4);
    }

    #[test]
    fn test_destroy_accepts_apply_direction_plan() {
        let provider = MemoryProvider::new();
        let graph = chain();
        apply_simple(&graph, &provider, &fast()).unwrap();
        let plan = plan_apply(&graph).unwrap();
        let destroyed = destroy_simple(plan, &provider, &fast()).unwrap();
        assert_eq!(destroyed.plan.direction(), Direction::Destroy);
        assert!(provider.is_empty());
    }

    #[test]
    fn test_vm_operations() {
        let provider = MemoryProvider::new();
        let graph = tutorial();
        apply_simple(&graph, &provider, &fast()).unwrap();
        let vm = id(ResourceKind::VirtualMachine, "myVM");
        let retry = RetryConfig::none();
        let run = |op: VmOperation| {
            vm_operation(&graph, &vm, ResourceState::Created, &provider, &op, &retry)
        };

        assert_eq!(run(VmOperation::Stop).unwrap().power, PowerState::Stopped);
        assert_eq!(run(VmOperation::Start).unwrap().power, PowerState::Running);
        let resized = run(VmOperation::Resize {
            size: "Standard_DS2".into(),
        })
        .unwrap();
        assert_eq!(resized.size, "Standard_DS2");
        let attach = VmOperation::AttachDisk {
            lun: 0,
            size_gb: 2,
            caching: crate::vm::CachingType::ReadWrite,
        };
        assert_eq!(run(attach.clone()).unwrap().data_disks.len(), 1);
        assert!(matches!(run(attach), Err(Error::Remote(_))));
        let deallocated = run(VmOperation::Deallocate).unwrap();
        assert_eq!(deallocated.power, PowerState::Deallocated);
        assert_eq!(deallocated.data_disks.len(), 1);

        let remote = inspect(&provider, &vm, &retry).unwrap();
        assert_eq!(remote.vm.unwrap(), deallocated);
    }

    #[test]
    fn test_vm_operation_requires_created_vm() {
        let provider = MemoryProvider::new();
        let graph = tutorial();
        let retry = RetryConfig::none();
        let vm = id(ResourceKind::VirtualMachine, "myVM");

        let start = VmOperation::Start;
        let err = vm_operation(
            &graph,
            &vm,
            ResourceState::NotCreated,
            &provider,
            &start,
            &retry,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));

        let nic = id(ResourceKind::NetworkInterface, "myNIC");
        let err = vm_operation(
            &graph,
            &nic,
            ResourceState::Created,
            &provider,
            &start,
            &retry,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { .. }));
        assert!(provider.calls().is_empty());
    }

    #[test]
    fn test_inspect_missing_resource() {
        let provider = MemoryProvider::new();
        let missing = id(ResourceKind::Disk, "d");
        let err = inspect(&provider, &missing, &RetryConfig::none()).unwrap_err();
        assert!(matches!(
            err,
            Error::Remote(e) if e.kind == crate::error::RemoteErrorKind::NotFound
        ));
    }
}
