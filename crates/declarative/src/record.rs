//! What previous applies touched
//!
//! Destroy works from this record, not from the declaration, so it can
//! tear down resources even after they were removed from the file. A
//! failed create is recorded too: the provider may have made the resource
//! before reporting the error, and deleting an absent resource is harmless.

use crate::executor::{ApplyReport, DestroyReport};
use crate::planner::{Direction, ExecutionPlan, PlanStep};
use crate::types::{ResourceId, ResourceState};
use serde::{Deserialize, Serialize};

/// Attempted resources, in the order they were attempted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyRecord {
    #[serde(default)]
    pub steps: Vec<PlanStep>,
}

impl ApplyRecord {
    /// Merge an apply run into a previous record
    ///
    /// Resources this run attempted come first, in plan order. Entries
    /// from the previous record that this run did not touch are kept
    /// after them, so nothing created earlier is forgotten.
    pub fn from_apply(report: &ApplyReport, previous: Option<&Self>) -> Self {
        let mut steps: Vec<PlanStep> = report
            .plan
            .steps()
            .iter()
            .filter(|step| {
                report
                    .state_of(&step.id)
                    .is_some_and(|state| state != ResourceState::NotCreated)
            })
            .cloned()
            .collect();

        if let Some(previous) = previous {
            for step in &previous.steps {
                if !steps.iter().any(|s| s.id == step.id) {
                    steps.push(step.clone());
                }
            }
        }

        Self { steps }
    }

    /// Drop everything a destroy run deleted
    pub fn after_destroy(&self, report: &DestroyReport) -> Self {
        let steps = self
            .steps
            .iter()
            .filter(|step| report.state_of(&step.id) != Some(ResourceState::Deleted))
            .cloned()
            .collect();
        Self { steps }
    }

    /// Teardown plan: the recorded creation order, reversed
    pub fn destroy_plan(&self) -> ExecutionPlan {
        ExecutionPlan::new(Direction::Apply, self.steps.clone()).reversed()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn contains(&self, id: &ResourceId) -> bool {
        self.steps.iter().any(|s| &s.id == id)
    }
}
