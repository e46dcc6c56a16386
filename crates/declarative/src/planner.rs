//! Execution planner - orders resources so dependencies come first

use crate::error::{Error, Result};
use crate::graph::ResourceGraph;
use crate::types::ResourceId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Which way a plan walks the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Dependencies before dependents
    Apply,
    /// Dependents before dependencies
    Destroy,
}

/// One slot of a plan: a resource and what it depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: ResourceId,
    #[serde(default)]
    pub depends_on: Vec<ResourceId>,
}

/// A linear ordering of resources consistent with the dependency graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionPlan {
    direction: Direction,
    steps: Vec<PlanStep>,
}

impl ExecutionPlan {
    /// Build a plan from steps that are already ordered for `direction`
    pub fn new(direction: Direction, steps: Vec<PlanStep>) -> Self {
        Self { direction, steps }
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Resource identifiers in execution order
    pub fn order(&self) -> Vec<ResourceId> {
        self.steps.iter().map(|s| s.id.clone()).collect()
    }

    pub fn position(&self, id: &ResourceId) -> Option<usize> {
        self.steps.iter().position(|s| &s.id == id)
    }

    /// The same resources walked the other way
    pub fn reversed(&self) -> Self {
        let direction = match self.direction {
            Direction::Apply => Direction::Destroy,
            Direction::Destroy => Direction::Apply,
        };
        let mut steps = self.steps.clone();
        steps.reverse();
        Self { direction, steps }
    }

    /// Group slots into levels with no dependency path inside a level
    ///
    /// Levels are returned in execution order and each level lists slot
    /// indices in plan order. A resource's apply level is one more than
    /// the highest level among its dependencies; destroy plans use the
    /// apply levels back to front.
    pub fn levels(&self) -> Vec<Vec<usize>> {
        let apply_order: Vec<usize> = match self.direction {
            Direction::Apply => (0..self.steps.len()).collect(),
            Direction::Destroy => (0..self.steps.len()).rev().collect(),
        };

        let slot_of: HashMap<&ResourceId, usize> = self
            .steps
            .iter()
            .enumerate()
            .map(|(i, s)| (&s.id, i))
            .collect();

        let mut level = vec![0usize; self.steps.len()];
        for &slot in &apply_order {
            let own = self.steps[slot]
                .depends_on
                .iter()
                .filter_map(|dep| slot_of.get(dep))
                .map(|&d| level[d] + 1)
                .max()
                .unwrap_or(0);
            level[slot] = own;
        }

        let depth = level.iter().max().map_or(0, |m| m + 1);
        let mut levels = vec![Vec::new(); depth];
        for (slot, &l) in level.iter().enumerate() {
            levels[l].push(slot);
        }
        if self.direction == Direction::Destroy {
            levels.reverse();
        }
        levels
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Compute the dependency-first order for a graph
///
/// Depth-first post-order traversal: roots are taken in declaration
/// order and dependencies in declaration order, so resources with no
/// ordering constraint between them keep their declaration order. The
/// walk keeps its own stack, so chain length is bounded by memory only.
pub fn plan_apply(graph: &ResourceGraph) -> Result<ExecutionPlan> {
    let mut marks = vec![Mark::Unvisited; graph.len()];
    let mut order = Vec::with_capacity(graph.len());
    // (resource, next dependency to look at)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for root in 0..graph.len() {
        if marks[root] != Mark::Unvisited {
            continue;
        }
        marks[root] = Mark::InProgress;
        stack.push((root, 0));

        while let Some(frame) = stack.last_mut() {
            let (idx, next) = *frame;
            let deps = graph.dependencies_of(idx);
            let Some(&dep) = deps.get(next) else {
                stack.pop();
                marks[idx] = Mark::Done;
                order.push(idx);
                continue;
            };
            frame.1 += 1;

            match marks[dep] {
                Mark::Done => {}
                Mark::InProgress => return Err(cycle(graph, &stack, dep)),
                Mark::Unvisited => {
                    marks[dep] = Mark::InProgress;
                    stack.push((dep, 0));
                }
            }
        }
    }

    let steps = order
        .into_iter()
        .map(|idx| PlanStep {
            id: graph.resource(idx).id.clone(),
            depends_on: graph.dependency_ids(idx),
        })
        .collect();

    Ok(ExecutionPlan::new(Direction::Apply, steps))
}

/// Compute the teardown order for a graph (reverse of the apply order)
pub fn plan_destroy(graph: &ResourceGraph) -> Result<ExecutionPlan> {
    Ok(plan_apply(graph)?.reversed())
}

/// The members of the walk from `start` back down to the top of the stack
fn cycle(graph: &ResourceGraph, stack: &[(usize, usize)], start: usize) -> Error {
    let from = stack.iter().position(|&(i, _)| i == start).unwrap_or(0);
    let members = stack[from..]
        .iter()
        .map(|&(i, _)| graph.resource(i).id.clone())
        .collect();
    Error::Cycle { members }
}
