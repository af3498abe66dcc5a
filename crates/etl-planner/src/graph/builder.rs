//! Turning partitioned work into a dependency-correct plan.

use async_trait::async_trait;
use tracing::debug;

use super::node::{Plan, TaskNode};
use crate::catalog::CatalogIntrospector;
use crate::error::{PlanError, Result};

/// How dependent nodes attach to the work layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyPolicy {
    /// Every dependent waits for every work node (and the root when there is
    /// no work).
    #[default]
    AllWork,
    /// Dependents only wait for the root.
    RootOnly,
}

/// A three-layer graph shape: one root, parallel work, then dependents.
#[derive(Debug, Clone)]
pub struct PartitionedWork {
    pub root: TaskNode,
    pub work: Vec<TaskNode>,
    pub dependents: Vec<TaskNode>,
    pub policy: DependencyPolicy,
}

impl PartitionedWork {
    pub fn new(root: TaskNode) -> Self {
        Self {
            root,
            work: Vec::new(),
            dependents: Vec::new(),
            policy: DependencyPolicy::default(),
        }
    }

    pub fn with_work(mut self, work: Vec<TaskNode>) -> Self {
        self.work = work;
        self
    }

    pub fn with_dependents(mut self, dependents: Vec<TaskNode>, policy: DependencyPolicy) -> Self {
        self.dependents = dependents;
        self.policy = policy;
        self
    }
}

/// Produces the ordered sub-nodes of a plan from the catalog.
#[async_trait]
pub trait PartitionStrategy: Send + Sync {
    /// Inspect the catalog and lay out root, work and dependent nodes.
    async fn partition(&self, catalog: &dyn CatalogIntrospector) -> Result<PartitionedWork>;
}

/// Builds plans from a root, work nodes and dependent nodes.
pub struct TaskGraphBuilder;

impl TaskGraphBuilder {
    /// Build a plan.
    ///
    /// The root gets no upstreams. Every work node depends on the root.
    /// Dependents follow `policy`. Node ids must be unique.
    pub fn build(
        root: TaskNode,
        work: Vec<TaskNode>,
        dependents: Vec<TaskNode>,
        policy: DependencyPolicy,
    ) -> Result<Plan> {
        if !root.is_root() {
            return Err(PlanError::graph(format!(
                "root node '{}' must not have upstreams",
                root.id
            )));
        }

        let mut plan = Plan::new();
        let root_id = root.id.clone();
        plan.add(root)?;

        let mut work_ids = Vec::with_capacity(work.len());
        for node in work {
            work_ids.push(node.id.clone());
            plan.add(node.with_upstreams([root_id.as_str()]))?;
        }

        let dependent_upstreams: Vec<&str> = match policy {
            DependencyPolicy::AllWork if !work_ids.is_empty() => {
                work_ids.iter().map(String::as_str).collect()
            }
            _ => vec![root_id.as_str()],
        };
        for node in dependents {
            plan.add(node.with_upstreams(dependent_upstreams.iter().copied()))?;
        }

        debug!(
            "Built plan rooted at '{}': {} work nodes, {} dependents",
            root_id,
            work_ids.len(),
            plan.len() - work_ids.len() - 1
        );
        Ok(plan)
    }
}

/// Run a strategy against a catalog and build its plan.
pub async fn assemble(
    strategy: &dyn PartitionStrategy,
    catalog: &dyn CatalogIntrospector,
) -> Result<Plan> {
    let PartitionedWork {
        root,
        work,
        dependents,
        policy,
    } = strategy.partition(catalog).await?;
    TaskGraphBuilder::build(root, work, dependents, policy)
}
