//! Appending a sub-plan to the tail of an existing plan.

use std::collections::BTreeSet;

use tracing::debug;

use super::node::{Plan, TaskNode};
use crate::error::{PlanError, Result};

/// A plan to splice in, with the id and description it runs under.
#[derive(Debug, Clone)]
pub struct SubPlan {
    pub id: String,
    pub description: String,
    pub plan: Plan,
}

impl SubPlan {
    pub fn new(id: impl Into<String>, description: impl Into<String>, plan: Plan) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            plan,
        }
    }
}

/// Return `base` with `sub` appended after its tail.
///
/// When `base` has a final node, that node is replaced: its commands except
/// the last run in `<combined>.commands_before` ahead of the sub-plan, and
/// the last one runs in the new final node `<combined>` after it, where
/// `<combined>` is `<final id>_and_<sub id>`. Without a final node the
/// sub-plan follows every sink of `base` and `<combined>` is the sub id.
///
/// Sub-plan node ids are prefixed with `<combined>.`.
pub fn splice(base: Plan, sub: SubPlan) -> Result<Plan> {
    base.validate()?;
    sub.plan.validate()?;

    let mut plan = base;
    let previous_final = plan.take_final()?;

    let (combined_id, description, mut commands, mut entry) = match previous_final {
        Some(node) => (
            format!("{}_and_{}", node.id, sub.id),
            format!("{} + {}", node.description, sub.description),
            node.commands,
            node.upstreams,
        ),
        None => {
            let sinks: BTreeSet<String> = plan.sinks().iter().map(|n| n.id.clone()).collect();
            (sub.id.clone(), sub.description.clone(), Vec::new(), sinks)
        }
    };
    if plan.contains(&combined_id) {
        return Err(PlanError::graph(format!(
            "cannot splice '{}': id already in use",
            combined_id
        )));
    }

    let last_command = commands.pop();
    if !commands.is_empty() {
        let before_id = format!("{}.commands_before", combined_id);
        plan.add(
            TaskNode::new(before_id.clone(), format!("{} (preceding commands)", description))
                .with_commands(commands)
                .with_upstreams(entry),
        )?;
        entry = BTreeSet::from([before_id]);
    }

    let prefix = |id: &str| format!("{}.{}", combined_id, id);
    let (sub_nodes, _) = sub.plan.into_parts();
    let spliced = sub_nodes.len();
    for (_, node) in sub_nodes {
        let upstreams: BTreeSet<String> = if node.is_root() {
            entry.clone()
        } else {
            node.upstreams.iter().map(|u| prefix(u)).collect()
        };
        plan.add(TaskNode {
            id: prefix(&node.id),
            description: node.description,
            commands: node.commands,
            upstreams,
        })?;
    }

    plan.add_final(
        TaskNode::new(combined_id.clone(), description)
            .with_commands(last_command)
            .with_upstreams(if spliced == 0 { entry } else { BTreeSet::new() }),
    )?;

    debug!("Spliced {} nodes under '{}'", spliced, combined_id);
    Ok(plan)
}
