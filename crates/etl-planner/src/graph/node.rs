//! Task nodes, commands and the plan DAG handed to the executor.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{PlanError, Result};

/// One opaque unit of work executed by the external engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Drop the target schema, then stream the source schema's pre-data
    /// definitions (tables, types, sequences) into the target.
    ReplicateStructure {
        source_db: String,
        target_db: String,
        schema: String,
        drop_sql: String,
    },

    /// Run `query` on the source; every row is a statement to run on the target.
    CopyRoutines {
        source_db: String,
        target_db: String,
        query: String,
    },

    /// Stream `export_sql` (a `COPY ... TO STDOUT`) from the source straight
    /// into `COPY target_table FROM STDIN` on the target. No intermediate file.
    CopyTable {
        source_db: String,
        target_db: String,
        export_sql: String,
        target_table: String,
    },

    /// Execute a SQL statement (or script) on a database.
    ExecuteSql { database: String, statement: String },

    /// Run a shell command.
    RunShell { command: String },
}

/// A node of the plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub commands: Vec<Command>,
    /// Ids of nodes that must complete before this one starts.
    #[serde(default)]
    pub upstreams: BTreeSet<String>,
}

impl TaskNode {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            commands: Vec::new(),
            upstreams: BTreeSet::new(),
        }
    }

    pub fn with_command(mut self, command: Command) -> Self {
        self.commands.push(command);
        self
    }

    pub fn with_commands(mut self, commands: impl IntoIterator<Item = Command>) -> Self {
        self.commands.extend(commands);
        self
    }

    pub fn with_upstreams<I, S>(mut self, upstreams: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.upstreams.extend(upstreams.into_iter().map(Into::into));
        self
    }

    /// A node without upstreams.
    pub fn is_root(&self) -> bool {
        self.upstreams.is_empty()
    }
}

/// A directed acyclic graph of task nodes, in insertion order.
///
/// Nodes can only reference upstreams that were added before them, so a plan
/// built through [`Plan::add`] is acyclic by construction. Deserialised plans
/// are checked with [`Plan::validate`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    nodes: IndexMap<String, TaskNode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    final_node: Option<String>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node whose upstreams are already in the plan.
    pub fn add(&mut self, node: TaskNode) -> Result<()> {
        if let Some(final_id) = &self.final_node {
            return Err(PlanError::graph(format!(
                "cannot add '{}' after final node '{}'",
                node.id, final_id
            )));
        }
        if node.id.is_empty() {
            return Err(PlanError::graph("node id must not be empty"));
        }
        if self.nodes.contains_key(&node.id) {
            return Err(PlanError::graph(format!("duplicate node id '{}'", node.id)));
        }
        if let Some(missing) = node.upstreams.iter().find(|u| !self.nodes.contains_key(*u)) {
            return Err(PlanError::graph(format!(
                "node '{}' references unknown upstream '{}'",
                node.id, missing
            )));
        }
        self.nodes.insert(node.id.clone(), node);
        Ok(())
    }

    /// Add a node after every current sink and mark it final.
    pub fn add_final(&mut self, node: TaskNode) -> Result<()> {
        let sinks: Vec<String> = self.sinks().iter().map(|n| n.id.clone()).collect();
        let id = node.id.clone();
        self.add(node.with_upstreams(sinks))?;
        self.final_node = Some(id);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&TaskNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(String::as_str)
    }

    /// The designated final node, if any.
    pub fn final_node(&self) -> Option<&TaskNode> {
        self.final_node.as_deref().and_then(|id| self.nodes.get(id))
    }

    /// Remove and return the final node. Fails if another node depends on it.
    pub(crate) fn take_final(&mut self) -> Result<Option<TaskNode>> {
        let Some(id) = self.final_node.take() else {
            return Ok(None);
        };
        if let Some(dependent) = self.nodes.values().find(|n| n.upstreams.contains(&id)) {
            return Err(PlanError::graph(format!(
                "final node '{}' has downstream '{}'",
                id, dependent.id
            )));
        }
        Ok(self.nodes.shift_remove(&id))
    }

    /// Nodes without upstreams.
    pub fn roots(&self) -> Vec<&TaskNode> {
        self.nodes.values().filter(|n| n.is_root()).collect()
    }

    /// Nodes nothing depends on.
    pub fn sinks(&self) -> Vec<&TaskNode> {
        let referenced: BTreeSet<&str> = self
            .nodes
            .values()
            .flat_map(|n| n.upstreams.iter().map(String::as_str))
            .collect();
        self.nodes
            .values()
            .filter(|n| !referenced.contains(n.id.as_str()))
            .collect()
    }

    /// Nodes that list `id` as an upstream.
    pub fn downstreams(&self, id: &str) -> Vec<&TaskNode> {
        self.nodes
            .values()
            .filter(|n| n.upstreams.contains(id))
            .collect()
    }

    /// Node ids in dependency order, ties broken by insertion order.
    pub fn topological_order(&self) -> Result<Vec<&str>> {
        let position: HashMap<&str, usize> = self
            .nodes
            .keys()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();

        let mut pending: Vec<usize> = self.nodes.values().map(|n| n.upstreams.len()).collect();
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        for (i, node) in self.nodes.values().enumerate() {
            for upstream in &node.upstreams {
                let &u = position.get(upstream.as_str()).ok_or_else(|| {
                    PlanError::graph(format!(
                        "node '{}' references unknown upstream '{}'",
                        node.id, upstream
                    ))
                })?;
                downstream[u].push(i);
            }
        }

        let mut ready: BTreeSet<usize> = (0..pending.len()).filter(|&i| pending[i] == 0).collect();
        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(i) = ready.pop_first() {
            order.push(i);
            for &d in &downstream[i] {
                pending[d] -= 1;
                if pending[d] == 0 {
                    ready.insert(d);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(PlanError::graph("plan contains a cycle"));
        }
        let ids: Vec<&str> = self.nodes.keys().map(String::as_str).collect();
        Ok(order.into_iter().map(|i| ids[i]).collect())
    }

    /// Re-check every structural invariant.
    pub fn validate(&self) -> Result<()> {
        for (key, node) in &self.nodes {
            if key != &node.id {
                return Err(PlanError::graph(format!(
                    "node stored under '{}' has id '{}'",
                    key, node.id
                )));
            }
            if node.upstreams.contains(&node.id) {
                return Err(PlanError::graph(format!("node '{}' depends on itself", node.id)));
            }
        }
        self.topological_order()?;

        if let Some(id) = &self.final_node {
            if !self.nodes.contains_key(id) {
                return Err(PlanError::graph(format!("final node '{}' does not exist", id)));
            }
            if !self.downstreams(id).is_empty() {
                return Err(PlanError::graph(format!(
                    "final node '{}' is not a sink",
                    id
                )));
            }
        }
        Ok(())
    }

    /// Pretty JSON for the executor.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse and validate a plan.
    pub fn from_json(json: &str) -> Result<Self> {
        let plan: Plan = serde_json::from_str(json)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Load and validate a plan from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// SHA-256 of the canonical JSON form. Equal fingerprints mean equal graphs.
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(self)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(format!("{:x}", hasher.finalize()))
    }

    /// Split into nodes and final node id.
    pub(crate) fn into_parts(self) -> (IndexMap<String, TaskNode>, Option<String>) {
        (self.nodes, self.final_node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql(statement: &str) -> Command {
        Command::ExecuteSql {
            database: "dwh".to_string(),
            statement: statement.to_string(),
        }
    }

    fn diamond() -> Plan {
        let mut plan = Plan::new();
        plan.add(TaskNode::new("a", "A")).unwrap();
        plan.add(TaskNode::new("b", "B").with_upstreams(["a"])).unwrap();
        plan.add(TaskNode::new("c", "C").with_upstreams(["a"])).unwrap();
        plan.add(TaskNode::new("d", "D").with_upstreams(["b", "c"])).unwrap();
        plan
    }

    #[test]
    fn test_add_rejects_duplicates() {
        let mut plan = diamond();
        let err = plan.add(TaskNode::new("b", "again")).unwrap_err();
        assert!(matches!(err, PlanError::InvalidGraph(_)));
    }

    #[test]
    fn test_add_rejects_unknown_upstream() {
        let mut plan = Plan::new();
        assert!(plan.add(TaskNode::new("x", "X").with_upstreams(["y"])).is_err());
        assert!(plan.add(TaskNode::new("x", "X").with_upstreams(["x"])).is_err());
        assert!(plan.is_empty());
    }

    #[test]
    fn test_roots_sinks_downstreams() {
        let plan = diamond();
        let ids = |nodes: Vec<&TaskNode>| nodes.iter().map(|n| n.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(plan.roots()), vec!["a"]);
        assert_eq!(ids(plan.sinks()), vec!["d"]);
        assert_eq!(ids(plan.downstreams("a")), vec!["b", "c"]);
        assert!(plan.downstreams("d").is_empty());
    }

    #[test]
    fn test_topological_order() {
        let mut plan = Plan::new();
        plan.add(TaskNode::new("z", "Z")).unwrap();
        plan.add(TaskNode::new("y", "Y")).unwrap();
        plan.add(TaskNode::new("x", "X").with_upstreams(["z", "y"])).unwrap();
        plan.add(TaskNode::new("w", "W").with_upstreams(["z"])).unwrap();
        assert_eq!(plan.topological_order().unwrap(), vec!["z", "y", "x", "w"]);
    }

    #[test]
    fn test_add_final_follows_sinks() {
        let mut plan = Plan::new();
        plan.add(TaskNode::new("a", "A")).unwrap();
        plan.add(TaskNode::new("b", "B")).unwrap();
        plan.add_final(TaskNode::new("end", "End").with_command(sql("SELECT 1")))
            .unwrap();

        let end = plan.final_node().unwrap();
        assert_eq!(end.id, "end");
        assert_eq!(end.upstreams.iter().collect::<Vec<_>>(), vec!["a", "b"]);
        assert!(plan.add(TaskNode::new("late", "Late")).is_err());
    }

    #[test]
    fn test_take_final() {
        let mut plan = diamond();
        plan.add_final(TaskNode::new("end", "End")).unwrap();
        let taken = plan.take_final().unwrap().unwrap();
        assert_eq!(taken.id, "end");
        assert!(plan.final_node().is_none());
        assert!(!plan.contains("end"));
        assert!(plan.take_final().unwrap().is_none());
    }

    #[test]
    fn test_validate_detects_cycle() {
        let json = r#"{
            "nodes": {
                "a": {"id": "a", "description": "A", "upstreams": ["b"]},
                "b": {"id": "b", "description": "B", "upstreams": ["a"]}
            }
        }"#;
        let err = Plan::from_json(json).unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_validate_detects_mismatched_key() {
        let json = r#"{"nodes": {"a": {"id": "b", "description": "B"}}}"#;
        assert!(Plan::from_json(json).is_err());
    }

    #[test]
    fn test_validate_final_must_be_sink() {
        let json = r#"{
            "nodes": {
                "a": {"id": "a", "description": "A"},
                "b": {"id": "b", "description": "B", "upstreams": ["a"]}
            },
            "final_node": "a"
        }"#;
        assert!(Plan::from_json(json).is_err());
    }

    #[test]
    fn test_json_and_fingerprint() {
        let mut plan = diamond();
        plan.add_final(TaskNode::new("end", "End").with_command(sql("VACUUM")))
            .unwrap();
        let json = plan.to_json().unwrap();
        assert!(json.contains("\"type\": \"execute_sql\""));

        let parsed = Plan::from_json(&json).unwrap();
        assert_eq!(parsed, plan);
        assert_eq!(parsed.fingerprint().unwrap(), plan.fingerprint().unwrap());
        assert_eq!(plan.fingerprint().unwrap().len(), 64);

        let mut other = diamond();
        other.add_final(TaskNode::new("end", "End")).unwrap();
        assert_ne!(other.fingerprint().unwrap(), plan.fingerprint().unwrap());
    }
}
