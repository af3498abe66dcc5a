//! Task graphs emitted for the external execution engine.
//!
//! A [`Plan`] is a DAG of [`TaskNode`]s. Planners describe their shape as
//! [`PartitionedWork`] through the [`PartitionStrategy`] trait, and
//! [`assemble`] wires it into a plan with [`TaskGraphBuilder`]. Existing
//! plans are extended with [`splice`].

mod builder;
mod node;
mod splice;

pub use builder::{assemble, DependencyPolicy, PartitionStrategy, PartitionedWork, TaskGraphBuilder};
pub use node::{Command, Plan, TaskNode};
pub use splice::{splice, SubPlan};
