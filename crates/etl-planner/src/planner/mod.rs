//! Planners that turn catalog contents into task graphs.

pub mod attributes;
pub mod schema_copy;

pub use attributes::{AttributePartition, AttributesTablePlanner, TaskLayout};
pub use schema_copy::{routine_filter, SchemaCopyPlanner};
