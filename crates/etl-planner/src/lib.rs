//! # etl-planner
//!
//! Task-graph planners for PostgreSQL ETL pipelines.
//!
//! The planners inspect a source database's catalog at plan time and emit a
//! DAG of tasks for an external execution engine:
//!
//! - **Schema copy**: re-create a schema on a target database, stream its
//!   tables in size-balanced parallel buckets, then rebuild its indexes
//! - **Attributes tables**: a list-partitioned `(attribute, value, row_count)`
//!   lookup table with one trigram-indexed partition per text-like column
//!
//! Planning never executes anything. Catalogs are read either live
//! ([`PgCatalog`]) or from a stored [`CatalogSnapshot`].
//!
//! ## Example
//!
//! ```rust,no_run
//! use etl_planner::{CatalogSnapshot, SchemaCopyPlanner};
//!
//! #[tokio::main]
//! async fn main() -> etl_planner::Result<()> {
//!     let catalog = CatalogSnapshot::load("dwh.snapshot.json")?;
//!     let planner = SchemaCopyPlanner::new("dwh", "frontend", "dwh", 4)?;
//!     let plan = planner.plan(&catalog).await?;
//!     println!("{}", plan.to_json()?);
//!     Ok(())
//! }
//! ```

pub mod balance;
pub mod catalog;
pub mod config;
pub mod core;
pub mod error;
pub mod graph;
pub mod planner;

// Re-exports for convenient access
pub use balance::{Bucket, GreedyLoadBalancer, WorkItem};
pub use catalog::{CatalogIntrospector, CatalogSnapshot, PgCatalog};
pub use config::{Config, DatabaseConfig, PlanningConfig};
pub use error::{PlanError, Result};
pub use graph::{splice, Command, Plan, SubPlan, TaskNode};
pub use planner::{AttributesTablePlanner, SchemaCopyPlanner, TaskLayout};
