//! Parallel, size-balanced replication of one schema between databases.
//!
//! The plan has three layers:
//!
//! 1. `create_tables_and_functions`: drop and re-create the schema on the
//!    target from the source's structure, then copy routine definitions.
//! 2. `copy_tables_<bucket>`: one task per non-empty table bucket, streaming
//!    each table from source to target in turn.
//! 3. `add_indexes_<bucket>`: one task per non-empty index bucket. Every
//!    index task waits for every copy task.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::balance::{sort_by_weight_descending, Bucket, GreedyLoadBalancer, WorkItem};
use crate::catalog::{CatalogIntrospector, IndexDef, Table};
use crate::core::identifier::{quote_ident, quote_literal, validate_identifier};
use crate::error::{PlanError, Result};
use crate::graph::{
    assemble, splice, Command, DependencyPolicy, PartitionStrategy, PartitionedWork, Plan,
    SubPlan, TaskNode,
};

/// First `server_version_num` with `pg_proc.prokind`.
pub const PROKIND_MIN_SERVER_VERSION: i32 = 110000;

/// Task id used when appending to an existing plan.
pub const COPY_SCHEMA_TASK_ID: &str = "copy_schema";

const DDL_TASK_ID: &str = "create_tables_and_functions";

/// `pg_proc` predicate selecting plain functions and procedures.
///
/// Aggregates are excluded through `prokind` from PostgreSQL 11 on and
/// through `proisagg` before that.
pub fn routine_filter(server_version: i32) -> &'static str {
    if server_version >= PROKIND_MIN_SERVER_VERSION {
        "p.prokind IN ('p', 'f')"
    } else {
        "NOT p.proisagg"
    }
}

/// Query returning one `CREATE FUNCTION ...;` statement per routine of `schema`.
pub fn routine_definitions_query(schema: &str, server_version: i32) -> Result<String> {
    Ok(format!(
        "SELECT concat(pg_catalog.pg_get_functiondef(p.oid), ';') AS def\n\
         FROM pg_catalog.pg_proc p\n\
         JOIN pg_catalog.pg_namespace n ON n.oid = p.pronamespace\n\
         WHERE {} AND n.nspname = {}\n\
         ORDER BY p.proname, p.oid",
        routine_filter(server_version),
        quote_literal(schema)?
    ))
}

/// Plans copying one schema from a source to a target database.
#[derive(Debug, Clone)]
pub struct SchemaCopyPlanner {
    source_db: String,
    target_db: String,
    schema: String,
    max_parallel_tasks: usize,
}

impl SchemaCopyPlanner {
    pub fn new(
        source_db: impl Into<String>,
        target_db: impl Into<String>,
        schema: impl Into<String>,
        max_parallel_tasks: usize,
    ) -> Result<Self> {
        let schema = schema.into();
        validate_identifier(&schema)?;
        if max_parallel_tasks == 0 {
            return Err(PlanError::Config(
                "max_parallel_tasks must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            source_db: source_db.into(),
            target_db: target_db.into(),
            schema,
            max_parallel_tasks,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Build the stand-alone copy plan.
    pub async fn plan(&self, catalog: &dyn CatalogIntrospector) -> Result<Plan> {
        let plan = assemble(self, catalog).await?;
        info!(
            "Planned copy of schema '{}' from '{}' to '{}': {} tasks",
            self.schema,
            self.source_db,
            self.target_db,
            plan.len()
        );
        Ok(plan)
    }

    /// Append the copy plan to the end of `pipeline`.
    ///
    /// An existing final node is folded into the new final node, see
    /// [`splice`].
    pub async fn append_to(&self, pipeline: Plan, catalog: &dyn CatalogIntrospector) -> Result<Plan> {
        let sub = SubPlan::new(
            COPY_SCHEMA_TASK_ID,
            format!(
                "Copies the {} schema to the {} db",
                self.schema, self.target_db
            ),
            self.plan(catalog).await?,
        );
        splice(pipeline, sub)
    }

    fn ddl_task(&self, server_version: i32) -> Result<TaskNode> {
        Ok(TaskNode::new(
            DDL_TASK_ID,
            "Re-creates the schema, tables structure and functions on the target db",
        )
        .with_command(Command::ReplicateStructure {
            source_db: self.source_db.clone(),
            target_db: self.target_db.clone(),
            schema: self.schema.clone(),
            drop_sql: format!("DROP SCHEMA IF EXISTS {} CASCADE;", quote_ident(&self.schema)?),
        })
        .with_command(Command::CopyRoutines {
            source_db: self.source_db.clone(),
            target_db: self.target_db.clone(),
            query: routine_definitions_query(&self.schema, server_version)?,
        }))
    }

    fn copy_task(&self, bucket: &Bucket<Table>) -> Result<TaskNode> {
        let mut commands = Vec::with_capacity(bucket.len());
        for item in &bucket.items {
            let table = item.id.qualified_name()?;
            commands.push(Command::CopyTable {
                source_db: self.source_db.clone(),
                target_db: self.target_db.clone(),
                export_sql: format!("COPY {} TO STDOUT", table),
                target_table: table,
            });
        }
        Ok(TaskNode::new(
            format!("copy_tables_{}", bucket.index),
            format!("Copies table content to the {} db", self.target_db),
        )
        .with_commands(commands))
    }

    fn index_task(&self, bucket: &Bucket<IndexDef>) -> TaskNode {
        TaskNode::new(
            format!("add_indexes_{}", bucket.index),
            format!("Re-creates indexes on the {} db", self.target_db),
        )
        .with_commands(bucket.items.iter().map(|item| Command::ExecuteSql {
            database: self.target_db.clone(),
            statement: format!("{};", item.id.ddl),
        }))
    }
}

#[async_trait]
impl PartitionStrategy for SchemaCopyPlanner {
    async fn partition(&self, catalog: &dyn CatalogIntrospector) -> Result<PartitionedWork> {
        if !catalog.schema_exists(&self.schema).await? {
            return Err(PlanError::SchemaNotFound(self.schema.clone()));
        }
        let server_version = catalog.server_version().await?;
        let balancer = GreedyLoadBalancer::for_parallelism(self.max_parallel_tasks)?;

        let tables = catalog.tables(&self.schema).await?;
        if tables.is_empty() {
            warn!("Schema '{}' has no tables to copy", self.schema);
        }
        let mut table_items: Vec<WorkItem<Table>> = tables
            .into_iter()
            .map(|t| {
                let weight = t.size_estimate;
                WorkItem::new(t, weight)
            })
            .collect();
        sort_by_weight_descending(&mut table_items);
        let table_buckets = balancer.assign(table_items)?;

        let mut copy_tasks = Vec::new();
        for bucket in table_buckets.iter().filter(|b| !b.is_empty()) {
            debug!(
                "copy_tables_{}: {} tables, load {:.0}",
                bucket.index,
                bucket.len(),
                bucket.load
            );
            copy_tasks.push(self.copy_task(bucket)?);
        }

        let mut index_items: Vec<WorkItem<IndexDef>> = catalog
            .indexes(&self.schema)
            .await?
            .into_iter()
            .map(|i| {
                let weight = i.size_estimate;
                WorkItem::new(i, weight)
            })
            .collect();
        sort_by_weight_descending(&mut index_items);
        let index_buckets = balancer.assign(index_items)?;

        let index_tasks: Vec<TaskNode> = index_buckets
            .iter()
            .filter(|b| !b.is_empty())
            .map(|bucket| {
                debug!(
                    "add_indexes_{}: {} indexes, load {:.0}",
                    bucket.index,
                    bucket.len(),
                    bucket.load
                );
                self.index_task(bucket)
            })
            .collect();

        info!(
            "Schema '{}': {} copy tasks, {} index tasks across {} buckets",
            self.schema,
            copy_tasks.len(),
            index_tasks.len(),
            balancer.bucket_count()
        );

        Ok(PartitionedWork::new(self.ddl_task(server_version)?)
            .with_work(copy_tasks)
            .with_dependents(index_tasks, DependencyPolicy::AllWork))
    }
}
