//! Attribute lookup tables for auto-completion.
//!
//! For `schema.table` this plans a table `schema.table<suffix>` with rows
//! `(attribute, value, row_count)`, one per distinct non-null value of every
//! text, varchar or enum column. The table is list-partitioned by
//! `attribute`, one partition per column, each with a trigram index on
//! `value`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::catalog::{CatalogIntrospector, Column};
use crate::core::identifier::{qualify, quote_ident, quote_literal, validate_identifier};
use crate::error::{PlanError, Result};
use crate::graph::{
    assemble, Command, DependencyPolicy, PartitionStrategy, PartitionedWork, Plan, TaskNode,
};

const ROOT_TASK_ID: &str = "create_table";

/// How partition statements are grouped into tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskLayout {
    /// One task per column.
    PerColumn,
    /// Columns batched `ceil(n / (2 × P))` per task, so about `2 × P` tasks.
    #[default]
    Chunked,
}

/// A column and the partition that holds its values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributePartition {
    pub column_name: String,
    /// 1-based, in column order.
    pub partition_id: usize,
}

/// Number the qualifying columns in order, starting at 1.
pub fn partitions(columns: &[Column]) -> Vec<AttributePartition> {
    columns
        .iter()
        .enumerate()
        .map(|(i, column)| AttributePartition {
            column_name: column.name.clone(),
            partition_id: i + 1,
        })
        .collect()
}

/// Columns per task in the chunked layout.
pub fn chunk_size(column_count: usize, max_parallel_tasks: usize) -> usize {
    column_count.div_ceil(2 * max_parallel_tasks.max(1))
}

/// Tasks produced by the chunked layout.
pub fn chunk_count(column_count: usize, max_parallel_tasks: usize) -> usize {
    match chunk_size(column_count, max_parallel_tasks) {
        0 => 0,
        size => column_count.div_ceil(size),
    }
}

/// Plans creating and populating an attributes table.
#[derive(Debug, Clone)]
pub struct AttributesTablePlanner {
    database: String,
    schema: String,
    table: String,
    suffix: String,
    max_parallel_tasks: usize,
    layout: TaskLayout,
}

impl AttributesTablePlanner {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        table: impl Into<String>,
        suffix: impl Into<String>,
        max_parallel_tasks: usize,
        layout: TaskLayout,
    ) -> Result<Self> {
        let planner = Self {
            database: database.into(),
            schema: schema.into(),
            table: table.into(),
            suffix: suffix.into(),
            max_parallel_tasks,
            layout,
        };
        validate_identifier(&planner.schema)?;
        validate_identifier(&planner.table)?;
        if planner.suffix.is_empty() {
            return Err(PlanError::Config(
                "attributes table suffix must not be empty".to_string(),
            ));
        }
        validate_identifier(&planner.attributes_table())?;
        if max_parallel_tasks == 0 {
            return Err(PlanError::Config(
                "max_parallel_tasks must be at least 1".to_string(),
            ));
        }
        Ok(planner)
    }

    /// Unqualified name of the attributes table.
    pub fn attributes_table(&self) -> String {
        format!("{}{}", self.table, self.suffix)
    }

    pub async fn plan(&self, catalog: &dyn CatalogIntrospector) -> Result<Plan> {
        let plan = assemble(self, catalog).await?;
        info!(
            "Planned attributes table {}.{}: {} tasks",
            self.schema,
            self.attributes_table(),
            plan.len()
        );
        Ok(plan)
    }

    fn create_table_sql(&self) -> Result<String> {
        let target = qualify(&self.schema, &self.attributes_table())?;
        Ok(format!(
            "DROP TABLE IF EXISTS {target};\n\
             \n\
             CREATE TABLE {target} (\n    \
                 attribute TEXT NOT NULL,\n    \
                 value     TEXT NOT NULL,\n    \
                 row_count BIGINT NOT NULL\n\
             ) PARTITION BY LIST (attribute);"
        ))
    }

    /// Create, fill and index the partition of one column.
    pub fn partition_sql(&self, partition: &AttributePartition) -> Result<String> {
        let parent_name = self.attributes_table();
        let parent = qualify(&self.schema, &parent_name)?;
        let partition_name = format!("{}_{}", parent_name, partition.partition_id);
        let partition_table = qualify(&self.schema, &partition_name)?;
        let index_name = quote_ident(&format!("{}__value", partition_name))?;
        let source = qualify(&self.schema, &self.table)?;
        let attribute = quote_literal(&partition.column_name)?;
        let column = quote_ident(&partition.column_name)?;

        Ok(format!(
            "CREATE TABLE {partition_table} PARTITION OF {parent} FOR VALUES IN ({attribute});\n\
             \n\
             INSERT INTO {partition_table}\n\
             SELECT {attribute}, {column}::text, count(*)\n\
             FROM {source}\n\
             WHERE {column} IS NOT NULL\n\
             GROUP BY {column}\n\
             ORDER BY {column};\n\
             \n\
             CREATE INDEX {index_name} ON {partition_table} USING GIN (value gin_trgm_ops);"
        ))
    }

    fn execute(&self, statement: String) -> Command {
        Command::ExecuteSql {
            database: self.database.clone(),
            statement,
        }
    }

    fn work_tasks(&self, partitions: &[AttributePartition]) -> Result<Vec<TaskNode>> {
        match self.layout {
            TaskLayout::PerColumn => partitions
                .iter()
                .map(|p| -> Result<TaskNode> {
                    Ok(TaskNode::new(
                        format!("populate_{}", p.column_name),
                        format!("Collects the attributes of column {}", p.column_name),
                    )
                    .with_command(self.execute(self.partition_sql(p)?)))
                })
                .collect(),
            TaskLayout::Chunked => {
                let size = chunk_size(partitions.len(), self.max_parallel_tasks);
                if size == 0 {
                    return Ok(Vec::new());
                }
                partitions
                    .chunks(size)
                    .enumerate()
                    .map(|(n, chunk)| -> Result<TaskNode> {
                        let commands = chunk
                            .iter()
                            .map(|p| self.partition_sql(p).map(|sql| self.execute(sql)))
                            .collect::<Result<Vec<_>>>()?;
                        Ok(TaskNode::new(
                            format!("chunk_{}", n),
                            "Processes a portion of the attributes",
                        )
                        .with_commands(commands))
                    })
                    .collect()
            }
        }
    }
}

#[async_trait]
impl PartitionStrategy for AttributesTablePlanner {
    async fn partition(&self, catalog: &dyn CatalogIntrospector) -> Result<PartitionedWork> {
        if !catalog.schema_exists(&self.schema).await? {
            return Err(PlanError::SchemaNotFound(self.schema.clone()));
        }
        let columns = catalog.text_like_columns(&self.schema, &self.table).await?;
        if columns.is_empty() {
            warn!(
                "{}.{} has no text, varchar or enum columns",
                self.schema, self.table
            );
        }
        let partitions = partitions(&columns);
        for p in &partitions {
            debug!("Partition {} <- column {}", p.partition_id, p.column_name);
        }

        let root = TaskNode::new(ROOT_TASK_ID, "Creates the attributes table")
            .with_command(self.execute(self.create_table_sql()?));
        Ok(PartitionedWork::new(root)
            .with_work(self.work_tasks(&partitions)?)
            .with_dependents(Vec::new(), DependencyPolicy::RootOnly))
    }
}
