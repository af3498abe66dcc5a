//! Live PostgreSQL catalog introspection.
//!
//! Every trait call opens its own connection, runs its queries and drops the
//! connection before returning. Nothing is pooled or held across calls.

use async_trait::async_trait;
use chrono::Utc;
use tokio_postgres::{Client, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{debug, info, warn};

use super::snapshot::{CatalogSnapshot, SchemaSnapshot};
use super::tls::SslMode;
use super::{
    eligible_tables, sort_indexes, CatalogIntrospector, Column, ColumnInfo, IndexDef, RelKind,
    RelationInfo, Table,
};
use crate::config::DatabaseConfig;
use crate::error::{PlanError, Result};

const RELATIONS_QUERY: &str = r#"
    SELECT
        c.relname,
        c.relkind::text,
        c.relhassubclass,
        COALESCE({size_expr}, 0)::float8 AS size
    FROM pg_catalog.pg_class c
    JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
    WHERE n.nspname = $1
      AND c.relkind IN ('r', 'f', 'p', 'v', 'm')
    ORDER BY size DESC, c.relname
"#;

const INDEXES_QUERY: &str = r#"
    SELECT
        ic.relname,
        t.relname,
        pg_catalog.pg_get_indexdef(ic.oid),
        pg_catalog.pg_total_relation_size(t.oid)::float8 AS size
    FROM pg_catalog.pg_index x
    JOIN pg_catalog.pg_class ic ON ic.oid = x.indexrelid
    JOIN pg_catalog.pg_class t ON t.oid = x.indrelid
    JOIN pg_catalog.pg_namespace n ON n.oid = ic.relnamespace
    WHERE n.nspname = $1
      AND ic.relkind = 'i'
    ORDER BY size DESC, ic.relname
"#;

const COLUMNS_QUERY: &str = r#"
    SELECT
        col.column_name::text,
        col.data_type::text,
        EXISTS (
            SELECT 1
            FROM pg_catalog.pg_type t
            JOIN pg_catalog.pg_namespace tn ON tn.oid = t.typnamespace
            WHERE t.typtype = 'e'
              AND tn.nspname = col.udt_schema
              AND t.typname = col.udt_name
        ) AS is_enum
    FROM information_schema.columns col
    WHERE col.table_schema = $1 AND col.table_name = $2
    ORDER BY col.ordinal_position
"#;

/// Live catalog of one PostgreSQL database.
pub struct PgCatalog {
    alias: String,
    pg_config: tokio_postgres::Config,
    tls: Option<MakeRustlsConnect>,
}

impl PgCatalog {
    /// Create a catalog for a configured database. Does not connect.
    pub fn new(alias: impl Into<String>, config: &DatabaseConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        if ssl_mode == SslMode::Disable {
            debug!("TLS disabled for catalog connections to {}", config.host);
        }
        Ok(Self {
            alias: alias.into(),
            pg_config: config.pg_config(),
            tls: ssl_mode.connector()?,
        })
    }

    /// The database alias this catalog reads from.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Open a scoped connection. The connection task ends when the client drops.
    async fn connect(&self, context: &str) -> Result<Client> {
        let context = format!("{} on '{}'", context, self.alias);
        match &self.tls {
            None => {
                let (client, connection) = self
                    .pg_config
                    .connect(NoTls)
                    .await
                    .map_err(|e| PlanError::connection(e, context))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("Catalog connection closed with error: {}", e);
                    }
                });
                Ok(client)
            }
            Some(tls) => {
                let (client, connection) = self
                    .pg_config
                    .connect(tls.clone())
                    .await
                    .map_err(|e| PlanError::connection(e, context))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        warn!("Catalog connection closed with error: {}", e);
                    }
                });
                Ok(client)
            }
        }
    }

    async fn load_relations(client: &Client, schema: &str) -> Result<Vec<RelationInfo>> {
        // cstore_fdw tables report no size through pg_total_relation_size
        let has_cstore = client
            .query_one(
                "SELECT to_regproc('cstore_table_size') IS NOT NULL",
                &[],
            )
            .await?
            .get::<_, bool>(0);
        let size_expr = if has_cstore {
            "CASE WHEN c.relkind = 'f' \
                  THEN cstore_table_size(c.oid::regclass) \
                  ELSE pg_catalog.pg_total_relation_size(c.oid) END"
        } else {
            "pg_catalog.pg_total_relation_size(c.oid)"
        };
        let query = RELATIONS_QUERY.replace("{size_expr}", size_expr);

        let rows = client.query(query.as_str(), &[&schema]).await?;
        let relations = rows
            .iter()
            .map(|row| RelationInfo {
                name: row.get(0),
                kind: RelKind::from_code(row.get::<_, &str>(1)),
                has_subclass: row.get(2),
                physical_size: row.get(3),
            })
            .collect();
        Ok(relations)
    }

    async fn load_indexes(client: &Client, schema: &str) -> Result<Vec<IndexDef>> {
        let rows = client.query(INDEXES_QUERY, &[&schema]).await?;
        let mut indexes: Vec<IndexDef> = rows
            .iter()
            .map(|row| IndexDef {
                name: row.get(0),
                table: row.get(1),
                ddl: row.get(2),
                size_estimate: row.get(3),
            })
            .collect();
        sort_indexes(&mut indexes);
        Ok(indexes)
    }

    async fn load_columns(client: &Client, schema: &str, table: &str) -> Result<Vec<ColumnInfo>> {
        let rows = client.query(COLUMNS_QUERY, &[&schema, &table]).await?;
        Ok(rows
            .iter()
            .map(|row| ColumnInfo {
                name: row.get(0),
                data_type: row.get(1),
                is_enum: row.get(2),
            })
            .collect())
    }

    /// Capture a point-in-time snapshot of one schema.
    pub async fn snapshot(&self, schema: &str) -> Result<CatalogSnapshot> {
        let client = self.connect("capturing catalog snapshot").await?;
        let server_version = Self::query_server_version(&client).await?;
        if !Self::query_schema_exists(&client, schema).await? {
            return Err(PlanError::SchemaNotFound(schema.to_string()));
        }

        let relations = Self::load_relations(&client, schema).await?;
        let indexes = Self::load_indexes(&client, schema).await?;
        let mut schema_snapshot = SchemaSnapshot {
            relations,
            indexes,
            ..SchemaSnapshot::default()
        };
        for relation in &schema_snapshot.relations {
            if relation.kind.table_kind().is_none() {
                continue;
            }
            let columns = Self::load_columns(&client, schema, &relation.name).await?;
            schema_snapshot
                .columns
                .insert(relation.name.clone(), columns);
        }

        info!(
            "Captured snapshot of schema '{}' on '{}': {} relations, {} indexes",
            schema,
            self.alias,
            schema_snapshot.relations.len(),
            schema_snapshot.indexes.len()
        );

        let mut snapshot = CatalogSnapshot::new(server_version);
        snapshot.captured_at = Some(Utc::now());
        snapshot.schemas.insert(schema.to_string(), schema_snapshot);
        Ok(snapshot)
    }

    async fn query_server_version(client: &Client) -> Result<i32> {
        let row = client
            .query_one("SELECT current_setting('server_version_num')::int4", &[])
            .await?;
        Ok(row.get(0))
    }

    async fn query_schema_exists(client: &Client, schema: &str) -> Result<bool> {
        let row = client
            .query_one(
                "SELECT EXISTS (SELECT 1 FROM pg_catalog.pg_namespace WHERE nspname = $1)",
                &[&schema],
            )
            .await?;
        Ok(row.get(0))
    }
}

#[async_trait]
impl CatalogIntrospector for PgCatalog {
    async fn server_version(&self) -> Result<i32> {
        let client = self.connect("reading server version").await?;
        let version = Self::query_server_version(&client).await?;
        debug!("Server version of '{}': {}", self.alias, version);
        Ok(version)
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        let client = self.connect("checking schema").await?;
        Self::query_schema_exists(&client, schema).await
    }

    async fn tables(&self, schema: &str) -> Result<Vec<Table>> {
        let client = self.connect("listing tables").await?;
        let relations = Self::load_relations(&client, schema).await?;
        let tables = eligible_tables(schema, &relations);
        debug!(
            "Schema '{}': {} relations, {} copyable tables",
            schema,
            relations.len(),
            tables.len()
        );
        Ok(tables)
    }

    async fn indexes(&self, schema: &str) -> Result<Vec<IndexDef>> {
        let client = self.connect("listing indexes").await?;
        let indexes = Self::load_indexes(&client, schema).await?;
        debug!("Schema '{}': {} indexes", schema, indexes.len());
        Ok(indexes)
    }

    async fn text_like_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        let client = self.connect("listing columns").await?;
        let columns: Vec<Column> = Self::load_columns(&client, schema, table)
            .await?
            .iter()
            .filter_map(ColumnInfo::to_column)
            .collect();
        debug!(
            "{}.{}: {} text-like columns",
            schema,
            table,
            columns.len()
        );
        Ok(columns)
    }
}
