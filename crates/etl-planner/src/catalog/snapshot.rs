//! Serialisable point-in-time catalog snapshots.
//!
//! A snapshot holds the same raw metadata [`PgCatalog`](super::PgCatalog)
//! reads, so planning against it applies the identical eligibility, sizing
//! and ordering rules. Plans computed from the same snapshot are identical.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    eligible_tables, sort_indexes, CatalogIntrospector, Column, ColumnInfo, IndexDef,
    RelationInfo, Table,
};
use crate::error::Result;

/// Catalog contents of one database at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogSnapshot {
    /// When the snapshot was taken, if it came from a live database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub captured_at: Option<DateTime<Utc>>,

    /// `server_version_num` of the database.
    pub server_version: i32,

    /// Schemas by name.
    #[serde(default)]
    pub schemas: BTreeMap<String, SchemaSnapshot>,
}

/// Raw metadata of one schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    #[serde(default)]
    pub relations: Vec<RelationInfo>,

    #[serde(default)]
    pub indexes: Vec<IndexDef>,

    /// Columns by table name, in catalog order.
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<ColumnInfo>>,
}

impl SchemaSnapshot {
    pub fn with_relation(mut self, relation: RelationInfo) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_index(mut self, index: IndexDef) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_columns(mut self, table: impl Into<String>, columns: Vec<ColumnInfo>) -> Self {
        self.columns.insert(table.into(), columns);
        self
    }
}

impl CatalogSnapshot {
    /// Create an empty snapshot for a server version.
    pub fn new(server_version: i32) -> Self {
        Self {
            captured_at: None,
            server_version,
            schemas: BTreeMap::new(),
        }
    }

    /// Add or replace a schema.
    pub fn with_schema(mut self, name: impl Into<String>, schema: SchemaSnapshot) -> Self {
        self.schemas.insert(name.into(), schema);
        self
    }

    /// Load a snapshot from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse a snapshot from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write the snapshot to a JSON file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[async_trait]
impl CatalogIntrospector for CatalogSnapshot {
    async fn server_version(&self) -> Result<i32> {
        Ok(self.server_version)
    }

    async fn schema_exists(&self, schema: &str) -> Result<bool> {
        Ok(self.schemas.contains_key(schema))
    }

    async fn tables(&self, schema: &str) -> Result<Vec<Table>> {
        Ok(self
            .schemas
            .get(schema)
            .map(|s| eligible_tables(schema, &s.relations))
            .unwrap_or_default())
    }

    async fn indexes(&self, schema: &str) -> Result<Vec<IndexDef>> {
        let mut indexes = self
            .schemas
            .get(schema)
            .map(|s| s.indexes.clone())
            .unwrap_or_default();
        sort_indexes(&mut indexes);
        Ok(indexes)
    }

    async fn text_like_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>> {
        Ok(self
            .schemas
            .get(schema)
            .and_then(|s| s.columns.get(table))
            .map(|columns| columns.iter().filter_map(ColumnInfo::to_column).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RelKind, TableKind, TypeCategory};

    fn snapshot() -> CatalogSnapshot {
        let schema = SchemaSnapshot::default()
            .with_relation(RelationInfo {
                name: "orders".to_string(),
                kind: RelKind::OrdinaryTable,
                has_subclass: false,
                physical_size: 100.0,
            })
            .with_relation(RelationInfo {
                name: "events".to_string(),
                kind: RelKind::ForeignTable,
                has_subclass: false,
                physical_size: 30.0,
            })
            .with_relation(RelationInfo {
                name: "measurements".to_string(),
                kind: RelKind::OrdinaryTable,
                has_subclass: true,
                physical_size: 1000.0,
            })
            .with_index(IndexDef {
                name: "orders_pkey".to_string(),
                table: "orders".to_string(),
                ddl: "CREATE UNIQUE INDEX orders_pkey ON dwh.orders USING btree (id)".to_string(),
                size_estimate: 100.0,
            })
            .with_columns(
                "orders",
                vec![
                    ColumnInfo {
                        name: "id".to_string(),
                        data_type: "integer".to_string(),
                        is_enum: false,
                    },
                    ColumnInfo {
                        name: "status".to_string(),
                        data_type: "USER-DEFINED".to_string(),
                        is_enum: true,
                    },
                ],
            );
        CatalogSnapshot::new(150004).with_schema("dwh", schema)
    }

    #[tokio::test]
    async fn test_snapshot_tables() {
        let catalog = snapshot();
        let tables = catalog.tables("dwh").await.unwrap();
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].name, "events");
        assert_eq!(tables[0].kind, TableKind::Foreign);
        assert_eq!(tables[0].size_estimate, 300.0);
        assert_eq!(tables[1].name, "orders");
    }

    #[tokio::test]
    async fn test_snapshot_unknown_schema() {
        let catalog = snapshot();
        assert!(catalog.schema_exists("dwh").await.unwrap());
        assert!(!catalog.schema_exists("nope").await.unwrap());
        assert!(catalog.tables("nope").await.unwrap().is_empty());
        assert!(catalog.indexes("nope").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_columns() {
        let catalog = snapshot();
        let columns = catalog.text_like_columns("dwh", "orders").await.unwrap();
        assert_eq!(columns.len(), 1);
        assert_eq!(columns[0].name, "status");
        assert_eq!(columns[0].type_category, TypeCategory::Enum);
        assert!(catalog
            .text_like_columns("dwh", "missing")
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_json_round_trip() {
        let catalog = snapshot();
        let json = catalog.to_json().unwrap();
        assert!(!json.contains("captured_at"));
        assert_eq!(CatalogSnapshot::from_json(&json).unwrap(), catalog);
    }

    #[test]
    fn test_save_and_load() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let catalog = snapshot();
        catalog.save(file.path()).unwrap();
        let loaded = CatalogSnapshot::load(file.path()).unwrap();
        assert_eq!(loaded, catalog);
    }
}
