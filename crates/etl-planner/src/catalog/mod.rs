//! Catalog introspection: what the source database looks like at plan time.
//!
//! The planners only see the source through [`CatalogIntrospector`]. Two
//! implementations exist:
//!
//! - [`PgCatalog`]: live PostgreSQL, one scoped connection per call
//! - [`CatalogSnapshot`]: a serialisable point-in-time copy of the same data
//!
//! Eligibility and sizing rules live here in Rust rather than in SQL, so
//! both implementations agree on which relations are copied and how much
//! they weigh.

pub mod postgres;
pub mod snapshot;
pub mod tls;

pub use postgres::PgCatalog;
pub use snapshot::{CatalogSnapshot, SchemaSnapshot};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::identifier::qualify;
use crate::error::Result;

/// Size multiplier for foreign (columnar) tables.
///
/// Their reported physical footprint under-represents how long a row-by-row
/// copy takes. Empirical, tunable.
pub const FOREIGN_TABLE_SIZE_FACTOR: f64 = 10.0;

/// Relation kind as stored in `pg_class.relkind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelKind {
    OrdinaryTable,
    ForeignTable,
    PartitionedTable,
    View,
    MaterializedView,
    Index,
    Sequence,
    Other,
}

impl RelKind {
    /// Map a `relkind` code to a kind.
    pub fn from_code(code: &str) -> Self {
        match code {
            "r" => Self::OrdinaryTable,
            "f" => Self::ForeignTable,
            "p" => Self::PartitionedTable,
            "v" => Self::View,
            "m" => Self::MaterializedView,
            "i" | "I" => Self::Index,
            "S" => Self::Sequence,
            _ => Self::Other,
        }
    }

    /// The copyable table kind, if any.
    pub fn table_kind(self) -> Option<TableKind> {
        match self {
            Self::OrdinaryTable => Some(TableKind::Ordinary),
            Self::ForeignTable => Some(TableKind::Foreign),
            _ => None,
        }
    }
}

/// Kind of a copyable table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Ordinary,
    Foreign,
}

/// Raw relation metadata as read from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationInfo {
    pub name: String,
    pub kind: RelKind,
    /// True when the relation has inheritance children or partitions.
    #[serde(default)]
    pub has_subclass: bool,
    /// Physical footprint in bytes.
    pub physical_size: f64,
}

/// A table eligible for copying.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub schema: String,
    pub name: String,
    pub kind: TableKind,
    /// Approximate copy cost (bytes, scaled for foreign tables).
    pub size_estimate: f64,
}

impl Table {
    /// Build a table from raw relation metadata.
    ///
    /// Returns `None` for relations that are not ordinary/foreign tables or
    /// that have subclasses (their rows would otherwise be counted twice).
    pub fn from_relation(schema: &str, relation: &RelationInfo) -> Option<Self> {
        if relation.has_subclass {
            return None;
        }
        let kind = relation.kind.table_kind()?;
        let size_estimate = match kind {
            TableKind::Ordinary => relation.physical_size,
            TableKind::Foreign => relation.physical_size * FOREIGN_TABLE_SIZE_FACTOR,
        };
        Some(Self {
            schema: schema.to_string(),
            name: relation.name.clone(),
            kind,
            size_estimate,
        })
    }

    /// Unquoted `schema.table`, for logging.
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }

    /// Quoted `"schema"."table"`, for generated SQL.
    pub fn qualified_name(&self) -> Result<String> {
        qualify(&self.schema, &self.name)
    }
}

/// An index to rebuild on the target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    /// Owning table.
    pub table: String,
    /// Complete `CREATE INDEX` statement.
    pub ddl: String,
    /// Total size of the owning relation.
    pub size_estimate: f64,
}

/// Column category eligible for attribute extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeCategory {
    Text,
    Varchar,
    Enum,
}

/// A qualifying text-like column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub type_category: TypeCategory,
}

/// Raw column metadata as read from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// `information_schema.columns.data_type`.
    pub data_type: String,
    /// True when the column's type is an enum.
    #[serde(default)]
    pub is_enum: bool,
}

impl ColumnInfo {
    /// The attribute category of this column, if it qualifies.
    pub fn type_category(&self) -> Option<TypeCategory> {
        if self.is_enum {
            return Some(TypeCategory::Enum);
        }
        match self.data_type.as_str() {
            "text" => Some(TypeCategory::Text),
            "character varying" | "varchar" => Some(TypeCategory::Varchar),
            _ => None,
        }
    }

    /// Convert to a qualifying column, if it qualifies.
    pub fn to_column(&self) -> Option<Column> {
        self.type_category().map(|type_category| Column {
            name: self.name.clone(),
            type_category,
        })
    }
}

/// Read access to source database metadata at plan time.
///
/// `tables` and `indexes` return items ordered by size estimate descending
/// (name as tie-break); `text_like_columns` returns catalog column order.
#[async_trait]
pub trait CatalogIntrospector: Send + Sync {
    /// `server_version_num` of the source database.
    async fn server_version(&self) -> Result<i32>;

    /// Whether the schema exists.
    async fn schema_exists(&self, schema: &str) -> Result<bool>;

    /// Copyable tables of a schema.
    async fn tables(&self, schema: &str) -> Result<Vec<Table>>;

    /// Index definitions of a schema, weighted by owning relation size.
    async fn indexes(&self, schema: &str) -> Result<Vec<IndexDef>>;

    /// Text, varchar and enum columns of a table.
    async fn text_like_columns(&self, schema: &str, table: &str) -> Result<Vec<Column>>;
}

/// Tables of a schema in the order every introspector returns them.
pub(crate) fn eligible_tables(schema: &str, relations: &[RelationInfo]) -> Vec<Table> {
    let mut tables: Vec<Table> = relations
        .iter()
        .filter_map(|relation| Table::from_relation(schema, relation))
        .collect();
    tables.sort_by(|a, b| {
        b.size_estimate
            .total_cmp(&a.size_estimate)
            .then_with(|| a.name.cmp(&b.name))
    });
    tables
}

/// Sort index definitions by size descending, then name.
pub(crate) fn sort_indexes(indexes: &mut [IndexDef]) {
    indexes.sort_by(|a, b| {
        b.size_estimate
            .total_cmp(&a.size_estimate)
            .then_with(|| a.name.cmp(&b.name))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relation(name: &str, kind: RelKind, has_subclass: bool, size: f64) -> RelationInfo {
        RelationInfo {
            name: name.to_string(),
            kind,
            has_subclass,
            physical_size: size,
        }
    }

    #[test]
    fn test_relkind_codes() {
        assert_eq!(RelKind::from_code("r"), RelKind::OrdinaryTable);
        assert_eq!(RelKind::from_code("f"), RelKind::ForeignTable);
        assert_eq!(RelKind::from_code("p"), RelKind::PartitionedTable);
        assert_eq!(RelKind::from_code("I"), RelKind::Index);
        assert_eq!(RelKind::from_code("?"), RelKind::Other);
    }

    #[test]
    fn test_foreign_tables_are_scaled() {
        let table =
            Table::from_relation("dwh", &relation("facts", RelKind::ForeignTable, false, 5.0))
                .unwrap();
        assert_eq!(table.kind, TableKind::Foreign);
        assert_eq!(table.size_estimate, 50.0);

        let table =
            Table::from_relation("dwh", &relation("dims", RelKind::OrdinaryTable, false, 5.0))
                .unwrap();
        assert_eq!(table.size_estimate, 5.0);
    }

    #[test]
    fn test_ineligible_relations_are_skipped() {
        assert!(Table::from_relation("s", &relation("parent", RelKind::OrdinaryTable, true, 1.0)).is_none());
        assert!(Table::from_relation("s", &relation("v", RelKind::View, false, 0.0)).is_none());
        assert!(Table::from_relation("s", &relation("p", RelKind::PartitionedTable, false, 0.0)).is_none());
        assert!(Table::from_relation("s", &relation("m", RelKind::MaterializedView, false, 9.0)).is_none());
    }

    #[test]
    fn test_eligible_tables_order() {
        let relations = vec![
            relation("small", RelKind::OrdinaryTable, false, 1.0),
            relation("b_tie", RelKind::OrdinaryTable, false, 20.0),
            relation("a_tie", RelKind::OrdinaryTable, false, 20.0),
            relation("columnar", RelKind::ForeignTable, false, 3.0),
        ];
        let names: Vec<String> = eligible_tables("s", &relations)
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["columnar", "a_tie", "b_tie", "small"]);
    }

    #[test]
    fn test_column_categories() {
        let info = |name: &str, data_type: &str, is_enum: bool| ColumnInfo {
            name: name.to_string(),
            data_type: data_type.to_string(),
            is_enum,
        };
        assert_eq!(info("a", "integer", false).type_category(), None);
        assert_eq!(info("b", "text", false).type_category(), Some(TypeCategory::Text));
        assert_eq!(
            info("c", "character varying", false).type_category(),
            Some(TypeCategory::Varchar)
        );
        assert_eq!(
            info("d", "USER-DEFINED", true).type_category(),
            Some(TypeCategory::Enum)
        );
        assert_eq!(info("e", "USER-DEFINED", false).to_column(), None);
    }

    #[test]
    fn test_table_names() {
        let table = Table {
            schema: "dwh".to_string(),
            name: "Order".to_string(),
            kind: TableKind::Ordinary,
            size_estimate: 0.0,
        };
        assert_eq!(table.full_name(), "dwh.Order");
        assert_eq!(table.qualified_name().unwrap(), "\"dwh\".\"Order\"");
    }
}
