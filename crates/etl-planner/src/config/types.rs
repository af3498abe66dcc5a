//! Configuration type definitions.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::planner::TaskLayout;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Database connection settings keyed by alias.
    #[serde(default)]
    pub databases: BTreeMap<String, DatabaseConfig>,

    /// Planner defaults.
    #[serde(default)]
    pub planning: PlanningConfig,
}

impl Config {
    /// Look up a database by alias.
    pub fn database(&self, alias: &str) -> Option<&DatabaseConfig> {
        self.databases.get(alias)
    }

    /// Resolve an optional alias against the configured default database.
    pub fn database_alias<'a>(&'a self, alias: Option<&'a str>) -> Option<&'a str> {
        alias.or(self.planning.default_database.as_deref())
    }
}

/// PostgreSQL connection settings for one database alias.
#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password. Never serialized.
    #[serde(default, skip_serializing)]
    pub password: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Planner defaults, passed explicitly into each planner at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanningConfig {
    /// Alias used when a command does not name a database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_database: Option<String>,

    /// Upper bound on concurrently running tasks in the emitted graph.
    #[serde(default = "default_max_parallel_tasks")]
    pub max_parallel_tasks: usize,

    /// Suffix appended to a table name to form its attributes table.
    #[serde(default = "default_attributes_suffix")]
    pub attributes_table_suffix: String,

    /// Task shape for attribute tables.
    #[serde(default)]
    pub attribute_layout: TaskLayout,
}

impl Default for PlanningConfig {
    fn default() -> Self {
        Self {
            default_database: None,
            max_parallel_tasks: default_max_parallel_tasks(),
            attributes_table_suffix: default_attributes_suffix(),
            attribute_layout: TaskLayout::default(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_parallel_tasks() -> usize {
    4
}

fn default_attributes_suffix() -> String {
    "_attributes".to_string()
}
