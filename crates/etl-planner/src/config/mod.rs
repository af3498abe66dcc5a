//! Configuration loading and validation.

mod types;
mod validation;

pub use types::*;

use crate::catalog::PgCatalog;
use crate::error::{PlanError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Live catalog for a database alias, or the default database.
    pub fn catalog(&self, alias: Option<&str>) -> Result<PgCatalog> {
        let alias = self.database_alias(alias).ok_or_else(|| {
            PlanError::Config(
                "no database given and planning.default_database is not set".to_string(),
            )
        })?;
        let database = self
            .database(alias)
            .ok_or_else(|| PlanError::Config(format!("unknown database alias '{}'", alias)))?;
        PgCatalog::new(alias, database)
    }
}

impl DatabaseConfig {
    /// Build tokio-postgres connection settings.
    pub fn pg_config(&self) -> tokio_postgres::Config {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config.host(&self.host);
        pg_config.port(self.port);
        pg_config.dbname(&self.database);
        pg_config.user(&self.user);
        if !self.password.is_empty() {
            pg_config.password(&self.password);
        }
        pg_config.application_name("etl-planner");
        pg_config
    }
}
