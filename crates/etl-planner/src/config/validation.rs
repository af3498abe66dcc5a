//! Configuration validation.

use super::Config;
use crate::catalog::tls::SslMode;
use crate::error::{PlanError, Result};

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    for (alias, db) in &config.databases {
        if db.host.is_empty() {
            return Err(PlanError::Config(format!(
                "databases.{}.host is required",
                alias
            )));
        }
        if db.database.is_empty() {
            return Err(PlanError::Config(format!(
                "databases.{}.database is required",
                alias
            )));
        }
        if db.user.is_empty() {
            return Err(PlanError::Config(format!(
                "databases.{}.user is required",
                alias
            )));
        }
        SslMode::parse(&db.ssl_mode)?;
    }

    let planning = &config.planning;
    if planning.max_parallel_tasks == 0 {
        return Err(PlanError::Config(
            "planning.max_parallel_tasks must be at least 1".into(),
        ));
    }
    if planning.attributes_table_suffix.is_empty() {
        return Err(PlanError::Config(
            "planning.attributes_table_suffix cannot be empty".into(),
        ));
    }
    if let Some(ref alias) = planning.default_database {
        if !config.databases.contains_key(alias) {
            return Err(PlanError::Config(format!(
                "planning.default_database '{}' is not a configured database",
                alias
            )));
        }
    }

    Ok(())
}
