//! Identifier validation and quoting for generated SQL.
//!
//! Identifiers (schema, table, column and index names) cannot be passed as
//! statement parameters, so every name that ends up in generated DDL/DML is
//! routed through this module instead of being interpolated raw:
//!
//! 1. Validate the identifier (non-empty, no null bytes, bounded length)
//! 2. Wrap it in double quotes
//! 3. Escape embedded double quotes by doubling them
//!
//! String literals (a column name used as a partition bound, a schema name
//! compared against the catalog) go through [`quote_literal`].

use crate::error::{PlanError, Result};

/// Maximum identifier length accepted (`NAMEDATALEN - 1`).
///
/// PostgreSQL silently truncates longer names, so two generated names that
/// share a 63-byte prefix would collide.
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Check that a name can be used as an identifier.
///
/// Rejects empty identifiers, identifiers containing null bytes and
/// identifiers exceeding [`MAX_IDENTIFIER_LENGTH`].
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(PlanError::Config("Identifier cannot be empty".to_string()));
    }

    if name.contains('\0') {
        return Err(PlanError::Config(format!(
            "Identifier contains a null byte: {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(PlanError::Config(format!(
            "Identifier exceeds PostgreSQL's maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// ```ignore
/// assert_eq!(quote_ident("users")?, "\"users\"");
/// assert_eq!(quote_ident("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_ident(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Qualify a table name with its schema, quoting both parts.
pub fn qualify(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_ident(schema)?, quote_ident(table)?))
}

/// Quote a string literal, doubling embedded single quotes.
///
/// Null bytes cannot appear in PostgreSQL text and are rejected.
pub fn quote_literal(value: &str) -> Result<String> {
    if value.contains('\0') {
        return Err(PlanError::Config(format!(
            "Literal contains a null byte: {:?}",
            value
        )));
    }
    Ok(format!("'{}'", value.replace('\'', "''")))
}
