//! Error types for the planning library.

use thiserror::Error;

/// Main error type for planning operations.
#[derive(Error, Debug)]
pub enum PlanError {
    /// Configuration error (invalid YAML, missing fields, unknown alias, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog query failed on the source database
    #[error("Catalog query failed: {0}")]
    Catalog(#[from] tokio_postgres::Error),

    /// Could not open a catalog connection
    #[error("Connection error: {message}\n  Context: {context}")]
    Connection { message: String, context: String },

    /// The schema to plan for does not exist in the source database
    #[error("Schema '{0}' does not exist in the source database")]
    SchemaNotFound(String),

    /// Invalid input at a component boundary (bucket count, weights)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Task graph invariant violated
    #[error("Invalid task graph: {0}")]
    InvalidGraph(String),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PlanError {
    /// Create a Connection error with context about where it occurred
    pub fn connection(message: impl ToString, context: impl Into<String>) -> Self {
        PlanError::Connection {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an InvalidGraph error
    pub fn graph(message: impl Into<String>) -> Self {
        PlanError::InvalidGraph(message.into())
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            PlanError::Config(_) | PlanError::Yaml(_) => 2,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for planning operations.
pub type Result<T> = std::result::Result<T, PlanError>;
