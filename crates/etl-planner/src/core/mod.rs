//! Shared building blocks used by the catalog and the planners.
//!
//! - [`identifier`]: identifier and literal quoting for generated SQL

pub mod identifier;

pub use identifier::{qualify, quote_ident, quote_literal};
