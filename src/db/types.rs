//! Shared type definitions for the database layer.

use std::collections::HashMap;

use thiserror::Error;

/// Errors specific to database operations.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to create database directory: {0}")]
    CreateDir(std::io::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// A row from the `messages` table.
#[derive(Debug, Clone)]
pub struct DbMessage {
    pub id: i64,
    pub msg_id: String,
    pub subject: String,
    pub delivery_date: Option<String>,
}

/// A row from the `extractions` table.
#[derive(Debug, Clone)]
pub struct DbExtraction {
    pub message_id: i64,
    pub task_name: String,
    pub extraction_json: Option<String>,
    pub confidence: Option<String>,
}

/// One completed message with its extraction rows keyed by task name.
#[derive(Debug, Clone)]
pub struct EnrichedMessage {
    pub message: DbMessage,
    pub extractions: HashMap<String, DbExtraction>,
}

/// A row from the `cluster_filter_audit` table.
#[derive(Debug, Clone)]
pub struct DbFilterAudit {
    pub canonical_name: String,
    pub role_description: String,
    pub confidence: f64,
    pub is_relevant: bool,
    /// JSON array of reasoning strings, stored as text.
    pub reasoning: String,
    pub filtered: bool,
    pub threshold: f64,
    pub filter_version: String,
    pub filtered_at: String,
    pub updated_at: String,
}
