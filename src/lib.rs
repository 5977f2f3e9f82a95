//! Deduplicating aggregation over per-message LLM extractions.
//!
//! The upstream enrichment stage writes four extraction payloads per email
//! into SQLite. This crate reads the completed snapshot, clusters project
//! mentions under canonical names, merges stakeholder mentions into
//! cross-address profiles, optionally scores each cluster for relevance to
//! the user's role, and writes the aggregated JSON documents.

pub mod clusterer;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
mod migrations;
pub mod pipeline;
pub mod stakeholders;
pub mod types;
pub mod util;
