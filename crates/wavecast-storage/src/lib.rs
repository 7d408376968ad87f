//! Wavecast Storage - Database access layer
//!
//! This crate owns the durable entities of the campaign engine (Campaign,
//! Recipient) and the repositories over them. Statistics are derived from
//! recipient aggregates and never persisted as a source of truth.

pub mod db;
pub mod models;
pub mod repository;

pub use db::DatabasePool;
pub use models::*;
pub use repository::*;
