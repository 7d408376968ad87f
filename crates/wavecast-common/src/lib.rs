//! Wavecast Common - Shared types, configuration and errors
//!
//! This crate provides the types shared across the Wavecast campaign
//! engine: identifiers, E.164 phone number handling, configuration
//! loading and the workspace-wide error type.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result};
