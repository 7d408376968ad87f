//! Request handlers

pub mod campaigns;
pub mod health;
pub mod webhooks;
