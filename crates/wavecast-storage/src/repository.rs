//! Repository layer for data access

pub mod campaigns;
pub mod contacts;
pub mod recipients;

pub use campaigns::CampaignRepository;
pub use contacts::ContactRepository;
pub use recipients::{AdvanceOutcome, RecipientRepository};
