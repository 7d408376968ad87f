//! Channel gateway abstraction
//!
//! The messaging provider is an opaque collaborator: it accepts template
//! send requests and asynchronously reports delivery events back through
//! the webhook. The engine only depends on this trait; the HTTP client
//! lives in [`cloud`].

use async_trait::async_trait;
use thiserror::Error;

pub mod cloud;

pub use cloud::CloudGateway;

/// Gateway send errors, split by retry semantics
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    #[error("Gateway rate limit hit")]
    RateLimited,

    #[error("Gateway request timed out")]
    Timeout,

    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid recipient: {0}")]
    InvalidRecipient(String),

    #[error("Template rejected: {0}")]
    TemplateRejected(String),
}

impl GatewayError {
    /// Whether the dispatcher should retry the attempt with backoff
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::RateLimited | GatewayError::Timeout | GatewayError::Unavailable(_)
        )
    }

    /// Whether the failure points at the gateway itself rather than the
    /// recipient; an entire batch failing this way marks the campaign failed
    pub fn is_systemic(&self) -> bool {
        matches!(self, GatewayError::Timeout | GatewayError::Unavailable(_))
    }
}

/// A single template send request
#[derive(Debug, Clone)]
pub struct SendRequest {
    /// E.164-normalized destination number
    pub to: String,
    /// Template reference at the gateway
    pub template_name: String,
    /// Template language code
    pub language: String,
    /// Positional body variables, filling `{{1}}`, `{{2}}`, ... in order
    pub variables: Vec<String>,
}

/// The messaging provider boundary
#[async_trait]
pub trait ChannelGateway: Send + Sync {
    /// Send one templated message; returns the gateway-assigned message id
    async fn send_template(&self, request: &SendRequest) -> Result<String, GatewayError>;

    /// Whether a template with this name exists for the sending account
    async fn template_exists(&self, template_name: &str) -> Result<bool, GatewayError>;
}
