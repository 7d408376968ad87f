//! HTTP client for the hosted messaging gateway
//!
//! Speaks the graph-style template-message API: sends go to
//! `POST {base}/{phone_number_id}/messages`, template lookups to
//! `GET {base}/{business_account_id}/message_templates`.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use wavecast_common::config::GatewayConfig;

use super::{ChannelGateway, GatewayError, SendRequest};

/// Hosted gateway client
pub struct CloudGateway {
    config: GatewayConfig,
    client: Client,
}

#[derive(Debug, Serialize)]
struct TemplateMessage<'a> {
    messaging_product: &'static str,
    to: &'a str,
    #[serde(rename = "type")]
    message_type: &'static str,
    template: TemplateBody<'a>,
}

#[derive(Debug, Serialize)]
struct TemplateBody<'a> {
    name: &'a str,
    language: LanguageCode<'a>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    components: Vec<Component>,
}

#[derive(Debug, Serialize)]
struct LanguageCode<'a> {
    code: &'a str,
}

#[derive(Debug, Serialize)]
struct Component {
    #[serde(rename = "type")]
    component_type: &'static str,
    parameters: Vec<Parameter>,
}

#[derive(Debug, Serialize)]
struct Parameter {
    #[serde(rename = "type")]
    parameter_type: &'static str,
    text: String,
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    #[serde(default)]
    messages: Vec<MessageId>,
}

#[derive(Debug, Deserialize)]
struct MessageId {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: i64,
}

#[derive(Debug, Deserialize)]
struct TemplateListResponse {
    #[serde(default)]
    data: Vec<TemplateEntry>,
}

#[derive(Debug, Deserialize)]
struct TemplateEntry {
    #[allow(dead_code)]
    name: String,
}

impl CloudGateway {
    /// Create a new gateway client from configuration
    pub fn new(config: GatewayConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .unwrap_or_default();

        Self { config, client }
    }

    fn classify_error(status: StatusCode, body: Option<ApiErrorBody>) -> GatewayError {
        let (message, code) = body
            .and_then(|b| b.error)
            .map(|e| (e.message, e.code))
            .unwrap_or_default();

        if status == StatusCode::TOO_MANY_REQUESTS || code == 130429 {
            return GatewayError::RateLimited;
        }
        if status.is_server_error() {
            return GatewayError::Unavailable(format!("{}: {}", status, message));
        }

        // Graph error codes: 131026 undeliverable, 131030 recipient not
        // in allowed list; 132xxx template errors.
        match code {
            131026 | 131030 => GatewayError::InvalidRecipient(message),
            c if (132000..133000).contains(&c) => GatewayError::TemplateRejected(message),
            _ => GatewayError::TemplateRejected(format!("{}: {}", status, message)),
        }
    }
}

#[async_trait]
impl ChannelGateway for CloudGateway {
    async fn send_template(&self, request: &SendRequest) -> Result<String, GatewayError> {
        let url = format!(
            "{}/{}/messages",
            self.config.base_url, self.config.phone_number_id
        );

        let components = if request.variables.is_empty() {
            Vec::new()
        } else {
            vec![Component {
                component_type: "body",
                parameters: request
                    .variables
                    .iter()
                    .map(|text| Parameter {
                        parameter_type: "text",
                        text: text.clone(),
                    })
                    .collect(),
            }]
        };

        let body = TemplateMessage {
            messaging_product: "whatsapp",
            to: &request.to,
            message_type: "template",
            template: TemplateBody {
                name: &request.template_name,
                language: LanguageCode {
                    code: &request.language,
                },
                components,
            },
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Unavailable(e.to_string())
                }
            })?;

        let status = response.status();
        if status.is_success() {
            let parsed: SendResponse = response
                .json()
                .await
                .map_err(|e| GatewayError::Unavailable(format!("Malformed response: {}", e)))?;

            return parsed
                .messages
                .into_iter()
                .next()
                .map(|m| m.id)
                .ok_or_else(|| {
                    GatewayError::Unavailable("Response carried no message id".to_string())
                });
        }

        let error_body: Option<ApiErrorBody> = response.json().await.ok();
        let error = Self::classify_error(status, error_body);
        warn!(to = %request.to, %error, "Gateway rejected send");
        Err(error)
    }

    async fn template_exists(&self, template_name: &str) -> Result<bool, GatewayError> {
        let url = format!(
            "{}/{}/message_templates",
            self.config.base_url, self.config.business_account_id
        );

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.config.access_token)
            .query(&[("name", template_name)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Unavailable(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "Template lookup failed: {}",
                response.status()
            )));
        }

        let parsed: TemplateListResponse = response
            .json()
            .await
            .map_err(|e| GatewayError::Unavailable(format!("Malformed response: {}", e)))?;

        debug!(
            template = template_name,
            matches = parsed.data.len(),
            "Template lookup"
        );
        Ok(!parsed.data.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: String) -> GatewayConfig {
        GatewayConfig {
            base_url,
            phone_number_id: "10001".to_string(),
            business_account_id: "20002".to_string(),
            access_token: "token".to_string(),
            timeout_ms: 2000,
            webhook_verify_token: None,
            app_secret: None,
        }
    }

    fn request() -> SendRequest {
        SendRequest {
            to: "+15550102345".to_string(),
            template_name: "order_update".to_string(),
            language: "en".to_string(),
            variables: vec!["Alice".to_string(), "42".to_string()],
        }
    }

    #[tokio::test]
    async fn test_send_template_returns_message_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/10001/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "messages": [{"id": "wamid.ABC123"}]
            })))
            .mount(&server)
            .await;

        let gateway = CloudGateway::new(test_config(server.uri()));
        let id = gateway.send_template(&request()).await.unwrap();
        assert_eq!(id, "wamid.ABC123");
    }

    #[tokio::test]
    async fn test_send_template_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/10001/messages"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let gateway = CloudGateway::new(test_config(server.uri()));
        let err = gateway.send_template(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::RateLimited));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_send_template_invalid_recipient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/10001/messages"))
            .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
                "error": {"message": "Message undeliverable", "code": 131026}
            })))
            .mount(&server)
            .await;

        let gateway = CloudGateway::new(test_config(server.uri()));
        let err = gateway.send_template(&request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::InvalidRecipient(_)));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_template_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/20002/message_templates"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"name": "order_update"}]
            })))
            .mount(&server)
            .await;

        let gateway = CloudGateway::new(test_config(server.uri()));
        assert!(gateway.template_exists("order_update").await.unwrap());
    }
}
