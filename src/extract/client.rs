//! HTTP client for the extraction model backend
//!
//! The backend owns model selection and transport; this client owns the
//! request shape and nothing else. There is no retry here: an extraction
//! failure marks the document failed and a human re-runs it explicitly.

use crate::config::ModelConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

/// Token usage reported by the backend
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default, alias = "input_tokens", alias = "promptTokens")]
    pub prompt_tokens: Option<i64>,
    #[serde(default, alias = "output_tokens", alias = "completionTokens")]
    pub completion_tokens: Option<i64>,
}

/// Raw model output: the text to parse plus usage accounting
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateOutput {
    pub text: String,
    #[serde(default)]
    pub usage: TokenUsage,
}

/// Seam for the extraction model collaborator
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Submit a document plus the prompt pair and return the raw response
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        file_bytes: &[u8],
        mime_type: &str,
    ) -> Result<GenerateOutput>;
}

#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    system: &'a str,
    user: &'a str,
    file_base64: String,
    file_mime: &'a str,
    max_tokens: u32,
}

/// HTTP model client for the configured generate endpoint
pub struct HttpModelClient {
    client: Client,
    base_url: Url,
    model: String,
    max_tokens: u32,
}

impl HttpModelClient {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        let base_url = Url::parse(&config.backend_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url,
            model: config.name.clone(),
            max_tokens: config.max_tokens,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| Error::Config(format!("Invalid model backend URL: {}", e)))
    }
}

#[async_trait]
impl ModelClient for HttpModelClient {
    async fn generate(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        file_bytes: &[u8],
        mime_type: &str,
    ) -> Result<GenerateOutput> {
        let url = self.endpoint("/v1/generate")?;
        let request = GenerateRequest {
            model: &self.model,
            system: system_prompt,
            user: user_prompt,
            file_base64: STANDARD.encode(file_bytes),
            file_mime: mime_type,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Model(e.to_string()))?;

        let response = response
            .error_for_status()
            .map_err(|e| Error::Model(e.to_string()))?;

        response
            .json::<GenerateOutput>()
            .await
            .map_err(|e| Error::Model(format!("Malformed backend response: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(base_url: &str) -> ModelConfig {
        ModelConfig {
            backend_url: base_url.to_string(),
            name: "extraction-model".to_string(),
            max_tokens: 4096,
            timeout_secs: 5,
            prompt_id: "extraction-v1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_generate_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .and(body_partial_json(serde_json::json!({
                "model": "extraction-model",
                "file_mime": "application/pdf"
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "{\"ok\": true}",
                "usage": {"prompt_tokens": 1500, "completion_tokens": 400}
            })))
            .mount(&server)
            .await;

        let client = HttpModelClient::new(&test_config(&server.uri())).unwrap();
        let output = client
            .generate("system", "user", b"%PDF-1.4", "application/pdf")
            .await
            .unwrap();

        assert_eq!(output.text, "{\"ok\": true}");
        assert_eq!(output.usage.prompt_tokens, Some(1500));
        assert_eq!(output.usage.completion_tokens, Some(400));
    }

    #[tokio::test]
    async fn test_generate_usage_alias_fields() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "{}",
                "usage": {"input_tokens": 10, "output_tokens": 2}
            })))
            .mount(&server)
            .await;

        let client = HttpModelClient::new(&test_config(&server.uri())).unwrap();
        let output = client
            .generate("system", "user", b"bytes", "application/pdf")
            .await
            .unwrap();
        assert_eq!(output.usage.prompt_tokens, Some(10));
    }

    #[tokio::test]
    async fn test_generate_server_error_is_model_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/generate"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = HttpModelClient::new(&test_config(&server.uri())).unwrap();
        let err = client
            .generate("system", "user", b"bytes", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Model(_)));
    }
}
