use crate::config::LlmConfig;
use crate::llm::models::{GenerationOutput, GenerationRequest, TokenUsage};
use crate::llm::{LlmError, SqlGenerator, parse, prompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

/// Local Ollama provider for development without a remote API key.
pub struct OllamaProvider {
    client: reqwest::Client,
    api_url: String,
    model: String,
}

#[derive(Serialize, Debug)]
struct OllamaRequest {
    model: String,
    prompt: String,
    temperature: f32,
    stream: bool,
}

#[derive(Deserialize, Debug)]
struct OllamaResponse {
    response: String,
    #[serde(default)]
    prompt_eval_count: Option<u64>,
    #[serde(default)]
    eval_count: Option<u64>,
    #[serde(flatten)]
    _extra: std::collections::HashMap<String, serde_json::Value>,
}

impl OllamaProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config
            .api_url
            .clone()
            .unwrap_or_else(|| "http://localhost:11434/api/generate".to_string());

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl SqlGenerator for OllamaProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, LlmError> {
        let prompt_text = prompt::build_prompt(request);

        info!("Sending request to Ollama with model: {}", self.model);
        debug!("API URL: {}", self.api_url);

        let body = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt_text,
            temperature: 0.0,
            stream: false,
        };

        let response = self
            .client
            .post(&self.api_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(e.to_string())
                } else {
                    LlmError::Connection(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = match response.text().await {
                Ok(text) => format!(" - Response body: {}", text),
                Err(_) => String::new(),
            };
            error!("Ollama API responded with status code: {}{}", status, error_body);
            return Err(LlmError::Response(format!(
                "Ollama API responded with status code: {}{}",
                status, error_body
            )));
        }

        let response_text = response
            .text()
            .await
            .map_err(|e| LlmError::Response(format!("Failed to read response body: {}", e)))?;

        debug!("Raw response from Ollama: {}", response_text);

        let ollama_response: OllamaResponse =
            serde_json::from_str(&response_text).map_err(|e| {
                error!("Failed to parse Ollama response: {}", e);
                LlmError::Response(format!(
                    "Failed to parse Ollama response: {} - Response was: {}",
                    e, response_text
                ))
            })?;

        let (sql, explanation) = parse::parse_response(&ollama_response.response)?;

        let usage = TokenUsage {
            input_tokens: ollama_response.prompt_eval_count.unwrap_or(0),
            output_tokens: ollama_response.eval_count.unwrap_or(0),
        };

        Ok(GenerationOutput {
            sql,
            explanation,
            usage,
        })
    }
}
