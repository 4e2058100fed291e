use crate::config::LlmConfig;
use crate::llm::models::{GenerationOutput, GenerationRequest, TokenUsage};
use crate::llm::{LlmError, SqlGenerator, parse, prompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// OpenAI-compatible chat-completions provider.
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct PromptRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct Usage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = config.api_url.clone().ok_or_else(|| {
            LlmError::Config("API URL is required for remote LLM provider".to_string())
        })?;

        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::Config("API key is required for remote LLM provider".to_string())
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl SqlGenerator for RemoteLlmProvider {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, LlmError> {
        let prompt_text = prompt::build_prompt(request);
        debug!("Prepared LLM prompt ({} chars)", prompt_text.len());

        let body = PromptRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt_text,
            }],
            // Deterministic output for consistent SQL generation.
            temperature: 0.0,
            max_tokens: 2000,
        };

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
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
            return Err(LlmError::Response(format!(
                "API responded with status code: {}",
                response.status()
            )));
        }

        let parsed: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Response(e.to_string()))?;

        let choice = parsed
            .choices
            .first()
            .ok_or_else(|| LlmError::Response("No choices in response".to_string()))?;

        let (sql, explanation) = parse::parse_response(&choice.message.content)?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        info!(
            "Generated SQL. Tokens: {} in, {} out",
            usage.input_tokens, usage.output_tokens
        );

        Ok(GenerationOutput {
            sql,
            explanation,
            usage,
        })
    }
}
