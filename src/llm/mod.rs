pub mod models;
pub mod parse;
pub mod pricing;
pub mod prompt;
pub mod providers;

use crate::config::LlmConfig;
use crate::llm::models::{GenerationOutput, GenerationRequest};
use async_trait::async_trait;
use std::error::Error;
use std::fmt;

#[derive(Debug)]
pub enum LlmError {
    Connection(String),
    Response(String),
    Parse(String),
    Config(String),
    Timeout(String),
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmError::Connection(msg) => write!(f, "LLM connection error: {}", msg),
            LlmError::Response(msg) => write!(f, "LLM response error: {}", msg),
            LlmError::Parse(msg) => write!(f, "LLM response parse error: {}", msg),
            LlmError::Config(msg) => write!(f, "LLM configuration error: {}", msg),
            LlmError::Timeout(msg) => write!(f, "LLM call timed out: {}", msg),
        }
    }
}

impl Error for LlmError {}

/// Generation client seam. One call, no internal retries: a provider-side
/// failure surfaces to the orchestrator, and retrying is a user-driven
/// refinement action.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, LlmError>;
}

/// Dispatches to the configured provider backend.
pub struct LlmManager {
    generator: Box<dyn SqlGenerator>,
}

impl LlmManager {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let generator: Box<dyn SqlGenerator> = match config.backend.as_str() {
            "remote" => Box::new(providers::remote::RemoteLlmProvider::new(config)?),
            "ollama" => Box::new(providers::ollama::OllamaProvider::new(config)?),
            _ => {
                return Err(LlmError::Config(format!(
                    "Unsupported LLM backend: {}",
                    config.backend
                )));
            }
        };

        Ok(Self { generator })
    }
}

#[async_trait]
impl SqlGenerator for LlmManager {
    async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutput, LlmError> {
        self.generator.generate(request).await
    }
}
