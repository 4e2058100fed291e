use serde::{Deserialize, Serialize};

/// Token accounting for one model call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Context from a prior attempt, supplied on refinement. Its presence
/// changes the prompt shape, not just the retry count.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriorAttempt {
    pub sql: String,
    pub error: Option<String>,
    pub refinement: String,
}

/// Input to one SQL generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub question: String,
    pub schema_text: String,
    pub prior: Option<PriorAttempt>,
}

/// Parsed output of one SQL generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationOutput {
    pub sql: String,
    pub explanation: String,
    pub usage: TokenUsage,
}
