use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::phase::Phase;

/// Tenant boundary. Created and mutated by administrative tooling; the
/// pipeline only reads it and checks the monthly quota.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub id: String,
    pub name: String,
    /// Opaque credential; one credential maps to exactly one team.
    pub api_key: String,
    /// Connection descriptor for the team's target database, interpreted by
    /// the SQL executor.
    pub db_connection: String,
    pub monthly_query_count: u64,
    pub query_limit: u64,
    pub is_active: bool,
}

impl Team {
    pub fn has_quota(&self) -> bool {
        self.monthly_query_count < self.query_limit
    }
}

/// Why an attempt did not succeed. Persisted as snake_case strings; other
/// tooling depends on these exact values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    GenerationFailed,
    SecurityBlocked,
    Syntax,
    Execution,
    Timeout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    ThumbsUp,
    ThumbsDown,
}

/// The central durable record: one generation request end to end. Created
/// at the start of a request, mutated as the pipeline progresses, immutable
/// once persisted except for feedback attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAttempt {
    pub id: Uuid,
    pub team_id: String,
    /// Links refinements to their parent, forming the attempt chain.
    pub parent_id: Option<Uuid>,
    /// Starts at 1, increments by exactly 1 per refinement.
    pub attempt_number: u32,

    pub natural_language_query: String,
    pub selected_tables: Vec<String>,
    pub user_refinement: Option<String>,

    pub generated_sql: Option<String>,
    pub explanation: Option<String>,

    pub success: bool,
    pub rows_returned: Option<u64>,
    pub execution_time_ms: Option<u64>,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,

    pub cache_hit: bool,

    pub sql_syntax_valid: bool,
    pub security_check_passed: bool,
    pub validation_issues: Vec<String>,
    pub complexity_score: u8,

    pub input_tokens: u64,
    pub output_tokens: u64,
    pub estimated_cost_usd: f64,

    pub user_rating: Option<u8>,
    pub user_feedback_type: Option<FeedbackType>,
    pub user_feedback_text: Option<String>,

    /// Policy mode that produced this attempt, for audit.
    pub phase: Phase,
    pub created_at: DateTime<Utc>,
}

impl QueryAttempt {
    pub fn new(
        team_id: &str,
        question: &str,
        selected_tables: Vec<String>,
        phase: Phase,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            team_id: team_id.to_string(),
            parent_id: None,
            attempt_number: 1,
            natural_language_query: question.to_string(),
            selected_tables,
            user_refinement: None,
            generated_sql: None,
            explanation: None,
            success: false,
            rows_returned: None,
            execution_time_ms: None,
            error_kind: None,
            error_message: None,
            cache_hit: false,
            sql_syntax_valid: true,
            security_check_passed: true,
            validation_issues: Vec::new(),
            complexity_score: 1,
            input_tokens: 0,
            output_tokens: 0,
            estimated_cost_usd: 0.0,
            user_rating: None,
            user_feedback_type: None,
            user_feedback_text: None,
            phase,
            created_at: Utc::now(),
        }
    }

    /// Marks the attempt failed with a specific error kind. An unsuccessful
    /// attempt always carries a non-empty kind and message.
    pub fn fail(&mut self, kind: ErrorKind, message: impl Into<String>) {
        self.success = false;
        self.error_kind = Some(kind);
        self.error_message = Some(message.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::SecurityBlocked).unwrap(),
            "\"security_blocked\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorKind::GenerationFailed).unwrap(),
            "\"generation_failed\""
        );
        assert_eq!(serde_json::to_string(&ErrorKind::Timeout).unwrap(), "\"timeout\"");
        assert_eq!(
            serde_json::to_string(&FeedbackType::ThumbsUp).unwrap(),
            "\"thumbs_up\""
        );
    }

    #[test]
    fn failed_attempt_carries_kind_and_message() {
        let mut attempt =
            QueryAttempt::new("team-1", "show users", vec!["users".to_string()], Phase::Poc);
        attempt.fail(ErrorKind::Execution, "relation does not exist");
        assert!(!attempt.success);
        assert_eq!(attempt.error_kind, Some(ErrorKind::Execution));
        assert!(attempt.error_message.as_deref().unwrap().len() > 0);
    }

    #[test]
    fn quota_check() {
        let mut team = Team {
            id: "t".into(),
            name: "T".into(),
            api_key: "k".into(),
            db_connection: "db".into(),
            monthly_query_count: 9,
            query_limit: 10,
            is_active: true,
        };
        assert!(team.has_quota());
        team.monthly_query_count = 10;
        assert!(!team.has_quota());
    }
}
