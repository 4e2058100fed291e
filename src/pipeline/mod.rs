pub mod models;

use std::error::Error;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cache::{self, CacheEntry, CacheStore};
use crate::exec::{ExecutionErrorKind, QueryRows, SqlExecutor};
use crate::llm::models::{GenerationRequest, PriorAttempt};
use crate::llm::{SqlGenerator, pricing};
use crate::phase::Phase;
use crate::pipeline::models::{ErrorKind, FeedbackType, QueryAttempt, Team};
use crate::schema::{SchemaError, SchemaProvider, format_schema};
use crate::store::{AttemptStore, StoreError};
use crate::validate::Validator;

/// Explicit policy value passed into the orchestrator at construction, so
/// every stage's behavior is a function of its inputs rather than ambient
/// state.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    pub phase: Phase,
    pub cache_ttl: chrono::Duration,
    pub statement_timeout: Duration,
}

impl PipelinePolicy {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase,
            cache_ttl: chrono::Duration::seconds(cache::DEFAULT_TTL_SECS),
            statement_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug)]
pub enum PipelineError {
    /// Malformed request; no attempt record was created.
    InvalidInput(String),
    /// The attempt exists but belongs to a different team.
    AccessDenied(String),
    /// Monthly team quota exhausted (production only).
    QuotaExceeded,
    /// A collaborator needed before generation could not be reached.
    Unavailable(String),
    /// The final save failed: the operation's outcome is unknown, distinct
    /// from both success and failure.
    OutcomeUnknown(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            PipelineError::AccessDenied(msg) => write!(f, "Access denied: {}", msg),
            PipelineError::QuotaExceeded => write!(f, "Monthly query limit exceeded"),
            PipelineError::Unavailable(msg) => write!(f, "Collaborator unavailable: {}", msg),
            PipelineError::OutcomeUnknown(msg) => {
                write!(f, "Persistence failed, operation outcome unknown: {}", msg)
            }
        }
    }
}

impl Error for PipelineError {}

/// Result of one pipeline run: the durable attempt record plus, on
/// successful execution, the result rows for the caller to render.
#[derive(Debug)]
pub struct QueryOutcome {
    pub attempt: QueryAttempt,
    pub results: Option<QueryRows>,
}

/// Sequences cache lookup, generation, validation, execution and
/// persistence for one request. Failures after input validation are
/// modeled outcomes: they are persisted on the attempt and returned as
/// `Ok`, never as `Err`.
pub struct QueryPipeline {
    schema_provider: Arc<dyn SchemaProvider>,
    generator: Arc<dyn SqlGenerator>,
    cache: Arc<dyn CacheStore>,
    executor: Arc<dyn SqlExecutor>,
    store: Arc<dyn AttemptStore>,
    validator: Validator,
    policy: PipelinePolicy,
}

impl QueryPipeline {
    pub fn new(
        schema_provider: Arc<dyn SchemaProvider>,
        generator: Arc<dyn SqlGenerator>,
        cache: Arc<dyn CacheStore>,
        executor: Arc<dyn SqlExecutor>,
        store: Arc<dyn AttemptStore>,
        policy: PipelinePolicy,
    ) -> Self {
        Self {
            schema_provider,
            generator,
            cache,
            executor,
            store,
            validator: Validator::new(),
            policy,
        }
    }

    pub fn phase(&self) -> Phase {
        self.policy.phase
    }

    /// Fresh generation request: schema → cache lookup → generate →
    /// validate → execute → persist.
    pub async fn generate_query(
        &self,
        team: &Team,
        question: &str,
        selected_tables: &[String],
    ) -> Result<QueryOutcome, PipelineError> {
        self.check_team(team)?;

        if question.trim().is_empty() {
            return Err(PipelineError::InvalidInput(
                "natural_language_query is required".to_string(),
            ));
        }
        if selected_tables.is_empty() {
            return Err(PipelineError::InvalidInput(
                "selected_tables is required".to_string(),
            ));
        }

        info!(team = %team.id, phase = %self.policy.phase, "Generating query: '{}'", question);

        let formatted = self.format_schema_for(team, selected_tables).await?;

        let mut attempt = QueryAttempt::new(
            &team.id,
            question,
            selected_tables.to_vec(),
            self.policy.phase,
        );

        let cache_key = if self.policy.phase.caching_enabled() {
            Some(cache::derive_key(&team.id, question, &formatted.fingerprint))
        } else {
            None
        };

        if let Some(key) = &cache_key {
            // Cache-store errors degrade to a miss; the request never fails
            // on the cache.
            match self.cache.get(key).await {
                Ok(Some(entry)) => {
                    info!(team = %team.id, "Cache hit, skipping model call");
                    attempt.cache_hit = true;
                    attempt.generated_sql = Some(entry.sql);
                    attempt.explanation = Some(entry.explanation);
                }
                Ok(None) => {}
                Err(e) => warn!("Cache lookup failed, treating as miss: {}", e),
            }
        }

        if !attempt.cache_hit {
            let request = GenerationRequest {
                question: question.to_string(),
                schema_text: formatted.text,
                prior: None,
            };

            match self.generator.generate(&request).await {
                Ok(output) => {
                    attempt.generated_sql = Some(output.sql);
                    attempt.explanation = Some(output.explanation);
                    attempt.input_tokens = output.usage.input_tokens;
                    attempt.output_tokens = output.usage.output_tokens;
                    attempt.estimated_cost_usd = pricing::estimate_cost(output.usage);
                }
                Err(e) => {
                    error!(team = %team.id, "Generation failed: {}", e);
                    attempt.fail(ErrorKind::GenerationFailed, e.to_string());
                    let attempt = self.persist(attempt).await?;
                    return Ok(QueryOutcome {
                        attempt,
                        results: None,
                    });
                }
            }
        }

        let write_key = if attempt.cache_hit { None } else { cache_key };
        self.validate_execute_persist(team, attempt, write_key).await
    }

    /// Refinement request: loads the parent attempt, feeds its SQL and
    /// failure back into the prompt, and appends to the attempt chain.
    /// Refinements never read or populate the cache.
    pub async fn refine_query(
        &self,
        team: &Team,
        parent_attempt_id: Uuid,
        user_refinement: &str,
    ) -> Result<QueryOutcome, PipelineError> {
        self.check_team(team)?;

        let parent = match self.store.load(parent_attempt_id).await {
            Ok(parent) => parent,
            Err(StoreError::NotFound(id)) => {
                return Err(PipelineError::InvalidInput(format!(
                    "Parent attempt {} not found",
                    id
                )));
            }
            Err(StoreError::Unavailable(msg)) => return Err(PipelineError::Unavailable(msg)),
        };

        if parent.team_id != team.id {
            return Err(PipelineError::AccessDenied(
                "Parent attempt belongs to a different team".to_string(),
            ));
        }

        info!(
            team = %team.id,
            parent = %parent.id,
            "Refining attempt {} with: '{}'",
            parent.attempt_number,
            user_refinement
        );

        let formatted = self.format_schema_for(team, &parent.selected_tables).await?;

        let mut attempt = QueryAttempt::new(
            &team.id,
            &parent.natural_language_query,
            parent.selected_tables.clone(),
            self.policy.phase,
        );
        attempt.parent_id = Some(parent.id);
        attempt.attempt_number = parent.attempt_number + 1;
        attempt.user_refinement = Some(user_refinement.to_string());

        let request = GenerationRequest {
            question: parent.natural_language_query.clone(),
            schema_text: formatted.text,
            prior: Some(PriorAttempt {
                sql: parent.generated_sql.clone().unwrap_or_default(),
                error: parent.error_message.clone(),
                refinement: user_refinement.to_string(),
            }),
        };

        match self.generator.generate(&request).await {
            Ok(output) => {
                attempt.generated_sql = Some(output.sql);
                attempt.explanation = Some(output.explanation);
                attempt.input_tokens = output.usage.input_tokens;
                attempt.output_tokens = output.usage.output_tokens;
                attempt.estimated_cost_usd = pricing::estimate_cost(output.usage);
            }
            Err(e) => {
                error!(team = %team.id, "Refinement generation failed: {}", e);
                attempt.fail(ErrorKind::GenerationFailed, e.to_string());
                let attempt = self.persist(attempt).await?;
                return Ok(QueryOutcome {
                    attempt,
                    results: None,
                });
            }
        }

        self.validate_execute_persist(team, attempt, None).await
    }

    /// Pure mutation: attaches user feedback to a persisted attempt. No
    /// other pipeline stage runs.
    pub async fn attach_feedback(
        &self,
        attempt_id: Uuid,
        rating: Option<u8>,
        feedback_type: Option<FeedbackType>,
        text: Option<String>,
    ) -> Result<QueryAttempt, PipelineError> {
        if let Some(rating) = rating {
            if !(1..=5).contains(&rating) {
                return Err(PipelineError::InvalidInput(
                    "Rating must be between 1 and 5".to_string(),
                ));
            }
        }

        let mut attempt = match self.store.load(attempt_id).await {
            Ok(attempt) => attempt,
            Err(StoreError::NotFound(id)) => {
                return Err(PipelineError::InvalidInput(format!(
                    "Query attempt {} not found",
                    id
                )));
            }
            Err(StoreError::Unavailable(msg)) => return Err(PipelineError::Unavailable(msg)),
        };

        attempt.user_rating = rating;
        attempt.user_feedback_type = feedback_type;
        attempt.user_feedback_text = text;

        info!(attempt = %attempt.id, "Feedback attached: rating={:?}, type={:?}", rating, feedback_type);

        self.persist(attempt).await
    }

    fn check_team(&self, team: &Team) -> Result<(), PipelineError> {
        if !team.is_active {
            return Err(PipelineError::AccessDenied("Team is inactive".to_string()));
        }
        if self.policy.phase.enforces_quota() && !team.has_quota() {
            return Err(PipelineError::QuotaExceeded);
        }
        Ok(())
    }

    async fn format_schema_for(
        &self,
        team: &Team,
        selected_tables: &[String],
    ) -> Result<crate::schema::FormattedSchema, PipelineError> {
        let snapshot = self
            .schema_provider
            .get_snapshot(team)
            .await
            .map_err(|e| match e {
                SchemaError::Unavailable(msg) => PipelineError::Unavailable(msg),
                other => PipelineError::InvalidInput(other.to_string()),
            })?;

        format_schema(&snapshot, selected_tables, self.policy.phase).map_err(|e| match e {
            SchemaError::Unavailable(msg) => PipelineError::Unavailable(msg),
            other => PipelineError::InvalidInput(other.to_string()),
        })
    }

    /// Shared tail of the state machine: VALIDATE → {BLOCKED | EXECUTE} →
    /// PERSIST. `cache_write_key` is set only for fresh, cacheable
    /// generations.
    async fn validate_execute_persist(
        &self,
        team: &Team,
        mut attempt: QueryAttempt,
        cache_write_key: Option<String>,
    ) -> Result<QueryOutcome, PipelineError> {
        // generated_sql is always populated by the time we get here.
        let sql = attempt.generated_sql.clone().unwrap_or_default();

        let report = self
            .validator
            .validate(&sql, &attempt.selected_tables, self.policy.phase);

        attempt.sql_syntax_valid = report.syntax_valid;
        attempt.security_check_passed = report.is_safe;
        attempt.validation_issues = report.issue_messages();
        attempt.complexity_score = report.complexity_score;

        if report.blocks_execution() {
            error!(team = %team.id, "Blocked unsafe query: {:?}", attempt.validation_issues);
            attempt.fail(
                ErrorKind::SecurityBlocked,
                attempt.validation_issues.join("; "),
            );
            let attempt = self.persist(attempt).await?;
            return Ok(QueryOutcome {
                attempt,
                results: None,
            });
        }

        if !report.is_safe {
            // BREAKING_DEMO surfaces the issues but executes anyway.
            warn!(team = %team.id, "Executing despite validation issues: {:?}", attempt.validation_issues);
        }

        let results = match self
            .executor
            .execute(team, &sql, self.policy.statement_timeout)
            .await
        {
            Ok(rows) => {
                attempt.success = true;
                attempt.rows_returned = Some(rows.rows.len() as u64);
                attempt.execution_time_ms = Some(rows.execution_time_ms);
                Some(rows)
            }
            Err(e) => {
                let kind = match e.kind {
                    ExecutionErrorKind::Syntax => ErrorKind::Syntax,
                    ExecutionErrorKind::Execution => ErrorKind::Execution,
                    ExecutionErrorKind::Timeout => ErrorKind::Timeout,
                };
                attempt.fail(kind, e.message);
                None
            }
        };

        // Cache the generation result, not the execution result: entries
        // stay valid even as row contents drift.
        if attempt.success {
            if let Some(key) = cache_write_key {
                let entry = CacheEntry::new(
                    sql,
                    attempt.explanation.clone().unwrap_or_default(),
                    attempt.input_tokens,
                    attempt.output_tokens,
                    self.policy.cache_ttl,
                );
                if let Err(e) = self.cache.put(&key, entry).await {
                    warn!("Cache write failed, continuing: {}", e);
                } else {
                    info!(team = %team.id, "Query cached for future use");
                }
            }
        }

        let attempt = self.persist(attempt).await?;
        Ok(QueryOutcome { attempt, results })
    }

    async fn persist(&self, attempt: QueryAttempt) -> Result<QueryAttempt, PipelineError> {
        self.store
            .save(&attempt)
            .await
            .map_err(|e| PipelineError::OutcomeUnknown(e.to_string()))?;
        Ok(attempt)
    }
}
