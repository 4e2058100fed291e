use async_trait::async_trait;
use duckdb::Connection;
use r2d2::{ManageConnection, Pool};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::pipeline::models::Team;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionErrorKind {
    Syntax,
    Execution,
    Timeout,
}

#[derive(Debug)]
pub struct ExecutionError {
    pub kind: ExecutionErrorKind,
    pub message: String,
}

impl ExecutionError {
    pub fn new(kind: ExecutionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Query execution failed ({:?}): {}", self.kind, self.message)
    }
}

impl Error for ExecutionError {}

/// Result rows from a successful execution. Rows are JSON objects keyed by
/// column name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Value>,
    pub execution_time_ms: u64,
}

/// Executes validated SQL against a team's target database within a
/// statement timeout.
#[async_trait]
pub trait SqlExecutor: Send + Sync {
    async fn execute(
        &self,
        team: &Team,
        sql: &str,
        timeout: Duration,
    ) -> Result<QueryRows, ExecutionError>;
}

pub struct DuckDbConnectionManager {
    connection_string: String,
}

impl DuckDbConnectionManager {
    pub fn new(connection_string: String) -> Self {
        Self { connection_string }
    }
}

impl ManageConnection for DuckDbConnectionManager {
    type Connection = Connection;
    type Error = duckdb::Error;

    fn connect(&self) -> Result<Self::Connection, Self::Error> {
        Connection::open(&self.connection_string)
    }

    fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.execute("SELECT 1", [])?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// DuckDB-backed executor over an r2d2 pool. Statements run on the blocking
/// pool; the async caller enforces the statement timeout (the blocking task
/// is not cancelled, its result is discarded).
pub struct DuckDbExecutor {
    pool: Pool<DuckDbConnectionManager>,
}

impl DuckDbExecutor {
    pub fn new(connection_string: String, pool_size: u32) -> Result<Self, r2d2::Error> {
        let manager = DuckDbConnectionManager::new(connection_string);
        let pool = Pool::builder().max_size(pool_size).build(manager)?;
        Ok(Self { pool })
    }

    fn classify(message: &str) -> ExecutionErrorKind {
        let lower = message.to_lowercase();
        if lower.contains("syntax error") || lower.contains("parser error") {
            ExecutionErrorKind::Syntax
        } else {
            ExecutionErrorKind::Execution
        }
    }
}

#[async_trait]
impl SqlExecutor for DuckDbExecutor {
    async fn execute(
        &self,
        team: &Team,
        sql: &str,
        timeout: Duration,
    ) -> Result<QueryRows, ExecutionError> {
        debug!(team = %team.id, "Executing SQL: {}", sql);

        let pool = self.pool.clone();
        let sql_to_execute = sql.to_string();

        let task = tokio::task::spawn_blocking(move || -> Result<QueryRows, String> {
            let start = Instant::now();

            let conn = pool.get().map_err(|e| e.to_string())?;
            let mut stmt = conn.prepare(&sql_to_execute).map_err(|e| e.to_string())?;

            let arrow_batches = stmt.query_arrow([]).map_err(|e| e.to_string())?;
            let schema = arrow_batches.get_schema();

            let columns = schema
                .fields()
                .iter()
                .map(|field| field.name().clone())
                .collect::<Vec<String>>();

            let record_batches = arrow_batches.collect::<Vec<_>>();

            let mut writer = arrow::json::ArrayWriter::new(Vec::new());
            for batch in &record_batches {
                writer.write(batch).map_err(|e| e.to_string())?;
            }
            writer.finish().map_err(|e| e.to_string())?;
            let buffer = writer.into_inner();

            let rows: Vec<serde_json::Value> = if buffer.is_empty() {
                Vec::new()
            } else {
                serde_json::from_slice(&buffer).map_err(|e| e.to_string())?
            };

            Ok(QueryRows {
                columns,
                rows,
                execution_time_ms: start.elapsed().as_millis() as u64,
            })
        });

        let joined = match tokio::time::timeout(timeout, task).await {
            Err(_) => {
                error!(team = %team.id, "Statement timed out after {:?}", timeout);
                return Err(ExecutionError::new(
                    ExecutionErrorKind::Timeout,
                    format!("Statement exceeded timeout of {} ms", timeout.as_millis()),
                ));
            }
            Ok(result) => result,
        };

        let task_result = joined.map_err(|e| {
            ExecutionError::new(ExecutionErrorKind::Execution, format!("Task join error: {}", e))
        })?;

        match task_result {
            Ok(result) => {
                info!(
                    team = %team.id,
                    "Query executed successfully. Rows: {}, took {} ms",
                    result.rows.len(),
                    result.execution_time_ms
                );
                Ok(result)
            }
            Err(message) => {
                error!(team = %team.id, "Query execution error: {}", message);
                Err(ExecutionError::new(Self::classify(&message), message))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn team() -> Team {
        Team {
            id: "team-1".to_string(),
            name: "Test".to_string(),
            api_key: "key".to_string(),
            db_connection: ":memory:".to_string(),
            monthly_query_count: 0,
            query_limit: 100,
            is_active: true,
        }
    }

    #[tokio::test]
    async fn executes_select_against_memory_db() {
        let executor = DuckDbExecutor::new(":memory:".to_string(), 1).unwrap();
        let result = executor
            .execute(&team(), "SELECT 1 AS one, 'a' AS letter", Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(result.columns, vec!["one".to_string(), "letter".to_string()]);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0]["one"], serde_json::json!(1));
        assert_eq!(result.rows[0]["letter"], serde_json::json!("a"));
    }

    #[tokio::test]
    async fn syntax_error_is_classified() {
        let executor = DuckDbExecutor::new(":memory:".to_string(), 1).unwrap();
        let err = executor
            .execute(&team(), "SELEC 1", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Syntax);
    }

    #[tokio::test]
    async fn missing_table_is_an_execution_error() {
        let executor = DuckDbExecutor::new(":memory:".to_string(), 1).unwrap();
        let err = executor
            .execute(&team(), "SELECT * FROM no_such_table", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ExecutionErrorKind::Execution);
    }
}
