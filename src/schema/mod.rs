use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use tracing::warn;

use crate::phase::Phase;
use crate::pipeline::models::Team;

/// Hard table cap for the POC phase.
pub const MAX_TABLES_POC: usize = 5;
/// Approximate context-window budget for the serialized schema block.
pub const MAX_SCHEMA_CHARS: usize = 50_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableDescriptor {
    pub name: String,
    pub ddl: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub row_estimate: Option<u64>,
    #[serde(default)]
    pub size_bytes_estimate: Option<u64>,
}

/// Ordered set of table descriptors for one team. Table names are unique
/// within a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub team_id: String,
    pub tables: Vec<TableDescriptor>,
}

impl SchemaSnapshot {
    pub fn table(&self, name: &str) -> Option<&TableDescriptor> {
        self.tables.iter().find(|t| t.name == name)
    }
}

#[derive(Debug)]
pub enum SchemaError {
    TableNotFound(String),
    TooManyTables { requested: usize, limit: usize },
    Unavailable(String),
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaError::TableNotFound(name) => {
                write!(f, "Table '{}' not found in schema snapshot", name)
            }
            SchemaError::TooManyTables { requested, limit } => write!(
                f,
                "Too many tables selected: {} (limit {})",
                requested, limit
            ),
            SchemaError::Unavailable(msg) => write!(f, "Schema provider unavailable: {}", msg),
        }
    }
}

impl Error for SchemaError {}

/// Provides schema snapshots for a team. Live introspection is the
/// provider's problem; the pipeline only consumes snapshots.
#[async_trait]
pub trait SchemaProvider: Send + Sync {
    async fn get_snapshot(&self, team: &Team) -> Result<SchemaSnapshot, SchemaError>;
}

/// Result of formatting a schema subset for prompting.
#[derive(Debug, Clone)]
pub struct FormattedSchema {
    /// Text block with each selected table's DDL and description.
    pub text: String,
    /// SHA-256 over the sorted DDL texts, for cache-key use. Stable under
    /// reordering of the selection.
    pub fingerprint: String,
    pub truncated: bool,
    pub warnings: Vec<String>,
}

/// Formats the selected tables of a snapshot into a bounded prompt block.
/// Pure function of its inputs.
pub fn format_schema(
    snapshot: &SchemaSnapshot,
    selected_tables: &[String],
    phase: Phase,
) -> Result<FormattedSchema, SchemaError> {
    if phase == Phase::Poc && selected_tables.len() > MAX_TABLES_POC {
        return Err(SchemaError::TooManyTables {
            requested: selected_tables.len(),
            limit: MAX_TABLES_POC,
        });
    }

    let mut tables = Vec::with_capacity(selected_tables.len());
    for name in selected_tables {
        match snapshot.table(name) {
            Some(table) => tables.push(table),
            None => return Err(SchemaError::TableNotFound(name.clone())),
        }
    }

    let fingerprint = schema_fingerprint(&tables);

    let mut warnings = Vec::new();
    let full_text = render_tables(&tables, None);

    let (text, truncated) = if full_text.len() > MAX_SCHEMA_CHARS {
        let msg = format!(
            "Schema exceeds size budget: {} > {} chars",
            full_text.len(),
            MAX_SCHEMA_CHARS
        );
        warn!("{}", msg);
        warnings.push(msg);

        match phase {
            // Production drops the lowest-priority (trailing) tables down
            // to one-line stubs until the budget holds.
            Phase::Production => (render_tables(&tables, Some(MAX_SCHEMA_CHARS)), true),
            // Other phases proceed oversized and let the model call fail.
            _ => (full_text, false),
        }
    } else {
        (full_text, false)
    };

    Ok(FormattedSchema {
        text,
        fingerprint,
        truncated,
        warnings,
    })
}

/// SHA-256 of the sorted DDL texts. Sorting makes the fingerprint
/// independent of selection order.
pub fn schema_fingerprint(tables: &[&TableDescriptor]) -> String {
    let mut ddls: Vec<&str> = tables.iter().map(|t| t.ddl.as_str()).collect();
    ddls.sort_unstable();

    let mut hasher = Sha256::new();
    for ddl in ddls {
        hasher.update(ddl.as_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

fn render_tables(tables: &[&TableDescriptor], budget: Option<usize>) -> String {
    if tables.is_empty() {
        return "-- No schema information available".to_string();
    }

    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    let mut parts = vec![
        "-- Database Schema".to_string(),
        format!("-- Tables: {}", names.join(", ")),
        String::new(),
    ];
    let mut used: usize = parts.iter().map(|p| p.len() + 1).sum();

    for table in tables {
        let mut block = vec![format!("-- Table: {}", table.name)];
        if let Some(desc) = &table.description {
            block.push(format!("-- Description: {}", desc));
        }
        block.push(table.ddl.clone());
        block.push(String::new());
        let block_len: usize = block.iter().map(|l| l.len() + 1).sum();

        match budget {
            Some(max) if used + block_len > max => {
                // Summarize instead of dropping outright, so the model still
                // knows the table exists.
                let stub = match &table.description {
                    Some(desc) => format!("-- Table {} omitted for size: {}", table.name, desc),
                    None => format!("-- Table {} omitted for size", table.name),
                };
                used += stub.len() + 1;
                parts.push(stub);
            }
            _ => {
                used += block_len;
                parts.extend(block);
            }
        }
    }

    parts.join("\n")
}

/// Snapshot provider backed by a fixed, pre-built snapshot.
pub struct StaticSchemaProvider {
    snapshot: SchemaSnapshot,
}

impl StaticSchemaProvider {
    pub fn new(snapshot: SchemaSnapshot) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl SchemaProvider for StaticSchemaProvider {
    async fn get_snapshot(&self, _team: &Team) -> Result<SchemaSnapshot, SchemaError> {
        Ok(self.snapshot.clone())
    }
}

/// Snapshot provider that reads a JSON table list from disk on each call.
/// Used by the demo binary; a deployment would plug in its own provider.
pub struct FileSchemaProvider {
    path: PathBuf,
}

impl FileSchemaProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SchemaProvider for FileSchemaProvider {
    async fn get_snapshot(&self, team: &Team) -> Result<SchemaSnapshot, SchemaError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| SchemaError::Unavailable(format!("{}: {}", self.path.display(), e)))?;
        let tables: Vec<TableDescriptor> = serde_json::from_str(&raw)
            .map_err(|e| SchemaError::Unavailable(format!("invalid schema file: {}", e)))?;
        Ok(SchemaSnapshot {
            team_id: team.id.clone(),
            tables,
        })
    }
}
