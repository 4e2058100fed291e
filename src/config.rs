use clap::Parser;
use config::{Config, ConfigError, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::phase::Phase;

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub connection_string: String,
    pub pool_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "remote" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: i64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QueryConfig {
    #[serde(default = "default_statement_timeout_secs")]
    pub statement_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TeamConfig {
    pub id: String,
    pub name: String,
    pub api_key: String,
    #[serde(default = "default_query_limit")]
    pub query_limit: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub phase: Phase,
    pub team: TeamConfig,
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub query: QueryConfig,
    /// JSON file holding the table descriptors the demo schema provider
    /// serves.
    pub schema_file: String,
}

fn default_llm_timeout_secs() -> u64 {
    60
}

fn default_cache_ttl_secs() -> i64 {
    crate::cache::DEFAULT_TTL_SECS
}

fn default_statement_timeout_secs() -> u64 {
    30
}

fn default_query_limit() -> u64 {
    1000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            statement_timeout_secs: default_statement_timeout_secs(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Override the operating phase (POC, BREAKING_DEMO, PRODUCTION)
    #[arg(long)]
    pub phase: Option<Phase>,

    /// Natural-language question to run through the pipeline
    #[arg(short, long)]
    pub question: String,

    /// Comma-separated table names the question may use
    #[arg(short, long, value_delimiter = ',')]
    pub tables: Vec<String>,
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config_builder = Config::builder();

        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-query/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if let Some(phase) = args.phase {
            config.phase = phase;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_minimal_toml() {
        let raw = r#"
            phase = "PRODUCTION"
            schema_file = "schema.json"

            [team]
            id = "team-1"
            name = "Demo Team"
            api_key = "secret"

            [database]
            connection_string = "nl-query.duckdb"
            pool_size = 5

            [llm]
            backend = "ollama"
            model = "sqlcoder"
        "#;

        let config: AppConfig = Config::builder()
            .add_source(config::File::from_str(raw, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.phase, Phase::Production);
        assert_eq!(config.team.query_limit, 1000);
        assert_eq!(config.cache.ttl_secs, crate::cache::DEFAULT_TTL_SECS);
        assert_eq!(config.query.statement_timeout_secs, 30);
        assert_eq!(config.llm.timeout_secs, 60);
    }
}
