use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};

use nl_query::cache::MemoryCacheStore;
use nl_query::config::{AppConfig, CliArgs};
use nl_query::exec::DuckDbExecutor;
use nl_query::llm::LlmManager;
use nl_query::pipeline::models::Team;
use nl_query::pipeline::{PipelinePolicy, QueryPipeline};
use nl_query::schema::FileSchemaProvider;
use nl_query::store::MemoryAttemptStore;
use nl_query::util::logging::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let args = CliArgs::parse();

    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    info!(
        "Running one pipeline request in phase {} against {}",
        config.phase, config.database.connection_string
    );

    let team = Team {
        id: config.team.id.clone(),
        name: config.team.name.clone(),
        api_key: config.team.api_key.clone(),
        db_connection: config.database.connection_string.clone(),
        monthly_query_count: 0,
        query_limit: config.team.query_limit,
        is_active: true,
    };

    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = LlmManager::new(&config.llm)?;

    let executor = DuckDbExecutor::new(
        config.database.connection_string.clone(),
        config.database.pool_size as u32,
    )?;

    let mut policy = PipelinePolicy::new(config.phase);
    policy.cache_ttl = chrono::Duration::seconds(config.cache.ttl_secs);
    policy.statement_timeout = std::time::Duration::from_secs(config.query.statement_timeout_secs);

    let pipeline = QueryPipeline::new(
        Arc::new(FileSchemaProvider::new(config.schema_file.clone())),
        Arc::new(llm_manager),
        Arc::new(MemoryCacheStore::new()),
        Arc::new(executor),
        Arc::new(MemoryAttemptStore::new()),
        policy,
    );

    let outcome = pipeline
        .generate_query(&team, &args.question, &args.tables)
        .await?;

    println!("{}", serde_json::to_string_pretty(&outcome.attempt)?);

    if let Some(results) = outcome.results {
        info!(
            "Returned {} rows in {} ms",
            results.rows.len(),
            results.execution_time_ms
        );
        println!("{}", serde_json::to_string_pretty(&results.rows)?);
    }

    Ok(())
}
