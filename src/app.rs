//! Wiring shared by `serve`, `search` and `ask`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, anyhow};

use crate::answer::GroundedExecutor;
use crate::assistant::{Assistant, OllamaAssistant, RuleAssistant};
use crate::cli::{AskArgs, AssistantArgs, AssistantKind, SearchArgs};
use crate::ranking::{ProviderSearch, RankingEngine};
use crate::scope::ScopeGuard;
use crate::storage::{StoragePaths, file_present_nonempty};
use crate::store::Store;
use crate::translate::{Translator, TranslatorConfig};

/// Opens the store produced by `load` and builds the ranking engine over its
/// ZIP centroids.
pub fn open_engine(data_dir: &str) -> anyhow::Result<(Store, RankingEngine)> {
    let paths = StoragePaths::new(data_dir);
    if !file_present_nonempty(&paths.duckdb_path) {
        return Err(anyhow!(
            "DuckDB not found at {}. Run: cost-navigator load --csv <file>",
            paths.duckdb_path.display()
        ));
    }
    let store = Store::open(&paths.duckdb_path)?;
    store.ensure_schema().context("create schema")?;
    let engine = engine_for(&store)?;
    Ok((store, engine))
}

pub fn engine_for(store: &Store) -> anyhow::Result<RankingEngine> {
    let index = store.load_zip_index().context("load zip_centroids")?;
    if index.is_empty() {
        tracing::warn!("zip_centroids is empty; radius searches will fail with a lookup error");
    } else {
        tracing::info!("Loaded {} ZIP centroids", index.len());
    }
    Ok(RankingEngine::new(store.clone(), Arc::new(index)))
}

pub fn build_assistant(args: &AssistantArgs) -> anyhow::Result<Arc<dyn Assistant>> {
    let assistant: Arc<dyn Assistant> = match args.assistant {
        AssistantKind::Rules => Arc::new(RuleAssistant),
        AssistantKind::Ollama => {
            tracing::info!(url = %args.ollama_url, model = %args.ollama_model, "using Ollama assistant");
            Arc::new(
                OllamaAssistant::new(&args.ollama_url, &args.ollama_model)
                    .context("build Ollama client")?,
            )
        }
    };
    Ok(assistant)
}

pub fn build_executor(
    engine: RankingEngine,
    args: &AssistantArgs,
) -> anyhow::Result<GroundedExecutor> {
    let config = TranslatorConfig {
        timeout: Duration::from_millis(args.assistant_timeout_ms),
        retry_backoff: Duration::from_millis(args.assistant_backoff_ms),
        ..TranslatorConfig::default()
    };
    let translator = Translator::new(build_assistant(args)?, config);
    Ok(GroundedExecutor::new(ScopeGuard::new(), translator, engine))
}

pub fn search(opts: SearchArgs) -> anyhow::Result<()> {
    let (_, engine) = open_engine(&opts.data_dir)?;
    let rows = engine.search(&ProviderSearch {
        drg: opts.drg,
        zip: opts.zip,
        radius_km: opts.radius_km,
        limit: opts.limit,
    })?;
    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

pub async fn ask(opts: AskArgs) -> anyhow::Result<()> {
    let (_, engine) = open_engine(&opts.data_dir)?;
    let executor = build_executor(engine, &opts.assistant)?;
    let answer = executor.answer(&opts.question).await?;
    println!("{}", serde_json::to_string_pretty(&answer)?);
    Ok(())
}
