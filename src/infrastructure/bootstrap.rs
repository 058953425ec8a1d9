use std::sync::Arc;

use tracing::{error, info, warn};

use crate::application::use_cases::chat_assistant::ChatAssistant;
use crate::application::use_cases::rti_pipeline::RtiPipeline;
use crate::domain::error::Result;
use crate::infrastructure::config::{AppConfig, ConfigService};
use crate::infrastructure::db::chat_history::ChatHistoryStore;
use crate::infrastructure::db::connection::connect_pool;
use crate::infrastructure::db::projects::{ProjectStore, SqliteProjectStore};
use crate::infrastructure::llm_clients::{GeminiClient, LLMClient, RetryPolicy, RetryingClient};

/// Everything a command needs, wired once at startup.
pub struct AppState {
    pub config: AppConfig,
    pub projects: Arc<dyn ProjectStore>,
    pub history: Arc<ChatHistoryStore>,
    pub pipeline: RtiPipeline,
    pub chat: ChatAssistant,
}

pub async fn bootstrap(mut config: AppConfig) -> Result<AppState> {
    ConfigService::new().resolve_api_key(&mut config);
    if config.llm.api_key.is_none() {
        warn!("No API key configured; set RTI_LLM__API_KEY or store one in the keyring");
    }

    let pool = connect_pool(&config.database_url).await.map_err(|err| {
        error!(error = %err, database_url = %config.database_url, "Failed to open database");
        err
    })?;
    let projects: Arc<dyn ProjectStore> = Arc::new(SqliteProjectStore::init(pool.clone()).await?);
    let history = Arc::new(ChatHistoryStore::init(pool).await?);

    let policy = RetryPolicy::new(config.retry.max_retries, config.retry_base_delay());
    let client: Arc<dyn LLMClient + Send + Sync> = Arc::new(RetryingClient::new(
        GeminiClient::with_timeout(config.request_timeout()),
        policy,
    ));

    let pipeline = RtiPipeline::new(client.clone(), projects.clone(), &config);
    let chat = ChatAssistant::new(
        client,
        history.clone(),
        config.llm_config(config.llm.chat_generation.clone()),
        config.pipeline.chat_history_turns,
    );

    info!(
        model = %config.llm.model,
        max_retries = config.retry.max_retries,
        "Application state ready"
    );

    Ok(AppState {
        config,
        projects,
        history,
        pipeline,
        chat,
    })
}
