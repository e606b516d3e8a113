#![allow(non_snake_case)]

use clap::Parser;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use calenBot::cli::{self, Cli, Command};
use calenBot::config::AppConfig;
use calenBot::handlers::assistant::AssistantHandler;
use calenBot::runtime;
use calenBot::service::event_service::{EventStore, InMemoryEventStore};
use calenBot::service::extractor::{CommandExtractor, OpenAiExtractor, RuleExtractor};
use calenBot::service::openai_service::OpenAiService;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "cannot read config file");
            std::process::exit(1);
        }
    };

    let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
    let extractor: Arc<dyn CommandExtractor> = match config.openai_api_key() {
        Some(api_key) => {
            tracing::info!("using OpenAI extraction with rule fallback");
            Arc::new(OpenAiExtractor::new(Arc::new(OpenAiService::new(api_key))))
        }
        None => {
            tracing::info!("no OPENAI_API_KEY, using rule extraction");
            Arc::new(RuleExtractor)
        }
    };
    let handler = Arc::new(AssistantHandler::new(store, extractor));

    let timezone = config.timezone();
    let owner_id = config.cli_user_id();

    let args = Cli::parse();
    match args.command {
        Some(Command::Send { text }) => {
            cli::run_send(handler, timezone, &owner_id, &text).await;
        }
        Some(Command::Chat) => {
            cli::run_chat(handler, timezone, &owner_id).await;
        }
        None => match config.run_mode().as_str() {
            "cli" => cli::run_chat(handler, timezone, &owner_id).await,
            _ => runtime::run_api(handler, config.port()).await,
        },
    }
}
