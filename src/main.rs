use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use reqwest::Client;
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use privategpt_gateway::config::load_env_file;
use privategpt_gateway::llm::{callbacks_for, initialize_model};
use privategpt_gateway::retrieval::PersistentRetrieverFactory;
use privategpt_gateway::{run_server, QueryInterface, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    // Before tracing, so a RUST_LOG set in .env takes effect.
    if let Err(err) = load_env_file(Path::new(".env")) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    init_tracing();

    let settings = Settings::from_env();
    let client = Client::new();

    let llm = initialize_model(&settings, client.clone(), callbacks_for(false))?;
    let retrievers = PersistentRetrieverFactory::new(&settings, client);
    let generation_limit = Arc::new(Semaphore::new(settings.max_concurrent_generations));

    let queries = QueryInterface::new(Arc::new(llm), Arc::new(retrievers), generation_limit);

    run_server(settings, queries).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
