use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reqwest::Client;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Semaphore;
use tracing_subscriber::EnvFilter;

use privategpt_gateway::config::load_env_file;
use privategpt_gateway::llm::{callbacks_for, initialize_model};
use privategpt_gateway::models::AnswerResult;
use privategpt_gateway::retrieval::PersistentRetrieverFactory;
use privategpt_gateway::{QueryInterface, Settings};

#[derive(Parser, Debug)]
#[command(name = "ask")]
#[command(about = "Ask questions to your documents from the terminal")]
struct Cli {
    /// Do not print the source documents used for answers.
    #[arg(short = 'S', long)]
    hide_source: bool,
    /// Do not stream tokens to stdout while the model is generating.
    #[arg(short = 'M', long)]
    mute_stream: bool,
    #[arg(long, default_value = ".env")]
    env_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(err) = load_env_file(&cli.env_file) {
        eprintln!("{err}");
        std::process::exit(1);
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let settings = Settings::from_env();
    let client = Client::new();
    let llm = initialize_model(&settings, client.clone(), callbacks_for(cli.mute_stream))?;
    let queries = QueryInterface::new(
        Arc::new(llm),
        Arc::new(PersistentRetrieverFactory::new(&settings, client)),
        Arc::new(Semaphore::new(1)),
    );

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        stdout.write_all(b"\nEnter a query: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("failed to read query")? else {
            break;
        };
        let query = line.trim();
        if query == "exit" {
            break;
        }

        let result = queries
            .get_answer(query, cli.mute_stream, cli.hide_source)
            .await?;
        println!("{}", render(&result));
    }

    Ok(())
}

fn render(result: &AnswerResult) -> String {
    match result {
        AnswerResult::Invalid(invalid) => invalid.result.clone(),
        AnswerResult::Answered(answer) => {
            let mut out = format!(
                "\n\n> Question:\n{}\n\n> Answer (took {} s.):\n{}",
                answer.question, answer.time_taken, answer.answer
            );
            for document in &answer.source_documents {
                out.push_str(&format!(
                    "\n\n> {}:\n{}",
                    document.source().unwrap_or("unknown source"),
                    document.page_content
                ));
            }
            out
        }
    }
}
