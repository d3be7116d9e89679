//! Local LLM backends and the model initializer.

pub mod gpt4all;
pub mod llama_cpp;
pub mod streaming;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;

use crate::config::Settings;
use crate::error::GatewayError;

pub use gpt4all::Gpt4All;
pub use llama_cpp::LlamaCpp;
pub use streaming::{callbacks_for, Callbacks, StdoutStreamingHandler, StreamingCallback};

pub trait LanguageModel: Send + Sync {
    /// Completes `prompt`. With `stream` set, tokens also go to the backend's callbacks.
    fn generate<'a>(&'a self, prompt: &'a str, stream: bool) -> BoxFuture<'a, Result<String>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelType {
    LlamaCpp,
    Gpt4All,
}

impl ModelType {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelType::LlamaCpp => "LlamaCpp",
            ModelType::Gpt4All => "GPT4All",
        }
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = GatewayError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "LlamaCpp" => Ok(ModelType::LlamaCpp),
            "GPT4All" => Ok(ModelType::Gpt4All),
            other => Err(GatewayError::UnsupportedModelType(other.to_string())),
        }
    }
}

pub enum LlmBackend {
    LlamaCpp(LlamaCpp),
    Gpt4All(Gpt4All),
}

impl LlmBackend {
    pub fn model_type(&self) -> ModelType {
        match self {
            LlmBackend::LlamaCpp(_) => ModelType::LlamaCpp,
            LlmBackend::Gpt4All(_) => ModelType::Gpt4All,
        }
    }
}

impl LanguageModel for LlmBackend {
    fn generate<'a>(&'a self, prompt: &'a str, stream: bool) -> BoxFuture<'a, Result<String>> {
        match self {
            LlmBackend::LlamaCpp(llm) => llm.complete(prompt, stream).boxed(),
            LlmBackend::Gpt4All(llm) => llm.complete(prompt, stream).boxed(),
        }
    }
}

/// Builds the single backend named by `MODEL_TYPE`.
pub fn initialize_model(
    settings: &Settings,
    client: Client,
    callbacks: Callbacks,
) -> Result<LlmBackend, GatewayError> {
    let model_type: ModelType = settings
        .model_type
        .as_deref()
        .unwrap_or("None")
        .parse()?;

    let backend = match model_type {
        ModelType::LlamaCpp => LlmBackend::LlamaCpp(LlamaCpp::new(
            client,
            settings.runtime.llama_cpp_base_url.clone(),
            settings.model_path.clone(),
            settings.model_n_ctx,
            settings.model_n_batch,
            settings.model_max_tokens,
            callbacks,
        )),
        ModelType::Gpt4All => LlmBackend::Gpt4All(Gpt4All::new(
            client,
            settings.runtime.gpt4all_base_url.clone(),
            settings.model_path.clone(),
            settings.model_n_ctx,
            settings.model_n_batch,
            callbacks,
        )),
    };

    tracing::info!(
        model_type = %model_type,
        model_path = settings.model_path.as_deref().unwrap_or("<unset>"),
        n_ctx = ?settings.model_n_ctx,
        n_batch = settings.model_n_batch,
        "initialized language model"
    );

    Ok(backend)
}
