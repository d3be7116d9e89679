use std::path::Path;

use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::streaming::{emit_end, emit_token, Callbacks};
use crate::embeddings::normalize_err_body;

const TEMPERATURE: f32 = 0.7;
const TOP_P: f32 = 0.1;

/// GPT4All backend, driven through the GPT4All local API server.
///
/// The API server answers in one piece, so streaming callbacks receive the
/// whole completion as a single token.
pub struct Gpt4All {
    client: Client,
    base_url: String,
    pub model: Option<String>,
    pub max_tokens: Option<usize>,
    pub n_batch: usize,
    callbacks: Callbacks,
}

impl Gpt4All {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        model: Option<String>,
        max_tokens: Option<usize>,
        n_batch: usize,
        callbacks: Callbacks,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
            max_tokens,
            n_batch,
            callbacks,
        }
    }

    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    /// The API server addresses models by file name rather than full path.
    pub fn model_name(&self) -> Option<&str> {
        let model = self.model.as_deref()?;
        Path::new(model)
            .file_name()
            .and_then(|name| name.to_str())
            .or(Some(model))
    }

    pub async fn complete(&self, prompt: &str, stream: bool) -> Result<String> {
        #[derive(Serialize)]
        struct CompletionReq<'a> {
            #[serde(skip_serializing_if = "Option::is_none")]
            model: Option<&'a str>,
            prompt: &'a str,
            #[serde(skip_serializing_if = "Option::is_none")]
            max_tokens: Option<usize>,
            temperature: f32,
            top_p: f32,
        }

        #[derive(Deserialize)]
        struct CompletionResp {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            text: String,
        }

        let url = format!("{}/v1/completions", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&CompletionReq {
                model: self.model_name(),
                prompt,
                max_tokens: self.max_tokens,
                temperature: TEMPERATURE,
                top_p: TOP_P,
            })
            .send()
            .await
            .context("failed to call gpt4all completions endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "gpt4all /v1/completions returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        let response = response
            .json::<CompletionResp>()
            .await
            .context("failed to decode gpt4all completions response")?;

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.text)
            .ok_or_else(|| anyhow::anyhow!("gpt4all returned no completion choices"))?;

        if stream {
            emit_token(&self.callbacks, &text);
            emit_end(&self.callbacks);
        }

        Ok(text.trim().to_string())
    }
}
