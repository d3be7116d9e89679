use anyhow::{Context, Result};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::streaming::{emit_end, emit_token, Callbacks, SseDecoder};
use crate::embeddings::normalize_err_body;

const TEMPERATURE: f32 = 0.8;

/// llama.cpp backend, driven through a local `llama-server`.
pub struct LlamaCpp {
    client: Client,
    base_url: String,
    pub model_path: Option<String>,
    pub n_ctx: Option<usize>,
    pub n_batch: usize,
    pub max_tokens: usize,
    callbacks: Callbacks,
}

#[derive(Serialize)]
struct CompletionReq<'a> {
    prompt: &'a str,
    n_predict: usize,
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
}

#[derive(Deserialize)]
struct CompletionResp {
    #[serde(default)]
    content: String,
    #[serde(default)]
    stop: bool,
}

impl LlamaCpp {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        model_path: Option<String>,
        n_ctx: Option<usize>,
        n_batch: usize,
        max_tokens: usize,
        callbacks: Callbacks,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_path,
            n_ctx,
            n_batch,
            max_tokens,
            callbacks,
        }
    }

    pub fn has_callbacks(&self) -> bool {
        !self.callbacks.is_empty()
    }

    fn n_predict(&self) -> usize {
        match self.n_ctx {
            Some(n_ctx) => self.max_tokens.min(n_ctx),
            None => self.max_tokens,
        }
    }

    pub async fn complete(&self, prompt: &str, stream: bool) -> Result<String> {
        let stream = stream && self.has_callbacks();
        let url = format!("{}/completion", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&CompletionReq {
                prompt,
                n_predict: self.n_predict(),
                temperature: TEMPERATURE,
                stream,
                model: self.model_path.as_deref(),
            })
            .send()
            .await
            .context("failed to call llama.cpp completion endpoint")?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "llama.cpp /completion returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        if !stream {
            let response = response
                .json::<CompletionResp>()
                .await
                .context("failed to decode llama.cpp completion response")?;
            return Ok(response.content.trim().to_string());
        }

        let mut decoder = SseDecoder::default();
        let mut text = String::new();
        let mut body = response.bytes_stream();
        let mut stopped = false;
        'stream: while let Some(bytes) = body.next().await {
            let bytes = bytes.context("llama.cpp completion stream interrupted")?;
            for payload in decoder.push(&bytes) {
                if self.apply_chunk(&payload, &mut text)? {
                    stopped = true;
                    break 'stream;
                }
            }
        }
        if !stopped {
            if let Some(payload) = decoder.finish() {
                self.apply_chunk(&payload, &mut text)?;
            }
        }

        emit_end(&self.callbacks);
        Ok(text.trim().to_string())
    }

    // Returns true once the server marks the completion as stopped.
    fn apply_chunk(&self, payload: &str, text: &mut String) -> Result<bool> {
        let chunk: CompletionResp = serde_json::from_str(payload)
            .with_context(|| format!("failed to decode llama.cpp stream chunk: {payload}"))?;
        if !chunk.content.is_empty() {
            emit_token(&self.callbacks, &chunk.content);
            text.push_str(&chunk.content);
        }
        Ok(chunk.stop)
    }
}
