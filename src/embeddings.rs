use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

pub trait Embeddings: Send + Sync {
    fn embed_query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>>;
}

/// Handle on the embeddings model served by the local embedding runtime.
#[derive(Clone)]
pub struct EmbeddingsClient {
    client: Client,
    base_url: String,
    model_name: String,
}

impl EmbeddingsClient {
    pub fn new(client: Client, base_url: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model_name: model_name.into(),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let input = text.trim();
        if input.is_empty() {
            anyhow::bail!("cannot embed empty text input");
        }

        // /api/embed is the current route; older runtimes only serve /api/embeddings.
        match self.embed_modern(input).await {
            Ok(vector) => Ok(vector),
            Err(modern_err) => match self.embed_legacy(input).await {
                Ok(vector) => Ok(vector),
                Err(legacy_err) => Err(anyhow::anyhow!(
                    "embedding failed via /api/embed and /api/embeddings. \
                     modern error: {modern_err}; legacy error: {legacy_err}; \
                     ensure the embeddings model `{}` is available",
                    self.model_name
                )),
            },
        }
    }

    async fn embed_modern(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbedReq<'a> {
            model: &'a str,
            input: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbedResp {
            embeddings: Vec<Vec<f32>>,
        }

        let url = format!("{}/api/embed", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&EmbedReq {
                model: &self.model_name,
                input: text,
            })
            .send()
            .await
            .context("failed to call embed endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("/api/embed returned {status}: {}", normalize_err_body(&body));
        }

        let response = response
            .json::<EmbedResp>()
            .await
            .context("failed to decode /api/embed response")?;

        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("/api/embed returned empty embeddings array"))
    }

    async fn embed_legacy(&self, text: &str) -> Result<Vec<f32>> {
        #[derive(Serialize)]
        struct EmbeddingReq<'a> {
            model: &'a str,
            prompt: &'a str,
        }

        #[derive(Deserialize)]
        struct EmbeddingResp {
            embedding: Vec<f32>,
        }

        let url = format!("{}/api/embeddings", self.base_url);
        let response = self
            .client
            .post(url)
            .json(&EmbeddingReq {
                model: &self.model_name,
                prompt: text,
            })
            .send()
            .await
            .context("failed to call embeddings endpoint")?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!(
                "/api/embeddings returned {status}: {}",
                normalize_err_body(&body)
            );
        }

        let response = response
            .json::<EmbeddingResp>()
            .await
            .context("failed to decode /api/embeddings response")?;

        Ok(response.embedding)
    }
}

impl Embeddings for EmbeddingsClient {
    fn embed_query<'a>(&'a self, text: &'a str) -> BoxFuture<'a, Result<Vec<f32>>> {
        self.embed(text).boxed()
    }
}

pub(crate) fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return err.to_string();
        }
        if let Some(err) = json
            .get("error")
            .and_then(|v| v.get("message"))
            .and_then(|v| v.as_str())
        {
            return err.to_string();
        }
    }

    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    use super::*;
    use crate::test_support::serve_stub;

    const MODEL: &str = "all-MiniLM-L6-v2";

    async fn client_for(app: Router) -> EmbeddingsClient {
        EmbeddingsClient::new(Client::new(), serve_stub(app).await, MODEL)
    }

    #[test]
    fn error_body_prefers_error_field() {
        assert_eq!(
            normalize_err_body(r#"{"error":"model not found"}"#),
            "model not found"
        );
        assert_eq!(
            normalize_err_body(r#"{"error":{"message":"bad request","type":"x"}}"#),
            "bad request"
        );
        assert_eq!(normalize_err_body("  "), "<empty body>");
        assert_eq!(normalize_err_body("plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn empty_text_is_rejected_before_any_request() {
        let client = EmbeddingsClient::new(Client::new(), "http://127.0.0.1:9", "all-MiniLM-L6-v2");
        let err = client.embed_query("   ").await.unwrap_err();
        assert!(err.to_string().contains("empty text"));
    }

    #[tokio::test]
    async fn falls_back_to_legacy_route() {
        let app = Router::new().route(
            "/api/embeddings",
            post(|Json(body): Json<Value>| async move {
                assert_eq!(body["model"], MODEL);
                assert_eq!(body["prompt"], "hello");
                Json(json!({ "embedding": [0.5, -0.25] }))
            }),
        );

        let vector = client_for(app).await.embed_query(" hello ").await.unwrap();
        assert_eq!(vector, vec![0.5, -0.25]);
    }

    #[tokio::test]
    async fn modern_route_wins_when_available() {
        let app = Router::new()
            .route(
                "/api/embed",
                post(|Json(body): Json<Value>| async move {
                    assert_eq!(body["input"], "hello");
                    Json(json!({ "embeddings": [[1.0, 2.0]] }))
                }),
            )
            .route(
                "/api/embeddings",
                post(|| async { Json(json!({ "embedding": [9.0] })) }),
            );

        let vector = client_for(app).await.embed_query("hello").await.unwrap();
        assert_eq!(vector, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn both_routes_failing_names_routes_and_model() {
        let client = client_for(Router::new()).await;

        let message = client.embed_query("hello").await.unwrap_err().to_string();
        assert!(message.contains("/api/embed returned 404"), "{message}");
        assert!(message.contains("/api/embeddings returned 404"), "{message}");
        assert!(message.contains(MODEL), "{message}");
    }

    #[tokio::test]
    async fn empty_embeddings_array_is_an_error() {
        let app = Router::new().route(
            "/api/embed",
            post(|| async { Json(json!({ "embeddings": [] })) }),
        );

        let message = client_for(app)
            .await
            .embed_query("hello")
            .await
            .unwrap_err()
            .to_string();
        assert!(message.contains("empty embeddings array"), "{message}");
    }
}
