use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tokio::sync::Semaphore;

use crate::chain::RetrievalQa;
use crate::llm::LanguageModel;
use crate::models::{Answer, AnswerResult};
use crate::retrieval::RetrieverFactory;

/// Answers questions against the shared model and the persisted document index.
#[derive(Clone)]
pub struct QueryInterface {
    llm: Arc<dyn LanguageModel>,
    retrievers: Arc<dyn RetrieverFactory>,
    generation_limit: Arc<Semaphore>,
}

impl QueryInterface {
    pub fn new(
        llm: Arc<dyn LanguageModel>,
        retrievers: Arc<dyn RetrieverFactory>,
        generation_limit: Arc<Semaphore>,
    ) -> Self {
        Self {
            llm,
            retrievers,
            generation_limit,
        }
    }

    pub async fn get_answer(
        &self,
        query: &str,
        mute_stream: bool,
        hide_source: bool,
    ) -> Result<AnswerResult> {
        if query.trim().is_empty() {
            return Ok(AnswerResult::invalid_query());
        }

        let retriever = self.retrievers.open().await?;
        let qa = RetrievalQa::new(self.llm.as_ref(), retriever.as_ref(), !hide_source);

        let _permit = self.generation_limit.acquire().await?;
        let started = Instant::now();
        let output = qa.call(query, !mute_stream).await?;
        let time_taken = round_seconds(started.elapsed().as_secs_f64());

        tracing::info!(
            time_taken,
            sources = output.source_documents.len(),
            "answered query"
        );

        Ok(AnswerResult::Answered(Answer {
            question: query.to_string(),
            answer: output.result,
            time_taken,
            source_documents: output.source_documents,
        }))
    }
}

fn round_seconds(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
