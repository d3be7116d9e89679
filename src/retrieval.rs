use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::Client;

use crate::config::Settings;
use crate::embeddings::{Embeddings, EmbeddingsClient};
use crate::models::Document;
use crate::vector_store::PersistentStore;

pub trait Retrieve: Send + Sync {
    fn get_relevant_documents<'a>(&'a self, query: &'a str)
        -> BoxFuture<'a, Result<Vec<Document>>>;
}

/// Builds a fresh retriever for a single query.
pub trait RetrieverFactory: Send + Sync {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn Retrieve>>>;
}

/// Similarity retriever over the persisted store, bounded to the top `k` chunks.
pub struct Retriever {
    embeddings: Arc<dyn Embeddings>,
    store: PersistentStore,
    k: usize,
}

impl Retriever {
    pub fn new(embeddings: Arc<dyn Embeddings>, store: PersistentStore, k: usize) -> Self {
        Self {
            embeddings,
            store,
            k,
        }
    }

    pub async fn retrieve(&self, query: &str) -> Result<Vec<Document>> {
        let embedding = self.embeddings.embed_query(query).await?;
        let documents = self.store.similarity_search(embedding, self.k).await?;
        tracing::debug!(
            requested = self.k,
            found = documents.len(),
            "retrieved source chunks"
        );
        Ok(documents)
    }
}

impl Retrieve for Retriever {
    fn get_relevant_documents<'a>(
        &'a self,
        query: &'a str,
    ) -> BoxFuture<'a, Result<Vec<Document>>> {
        self.retrieve(query).boxed()
    }
}

/// Opens the configured persistent store and embeddings model on every call.
#[derive(Clone)]
pub struct PersistentRetrieverFactory {
    client: Client,
    embeddings_base_url: String,
    embeddings_model_name: Option<String>,
    persist_directory: Option<PathBuf>,
    collection_name: String,
    target_source_chunks: usize,
}

impl PersistentRetrieverFactory {
    pub fn new(settings: &Settings, client: Client) -> Self {
        Self {
            client,
            embeddings_base_url: settings.runtime.embeddings_base_url.clone(),
            embeddings_model_name: settings.embeddings_model_name.clone(),
            persist_directory: settings.persist_directory.clone(),
            collection_name: settings.collection_name.clone(),
            target_source_chunks: settings.target_source_chunks,
        }
    }

    async fn build(&self) -> Result<Box<dyn Retrieve>> {
        let model_name = self
            .embeddings_model_name
            .as_deref()
            .context("EMBEDDINGS_MODEL_NAME is not set")?;
        let directory = self
            .persist_directory
            .as_deref()
            .context("PERSIST_DIRECTORY is not set")?;

        let embeddings = Arc::new(EmbeddingsClient::new(
            self.client.clone(),
            self.embeddings_base_url.clone(),
            model_name,
        ));
        let store = PersistentStore::open(directory, &self.collection_name).await?;

        Ok(Box::new(Retriever::new(
            embeddings,
            store,
            self.target_source_chunks,
        )))
    }
}

impl RetrieverFactory for PersistentRetrieverFactory {
    fn open(&self) -> BoxFuture<'_, Result<Box<dyn Retrieve>>> {
        self.build().boxed()
    }
}
