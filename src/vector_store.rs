use std::path::Path;

use anyhow::{Context, Result};
use arrow_array::{Array, Float32Array, RecordBatch, StringArray};
use futures::{Stream, StreamExt};
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Table};
use serde_json::{Map, Value};

use crate::models::Document;

const TEXT_COLUMN: &str = "text";
const DISTANCE_COLUMN: &str = "_distance";
const METADATA_COLUMN: &str = "metadata";
const PASSTHROUGH_COLUMNS: [&str; 2] = ["id", "source"];

/// Read-only client on the persisted LanceDB index under `persist_directory`.
pub struct PersistentStore {
    table: Table,
}

impl PersistentStore {
    pub async fn open(directory: &Path, collection: &str) -> Result<Self> {
        if !directory.is_dir() {
            anyhow::bail!(
                "persist directory {} does not exist; ingest documents first",
                directory.display()
            );
        }

        let uri = directory.to_string_lossy();
        let connection = connect(&uri)
            .execute()
            .await
            .with_context(|| format!("failed to open vector store at {}", directory.display()))?;

        let table = connection
            .open_table(collection)
            .execute()
            .await
            .with_context(|| {
                format!(
                    "failed to open collection `{collection}` in {}",
                    directory.display()
                )
            })?;

        tracing::debug!(directory = %directory.display(), collection, "opened vector store");

        Ok(Self { table })
    }

    pub async fn similarity_search(&self, vector: Vec<f32>, k: usize) -> Result<Vec<Document>> {
        if vector.is_empty() || k == 0 {
            return Ok(vec![]);
        }

        let stream = self
            .table
            .vector_search(vector)
            .context("failed to build vector search")?
            .limit(k)
            .execute()
            .await
            .context("vector search failed")?;

        collect_top_k(stream, k).await
    }
}

// `k` is user configured, so it bounds the result but never sizes an allocation.
pub(crate) async fn collect_top_k<S, E>(mut batches: S, k: usize) -> Result<Vec<Document>>
where
    S: Stream<Item = std::result::Result<RecordBatch, E>> + Unpin,
    E: std::error::Error + Send + Sync + 'static,
{
    let mut documents = Vec::new();
    while let Some(batch) = batches.next().await {
        let batch = batch.context("failed to read vector search batch")?;
        documents.extend(documents_from_batch(&batch)?);
        if documents.len() >= k {
            break;
        }
    }

    documents.truncate(k);
    Ok(documents)
}

pub(crate) fn documents_from_batch(batch: &RecordBatch) -> Result<Vec<Document>> {
    let texts = string_column(batch, TEXT_COLUMN)
        .ok_or_else(|| anyhow::anyhow!("vector store rows have no `{TEXT_COLUMN}` column"))?;
    let metadata = string_column(batch, METADATA_COLUMN);
    let distances = batch
        .column_by_name(DISTANCE_COLUMN)
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());
    let passthrough: Vec<(&str, &StringArray)> = PASSTHROUGH_COLUMNS
        .iter()
        .filter_map(|name| string_column(batch, name).map(|col| (*name, col)))
        .collect();

    let mut out = Vec::with_capacity(batch.num_rows());
    for row in 0..batch.num_rows() {
        if texts.is_null(row) {
            continue;
        }

        let mut fields = metadata
            .filter(|col| !col.is_null(row))
            .and_then(|col| serde_json::from_str::<Map<String, Value>>(col.value(row)).ok())
            .unwrap_or_default();

        for (name, col) in &passthrough {
            if !col.is_null(row) && !fields.contains_key(*name) {
                fields.insert(name.to_string(), Value::from(col.value(row)));
            }
        }

        if let Some(distances) = distances.filter(|col| !col.is_null(row)) {
            fields.insert("distance".to_string(), Value::from(distances.value(row)));
        }

        out.push(Document {
            page_content: texts.value(row).to_string(),
            metadata: fields,
        });
    }

    Ok(out)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Option<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|col| col.as_any().downcast_ref::<StringArray>())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use arrow_array::ArrayRef;

    use super::*;

    #[test]
    fn rows_become_documents_with_metadata() {
        let batch = RecordBatch::try_from_iter(vec![
            (
                "text",
                Arc::new(StringArray::from(vec!["first chunk", "second chunk"])) as ArrayRef,
            ),
            (
                "metadata",
                Arc::new(StringArray::from(vec![
                    Some(r#"{"source":"docs/a.pdf","page":3}"#),
                    None,
                ])) as ArrayRef,
            ),
            (
                "source",
                Arc::new(StringArray::from(vec!["ignored.pdf", "docs/b.txt"])) as ArrayRef,
            ),
            (
                "_distance",
                Arc::new(Float32Array::from(vec![0.25f32, 0.5])) as ArrayRef,
            ),
        ])
        .unwrap();

        let docs = documents_from_batch(&batch).unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].page_content, "first chunk");
        assert_eq!(docs[0].source(), Some("docs/a.pdf"));
        assert_eq!(docs[0].metadata["page"], 3);
        assert_eq!(docs[0].metadata["distance"], 0.25);
        assert_eq!(docs[1].source(), Some("docs/b.txt"));
    }

    #[test]
    fn missing_text_column_is_an_error() {
        let batch = RecordBatch::try_from_iter(vec![(
            "id",
            Arc::new(StringArray::from(vec!["x"])) as ArrayRef,
        )])
        .unwrap();

        assert!(documents_from_batch(&batch).is_err());
    }

    fn text_batch(texts: Vec<&str>) -> RecordBatch {
        RecordBatch::try_from_iter(vec![(
            "text",
            Arc::new(StringArray::from(texts)) as ArrayRef,
        )])
        .unwrap()
    }

    #[tokio::test]
    async fn huge_k_collects_without_preallocating() {
        let batches = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(text_batch(vec!["a", "b"])),
            Ok(text_batch(vec!["c"])),
        ]);

        let docs = collect_top_k(batches, 100_000_000_000).await.unwrap();
        let texts: Vec<&str> = docs.iter().map(|d| d.page_content.as_str()).collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn results_are_bounded_by_k() {
        let batches = futures::stream::iter(vec![
            Ok::<_, std::io::Error>(text_batch(vec!["a", "b"])),
            Ok(text_batch(vec!["c", "d"])),
        ]);

        let docs = collect_top_k(batches, 3).await.unwrap();
        assert_eq!(docs.len(), 3);
        assert_eq!(docs[2].page_content, "c");
    }

    #[tokio::test]
    async fn batch_errors_propagate() {
        let batches = futures::stream::iter(vec![Err::<RecordBatch, _>(std::io::Error::other(
            "disk gone",
        ))]);

        let err = collect_top_k(batches, 4).await.unwrap_err();
        assert!(format!("{err:#}").contains("disk gone"));
    }

    #[tokio::test]
    async fn missing_directory_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let result = PersistentStore::open(&dir.path().join("db"), "langchain").await;
        assert!(result.is_err());
    }
}
