use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const INVALID_QUERY_MESSAGE: &str = "Invalid query";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryEnvelope {
    pub query: String,
}

/// Body of the deprecated `/ask` endpoint; a missing query is treated as empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AskRequest {
    #[serde(default)]
    pub query: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn source(&self) -> Option<&str> {
        self.metadata.get("source").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub question: String,
    pub answer: String,
    pub time_taken: f64,
    pub source_documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvalidQuery {
    pub result: String,
    pub source_documents: Vec<Document>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnswerResult {
    Answered(Answer),
    Invalid(InvalidQuery),
}

impl AnswerResult {
    pub fn invalid_query() -> Self {
        AnswerResult::Invalid(InvalidQuery {
            result: INVALID_QUERY_MESSAGE.to_string(),
            source_documents: vec![],
        })
    }

    pub fn source_documents(&self) -> &[Document] {
        match self {
            AnswerResult::Answered(answer) => &answer.source_documents,
            AnswerResult::Invalid(invalid) => &invalid.source_documents,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub result: String,
    pub source_documents: Vec<Document>,
}
