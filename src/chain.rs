use anyhow::Result;

use crate::llm::LanguageModel;
use crate::models::{ChainOutput, Document};
use crate::retrieval::Retrieve;

const DOCUMENT_SEPARATOR: &str = "\n\n";

/// Retrieval-then-generate chain that stuffs every retrieved chunk into one prompt.
pub struct RetrievalQa<'a> {
    llm: &'a dyn LanguageModel,
    retriever: &'a dyn Retrieve,
    return_source_documents: bool,
}

impl<'a> RetrievalQa<'a> {
    pub fn new(
        llm: &'a dyn LanguageModel,
        retriever: &'a dyn Retrieve,
        return_source_documents: bool,
    ) -> Self {
        Self {
            llm,
            retriever,
            return_source_documents,
        }
    }

    pub async fn call(&self, query: &str, stream: bool) -> Result<ChainOutput> {
        let documents = self.retriever.get_relevant_documents(query).await?;
        let prompt = build_stuff_prompt(query, &documents);
        let result = self.llm.generate(&prompt, stream).await?;

        Ok(ChainOutput {
            result,
            source_documents: if self.return_source_documents {
                documents
            } else {
                vec![]
            },
        })
    }
}

pub fn build_stuff_prompt(question: &str, documents: &[Document]) -> String {
    let context = documents
        .iter()
        .map(|doc| doc.page_content.as_str())
        .collect::<Vec<_>>()
        .join(DOCUMENT_SEPARATOR);

    format!(
        "Use the following pieces of context to answer the question at the end. \
         If you don't know the answer, just say that you don't know, \
         don't try to make up an answer.\n\n\
         {context}\n\n\
         Question: {question}\n\
         Helpful Answer:"
    )
}
