use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::database::{SearchHit, VectorDBError};
use crate::document::DocumentError;
use crate::providers::{ChatProvider, ProviderError};

use super::prompt::{format_docs, ChatTemplate};
use super::retriever::Retriever;

const EXCERPT_CHARS: usize = 160;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Enter your query")]
    EmptyQuestion,
    #[error("Model provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Vector store error: {0}")]
    Store(#[from] VectorDBError),
    #[error("Document error: {0}")]
    Document(#[from] DocumentError),
}

/// Where a piece of retrieved context came from.
#[derive(Debug, Clone, Serialize)]
pub struct SourceRef {
    pub page: u32,
    pub chunk_index: usize,
    pub score: f32,
    pub excerpt: String,
}

impl From<&SearchHit> for SourceRef {
    fn from(hit: &SearchHit) -> Self {
        let content = hit.chunk.content.trim();
        let mut excerpt: String = content.chars().take(EXCERPT_CHARS).collect();
        if content.chars().count() > EXCERPT_CHARS {
            excerpt.push('…');
        }
        Self {
            page: hit.chunk.metadata.page,
            chunk_index: hit.chunk.metadata.chunk_index,
            score: hit.score,
            excerpt,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

impl Answer {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// retrieve -> format context -> prompt -> chat model -> plain text.
pub struct RagChain {
    retriever: Retriever,
    chat: Arc<dyn ChatProvider>,
    template: ChatTemplate,
}

impl RagChain {
    pub fn new(retriever: Retriever, chat: Arc<dyn ChatProvider>) -> Self {
        Self {
            retriever,
            chat,
            template: ChatTemplate::default(),
        }
    }

    pub async fn invoke(&self, question: &str) -> Result<Answer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuestion);
        }

        let hits = self.retriever.retrieve(question).await?;
        let context = format_docs(&hits);
        let messages = self.template.render(&context, question);

        log::info!("Asking {} with {} context chunks", self.chat.model_name(), hits.len());
        let text = self.chat.complete(&messages).await?;

        Ok(Answer {
            text: text.trim().to_string(),
            sources: hits.iter().map(SourceRef::from).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{LocalStore, StoredChunk, VectorStore};
    use crate::document::{Chunk, ChunkMetadata};
    use crate::providers::fake::{FakeChat, FakeEmbedder};
    use crate::providers::Role;
    use chrono::Utc;
    use std::sync::atomic::Ordering;

    const PASSAGES: [&str; 3] = [
        "Models use information at the beginning and end of long contexts best.",
        "Performance degrades when relevant facts sit in the middle of the context.",
        "The appendix lists hyperparameters for every experiment.",
    ];

    async fn chain_with(chat: Arc<FakeChat>, dir: &std::path::Path) -> RagChain {
        let store = LocalStore::open(dir, "paper").await.unwrap();
        let records = PASSAGES
            .iter()
            .enumerate()
            .map(|(i, text)| StoredChunk {
                chunk: Chunk {
                    id: format!("c{}", i),
                    content: text.to_string(),
                    metadata: ChunkMetadata {
                        source: "leavenocontext.pdf".to_string(),
                        page: i as u32 + 1,
                        chunk_index: i,
                        ingested_at: Utc::now(),
                    },
                },
                embedding: FakeEmbedder::embed(text),
            })
            .collect();
        store.add(records).await.unwrap();
        let store: Arc<dyn VectorStore> = Arc::new(store);
        let retriever = Retriever::new(Arc::new(FakeEmbedder::default()), store, 2);
        RagChain::new(retriever, chat)
    }

    #[tokio::test]
    async fn answers_with_retrieved_context() {
        let dir = tempfile::tempdir().unwrap();
        let chat = Arc::new(FakeChat::answering("  Relevant facts in the middle are missed.\n"));
        let chain = chain_with(chat.clone(), dir.path()).await;

        let answer = chain.invoke("What happens in the middle of the context?").await.unwrap();
        assert_eq!(answer.text, "Relevant facts in the middle are missed.");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].page, 2);

        let messages = chat.last_messages.lock().unwrap().clone();
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains(PASSAGES[1]));
        assert!(messages[1].content.contains("Question:\nWhat happens in the middle of the context?"));
    }

    #[tokio::test]
    async fn blank_question_never_reaches_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let chat = Arc::new(FakeChat::answering("unused"));
        let chain = chain_with(chat.clone(), dir.path()).await;

        let err = chain.invoke("   ").await.unwrap_err();
        assert!(matches!(err, RagError::EmptyQuestion));
        assert_eq!(err.to_string(), "Enter your query");
        assert_eq!(chat.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn provider_failures_propagate() {
        let dir = tempfile::tempdir().unwrap();
        let chat = Arc::new(FakeChat::failing("overloaded"));
        let chain = chain_with(chat, dir.path()).await;

        let err = chain.invoke("anything").await.unwrap_err();
        assert!(matches!(err, RagError::Provider(ProviderError::Api { status: 503, .. })));
    }

    #[tokio::test]
    async fn empty_model_output_yields_empty_answer() {
        let dir = tempfile::tempdir().unwrap();
        let chain = chain_with(Arc::new(FakeChat::answering(" \n ")), dir.path()).await;
        let answer = chain.invoke("question").await.unwrap();
        assert!(answer.is_empty());
    }

    #[test]
    fn long_excerpts_are_truncated() {
        let hit = SearchHit {
            chunk: Chunk {
                id: "x".to_string(),
                content: "word ".repeat(100),
                metadata: ChunkMetadata {
                    source: "p.pdf".to_string(),
                    page: 4,
                    chunk_index: 9,
                    ingested_at: Utc::now(),
                },
            },
            score: 0.5,
        };
        let source = SourceRef::from(&hit);
        assert_eq!(source.excerpt.chars().count(), EXCERPT_CHARS + 1);
        assert!(source.excerpt.ends_with('…'));
    }
}
