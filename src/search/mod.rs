// Retrieval and answer service
// Finds the chunks closest to a question and asks the chat model to answer from them only


use async_trait::async_trait;
use tracing::{debug, error, info};

use crate::Result;
use crate::chunking::DocumentChunk;
use crate::database::{ScoredChunk, VectorStore};
use crate::providers::{Embedder, Generator};

/// Answer given when no context supports the question
pub const REFUSAL_MESSAGE: &str = "Não tenho informações necessárias para responder sua pergunta.";

/// Answer given when retrieval or generation fails
pub const GENERIC_ERROR_MESSAGE: &str = "Erro interno ao processar sua pergunta. Tente novamente.";

/// Prompt sent to the chat model; `{contexto}` and `{pergunta}` are substituted
pub const PROMPT_TEMPLATE: &str = r#"CONTEXTO:
{contexto}

REGRAS:
- Responda somente com base no CONTEXTO.
- Se a informação não estiver explicitamente no CONTEXTO, responda:
  "Não tenho informações necessárias para responder sua pergunta."
- Nunca invente ou use conhecimento externo.
- Nunca produza opiniões ou interpretações além do que está escrito.

EXEMPLOS DE PERGUNTAS FORA DO CONTEXTO:
Pergunta: "Qual é a capital da França?"
Resposta: "Não tenho informações necessárias para responder sua pergunta."

Pergunta: "Quantos clientes temos em 2024?"
Resposta: "Não tenho informações necessárias para responder sua pergunta."

Pergunta: "Você acha isso bom ou ruim?"
Resposta: "Não tenho informações necessárias para responder sua pergunta."

PERGUNTA DO USUÁRIO:
{pergunta}

RESPONDA A "PERGUNTA DO USUÁRIO"
"#;

/// Fill the prompt template with the retrieved context and the question.
///
/// Placeholders are substituted in one pass, so braces inside the document
/// or the question are left alone.
#[inline]
pub fn render_prompt(context: &str, question: &str) -> String {
    let (head, rest) = PROMPT_TEMPLATE
        .split_once("{contexto}")
        .unwrap_or((PROMPT_TEMPLATE, ""));
    let (middle, tail) = rest.split_once("{pergunta}").unwrap_or((rest, ""));
    format!("{head}{context}{middle}{question}{tail}")
}

/// Result of answering one question
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Model answer built from retrieved context
    Grounded(String),
    /// Nothing relevant was retrieved; the model was not called
    Refusal,
    /// Retrieval or generation failed
    Failed { detail: String },
}

impl Answer {
    /// Text shown to the user
    #[inline]
    pub fn into_text(self) -> String {
        match self {
            Self::Grounded(text) => text,
            Self::Refusal => REFUSAL_MESSAGE.to_string(),
            Self::Failed { .. } => GENERIC_ERROR_MESSAGE.to_string(),
        }
    }
}

/// Source of context chunks for a question
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Up to `k` chunks, most relevant first
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>>;
}

/// Embeds the query and searches the vector store
pub struct VectorRetriever<E> {
    embedder: E,
    store: VectorStore,
}

impl<E: Embedder> VectorRetriever<E> {
    #[inline]
    pub fn new(embedder: E, store: VectorStore) -> Self {
        Self { embedder, store }
    }

    #[inline]
    pub fn store(&self) -> &VectorStore {
        &self.store
    }
}

#[async_trait]
impl<E: Embedder> Retriever for VectorRetriever<E> {
    #[inline]
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let vector = self.embedder.embed_one(query).await?;
        self.store.search(&vector, k).await
    }
}

pub struct SearchService<R, G> {
    retriever: R,
    generator: G,
    default_k: usize,
}

impl<R: Retriever, G: Generator> SearchService<R, G> {
    #[inline]
    pub fn new(retriever: R, generator: G, default_k: usize) -> Self {
        Self {
            retriever,
            generator,
            default_k,
        }
    }

    #[inline]
    pub fn retriever(&self) -> &R {
        &self.retriever
    }

    #[inline]
    pub fn generator(&self) -> &G {
        &self.generator
    }

    #[inline]
    pub fn default_k(&self) -> usize {
        self.default_k
    }

    /// Chunks relevant to `question` with their distances, most relevant first
    #[inline]
    pub async fn search_with_scores(
        &self,
        question: &str,
        k: Option<usize>,
    ) -> Result<Vec<ScoredChunk>> {
        let k = k.unwrap_or(self.default_k);
        debug!("Searching {} chunk(s) for: {}", k, question);

        let results = self.retriever.retrieve(question, k).await?;
        for (rank, scored) in results.iter().take(3).enumerate() {
            let preview: String = scored.chunk.content.chars().take(80).collect();
            debug!(
                "#{} distance {:.4} (page {}): {}",
                rank + 1,
                scored.distance,
                scored.chunk.page,
                preview.replace('\n', " ")
            );
        }

        Ok(results)
    }

    /// Chunks relevant to `question`, most relevant first
    #[inline]
    pub async fn search(&self, question: &str, k: Option<usize>) -> Result<Vec<DocumentChunk>> {
        Ok(self
            .search_with_scores(question, k)
            .await?
            .into_iter()
            .map(|scored| scored.chunk)
            .collect())
    }

    /// Answer `question` from the stored document, distinguishing refusals and failures
    #[inline]
    pub async fn answer_detailed(&self, question: &str, k: Option<usize>) -> Answer {
        let chunks = match self.search(question, k).await {
            Ok(chunks) => chunks,
            Err(e) => {
                error!("Search failed: {}", e);
                return Answer::Failed {
                    detail: e.to_string(),
                };
            }
        };

        if chunks.is_empty() {
            info!("No relevant context found, refusing");
            return Answer::Refusal;
        }

        let context = chunks
            .iter()
            .map(|chunk| chunk.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        let prompt = render_prompt(&context, question);
        debug!(
            "Prompt built from {} chunk(s), {} characters",
            chunks.len(),
            prompt.chars().count()
        );

        match self.generator.generate(&prompt).await {
            Ok(text) => Answer::Grounded(text.trim().to_string()),
            Err(e) => {
                error!("Answer generation failed: {}", e);
                Answer::Failed {
                    detail: e.to_string(),
                }
            }
        }
    }

    /// Answer text for `question`; never fails
    #[inline]
    pub async fn answer(&self, question: &str, k: Option<usize>) -> String {
        self.answer_detailed(question, k).await.into_text()
    }
}
