//! Hybrid retrieval-augmented generation pipeline.
//!
//! Turns a user question into an embedding, ranks stored fragments by
//! cosine distance, assembles a bounded context block, and forwards the
//! composed prompt to the generation model. All three collaborators are
//! injected so tests can substitute stubs.

#[cfg(test)]
mod tests;

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::Config;
use crate::providers::{EmbeddingProvider, GenerationOptions, GenerationProvider};
use crate::store::{FragmentSearch, ScoredFragment};
use crate::{RagError, Result};

const CONTEXT_HEADER: &str = "Relevant information:";

/// Retrieval and generation policy for a pipeline instance.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    /// Fragments at or beyond this cosine distance are never injected.
    pub max_distance: f32,
    /// Maximum number of fragments injected into the prompt.
    pub limit: usize,
    pub generation: GenerationOptions,
}

impl PipelineOptions {
    #[inline]
    pub fn from_config(config: &Config) -> Self {
        let mut generation =
            GenerationOptions::new(&config.ollama.generation_model, &config.ollama.keep_alive);
        generation.num_predict = config.ollama.num_predict;

        Self {
            max_distance: config.retrieval.max_distance,
            limit: config.retrieval.limit,
            generation,
        }
    }
}

/// Answers questions by combining retrieved fragments with model
/// generation. Stateless between calls; each invocation makes at most three
/// sequential external calls (embed, search, generate) with no retries and
/// no partial-result fallback.
pub struct RagPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    fragments: Arc<dyn FragmentSearch>,
    options: PipelineOptions,
}

impl RagPipeline {
    #[inline]
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
        fragments: Arc<dyn FragmentSearch>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            embedder,
            generator,
            fragments,
            options,
        }
    }

    /// Answer `query` using retrieved context where available.
    ///
    /// `requesting_user` is recorded for observability. Retrieval currently
    /// ranks the entire store rather than only that user's fragments;
    /// scoping it would change answers, so the shared knowledge base
    /// behavior is kept deliberately.
    #[inline]
    pub async fn answer(&self, query: &str, requesting_user: &str) -> Result<String> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("Query is required".to_string()));
        }

        debug!("Answering query for user {}", requesting_user);

        let query_vector = self.embedder.embed(query)?;

        let results = self
            .fragments
            .search(&query_vector, self.options.max_distance, self.options.limit)
            .await?;

        info!(
            "Retrieved {} fragments for prompt context (user: {})",
            results.len(),
            requesting_user
        );

        let context = build_context(&results);
        let prompt = compose_prompt(query, &context);

        // The completion is returned verbatim; no post-processing.
        self.generator.generate(&prompt, &self.options.generation)
    }

    /// Embed `query` and return the ranked fragments without generating an
    /// answer. Uses the same distance cutoff as [`Self::answer`].
    #[inline]
    pub async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<ScoredFragment>> {
        if query.trim().is_empty() {
            return Err(RagError::InvalidInput("Query is required".to_string()));
        }

        let query_vector = self.embedder.embed(query)?;
        self.fragments
            .search(&query_vector, self.options.max_distance, limit)
            .await
    }

    /// Summarize `text` with the generation model.
    #[inline]
    pub fn summarize(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput("Text is required".to_string()));
        }

        let prompt = format!("Summarize the following text concisely: {}", text);
        self.generator.generate(&prompt, &self.options.generation)
    }

    /// Generate multiple-choice quiz questions from `text`.
    #[inline]
    pub fn quiz(&self, text: &str) -> Result<String> {
        if text.trim().is_empty() {
            return Err(RagError::InvalidInput("Text is required".to_string()));
        }

        let prompt = format!(
            "Generate 3-5 multiple choice quiz questions (each with 4 options and the correct answer) from the following text: {}",
            text
        );
        self.generator.generate(&prompt, &self.options.generation)
    }
}

/// Build the context block injected into the prompt: a header line followed
/// by one numbered line per fragment, in ranked order. Empty results yield
/// an empty block with no header.
fn build_context(results: &[ScoredFragment]) -> String {
    if results.is_empty() {
        return String::new();
    }

    let mut context = format!("{}\n", CONTEXT_HEADER);
    for (i, result) in results.iter().enumerate() {
        context.push_str(&format!("Document {}: {}\n", i + 1, result.fragment.text));
    }
    context
}

/// Compose the final prompt. The two branches are mutually exclusive: a
/// grounded prompt when context exists, a plain knowledge prompt otherwise.
fn compose_prompt(query: &str, context: &str) -> String {
    if context.is_empty() {
        format!("Answer the following question based on your knowledge: {}", query)
    } else {
        format!(
            "Based on the following relevant information and your knowledge, answer the user's question. If the information is not sufficient, state that you don't have enough information.\n\n{}\nUser's question: {}",
            context, query
        )
    }
}
