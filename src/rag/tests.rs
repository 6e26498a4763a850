use super::*;
use crate::config::{OllamaConfig, RetrievalConfig};
use crate::store::Fragment;
use async_trait::async_trait;
use std::sync::Mutex;

struct StubEmbedder {
    vector: Vec<f32>,
    calls: Mutex<Vec<String>>,
}

impl StubEmbedder {
    fn new(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self {
            vector,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("lock should not be poisoned").clone()
    }
}

impl EmbeddingProvider for StubEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls
            .lock()
            .expect("lock should not be poisoned")
            .push(text.to_string());
        Ok(self.vector.clone())
    }
}

struct FailingEmbedder;

impl EmbeddingProvider for FailingEmbedder {
    fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::ProviderUnavailable("connection refused".to_string()))
    }
}

struct StubGenerator {
    reply: String,
    prompts: Mutex<Vec<String>>,
}

impl StubGenerator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .clone()
    }
}

impl GenerationProvider for StubGenerator {
    fn generate(&self, prompt: &str, _options: &GenerationOptions) -> Result<String> {
        self.prompts
            .lock()
            .expect("lock should not be poisoned")
            .push(prompt.to_string());
        Ok(self.reply.clone())
    }
}

struct FailingGenerator;

impl GenerationProvider for FailingGenerator {
    fn generate(&self, _prompt: &str, _options: &GenerationOptions) -> Result<String> {
        Err(RagError::Generation("model not found".to_string()))
    }
}

struct StubSearch {
    results: Vec<ScoredFragment>,
    calls: Mutex<Vec<(Vec<f32>, usize)>>,
}

impl StubSearch {
    fn new(results: Vec<ScoredFragment>) -> Arc<Self> {
        Arc::new(Self {
            results,
            calls: Mutex::new(Vec::new()),
        })
    }

    fn call_count(&self) -> usize {
        self.calls.lock().expect("lock should not be poisoned").len()
    }
}

#[async_trait]
impl FragmentSearch for StubSearch {
    async fn search(
        &self,
        query_vector: &[f32],
        _max_distance: f32,
        limit: usize,
    ) -> Result<Vec<ScoredFragment>> {
        self.calls
            .lock()
            .expect("lock should not be poisoned")
            .push((query_vector.to_vec(), limit));
        Ok(self.results.clone())
    }
}

struct FailingSearch;

#[async_trait]
impl FragmentSearch for FailingSearch {
    async fn search(
        &self,
        _query_vector: &[f32],
        _max_distance: f32,
        _limit: usize,
    ) -> Result<Vec<ScoredFragment>> {
        Err(RagError::Store("table unavailable".to_string()))
    }
}

fn scored(text: &str, distance: f32) -> ScoredFragment {
    ScoredFragment {
        fragment: Fragment {
            id: format!("frag-{}", text.len()),
            document_id: None,
            text: text.to_string(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        },
        distance,
    }
}

fn test_options() -> PipelineOptions {
    PipelineOptions {
        max_distance: 0.5,
        limit: 3,
        generation: GenerationOptions::new("llama3.2:latest", "30m"),
    }
}

#[tokio::test]
async fn empty_query_rejected_before_any_external_call() {
    let embedder = StubEmbedder::new(vec![0.1, 0.2]);
    let generator = StubGenerator::new("unused");
    let search = StubSearch::new(vec![]);
    let pipeline = RagPipeline::new(
        embedder.clone(),
        generator.clone(),
        search.clone(),
        test_options(),
    );

    for query in ["", "   ", "\t\n"] {
        let result = pipeline.answer(query, "alice").await;
        assert!(
            matches!(result, Err(RagError::InvalidInput(_))),
            "query {:?} should be rejected",
            query
        );
    }

    assert!(embedder.calls().is_empty(), "No embedding calls expected");
    assert_eq!(search.call_count(), 0, "No search calls expected");
    assert!(generator.prompts().is_empty(), "No generation calls expected");
}

#[tokio::test]
async fn no_context_prompt_is_exact() {
    let embedder = StubEmbedder::new(vec![0.1, 0.2]);
    let generator = StubGenerator::new("an answer");
    let search = StubSearch::new(vec![]);
    let pipeline = RagPipeline::new(embedder, generator.clone(), search, test_options());

    let answer = pipeline
        .answer("What is photosynthesis?", "alice")
        .await
        .expect("answer should succeed");
    assert_eq!(answer, "an answer");

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(
        prompts[0],
        "Answer the following question based on your knowledge: What is photosynthesis?"
    );
    assert!(!prompts[0].contains("Relevant information:"));
}

#[tokio::test]
async fn context_block_preserves_order_and_numbering() {
    let embedder = StubEmbedder::new(vec![0.1, 0.2]);
    let generator = StubGenerator::new("grounded answer");
    let search = StubSearch::new(vec![scored("A", 0.1), scored("B", 0.3)]);
    let pipeline = RagPipeline::new(embedder, generator.clone(), search, test_options());

    pipeline
        .answer("question", "alice")
        .await
        .expect("answer should succeed");

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(
        prompts[0].contains("Relevant information:\nDocument 1: A\nDocument 2: B\n"),
        "unexpected prompt: {}",
        prompts[0]
    );
    assert!(prompts[0].starts_with(
        "Based on the following relevant information and your knowledge, answer the user's question. If the information is not sufficient, state that you don't have enough information.\n\n"
    ));
    assert!(prompts[0].ends_with("User's question: question"));
}

#[tokio::test]
async fn end_to_end_grounded_answer() {
    let embedder = StubEmbedder::new(vec![0.5, 0.5]);
    let generator = StubGenerator::new("Light becomes chemical energy.");
    let search = StubSearch::new(vec![scored(
        "Photosynthesis converts light into chemical energy.",
        0.2,
    )]);
    let pipeline = RagPipeline::new(
        embedder.clone(),
        generator.clone(),
        search.clone(),
        test_options(),
    );

    let answer = pipeline
        .answer("What is photosynthesis?", "alice")
        .await
        .expect("answer should succeed");

    // The completion comes back verbatim, unmodified
    assert_eq!(answer, "Light becomes chemical energy.");

    assert_eq!(embedder.calls(), vec!["What is photosynthesis?".to_string()]);
    assert_eq!(search.call_count(), 1);

    let prompts = generator.prompts();
    assert!(prompts[0].contains("Photosynthesis converts light into chemical energy."));
    assert!(prompts[0].contains("state that you don't have enough information"));
    assert!(prompts[0].ends_with("User's question: What is photosynthesis?"));
}

#[tokio::test]
async fn repeated_query_composes_identical_prompts() {
    let embedder = StubEmbedder::new(vec![0.1, 0.2]);
    let generator = StubGenerator::new("answer");
    let search = StubSearch::new(vec![scored("A", 0.1)]);
    let pipeline = RagPipeline::new(
        embedder.clone(),
        generator.clone(),
        search,
        test_options(),
    );

    pipeline
        .answer("same question", "alice")
        .await
        .expect("first answer should succeed");
    pipeline
        .answer("same question", "alice")
        .await
        .expect("second answer should succeed");

    let embed_calls = embedder.calls();
    assert_eq!(embed_calls.len(), 2);
    assert_eq!(embed_calls[0], embed_calls[1]);

    let prompts = generator.prompts();
    assert_eq!(prompts.len(), 2);
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn embedding_failure_stops_the_pipeline() {
    let generator = StubGenerator::new("unused");
    let search = StubSearch::new(vec![scored("A", 0.1)]);
    let pipeline = RagPipeline::new(
        Arc::new(FailingEmbedder),
        generator.clone(),
        search.clone(),
        test_options(),
    );

    let result = pipeline.answer("question", "alice").await;
    assert!(matches!(result, Err(RagError::ProviderUnavailable(_))));

    assert_eq!(search.call_count(), 0, "Search must not run after embed fails");
    assert!(
        generator.prompts().is_empty(),
        "Generation must not run after embed fails"
    );
}

#[tokio::test]
async fn store_failure_stops_the_pipeline() {
    let generator = StubGenerator::new("unused");
    let pipeline = RagPipeline::new(
        StubEmbedder::new(vec![0.1, 0.2]),
        generator.clone(),
        Arc::new(FailingSearch),
        test_options(),
    );

    let result = pipeline.answer("question", "alice").await;
    assert!(matches!(result, Err(RagError::Store(_))));
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn generation_failure_propagates() {
    let pipeline = RagPipeline::new(
        StubEmbedder::new(vec![0.1, 0.2]),
        Arc::new(FailingGenerator),
        StubSearch::new(vec![]),
        test_options(),
    );

    let result = pipeline.answer("question", "alice").await;
    assert!(matches!(result, Err(RagError::Generation(_))));
}

#[tokio::test]
async fn retrieve_returns_ranked_fragments_without_generating() {
    let generator = StubGenerator::new("unused");
    let search = StubSearch::new(vec![scored("A", 0.1), scored("B", 0.3)]);
    let pipeline = RagPipeline::new(
        StubEmbedder::new(vec![0.1, 0.2]),
        generator.clone(),
        search,
        test_options(),
    );

    let results = pipeline
        .retrieve("question", 5)
        .await
        .expect("retrieve should succeed");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].fragment.text, "A");
    assert!(generator.prompts().is_empty());
}

#[tokio::test]
async fn retrieve_rejects_blank_query() {
    let pipeline = RagPipeline::new(
        StubEmbedder::new(vec![0.1, 0.2]),
        StubGenerator::new("unused"),
        StubSearch::new(vec![]),
        test_options(),
    );

    let result = pipeline.retrieve("  ", 5).await;
    assert!(matches!(result, Err(RagError::InvalidInput(_))));
}

#[test]
fn summarize_and_quiz_prompts() {
    let generator = StubGenerator::new("output");
    let pipeline = RagPipeline::new(
        StubEmbedder::new(vec![0.1, 0.2]),
        generator.clone(),
        StubSearch::new(vec![]),
        test_options(),
    );

    pipeline
        .summarize("Mitochondria are the powerhouse of the cell.")
        .expect("summarize should succeed");
    pipeline
        .quiz("Mitochondria are the powerhouse of the cell.")
        .expect("quiz should succeed");

    let prompts = generator.prompts();
    assert_eq!(
        prompts[0],
        "Summarize the following text concisely: Mitochondria are the powerhouse of the cell."
    );
    assert_eq!(
        prompts[1],
        "Generate 3-5 multiple choice quiz questions (each with 4 options and the correct answer) from the following text: Mitochondria are the powerhouse of the cell."
    );

    assert!(matches!(
        pipeline.summarize("  "),
        Err(RagError::InvalidInput(_))
    ));
    assert!(matches!(pipeline.quiz(""), Err(RagError::InvalidInput(_))));
}

#[test]
fn build_context_exact_formatting() {
    assert_eq!(build_context(&[]), "");

    let context = build_context(&[scored("A", 0.1), scored("B", 0.3)]);
    assert_eq!(context, "Relevant information:\nDocument 1: A\nDocument 2: B\n");
}

#[test]
fn compose_prompt_branches_are_mutually_exclusive() {
    let bare = compose_prompt("Why is the sky blue?", "");
    assert_eq!(
        bare,
        "Answer the following question based on your knowledge: Why is the sky blue?"
    );

    let context = "Relevant information:\nDocument 1: Rayleigh scattering.\n";
    let grounded = compose_prompt("Why is the sky blue?", context);
    assert!(grounded.contains(context));
    assert!(grounded.ends_with("User's question: Why is the sky blue?"));
    assert!(!grounded.contains("based on your knowledge:"));
}

#[test]
fn options_derive_from_config() {
    let config = Config {
        ollama: OllamaConfig {
            generation_model: "llama3.2:latest".to_string(),
            keep_alive: "1h".to_string(),
            num_predict: Some(128),
            ..OllamaConfig::default()
        },
        retrieval: RetrievalConfig {
            max_distance: 0.4,
            limit: 7,
            embedding_dimension: 768,
        },
        base_dir: std::path::PathBuf::new(),
    };

    let options = PipelineOptions::from_config(&config);
    assert!((options.max_distance - 0.4).abs() < f32::EPSILON);
    assert_eq!(options.limit, 7);
    assert_eq!(options.generation.model, "llama3.2:latest");
    assert_eq!(options.generation.keep_alive, "1h");
    assert_eq!(options.generation.num_predict, Some(128));
}
