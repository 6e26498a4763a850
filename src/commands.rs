use console::style;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::Config;
use crate::providers::ollama::OllamaClient;
use crate::rag::{PipelineOptions, RagPipeline};
use crate::store::{Database, DocumentStatus, FragmentStore, NewDocument, NewFragment};
use crate::providers::EmbeddingProvider;
use crate::{RagError, Result};

fn requesting_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "local".to_string())
}

async fn open_fragment_store(config: &Config) -> Result<FragmentStore> {
    FragmentStore::new(config).await
}

async fn open_database(config: &Config) -> Result<Database> {
    std::fs::create_dir_all(config.get_base_dir())?;
    Ok(Database::new(config.database_path()).await?)
}

fn build_pipeline(config: &Config, store: FragmentStore) -> Result<RagPipeline> {
    let client = Arc::new(OllamaClient::new(&config.ollama)?);
    let options = PipelineOptions::from_config(config);
    Ok(RagPipeline::new(
        Arc::clone(&client) as Arc<dyn EmbeddingProvider>,
        client,
        Arc::new(store),
        options,
    ))
}

/// Answer a question against the stored study material
#[inline]
pub async fn ask(query: String) -> Result<()> {
    let config = Config::load()?;
    let store = open_fragment_store(&config).await?;
    let pipeline = build_pipeline(&config, store)?;

    let answer = pipeline.answer(&query, &requesting_user()).await?;
    println!("{}", answer);

    Ok(())
}

/// Retrieve the fragments most similar to a query, without generating an
/// answer
#[inline]
pub async fn search(query: String, limit: usize) -> Result<()> {
    let config = Config::load()?;
    let store = open_fragment_store(&config).await?;
    let pipeline = build_pipeline(&config, store)?;

    let results = pipeline.retrieve(&query, limit).await?;

    if results.is_empty() {
        println!("No fragments within the distance cutoff.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!(
            "{} {}",
            style(format!("{}.", i + 1)).bold(),
            style(format!("distance {:.4}", result.distance)).dim()
        );
        println!("   {}", result.fragment.text);
        if let Some(document_id) = &result.fragment.document_id {
            println!("   {}", style(format!("document: {}", document_id)).dim());
        }
    }

    Ok(())
}

/// Ingest a plain-text file: register the document, embed its contents
/// whole, and store the resulting fragment
#[inline]
pub async fn ingest(path: &Path, name: Option<String>) -> Result<()> {
    let config = Config::load()?;
    let database = open_database(&config).await?;
    let store = open_fragment_store(&config).await?;
    let client = OllamaClient::new(&config.ollama)?;

    let text = std::fs::read_to_string(path)?;
    if text.trim().is_empty() {
        return Err(RagError::InvalidInput(format!(
            "File {} is empty",
            path.display()
        )));
    }

    let filename = name.unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });
    let file_type = path
        .extension()
        .map_or_else(|| "text".to_string(), |e| e.to_string_lossy().into_owned());

    let document = database
        .create_document(NewDocument {
            filename: filename.clone(),
            file_type,
            owner: requesting_user(),
        })
        .await?;

    info!("Ingesting document {} ({})", document.id, filename);

    // Whole-file embedding: long documents are not chunked before
    // embedding, so the model's own input truncation applies.
    let indexed = embed_and_store(&client, &store, &document.id, &text).await;

    match indexed {
        Ok(()) => {
            database
                .update_document_status(&document.id, DocumentStatus::Indexed, None)
                .await?;
            println!(
                "{} {} (document {})",
                style("✓ Indexed").green(),
                filename,
                document.id
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to index document {}: {}", document.id, e);
            database
                .update_document_status(&document.id, DocumentStatus::Failed, Some(&e.to_string()))
                .await?;
            Err(e)
        }
    }
}

async fn embed_and_store(
    client: &OllamaClient,
    store: &FragmentStore,
    document_id: &str,
    text: &str,
) -> Result<()> {
    let embedding = client.embed(text)?;
    store
        .insert_fragments(vec![NewFragment {
            document_id: Some(document_id.to_string()),
            text: text.to_string(),
            embedding,
        }])
        .await?;
    Ok(())
}

/// Summarize a text file with the generation model
#[inline]
pub async fn summarize(path: &Path) -> Result<()> {
    let config = Config::load()?;
    let store = open_fragment_store(&config).await?;
    let pipeline = build_pipeline(&config, store)?;

    let text = std::fs::read_to_string(path)?;
    let summary = pipeline.summarize(&text)?;
    println!("{}", summary);

    Ok(())
}

/// Generate multiple-choice quiz questions from a text file
#[inline]
pub async fn quiz(path: &Path) -> Result<()> {
    let config = Config::load()?;
    let store = open_fragment_store(&config).await?;
    let pipeline = build_pipeline(&config, store)?;

    let text = std::fs::read_to_string(path)?;
    let questions = pipeline.quiz(&text)?;
    println!("{}", questions);

    Ok(())
}

/// List all registered documents
#[inline]
pub async fn list_documents() -> Result<()> {
    let config = Config::load()?;
    let database = open_database(&config).await?;

    let documents = database.list_documents().await?;

    if documents.is_empty() {
        println!("No documents have been ingested yet.");
        println!("Use 'study-rag ingest <file>' to add study material.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    println!();

    for document in &documents {
        println!("📄 {} (ID: {})", document.filename, document.id);
        println!("   Type: {}", document.file_type);
        println!("   Owner: {}", document.owner);
        println!("   Status: {}", document.status);
        if let Some(message) = &document.error_message {
            println!("   Error: {}", style(message).red());
        }
        println!("   Uploaded: {}", document.upload_date);
        println!();
    }

    Ok(())
}

/// Delete a document and every fragment it owns
#[inline]
pub async fn delete_document(document_id: String) -> Result<()> {
    let config = Config::load()?;
    let database = open_database(&config).await?;
    let store = open_fragment_store(&config).await?;

    let Some(document) = database.get_document(&document_id).await? else {
        return Err(RagError::InvalidInput(format!(
            "No document with id {}",
            document_id
        )));
    };

    // Fragments go first so a failure here never leaves orphans pointing at
    // a deleted document row.
    store.delete_document_fragments(&document.id).await?;
    database.delete_document(&document.id).await?;

    info!("Deleted document {} and its fragments", document.id);
    println!("{} {}", style("✓ Deleted").green(), document.filename);

    Ok(())
}

/// Show store counts and model endpoint health
#[inline]
pub async fn show_status() -> Result<()> {
    let config = Config::load()?;
    let database = open_database(&config).await?;
    let store = open_fragment_store(&config).await?;

    let document_count = database.count_documents().await?;
    let fragment_count = store.count_fragments().await?;

    println!("{}", style("study-rag status").bold().cyan());
    println!();
    println!("  Documents: {}", document_count);
    println!("  Fragments: {}", fragment_count);
    println!();

    let client = OllamaClient::new(&config.ollama)?;
    match client.health_check() {
        Ok(()) => {
            println!("  Ollama: {}", style("reachable, models available").green());
        }
        Err(e) => {
            println!("  Ollama: {}", style(format!("unavailable ({})", e)).red());
        }
    }

    Ok(())
}
