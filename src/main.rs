use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use study_rag::commands::{
    ask, delete_document, ingest, list_documents, quiz, search, show_status, summarize,
};
use study_rag::config::{run_interactive_config, show_config};
use study_rag::ErrorClass;

#[derive(Parser)]
#[command(name = "study-rag")]
#[command(about = "Retrieval-augmented question answering over your study material")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and retrieval settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Ask a question against the ingested study material
    Ask {
        /// The question to answer
        query: String,
    },
    /// Ingest a plain-text file into the knowledge base
    Ingest {
        /// Path to the file to ingest
        path: PathBuf,
        /// Optional display name for the document
        #[arg(long)]
        name: Option<String>,
    },
    /// Retrieve the closest fragments for a query without generating an answer
    Search {
        /// The query text
        query: String,
        /// Maximum number of fragments to return
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Summarize a text file
    Summarize {
        /// Path to the file to summarize
        path: PathBuf,
    },
    /// Generate quiz questions from a text file
    Quiz {
        /// Path to the file to generate questions from
        path: PathBuf,
    },
    /// List all ingested documents
    List,
    /// Delete a document and its stored fragments
    Delete {
        /// Document ID to delete
        document: String,
    },
    /// Show store counts and model endpoint health
    Status,
}

async fn run(cli: Cli) -> study_rag::Result<()> {
    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
            Ok(())
        }
        Commands::Ask { query } => ask(query).await,
        Commands::Ingest { path, name } => ingest(&path, name).await,
        Commands::Search { query, limit } => search(query, limit).await,
        Commands::Summarize { path } => summarize(&path).await,
        Commands::Quiz { path } => quiz(&path).await,
        Commands::List => list_documents().await,
        Commands::Delete { document } => delete_document(document).await,
        Commands::Status => show_status().await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            match e.class() {
                ErrorClass::Client => ExitCode::from(2),
                ErrorClass::Server => ExitCode::FAILURE,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;
    use study_rag::RagError;

    #[test]
    fn cli_parsing() {
        let cli = Cli::try_parse_from(["study-rag", "list"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::List));
        }

        let cli = Cli::try_parse_from(["study-rag", "ask", "What is photosynthesis?"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            match parsed.command {
                Commands::Ask { query } => assert_eq!(query, "What is photosynthesis?"),
                _ => panic!("Expected Ask command"),
            }
        }

        let cli = Cli::try_parse_from([
            "study-rag",
            "ingest",
            "notes.txt",
            "--name",
            "Biology Notes",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            match parsed.command {
                Commands::Ingest { path, name } => {
                    assert_eq!(path, PathBuf::from("notes.txt"));
                    assert_eq!(name, Some("Biology Notes".to_string()));
                }
                _ => panic!("Expected Ingest command"),
            }
        }

        let cli = Cli::try_parse_from(["study-rag", "search", "mitochondria", "--limit", "2"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            match parsed.command {
                Commands::Search { query, limit } => {
                    assert_eq!(query, "mitochondria");
                    assert_eq!(limit, 2);
                }
                _ => panic!("Expected Search command"),
            }
        }

        let cli = Cli::try_parse_from(["study-rag", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            match parsed.command {
                Commands::Config { show } => assert!(show),
                _ => panic!("Expected Config command"),
            }
        }
    }

    #[test]
    fn cli_rejects_missing_arguments() {
        let cli = Cli::try_parse_from(["study-rag", "ask"]);
        assert!(cli.is_err());
        if let Err(e) = cli {
            assert_eq!(e.kind(), ErrorKind::MissingRequiredArgument);
        }

        let cli = Cli::try_parse_from(["study-rag", "delete"]);
        assert!(cli.is_err());
    }

    #[test]
    fn error_classes_map_to_exit_codes() {
        assert_eq!(
            RagError::InvalidInput("empty".to_string()).class(),
            ErrorClass::Client
        );
        assert_eq!(
            RagError::ProviderUnavailable("down".to_string()).class(),
            ErrorClass::Server
        );
    }
}
