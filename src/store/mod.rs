// Storage module
// LanceDB holds text fragments with their embedding vectors; SQLite holds
// the registry of owning documents

pub mod documents;
pub mod fragments;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

pub use documents::{Database, Document, DocumentStatus, NewDocument};
pub use fragments::FragmentStore;

/// A stored unit of text with a precomputed embedding. Immutable after
/// creation except for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fragment {
    /// Unique identifier for this fragment
    pub id: String,
    /// Owning document, if the fragment came from an ingested file
    pub document_id: Option<String>,
    /// The raw text this fragment's embedding represents
    pub text: String,
    /// RFC 3339 timestamp of when the fragment was created
    pub created_at: String,
}

/// A fragment waiting to be inserted, carrying its embedding vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewFragment {
    pub document_id: Option<String>,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A fragment returned from similarity search together with its cosine
/// distance to the query vector. Lower distance means more similar.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFragment {
    pub fragment: Fragment,
    pub distance: f32,
}

/// Read seam over the fragment store, injected into the query pipeline so
/// tests can substitute an in-memory stub.
#[async_trait]
pub trait FragmentSearch: Send + Sync {
    /// Rank stored fragments by cosine distance to `query_vector`,
    /// ascending. Fragments at or beyond `max_distance` are excluded, even
    /// if that leaves fewer than `limit` results; an empty result is valid.
    async fn search(
        &self,
        query_vector: &[f32],
        max_distance: f32,
        limit: usize,
    ) -> Result<Vec<ScoredFragment>>;
}
