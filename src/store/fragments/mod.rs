
use super::{Fragment, FragmentSearch, NewFragment, ScoredFragment};
use crate::config::Config;
use crate::{RagError, Result};
use arrow::array::{Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::sync::Arc;
use tracing::{debug, info};

const TABLE_NAME: &str = "fragments";

/// Vector store for text fragments, backed by LanceDB. The embedding
/// dimensionality is fixed at construction and every insert and search is
/// checked against it.
pub struct FragmentStore {
    connection: Connection,
    vector_dimension: usize,
}

impl FragmentStore {
    /// Open (or create) the fragment table under the configured data
    /// directory.
    #[inline]
    pub async fn new(config: &Config) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RagError::Store(format!("Failed to create vector database directory: {}", e))
            })?;
        }

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to connect to LanceDB: {}", e)))?;

        let store = Self {
            connection,
            vector_dimension: config.retrieval.embedding_dimension as usize,
        };

        store.initialize_table().await?;

        info!("Fragment store initialized successfully");
        Ok(store)
    }

    async fn initialize_table(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to list tables: {}", e)))?;

        if table_names.contains(&TABLE_NAME.to_string()) {
            debug!("Fragment table already exists");
            return Ok(());
        }

        info!(
            "Creating fragment table with {} dimensions",
            self.vector_dimension
        );

        let schema = self.schema();
        self.connection
            .create_empty_table(TABLE_NAME, schema)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to create table: {}", e)))?;

        Ok(())
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    self.vector_dimension as i32,
                ),
                false,
            ),
            Field::new("document_id", DataType::Utf8, true),
            Field::new("text", DataType::Utf8, false),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    async fn open_table(&self) -> Result<lancedb::Table> {
        self.connection
            .open_table(TABLE_NAME)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to open table: {}", e)))
    }

    /// Insert a batch of fragments, returning their generated ids
    #[inline]
    pub async fn insert_fragments(&self, fragments: Vec<NewFragment>) -> Result<Vec<String>> {
        if fragments.is_empty() {
            debug!("No fragments to insert");
            return Ok(Vec::new());
        }

        for fragment in &fragments {
            self.check_dimension(fragment.embedding.len())?;
        }

        debug!("Inserting batch of {} fragments", fragments.len());

        let ids: Vec<String> = fragments
            .iter()
            .map(|_| uuid::Uuid::new_v4().to_string())
            .collect();
        let created_at = chrono::Utc::now().to_rfc3339();

        let record_batch = self.create_record_batch(&fragments, &ids, &created_at)?;

        let table = self.open_table().await?;
        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to insert fragments: {}", e)))?;

        info!("Successfully stored {} fragments", ids.len());
        Ok(ids)
    }

    fn create_record_batch(
        &self,
        fragments: &[NewFragment],
        ids: &[String],
        created_at: &str,
    ) -> Result<RecordBatch> {
        let len = fragments.len();

        let mut flat_values = Vec::with_capacity(len * self.vector_dimension);
        let mut document_ids = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);

        for fragment in fragments {
            flat_values.extend_from_slice(&fragment.embedding);
            document_ids.push(fragment.document_id.as_deref());
            texts.push(fragment.text.as_str());
        }

        let values_array = Float32Array::from(flat_values);
        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            self.vector_dimension as i32,
            Arc::new(values_array),
            None,
        )
        .map_err(|e| RagError::Store(format!("Failed to create vector array: {}", e)))?;

        let arrays: Vec<Arc<dyn arrow::array::Array>> = vec![
            Arc::new(StringArray::from(
                ids.iter().map(String::as_str).collect::<Vec<_>>(),
            )),
            Arc::new(vector_array),
            Arc::new(StringArray::from(document_ids)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(vec![created_at; len])),
        ];

        RecordBatch::try_new(self.schema(), arrays)
            .map_err(|e| RagError::Store(format!("Failed to create record batch: {}", e)))
    }

    /// Delete every fragment owned by `document_id`. Called when the owning
    /// document is removed from the registry.
    #[inline]
    pub async fn delete_document_fragments(&self, document_id: &str) -> Result<()> {
        debug!("Deleting fragments for document: {}", document_id);

        let table = self.open_table().await?;
        let predicate = format!("document_id = '{}'", document_id.replace('\'', "''"));
        table
            .delete(&predicate)
            .await
            .map_err(|e| RagError::Store(format!("Failed to delete document fragments: {}", e)))?;

        info!("Deleted fragments for document: {}", document_id);
        Ok(())
    }

    /// Get the total number of fragments stored
    #[inline]
    pub async fn count_fragments(&self) -> Result<u64> {
        let table = self.open_table().await?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| RagError::Store(format!("Failed to count rows: {}", e)))?;

        Ok(count as u64)
    }

    fn check_dimension(&self, len: usize) -> Result<()> {
        if len == self.vector_dimension {
            Ok(())
        } else {
            Err(RagError::InvalidInput(format!(
                "Embedding has {} dimensions, store expects {}",
                len, self.vector_dimension
            )))
        }
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<ScoredFragment>> {
        let ids = string_column(batch, "id")?;
        let document_ids = string_column(batch, "document_id")?;
        let texts = string_column(batch, "text")?;
        let created_ats = string_column(batch, "created_at")?;

        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        let mut results = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let distance = distances.map_or(0.0, |d| {
                if d.is_null(row) { 0.0 } else { d.value(row) }
            });

            results.push(ScoredFragment {
                fragment: Fragment {
                    id: ids.value(row).to_string(),
                    document_id: if document_ids.is_null(row) {
                        None
                    } else {
                        Some(document_ids.value(row).to_string())
                    },
                    text: texts.value(row).to_string(),
                    created_at: created_ats.value(row).to_string(),
                },
                distance,
            });
        }

        Ok(results)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Store(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| RagError::Store(format!("Invalid {} column type", name)))
}

#[async_trait]
impl FragmentSearch for FragmentStore {
    #[inline]
    async fn search(
        &self,
        query_vector: &[f32],
        max_distance: f32,
        limit: usize,
    ) -> Result<Vec<ScoredFragment>> {
        self.check_dimension(query_vector.len())?;

        debug!(
            "Searching fragments (limit: {}, max_distance: {})",
            limit, max_distance
        );

        let table = self.open_table().await?;

        let query = table
            .vector_search(query_vector)
            .map_err(|e| RagError::Store(format!("Failed to create vector search: {}", e)))?
            .distance_type(DistanceType::Cosine)
            .column("vector")
            .limit(limit);

        let mut stream = query
            .execute()
            .await
            .map_err(|e| RagError::Store(format!("Failed to execute search: {}", e)))?;

        let mut results = Vec::new();
        while let Some(batch) = stream
            .try_next()
            .await
            .map_err(|e| RagError::Store(format!("Failed to read result stream: {}", e)))?
        {
            results.extend(Self::parse_search_batch(&batch)?);
        }

        // ANN results come back nearest-first; everything at or beyond the
        // cutoff is dropped even when that leaves fewer than `limit` hits.
        results.retain(|r| r.distance < max_distance);

        debug!("Search returned {} fragments within cutoff", results.len());
        Ok(results)
    }
}
