
use std::sync::Arc;

use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{Connection, DistanceType, Table};
use tracing::{debug, info};

use crate::chunking::DocumentChunk;
use crate::config::StorageUrl;
use crate::{RagError, Result};

/// A retrieved chunk with its cosine distance to the query (lower is closer)
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: DocumentChunk,
    pub distance: f32,
}

impl ScoredChunk {
    /// Cosine similarity, higher is better
    #[inline]
    pub fn similarity(&self) -> f32 {
        1.0 - self.distance
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionStats {
    pub collection: String,
    pub exists: bool,
    pub total_chunks: usize,
}

/// One LanceDB table per collection, created on first insert
pub struct VectorStore {
    connection: Connection,
    storage: StorageUrl,
    collection: String,
}

impl VectorStore {
    #[inline]
    pub async fn connect(storage: &StorageUrl, collection: &str) -> Result<Self> {
        if let Some(path) = storage.local_path() {
            std::fs::create_dir_all(&path).map_err(|e| {
                RagError::Database(format!(
                    "Failed to create vector database directory {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }

        let uri = storage.connection_uri();
        debug!("Connecting to LanceDB at {}", uri);
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to connect to {}: {}", storage, e)))?;

        Ok(Self {
            connection,
            storage: storage.clone(),
            collection: collection.to_string(),
        })
    }

    #[inline]
    pub fn collection(&self) -> &str {
        &self.collection
    }

    #[inline]
    pub fn storage(&self) -> &StorageUrl {
        &self.storage
    }

    #[inline]
    pub async fn collection_exists(&self) -> Result<bool> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to list tables: {}", e)))?;
        Ok(table_names.contains(&self.collection))
    }

    /// Verify the storage answers; returns the number of collections it holds
    #[inline]
    pub async fn health_check(&self) -> Result<usize> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| {
                RagError::Database(format!("Storage at {} is unreachable: {}", self.storage, e))
            })?;
        debug!("Storage at {} holds {} collection(s)", self.storage, table_names.len());
        Ok(table_names.len())
    }

    /// Append chunks with their embeddings; returns the number of rows written
    #[inline]
    pub async fn insert(&self, chunks: &[DocumentChunk], vectors: &[Vec<f32>]) -> Result<usize> {
        if chunks.len() != vectors.len() {
            return Err(RagError::Database(format!(
                "Got {} chunks but {} embeddings",
                chunks.len(),
                vectors.len()
            )));
        }
        let Some(first) = vectors.first() else {
            debug!("No chunks to store");
            return Ok(0);
        };

        let dimension = first.len();
        if dimension == 0 || vectors.iter().any(|v| v.len() != dimension) {
            return Err(RagError::Database(
                "Embeddings must share one non-zero dimension".to_string(),
            ));
        }

        let table = self.table_for_insert(dimension).await?;
        let batch = record_batch(chunks, vectors, dimension)?;
        let schema = batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to insert chunks: {}", e)))?;

        info!("Stored {} chunk(s) in collection {}", chunks.len(), self.collection);
        Ok(chunks.len())
    }

    /// Open the collection, creating it for `dimension`-sized vectors when missing
    async fn table_for_insert(&self, dimension: usize) -> Result<Table> {
        if !self.collection_exists().await? {
            info!(
                "Creating collection {} with {}-dimensional vectors",
                self.collection, dimension
            );
            return self
                .connection
                .create_empty_table(&self.collection, schema(dimension)?)
                .execute()
                .await
                .map_err(|e| RagError::Database(format!("Failed to create collection: {}", e)));
        }

        let table = self.open_table().await?;
        let existing = table
            .schema()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read collection schema: {}", e)))?
            .field_with_name("vector")
            .ok()
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            });

        if existing != Some(dimension) {
            return Err(RagError::Database(format!(
                "Collection {} stores {}-dimensional vectors but the embeddings have {}; \
                 re-ingest with --clear",
                self.collection,
                existing.map_or_else(|| "unknown".to_string(), |d| d.to_string()),
                dimension
            )));
        }
        Ok(table)
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.collection)
            .execute()
            .await
            .map_err(|e| {
                RagError::Database(format!("Failed to open collection {}: {}", self.collection, e))
            })
    }

    /// The `k` chunks closest to `query` by cosine distance, closest first.
    /// A missing collection yields no results.
    #[inline]
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>> {
        if k == 0 || !self.collection_exists().await? {
            debug!("Collection {} is empty or missing", self.collection);
            return Ok(Vec::new());
        }

        let table = self.open_table().await?;
        let mut results = table
            .vector_search(query)
            .map_err(|e| RagError::Database(format!("Failed to create vector search: {}", e)))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(|e| RagError::Database(format!("Failed to execute search: {}", e)))?;

        let mut scored = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| RagError::Database(format!("Failed to read search results: {}", e)))?
        {
            scored.extend(parse_batch(&batch)?);
        }
        scored.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        debug!("Vector search returned {} chunk(s)", scored.len());
        Ok(scored)
    }

    /// Drop the collection and everything in it
    #[inline]
    pub async fn clear(&self) -> Result<()> {
        if self.collection_exists().await? {
            info!("Dropping collection {}", self.collection);
            self.connection
                .drop_table(&self.collection)
                .await
                .map_err(|e| RagError::Database(format!("Failed to drop collection: {}", e)))?;
        }
        Ok(())
    }

    #[inline]
    pub async fn count(&self) -> Result<usize> {
        if !self.collection_exists().await? {
            return Ok(0);
        }

        self.open_table()
            .await?
            .count_rows(None)
            .await
            .map_err(|e| RagError::Database(format!("Failed to count rows: {}", e)))
    }

    #[inline]
    pub async fn collection_stats(&self) -> Result<CollectionStats> {
        let exists = self.collection_exists().await?;
        let total_chunks = if exists { self.count().await? } else { 0 };

        Ok(CollectionStats {
            collection: self.collection.clone(),
            exists,
            total_chunks,
        })
    }
}

fn schema(dimension: usize) -> Result<Arc<Schema>> {
    let dimension = i32::try_from(dimension)
        .map_err(|_| RagError::Database(format!("Vector dimension {} is too large", dimension)))?;

    Ok(Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, false)),
                dimension,
            ),
            false,
        ),
        Field::new("content", DataType::Utf8, false),
        Field::new("source", DataType::Utf8, false),
        Field::new("page", DataType::UInt32, false),
        Field::new("chunk_index", DataType::UInt32, false),
        Field::new("start_index", DataType::UInt32, false),
        Field::new("created_at", DataType::Utf8, false),
    ])))
}

fn to_u32(value: usize, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        RagError::Database(format!("{} value {} does not fit the column", column, value))
    })
}

fn record_batch(
    chunks: &[DocumentChunk],
    vectors: &[Vec<f32>],
    dimension: usize,
) -> Result<RecordBatch> {
    let schema = schema(dimension)?;
    let created_at = chrono::Utc::now().to_rfc3339();

    let ids: Vec<String> = chunks
        .iter()
        .map(|_| uuid::Uuid::new_v4().to_string())
        .collect();
    let contents: Vec<&str> = chunks.iter().map(|c| c.content.as_str()).collect();
    let sources: Vec<&str> = chunks.iter().map(|c| c.source.as_str()).collect();
    let pages: Vec<u32> = chunks.iter().map(|c| c.page).collect();
    let chunk_indices = chunks
        .iter()
        .map(|c| to_u32(c.chunk_index, "chunk_index"))
        .collect::<Result<Vec<u32>>>()?;
    let start_indices = chunks
        .iter()
        .map(|c| to_u32(c.start_index, "start_index"))
        .collect::<Result<Vec<u32>>>()?;
    let created_ats = vec![created_at.as_str(); chunks.len()];

    let values = Float32Array::from(vectors.concat());
    let item = Arc::new(Field::new("item", DataType::Float32, false));
    let list_size = i32::try_from(dimension)
        .map_err(|_| RagError::Database(format!("Vector dimension {} is too large", dimension)))?;
    let vector_array = FixedSizeListArray::try_new(item, list_size, Arc::new(values), None)
        .map_err(|e| RagError::Database(format!("Failed to create vector array: {}", e)))?;

    let arrays: Vec<Arc<dyn Array>> = vec![
        Arc::new(StringArray::from(ids)),
        Arc::new(vector_array),
        Arc::new(StringArray::from(contents)),
        Arc::new(StringArray::from(sources)),
        Arc::new(UInt32Array::from(pages)),
        Arc::new(UInt32Array::from(chunk_indices)),
        Arc::new(UInt32Array::from(start_indices)),
        Arc::new(StringArray::from(created_ats)),
    ];

    RecordBatch::try_new(schema, arrays)
        .map_err(|e| RagError::Database(format!("Failed to create record batch: {}", e)))
}

fn column<'a, T: 'static>(batch: &'a RecordBatch, name: &str) -> Result<&'a T> {
    batch
        .column_by_name(name)
        .ok_or_else(|| RagError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| RagError::Database(format!("Invalid {} column type", name)))
}

fn parse_batch(batch: &RecordBatch) -> Result<Vec<ScoredChunk>> {
    let contents = column::<StringArray>(batch, "content")?;
    let sources = column::<StringArray>(batch, "source")?;
    let pages = column::<UInt32Array>(batch, "page")?;
    let chunk_indices = column::<UInt32Array>(batch, "chunk_index")?;
    let start_indices = column::<UInt32Array>(batch, "start_index")?;
    let distances = column::<Float32Array>(batch, "_distance")?;

    Ok((0..batch.num_rows())
        .map(|row| ScoredChunk {
            chunk: DocumentChunk {
                content: contents.value(row).to_string(),
                source: sources.value(row).to_string(),
                page: pages.value(row),
                chunk_index: chunk_indices.value(row) as usize,
                start_index: start_indices.value(row) as usize,
            },
            distance: distances.value(row),
        })
        .collect())
}
