
use super::{IndexParams, InsertOutcome, RetrievedChunk};
use crate::chunking::{CourseChunk, CourseMetadata};
use crate::config::Config;
use crate::provider::Embedder;
use crate::{DandoriError, Result};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, RecordBatchIterator, StringArray, UInt32Array,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use futures::TryStreamExt;
use lancedb::{
    Connection, Table,
    index::{Index, vector::IvfHnswSqIndexBuilder},
    query::{ExecutableQuery, QueryBase},
};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Persistent course collection backed by an embedded LanceDB directory.
///
/// Vectors are produced by the injected [`Embedder`]; every call to it runs
/// on the blocking thread pool.
pub struct CourseIndex {
    connection: Connection,
    db_path: PathBuf,
    table_name: String,
    configured_dimension: usize,
    vector_dimension: usize,
    params: IndexParams,
    embedder: Arc<dyn Embedder>,
}

impl fmt::Debug for CourseIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CourseIndex")
            .field("db_path", &self.db_path)
            .field("table_name", &self.table_name)
            .field("vector_dimension", &self.vector_dimension)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

impl CourseIndex {
    /// Connect to the vector directory and open the configured collection,
    /// creating an empty one when it does not exist yet.
    #[inline]
    pub async fn open_or_create(config: &Config, embedder: Arc<dyn Embedder>) -> Result<Self> {
        let db_path = config.vector_database_path();
        debug!("Initializing LanceDB at path: {:?}", db_path);

        std::fs::create_dir_all(&db_path).map_err(|e| {
            DandoriError::Storage(format!("Failed to create vector database directory: {}", e))
        })?;

        let uri = format!("file://{}", db_path.display());
        let connection = lancedb::connect(&uri)
            .execute()
            .await
            .map_err(storage("Failed to connect to LanceDB"))?;

        let configured_dimension = config.index.embedding_dimension as usize;
        let mut index = Self {
            connection,
            db_path,
            table_name: config.index.collection.clone(),
            configured_dimension,
            vector_dimension: configured_dimension,
            params: IndexParams::default(),
            embedder,
        };

        index.initialize_table().await?;

        info!(
            "Course index '{}' ready with {} dimensions",
            index.table_name, index.vector_dimension
        );
        Ok(index)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.db_path
    }

    #[inline]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    #[inline]
    pub fn vector_dimension(&self) -> usize {
        self.vector_dimension
    }

    #[inline]
    pub fn params(&self) -> &IndexParams {
        &self.params
    }

    async fn initialize_table(&mut self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(storage("Failed to list tables"))?;

        if table_names.contains(&self.table_name) {
            self.vector_dimension = self.detect_existing_vector_dimension().await?;
            debug!(
                "Table '{}' already exists with {} dimensions",
                self.table_name, self.vector_dimension
            );
            return Ok(());
        }

        info!(
            "Creating table '{}' with {} dimensions",
            self.table_name, self.configured_dimension
        );
        self.create_empty_table(self.configured_dimension).await?;
        self.vector_dimension = self.configured_dimension;
        Ok(())
    }

    async fn detect_existing_vector_dimension(&self) -> Result<usize> {
        let table = self.open_table().await?;
        let schema = table
            .schema()
            .await
            .map_err(storage("Failed to get table schema"))?;

        schema
            .fields()
            .iter()
            .find(|field| field.name() == "vector")
            .and_then(|field| match field.data_type() {
                DataType::FixedSizeList(_, size) => usize::try_from(*size).ok(),
                _ => None,
            })
            .ok_or_else(|| {
                DandoriError::Storage(
                    "Could not find vector column or determine dimension".to_string(),
                )
            })
    }

    fn create_schema(vector_dim: usize) -> Result<Arc<Schema>> {
        let list_size = i32::try_from(vector_dim).map_err(|_| {
            DandoriError::Storage(format!("Vector dimension {} is too large", vector_dim))
        })?;

        Ok(Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    list_size,
                ),
                false,
            ),
            Field::new("sequence", DataType::UInt32, false),
            Field::new("text", DataType::Utf8, false),
            Field::new("course_name", DataType::Utf8, false),
            Field::new("instructor", DataType::Utf8, false),
            Field::new("course_type", DataType::Utf8, false),
            Field::new("location", DataType::Utf8, false),
            Field::new("cost", DataType::Utf8, false),
            Field::new("indexed_at", DataType::Utf8, false),
        ])))
    }

    async fn create_empty_table(&self, vector_dim: usize) -> Result<()> {
        let schema = Self::create_schema(vector_dim)?;
        self.connection
            .create_empty_table(&self.table_name, schema)
            .execute()
            .await
            .map_err(storage("Failed to create table"))?;
        Ok(())
    }

    async fn open_table(&self) -> Result<Table> {
        self.connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(storage("Failed to open table"))
    }

    async fn drop_table_if_exists(&self) -> Result<()> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(storage("Failed to list tables for drop"))?;

        if table_names.contains(&self.table_name) {
            info!("Dropping table '{}'", self.table_name);
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(storage("Failed to drop table"))?;
        }

        Ok(())
    }

    /// Current number of stored rows.
    #[inline]
    pub async fn count(&self) -> Result<usize> {
        let table = self.open_table().await?;
        table
            .count_rows(None)
            .await
            .map_err(storage("Failed to count rows"))
    }

    /// Embed and store `chunks`, but only when the collection is empty.
    ///
    /// Chunks are embedded one provider call at a time and written in a
    /// single batch. A populated collection is left untouched, so a write
    /// that failed halfway is not repaired here; [`CourseIndex::rebuild`]
    /// clears it.
    #[inline]
    pub async fn insert_if_empty(&mut self, chunks: &[CourseChunk]) -> Result<InsertOutcome> {
        let existing = self.count().await?;
        if existing > 0 {
            info!(
                "Table '{}' already holds {} rows, skipping ingestion",
                self.table_name, existing
            );
            return Ok(InsertOutcome::Skipped(existing));
        }

        if chunks.is_empty() {
            debug!("No chunks to store");
            return Ok(InsertOutcome::Inserted(0));
        }

        info!("Embedding {} course chunks", chunks.len());
        let mut vectors = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            debug!(
                "Embedding chunk {}/{}: {}",
                chunk.sequence,
                chunks.len(),
                chunk.id
            );
            vectors.push(self.embed(chunk.text.clone()).await?);
        }

        let vector_dim = vectors.first().map_or(0, Vec::len);
        if vector_dim == 0 {
            return Err(DandoriError::Storage(
                "Embedding provider returned an empty vector".to_string(),
            ));
        }
        if vectors.iter().any(|vector| vector.len() != vector_dim) {
            return Err(DandoriError::Storage(
                "Embedding provider returned vectors of differing dimensions".to_string(),
            ));
        }

        if vector_dim != self.vector_dimension {
            warn!(
                "Embedding dimension {} differs from table dimension {}, recreating empty table",
                vector_dim, self.vector_dimension
            );
            self.drop_table_if_exists().await?;
            self.create_empty_table(vector_dim).await?;
            self.vector_dimension = vector_dim;
        }

        let record_batch = self.create_record_batch(chunks, &vectors)?;
        let table = self.open_table().await?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(storage("Failed to insert course embeddings"))?;

        info!("Stored {} course embeddings", chunks.len());

        // Rows are already stored; an exhaustive scan still answers queries.
        if let Err(e) = self.ensure_vector_index(&table, chunks.len()).await {
            warn!("Continuing without a vector index: {}", e);
        }
        Ok(InsertOutcome::Inserted(chunks.len()))
    }

    /// Build the approximate index once the table is large enough to need one.
    async fn ensure_vector_index(&self, table: &Table, rows: usize) -> Result<()> {
        if rows < self.params.ann_min_rows {
            debug!(
                "{} rows is below {}, using exhaustive search",
                rows, self.params.ann_min_rows
            );
            return Ok(());
        }

        let builder = IvfHnswSqIndexBuilder::default()
            .distance_type(self.params.distance_type)
            .num_edges(self.params.num_edges)
            .ef_construction(self.params.ef_construction);

        table
            .create_index(&["vector"], Index::IvfHnswSq(builder))
            .execute()
            .await
            .map_err(storage("Failed to create vector index"))?;

        info!("Vector index created over {} rows", rows);
        Ok(())
    }

    fn create_record_batch(
        &self,
        chunks: &[CourseChunk],
        vectors: &[Vec<f32>],
    ) -> Result<RecordBatch> {
        let len = chunks.len();
        let vector_dim = self.vector_dimension;
        let indexed_at = chrono::Utc::now().to_rfc3339();

        let mut ids = Vec::with_capacity(len);
        let mut sequences = Vec::with_capacity(len);
        let mut texts = Vec::with_capacity(len);
        let mut course_names = Vec::with_capacity(len);
        let mut instructors = Vec::with_capacity(len);
        let mut course_types = Vec::with_capacity(len);
        let mut locations = Vec::with_capacity(len);
        let mut costs = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);

        for (chunk, vector) in chunks.iter().zip(vectors) {
            ids.push(chunk.id.as_str());
            sequences.push(u32::try_from(chunk.sequence).map_err(|_| {
                DandoriError::Storage(format!("Sequence {} out of range", chunk.sequence))
            })?);
            texts.push(chunk.text.as_str());
            course_names.push(chunk.metadata.course_name.as_str());
            instructors.push(chunk.metadata.instructor.as_str());
            course_types.push(chunk.metadata.course_type.as_str());
            locations.push(chunk.metadata.location.as_str());
            costs.push(chunk.metadata.cost.as_str());
            flat_values.extend_from_slice(vector);
        }

        let schema = Self::create_schema(vector_dim)?;
        let list_size = i32::try_from(vector_dim).map_err(|_| {
            DandoriError::Storage(format!("Vector dimension {} is too large", vector_dim))
        })?;

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            list_size,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(storage("Failed to create vector array"))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(UInt32Array::from(sequences)),
            Arc::new(StringArray::from(texts)),
            Arc::new(StringArray::from(course_names)),
            Arc::new(StringArray::from(instructors)),
            Arc::new(StringArray::from(course_types)),
            Arc::new(StringArray::from(locations)),
            Arc::new(StringArray::from(costs)),
            Arc::new(StringArray::from(vec![indexed_at.as_str(); len])),
        ];

        RecordBatch::try_new(schema, arrays).map_err(storage("Failed to create record batch"))
    }

    /// Embed `text` and return up to `k` nearest chunks, closest first.
    ///
    /// An empty collection answers with no hits without calling the embedder.
    #[inline]
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<RetrievedChunk>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        if self.count().await? == 0 {
            debug!("Table '{}' is empty, nothing to search", self.table_name);
            return Ok(Vec::new());
        }

        let query_vector = self.embed(text.to_string()).await?;
        debug!("Searching '{}' for {} nearest chunks", self.table_name, k);

        let table = self.open_table().await?;
        let results = table
            .vector_search(query_vector.as_slice())
            .map_err(storage("Failed to create vector search"))?
            .column("vector")
            .distance_type(self.params.distance_type)
            .ef(self.params.ef_search)
            .limit(k)
            .execute()
            .await
            .map_err(storage("Failed to execute search"))?;

        let mut retrieved = parse_search_results_stream(results).await?;
        retrieved.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        Ok(retrieved)
    }

    /// Drop every stored row and recreate the empty collection with the
    /// configured dimension.
    #[inline]
    pub async fn rebuild(&mut self) -> Result<()> {
        warn!("Rebuilding table '{}'", self.table_name);
        self.drop_table_if_exists().await?;
        self.create_empty_table(self.configured_dimension).await?;
        self.vector_dimension = self.configured_dimension;
        Ok(())
    }

    async fn embed(&self, text: String) -> Result<Vec<f32>> {
        let embedder = Arc::clone(&self.embedder);
        tokio::task::spawn_blocking(move || embedder.embed(&text)).await?
    }
}

async fn parse_search_results_stream(
    mut results: lancedb::arrow::SendableRecordBatchStream,
) -> Result<Vec<RetrievedChunk>> {
    let mut retrieved = Vec::new();

    while let Some(batch) = results
        .try_next()
        .await
        .map_err(storage("Failed to read result stream"))?
    {
        retrieved.extend(parse_search_batch(&batch)?);
    }

    debug!("Parsed {} search results from stream", retrieved.len());
    Ok(retrieved)
}

fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<RetrievedChunk>> {
    let ids = string_column(batch, "id")?;
    let sequences = batch
        .column_by_name("sequence")
        .ok_or_else(|| DandoriError::Storage("Missing sequence column".to_string()))?
        .as_any()
        .downcast_ref::<UInt32Array>()
        .ok_or_else(|| DandoriError::Storage("Invalid sequence column type".to_string()))?;
    let texts = string_column(batch, "text")?;
    let course_names = string_column(batch, "course_name")?;
    let instructors = string_column(batch, "instructor")?;
    let course_types = string_column(batch, "course_type")?;
    let locations = string_column(batch, "location")?;
    let costs = string_column(batch, "cost")?;

    let distances = batch
        .column_by_name("_distance")
        .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

    let results = (0..batch.num_rows())
        .map(|row| RetrievedChunk {
            id: ids.value(row).to_string(),
            sequence: sequences.value(row) as usize,
            text: texts.value(row).to_string(),
            metadata: CourseMetadata {
                course_name: course_names.value(row).to_string(),
                instructor: instructors.value(row).to_string(),
                course_type: course_types.value(row).to_string(),
                location: locations.value(row).to_string(),
                cost: costs.value(row).to_string(),
            },
            distance: distances.map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) }),
        })
        .collect();

    Ok(results)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .ok_or_else(|| DandoriError::Storage(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<StringArray>()
        .ok_or_else(|| DandoriError::Storage(format!("Invalid {} column type", name)))
}

fn storage<E: fmt::Display>(context: &'static str) -> impl FnOnce(E) -> DandoriError {
    move |e| DandoriError::Storage(format!("{}: {}", context, e))
}
