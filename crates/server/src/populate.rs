//! Offline indexing used by the `populate` binary.
//!
//! Two inputs are supported:
//!
//! - a question-bank export (JSON array of questions), embedded with
//!   [`question_embedding_text`] and upserted into `practice-test-<template>`;
//! - a directory of `*_chunks.json` reference files, upserted into the reference collection
//!   with flattened `meta_*` / `chunk_meta_*` payload keys.

use anyhow::Context;
use index::{
    CollectionManager, CollectionSpec, IndexError, Payload, PointRecord, QuestionMetadata,
    QuestionVector, VectorStore,
};
use semantic::{question_embedding_text, Embedder};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

/// Top-level metadata keys that describe the file rather than its content.
const SKIPPED_META_KEYS: &[&str] = &["chunk_count", "total_text_length"];

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Variant {
    Text(String),
    Option { content: String },
}

impl AsRef<str> for Variant {
    fn as_ref(&self) -> &str {
        match self {
            Variant::Text(text) => text,
            Variant::Option { content } => content,
        }
    }
}

/// One question as exported from the question bank.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionExport {
    pub id: String,
    pub stem: String,
    pub domain: String,
    #[serde(default)]
    pub difficulty: Option<i64>,
    #[serde(rename = "type", default = "default_question_type")]
    pub question_type: String,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub rationale: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_question_type() -> String {
    "SINGLE_BEST".to_string()
}

impl QuestionExport {
    pub fn embedding_text(&self) -> String {
        question_embedding_text(
            &self.stem,
            self.variants.as_slice(),
            self.rationale.as_deref(),
            &self.domain,
        )
    }

    /// Payload for the vector point. Missing difficulty counts as level 1.
    pub fn metadata(&self, template_slug: Option<&str>) -> QuestionMetadata {
        QuestionMetadata {
            question_id: self.id.clone(),
            source_id: self.source_id.clone(),
            question_type: self.question_type.clone(),
            domain: self.domain.clone(),
            difficulty: self.difficulty.unwrap_or(1),
            stem: self.stem.clone(),
            rationale: self.rationale.clone(),
            tags: self.tags.clone(),
            exam_template: template_slug.map(str::to_string),
            created_at: self
                .created_at
                .clone()
                .unwrap_or_else(|| chrono::Utc::now().to_rfc3339()),
        }
    }
}

pub async fn read_question_export(path: &Path) -> anyhow::Result<Vec<QuestionExport>> {
    let json = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))
}

/// Embed and upsert questions into a template collection. Returns the number written.
pub async fn index_questions(
    embedder: &Embedder,
    collections: &CollectionManager,
    template_id: &str,
    template_slug: Option<&str>,
    questions: &[QuestionExport],
) -> anyhow::Result<usize> {
    if questions.is_empty() {
        return Ok(0);
    }
    let texts: Vec<String> = questions.iter().map(QuestionExport::embedding_text).collect();
    let embeddings = embedder.embed_all(&texts).await?;

    let records = questions
        .iter()
        .zip(embeddings)
        .map(|(question, embedding)| QuestionVector {
            id: question.id.clone(),
            vector: embedding.into_vector(),
            metadata: question.metadata(template_slug),
        })
        .collect();

    Ok(collections.upsert(template_id, records).await)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkFile {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub chunks: Vec<Chunk>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Chunk {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub chunk_index: Option<u64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    /// Precomputed vector; re-embedded from `text` when absent.
    #[serde(default)]
    pub embedding: Option<Vec<f32>>,
}

/// `*_chunks.json` files in `dir`, sorted by name.
pub fn chunk_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("reading {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.ends_with("_chunks.json"))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Flattened payload for one chunk: text and provenance, file metadata as `meta_*`, chunk
/// metadata as `chunk_meta_*`.
pub fn chunk_payload(file_meta: &Map<String, Value>, chunk: &Chunk, source: &Path) -> Payload {
    let mut payload = Payload::new();
    payload.insert("text".into(), Value::from(chunk.text.clone().unwrap_or_default()));
    payload.insert("chunk_index".into(), chunk.chunk_index.map(Value::from).unwrap_or(Value::Null));
    payload.insert("chunk_id".into(), chunk.id.clone().map(Value::from).unwrap_or(Value::Null));
    let file_name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    payload.insert("source_file".into(), Value::from(file_name));
    payload.insert("source_path".into(), Value::from(source.display().to_string()));

    for (key, value) in file_meta {
        if !SKIPPED_META_KEYS.contains(&key.as_str()) {
            payload.insert(format!("meta_{key}"), value.clone());
        }
    }
    for (key, value) in &chunk.metadata {
        payload.insert(format!("chunk_meta_{key}"), value.clone());
    }
    payload
}

/// Point id for a chunk: its own id, else `<file>:<index>`. The backend maps non-UUID ids to
/// stable UUIDs.
pub fn chunk_point_id(chunk: &Chunk, source: &Path, position: usize) -> String {
    match chunk.id.as_deref().filter(|id| !id.trim().is_empty()) {
        Some(id) => id.to_string(),
        None => {
            let file_name = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{file_name}:{}", chunk.chunk_index.unwrap_or(position as u64))
        }
    }
}

/// Summary of a reference ingestion run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub files: usize,
    pub chunks: usize,
    pub skipped: usize,
}

/// Upserts reference chunks into `collection`, creating it on first use.
///
/// Chunks without text are skipped. With `recreate` the collection is dropped first. The
/// collection takes the width of the first vector; a later vector of another width (a
/// precomputed embedding from a different model, say) stops the run with
/// [`IndexError::DimensionMismatch`] before it is queued.
pub async fn ingest_reference_chunks(
    embedder: &Embedder,
    store: &dyn VectorStore,
    collection: &str,
    files: &[PathBuf],
    batch_size: usize,
    recreate: bool,
) -> anyhow::Result<IngestReport> {
    let mut report = IngestReport::default();
    let mut batch: Vec<PointRecord> = Vec::new();
    let mut dimension: Option<usize> = None;

    if recreate {
        match store.delete_collection(collection).await {
            Ok(()) | Err(IndexError::CollectionNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }
        tracing::info!(collection, "dropped reference collection");
    }

    for path in files {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let file: ChunkFile =
            serde_json::from_str(&json).with_context(|| format!("parsing {}", path.display()))?;
        report.files += 1;

        for (position, chunk) in file.chunks.iter().enumerate() {
            let Some(text) = chunk.text.as_deref().filter(|t| !t.trim().is_empty()) else {
                report.skipped += 1;
                continue;
            };
            let vector = match &chunk.embedding {
                Some(vector) if !vector.is_empty() => vector.clone(),
                _ => embedder.embed(text).await?.into_vector(),
            };
            match dimension {
                None => {
                    ensure_reference_collection(store, collection, vector.len()).await?;
                    dimension = Some(vector.len());
                }
                Some(expected) if vector.len() != expected => {
                    let err = IndexError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    };
                    return Err(anyhow::Error::new(err)
                        .context(format!("chunk {position} of {}", path.display())));
                }
                Some(_) => {}
            }
            batch.push(PointRecord {
                id: chunk_point_id(chunk, path, position),
                vector,
                payload: chunk_payload(&file.metadata, chunk, path),
            });
            report.chunks += 1;

            if batch.len() >= batch_size.max(1) {
                store.upsert(collection, std::mem::take(&mut batch), true).await?;
            }
        }
    }

    if !batch.is_empty() {
        store.upsert(collection, batch, true).await?;
    }
    Ok(report)
}

async fn ensure_reference_collection(
    store: &dyn VectorStore,
    collection: &str,
    dimension: usize,
) -> Result<(), IndexError> {
    let existing = store.list_collections().await?;
    if existing.iter().any(|name| name == collection) {
        return Ok(());
    }
    match store
        .create_collection(collection, &CollectionSpec::cosine(dimension))
        .await
    {
        Ok(()) => {
            tracing::info!(collection, dimension, "created reference collection");
            Ok(())
        }
        Err(IndexError::AlreadyExists(_)) => Ok(()),
        Err(err) => Err(err),
    }
}
