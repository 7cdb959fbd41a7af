//! Fill the vector collections used by the remediation service.
//!
//! ```text
//! populate questions --template otr --slug nbcot-otr data/questions.json
//! populate sources --data-dir data/nbcot-sources --recreate
//! ```
//!
//! Embedding and backend settings come from the same configuration as the server.

use anyhow::Context;
use clap::{Parser, Subcommand};
use index::CollectionManager;
use semantic::{embedding_dimension, Embedder};
use server::populate::{chunk_files, index_questions, ingest_reference_chunks, read_question_export};
use server::ServerConfig;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "populate")]
#[command(about = "Index practice questions and reference chunks into the vector store")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Embed a question-bank export into `practice-test-<template>`
    Questions {
        /// JSON array of exported questions
        export: PathBuf,

        /// Template id used in the collection name
        #[arg(long)]
        template: String,

        /// Template slug stored on every point as `examTemplate`
        #[arg(long)]
        slug: Option<String>,
    },
    /// Ingest `*_chunks.json` files into the reference collection
    Sources {
        /// Directory containing *_chunks.json files
        #[arg(long, default_value = "data/nbcot-sources")]
        data_dir: PathBuf,

        /// Collection to populate; defaults to the configured reference collection
        #[arg(long)]
        collection: Option<String>,

        /// Number of points per upsert batch
        #[arg(long, default_value_t = 64)]
        batch_size: usize,

        /// Drop the collection before ingesting
        #[arg(long)]
        recreate: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = ServerConfig::load()?;
    server::init_tracing(&config.log_level);

    let embedder = Embedder::from_config(&config.semantic)?;

    match cli.command {
        Command::Questions {
            export,
            template,
            slug,
        } => {
            let questions = read_question_export(&export).await?;
            println!("Found {} questions in {}", questions.len(), export.display());

            let dimension = embedder
                .dimension()
                .unwrap_or_else(|| embedding_dimension(&config.semantic.model_name));
            let collections = CollectionManager::new(config.vector.backend().build()?, dimension);

            let written =
                index_questions(&embedder, &collections, &template, slug.as_deref(), &questions)
                    .await?;
            println!(
                "Indexed {written}/{} questions into {}",
                questions.len(),
                collections.collection_name(&template)
            );

            let analysis = collections.analyze(&template).await;
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        }
        Command::Sources {
            data_dir,
            collection,
            batch_size,
            recreate,
        } => {
            let files = chunk_files(&data_dir)?;
            anyhow::ensure!(
                !files.is_empty(),
                "No *_chunks.json files found in {}",
                data_dir.display()
            );

            let backend = config
                .reference_backend()
                .context("no vector backend configured; set QDRANT_URL or NBCOT_QDRANT_URL")?;
            let store = backend.build()?;
            let collection = collection.unwrap_or_else(|| config.pipeline.reference_collection.clone());

            // Text-only chunks must land at the same width as precomputed MiniLM vectors.
            let reference_embedder = Embedder::local_from_config(&config.semantic);
            let report = ingest_reference_chunks(
                &reference_embedder,
                store.as_ref(),
                &collection,
                &files,
                batch_size,
                recreate,
            )
            .await?;
            println!(
                "Ingested {} chunks from {} files into '{}' ({} skipped without text)",
                report.chunks, report.files, collection, report.skipped
            );
        }
    }

    Ok(())
}
