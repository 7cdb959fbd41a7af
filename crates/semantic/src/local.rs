use async_trait::async_trait;
use std::sync::mpsc;
use tokio::sync::{oneshot, OnceCell};

use crate::assets::{resolve_model_assets, ModelAssets};
use crate::onnx::LoadedModel;
use crate::{embedding_dimension, Embedding, EmbeddingProvider, SemanticConfig, SemanticError};

type EmbedReply = oneshot::Sender<Result<Vec<Vec<f32>>, SemanticError>>;

struct Job {
    texts: Vec<String>,
    reply: EmbedReply,
}

/// Handle to the thread that owns the ONNX session. The session is not shared across threads,
/// so inference requests are queued to it.
struct LocalWorker {
    jobs: mpsc::Sender<Job>,
}

// One resident model per process. A failed load leaves the cell empty so the next call retries.
static LOCAL_WORKER: OnceCell<LocalWorker> = OnceCell::const_new();

impl LocalWorker {
    async fn spawn(assets: ModelAssets, max_sequence_length: usize) -> Result<Self, SemanticError> {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = oneshot::channel::<Result<(), SemanticError>>();

        std::thread::Builder::new()
            .name("local-embedder".into())
            .spawn(move || {
                let mut model = match LoadedModel::load(&assets) {
                    Ok(model) => {
                        let _ = ready_tx.send(Ok(()));
                        model
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err));
                        return;
                    }
                };
                tracing::info!(model = %assets.model_path.display(), "local embedding model loaded");

                while let Ok(job) = job_rx.recv() {
                    let _ = job.reply.send(model.embed(&job.texts, max_sequence_length));
                }
            })?;

        ready_rx.await.map_err(|_| {
            SemanticError::Inference("local embedding worker exited during load".into())
        })??;

        Ok(Self { jobs: job_tx })
    }

    async fn embed(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>, SemanticError> {
        let (reply, rx) = oneshot::channel();
        self.jobs
            .send(Job { texts, reply })
            .map_err(|_| SemanticError::Inference("local embedding worker stopped".into()))?;
        rx.await
            .map_err(|_| SemanticError::Inference("local embedding worker dropped a job".into()))?
    }
}

/// Sentence-embedding model run in-process (all-MiniLM-L6-v2 by default).
#[derive(Debug, Clone)]
pub struct LocalProvider {
    cfg: SemanticConfig,
    dimension: usize,
}

impl LocalProvider {
    pub fn new(cfg: SemanticConfig) -> Self {
        Self {
            dimension: embedding_dimension(&cfg.local_model_name),
            cfg,
        }
    }

    /// Whether the model has already been loaded in this process.
    pub fn is_loaded() -> bool {
        LOCAL_WORKER.initialized()
    }

    async fn worker(&self) -> Result<&'static LocalWorker, SemanticError> {
        LOCAL_WORKER
            .get_or_try_init(|| async {
                let assets = resolve_model_assets(&self.cfg).await?;
                LocalWorker::spawn(assets, self.cfg.max_sequence_length).await
            })
            .await
    }
}

#[async_trait]
impl EmbeddingProvider for LocalProvider {
    fn name(&self) -> &str {
        "local"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, text: &str) -> Result<Embedding, SemanticError> {
        let worker = self.worker().await?;
        let vector = worker
            .embed(vec![text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| SemanticError::Inference("model returned no outputs".into()))?;

        Ok(Embedding {
            vector,
            model_name: self.cfg.local_model_name.clone(),
            provider: "local".into(),
        })
    }
}
