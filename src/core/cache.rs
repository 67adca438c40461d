use crate::core::embedder::{EmbedError, Embedder, Embedding};
use crate::core::image::ImageId;
use indicatif::ProgressBar;
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to build embedding worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Counts from one [`EmbeddingCache::embed_all`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbedSummary {
    pub embedded: usize,
    pub failed: usize,
    pub reused: usize,
}

/// Image id -> embedding, where `None` records an image the embedder could not
/// handle. Owns the worker pool used to fill it.
pub struct EmbeddingCache {
    entries: HashMap<ImageId, Option<Embedding>>,
    pool: ThreadPool,
    progress: ProgressBar,
}

impl EmbeddingCache {
    /// Build the cache and its worker pool. `workers == 0` sizes the pool to the
    /// available parallelism.
    pub fn new(workers: usize) -> Result<Self, CacheError> {
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("simcull-embed-{i}"))
            .build()?;

        Ok(Self {
            entries: HashMap::new(),
            pool,
            progress: ProgressBar::hidden(),
        })
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Embed every image in `images` that has no cache entry yet.
    ///
    /// Failures are recorded as absent entries and never abort the batch.
    /// Workers only produce `(id, result)` pairs; the cache map is updated here
    /// on the calling thread once the pool is done.
    pub fn embed_all(
        &mut self,
        folder: &Path,
        images: &[ImageId],
        embedder: &dyn Embedder,
    ) -> EmbedSummary {
        let mut queued: HashSet<&ImageId> = HashSet::new();
        let mut pending: Vec<&ImageId> = Vec::new();
        let mut reused = 0;
        for id in images {
            if self.entries.contains_key(id) || !queued.insert(id) {
                reused += 1;
            } else {
                pending.push(id);
            }
        }

        if pending.is_empty() {
            return EmbedSummary {
                reused,
                ..Default::default()
            };
        }

        log::info!(
            "Embedding {} image(s) with '{}' on {} worker(s)",
            pending.len(),
            embedder.name(),
            self.workers()
        );

        let progress = &self.progress;
        progress.reset();
        progress.set_length(pending.len() as u64);

        let results: Vec<(ImageId, Result<Embedding, EmbedError>)> = self.pool.install(|| {
            pending
                .par_iter()
                .map(|id| {
                    let result = embed_isolated(embedder, &id.path_in(folder));
                    progress.inc(1);
                    ((*id).clone(), result)
                })
                .collect()
        });
        progress.finish_and_clear();

        let mut summary = EmbedSummary {
            reused,
            ..Default::default()
        };
        for (id, result) in results {
            match result {
                Ok(embedding) => {
                    summary.embedded += 1;
                    self.entries.insert(id, Some(embedding));
                }
                Err(e) => {
                    log::warn!("Failed to embed {}: {}", id, e);
                    summary.failed += 1;
                    self.entries.insert(id, None);
                }
            }
        }

        summary
    }

    /// The embedding for `id`, if it was computed successfully.
    pub fn get(&self, id: &str) -> Option<&Embedding> {
        self.entries.get(id).and_then(Option::as_ref)
    }

    /// Whether `id` has an entry, successful or not.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> bool {
        self.entries.remove(id).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Run one embedder call, turning a panic into an error so a single bad image
/// cannot take the batch down.
fn embed_isolated(embedder: &dyn Embedder, path: &Path) -> Result<Embedding, EmbedError> {
    match panic::catch_unwind(AssertUnwindSafe(|| embedder.embed(path))) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(EmbedError::Panicked { message })
        }
    }
}
