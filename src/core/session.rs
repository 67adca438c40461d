use crate::core::cache::{CacheError, EmbeddingCache};
use crate::core::embedder::Embedder;
use crate::core::image::ImageId;
use crate::core::index::SimilarityIndex;
use crate::core::query::{SimilarImage, top_similar};
use crate::history::{DeletionRecord, History, file_digest};
use crate::store::ImageStore;
use indicatif::ProgressBar;
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Failed to list images in {}: {source}", .folder.display())]
    Listing {
        folder: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to delete {image}: {source}")]
    Delete {
        image: ImageId,
        #[source]
        source: io::Error,
    },

    #[error("{image} is not part of the loaded folder")]
    UnknownImage { image: String },

    #[error("Threshold must be a number between 0 and 1, got {value}")]
    InvalidThreshold { value: f32 },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Empty,
    Loading,
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded {
        images: usize,
        embedded: usize,
        failed: usize,
    },
    /// The folder has no files with a recognised image extension.
    NoImages,
}

/// What the front end should show for the current cursor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum View {
    Empty,
    Image {
        image: ImageId,
        path: PathBuf,
        position: usize,
        total: usize,
        similar: Vec<SimilarImage>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionSettings {
    pub threshold: f32,
    pub top_n: usize,
    /// Embedding worker threads, 0 for one per available core
    pub workers: usize,
    /// Record deletions in the folder's history journal
    pub history: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            top_n: 3,
            workers: 0,
            history: true,
        }
    }
}

/// One review session over a folder: the working set, the cursor into it, the
/// threshold, and the embedding cache and similarity index derived from them.
/// All mutation goes through `&mut self`, so the index never lags behind the
/// working set.
pub struct Session {
    embedder: Arc<dyn Embedder>,
    store: Box<dyn ImageStore>,
    cache: EmbeddingCache,
    index: SimilarityIndex,
    history: Option<History>,
    folder: Option<PathBuf>,
    working_set: Vec<ImageId>,
    cursor: usize,
    threshold: f32,
    top_n: usize,
    record_history: bool,
    state: SessionState,
}

impl Session {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Box<dyn ImageStore>,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        validate_threshold(settings.threshold)?;
        Ok(Self {
            embedder,
            store,
            cache: EmbeddingCache::new(settings.workers)?,
            index: SimilarityIndex::default(),
            history: None,
            folder: None,
            working_set: Vec::new(),
            cursor: 0,
            threshold: settings.threshold,
            top_n: settings.top_n,
            record_history: settings.history,
            state: SessionState::Empty,
        })
    }

    /// Report embedding progress on `progress` during loads.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.cache = self.cache.with_progress(progress);
        self
    }

    /// Replace the session with the images in `folder`, embed them and build
    /// the similarity index. Blocks until everything is done.
    ///
    /// If the folder cannot be listed the current session is left as it was.
    pub fn load(&mut self, folder: &Path) -> Result<LoadOutcome, SessionError> {
        let images = self
            .store
            .list_images(folder)
            .map_err(|source| SessionError::Listing {
                folder: folder.to_path_buf(),
                source,
            })?;

        self.state = SessionState::Loading;
        self.folder = Some(folder.to_path_buf());
        self.history = self.record_history.then(|| History::in_folder(folder));
        self.working_set = images;
        self.cursor = 0;
        self.cache.clear();
        self.index = SimilarityIndex::default();

        if self.working_set.is_empty() {
            log::info!("No images found in {}", folder.display());
            self.state = SessionState::Empty;
            return Ok(LoadOutcome::NoImages);
        }

        let summary = self
            .cache
            .embed_all(folder, &self.working_set, self.embedder.as_ref());
        self.index = SimilarityIndex::build(&self.cache, &self.working_set);
        self.state = SessionState::Ready;

        log::info!(
            "Loaded {} image(s) from {} ({} embedded, {} failed)",
            self.working_set.len(),
            folder.display(),
            summary.embedded,
            summary.failed
        );

        Ok(LoadOutcome::Loaded {
            images: self.working_set.len(),
            embedded: summary.embedded,
            failed: summary.failed,
        })
    }

    /// Move to the next image, wrapping around at the end.
    pub fn next(&mut self) -> View {
        if !self.working_set.is_empty() {
            self.cursor = (self.cursor + 1) % self.working_set.len();
        }
        self.current_view()
    }

    /// Move to the previous image, wrapping around at the start.
    pub fn previous(&mut self) -> View {
        let len = self.working_set.len();
        if len > 0 {
            self.cursor = (self.cursor + len - 1) % len;
        }
        self.current_view()
    }

    pub fn set_threshold(&mut self, value: f32) -> Result<View, SessionError> {
        validate_threshold(value)?;
        self.threshold = value;
        Ok(self.current_view())
    }

    pub fn set_top_n(&mut self, top_n: usize) -> View {
        self.top_n = top_n;
        self.current_view()
    }

    /// Delete `image` from disk and from the session.
    ///
    /// The file is removed first; if that fails nothing in the session
    /// changes. The cursor stays on the same image when an earlier one is
    /// removed and is clamped to the end otherwise.
    pub fn delete(&mut self, image: &str) -> Result<View, SessionError> {
        let (Some(folder), Some(pos)) = (
            self.folder.clone(),
            self.working_set.iter().position(|id| id.as_str() == image),
        ) else {
            return Err(SessionError::UnknownImage {
                image: image.to_string(),
            });
        };
        let id = self.working_set[pos].clone();

        let record = self.history.as_ref().map(|_| {
            let digest = file_digest(&id.path_in(&folder))
                .map_err(|e| log::warn!("Could not digest {} before deletion: {}", id, e))
                .ok();
            let kept = self
                .working_set
                .get(self.cursor)
                .filter(|current| **current != id)
                .map(|current| {
                    let score = self
                        .index
                        .score(current.as_str(), id.as_str())
                        .map(|s| s.value())
                        .unwrap_or(0.0);
                    (current.as_str(), score)
                });
            DeletionRecord::new(id.as_str(), digest, kept)
        });

        self.store
            .remove(&folder, &id)
            .map_err(|source| SessionError::Delete {
                image: id.clone(),
                source,
            })?;

        self.working_set.remove(pos);
        self.cache.remove(id.as_str());
        self.index.remove(id.as_str());

        if pos < self.cursor {
            self.cursor -= 1;
        }
        if self.working_set.is_empty() {
            self.cursor = 0;
            self.state = SessionState::Empty;
        } else {
            self.cursor = self.cursor.min(self.working_set.len() - 1);
        }

        if let (Some(history), Some(record)) = (&self.history, record) {
            if let Err(e) = history.append(&record) {
                log::warn!("Failed to record deletion of {}: {}", id, e);
            }
        }

        log::info!("Deleted {} ({} image(s) left)", id, self.working_set.len());
        Ok(self.current_view())
    }

    pub fn current_view(&self) -> View {
        let (Some(folder), Some(image)) =
            (self.folder.as_deref(), self.working_set.get(self.cursor))
        else {
            return View::Empty;
        };

        View::Image {
            image: image.clone(),
            path: image.path_in(folder),
            position: self.cursor,
            total: self.working_set.len(),
            similar: top_similar(&self.index, image.as_str(), self.threshold, self.top_n),
        }
    }

    /// Ranked similar images for any image in the working set.
    pub fn similar_to(&self, image: &str) -> Vec<SimilarImage> {
        top_similar(&self.index, image, self.threshold, self.top_n)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn top_n(&self) -> usize {
        self.top_n
    }

    pub fn folder(&self) -> Option<&Path> {
        self.folder.as_deref()
    }

    pub fn working_set(&self) -> &[ImageId] {
        &self.working_set
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    pub fn history(&self) -> Option<&History> {
        self.history.as_ref()
    }
}

fn validate_threshold(value: f32) -> Result<(), SessionError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(SessionError::InvalidThreshold { value })
    }
}
