//! Near-duplicate image review: embed every image in a folder, index all
//! pairwise similarities, and walk the folder deleting redundant copies.

pub mod config;
pub mod core;
pub mod history;
pub mod store;

pub use crate::config::{Config, ConfigError, Overrides};
pub use crate::core::cache::{CacheError, EmbedSummary, EmbeddingCache};
pub use crate::core::embedder::{
    EmbedError, Embedder, EmbedderKind, Embedding, HashEmbedder, ThumbnailEmbedder,
};
pub use crate::core::image::ImageId;
pub use crate::core::index::{Score, SimilarityIndex};
pub use crate::core::query::{SimilarImage, top_similar};
pub use crate::core::session::{
    LoadOutcome, Session, SessionError, SessionSettings, SessionState, View,
};
pub use crate::history::{DeletionRecord, History, HistoryError};
pub use crate::store::{ImageStore, LocalImageStore};
