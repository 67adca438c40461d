use clap::ValueEnum;
use image::ImageReader;
use image::imageops::FilterType;
use image_hasher::{HashAlg, Hasher, HasherConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbedError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image decode error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Degenerate embedding: {reason}")]
    Degenerate { reason: String },

    #[error("Embedder panicked: {message}")]
    Panicked { message: String },
}

/// A unit-length feature vector. The only way to build one is
/// [`Embedding::from_raw`], so cosine similarity is always a plain dot product.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Vec<f32>);

impl Embedding {
    /// L2-normalise `values`, rejecting empty, zero-length or non-finite input.
    pub fn from_raw(mut values: Vec<f32>) -> Result<Self, EmbedError> {
        if values.is_empty() {
            return Err(EmbedError::Degenerate {
                reason: "vector has no components".to_string(),
            });
        }

        let sum: f32 = values.iter().map(|v| v * v).sum();
        if !sum.is_finite() || sum <= f32::EPSILON {
            return Err(EmbedError::Degenerate {
                reason: format!("vector norm is not usable (squared norm {sum})"),
            });
        }

        let norm = sum.sqrt();
        for value in values.iter_mut() {
            *value /= norm;
        }
        Ok(Self(values))
    }

    pub fn dim(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Cosine similarity with `other`, or `None` when the dimensions disagree.
    pub fn dot(&self, other: &Embedding) -> Option<f32> {
        if self.dim() != other.dim() {
            return None;
        }
        Some(self.0.iter().zip(other.0.iter()).map(|(a, b)| a * b).sum())
    }
}

/// Maps one image file to an [`Embedding`]. Implementations are shared across
/// the embedding worker pool.
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    fn embed(&self, path: &Path) -> Result<Embedding, EmbedError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderKind {
    /// Mean-centred grayscale thumbnail
    Thumbnail,
    /// Perceptual gradient hash, one ±1 component per bit
    Hash,
}

impl EmbedderKind {
    pub fn build(self) -> Arc<dyn Embedder> {
        match self {
            EmbedderKind::Thumbnail => Arc::new(ThumbnailEmbedder::new()),
            EmbedderKind::Hash => Arc::new(HashEmbedder::new()),
        }
    }
}

fn decode(path: &Path) -> Result<image::DynamicImage, EmbedError> {
    let img = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(img)
}

/// Embeds an image as its downsampled grayscale pixels with the mean removed.
/// Flat images have no direction and are reported as degenerate.
pub struct ThumbnailEmbedder {
    side: u32,
}

impl ThumbnailEmbedder {
    pub const DEFAULT_SIDE: u32 = 16;

    pub fn new() -> Self {
        Self::with_side(Self::DEFAULT_SIDE)
    }

    pub fn with_side(side: u32) -> Self {
        Self { side: side.max(2) }
    }
}

impl Default for ThumbnailEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for ThumbnailEmbedder {
    fn name(&self) -> &str {
        "thumbnail"
    }

    fn embed(&self, path: &Path) -> Result<Embedding, EmbedError> {
        let thumb = decode(path)?
            .resize_exact(self.side, self.side, FilterType::Triangle)
            .to_luma8();

        let pixels: Vec<f32> = thumb.pixels().map(|p| p.0[0] as f32).collect();
        let mean = pixels.iter().sum::<f32>() / pixels.len() as f32;
        let centred = pixels.into_iter().map(|p| p - mean).collect();

        Embedding::from_raw(centred)
    }
}

/// Embeds an image through a perceptual hash: every hash bit becomes +1 or -1,
/// so the cosine of two embeddings is `1 - 2 * hamming / bits`.
pub struct HashEmbedder {
    hasher: Hasher,
}

impl HashEmbedder {
    pub const DEFAULT_HASH_SIDE: u32 = 16;

    pub fn new() -> Self {
        let hasher = HasherConfig::new()
            .hash_alg(HashAlg::Gradient)
            .hash_size(Self::DEFAULT_HASH_SIDE, Self::DEFAULT_HASH_SIDE)
            .to_hasher();
        Self { hasher }
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn embed(&self, path: &Path) -> Result<Embedding, EmbedError> {
        let img = decode(path)?;
        let hash = self.hasher.hash_image(&img);

        let bits = hash
            .as_bytes()
            .iter()
            .flat_map(|byte| (0..8).map(move |i| if (byte >> i) & 1 == 1 { 1.0 } else { -1.0 }))
            .collect();

        Embedding::from_raw(bits)
    }
}
