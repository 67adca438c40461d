use crate::core::image::ImageId;
use crate::core::index::{Score, SimilarityIndex};
use serde::Serialize;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimilarImage {
    pub image: ImageId,
    pub score: f32,
}

/// The `top_n` images most similar to `image` with a score of at least
/// `threshold`, best first. Equal scores keep the order the images had when
/// the index was built. Pairs without a known score never appear.
pub fn top_similar(
    index: &SimilarityIndex,
    image: &str,
    threshold: f32,
    top_n: usize,
) -> Vec<SimilarImage> {
    if top_n == 0 {
        return Vec::new();
    }
    let Some(row) = index.row(image) else {
        return Vec::new();
    };

    let mut hits: Vec<(usize, &ImageId, f32)> = row
        .iter()
        .filter_map(|(other, score)| match *score {
            Score::Known(s) if s >= threshold => {
                Some((index.position(other.as_str()).unwrap_or(usize::MAX), other, s))
            }
            _ => None,
        })
        .collect();

    hits.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    hits.truncate(top_n);

    hits.into_iter()
        .map(|(_, other, score)| SimilarImage {
            image: other.clone(),
            score,
        })
        .collect()
}
