use crate::core::cache::EmbeddingCache;
use crate::core::image::ImageId;
use std::collections::HashMap;

/// Similarity of one pair of images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    /// Cosine similarity, clamped to [-1, 1].
    Known(f32),
    /// At least one side has no embedding, or the two could not be compared.
    Unknown,
}

impl Score {
    /// Numeric value, with `Unknown` reading as 0.
    pub fn value(self) -> f32 {
        match self {
            Score::Known(s) => s,
            Score::Unknown => 0.0,
        }
    }

    pub fn is_known(self) -> bool {
        matches!(self, Score::Known(_))
    }
}

/// Complete pairwise similarity table over a set of images.
///
/// Every ordered pair `(a, b)` with `a != b` has an entry, and
/// `score(a, b) == score(b, a)`. `positions` remembers where each image sat in
/// the set the index was built from, which gives queries a stable tie order.
#[derive(Debug, Default)]
pub struct SimilarityIndex {
    rows: HashMap<ImageId, HashMap<ImageId, Score>>,
    positions: HashMap<ImageId, usize>,
}

impl SimilarityIndex {
    /// Full O(N²·D) pass over `images`. Duplicate ids are indexed once.
    pub fn build(cache: &EmbeddingCache, images: &[ImageId]) -> Self {
        let mut index = Self::default();
        let mut order: Vec<&ImageId> = Vec::with_capacity(images.len());

        for id in images {
            if index.positions.contains_key(id) {
                continue;
            }
            index.positions.insert(id.clone(), order.len());
            index
                .rows
                .insert(id.clone(), HashMap::with_capacity(images.len()));
            order.push(id);
        }

        let mut unknown = 0usize;
        for (i, a) in order.iter().enumerate() {
            for b in &order[i + 1..] {
                let score = pair_score(cache, a, b);
                if !score.is_known() {
                    unknown += 1;
                }
                if let Some(row) = index.rows.get_mut(*a) {
                    row.insert((*b).clone(), score);
                }
                if let Some(row) = index.rows.get_mut(*b) {
                    row.insert((*a).clone(), score);
                }
            }
        }

        log::debug!(
            "Built similarity index over {} image(s), {} pair(s) without a score",
            order.len(),
            unknown
        );
        index
    }

    /// Drop `id` from the index in O(N): its own row goes, and its entry is
    /// removed from each row it was paired with.
    pub fn remove(&mut self, id: &str) -> bool {
        self.positions.remove(id);
        let Some(row) = self.rows.remove(id) else {
            return false;
        };
        for other in row.keys() {
            if let Some(other_row) = self.rows.get_mut(other) {
                other_row.remove(id);
            }
        }
        true
    }

    pub fn score(&self, a: &str, b: &str) -> Option<Score> {
        self.rows.get(a).and_then(|row| row.get(b)).copied()
    }

    pub fn row(&self, id: &str) -> Option<&HashMap<ImageId, Score>> {
        self.rows.get(id)
    }

    /// Position of `id` in the image list the index was built from.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.positions.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

fn pair_score(cache: &EmbeddingCache, a: &ImageId, b: &ImageId) -> Score {
    let (Some(ea), Some(eb)) = (cache.get(a.as_str()), cache.get(b.as_str())) else {
        return Score::Unknown;
    };
    match ea.dot(eb) {
        Some(s) if s.is_finite() => Score::Known(s.clamp(-1.0, 1.0)),
        Some(_) => {
            log::warn!("Non-finite similarity between {} and {}", a, b);
            Score::Unknown
        }
        None => {
            log::warn!(
                "Embedding dimensions differ for {} ({}) and {} ({})",
                a,
                ea.dim(),
                b,
                eb.dim()
            );
            Score::Unknown
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::tests::FakeEmbedder;
    use std::path::Path;

    fn ids(names: &[&str]) -> Vec<ImageId> {
        names.iter().map(|n| ImageId::from(*n)).collect()
    }

    fn build(vectors: &[(&str, Vec<f32>)], names: &[&str]) -> SimilarityIndex {
        let embedder = FakeEmbedder::new(vectors);
        let mut cache = EmbeddingCache::new(2).unwrap();
        let images = ids(names);
        cache.embed_all(Path::new("/photos"), &images, &embedder);
        SimilarityIndex::build(&cache, &images)
    }

    #[test]
    fn test_build_is_complete_and_symmetric() {
        let index = build(
            &[
                ("a.jpg", vec![1.0, 0.2, 0.0]),
                ("b.jpg", vec![0.9, 0.1, 0.3]),
                ("c.jpg", vec![-0.5, 1.0, 0.2]),
                ("d.jpg", vec![0.0, 0.0, 1.0]),
            ],
            &["a.jpg", "b.jpg", "c.jpg", "d.jpg"],
        );

        let names = ["a.jpg", "b.jpg", "c.jpg", "d.jpg"];
        assert_eq!(index.len(), 4);
        for a in names {
            assert_eq!(index.row(a).unwrap().len(), 3);
            assert!(index.score(a, a).is_none());
            for b in names.iter().filter(|b| **b != a) {
                let ab = index.score(a, b).unwrap();
                let ba = index.score(b, a).unwrap();
                assert_eq!(ab, ba);
                assert!((-1.0..=1.0).contains(&ab.value()));
            }
        }
    }

    #[test]
    fn test_identical_embeddings_score_one() {
        let index = build(
            &[("a.jpg", vec![0.3, 0.4]), ("b.jpg", vec![3.0, 4.0])],
            &["a.jpg", "b.jpg"],
        );

        match index.score("a.jpg", "b.jpg").unwrap() {
            Score::Known(s) => assert!((s - 1.0).abs() < 1e-6),
            Score::Unknown => panic!("expected a known score"),
        }
    }

    #[test]
    fn test_missing_embedding_gets_unknown_sentinel() {
        let index = build(
            &[("a.jpg", vec![1.0, 0.0]), ("b.jpg", vec![0.0, 1.0])],
            &["a.jpg", "b.jpg", "broken.jpg"],
        );

        assert!(index.contains("broken.jpg"));
        assert_eq!(index.score("a.jpg", "broken.jpg"), Some(Score::Unknown));
        assert_eq!(index.score("broken.jpg", "b.jpg"), Some(Score::Unknown));
        assert_eq!(Score::Unknown.value(), 0.0);
        assert_eq!(index.score("a.jpg", "b.jpg"), Some(Score::Known(0.0)));
    }

    #[test]
    fn test_mismatched_dimensions_are_unknown() {
        let index = build(
            &[("a.jpg", vec![1.0, 0.0]), ("b.jpg", vec![1.0, 0.0, 0.0])],
            &["a.jpg", "b.jpg"],
        );

        assert_eq!(index.score("a.jpg", "b.jpg"), Some(Score::Unknown));
    }

    #[test]
    fn test_duplicate_ids_indexed_once() {
        let index = build(
            &[("a.jpg", vec![1.0, 0.0]), ("b.jpg", vec![0.0, 1.0])],
            &["a.jpg", "b.jpg", "a.jpg"],
        );

        assert_eq!(index.len(), 2);
        assert_eq!(index.position("a.jpg"), Some(0));
        assert_eq!(index.position("b.jpg"), Some(1));
        assert_eq!(index.row("a.jpg").unwrap().len(), 1);
    }

    #[test]
    fn test_remove_prunes_row_and_columns() {
        let mut index = build(
            &[
                ("a.jpg", vec![1.0, 0.0]),
                ("b.jpg", vec![0.7, 0.7]),
                ("c.jpg", vec![0.0, 1.0]),
            ],
            &["a.jpg", "b.jpg", "c.jpg"],
        );
        let before = index.score("a.jpg", "c.jpg");

        assert!(index.remove("b.jpg"));

        assert!(!index.contains("b.jpg"));
        assert_eq!(index.position("b.jpg"), None);
        assert!(index.score("b.jpg", "a.jpg").is_none());
        assert!(index.score("a.jpg", "b.jpg").is_none());
        assert!(index.score("c.jpg", "b.jpg").is_none());
        assert_eq!(index.row("a.jpg").unwrap().len(), 1);
        assert_eq!(index.score("a.jpg", "c.jpg"), before);
        assert!(!index.remove("b.jpg"));
    }

    #[test]
    fn test_empty_build() {
        let index = build(&[], &[]);
        assert!(index.is_empty());
        assert!(index.row("a.jpg").is_none());
    }
}
