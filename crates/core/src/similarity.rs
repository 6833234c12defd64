//! Embedding similarity and deterministic top-k selection

use crate::{CoreError, Result};
use std::cmp::Ordering;

/// Cosine similarity of two vectors.
///
/// Returns 0 for empty, mismatched or zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;

    for (&x, &y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Check that every vector has the query's dimensionality
pub fn validate_dimensions(query: &[f32], vectors: &[Vec<f32>]) -> Result<()> {
    if let Some(bad) = vectors.iter().find(|v| v.len() != query.len()) {
        return Err(CoreError::InvalidEmbeddingDimension {
            expected: query.len(),
            actual: bad.len(),
        });
    }
    Ok(())
}

/// Score every keyed vector against the query and keep the best `top_k`.
///
/// Ordering: similarity descending, then key ascending. NaN scores sort last.
/// `top_k` larger than the number of items is clamped.
pub fn rank_top_k<K: Ord + Clone>(
    query: &[f32],
    items: &[(K, Vec<f32>)],
    top_k: usize,
) -> Vec<(K, f32)> {
    let mut scored: Vec<(K, f32)> = items
        .iter()
        .map(|(key, vector)| (key.clone(), cosine_similarity(query, vector)))
        .collect();

    scored.sort_by(|(ka, a), (kb, b)| compare_scores(*b, *a).then_with(|| ka.cmp(kb)));
    scored.truncate(top_k.min(items.len()));
    scored
}

fn compare_scores(a: f32, b: f32) -> Ordering {
    let a = if a.is_nan() { f32::NEG_INFINITY } else { a };
    let b = if b.is_nan() { f32::NEG_INFINITY } else { b };
    a.total_cmp(&b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_handles_edge_cases() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[0.0, 0.0]), 0.0);

        let aligned = cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]);
        assert!((aligned - 1.0).abs() < 1e-6);

        let opposite = cosine_similarity(&[1.0, 0.0], &[-3.0, 0.0]);
        assert!((opposite + 1.0).abs() < 1e-6);
    }

    #[test]
    fn rank_orders_by_similarity() {
        let items = vec![
            ("far".to_string(), vec![0.0, 1.0]),
            ("near".to_string(), vec![1.0, 0.1]),
            ("middle".to_string(), vec![1.0, 1.0]),
        ];
        let ranked = rank_top_k(&[1.0, 0.0], &items, 2);
        let keys: Vec<_> = ranked.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["near", "middle"]);
    }

    #[test]
    fn rank_breaks_ties_by_key() {
        let items = vec![
            ("b".to_string(), vec![1.0, 0.0]),
            ("c".to_string(), vec![0.0, 1.0]),
            ("a".to_string(), vec![2.0, 0.0]),
        ];
        let ranked = rank_top_k(&[1.0, 0.0], &items, 3);
        let keys: Vec<_> = ranked.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn rank_clamps_top_k() {
        let items = vec![(0usize, vec![1.0]), (1usize, vec![0.5])];
        assert_eq!(rank_top_k(&[1.0], &items, 10).len(), 2);
        assert!(rank_top_k::<usize>(&[1.0], &[], 3).is_empty());
    }

    #[test]
    fn nan_never_wins() {
        let items = vec![(0usize, vec![f32::NAN]), (1usize, vec![0.1])];
        let ranked = rank_top_k(&[1.0], &items, 1);
        assert_eq!(ranked[0].0, 1);
    }

    #[test]
    fn validate_dimensions_reports_mismatch() {
        let err = validate_dimensions(&[1.0, 2.0], &[vec![1.0, 2.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            CoreError::InvalidEmbeddingDimension {
                expected: 2,
                actual: 1
            }
        ));
    }
}
