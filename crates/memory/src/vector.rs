//! Vector similarity utilities.
//!
//! Pure-Rust cosine similarity and brute-force nearest-neighbour ranking
//! over semantic fragments. Stores without a native vector index use these.

use agentmem_core::semantic::SemanticFragment;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if either vector is zero-length or empty.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// Rank fragments by cosine similarity to a query embedding.
///
/// Returns the top `limit` fragments, most similar first, each with
/// `similarity` set. Fragments whose dimension differs from the query are
/// skipped. Ties keep the newer fragment first.
pub fn rank_by_similarity<'a, I>(
    fragments: I,
    query_embedding: &[f32],
    limit: usize,
) -> Vec<SemanticFragment>
where
    I: IntoIterator<Item = &'a SemanticFragment>,
{
    let mut scored: Vec<(f32, &SemanticFragment)> = fragments
        .into_iter()
        .filter(|f| f.embedding.len() == query_embedding.len())
        .map(|f| (cosine_similarity(&f.embedding, query_embedding), f))
        .collect();

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.1.created_at.cmp(&a.1.created_at))
    });
    scored.truncate(limit);
    scored
        .into_iter()
        .map(|(sim, f)| {
            let mut f = f.clone();
            f.similarity = Some(sim);
            f
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentmem_core::semantic::SaveOptions;

    fn fragment(content: &str, embedding: Vec<f32>) -> SemanticFragment {
        SemanticFragment::new("org", None, content, embedding, &SaveOptions::default())
    }

    #[test]
    fn cosine_identical_vectors() {
        let v = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn cosine_opposite_vectors() {
        let sim = cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]);
        assert!((sim - (-1.0)).abs() < 1e-6);
    }

    #[test]
    fn cosine_empty_and_mismatched() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0, 0.0], &[1.0, 2.0, 3.0]), 0.0);
    }

    #[test]
    fn cosine_known_value() {
        // [1,1] · [1,0] = 1, |[1,1]| = sqrt(2), |[1,0]| = 1
        let sim = cosine_similarity(&[1.0, 1.0], &[1.0, 0.0]);
        assert!((sim - 0.7071).abs() < 0.001);
    }

    #[test]
    fn ranks_by_similarity_and_annotates() {
        let query = vec![1.0, 0.0, 0.0];
        let fragments = vec![
            fragment("a", vec![0.0, 1.0, 0.0]),
            fragment("b", vec![1.0, 0.0, 0.0]),
            fragment("c", vec![0.5, 0.5, 0.0]),
        ];

        let results = rank_by_similarity(&fragments, &query, 10);
        let order: Vec<&str> = results.iter().map(|f| f.content.as_str()).collect();
        assert_eq!(order, vec!["b", "c", "a"]);
        assert!((results[0].similarity.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn skips_mismatched_dimensions() {
        let fragments = vec![fragment("a", vec![1.0, 0.0]), fragment("b", vec![1.0])];
        let results = rank_by_similarity(&fragments, &[1.0, 0.0], 10);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "a");
    }

    #[test]
    fn respects_limit() {
        let fragments: Vec<_> = (0..10)
            .map(|i| fragment(&format!("e{i}"), vec![1.0, i as f32 * 0.1]))
            .collect();
        assert_eq!(rank_by_similarity(&fragments, &[1.0, 0.0], 3).len(), 3);
    }
}
