//! Vector helpers for the embedding-backed memory mirror.

fn norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Cosine similarity; 0.0 for mismatched dimensions or a zero vector.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let denom = norm(a) * norm(b);
    if denom == 0.0 {
        return 0.0;
    }
    a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>() / denom
}

/// Scale to unit length. A zero vector stays zero.
pub fn vector_normalize(v: &[f32]) -> Vec<f32> {
    match norm(v) {
        n if n == 0.0 => vec![0.0; v.len()],
        n => v.iter().map(|x| x / n).collect(),
    }
}

/// Indices of the `k` candidates most similar to `query`, best first.
pub fn top_k_similar(query: &[f32], candidates: &[&[f32]], k: usize) -> Vec<(usize, f32)> {
    let mut scored: Vec<(usize, f32)> = candidates
        .iter()
        .enumerate()
        .map(|(i, c)| (i, cosine_similarity(query, c)))
        .collect();
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));
    scored.truncate(k);
    scored
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_edge_cases() {
        assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_normalize() {
        let n = vector_normalize(&[3.0, 4.0]);
        assert!((n[0] - 0.6).abs() < 1e-6 && (n[1] - 0.8).abs() < 1e-6);
        assert_eq!(vector_normalize(&[0.0; 3]), vec![0.0; 3]);
    }

    #[test]
    fn test_top_k_ranks_and_truncates() {
        let (q, a, b, c) = ([1.0, 0.0], [0.0, 1.0], [1.0, 0.1], [1.0, 1.0]);
        let ranked: Vec<usize> = top_k_similar(&q, &[&a, &b, &c], 2)
            .into_iter()
            .map(|(i, _)| i)
            .collect();
        assert_eq!(ranked, vec![1, 2]);
    }
}
