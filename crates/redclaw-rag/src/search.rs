//! Similarity math, vector encoding, and context assembly.

use redclaw_core::types::SearchHit;

/// Cosine similarity between two vectors. Zero-norm or mismatched inputs
/// yield 0.0, never NaN.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Encode a vector as little-endian f32 bytes for BLOB storage.
pub fn encode_vector(v: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(v.len() * 4);
    for f in v {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

/// Decode a BLOB back into a vector. Trailing partial floats are dropped.
pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

/// Filter hits by threshold, sort by score descending, truncate to n.
pub fn rank_hits(mut hits: Vec<SearchHit>, threshold: f32, n: usize) -> Vec<SearchHit> {
    hits.retain(|h| h.similarity_score >= threshold);
    hits.sort_by(|a, b| {
        b.similarity_score
            .partial_cmp(&a.similarity_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    hits.truncate(n);
    hits
}

/// Build a context string for a query from ranked hits, staying under
/// `max_len` bytes. Each hit contributes a `Source: ...` header block; a
/// final partial block is included only when at least 100 bytes of content
/// would fit.
pub fn build_context(hits: &[SearchHit], max_len: usize) -> String {
    if hits.is_empty() {
        return "No relevant context found.".to_string();
    }

    let mut parts: Vec<String> = Vec::new();
    let mut used = 0usize;

    for hit in hits {
        let source = hit
            .metadata
            .get("source")
            .map(String::as_str)
            .unwrap_or("Unknown");
        let header = format!("Source: {source} (Score: {:.2})", hit.similarity_score);
        let block = format!("{header}\n{}\n---\n", hit.content);

        if used + block.len() <= max_len {
            used += block.len();
            parts.push(block);
        } else {
            let remaining = max_len.saturating_sub(used + header.len() + 10);
            if remaining > 100 {
                let partial: String = hit.content.chars().take(remaining).collect();
                parts.push(format!("{header}\n{partial}...\n---\n"));
            }
            break;
        }
    }

    parts.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn hit(content: &str, score: f32) -> SearchHit {
        SearchHit {
            content: content.to_string(),
            metadata: BTreeMap::new(),
            similarity_score: score,
            collection: "general".into(),
            matched_tags: vec![],
        }
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn test_cosine_zero_vector_is_zero_not_nan() {
        let sim = cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]);
        assert_eq!(sim, 0.0);
        assert!(!sim.is_nan());
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_vector_roundtrip() {
        let v = vec![0.5, -1.25, 3.75, 0.0];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }

    #[test]
    fn test_rank_hits_sorted_and_filtered() {
        let hits = vec![hit("a", 0.4), hit("b", 0.9), hit("c", 0.7), hit("d", 0.95)];
        let ranked = rank_hits(hits, 0.5, 2);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].content, "d");
        assert_eq!(ranked[1].content, "b");
    }

    #[test]
    fn test_build_context_respects_budget() {
        let hits = vec![hit(&"x".repeat(300), 0.9), hit(&"y".repeat(300), 0.8)];
        let ctx = build_context(&hits, 400);
        assert!(ctx.len() <= 400 + 16); // header slack for the partial block marker
        assert!(ctx.contains("Score: 0.90"));
    }

    #[test]
    fn test_build_context_empty() {
        assert_eq!(build_context(&[], 1000), "No relevant context found.");
    }
}
