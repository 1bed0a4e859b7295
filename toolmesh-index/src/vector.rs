//! Fixed-length unit-norm embedding vectors stored as raw little-endian
//! `f32` byte payloads (NULL when absent).

/// Encodes a vector as its raw little-endian byte payload.
pub fn encode_embedding(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decodes a raw little-endian byte payload back into a vector. Ignores
/// any trailing bytes that don't form a complete `f32` (defensive
/// against a corrupted row; such a vector would just never be used as a
/// search candidate once its length disagrees with the configured
/// dimension).
pub fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity. For unit-norm vectors this is exactly the dot
/// product (§4.3); this implementation normalizes explicitly so that a
/// vector this store didn't itself produce (and that a caller failed to
/// normalize) still yields a meaningful ranking rather than a silently
/// wrong one.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_roundtrips_through_bytes() {
        let v = vec![0.1_f32, -0.2, 0.3, 0.75];
        let bytes = encode_embedding(&v);
        let back = decode_embedding(&bytes);
        assert_eq!(v, back);
    }

    #[test]
    fn identical_unit_vectors_have_similarity_one() {
        let v = vec![1.0_f32, 0.0, 0.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn orthogonal_vectors_have_similarity_zero() {
        let a = vec![1.0_f32, 0.0];
        let b = vec![0.0_f32, 1.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }
}
