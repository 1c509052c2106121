//! Small shared utilities.

pub mod lru;

pub use lru::LruCache;

/// Clamp a score into the [0, 1] range.
pub fn clamp_unit(score: f32) -> f32 {
    score.clamp(0.0, 1.0)
}

/// L2-normalize a vector in place. Zero vectors are left untouched.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

/// Dot product of two equal-length vectors.
///
/// Returns 0.0 when the dimensions differ; callers validate dimensions at
/// load time, so a mismatch here means a stale reference set.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Cosine similarity of two unit vectors, rescaled from [-1, 1] to [0, 1].
pub fn cosine_unit_rescaled(a: &[f32], b: &[f32]) -> f32 {
    clamp_unit((dot(a, b) + 1.0) / 2.0)
}

/// Truncate a string to at most `max_chars` characters, for log records.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
