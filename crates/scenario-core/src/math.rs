//! Small numeric helpers shared by the calculator and the fingerprinting code.
//!
//! Everything here is order-preserving and allocation-free so that two runs over the
//! same inputs produce bit-identical floats.

/// Compute the mean of a data slice.
pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Weighted mean of `(value, weight)` pairs. Returns 0.0 when the weights sum to zero.
pub fn weighted_mean(pairs: &[(f64, f64)]) -> f64 {
    let total_weight: f64 = pairs.iter().map(|(_, w)| w).sum();
    if total_weight.abs() < f64::EPSILON {
        return 0.0;
    }
    pairs.iter().map(|(v, w)| v * w).sum::<f64>() / total_weight
}

/// Herfindahl-Hirschman index of a set of percentage weights (0-100 each).
/// Returns a value in [0, 1] when the weights sum to 100.
pub fn herfindahl_index(percentages: &[f64]) -> f64 {
    percentages.iter().map(|p| (p / 100.0).powi(2)).sum()
}

/// Cosine similarity of two equally sized vectors.
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a < f64::EPSILON || norm_b < f64::EPSILON {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Clamp to the 0-100 score range, mapping NaN to 0.
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(0.0, 100.0)
}
