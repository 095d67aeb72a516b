//! Classifier capability seam.

use ecgedge_core::FEATURE_COUNT;

use crate::InferenceError;

/// A loaded model that maps one scaled feature vector to per-label scores.
///
/// Implementations are created once and shared by reference across
/// concurrent requests.
pub trait Classifier: Send + Sync {
    /// Raw scores in [`Diagnosis::ALL`](ecgedge_core::Diagnosis::ALL) order.
    fn scores(&self, features: &[f32; FEATURE_COUNT]) -> Result<Vec<f32>, InferenceError>;
}

/// Index and value of the highest finite score. Ties resolve to the lowest
/// index.
pub fn argmax(scores: &[f32]) -> Option<(usize, f32)> {
    scores
        .iter()
        .copied()
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .fold(None, |best, (i, s)| match best {
            Some((_, b)) if b >= s => best,
            _ => Some((i, s)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_highest_score() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
    }

    #[test]
    fn ties_resolve_to_first() {
        assert_eq!(argmax(&[0.5, 0.5, 0.0]), Some((0, 0.5)));
    }

    #[test]
    fn ignores_non_finite_scores() {
        assert_eq!(argmax(&[f32::NAN, 0.2, f32::INFINITY]), Some((1, 0.2)));
        assert_eq!(argmax(&[f32::NAN]), None);
        assert_eq!(argmax(&[]), None);
    }
}
