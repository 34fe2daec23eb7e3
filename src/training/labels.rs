//! Rating to binary label conversion.

/// Smallest rating treated as a positive example.
pub const POSITIVE_RATING: f32 = 1.0;

/// Convert ratings to binary labels: `rating >= 1` is positive.
pub fn binary_labels(ratings: &[f32]) -> Vec<bool> {
    ratings.iter().map(|&r| r >= POSITIVE_RATING).collect()
}
