//! Seam to the historical travel-time estimator.

/// Estimates travel times between two tracks from observed history.
///
/// The estimator is consulted to fill in the planned times of synthetic
/// entry and exit rows, which the simulator does not provide.
pub trait TravelTimeEstimator {
    /// Estimated travel time in seconds between `from_track` and `to_track`
    /// for the given train, or NaN when no estimate is available.
    fn estimate_seconds(&self, train_name: &str, from_track: &str, to_track: &str) -> f64;
}

/// Estimator without data; every query answers NaN.
pub struct NoEstimate;

impl TravelTimeEstimator for NoEstimate {
    fn estimate_seconds(&self, _train_name: &str, _from_track: &str, _to_track: &str) -> f64 {
        f64::NAN
    }
}
