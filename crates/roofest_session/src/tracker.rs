//! Estimation tracker.
//!
//! Stores the intermediate and final estimates sourced from the Estimation
//! Service. It validates but never computes prices.

use tracing::error;

use crate::error::{SessionError, SessionResult, StateError};
use crate::types::{EstimateRange, FinalEstimate};

#[derive(Debug, Clone, Default)]
pub struct EstimationTracker {
    intermediate: Option<EstimateRange>,
    final_estimate: Option<FinalEstimate>,
}

impl EstimationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the intermediate estimate.
    ///
    /// The previous value is discarded, never merged. A range breaking
    /// `0 <= min <= max` is a data-integrity error and leaves the stored
    /// value untouched.
    pub fn set_intermediate(&mut self, range: EstimateRange) -> SessionResult<()> {
        if let Err(reason) = range.validate() {
            error!(min = range.min, max = range.max, "Rejected intermediate estimate: {}", reason);
            return Err(SessionError::Integrity(reason));
        }
        self.intermediate = Some(range);
        Ok(())
    }

    /// Record the final estimate. Accepted once per session.
    pub fn set_final(&mut self, estimate: FinalEstimate) -> SessionResult<()> {
        if self.final_estimate.is_some() {
            return Err(StateError::FinalAlreadySet.into());
        }
        if let Err(reason) = estimate.cost.validate() {
            error!(
                min = estimate.cost.min,
                max = estimate.cost.max,
                "Rejected final estimate: {}",
                reason
            );
            return Err(SessionError::Integrity(reason));
        }
        if !estimate.roof_area_sqm.is_finite() || estimate.roof_area_sqm < 0.0 {
            return Err(SessionError::Integrity(format!(
                "roof area {} is not a valid surface",
                estimate.roof_area_sqm
            )));
        }
        self.final_estimate = Some(estimate);
        Ok(())
    }

    pub fn intermediate(&self) -> Option<&EstimateRange> {
        self.intermediate.as_ref()
    }

    pub fn final_estimate(&self) -> Option<&FinalEstimate> {
        self.final_estimate.as_ref()
    }

    pub fn has_final(&self) -> bool {
        self.final_estimate.is_some()
    }
}
