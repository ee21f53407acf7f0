//! Confidence (Value Object)
//!
//! All confidence arithmetic in the workspace goes through this type so the
//! `[0, 1]` bound is enforced in one place.

use crate::error::{CrosswalkError, CrosswalkResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confidence score
///
/// # Invariants
/// - Range: 0.0 to 1.0
/// - Never NaN
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct Confidence(f64);

impl Confidence {
    /// No support at all
    pub const ZERO: Self = Self(0.0);
    /// Certainty (only reachable through a human override or perfect inputs)
    pub const ONE: Self = Self(1.0);

    /// Create confidence with validation
    pub fn new(value: f64) -> CrosswalkResult<Self> {
        if value.is_nan() || !(0.0..=1.0).contains(&value) {
            return Err(CrosswalkError::validation(format!(
                "confidence must be 0.0-1.0, got {}",
                value
            )));
        }
        Ok(Self(value))
    }

    /// Create confidence, clamping into range (NaN becomes zero)
    pub fn clamped(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 1.0))
    }

    /// Get value
    #[inline]
    pub fn value(&self) -> f64 {
        self.0
    }

    /// Product of two confidences (used for hop decay)
    #[inline]
    pub fn and(self, other: Self) -> Self {
        Self(self.0 * other.0)
    }

    /// Scale by a factor in `[0, 1]`
    #[inline]
    pub fn scale(self, factor: f64) -> Self {
        Self::clamped(self.0 * factor)
    }

    /// Larger of two confidences
    #[inline]
    pub fn max(self, other: Self) -> Self {
        if other.0 > self.0 {
            other
        } else {
            self
        }
    }

    /// Noisy-OR combination of independent supporting signals
    ///
    /// `1 - Π(1 - cᵢ)`, folded pairwise as `a + b - ab` so a single signal
    /// comes back unchanged. Adding a signal or raising any input never lowers
    /// the result, and the result stays within `[0, 1]`. An empty input yields
    /// zero.
    pub fn noisy_or<I>(signals: I) -> Self
    where
        I: IntoIterator<Item = Confidence>,
    {
        signals
            .into_iter()
            .fold(None, |acc: Option<f64>, c| {
                Some(match acc {
                    None => c.0,
                    Some(a) => a + c.0 - a * c.0,
                })
            })
            .map(Self::clamped)
            .unwrap_or(Self::ZERO)
    }

    /// Total ordering (values are never NaN)
    pub fn total_cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self::ZERO
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl TryFrom<f64> for Confidence {
    type Error = CrosswalkError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Confidence> for f64 {
    fn from(c: Confidence) -> f64 {
        c.0
    }
}
