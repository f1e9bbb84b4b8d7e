//! The scalar sample value carried through the system.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One scalar measurement.
///
/// A sample carries no timestamp; its meaning is "the most recently
/// produced value". Timing is imposed by the broadcast cadence.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sample(f64);

impl Sample {
    /// Value broadcast when no sample is available for a tick.
    pub const SENTINEL: Sample = Sample(0.0);

    /// Creates a sample from a raw value.
    pub const fn new(value: f64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    pub const fn value(self) -> f64 {
        self.0
    }

    /// Returns true if this is the exact sentinel value (positive zero).
    pub fn is_sentinel(self) -> bool {
        self.0 == 0.0 && self.0.is_sign_positive()
    }
}

impl From<f64> for Sample {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl From<Sample> for f64 {
    fn from(sample: Sample) -> Self {
        sample.0
    }
}

impl fmt::Display for Sample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinel_is_zero() {
        assert_eq!(Sample::SENTINEL.value(), 0.0);
        assert!(Sample::SENTINEL.is_sentinel());
        assert_eq!(Sample::default(), Sample::SENTINEL);
    }

    #[test]
    fn test_negative_zero_is_not_sentinel() {
        assert!(!Sample::new(-0.0).is_sentinel());
        assert!(!Sample::new(1.5).is_sentinel());
    }

    #[test]
    fn test_conversions() {
        let s: Sample = 2.5.into();
        assert_eq!(f64::from(s), 2.5);
        assert_eq!(s.to_string(), "2.5");
    }
}
