use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::quantity::{power::Kilowatts, rate::KilowattHourRate};

/// Forecast of a single slot starting at `timestamp`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub timestamp: NaiveDateTime,

    #[serde(rename = "consumption_kw")]
    pub consumption: Kilowatts,

    #[serde(rename = "solar_kw")]
    pub solar: Kilowatts,

    pub tariff_rate: KilowattHourRate,

    /// Certainty of the forecast source in `0.0..=1.0`, when it provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl ForecastPoint {
    #[must_use]
    pub const fn is_finite(&self) -> bool {
        self.consumption.is_finite() && self.solar.is_finite() && self.tariff_rate.is_finite()
    }

    /// Confidence with missing or malformed values treated as certain.
    #[must_use]
    pub fn effective_confidence(&self) -> f64 {
        effective_confidence(self.confidence)
    }
}

#[must_use]
pub fn effective_confidence(confidence: Option<f64>) -> f64 {
    confidence.filter(|confidence| confidence.is_finite()).map_or(1.0, |c| c.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_confidence() {
        assert_eq!(effective_confidence(None), 1.0);
        assert_eq!(effective_confidence(Some(f64::NAN)), 1.0);
        assert_eq!(effective_confidence(Some(1.5)), 1.0);
        assert_eq!(effective_confidence(Some(-0.1)), 0.0);
        assert_eq!(effective_confidence(Some(0.92)), 0.92);
    }
}
