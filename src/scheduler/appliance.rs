use serde::{Deserialize, Serialize};

use crate::quantity::power::Kilowatts;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidApplianceError {
    #[error("appliance `{id}` has a negative or non-finite power")]
    Power { id: String },

    #[error("appliance `{id}` has its earliest start after the latest one")]
    InvertedWindow { id: String },

    #[error("appliance `{id}` ends beyond the last addressable slot")]
    WindowOverflow { id: String },
}

/// Appliance run to be placed on the slot grid.
///
/// Start bounds are slot indices within the horizon.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Appliance {
    pub id: String,

    #[serde(rename = "power_kw")]
    pub power: Kilowatts,

    pub duration_slots: usize,
    pub earliest_start: usize,
    pub latest_start: usize,

    /// Fixed appliances always start at `earliest_start`.
    #[serde(default = "default_deferrable")]
    pub deferrable: bool,
}

const fn default_deferrable() -> bool {
    true
}

impl Appliance {
    pub fn validate(&self) -> Result<(), InvalidApplianceError> {
        let id = self.id.clone();
        if !(self.power.is_finite() && self.power >= Kilowatts::ZERO) {
            return Err(InvalidApplianceError::Power { id });
        }
        if self.earliest_start > self.latest_start {
            return Err(InvalidApplianceError::InvertedWindow { id });
        }
        if self.end_slot(self.latest_start).is_none() {
            return Err(InvalidApplianceError::WindowOverflow { id });
        }
        Ok(())
    }

    /// Exclusive end slot of a run starting at the slot, [`None`] on overflow.
    #[must_use]
    pub const fn end_slot(&self, start: usize) -> Option<usize> {
        start.checked_add(self.duration_slots)
    }

    /// Window width used to order the appliances, tightest first.
    #[must_use]
    pub const fn tightness(&self) -> usize {
        self.latest_start.saturating_sub(self.earliest_start)
    }
}
