use serde::{Deserialize, Serialize};

use crate::quantity::{energy::KilowattHours, power::Kilowatts};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidBatteryError {
    #[error("energy values must be finite and non-negative")]
    NegativeEnergy,

    #[error("power limits must be finite and non-negative")]
    NegativePower,

    #[error("round-trip efficiency must be in (0, 1]")]
    Efficiency,

    #[error("expected min SoC ≤ current SoC ≤ max SoC ≤ capacity")]
    StateOfCharge,
}

/// Battery parameters and its current state of charge.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BatteryState {
    #[serde(rename = "capacity_kwh")]
    pub capacity: KilowattHours,

    #[serde(rename = "min_soc_kwh")]
    pub min_soc: KilowattHours,

    #[serde(rename = "max_soc_kwh")]
    pub max_soc: KilowattHours,

    #[serde(rename = "max_charge_kw")]
    pub max_charge: Kilowatts,

    #[serde(rename = "max_discharge_kw")]
    pub max_discharge: Kilowatts,

    pub round_trip_efficiency: f64,

    #[serde(rename = "current_soc_kwh")]
    pub current_soc: KilowattHours,
}

impl Default for BatteryState {
    fn default() -> Self {
        Self::NONE
    }
}

impl BatteryState {
    /// Absent battery: zero capacity and no power.
    pub const NONE: Self = Self {
        capacity: KilowattHours::ZERO,
        min_soc: KilowattHours::ZERO,
        max_soc: KilowattHours::ZERO,
        max_charge: Kilowatts::ZERO,
        max_discharge: Kilowatts::ZERO,
        round_trip_efficiency: 1.0,
        current_soc: KilowattHours::ZERO,
    };

    pub fn validate(&self) -> Result<(), InvalidBatteryError> {
        let energies = [self.capacity, self.min_soc, self.max_soc, self.current_soc];
        if energies.iter().any(|energy| !energy.is_finite() || energy.0 < 0.0) {
            return Err(InvalidBatteryError::NegativeEnergy);
        }
        let powers = [self.max_charge, self.max_discharge];
        if powers.iter().any(|power| !power.is_finite() || power.0 < 0.0) {
            return Err(InvalidBatteryError::NegativePower);
        }
        if !(self.round_trip_efficiency > 0.0 && self.round_trip_efficiency <= 1.0) {
            return Err(InvalidBatteryError::Efficiency);
        }
        if !(self.min_soc <= self.current_soc
            && self.current_soc <= self.max_soc
            && self.max_soc <= self.capacity)
        {
            return Err(InvalidBatteryError::StateOfCharge);
        }
        Ok(())
    }

    /// One-way efficiency, the round-trip loss is split evenly between charging and discharging.
    #[must_use]
    pub fn one_way_efficiency(&self) -> f64 {
        self.round_trip_efficiency.sqrt()
    }

    #[must_use]
    pub fn with_current_soc(mut self, current_soc: KilowattHours) -> Self {
        self.current_soc = current_soc;
        self
    }
}
