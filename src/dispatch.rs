//! Battery dispatch optimization over the forecast horizon.

mod optimizer;
mod soc_grid;
mod solution_space;
mod transition;

use serde::Serialize;

pub use self::{
    optimizer::{Optimizer, OptimizerBuilder},
    soc_grid::{EnergyLevel, SocGrid},
};
use crate::{
    forecast::effective_confidence,
    interval::Interval,
    quantity::{cost::Cost, energy::KilowattHours, power::Kilowatts, rate::KilowattHourRate},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum Infeasibility {
    #[error("negative consumption")]
    NegativeConsumption,

    #[error("negative solar production")]
    NegativeSolar,

    #[error("non-finite input")]
    NonFinite,

    #[error("no battery move satisfies the constraints")]
    NoTransition,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("no feasible dispatch at slot #{slot}: {reason}")]
pub struct InfeasibleHorizonError {
    pub slot: usize,
    pub reason: Infeasibility,
}

/// Battery, grid, and solar flows for one slot.
#[derive(Clone, Debug, Serialize)]
pub struct DispatchDecision {
    pub interval: Interval,
    pub tariff_rate: KilowattHourRate,

    #[serde(rename = "consumption_kw")]
    pub consumption: Kilowatts,

    /// Available solar production.
    #[serde(rename = "solar_kw")]
    pub solar: Kilowatts,

    #[serde(rename = "grid_draw_kw")]
    pub grid_draw: Kilowatts,

    /// Positive is charging, negative is discharging.
    #[serde(rename = "battery_flow_kw")]
    pub battery_flow: Kilowatts,

    #[serde(rename = "solar_used_kw")]
    pub solar_used: Kilowatts,

    #[serde(rename = "solar_exported_kw")]
    pub solar_exported: Kilowatts,

    #[serde(rename = "soc_before_kwh")]
    pub soc_before: KilowattHours,

    #[serde(rename = "soc_after_kwh")]
    pub soc_after: KilowattHours,

    pub cost: Cost,

    /// Forecast confidence of the slot.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
}

impl DispatchDecision {
    pub fn battery_charge(&self) -> Kilowatts {
        self.battery_flow.max(Kilowatts::ZERO)
    }

    pub fn battery_discharge(&self) -> Kilowatts {
        (-self.battery_flow).max(Kilowatts::ZERO)
    }

    #[must_use]
    pub fn effective_confidence(&self) -> f64 {
        effective_confidence(self.confidence)
    }

    /// Supply minus demand, zero for a balanced slot.
    pub fn power_imbalance(&self) -> Kilowatts {
        self.solar_used + self.grid_draw + self.battery_discharge()
            - self.consumption
            - self.battery_charge()
    }
}

#[must_use]
#[derive(Clone, Debug, Default, Serialize)]
pub struct DispatchPlan {
    pub decisions: Vec<DispatchDecision>,

    /// Sum of the decision costs.
    pub total_cost: Cost,

    /// Cost of the same horizon with the battery left idle.
    pub baseline_cost: Cost,
}

impl DispatchPlan {
    /// Savings brought by the battery.
    pub fn battery_savings(&self) -> Cost {
        self.baseline_cost - self.total_cost
    }

    /// State of charge at the end of the horizon, if the plan is not empty.
    #[must_use]
    pub fn final_soc(&self) -> Option<KilowattHours> {
        self.decisions.last().map(|decision| decision.soc_after)
    }
}
