use crate::{
    battery::BatteryState,
    dispatch::Infeasibility,
    forecast::ForecastPoint,
    quantity::{
        cost::Cost,
        energy::KilowattHours,
        power::Kilowatts,
        rate::KilowattHourRate,
        time::Hours,
    },
};

/// Power values within this tolerance satisfy a limit.
const POWER_TOLERANCE: f64 = 1e-9;

/// Slot-level power balance of a single battery move.
#[derive(Copy, Clone, Debug)]
pub struct Transition {
    pub grid_draw: Kilowatts,

    /// Positive is charging, negative is discharging, both measured at the battery terminals.
    pub battery_flow: Kilowatts,

    pub solar_used: Kilowatts,
    pub solar_exported: Kilowatts,
    pub cost: Cost,
}

/// Inputs of a single slot.
#[derive(Copy, Clone, Debug)]
pub struct SlotConditions<'a> {
    pub consumption: Kilowatts,
    pub solar: Kilowatts,
    pub rate: KilowattHourRate,
    pub feed_in_rate: KilowattHourRate,
    pub duration: Hours,
    pub battery: &'a BatteryState,
}

impl<'a> SlotConditions<'a> {
    pub fn new(
        point: &ForecastPoint,
        duration: Hours,
        feed_in_rate: KilowattHourRate,
        battery: &'a BatteryState,
    ) -> Result<Self, Infeasibility> {
        if !point.is_finite() {
            return Err(Infeasibility::NonFinite);
        }
        if point.consumption < Kilowatts::ZERO {
            return Err(Infeasibility::NegativeConsumption);
        }
        if point.solar < Kilowatts::ZERO {
            return Err(Infeasibility::NegativeSolar);
        }
        Ok(Self {
            consumption: point.consumption,
            solar: point.solar,
            rate: point.tariff_rate,
            feed_in_rate,
            duration,
            battery,
        })
    }

    /// Simulate changing the stored energy by `delta` over the slot.
    ///
    /// Returns [`None`] when the move violates the power limits or would export battery energy.
    pub fn simulate(&self, delta: KilowattHours) -> Option<Transition> {
        let efficiency = self.battery.one_way_efficiency();
        let (charge, discharge) = if delta > KilowattHours::ZERO {
            // Charging stores less than it draws:
            (delta / efficiency / self.duration, Kilowatts::ZERO)
        } else {
            // Discharging delivers less than it spends:
            (Kilowatts::ZERO, -delta * efficiency / self.duration)
        };
        if charge.0 > self.battery.max_charge.0 + POWER_TOLERANCE
            || discharge.0 > self.battery.max_discharge.0 + POWER_TOLERANCE
        {
            return None;
        }
        let transition = self.balance(charge, discharge);
        let residual = self.consumption + charge - transition.solar_used;
        if discharge.0 > residual.0 + POWER_TOLERANCE {
            return None;
        }
        Some(transition)
    }

    /// Transition without any battery activity.
    pub fn idle(&self) -> Transition {
        self.balance(Kilowatts::ZERO, Kilowatts::ZERO)
    }

    fn balance(&self, charge: Kilowatts, discharge: Kilowatts) -> Transition {
        let demand = self.consumption + charge;
        let solar_used = self.solar.min(demand);
        let solar_exported = self.solar - solar_used;
        let grid_draw = (demand - solar_used - discharge).max(Kilowatts::ZERO);
        let cost = grid_draw * self.duration * self.rate
            - solar_exported * self.duration * self.feed_in_rate;
        Transition { grid_draw, battery_flow: charge - discharge, solar_used, solar_exported, cost }
    }
}
