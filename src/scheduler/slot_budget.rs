use std::ops::Range;

use crate::{
    dispatch::DispatchPlan,
    quantity::{cost::Cost, power::Kilowatts, rate::KilowattHourRate, time::Hours},
};

/// Power values within this tolerance satisfy the ceiling.
const POWER_TOLERANCE: f64 = 1e-9;

#[derive(Copy, Clone, Debug)]
struct SlotState {
    rate: KilowattHourRate,

    /// Appliance power already placed into the slot.
    load: Kilowatts,

    /// Solar that the dispatch plan would export, still available to appliances.
    spare_solar: Kilowatts,
}

/// Remaining per-slot headroom on top of the dispatch plan.
///
/// The battery schedule is committed to the base load, so appliance power is covered by the
/// spare solar and then by the grid at the tariff rate, never by extra battery discharge.
pub struct SlotBudget {
    slots: Vec<SlotState>,
    duration: Hours,
    feed_in_rate: KilowattHourRate,
}

impl SlotBudget {
    pub fn new(dispatch: &DispatchPlan, feed_in_rate: KilowattHourRate) -> Self {
        let duration =
            dispatch.decisions.first().map_or(Hours::ZERO, |decision| decision.interval.hours());
        let slots = dispatch
            .decisions
            .iter()
            .map(|decision| SlotState {
                rate: decision.tariff_rate,
                load: Kilowatts::ZERO,
                spare_solar: decision.solar_exported,
            })
            .collect();
        Self { slots, duration, feed_in_rate }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether the extra power keeps every slot of the range under the ceiling.
    #[must_use]
    pub fn fits(&self, range: Range<usize>, power: Kilowatts, ceiling: Option<Kilowatts>) -> bool {
        let Some(ceiling) = ceiling else {
            return true;
        };
        self.slots[range].iter().all(|slot| (slot.load + power).0 <= ceiling.0 + POWER_TOLERANCE)
    }

    /// Added cost of running the power over the range.
    ///
    /// The load absorbs the spare solar first, forgoing its feed-in credit,
    /// then draws from the grid.
    pub fn marginal_cost(&self, range: Range<usize>, power: Kilowatts) -> Cost {
        self.slots[range].iter().map(|slot| self.slot_cost(slot, power)).sum()
    }

    /// Place the power into the range and return its cost.
    pub fn commit(&mut self, range: Range<usize>, power: Kilowatts) -> Cost {
        let mut cost = Cost::ZERO;
        for index in range {
            let slot = self.slots[index];
            cost += self.slot_cost(&slot, power);
            self.slots[index] = SlotState {
                load: slot.load + power,
                spare_solar: (slot.spare_solar - power).max(Kilowatts::ZERO),
                ..slot
            };
        }
        cost
    }

    /// Highest placed load over the range.
    pub fn peak_load(&self, range: Range<usize>) -> Kilowatts {
        self.slots[range].iter().map(|slot| slot.load).max().unwrap_or(Kilowatts::ZERO)
    }

    fn slot_cost(&self, slot: &SlotState, power: Kilowatts) -> Cost {
        let from_solar = power.min(slot.spare_solar);
        let from_grid = power - from_solar;
        from_solar * self.duration * self.feed_in_rate + from_grid * self.duration * slot.rate
    }
}
