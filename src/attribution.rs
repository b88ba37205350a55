//! Decomposition of the realized savings by cause.

use std::{collections::HashMap, ptr};

use chrono::{NaiveDate, NaiveDateTime};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    dispatch::DispatchDecision,
    prelude::*,
    quantity::{
        Quantity,
        cost::Cost,
        energy::KilowattHours,
        power::Kilowatts,
        rate::KilowattHourRate,
    },
    tariff::TariffSchedule,
};

/// Metered values of a single slot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Start of the slot, matched against the plan.
    pub timestamp: NaiveDateTime,

    #[serde(rename = "consumption_kw")]
    pub consumption: Kilowatts,

    #[serde(rename = "solar_kw", default)]
    pub solar: Kilowatts,

    #[serde(rename = "grid_draw_kw")]
    pub grid_draw: Kilowatts,

    /// Positive when charging.
    #[serde(rename = "battery_flow_kw", default)]
    pub battery_flow: Kilowatts,

    /// Realized rate, the planned one is used when absent.
    #[serde(default)]
    pub rate: Option<KilowattHourRate>,
}

impl Reading {
    const fn is_finite(&self) -> bool {
        self.consumption.is_finite()
            && self.solar.is_finite()
            && self.grid_draw.is_finite()
            && self.battery_flow.is_finite()
            && match self.rate {
                Some(rate) => rate.is_finite(),
                None => true,
            }
    }
}

/// Savings split into the tariff shift, solar self-consumption, and battery arbitrage.
///
/// The components are computed in this fixed order, and the battery takes the remainder,
/// so that they always add up to `baseline_cost − actual_cost`.
#[must_use]
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
pub struct SavingsAttribution {
    #[serde(rename = "tariff_shift_amount")]
    pub tariff_shift: Cost,

    #[serde(rename = "solar_self_consumption_amount")]
    pub solar_self_consumption: Cost,

    #[serde(rename = "battery_arbitrage_amount")]
    pub battery_arbitrage: Cost,

    /// Battery arbitrage measured from the metered battery flow instead of the remainder.
    ///
    /// Differs from [`SavingsAttribution::battery_arbitrage`] when the readings do not balance.
    pub metered_battery_arbitrage: Cost,

    /// Cost of the same consumption at the day-average rate of the plan.
    pub baseline_cost: Cost,

    pub actual_cost: Cost,

    /// Part of the solar production consumed on site, [`None`] without any production.
    pub solar_self_consumption_ratio: Option<f64>,
}

/// Fractions of the total savings.
#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
pub struct AttributionShares {
    pub tariff_shift: f64,
    pub solar_self_consumption: f64,
    pub battery_arbitrage: f64,
}

/// Realized consumption and savings within a single tariff period.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PeriodAttribution {
    pub label: String,
    pub rate: KilowattHourRate,
    pub consumption: KilowattHours,
    pub actual_cost: Cost,

    /// Cost of the same consumption at the day-average rate of the plan.
    pub flat_cost: Cost,

    pub saving: Cost,
}

#[derive(Default)]
struct Totals {
    consumption: KilowattHours,
    flat_cost: Cost,
    shifted_cost: Cost,
    without_solar_cost: Cost,
    without_battery_cost: Cost,
    actual_cost: Cost,
    solar_produced: KilowattHours,
    solar_consumed: KilowattHours,
}

impl Totals {
    fn add(&mut self, slot: &MatchedSlot) {
        let reading = slot.reading;
        let duration = slot.decision.interval.hours();
        let consumption = reading.consumption.max(Kilowatts::ZERO);
        let solar = reading.solar.max(Kilowatts::ZERO);
        let solar_consumed = solar.min(consumption);
        let without_battery = (reading.grid_draw - reading.battery_flow).max(Kilowatts::ZERO);

        self.consumption += consumption * duration;
        self.flat_cost += consumption * duration * slot.flat_rate;
        self.shifted_cost += consumption * duration * slot.rate;
        self.without_solar_cost += (consumption - solar_consumed) * duration * slot.rate;
        self.without_battery_cost += without_battery * duration * slot.rate;
        self.actual_cost += reading.grid_draw.max(Kilowatts::ZERO) * duration * slot.rate;
        self.solar_produced += solar * duration;
        self.solar_consumed += solar_consumed * duration;
    }
}

/// Reading joined with its planned slot.
struct MatchedSlot<'a> {
    decision: &'a DispatchDecision,
    reading: &'a Reading,

    /// Realized rate, or the planned one.
    rate: KilowattHourRate,

    /// Day-average rate of the plan on the slot's calendar day.
    flat_rate: KilowattHourRate,
}

/// Join the readings with the planned slots, skipping the unmatched and non-finite ones.
fn match_slots<'a>(
    decisions: &'a [DispatchDecision],
    readings: &'a [Reading],
) -> impl Iterator<Item = MatchedSlot<'a>> {
    let day_rates = day_average_rates(decisions);
    readings.iter().filter_map(move |reading| {
        let Ok(index) = decisions
            .binary_search_by_key(&reading.timestamp, |decision| decision.interval.start)
        else {
            warn!(timestamp = %reading.timestamp, "reading does not match any planned slot");
            return None;
        };
        if !reading.is_finite() {
            warn!(timestamp = %reading.timestamp, "skipping a non-finite reading");
            return None;
        }
        let decision = &decisions[index];
        let flat_rate = day_rates
            .get(&decision.interval.start.date())
            .copied()
            .unwrap_or(decision.tariff_rate);
        Some(MatchedSlot {
            decision,
            reading,
            rate: reading.rate.unwrap_or(decision.tariff_rate),
            flat_rate,
        })
    })
}

/// Time-weighted average of the planned rates over each calendar day the plan covers.
fn day_average_rates(decisions: &[DispatchDecision]) -> HashMap<NaiveDate, KilowattHourRate> {
    let mut sums: HashMap<NaiveDate, (f64, f64)> = HashMap::new();
    for decision in decisions {
        let hours = decision.interval.hours().0;
        let (weighted, total) = sums.entry(decision.interval.start.date()).or_default();
        *weighted += decision.tariff_rate.0 * hours;
        *total += hours;
    }
    sums.into_iter()
        .filter(|(_, (_, total))| *total > 0.0)
        .map(|(date, (weighted, total))| (date, Quantity(weighted / total)))
        .collect()
}

impl SavingsAttribution {
    /// Attribute the savings of the readings against the dispatch decisions of a plan.
    ///
    /// Readings that do not match any planned slot are skipped.
    #[instrument(skip_all, fields(n_readings = readings.len(), n_slots = decisions.len()))]
    pub fn compute(decisions: &[DispatchDecision], readings: &[Reading]) -> Self {
        let mut totals = Totals::default();
        let mut n_matched = 0_usize;
        for slot in match_slots(decisions, readings) {
            totals.add(&slot);
            n_matched += 1;
        }
        if n_matched == 0 {
            return Self::default();
        }

        let baseline_cost = totals.flat_cost.settle();
        let actual_cost = totals.actual_cost.settle();
        let tariff_shift = (totals.flat_cost - totals.shifted_cost).settle();
        let solar_self_consumption = (totals.shifted_cost - totals.without_solar_cost).settle();
        let battery_arbitrage =
            (baseline_cost - actual_cost - tariff_shift - solar_self_consumption).settle();
        let metered_battery_arbitrage = (totals.without_battery_cost - actual_cost).settle();
        if !(metered_battery_arbitrage - battery_arbitrage).is_negligible() {
            debug!(
                remainder = %battery_arbitrage,
                metered = %metered_battery_arbitrage,
                "the readings do not balance",
            );
        }
        let solar_self_consumption_ratio = (totals.solar_produced > KilowattHours::ZERO)
            .then(|| totals.solar_consumed / totals.solar_produced);

        let attribution = Self {
            tariff_shift,
            solar_self_consumption,
            battery_arbitrage,
            metered_battery_arbitrage,
            baseline_cost,
            actual_cost,
            solar_self_consumption_ratio,
        };
        info!(
            n_matched,
            savings = %attribution.savings(),
            tariff_shift = %tariff_shift,
            solar = %solar_self_consumption,
            battery = %battery_arbitrage,
            "attributed",
        );
        attribution
    }

    /// Break the realized consumption and savings down by the tariff period of each reading.
    ///
    /// Returns one entry per period of the schedule, in the schedule order.
    #[instrument(skip_all, fields(n_readings = readings.len(), n_slots = decisions.len()))]
    pub fn by_period(
        decisions: &[DispatchDecision],
        readings: &[Reading],
        schedule: &TariffSchedule,
    ) -> Vec<PeriodAttribution> {
        let periods = schedule.periods();
        let mut totals = periods.iter().map(|_| Totals::default()).collect_vec();
        for slot in match_slots(decisions, readings) {
            let period = schedule.period_at(slot.reading.timestamp);
            if let Some(index) = periods.iter().position(|candidate| ptr::eq(candidate, period)) {
                totals[index].add(&slot);
            }
        }
        periods
            .iter()
            .zip(totals)
            .map(|(period, totals)| PeriodAttribution {
                label: period.label.clone(),
                rate: period.rate,
                consumption: totals.consumption,
                actual_cost: totals.actual_cost.settle(),
                flat_cost: totals.flat_cost.settle(),
                saving: (totals.flat_cost - totals.actual_cost).settle(),
            })
            .collect()
    }

    /// Total savings, equal to the sum of the components.
    pub fn savings(&self) -> Cost {
        self.baseline_cost - self.actual_cost
    }

    /// Fractions of the total savings by cause, [`None`] when nothing was saved.
    #[must_use]
    pub fn shares(&self) -> Option<AttributionShares> {
        let savings = self.savings();
        if savings.is_negligible() {
            return None;
        }
        Some(AttributionShares {
            tariff_shift: self.tariff_shift / savings,
            solar_self_consumption: self.solar_self_consumption / savings,
            battery_arbitrage: self.battery_arbitrage / savings,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        battery::BatteryState,
        dispatch::{DispatchPlan, Optimizer},
        fixtures::{SLOT_WIDTH, at, example_schedule, forecast},
    };

    fn plan(rates: &[f64]) -> DispatchPlan {
        let slots = rates.iter().map(|rate| (1.0, 0.0, *rate)).collect::<Vec<_>>();
        let forecast = forecast(at(0, 0), &slots);
        Optimizer::builder().forecast(&forecast).battery(&BatteryState::NONE).solve().unwrap()
    }

    /// Whole day priced by the example schedule.
    fn scheduled_plan() -> DispatchPlan {
        let schedule = example_schedule();
        let rates =
            (0..96).map(|index| schedule.rate_at(at(0, 0) + SLOT_WIDTH * index).0).collect_vec();
        plan(&rates)
    }

    fn reading(index: i32, consumption: f64, solar: f64, grid_draw: f64) -> Reading {
        Reading {
            timestamp: at(0, 0) + SLOT_WIDTH * index,
            consumption: Quantity(consumption),
            solar: Quantity(solar),
            grid_draw: Quantity(grid_draw),
            battery_flow: Quantity(grid_draw + solar - consumption),
            rate: None,
        }
    }

    #[test]
    fn test_flat_consumption_has_no_savings() {
        let plan = plan(&[4.0, 12.0]);
        let readings = [reading(0, 2.0, 0.0, 2.0), reading(1, 2.0, 0.0, 2.0)];
        let attribution = SavingsAttribution::compute(&plan.decisions, &readings);
        assert_abs_diff_eq!(attribution.baseline_cost.0, 8.0);
        assert_abs_diff_eq!(attribution.actual_cost.0, 8.0);
        assert_eq!(attribution.tariff_shift, Cost::ZERO);
        assert_eq!(attribution.solar_self_consumption, Cost::ZERO);
        assert_eq!(attribution.battery_arbitrage, Cost::ZERO);
        assert_eq!(attribution.shares(), None);
        assert_eq!(attribution.solar_self_consumption_ratio, None);
    }

    #[test]
    fn test_decomposition() {
        let plan = plan(&[4.0, 12.0]);
        // Shifted towards the cheap slot, partly covered by solar, the rest from the battery:
        let readings = [reading(0, 3.0, 1.0, 1.0), reading(1, 1.0, 0.0, 0.0)];
        let attribution = SavingsAttribution::compute(&plan.decisions, &readings);
        assert_abs_diff_eq!(attribution.baseline_cost.0, 8.0);
        assert_abs_diff_eq!(attribution.actual_cost.0, 1.0);
        assert_abs_diff_eq!(attribution.tariff_shift.0, 2.0);
        assert_abs_diff_eq!(attribution.solar_self_consumption.0, 1.0);
        assert_abs_diff_eq!(attribution.battery_arbitrage.0, 4.0);
        assert_abs_diff_eq!(attribution.metered_battery_arbitrage.0, 4.0);
        assert_eq!(attribution.solar_self_consumption_ratio, Some(1.0));

        let shares = attribution.shares().unwrap();
        assert_abs_diff_eq!(shares.tariff_shift, 2.0 / 7.0);
        assert_abs_diff_eq!(shares.battery_arbitrage, 4.0 / 7.0);
    }

    #[test]
    fn test_partial_day_uses_day_average_rate() {
        let plan = scheduled_plan();
        let readings = (48..72).map(|index| reading(index, 1.0, 0.0, 1.0)).collect_vec();
        let attribution = SavingsAttribution::compute(&plan.decisions, &readings);
        assert_abs_diff_eq!(attribution.baseline_cost.0, 51.0);
        assert_abs_diff_eq!(attribution.actual_cost.0, 72.0);
        assert_abs_diff_eq!(attribution.tariff_shift.0, -21.0);
        assert_eq!(attribution.battery_arbitrage, Cost::ZERO);
    }

    #[test]
    fn test_unbalanced_readings_keep_the_sum() {
        let plan = plan(&[4.0, 12.0]);
        let mut readings = [reading(0, 2.0, 0.0, 2.0), reading(1, 2.0, 0.0, 2.0)];
        // Claims a discharge that the grid draw does not reflect:
        readings[1].battery_flow = Quantity(-1.0);
        let attribution = SavingsAttribution::compute(&plan.decisions, &readings);
        assert_eq!(attribution.battery_arbitrage, Cost::ZERO);
        assert_abs_diff_eq!(attribution.metered_battery_arbitrage.0, 0.25 * 12.0);
    }

    #[test]
    fn test_by_period() {
        let plan = scheduled_plan();
        // 05:00–07:00 at 1 kW, across the first period boundary:
        let readings = (20..28).map(|index| reading(index, 1.0, 0.0, 1.0)).collect_vec();
        let periods =
            SavingsAttribution::by_period(&plan.decisions, &readings, &example_schedule());
        assert_eq!(
            periods.iter().map(|period| period.label.as_str()).collect_vec(),
            ["Super Off-Peak", "Off-Peak", "Peak", "Mid-Peak"],
        );
        assert_abs_diff_eq!(periods[0].consumption.0, 1.0);
        assert_abs_diff_eq!(periods[0].actual_cost.0, 4.0);
        assert_abs_diff_eq!(periods[0].saving.0, 4.5);
        assert_abs_diff_eq!(periods[1].actual_cost.0, 8.0);
        assert_abs_diff_eq!(periods[1].saving.0, 0.5);
        assert_eq!(periods[2].consumption, KilowattHours::ZERO);
        assert_eq!(periods[3].saving, Cost::ZERO);

        let attribution = SavingsAttribution::compute(&plan.decisions, &readings);
        let saving = periods.iter().map(|period| period.saving).sum::<Cost>();
        assert_abs_diff_eq!(saving.0, attribution.savings().0);
    }

    #[test]
    fn test_realized_rate_overrides_planned() {
        let plan = plan(&[4.0, 4.0]);
        let mut readings = [reading(0, 1.0, 0.0, 1.0), reading(1, 1.0, 0.0, 1.0)];
        readings[1].rate = Some(Quantity(8.0));
        let attribution = SavingsAttribution::compute(&plan.decisions, &readings);
        assert_abs_diff_eq!(attribution.actual_cost.0, 0.25 * 4.0 + 0.25 * 8.0);
    }

    #[test]
    fn test_unmatched_readings_are_skipped() {
        let plan = plan(&[4.0]);
        let readings = [reading(0, 1.0, 0.0, 1.0), reading(5, 100.0, 0.0, 100.0)];
        let attribution = SavingsAttribution::compute(&plan.decisions, &readings);
        assert_abs_diff_eq!(attribution.actual_cost.0, 1.0);
    }

    #[test]
    fn test_no_readings() {
        let plan = plan(&[4.0]);
        let attribution = SavingsAttribution::compute(&plan.decisions, &[]);
        assert_eq!(attribution, SavingsAttribution::default());
    }

    proptest! {
        #[test]
        fn prop_components_sum_to_savings(
            rates in proptest::collection::vec(0.0..30.0, 1..24),
            values in proptest::collection::vec((0.0..5.0, 0.0..5.0, 0.0..8.0), 24),
        ) {
            let plan = plan(&rates);
            let readings = (0..)
                .zip(&values)
                .take(rates.len())
                .map(|(index, &(consumption, solar, grid_draw))| {
                    reading(index, consumption, solar, grid_draw)
                })
                .collect::<Vec<_>>();
            let attribution = SavingsAttribution::compute(&plan.decisions, &readings);
            let sum = attribution.tariff_shift
                + attribution.solar_self_consumption
                + attribution.battery_arbitrage;
            prop_assert!((sum.0 - attribution.savings().0).abs() <= 1e-9);
        }
    }
}
