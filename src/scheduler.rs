//! Placement of appliance runs into low-cost windows on top of the dispatch plan.

mod appliance;
mod slot_budget;

use bon::{Builder, builder};
use chrono::NaiveDateTime;
use itertools::Itertools;
use serde::Serialize;

pub use self::appliance::{Appliance, InvalidApplianceError};
use self::slot_budget::SlotBudget;
use crate::{
    dispatch::DispatchPlan,
    prelude::*,
    quantity::{cost::Cost, power::Kilowatts, rate::KilowattHourRate},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum UnschedulableReason {
    /// The window does not fit into the horizon.
    #[error("no window")]
    NoWindow,

    /// Every start within the window violates the capacity ceiling.
    #[error("capacity")]
    Capacity,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, thiserror::Error)]
#[error("appliance `{appliance_id}` cannot be scheduled: {reason}")]
pub struct UnschedulableError {
    pub appliance_id: String,
    pub reason: UnschedulableReason,
}

/// Chosen start of a deferrable appliance.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScheduleAssignment {
    pub appliance_id: String,
    pub start_slot: usize,
    pub start: NaiveDateTime,

    /// Marginal cost of the run on top of the dispatch plan.
    pub expected_cost: Cost,

    /// Cost avoided compared to starting at the earliest allowed slot.
    pub saving: Cost,
}

#[must_use]
#[derive(Clone, Debug, Default)]
pub struct ScheduleOutcome {
    pub assignments: Vec<ScheduleAssignment>,
    pub failures: Vec<UnschedulableError>,

    /// Cost of the fixed appliances.
    pub fixed_cost: Cost,
}

impl ScheduleOutcome {
    /// Total cost of all the placed appliances.
    pub fn appliance_cost(&self) -> Cost {
        self.fixed_cost
            + self.assignments.iter().map(|assignment| assignment.expected_cost).sum::<Cost>()
    }
}

/// Costs within this tolerance are considered equal.
const COST_TOLERANCE: f64 = 1e-9;

/// Greedy appliance scheduler: tightest window first, cheapest start, earliest on a tie.
#[derive(Builder)]
#[builder(finish_fn(vis = ""))]
pub struct Scheduler<'a> {
    dispatch: &'a DispatchPlan,
    appliances: &'a [Appliance],

    /// Maximum simultaneous appliance power per slot.
    capacity_ceiling: Option<Kilowatts>,

    #[builder(default = KilowattHourRate::ZERO)]
    feed_in_rate: KilowattHourRate,
}

impl<S: scheduler_builder::IsComplete> SchedulerBuilder<'_, S> {
    pub fn schedule(self) -> ScheduleOutcome {
        self.build().schedule()
    }
}

impl Scheduler<'_> {
    #[instrument(
        skip_all,
        name = "Scheduling the appliances…",
        fields(n_appliances = self.appliances.len(), n_slots = self.dispatch.decisions.len()),
    )]
    fn schedule(self) -> ScheduleOutcome {
        let mut budget = SlotBudget::new(self.dispatch, self.feed_in_rate);
        let mut outcome = ScheduleOutcome::default();

        for appliance in self.appliances.iter().filter(|appliance| !appliance.deferrable) {
            let end = appliance
                .end_slot(appliance.earliest_start)
                .unwrap_or(usize::MAX)
                .min(budget.len());
            let range = appliance.earliest_start.min(end)..end;
            if !budget.fits(range.clone(), appliance.power, self.capacity_ceiling) {
                warn!(id = %appliance.id, "fixed appliance exceeds the capacity ceiling");
            }
            outcome.fixed_cost += budget.commit(range, appliance.power);
        }

        let deferrable = self
            .appliances
            .iter()
            .filter(|appliance| appliance.deferrable)
            .sorted_by(|lhs, rhs| {
                lhs.tightness().cmp(&rhs.tightness()).then_with(|| lhs.id.cmp(&rhs.id))
            });
        for appliance in deferrable {
            match self.place(&budget, appliance) {
                Ok(start_slot) => {
                    let duration = appliance.duration_slots;
                    let earliest = appliance.earliest_start;
                    let earliest_cost =
                        budget.marginal_cost(earliest..earliest + duration, appliance.power);
                    let expected_cost =
                        budget.commit(start_slot..start_slot + duration, appliance.power);
                    let saving = (earliest_cost - expected_cost).settle();
                    debug!(id = %appliance.id, start_slot, %expected_cost, %saving, "placed");
                    outcome.assignments.push(ScheduleAssignment {
                        appliance_id: appliance.id.clone(),
                        start_slot,
                        start: self.dispatch.decisions[start_slot].interval.start,
                        expected_cost,
                        saving,
                    });
                }
                Err(reason) => {
                    warn!(id = %appliance.id, %reason, "unschedulable");
                    outcome
                        .failures
                        .push(UnschedulableError { appliance_id: appliance.id.clone(), reason });
                }
            }
        }

        info!(
            n_assigned = outcome.assignments.len(),
            n_failed = outcome.failures.len(),
            cost = %outcome.appliance_cost(),
            peak_load = %budget.peak_load(0..budget.len()),
            "scheduled",
        );
        outcome
    }

    /// Cheapest feasible start slot of the appliance.
    fn place(
        &self,
        budget: &SlotBudget,
        appliance: &Appliance,
    ) -> Result<usize, UnschedulableReason> {
        let duration = appliance.duration_slots;
        if duration == 0 || duration > budget.len() {
            return Err(UnschedulableReason::NoWindow);
        }
        let last_start = appliance.latest_start.min(budget.len() - duration);
        if appliance.earliest_start > last_start {
            return Err(UnschedulableReason::NoWindow);
        }

        let mut best: Option<(usize, Cost)> = None;
        for start in appliance.earliest_start..=last_start {
            let range = start..start + duration;
            if !budget.fits(range.clone(), appliance.power, self.capacity_ceiling) {
                continue;
            }
            let cost = budget.marginal_cost(range, appliance.power);
            trace!(id = %appliance.id, start, %cost);
            if best.is_none_or(|(_, best_cost)| cost.0 < best_cost.0 - COST_TOLERANCE) {
                best = Some((start, cost));
            }
        }
        best.map(|(start, _)| start).ok_or(UnschedulableReason::Capacity)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use proptest::prelude::*;

    use super::*;
    use crate::{
        battery::BatteryState,
        dispatch::Optimizer,
        fixtures::{at, forecast},
        quantity::Quantity,
    };

    fn dispatch(slots: &[(f64, f64, f64)]) -> DispatchPlan {
        let forecast = forecast(at(4, 0), slots);
        Optimizer::builder().forecast(&forecast).battery(&BatteryState::NONE).solve().unwrap()
    }

    fn appliance(id: &str, power: f64, duration: usize, window: (usize, usize)) -> Appliance {
        Appliance {
            id: id.to_owned(),
            power: Quantity(power),
            duration_slots: duration,
            earliest_start: window.0,
            latest_start: window.1,
            deferrable: true,
        }
    }

    fn cheap_then_expensive() -> DispatchPlan {
        let mut slots = vec![(1.0, 0.0, 4.0); 8];
        slots.extend(vec![(1.0, 0.0, 12.0); 8]);
        dispatch(&slots)
    }

    #[test]
    fn test_placed_into_cheap_period() {
        let dispatch = cheap_then_expensive();
        let appliances = [appliance("washer", 1.0, 2, (5, 14))];
        let outcome = Scheduler::builder()
            .dispatch(&dispatch)
            .appliances(&appliances)
            .schedule();
        assert!(outcome.failures.is_empty());
        let assignment = &outcome.assignments[0];
        assert_eq!(assignment.start_slot, 5);
        assert_eq!(assignment.start, at(5, 15));
        assert_abs_diff_eq!(assignment.expected_cost.0, 2.0);
        assert_eq!(assignment.saving, Cost::ZERO);
    }

    #[test]
    fn test_prefers_later_cheaper_start() {
        let dispatch = dispatch(&[(1.0, 0.0, 12.0), (1.0, 0.0, 12.0), (1.0, 0.0, 4.0)]);
        let appliances = [appliance("boiler", 2.0, 1, (0, 2))];
        let outcome = Scheduler::builder()
            .dispatch(&dispatch)
            .appliances(&appliances)
            .schedule();
        assert_eq!(outcome.assignments[0].start_slot, 2);
        assert_abs_diff_eq!(outcome.assignments[0].expected_cost.0, 2.0 * 0.25 * 4.0);
        assert_abs_diff_eq!(outcome.assignments[0].saving.0, 2.0 * 0.25 * (12.0 - 4.0));
    }

    #[test]
    fn test_window_is_clipped_to_horizon() {
        let dispatch = cheap_then_expensive();
        let appliances = [appliance("dryer", 1.0, 4, (10, 40))];
        let outcome = Scheduler::builder()
            .dispatch(&dispatch)
            .appliances(&appliances)
            .schedule();
        assert_eq!(outcome.assignments[0].start_slot, 10);
    }

    #[test]
    fn test_no_window() {
        let dispatch = cheap_then_expensive();
        let appliances = [
            appliance("late", 1.0, 2, (15, 15)),
            appliance("inverted", 1.0, 1, (6, 3)),
            appliance("instant", 1.0, 0, (0, 15)),
        ];
        let outcome = Scheduler::builder()
            .dispatch(&dispatch)
            .appliances(&appliances)
            .schedule();
        assert!(outcome.assignments.is_empty());
        assert!(
            outcome
                .failures
                .iter()
                .all(|failure| failure.reason == UnschedulableReason::NoWindow)
        );
        assert_eq!(outcome.failures.len(), 3);
    }

    #[test]
    fn test_capacity_failure_does_not_block_others() {
        let dispatch = cheap_then_expensive();
        let appliances = [
            appliance("oven", 3.0, 4, (0, 0)),
            appliance("heat-pump", 2.0, 2, (0, 2)),
            appliance("kettle", 1.0, 1, (0, 8)),
        ];
        let outcome = Scheduler::builder()
            .dispatch(&dispatch)
            .appliances(&appliances)
            .capacity_ceiling(Quantity(4.0))
            .schedule();
        assert_eq!(
            outcome.failures,
            [UnschedulableError {
                appliance_id: "heat-pump".to_owned(),
                reason: UnschedulableReason::Capacity,
            }],
        );
        let placed = outcome
            .assignments
            .iter()
            .map(|assignment| (assignment.appliance_id.as_str(), assignment.start_slot))
            .collect_vec();
        assert_eq!(placed, [("oven", 0), ("kettle", 0)]);
    }

    #[test]
    fn test_fixed_appliance() {
        let dispatch = cheap_then_expensive();
        let mut fridge = appliance("fridge", 2.0, 2, (8, 8));
        fridge.deferrable = false;
        let appliances = [fridge, appliance("kettle", 3.0, 1, (7, 9))];
        let outcome = Scheduler::builder()
            .dispatch(&dispatch)
            .appliances(&appliances)
            .capacity_ceiling(Quantity(4.0))
            .schedule();
        assert_abs_diff_eq!(outcome.fixed_cost.0, 2.0 * 0.25 * 12.0 * 2.0);
        assert_eq!(outcome.assignments.len(), 1);
        assert_eq!(outcome.assignments[0].appliance_id, "kettle");
        assert_eq!(outcome.assignments[0].start_slot, 7);
    }

    #[test]
    fn test_fixed_appliance_beyond_horizon() {
        let dispatch = cheap_then_expensive();
        let mut far = appliance("far", 1.0, 2, (usize::MAX, usize::MAX));
        far.deferrable = false;
        let appliances = [far, appliance("kettle", 1.0, 1, (0, 8))];
        let outcome = Scheduler::builder()
            .dispatch(&dispatch)
            .appliances(&appliances)
            .schedule();
        assert_eq!(outcome.fixed_cost, Cost::ZERO);
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.assignments.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_capacity_ceiling_holds(
            specs in proptest::collection::vec(
                (0.5..3.0, 1_usize..4, 0_usize..12, 0_usize..6),
                1..8,
            ),
        ) {
            let dispatch = dispatch(&vec![(1.0, 0.0, 8.0); 16]);
            let appliances = specs
                .iter()
                .enumerate()
                .map(|(index, &(power, duration, earliest, width))| {
                    appliance(&format!("#{index}"), power, duration, (earliest, earliest + width))
                })
                .collect_vec();
            let ceiling = 4.0;
            let outcome = Scheduler::builder()
                .dispatch(&dispatch)
                .appliances(&appliances)
                .capacity_ceiling(Quantity(ceiling))
                .schedule();

            prop_assert_eq!(outcome.assignments.len() + outcome.failures.len(), appliances.len());
            let mut loads = [0.0; 16];
            for assignment in &outcome.assignments {
                let appliance = appliances
                    .iter()
                    .find(|appliance| appliance.id == assignment.appliance_id)
                    .unwrap();
                prop_assert!(assignment.start_slot >= appliance.earliest_start);
                prop_assert!(assignment.start_slot <= appliance.latest_start);
                for load in &mut loads[assignment.start_slot..][..appliance.duration_slots] {
                    *load += appliance.power.0;
                }
            }
            for load in loads {
                prop_assert!(load <= ceiling + 1e-9);
            }
        }
    }
}
