use chrono::{DateTime, Local, TimeDelta};
use serde::Serialize;
use serde_with::{DurationSeconds, serde_as};

use crate::{
    dispatch::{DispatchDecision, DispatchPlan},
    quantity::{cost::Cost, rate::KilowattHourRate},
    scheduler::{Appliance, ScheduleAssignment, ScheduleOutcome, UnschedulableError},
};

/// Immutable result of a single recomputation.
///
/// Consumers only ever see it behind an [`std::sync::Arc`], it is never mutated after publication.
#[must_use]
#[serde_as]
#[derive(Clone, Debug, Serialize)]
pub struct Plan {
    /// Version of the forecast the plan was computed from, zero for the initial empty plan.
    pub forecast_version: u64,

    #[serde_as(as = "DurationSeconds<i64>")]
    #[serde(rename = "slot_width_secs")]
    pub slot_width: TimeDelta,

    pub dispatch: Vec<DispatchDecision>,
    pub assignments: Vec<ScheduleAssignment>,
    pub failures: Vec<UnschedulableError>,

    /// Appliances the plan was scheduled for.
    pub appliances: Vec<Appliance>,

    pub feed_in_rate: KilowattHourRate,

    /// Dispatch cost plus the cost of all the placed appliances.
    pub total_cost: Cost,

    /// Same as the total cost but with the battery left idle.
    pub baseline_cost: Cost,

    pub generated_at: DateTime<Local>,
}

impl Plan {
    pub fn empty(slot_width: TimeDelta) -> Self {
        Self {
            forecast_version: 0,
            slot_width,
            dispatch: Vec::new(),
            assignments: Vec::new(),
            failures: Vec::new(),
            appliances: Vec::new(),
            feed_in_rate: KilowattHourRate::ZERO,
            total_cost: Cost::ZERO,
            baseline_cost: Cost::ZERO,
            generated_at: Local::now(),
        }
    }

    pub fn new(
        forecast_version: u64,
        slot_width: TimeDelta,
        dispatch: DispatchPlan,
        schedule: ScheduleOutcome,
        appliances: Vec<Appliance>,
        feed_in_rate: KilowattHourRate,
    ) -> Self {
        let appliance_cost = schedule.appliance_cost();
        Self {
            forecast_version,
            slot_width,
            total_cost: dispatch.total_cost + appliance_cost,
            baseline_cost: dispatch.baseline_cost + appliance_cost,
            dispatch: dispatch.decisions,
            assignments: schedule.assignments,
            failures: schedule.failures,
            appliances,
            feed_in_rate,
            generated_at: Local::now(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dispatch.is_empty()
    }

    /// Savings brought by the battery.
    pub fn battery_savings(&self) -> Cost {
        self.baseline_cost - self.total_cost
    }

    /// Assignment of the appliance, [`None`] when it is fixed or not scheduled.
    #[must_use]
    pub fn assignment(&self, appliance_id: &str) -> Option<&ScheduleAssignment> {
        self.assignments.iter().find(|assignment| assignment.appliance_id == appliance_id)
    }
}
