use std::sync::Arc;

use crate::{
    battery::BatteryState,
    dispatch::{InfeasibleHorizonError, Optimizer},
    forecast::Forecast,
    plan::Plan,
    prelude::*,
    scheduler::{Appliance, Scheduler},
    settings::Settings,
    tariff::TariffSchedule,
};

/// Fully resolved inputs of a recomputation.
#[derive(Clone)]
pub struct Inputs {
    pub schedule: Option<Arc<TariffSchedule>>,

    /// Already priced by the schedule, when one is installed.
    pub forecast: Arc<Forecast>,

    pub battery: BatteryState,
    pub appliances: Arc<[Appliance]>,
}

impl Inputs {
    pub fn new(settings: &Settings) -> Self {
        Self {
            schedule: None,
            forecast: Arc::new(Forecast::empty(settings.slot_width())),
            battery: BatteryState::NONE,
            appliances: Arc::from([]),
        }
    }
}

/// Single unit of work: dispatch, then appliances on top of it.
#[instrument(skip_all, name = "Recomputing…", fields(forecast_version = forecast_version))]
pub fn recompute(
    settings: &Settings,
    inputs: &Inputs,
    forecast_version: u64,
) -> Result<Plan, InfeasibleHorizonError> {
    let dispatch = Optimizer::builder()
        .forecast(&inputs.forecast)
        .battery(&inputs.battery)
        .soc_step_percent(settings.soc_step_percent)
        .feed_in_rate(settings.feed_in_rate())
        .solve()?;
    let schedule = Scheduler::builder()
        .dispatch(&dispatch)
        .appliances(&inputs.appliances)
        .maybe_capacity_ceiling(settings.capacity_ceiling)
        .feed_in_rate(settings.feed_in_rate())
        .schedule();
    Ok(Plan::new(
        forecast_version,
        inputs.forecast.slot_width(),
        dispatch,
        schedule,
        inputs.appliances.to_vec(),
        settings.feed_in_rate(),
    ))
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::fixtures::{at, flat_forecast, home_battery};

    #[test]
    fn test_recompute() {
        let settings = Settings::default();
        let mut inputs = Inputs::new(&settings);
        inputs.forecast = Arc::new(flat_forecast(at(0, 0), 4, 2.0, 0.0, 4.0));
        inputs.battery = home_battery();
        let plan = recompute(&settings, &inputs, 7).unwrap();
        assert_eq!(plan.forecast_version, 7);
        assert_eq!(plan.dispatch.len(), 4);
        assert!(plan.total_cost <= plan.baseline_cost);
    }

    #[test]
    fn test_empty_inputs() {
        let settings = Settings::default();
        let plan = recompute(&settings, &Inputs::new(&settings), 0).unwrap();
        assert!(plan.is_empty());
        assert_abs_diff_eq!(plan.total_cost.0, 0.0);
    }
}
