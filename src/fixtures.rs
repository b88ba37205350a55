//! Shared test fixtures.

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};

use crate::{
    battery::BatteryState,
    dispatch::Optimizer,
    forecast::{Forecast, ForecastPoint},
    plan::Plan,
    quantity::Quantity,
    scheduler::{Appliance, Scheduler},
    tariff::{TariffPeriod, TariffSchedule},
};

pub const SLOT_WIDTH: TimeDelta = TimeDelta::minutes(15);

pub fn at(hour: u32, minute: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(hour, minute, 0).unwrap()
}

/// Four six-hour periods: 4, 8, 12, and 10 per kilowatt-hour.
pub fn example_schedule() -> TariffSchedule {
    TariffSchedule::try_new(vec![
        TariffPeriod::new(0, 360, 4.0, "Super Off-Peak"),
        TariffPeriod::new(360, 720, 8.0, "Off-Peak"),
        TariffPeriod::new(720, 1080, 12.0, "Peak"),
        TariffPeriod::new(1080, 1440, 10.0, "Mid-Peak"),
    ])
    .unwrap()
}

/// Forecast with the same values in every 15-minute slot.
pub fn flat_forecast(
    start: NaiveDateTime,
    n_slots: usize,
    consumption: f64,
    solar: f64,
    rate: f64,
) -> Forecast {
    forecast(start, &vec![(consumption, solar, rate); n_slots])
}

/// Forecast from `(consumption, solar, rate)` triples of consecutive 15-minute slots.
pub fn forecast(start: NaiveDateTime, slots: &[(f64, f64, f64)]) -> Forecast {
    let points = (0..)
        .zip(slots)
        .map(|(index, &(consumption, solar, rate))| ForecastPoint {
            timestamp: start + SLOT_WIDTH * index,
            consumption: Quantity(consumption),
            solar: Quantity(solar),
            tariff_rate: Quantity(rate),
            confidence: None,
        })
        .collect();
    Forecast::try_new(SLOT_WIDTH, points).unwrap()
}

/// 10 kWh battery at half charge with 5 kW limits and 90% round-trip efficiency.
pub fn home_battery() -> BatteryState {
    BatteryState {
        capacity: Quantity(10.0),
        min_soc: Quantity(1.0),
        max_soc: Quantity(10.0),
        max_charge: Quantity(5.0),
        max_discharge: Quantity(5.0),
        round_trip_efficiency: 0.9,
        current_soc: Quantity(5.0),
    }
}

/// Plan of the forecast without a battery, with the appliances scheduled and no feed-in.
pub fn plan(forecast: &Forecast, appliances: Vec<Appliance>) -> Plan {
    let dispatch =
        Optimizer::builder().forecast(forecast).battery(&BatteryState::NONE).solve().unwrap();
    let schedule = Scheduler::builder().dispatch(&dispatch).appliances(&appliances).schedule();
    Plan::new(1, SLOT_WIDTH, dispatch, schedule, appliances, Quantity::ZERO)
}
