//! Time-of-use tariff schedules and rate lookups.

mod period;
mod schedule;
mod sub_periods;

pub use self::{
    period::{MINUTES_PER_DAY, TariffPeriod},
    schedule::{InvalidScheduleError, TariffSchedule},
    sub_periods::{SubPeriod, SubPeriods},
};
