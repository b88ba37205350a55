use std::ptr;

use chrono::{NaiveDateTime, TimeDelta, Timelike};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{
    interval::Interval,
    prelude::*,
    quantity::{Quantity, rate::KilowattHourRate},
    tariff::{MINUTES_PER_DAY, SubPeriods, TariffPeriod},
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidScheduleError {
    #[error("the schedule has no periods")]
    Empty,

    #[error("period #{index} has an offset outside of the day")]
    OutOfRange { index: usize },

    #[error("period #{index} is empty")]
    EmptyPeriod { index: usize },

    #[error("period #{index} has a non-finite rate")]
    NonFiniteRate { index: usize },

    #[error("periods overlap at minute {minute}")]
    Overlap { minute: u16 },

    #[error("minute {minute} is not covered by any period")]
    Gap { minute: u16 },
}

/// Contiguous non-wrapping part of a period.
#[derive(Copy, Clone, Debug)]
pub(super) struct Segment {
    pub start: u16,
    pub end: u16,
    pub period_index: usize,
}

/// Validated tariff schedule that partitions the day.
///
/// Validation happens once in [`TariffSchedule::try_new`], hence lookups never fail.
/// The schedule is immutable: a new schedule replaces the old one wholesale.
#[derive(Clone, Debug, Serialize)]
#[serde(into = "Vec<TariffPeriod>")]
pub struct TariffSchedule {
    periods: Vec<TariffPeriod>,

    /// Wrapping periods are split in two at midnight, sorted by start.
    segments: Vec<Segment>,
}

impl From<TariffSchedule> for Vec<TariffPeriod> {
    fn from(schedule: TariffSchedule) -> Self {
        schedule.periods
    }
}

impl<'de> Deserialize<'de> for TariffSchedule {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let periods = Vec::<TariffPeriod>::deserialize(deserializer)?;
        Self::try_new(periods).map_err(serde::de::Error::custom)
    }
}

impl TariffSchedule {
    /// Validate that the periods partition `[0, 1440)` exactly once.
    #[instrument(skip_all, fields(n_periods = periods.len()))]
    pub fn try_new(periods: Vec<TariffPeriod>) -> Result<Self, InvalidScheduleError> {
        if periods.is_empty() {
            return Err(InvalidScheduleError::Empty);
        }
        for (index, period) in periods.iter().enumerate() {
            if period.start_offset >= MINUTES_PER_DAY || period.end_offset > MINUTES_PER_DAY {
                return Err(InvalidScheduleError::OutOfRange { index });
            }
            if !period.rate.is_finite() {
                return Err(InvalidScheduleError::NonFiniteRate { index });
            }
            if period.minutes() == 0 {
                return Err(InvalidScheduleError::EmptyPeriod { index });
            }
        }

        let segments = periods
            .iter()
            .enumerate()
            .flat_map(|(period_index, period)| {
                period.minute_ranges().map(move |(start, end)| Segment { start, end, period_index })
            })
            .sorted_by_key(|segment| (segment.start, segment.end))
            .collect_vec();

        let mut covered_until = 0;
        for segment in &segments {
            if segment.start < covered_until {
                return Err(InvalidScheduleError::Overlap { minute: segment.start });
            }
            if segment.start > covered_until {
                return Err(InvalidScheduleError::Gap { minute: covered_until });
            }
            covered_until = segment.end;
        }
        if covered_until != MINUTES_PER_DAY {
            return Err(InvalidScheduleError::Gap { minute: covered_until });
        }

        debug!(n_segments = segments.len(), "validated the tariff schedule");
        Ok(Self { periods, segments })
    }

    #[must_use]
    pub fn periods(&self) -> &[TariffPeriod] {
        &self.periods
    }

    /// Period active at the given wall-clock time.
    #[must_use]
    pub fn period_at(&self, timestamp: NaiveDateTime) -> &TariffPeriod {
        let segment = self.segment_at(minute_of_day(timestamp));
        &self.periods[segment.period_index]
    }

    /// Rate active at the given wall-clock time.
    pub fn rate_at(&self, timestamp: NaiveDateTime) -> KilowattHourRate {
        self.period_at(timestamp).rate
    }

    /// Sub-periods with their durations covering `[start, end)`.
    ///
    /// The returned iterator is lazy, finite, and may be cloned to restart it.
    pub fn periods_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> SubPeriods<'_> {
        SubPeriods::new(self, Interval::new(start, end))
    }

    /// Time-weighted average rate over `[start, end)`.
    ///
    /// For an empty interval, this is the rate at `start`.
    pub fn average_rate(&self, start: NaiveDateTime, end: NaiveDateTime) -> KilowattHourRate {
        if end <= start {
            return self.rate_at(start);
        }
        let total_seconds = (end - start).as_seconds_f64();
        let weighted: f64 = self
            .periods_between(start, end)
            .map(|sub_period| sub_period.period.rate.0 * sub_period.duration().as_seconds_f64())
            .sum();
        Quantity(weighted / total_seconds)
    }

    /// Time-weighted average rate over the whole day.
    pub fn day_average_rate(&self) -> KilowattHourRate {
        let weighted: f64 =
            self.periods.iter().map(|period| period.rate.0 * f64::from(period.minutes())).sum();
        Quantity(weighted / f64::from(MINUTES_PER_DAY))
    }

    /// Next instant at which another period becomes active, along with that period.
    ///
    /// [`None`] for a single-period schedule.
    #[must_use]
    pub fn next_change(&self, timestamp: NaiveDateTime) -> Option<(NaiveDateTime, &TariffPeriod)> {
        let current = self.period_at(timestamp);
        let horizon =
            timestamp.checked_add_signed(TimeDelta::days(1)).unwrap_or(NaiveDateTime::MAX);
        self.periods_between(timestamp, horizon)
            .find(|sub_period| !ptr::eq(sub_period.period, current))
            .map(|sub_period| (sub_period.interval.start, sub_period.period))
    }

    /// Segment containing the given minute of the day.
    pub(super) fn segment_at(&self, minute: u16) -> &Segment {
        debug_assert!(minute < MINUTES_PER_DAY);
        let index = self.segments.partition_point(|segment| segment.end <= minute);
        &self.segments[index]
    }
}

#[expect(clippy::cast_possible_truncation)]
pub(super) fn minute_of_day(timestamp: NaiveDateTime) -> u16 {
    (timestamp.hour() * 60 + timestamp.minute()) as u16
}
