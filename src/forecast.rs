//! Discretized consumption, production, and price forecasts.

mod adapter;
mod point;

use chrono::{NaiveDateTime, TimeDelta};

pub use self::{
    adapter::{ForecastAdapter, RawSample},
    point::{ForecastPoint, effective_confidence},
};
use crate::{
    interval::Interval,
    quantity::time::Hours,
    tariff::TariffSchedule,
};

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidForecastError {
    #[error("slot width must be positive")]
    NonPositiveSlotWidth,

    #[error("slot width {actual} does not match the configured {expected}")]
    SlotWidthMismatch { expected: TimeDelta, actual: TimeDelta },

    #[error("point #{index} is not after the previous one")]
    NotIncreasing { index: usize },

    #[error("point #{index} does not follow the previous one by exactly one slot")]
    NonUniform { index: usize },

    #[error("point #{index} has a non-finite value")]
    NonFinite { index: usize },

    #[error("the horizon of {n_slots} slots exceeds the maximum of {max_slots}")]
    HorizonTooLong { n_slots: usize, max_slots: usize },

    #[error("sample #{index} starts before the previous one ends")]
    UnorderedSamples { index: usize },

    #[error("sample #{index} has a non-positive duration")]
    EmptySample { index: usize },

    #[error("no sample covers {at}")]
    Gap { at: NaiveDateTime },

    #[error("no rate is known for {at}")]
    MissingRate { at: NaiveDateTime },
}

/// Ordered, time-contiguous sequence of uniform slots spanning the optimization horizon.
///
/// Invariant: strictly increasing timestamps spaced by exactly one slot width, no gaps.
#[must_use]
#[derive(Clone, Debug)]
pub struct Forecast {
    slot_width: TimeDelta,
    points: Vec<ForecastPoint>,
}

impl Forecast {
    pub const fn empty(slot_width: TimeDelta) -> Self {
        Self { slot_width, points: Vec::new() }
    }

    pub fn try_new(
        slot_width: TimeDelta,
        points: Vec<ForecastPoint>,
    ) -> Result<Self, InvalidForecastError> {
        if slot_width <= TimeDelta::zero() {
            return Err(InvalidForecastError::NonPositiveSlotWidth);
        }
        for (index, point) in points.iter().enumerate() {
            if !point.is_finite() {
                return Err(InvalidForecastError::NonFinite { index });
            }
            if index == 0 {
                continue;
            }
            let step = point.timestamp - points[index - 1].timestamp;
            if step <= TimeDelta::zero() {
                return Err(InvalidForecastError::NotIncreasing { index });
            }
            if step != slot_width {
                return Err(InvalidForecastError::NonUniform { index });
            }
        }
        Ok(Self { slot_width, points })
    }

    #[must_use]
    pub const fn slot_width(&self) -> TimeDelta {
        self.slot_width
    }

    pub fn slot_hours(&self) -> Hours {
        Hours::from(self.slot_width)
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[must_use]
    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn interval(&self, index: usize) -> Interval {
        Interval::starting_at(self.points[index].timestamp, self.slot_width)
    }

    /// Whole forecast span, [`None`] for an empty forecast.
    #[must_use]
    pub fn horizon(&self) -> Option<Interval> {
        let first = self.points.first()?;
        let last = self.points.last()?;
        Some(Interval::new(first.timestamp, last.timestamp + self.slot_width))
    }

    /// Re-price every slot with the time-weighted average rate of the schedule.
    pub fn with_tariff(mut self, schedule: &TariffSchedule) -> Self {
        for point in &mut self.points {
            point.tariff_rate =
                schedule.average_rate(point.timestamp, point.timestamp + self.slot_width);
        }
        self
    }

    /// Drop the slots that have fully elapsed by `now`.
    pub fn since(mut self, now: NaiveDateTime) -> Self {
        let slot_width = self.slot_width;
        self.points.retain(|point| point.timestamp + slot_width > now);
        self
    }
}
