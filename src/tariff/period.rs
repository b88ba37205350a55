use serde::{Deserialize, Serialize};

use crate::quantity::rate::KilowattHourRate;

pub const MINUTES_PER_DAY: u16 = 1440;

/// Daily recurring tariff period.
///
/// Offsets are minutes since midnight. A period whose start is after its end wraps around
/// midnight, for example `22:00–06:00` is `{ start_offset: 1320, end_offset: 360 }`.
/// The end offset may be `1440` to denote the end of the day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TariffPeriod {
    pub start_offset: u16,
    pub end_offset: u16,
    pub rate: KilowattHourRate,
    pub label: String,
}

impl TariffPeriod {
    pub fn new(start_offset: u16, end_offset: u16, rate: f64, label: impl Into<String>) -> Self {
        Self { start_offset, end_offset, rate: KilowattHourRate::from(rate), label: label.into() }
    }

    #[must_use]
    pub const fn wraps_midnight(&self) -> bool {
        self.start_offset > self.end_offset
    }

    /// Non-wrapping `[start, end)` minute ranges this period occupies within a day.
    pub(super) fn minute_ranges(&self) -> impl Iterator<Item = (u16, u16)> {
        let ranges = if self.wraps_midnight() {
            [(self.start_offset, MINUTES_PER_DAY), (0, self.end_offset)]
        } else {
            [(self.start_offset, self.end_offset), (0, 0)]
        };
        ranges.into_iter().filter(|(start, end)| start < end)
    }

    /// Total length of the period within a day, in minutes.
    #[must_use]
    pub fn minutes(&self) -> u16 {
        self.minute_ranges().map(|(start, end)| end - start).sum()
    }
}
