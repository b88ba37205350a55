use std::fmt::{Debug, Formatter};

use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};

use crate::quantity::time::Hours;

/// Half-open wall-clock time interval.
#[must_use]
#[derive(Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Interval {
    /// Inclusive.
    pub start: NaiveDateTime,

    /// Exclusive.
    pub end: NaiveDateTime,
}

impl Debug for Interval {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}..{:?}", self.start, self.end)
    }
}

impl Interval {
    pub const fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    pub fn starting_at(start: NaiveDateTime, duration: TimeDelta) -> Self {
        Self { start, end: start + duration }
    }

    pub const fn with_start(mut self, start: NaiveDateTime) -> Self {
        self.start = start;
        self
    }

    pub const fn with_end(mut self, end: NaiveDateTime) -> Self {
        self.end = end;
        self
    }

    #[must_use]
    pub fn duration(self) -> TimeDelta {
        self.end - self.start
    }

    pub fn hours(self) -> Hours {
        Hours::from(self.duration())
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.end <= self.start
    }

    #[must_use]
    pub fn contains(self, other: NaiveDateTime) -> bool {
        (self.start <= other) && (other < self.end)
    }

    /// Overlap of the two intervals, if any.
    #[must_use]
    pub fn intersection(self, other: Self) -> Option<Self> {
        let intersection =
            Self { start: self.start.max(other.start), end: self.end.min(other.end) };
        (!intersection.is_empty()).then_some(intersection)
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn at(hour: u32, minute: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap().and_hms_opt(hour, minute, 0).unwrap()
    }

    #[test]
    fn test_contains() {
        let interval = Interval::new(at(6, 0), at(12, 0));
        assert!(interval.contains(at(6, 0)));
        assert!(interval.contains(at(11, 59)));
        assert!(!interval.contains(at(12, 0)));
    }

    #[test]
    fn test_intersection() {
        let lhs = Interval::new(at(6, 0), at(12, 0));
        assert_eq!(
            lhs.intersection(Interval::new(at(11, 0), at(13, 0))),
            Some(Interval::new(at(11, 0), at(12, 0))),
        );
        assert_eq!(lhs.intersection(Interval::new(at(12, 0), at(13, 0))), None);
    }

    #[test]
    fn test_hours() {
        assert_eq!(Interval::new(at(6, 0), at(6, 15)).hours(), Hours::from(0.25));
    }
}
