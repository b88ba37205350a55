use std::iter::FusedIterator;

use chrono::{NaiveDateTime, TimeDelta};

use crate::{
    interval::Interval,
    tariff::{
        TariffPeriod,
        TariffSchedule,
        schedule::{Segment, minute_of_day},
    },
};

/// Part of a tariff period that falls into the requested interval.
#[derive(Copy, Clone, Debug)]
pub struct SubPeriod<'a> {
    pub interval: Interval,
    pub period: &'a TariffPeriod,
}

impl SubPeriod<'_> {
    #[must_use]
    pub fn duration(&self) -> TimeDelta {
        self.interval.duration()
    }
}

/// Lazy walk over the tariff periods covering an interval.
///
/// Cloning the iterator restarts the walk from the clone point.
#[must_use]
#[derive(Clone)]
pub struct SubPeriods<'a> {
    schedule: &'a TariffSchedule,
    cursor: NaiveDateTime,
    end: NaiveDateTime,
}

impl<'a> SubPeriods<'a> {
    pub(super) const fn new(schedule: &'a TariffSchedule, interval: Interval) -> Self {
        Self { schedule, cursor: interval.start, end: interval.end }
    }

    /// Wall-clock end of the segment on the cursor's calendar day.
    fn segment_end(&self, segment: &Segment) -> NaiveDateTime {
        let midnight = self.cursor.date().and_time(chrono::NaiveTime::MIN);
        midnight + TimeDelta::minutes(i64::from(segment.end))
    }
}

impl<'a> Iterator for SubPeriods<'a> {
    type Item = SubPeriod<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.end {
            return None;
        }
        let segment = self.schedule.segment_at(minute_of_day(self.cursor));
        let end = self.segment_end(segment).min(self.end);
        let sub_period = SubPeriod {
            interval: Interval::new(self.cursor, end),
            period: &self.schedule.periods()[segment.period_index],
        };
        self.cursor = end;
        Some(sub_period)
    }
}

impl FusedIterator for SubPeriods<'_> {}
