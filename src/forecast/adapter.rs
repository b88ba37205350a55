use bon::Builder;
use chrono::{NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

use crate::{
    forecast::{Forecast, ForecastPoint, InvalidForecastError},
    interval::Interval,
    prelude::*,
    quantity::{Quantity, power::Kilowatts, rate::KilowattHourRate},
    tariff::TariffSchedule,
};

/// Externally supplied forecast value over an arbitrary time span.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    pub start: NaiveDateTime,

    #[serde_as(as = "DurationSeconds<i64>")]
    #[serde(rename = "duration_secs")]
    pub duration: TimeDelta,

    #[serde(rename = "consumption_kw")]
    pub consumption: Kilowatts,

    #[serde(rename = "solar_kw", default)]
    pub solar: Kilowatts,

    #[serde(default)]
    pub rate: Option<KilowattHourRate>,

    #[serde(default)]
    pub confidence: Option<f64>,
}

impl RawSample {
    pub fn interval(&self) -> Interval {
        Interval::starting_at(self.start, self.duration)
    }

    const fn is_finite(&self) -> bool {
        self.consumption.is_finite()
            && self.solar.is_finite()
            && match self.rate {
                Some(rate) => rate.is_finite(),
                None => true,
            }
    }
}

/// Normalizes raw forecast samples into the uniform slot grid of the engine.
///
/// Slot boundaries are multiples of the slot width since midnight, so a leading partial slot
/// is dropped just like a trailing one. This is not a forecasting model: the values are
/// resampled, never predicted.
#[derive(Builder)]
pub struct ForecastAdapter<'a> {
    slot_width: TimeDelta,

    /// Longest accepted horizon, the rest is truncated.
    max_slots: usize,

    /// Authoritative source of slot rates, when installed.
    schedule: Option<&'a TariffSchedule>,
}

/// Time-weighted accumulator of the samples overlapping a single slot.
#[derive(Default)]
struct SlotAccumulator {
    covered_seconds: f64,
    consumption: f64,
    solar: f64,
    rate: f64,
    has_missing_rate: bool,
    confidence: Option<f64>,
}

impl SlotAccumulator {
    fn add(&mut self, sample: &RawSample, overlap: Interval) {
        let seconds = overlap.duration().as_seconds_f64();
        self.covered_seconds += seconds;
        self.consumption += sample.consumption.0 * seconds;
        self.solar += sample.solar.0 * seconds;
        match sample.rate {
            Some(rate) => self.rate += rate.0 * seconds,
            None => self.has_missing_rate = true,
        }
        if let Some(confidence) = sample.confidence {
            self.confidence =
                Some(self.confidence.map_or(confidence, |current| current.min(confidence)));
        }
    }
}

impl ForecastAdapter<'_> {
    #[instrument(skip_all, fields(n_samples = samples.len(), slot_width = ?self.slot_width))]
    pub fn normalize(&self, samples: &[RawSample]) -> Result<Forecast, InvalidForecastError> {
        if self.slot_width <= TimeDelta::zero() {
            return Err(InvalidForecastError::NonPositiveSlotWidth);
        }
        Self::validate_samples(samples)?;
        let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
            return Ok(Forecast::empty(self.slot_width));
        };

        let origin = align_up(first.start, self.slot_width);
        if origin != first.start {
            debug!(%origin, start = %first.start, "dropping the leading partial slot");
        }
        let span = last.interval().end - origin;
        if span <= TimeDelta::zero() {
            return Ok(Forecast::empty(self.slot_width));
        }
        #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let mut n_slots =
            (span.as_seconds_f64() / self.slot_width.as_seconds_f64()).floor() as usize;
        if n_slots > self.max_slots {
            info!(n_slots, self.max_slots, "truncating the forecast to the maximum horizon");
            n_slots = self.max_slots;
        }

        let mut points = Vec::with_capacity(n_slots);
        let mut first_overlapping = 0;
        let mut slot = Interval::starting_at(origin, self.slot_width);
        for _ in 0..n_slots {
            let mut accumulator = SlotAccumulator::default();
            for sample in samples[first_overlapping..]
                .iter()
                .take_while(|sample| sample.start < slot.end)
            {
                if let Some(overlap) = sample.interval().intersection(slot) {
                    accumulator.add(sample, overlap);
                }
            }
            while first_overlapping < samples.len()
                && samples[first_overlapping].interval().end <= slot.end
            {
                first_overlapping += 1;
            }
            points.push(self.build_point(slot, &accumulator)?);
            slot = Interval::starting_at(slot.end, self.slot_width);
        }

        debug!(n_points = points.len(), "normalized");
        Forecast::try_new(self.slot_width, points)
    }

    fn validate_samples(samples: &[RawSample]) -> Result<(), InvalidForecastError> {
        for (index, sample) in samples.iter().enumerate() {
            if sample.duration <= TimeDelta::zero() {
                return Err(InvalidForecastError::EmptySample { index });
            }
            if !sample.is_finite() {
                return Err(InvalidForecastError::NonFinite { index });
            }
            if index != 0 && sample.start < samples[index - 1].interval().end {
                return Err(InvalidForecastError::UnorderedSamples { index });
            }
        }
        Ok(())
    }

    fn build_point(
        &self,
        slot: Interval,
        accumulator: &SlotAccumulator,
    ) -> Result<ForecastPoint, InvalidForecastError> {
        let slot_seconds = slot.duration().as_seconds_f64();
        if accumulator.covered_seconds + 1e-6 < slot_seconds {
            return Err(InvalidForecastError::Gap { at: slot.start });
        }
        let tariff_rate = match self.schedule {
            Some(schedule) => schedule.average_rate(slot.start, slot.end),
            None if accumulator.has_missing_rate => {
                return Err(InvalidForecastError::MissingRate { at: slot.start });
            }
            None => Quantity(accumulator.rate / slot_seconds),
        };
        Ok(ForecastPoint {
            timestamp: slot.start,
            consumption: Quantity(accumulator.consumption / slot_seconds),
            solar: Quantity(accumulator.solar / slot_seconds),
            tariff_rate,
            confidence: accumulator.confidence,
        })
    }
}

/// First slot boundary at or after the timestamp.
fn align_up(timestamp: NaiveDateTime, slot_width: TimeDelta) -> NaiveDateTime {
    let midnight = timestamp.date().and_time(NaiveTime::MIN);
    let width = slot_width.num_milliseconds().max(1);
    let elapsed = (timestamp - midnight).num_milliseconds();
    midnight + TimeDelta::milliseconds((elapsed + width - 1) / width * width)
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::fixtures::{at, example_schedule};

    fn sample(start: NaiveDateTime, minutes: i64, consumption: f64) -> RawSample {
        RawSample {
            start,
            duration: TimeDelta::minutes(minutes),
            consumption: Quantity(consumption),
            solar: Kilowatts::ZERO,
            rate: Some(Quantity(4.0)),
            confidence: None,
        }
    }

    fn adapter(schedule: Option<&TariffSchedule>) -> ForecastAdapter<'_> {
        ForecastAdapter::builder()
            .slot_width(TimeDelta::minutes(15))
            .max_slots(672)
            .maybe_schedule(schedule)
            .build()
    }

    #[test]
    fn test_hourly_samples_are_split_into_slots() {
        let samples = [sample(at(0, 0), 60, 2.0), sample(at(1, 0), 60, 3.0)];
        let forecast = adapter(None).normalize(&samples).unwrap();
        assert_eq!(forecast.len(), 8);
        assert_eq!(forecast.points()[3].consumption, Quantity(2.0));
        assert_eq!(forecast.points()[4].consumption, Quantity(3.0));
        assert_eq!(forecast.points()[4].timestamp, at(1, 0));
    }

    #[test]
    fn test_fine_samples_are_averaged() {
        let samples = [
            sample(at(0, 0), 5, 1.0),
            sample(at(0, 5), 5, 2.0),
            sample(at(0, 10), 5, 3.0),
            sample(at(0, 15), 5, 3.0),
        ];
        let forecast = adapter(None).normalize(&samples).unwrap();
        // The trailing partial slot is dropped:
        assert_eq!(forecast.len(), 1);
        assert_abs_diff_eq!(forecast.points()[0].consumption.0, 2.0);
    }

    #[test]
    fn test_gap() {
        let samples = [sample(at(0, 0), 15, 1.0), sample(at(0, 30), 15, 1.0)];
        assert_eq!(
            adapter(None).normalize(&samples).unwrap_err(),
            InvalidForecastError::Gap { at: at(0, 15) },
        );
    }

    #[test]
    fn test_overlapping_samples() {
        let samples = [sample(at(0, 0), 30, 1.0), sample(at(0, 15), 15, 1.0)];
        assert_eq!(
            adapter(None).normalize(&samples).unwrap_err(),
            InvalidForecastError::UnorderedSamples { index: 1 },
        );
    }

    #[test]
    fn test_missing_rate_without_schedule() {
        let mut samples = [sample(at(0, 0), 15, 1.0)];
        samples[0].rate = None;
        assert_eq!(
            adapter(None).normalize(&samples).unwrap_err(),
            InvalidForecastError::MissingRate { at: at(0, 0) },
        );
    }

    #[test]
    fn test_schedule_is_authoritative() {
        let schedule = example_schedule();
        let samples = [sample(at(11, 0), 120, 1.0)];
        let forecast = adapter(Some(&schedule)).normalize(&samples).unwrap();
        assert_eq!(forecast.points()[0].tariff_rate, Quantity(8.0));
        assert_eq!(forecast.points()[7].tariff_rate, Quantity(12.0));
    }

    #[test]
    fn test_minimum_confidence() {
        let mut samples = [sample(at(0, 0), 10, 1.0), sample(at(0, 10), 5, 1.0)];
        samples[0].confidence = Some(0.9);
        samples[1].confidence = Some(0.6);
        let forecast = adapter(None).normalize(&samples).unwrap();
        assert_eq!(forecast.points()[0].confidence, Some(0.6));
    }

    #[test]
    fn test_truncated_to_max_horizon() {
        let samples = [sample(at(0, 0), 24 * 60, 1.0)];
        let forecast = ForecastAdapter::builder()
            .slot_width(TimeDelta::minutes(15))
            .max_slots(10)
            .build()
            .normalize(&samples)
            .unwrap();
        assert_eq!(forecast.len(), 10);
    }

    #[test]
    fn test_grid_is_aligned_to_slot_width() {
        let samples = [sample(at(0, 7), 60, 2.0)];
        let forecast = adapter(None).normalize(&samples).unwrap();
        assert_eq!(forecast.len(), 3);
        assert_eq!(forecast.points()[0].timestamp, at(0, 15));
        assert_eq!(forecast.points()[2].timestamp, at(0, 45));
        assert_eq!(forecast.points()[0].consumption, Quantity(2.0));
    }

    #[test]
    fn test_shorter_than_first_aligned_slot() {
        let samples = [sample(at(0, 7), 10, 2.0)];
        assert!(adapter(None).normalize(&samples).unwrap().is_empty());
    }

    #[test]
    fn test_align_up() {
        let width = TimeDelta::minutes(15);
        assert_eq!(align_up(at(0, 0), width), at(0, 0));
        assert_eq!(align_up(at(0, 7), width), at(0, 15));
        assert_eq!(align_up(at(23, 50), width), at(0, 0) + TimeDelta::days(1));
    }

    #[test]
    fn test_empty() {
        assert!(adapter(None).normalize(&[]).unwrap().is_empty());
    }
}
