use std::{fmt::Debug, fs, path::Path};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::{
    prelude::*,
    quantity::{
        cost::Cost,
        energy::KilowattHours,
        power::Kilowatts,
        rate::KilowattHourRate,
    },
    tariff::MINUTES_PER_DAY,
};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("failed to read the settings")]
    Io(#[from] std::io::Error),

    #[error("failed to parse the settings")]
    Parse(#[from] toml::de::Error),

    #[error("slot width must be positive and divide the day, got {0} minutes")]
    SlotWidth(u32),

    #[error("SoC step must be in (0, 100] percent, got {0}")]
    SocStep(f64),

    #[error("maximum horizon must be at least one slot long")]
    Horizon,

    #[error("capacity ceiling must be positive")]
    CapacityCeiling,

    #[error("feed-in rate must be finite")]
    FeedInRate,

    #[error("recommendation cap must be positive")]
    Cap,

    #[error("spread ratio must be in [0, 1]")]
    SpreadRatio,
}

/// Engine configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub slot_minutes: u32,

    /// SoC discretization step in percent of the battery capacity.
    pub soc_step_percent: f64,

    pub max_horizon_hours: u32,

    /// Maximum simultaneous appliance power per slot.
    #[serde(rename = "capacity_ceiling_kw", skip_serializing_if = "Option::is_none")]
    pub capacity_ceiling: Option<Kilowatts>,

    /// Compensation for exported solar energy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_in_rate: Option<KilowattHourRate>,

    pub recommendations: RecommendationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            slot_minutes: 15,
            soc_step_percent: 1.0,
            max_horizon_hours: 168,
            capacity_ceiling: None,
            feed_in_rate: None,
            recommendations: RecommendationSettings::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecommendationSettings {
    /// Maximum number of recommendations.
    pub cap: usize,

    /// Candidates saving less are dropped.
    pub min_saving: Cost,

    /// Minimal relative daily rate spread worth a suggestion.
    pub spread_ratio: f64,

    /// Energy assumed movable from the most expensive to the cheapest slot.
    #[serde(rename = "shiftable_energy_kwh")]
    pub shiftable_energy: KilowattHours,
}

impl Default for RecommendationSettings {
    fn default() -> Self {
        Self {
            cap: 5,
            min_saving: Cost::ZERO,
            spread_ratio: 0.3,
            shiftable_energy: KilowattHours::ONE,
        }
    }
}

impl Settings {
    /// Read the settings file, falling back to the defaults when it does not exist.
    #[instrument(name = "Reading the settings…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let settings: Self = if path.is_file() {
            toml::from_str(&fs::read_to_string(path)?)?
        } else {
            Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.slot_minutes == 0 || u32::from(MINUTES_PER_DAY) % self.slot_minutes != 0 {
            return Err(SettingsError::SlotWidth(self.slot_minutes));
        }
        if !(self.soc_step_percent > 0.0 && self.soc_step_percent <= 100.0) {
            return Err(SettingsError::SocStep(self.soc_step_percent));
        }
        if self.max_horizon_hours * 60 < self.slot_minutes {
            return Err(SettingsError::Horizon);
        }
        if self
            .capacity_ceiling
            .is_some_and(|ceiling| !(ceiling > Kilowatts::ZERO && ceiling.is_finite()))
        {
            return Err(SettingsError::CapacityCeiling);
        }
        if self.feed_in_rate.is_some_and(|rate| !rate.is_finite()) {
            return Err(SettingsError::FeedInRate);
        }
        if self.recommendations.cap == 0 {
            return Err(SettingsError::Cap);
        }
        if !(0.0..=1.0).contains(&self.recommendations.spread_ratio) {
            return Err(SettingsError::SpreadRatio);
        }
        Ok(())
    }

    #[must_use]
    pub fn slot_width(&self) -> TimeDelta {
        TimeDelta::minutes(i64::from(self.slot_minutes))
    }

    /// Longest accepted horizon in slots.
    #[must_use]
    pub fn max_slots(&self) -> usize {
        (self.max_horizon_hours * 60 / self.slot_minutes) as usize
    }

    pub fn feed_in_rate(&self) -> KilowattHourRate {
        self.feed_in_rate.unwrap_or(KilowattHourRate::ZERO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quantity::Quantity;

    #[test]
    fn test_defaults() {
        let settings: Settings = toml::from_str("").unwrap();
        assert_eq!(settings, Settings::default());
        assert!(settings.validate().is_ok());
        assert_eq!(settings.slot_width(), TimeDelta::minutes(15));
        assert_eq!(settings.max_slots(), 672);
        assert_eq!(settings.recommendations.cap, 5);
    }

    #[test]
    fn test_parse() {
        let settings: Settings = toml::from_str(
            r"
                slot_minutes = 30
                capacity_ceiling_kw = 7.5
                feed_in_rate = 0.05

                [recommendations]
                cap = 3
                shiftable_energy_kwh = 2.0
            ",
        )
        .unwrap();
        assert_eq!(settings.slot_minutes, 30);
        assert_eq!(settings.capacity_ceiling, Some(Quantity(7.5)));
        assert_eq!(settings.feed_in_rate(), Quantity(0.05));
        assert_eq!(settings.recommendations.cap, 3);
        assert_eq!(settings.recommendations.spread_ratio, 0.3);
        assert_eq!(settings.max_slots(), 336);
    }

    #[test]
    fn test_unknown_field() {
        assert!(toml::from_str::<Settings>("slot_width = 15").is_err());
    }

    #[test]
    fn test_slot_width_must_divide_day() {
        let settings = Settings { slot_minutes: 7, ..Settings::default() };
        assert!(matches!(settings.validate(), Err(SettingsError::SlotWidth(7))));
    }

    #[test]
    fn test_soc_step() {
        let settings = Settings { soc_step_percent: 0.0, ..Settings::default() };
        assert!(matches!(settings.validate(), Err(SettingsError::SocStep(_))));
    }

    #[test]
    fn test_zero_cap() {
        let mut settings = Settings::default();
        settings.recommendations.cap = 0;
        assert!(matches!(settings.validate(), Err(SettingsError::Cap)));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = Settings::read_from("/nonexistent/tariff-pilot.toml").unwrap();
        assert_eq!(settings, Settings::default());
    }
}
