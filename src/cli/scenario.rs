use std::{fmt::Debug, fs, path::Path, sync::Arc};

use serde::Deserialize;
use tariff_pilot::{
    battery::BatteryState,
    engine::Engine,
    forecast::RawSample,
    plan::Plan,
    prelude::*,
    scheduler::Appliance,
    settings::Settings,
    tariff::{TariffPeriod, TariffSchedule},
};

/// Complete set of the engine inputs.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    pub tariff: Vec<TariffPeriod>,

    #[serde(default)]
    pub battery: BatteryState,

    #[serde(default)]
    pub appliances: Vec<Appliance>,

    #[serde(default)]
    pub samples: Vec<RawSample>,
}

impl Scenario {
    #[instrument(name = "Reading the scenario…")]
    pub fn read_from<P: AsRef<Path> + Debug>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref()).context("failed to read the scenario")?;
        toml::from_str(&text).context("failed to parse the scenario")
    }

    pub fn schedule(&self) -> Result<TariffSchedule> {
        Ok(TariffSchedule::try_new(self.tariff.clone())?)
    }

    /// Install the scenario into a new engine and wait for the first plan.
    #[instrument(skip_all, name = "Starting the engine…")]
    pub async fn start(self, settings: Settings) -> Result<(Engine, Arc<Plan>)> {
        let engine = Engine::new(settings)?;
        engine.install_tariff_schedule(self.tariff)?;
        engine.update_battery(self.battery)?;
        engine.set_appliances(self.appliances)?;
        let plan = engine.submit_samples(&self.samples).await?;
        Ok((engine, plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        let scenario: Scenario = toml::from_str(
            r#"
                [[tariff]]
                start_offset = 1320
                end_offset = 360
                rate = 0.12
                label = "Night"

                [[tariff]]
                start_offset = 360
                end_offset = 1320
                rate = 0.31
                label = "Day"

                [battery]
                capacity_kwh = 10.0
                min_soc_kwh = 1.0
                max_soc_kwh = 10.0
                max_charge_kw = 5.0
                max_discharge_kw = 5.0
                round_trip_efficiency = 0.9
                current_soc_kwh = 5.0

                [[samples]]
                start = "2025-06-01T00:00:00"
                duration_secs = 3600
                consumption_kw = 0.8
            "#,
        )
        .unwrap();
        assert_eq!(scenario.schedule().unwrap().periods().len(), 2);
        assert!(scenario.appliances.is_empty());
        assert_eq!(scenario.samples.len(), 1);
        assert!(scenario.samples[0].rate.is_none());
    }
}
