use std::{fs, path::PathBuf};

use clap::Parser;
use tariff_pilot::{attribution::Reading, prelude::*, settings::Settings};

use crate::{
    cli::{KindArgs, ScenarioArgs, scenario::Scenario},
    tables::{
        build_attribution_table,
        build_period_attribution_table,
        build_recommendations_table,
    },
};

#[derive(Parser)]
pub struct AttributeArgs {
    #[clap(flatten)]
    pub scenario: ScenarioArgs,

    /// JSON array of the metered slot readings.
    #[clap(long = "readings", env = "TARIFF_PILOT_READINGS")]
    pub readings: PathBuf,

    #[clap(flatten)]
    pub kinds: KindArgs,
}

#[instrument(skip_all)]
pub async fn attribute(settings: Settings, args: &AttributeArgs) -> Result {
    let readings: Vec<Reading> = serde_json::from_slice(
        &fs::read(&args.readings).context("failed to read the readings")?,
    )
    .context("failed to parse the readings")?;
    let (engine, plan) = Scenario::read_from(&args.scenario.path)?.start(settings).await?;

    let attribution = engine.attribute_savings(&readings, &plan);
    println!("{}", build_attribution_table(&attribution));
    println!("{}", build_period_attribution_table(&engine.attribute_by_period(&readings, &plan)));
    let recommendations = engine.recommendations(&plan, Some(&attribution), args.kinds.kinds());
    println!("{}", build_recommendations_table(&recommendations));
    Ok(())
}
