mod attribute;
mod plan;
mod rate;
mod scenario;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use enumset::EnumSet;
use tariff_pilot::recommendation::RecommendationKind;

pub use self::{
    attribute::{AttributeArgs, attribute},
    plan::{PlanArgs, plan},
    rate::{RateArgs, rate},
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
#[must_use]
pub struct Args {
    /// Engine settings file, the defaults are used when it does not exist.
    #[clap(long = "settings", env = "TARIFF_PILOT_SETTINGS", default_value = "tariff-pilot.toml")]
    pub settings: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Optimize the scenario and print the plan with the recommendations.
    #[clap(name = "plan")]
    Plan(Box<PlanArgs>),

    /// Print the tariff period active at the given moment.
    #[clap(name = "rate")]
    Rate(Box<RateArgs>),

    /// Attribute the realized savings of the scenario plan.
    #[clap(name = "attribute")]
    Attribute(Box<AttributeArgs>),
}

#[derive(Parser)]
pub struct ScenarioArgs {
    /// Scenario file with the tariff, battery, appliances, and forecast samples.
    #[clap(long = "scenario", env = "TARIFF_PILOT_SCENARIO")]
    pub path: PathBuf,
}

#[derive(Parser)]
pub struct KindArgs {
    /// Recommendation kinds to show.
    #[clap(
        long = "kind",
        value_enum,
        value_delimiter = ',',
        default_value = "shift-appliance,price-spread,solar-surplus,off-peak-usage"
    )]
    pub kinds: Vec<RecommendationKind>,
}

impl KindArgs {
    #[must_use]
    pub fn kinds(&self) -> EnumSet<RecommendationKind> {
        self.kinds.iter().copied().collect()
    }
}
