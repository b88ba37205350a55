use chrono::{Local, NaiveDateTime};
use clap::Parser;
use tariff_pilot::prelude::*;

use crate::{
    cli::{ScenarioArgs, scenario::Scenario},
    tables::build_tariff_table,
};

#[derive(Parser)]
pub struct RateArgs {
    #[clap(flatten)]
    pub scenario: ScenarioArgs,

    /// Local wall-clock time, for example `2025-06-01T14:30:00`; defaults to now.
    #[clap(long = "at")]
    pub at: Option<NaiveDateTime>,
}

#[instrument(skip_all)]
pub fn rate(args: &RateArgs) -> Result {
    let schedule = Scenario::read_from(&args.scenario.path)?.schedule()?;
    let at = args.at.unwrap_or_else(|| Local::now().naive_local());
    let period = schedule.period_at(at);
    println!("{}", build_tariff_table(&schedule, period));
    info!(
        %at,
        label = %period.label,
        rate = %period.rate,
        day_average = %schedule.day_average_rate(),
        "active period",
    );
    match schedule.next_change(at) {
        Some((changes_at, next)) => {
            info!(%changes_at, label = %next.label, rate = %next.rate, "next change");
        }
        None => info!("the rate never changes"),
    }
    Ok(())
}
