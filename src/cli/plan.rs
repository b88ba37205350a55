use clap::Parser;
use tariff_pilot::{prelude::*, settings::Settings};

use crate::{
    cli::{KindArgs, ScenarioArgs, scenario::Scenario},
    tables::{build_assignments_table, build_dispatch_table, build_recommendations_table},
};

#[derive(Parser)]
pub struct PlanArgs {
    #[clap(flatten)]
    pub scenario: ScenarioArgs,

    #[clap(flatten)]
    pub kinds: KindArgs,

    /// Print the plan as JSON instead of the tables.
    #[clap(long = "json")]
    pub json: bool,
}

#[instrument(skip_all)]
pub async fn plan(settings: Settings, args: &PlanArgs) -> Result {
    let (engine, plan) = Scenario::read_from(&args.scenario.path)?.start(settings).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&*plan)?);
        return Ok(());
    }
    println!("{}", build_dispatch_table(&plan.dispatch));
    if !plan.appliances.is_empty() {
        println!("{}", build_assignments_table(&plan));
    }
    let recommendations = engine.recommendations(&plan, None, args.kinds.kinds());
    println!("{}", build_recommendations_table(&recommendations));
    info!(
        total_cost = %plan.total_cost,
        baseline_cost = %plan.baseline_cost,
        battery_savings = %plan.battery_savings(),
        n_failures = plan.failures.len(),
        "planned",
    );
    Ok(())
}
