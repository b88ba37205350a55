mod cli;
mod tables;

use clap::{Parser, crate_version};
use tariff_pilot::{prelude::*, settings::Settings};

use crate::cli::{Args, Command, attribute, plan, rate};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().without_time().compact().init();
    info!(version = crate_version!(), "starting…");

    let args = Args::parse();
    let settings = Settings::read_from(&args.settings).with_context(|| {
        format!("failed to load the settings from `{}`", args.settings.display())
    })?;

    match args.command {
        Command::Plan(args) => plan(settings, &args).await?,
        Command::Rate(args) => rate(&args)?,
        Command::Attribute(args) => attribute(settings, &args).await?,
    }

    info!("done!");
    Ok(())
}
