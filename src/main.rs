use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};

use tariff_sim::api::{
    TariffOverrides, build_calibration_response, build_context, build_simulate_response,
    build_tariff, run_http_server,
};
use tariff_sim::core::SimulationContext;
use tariff_sim::logging::init_logging;

#[derive(Parser, Debug)]
#[command(
    name = "tariff-sim",
    about = "Simulates revenue and distribution effects of income tax tariff changes"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
        #[command(flatten)]
        data: DataArgs,
    },
    /// Simulate one tariff and print the result as JSON
    Simulate {
        #[command(flatten)]
        data: DataArgs,
        #[command(flatten)]
        tariff: TariffOverrides,
    },
    /// Print the per-bracket calibration as JSON
    Calibrate {
        #[command(flatten)]
        data: DataArgs,
    },
}

#[derive(Args, Debug)]
struct DataArgs {
    /// CSV with columns lower_bound,upper_bound,taxpayers,total_income,total_tax
    #[arg(long, value_name = "CSV")]
    brackets: Option<PathBuf>,
}

impl DataArgs {
    fn load(&self) -> Result<SimulationContext> {
        build_context(self.brackets.as_deref()).context("failed to build simulation context")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { port, data } => {
            let context = Arc::new(data.load()?);
            run_http_server(port, context)
                .await
                .context("HTTP server failed")?;
        }
        Command::Simulate { data, tariff } => {
            let params = build_tariff(&tariff).map_err(|msg| anyhow!(msg))?;
            let context = data.load()?;
            let response = build_simulate_response(&context, &params);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Calibrate { data } => {
            let context = data.load()?;
            let response = build_calibration_response(&context);
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
    }

    Ok(())
}
