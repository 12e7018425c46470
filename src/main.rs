use clap::Parser;
use dealsync::cli::{self, output::OutputMode, Cli, Commands};

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mode = OutputMode::from_json_flag(cli.json);

    let result = match &cli.command {
        Commands::Watch { config, once } => {
            let config = cli::load_config(config)?;
            let _guard = init_logging(&config.logging);
            cli::run_watch(&config, *once, mode).await
        }
        Commands::Report { config, endpoint } => {
            init_logging_simple();
            let config = cli::load_config(config)?;
            cli::run_report(&config, endpoint.as_deref(), mode).await
        }
        Commands::CheckConfig { config } => {
            init_logging_simple();
            let config = cli::load_config(config)?;
            cli::check_config(&config, mode)
        }
    };

    if let Err(e) = result {
        cli::output::print_error(&format!("✗ {e:#}"));
        std::process::exit(1);
    }
    Ok(())
}
