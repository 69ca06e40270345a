use clap::Parser;
use paddock::cli::{self, Cli, Commands};
use paddock::config::AppConfig;
use tracing::info;

mod main_runtime;

use main_runtime::{init_logging, init_logging_simple, Runtime};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config)?;
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("config: {e}");
        }
        anyhow::bail!("invalid configuration ({} problem(s))", errors.len());
    }

    match cli.command {
        Commands::Run => {
            init_logging(&config.logging);
            let runtime = Runtime::connect(config).await?;
            runtime.migrate().await?;
            info!("Migrations applied");
            runtime.run_until_shutdown().await;
        }
        Commands::Migrate => {
            init_logging_simple();
            Runtime::connect(config).await?.migrate().await?;
            cli::print_success("Migrations applied");
        }
        Commands::Status => {
            init_logging_simple();
            let runtime = Runtime::connect(config).await?;
            runtime.load_cache().await?;
            cli::show_status(&runtime.competition).await?;
        }
        command => {
            init_logging_simple();
            let runtime = Runtime::connect(config).await?;
            cli::execute(command, &runtime.competition, &runtime.scoring).await?;
        }
    }

    Ok(())
}
