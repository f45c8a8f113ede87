use clap::Parser;
use ignition_screener::cli::{Cli, Commands};
use ignition_screener::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Could not load config from {}: {}", cli.config, e);
            eprintln!("Using default configuration");
            toml::from_str(include_str!("../config.toml.example"))?
        }
    };

    cli.command.apply_overrides(&mut config);
    config.validate()?;

    ignition_screener::telemetry::init_telemetry(&config.telemetry)?;

    match &cli.command {
        Commands::Scan(args) => args.execute(&config).await?,
        Commands::Stream(args) => args.execute(&config).await?,
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
