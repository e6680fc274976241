#[cfg(feature = "export")]
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing::{error, info};

use crate::cli::{Cli, Commands, FetchCommand};
use crate::config::Config;
use crate::source::{HttpSource, ReadingSource};
use crate::utils::{initialize_logging, initialize_panic_handler};

mod cli;
mod config;
#[cfg(feature = "export")]
mod export;
mod query;
mod response;
mod session;
mod source;
mod table;
mod theme;
#[cfg(feature = "tui")]
mod text_user_interface;
mod utils;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    initialize_logging()?;
    initialize_panic_handler()?;

    let cli = Cli::parse();
    let config = Config::new()?.with_overrides(&cli.overrides)?;
    info!("Reading from {}", config.base_url);

    match cli.command {
        #[cfg(feature = "tui")]
        Commands::Ui(args) => {
            let mut app = text_user_interface::App::new(
                config,
                args.form_defaults(),
                args.frame_rate,
                args.tick_rate,
            )?;
            app.run().await?;
        }
        Commands::Fetch(args) => return fetch(&config, &args).await,
        #[cfg(feature = "export")]
        Commands::Export(args) => {
            let directory = args.output.clone().unwrap_or_else(|| config.export_dir());
            export(&config, &args.sensor, directory).await?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn http_source(config: &Config) -> Result<HttpSource> {
    HttpSource::new(
        config.base_url.clone(),
        config.timeout(),
        config.time_zone()?,
        config.retention,
    )
}

/// Fetches one sensor once and prints the table, or the error value.
/// An error value exits with status 1.
async fn fetch(config: &Config, args: &FetchCommand) -> Result<ExitCode> {
    let source = http_source(config)?;
    let query = args.sensor.query();

    match source.fetch(&query).await {
        Ok(table) if args.json => println!("{}", serde_json::to_string_pretty(table.rows())?),
        Ok(table) => print!("{table}"),
        Err(e) => {
            error!("Fetching {} failed: {e}", source.url_for(&query));
            if args.json {
                println!("{}", e.to_json());
            } else {
                eprintln!("ERROR: {e}");
            }
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

#[cfg(feature = "export")]
async fn export(config: &Config, args: &cli::SensorArgs, directory: PathBuf) -> Result<()> {
    let source = http_source(config)?;
    let query = args.query();
    let table = source.fetch(&query).await?;

    let files = export::export_table(
        &table,
        &query,
        &theme::for_slot(1),
        config.time_zone()?,
        &directory,
        chrono::Local::now(),
    )?;
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use pretty_assertions::assert_eq;

    fn unreachable_config() -> Config {
        Config {
            base_url: String::from("http://127.0.0.1:9/drone-data"),
            timeout_secs: 1,
            poll_interval_ms: 1000,
            time_zone: String::from("Europe/Berlin"),
            retention: None,
            export_dir: None,
        }
    }

    #[tokio::test]
    async fn failed_fetch_exits_with_failure() {
        let args = FetchCommand::parse_from(["fetch", "--addr", "1", "--json"]);
        let code = fetch(&unreachable_config(), &args).await.unwrap();
        assert_eq!(code, ExitCode::FAILURE);
    }
}
