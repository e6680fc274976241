#[cfg(feature = "export")]
use std::path::PathBuf;

use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};

use crate::query::{Gas, QueryParameters, SensorAddress};
#[cfg(feature = "tui")]
use crate::session::{DashboardSettings, SensorSettings};
use crate::utils::version;

#[derive(Parser, Debug)]
#[command(author, version = version(), about)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub overrides: ConfigOverrides,

    #[command(subcommand)]
    pub command: Commands,
}

/// Settings that take precedence over the configuration file.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    #[arg(
        global = true,
        long,
        value_name = "URL",
        help = "The endpoint serving the sensor readings"
    )]
    pub base_url: Option<String>,

    #[arg(
        global = true,
        long,
        value_name = "SECONDS",
        help = "Request timeout in seconds"
    )]
    pub timeout_secs: Option<u64>,

    #[arg(
        global = true,
        long,
        value_name = "MILLISECONDS",
        help = "Delay between two polls"
    )]
    pub poll_interval_ms: Option<u64>,

    #[arg(
        global = true,
        long,
        value_name = "ZONE",
        help = "Time zone used for displayed dates, e.g. Europe/Berlin"
    )]
    pub time_zone: Option<String>,

    #[arg(
        global = true,
        long,
        value_name = "ROWS",
        help = "Maximum number of rows kept per sensor"
    )]
    pub retention: Option<usize>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the interactive dashboard.
    #[cfg(feature = "tui")]
    Ui(UiCommand),
    /// Fetch the readings of one sensor once and print them.
    Fetch(FetchCommand),
    /// Fetch the readings of one sensor and write them as CSV and chart image.
    #[cfg(feature = "export")]
    Export(ExportCommand),
}

#[cfg(feature = "tui")]
#[derive(Parser, Debug)]
pub struct UiCommand {
    #[arg(
        short,
        long,
        value_name = "FLOAT",
        help = "Frame rate, i.e. number of frames per second",
        default_value_t = 10.0
    )]
    pub frame_rate: f64,

    #[arg(
        short,
        long,
        value_name = "FLOAT",
        help = "Tick rate, i.e. number of ticks per second",
        default_value_t = 4.0
    )]
    pub tick_rate: f64,

    #[arg(long, value_name = "DATE", help = "Date to show, defaults to today")]
    pub date: Option<NaiveDate>,

    #[arg(
        long,
        value_name = "ROWS",
        help = "Number of past measurements",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub last_rows: u32,

    #[arg(
        long,
        value_name = "COUNT",
        help = "Number of active sensors",
        default_value_t = 1,
        value_parser = clap::value_parser!(u8).range(1..=2)
    )]
    pub sensors: u8,

    #[arg(long, value_name = "ADDRESS", default_value = "1")]
    pub addr1: SensorAddress,

    #[arg(long, value_name = "ADDRESS", default_value = "2")]
    pub addr2: SensorAddress,

    #[arg(long, value_name = "GAS", default_value = "CO2")]
    pub gas1: Gas,

    #[arg(long, value_name = "GAS", default_value = "CO2")]
    pub gas2: Gas,
}

#[cfg(feature = "tui")]
impl UiCommand {
    /// The values the form starts out with.
    pub fn form_defaults(&self) -> DashboardSettings {
        DashboardSettings {
            date: self.date.unwrap_or_else(|| Local::now().date_naive()),
            last_rows: self.last_rows,
            num_sensors: self.sensors as usize,
            sensors: [
                SensorSettings {
                    address: self.addr1,
                    gas: self.gas1,
                },
                SensorSettings {
                    address: self.addr2,
                    gas: self.gas2,
                },
            ],
        }
    }
}

/// Selects a single sensor and day.
#[derive(Args, Debug)]
pub struct SensorArgs {
    #[arg(short, long, value_name = "GAS", default_value = "CO2")]
    pub gas: Gas,

    #[arg(short, long, value_name = "ADDRESS", default_value = "1")]
    pub addr: SensorAddress,

    #[arg(short, long, value_name = "DATE", help = "Date to fetch, defaults to today")]
    pub date: Option<NaiveDate>,

    #[arg(
        short,
        long,
        value_name = "ROWS",
        help = "Number of past measurements",
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub last_rows: u32,
}

impl SensorArgs {
    pub fn query(&self) -> QueryParameters {
        let date = self.date.unwrap_or_else(|| Local::now().date_naive());
        QueryParameters::new(self.gas, self.addr, date, self.last_rows)
    }
}

#[derive(Parser, Debug)]
pub struct FetchCommand {
    #[command(flatten)]
    pub sensor: SensorArgs,

    #[arg(long, help = "Print the rows as JSON")]
    pub json: bool,
}

#[cfg(feature = "export")]
#[derive(Parser, Debug)]
pub struct ExportCommand {
    #[command(flatten)]
    pub sensor: SensorArgs,

    #[arg(
        short,
        long,
        value_name = "DIRECTORY",
        help = "Output directory, defaults to the configured export directory"
    )]
    pub output: Option<PathBuf>,
}
