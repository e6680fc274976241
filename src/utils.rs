use std::panic::PanicInfo;
use std::path::PathBuf;

use color_eyre::config::PanicHook;
use color_eyre::eyre::Result;
use directories::ProjectDirs;
use lazy_static::lazy_static;
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    self, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt, Layer,
};

lazy_static! {
    /// The project name, also the prefix of all environment variables.
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase().to_string();

    /// The data folder, from `GAS_DASHBOARD_DATA`.
    pub static ref DATA_FOLDER: Option<PathBuf> = folder_from_env("DATA");

    /// The configuration file folder, from `GAS_DASHBOARD_CONFIG`.
    pub static ref CONFIG_FOLDER: Option<PathBuf> = folder_from_env("CONFIG");

    /// The folder snapshots are exported to, from `GAS_DASHBOARD_EXPORTS`.
    pub static ref EXPORT_FOLDER: Option<PathBuf> = folder_from_env("EXPORTS");

    /// The log level environment variable for this project.
    pub static ref LOG_ENV: String = format!("{}_LOGLEVEL", PROJECT_NAME.clone());

    /// The log file name.
    pub static ref LOG_FILE: String = format!("{}.log", env!("CARGO_PKG_NAME"));

    /// Filter used if neither `RUST_LOG` nor [`LOG_ENV`] is set. The HTTP
    /// client only reports warnings.
    pub static ref DEFAULT_LOG_FILTER: String =
        format!("{}=info,reqwest=warn,hyper=warn", env!("CARGO_CRATE_NAME"));
}

/// The directories the dashboard reads from and writes to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AppDir {
    /// Log file and the default export location.
    Data,
    /// Optional `config.*` files.
    Config,
    /// CSV and chart snapshots.
    Exports,
}

fn folder_from_env(suffix: &str) -> Option<PathBuf> {
    std::env::var(format!("{}_{suffix}", PROJECT_NAME.as_str()))
        .ok()
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("io.github", "sunsided", env!("CARGO_PKG_NAME"))
}

/// Picks the environment override, then the platform directory, then a
/// folder relative to the working directory.
fn resolve_dir(dir: AppDir, overridden: Option<PathBuf>, project: Option<&ProjectDirs>) -> PathBuf {
    if let Some(path) = overridden {
        return path;
    }
    match (dir, project) {
        (AppDir::Data, Some(dirs)) => dirs.data_local_dir().to_path_buf(),
        (AppDir::Config, Some(dirs)) => dirs.config_local_dir().to_path_buf(),
        (AppDir::Exports, Some(dirs)) => dirs.data_local_dir().join("exports"),
        (AppDir::Data, None) => PathBuf::from(".").join(".data"),
        (AppDir::Config, None) => PathBuf::from(".").join(".config"),
        (AppDir::Exports, None) => PathBuf::from(".").join(".data").join("exports"),
    }
}

/// Resolves one of the application's directories.
pub fn app_dir(dir: AppDir) -> PathBuf {
    let overridden = match dir {
        AppDir::Data => DATA_FOLDER.clone(),
        AppDir::Config => CONFIG_FOLDER.clone(),
        AppDir::Exports => EXPORT_FOLDER.clone(),
    };
    resolve_dir(dir, overridden, project_directory().as_ref())
}

/// Gets the application's data directory.
/// See [`DATA_FOLDER`].
pub fn get_data_dir() -> PathBuf {
    app_dir(AppDir::Data)
}

/// Gets the application's configuration directory.
/// See [`CONFIG_FOLDER`].
pub fn get_config_dir() -> PathBuf {
    app_dir(AppDir::Config)
}

/// Gets the default snapshot directory.
/// See [`EXPORT_FOLDER`].
pub fn get_export_dir() -> PathBuf {
    app_dir(AppDir::Exports)
}

pub fn log_file_path() -> PathBuf {
    get_data_dir().join(LOG_FILE.as_str())
}

/// Initializes the app's custom panic handler.
///
/// The panic will be written via [`log::error`], so it will end up in the
/// file configured by [`initialize_logging`]. If the dashboard is running,
/// the terminal is restored first.
pub fn initialize_panic_handler() -> Result<()> {
    let (panic_hook, eyre_hook) = color_eyre::config::HookBuilder::default()
        .panic_section(format!(
            "This is a bug. Consider reporting it at {}",
            env!("CARGO_PKG_REPOSITORY")
        ))
        .capture_span_trace_by_default(false)
        .display_location_section(false)
        .display_env_section(false)
        .into_hooks();
    eyre_hook.install()?;
    std::panic::set_hook(Box::new(move |panic_info| {
        #[cfg(feature = "tui")]
        if let Ok(mut t) = crate::text_user_interface::Tui::new() {
            if let Err(r) = t.exit() {
                error!("Unable to exit Terminal: {:?}", r);
            }
        }

        #[cfg(not(debug_assertions))]
        {
            print_human_panic(&panic_hook, panic_info);
        }

        let msg = format!("{}", panic_hook.panic_report(panic_info));
        log::error!("Error: {}", strip_ansi_escapes::strip_str(msg));

        #[cfg(debug_assertions)]
        {
            // Better Panic stacktrace that is only enabled when debugging.
            better_panic::Settings::auto()
                .most_recent_first(false)
                .lineno_suffix(true)
                .verbosity(better_panic::Verbosity::Full)
                .create_panic_handler()(panic_info);
        }

        std::process::exit(libc::EXIT_FAILURE);
    }));
    Ok(())
}

#[allow(dead_code)]
fn print_human_panic(panic_hook: &PanicHook, panic_info: &PanicInfo) {
    use human_panic::{handle_dump, print_msg};
    let meta = human_panic::Metadata::new(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"))
        .authors(env!("CARGO_PKG_AUTHORS").replace(':', ", "))
        .homepage(env!("CARGO_PKG_HOMEPAGE"));

    let file_path = handle_dump(&meta, panic_info);

    if let Err(e) = print_msg(file_path, &meta) {
        eprintln!("human-panic: printing error message to console failed: {e}");
    }

    eprintln!("{}", panic_hook.panic_report(panic_info));
}

/// Sets up logging into [`log_file_path`]. The level comes from `RUST_LOG`,
/// then [`LOG_ENV`], then [`DEFAULT_LOG_FILTER`].
///
/// The terminal belongs to the dashboard, so nothing is logged to stdout or stderr.
pub fn initialize_logging() -> Result<()> {
    std::fs::create_dir_all(get_data_dir())?;
    let log_path = log_file_path();
    let log_file = std::fs::File::create(&log_path)?;

    std::env::set_var(
        "RUST_LOG",
        std::env::var("RUST_LOG")
            .or_else(|_| std::env::var(LOG_ENV.as_str()))
            .unwrap_or_else(|_| DEFAULT_LOG_FILTER.clone()),
    );

    let file_subscriber = tracing_subscriber::fmt::layer()
        .with_file(true)
        .with_line_number(true)
        .with_writer(log_file)
        .with_target(false)
        .with_ansi(false)
        .with_filter(tracing_subscriber::filter::EnvFilter::from_default_env());

    tracing_subscriber::registry()
        .with(file_subscriber)
        .with(ErrorLayer::default())
        .init();

    info!("{} {} logging to {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"), log_path.display());
    Ok(())
}

/// Prepares a version string for use with clap.
pub fn version() -> String {
    let author = clap::crate_authors!();
    let version = env!("CARGO_PKG_VERSION");

    format!(
        "\
{version}

Authors: {author}

Config directory: {}
Data directory: {}
Export directory: {}
Log file: {}",
        get_config_dir().display(),
        get_data_dir().display(),
        get_export_dir().display(),
        log_file_path().display(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn environment_override_wins() {
        let path = PathBuf::from("/srv/gas");
        assert_eq!(resolve_dir(AppDir::Exports, Some(path.clone()), None), path);
    }

    #[test]
    fn falls_back_to_the_working_directory() {
        assert_eq!(resolve_dir(AppDir::Data, None, None), PathBuf::from("./.data"));
        assert_eq!(resolve_dir(AppDir::Config, None, None), PathBuf::from("./.config"));
        assert_eq!(
            resolve_dir(AppDir::Exports, None, None),
            PathBuf::from("./.data/exports")
        );
    }

    #[test]
    fn exports_live_below_the_data_directory() {
        if let Some(dirs) = project_directory() {
            let exports = resolve_dir(AppDir::Exports, None, Some(&dirs));
            assert!(exports.starts_with(dirs.data_local_dir()));
        }
    }

    #[test]
    fn version_lists_the_directories() {
        let text = version();
        assert!(text.starts_with(env!("CARGO_PKG_VERSION")));
        assert!(text.contains("Export directory:"));
        assert!(text.contains(LOG_FILE.as_str()));
    }
}
