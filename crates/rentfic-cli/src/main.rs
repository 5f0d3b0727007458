use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

use rentfic_core::config::{self, LogFormat, LoggingConfig};
use rentfic_core::{LlamaParseClient, Outcome, Pipeline, RunReport};

/// Download the latest FIC profitability report and archive it if its date is new.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (default: $CONFIG_PATH, then ./config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Exit with status 1 when the run fails (default: failures are only logged)
    #[arg(long)]
    fail_on_error: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    // Startup errors are fatal and exit non-zero, unlike run failures below
    let config = config::load_config(args.config.as_deref())?;
    init_logging(&config.logging);

    let api_key = config::api_key_from_env()?;
    let http = reqwest::Client::builder()
        .user_agent(concat!("rentfic/", env!("CARGO_PKG_VERSION")))
        .build()?;
    let extractor = LlamaParseClient::from_config(http.clone(), api_key, &config);
    let pipeline = Pipeline::new(&config, http, extractor)?;

    let report = pipeline.execute().await;
    print_summary(&report, args.no_color);

    if report.is_failure() && args.fail_on_error {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
fn init_logging(logging: &LoggingConfig) {
    let level = config::log_level_filter(&logging.level)
        .unwrap_or(log::LevelFilter::Info)
        .to_string()
        .to_lowercase();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Full => builder.init(),
        LogFormat::Compact => builder.compact().init(),
    }
}

fn print_summary(report: &RunReport, no_color: bool) {
    let (label, detail) = match report {
        RunReport::Completed(Outcome::Saved { path, .. }) => {
            ("saved", format!("new report archived at {}", path.display()))
        }
        RunReport::Completed(Outcome::SkippedAlreadyProcessed { date_key }) => {
            ("skipped", format!("report for {date_key} was already archived"))
        }
        RunReport::Completed(Outcome::SkippedDateNotFound) => {
            ("skipped", "no publication date found in the report".to_string())
        }
        RunReport::Completed(Outcome::SkippedEmptyParse) => {
            ("skipped", "the text-extraction service returned no text".to_string())
        }
        RunReport::Failed(e) => ("failed", e.to_string()),
    };

    if no_color {
        println!("[{label}] {detail}");
        return;
    }
    match report {
        RunReport::Completed(outcome) if outcome.new_file_saved() => {
            println!("[{}] {detail}", label.green().bold())
        }
        RunReport::Completed(_) => println!("[{}] {detail}", label.yellow()),
        RunReport::Failed(_) => println!("[{}] {detail}", label.red().bold()),
    }
}
