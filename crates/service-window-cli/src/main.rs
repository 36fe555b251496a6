mod error;

use anyhow::{Context as _, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use service_window::zone::parse_rfc3339;
use service_window::{compute_fulfillment_time, windows_in_range, DateIntervals, DateRange};
use service_window_runtime::{config, logging, FulfillmentResolver};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

use crate::error::{exit_code_for, invalid_input, report_error};

#[derive(Debug, Parser)]
#[command(name = "svcwin", version, about = "Fulfillment availability over a service-window config")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Evaluate at this RFC 3339 instant instead of the system clock
    #[arg(long, global = true)]
    now: Option<String>,
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Whether any fulfillment is open for immediate service
    Open,
    /// The next servable slot across all fulfillments
    Next(NextArgs),
    /// Selectable slots of one fulfillment on a date
    Options(OptionsArgs),
    /// Snap the current instant to the slot grid
    Snap(SnapArgs),
    /// Operating windows of one fulfillment over a date range
    Expand(ExpandArgs),
    /// The service time for an order placed now
    Resolve,
}

#[derive(Debug, Args)]
struct NextArgs {
    /// Minimum lead time in minutes, on top of each fulfillment's own
    #[arg(long, default_value_t = 0)]
    lead: u32,
}

#[derive(Debug, Args)]
struct OptionsArgs {
    #[arg(long)]
    fulfillment: String,
    /// Local date, YYYY-MM-DD
    #[arg(long)]
    date: String,
}

#[derive(Debug, Args)]
struct SnapArgs {
    #[arg(long, default_value_t = service_window::fulfillment::DEFAULT_TIME_STEP_MINUTES)]
    step: u32,
}

#[derive(Debug, Args)]
struct ExpandArgs {
    #[arg(long)]
    fulfillment: String,
    #[arg(long)]
    from: String,
    #[arg(long)]
    to: String,
}

#[derive(Debug, Serialize)]
struct OpenOutput {
    open: bool,
    fulfillments: Vec<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let verbose = cli.verbose;
    logging::init(verbose, cli.log_json);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err, verbose);
            exit_code_for(&err)
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let Cli {
        config: config_path,
        now,
        command,
        ..
    } = cli;

    let config_path = config_path.ok_or_else(|| invalid_input("--config is required"))?;
    let app_config = config::load(&config_path)
        .with_context(|| format!("load config {}", config_path.display()))?;
    debug!(
        path = %config_path.display(),
        timezone = %app_config.timezone,
        fulfillments = app_config.fulfillments.len(),
        "config loaded"
    );

    let now = resolve_now(now.as_deref())?;
    let resolver = FulfillmentResolver::from_config(&app_config);
    let tz = resolver.timezone();

    match command {
        Command::Open => print_json(&OpenOutput {
            open: resolver.is_open(now),
            fulfillments: resolver.open_ids(now),
        }),
        Command::Next(args) => print_json(&resolver.next_available(now, args.lead)),
        Command::Options(args) => {
            let date = parse_date(&args.date)?;
            let options = resolver.options_for_date(&args.fulfillment, date, now)?;
            print_json(&options)
        }
        Command::Snap(args) => {
            if args.step == 0 {
                return Err(invalid_input("--step must be at least 1"));
            }
            print_json(&compute_fulfillment_time(now, &tz, args.step))
        }
        Command::Expand(args) => {
            let range = DateRange::new(parse_date(&args.from)?, parse_date(&args.to)?)?;
            let fulfillment = resolver.fulfillment(&args.fulfillment)?;
            let windows: Vec<DateIntervals> = windows_in_range(fulfillment, &range, &tz)?
                .into_iter()
                .map(|(date, intervals)| DateIntervals { date, intervals })
                .collect();
            print_json(&windows)
        }
        Command::Resolve => print_json(&resolver.resolve(now)),
    }
}

fn resolve_now(raw: Option<&str>) -> Result<DateTime<Utc>> {
    match raw {
        Some(raw) => parse_rfc3339(raw).map_err(|e| invalid_input(e.to_string())),
        None => Ok(Utc::now()),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| invalid_input(format!("'{raw}' is not a YYYY-MM-DD date")))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{rendered}");
    Ok(())
}
