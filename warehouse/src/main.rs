use clap::{Arg, Command};
use std::process;
use tracing_subscriber::EnvFilter;

use common::config::Settings;
use warehouse::services::{ReportingEngine, WarehouseService};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let matches = Command::new("Warehouse Pipeline Manager")
        .version("1.0")
        .about("Manages the ride-booking warehouse pipeline")
        .subcommand(
            Command::new("load")
                .about("Run the staging-to-warehouse load")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("staging")
                        .short('s')
                        .long("staging")
                        .value_name("FILE")
                        .required(true)
                        .help("Staging parquet file to load"),
                ),
        )
        .subcommand(
            Command::new("report")
                .about("Run the reporting catalog and print JSON results")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("Sets a custom config file"),
                )
                .arg(
                    Arg::new("top")
                        .long("top")
                        .value_name("N")
                        .help("Row limit for the top-N rankings"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("load", load_matches)) => {
            let config_path = load_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/warehouse.toml");
            let Some(staging_path) = load_matches.get_one::<String>("staging") else {
                eprintln!("A staging parquet file is required");
                process::exit(1);
            };

            println!("Starting warehouse load with config: {}", config_path);
            match warehouse::run_warehouse_pipeline(config_path, staging_path).await {
                Ok(manifest) => {
                    println!(
                        "Load complete: {} staging rows, {} inserted, {} already present, {} skipped",
                        manifest.staging_rows,
                        manifest.facts.inserted,
                        manifest.facts.already_present,
                        manifest.facts.unresolved
                            + manifest.facts.missing_booking_id
                            + manifest.facts.missing_datetime,
                    );
                }
                Err(e) => {
                    eprintln!("Warehouse load error: {}", e);
                    process::exit(1);
                }
            }
        }
        Some(("report", report_matches)) => {
            let config_path = report_matches
                .get_one::<String>("config")
                .map(|s| s.as_str())
                .unwrap_or("config/warehouse.toml");
            let top = report_matches
                .get_one::<String>("top")
                .and_then(|s| s.parse::<usize>().ok());

            if let Err(e) = run_reports(config_path, top).await {
                eprintln!("Reporting error: {}", e);
                process::exit(1);
            }
        }
        _ => {
            println!("No subcommand specified. Use --help for usage information.");
            process::exit(1);
        }
    }
}

async fn run_reports(config_path: &str, top: Option<usize>) -> anyhow::Result<()> {
    let settings = Settings::new(config_path)?;
    let top_n = top.unwrap_or(settings.pipeline.top_n);

    let service = WarehouseService::new(&settings).await?;
    let engine = ReportingEngine::new(service.processor()).await?;

    let report = serde_json::json!({
        "booking_totals": engine.booking_totals().await?,
        "cancellation": engine.cancellation_summary().await?,
        "top_pickup_locations": engine.top_pickup_locations(top_n).await?,
        "revenue_by_vehicle": engine.revenue_by_vehicle().await?,
        "top_customers": engine.top_customers(top_n).await?,
        "daily_trend": engine.daily_trend().await?,
        "hourly_trend": engine.hourly_trend().await?,
        "revenue_by_payment_method": engine.revenue_by_payment_method().await?,
        "orphan_foreign_keys": engine.orphan_foreign_keys().await?,
        "load_failures": engine.load_failures().await?,
    });

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
