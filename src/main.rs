use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use forms_stats::config::AppConfig;
use forms_stats::db::{self, PgUserStore, UserStore};
use forms_stats::intake::{self, UserService};
use forms_stats::stats::StatsEngine;
use forms_stats::{api, calendar, report};

#[derive(Parser)]
#[command(name = "forms-stats")]
#[command(about = "User intake and Jalaali gender statistics services", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load demo users and addresses
    Seed,
    /// Import users from a CSV file
    Import {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Run the user intake HTTP service
    ServeUsers {
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Run the reporting HTTP service
    ServeReports {
        #[arg(long)]
        addr: Option<SocketAddr>,
    },
    /// Write a markdown statistics report
    Report {
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    config.logging.init();

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .context("failed to connect to Postgres")?;
    let store: Arc<dyn UserStore> = Arc::new(PgUserStore::new(pool.clone()));
    let engine = StatsEngine::new(config.gender.clone(), config.utc_offset);

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import { csv } => {
            let service = UserService::new(store, config.intake());
            let inserted = intake::import_csv(&service, &csv).await?;
            println!("Inserted {inserted} users from {}.", csv.display());
        }
        Commands::ServeUsers { addr } => {
            let service = Arc::new(UserService::new(store, config.intake()));
            let app = api::with_middleware(api::users::router(service), &config.cors_allowed_origins);
            api::serve("user-service", addr.unwrap_or(config.user_service_addr), app).await?;
        }
        Commands::ServeReports { addr } => {
            let state = api::reports::ReportState::new(store, engine);
            let app = api::with_middleware(api::reports::router(state), &config.cors_allowed_origins);
            api::serve("report-service", addr.unwrap_or(config.report_service_addr), app).await?;
        }
        Commands::Report { out } => {
            let records = store.stat_records().await?;
            let now = Utc::now();
            let outcome = engine.all_stats(&records);
            let week = engine.current_week(&records, now)?.stats;
            let month = engine.current_month(&records, now)?.stats;
            let today = calendar::JalaaliDate::from_gregorian(engine.local_date(now))?;

            info!(
                records = records.len(),
                skipped = outcome.diagnostics.skipped_records,
                "building report"
            );
            let report = report::build_report(today, &outcome, &week, &month);
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}
