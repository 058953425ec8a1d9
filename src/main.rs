//! RTI Assist command line
//!
//! ```bash
//! rti-assist seed projects.json
//! rti-assist report "agriculture rehabilitation work in wayanad" --pdf rti_report.pdf
//! rti-assist summary --district Wayanad
//! rti-assist chat "How do I apply for old age pension?"
//! rti-assist projects --sector "Rural Development" --offset 10
//! rti-assist project KL-AGR-WYD-2024-001
//! ```

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use rti_assist_lib::app;
use rti_assist_lib::domain::error::AppError;
use rti_assist_lib::infrastructure::bootstrap::bootstrap;
use rti_assist_lib::infrastructure::config::{AppConfig, ConfigService, DEFAULT_CONFIG_FILE};
use rti_assist_lib::infrastructure::db::projects::DEFAULT_PAGE_SIZE;

#[derive(Parser)]
#[command(name = "rti-assist")]
#[command(version)]
#[command(about = "Answer questions about public works projects with RTI disclosure reports")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); missing files are ignored
    #[arg(long, short, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Output format
    #[arg(long, short = 'o', global = true, default_value = "text", value_enum)]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an RTI report for a natural-language question
    Report {
        question: String,

        /// Also render the report to this PDF file
        #[arg(long)]
        pdf: Option<PathBuf>,
    },

    /// Ask the citizen services assistant
    Chat {
        #[arg(required_unless_present = "clear")]
        message: Option<String>,

        /// Forget the stored conversation instead of asking
        #[arg(long, conflicts_with = "message")]
        clear: bool,
    },

    /// Browse projects, optionally within one sector
    Projects {
        #[arg(long)]
        sector: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
        #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: u32,
    },

    /// Full record for one project id
    Project { project_id: String },

    /// Per-sector project summary, optionally limited to a location
    Summary {
        #[arg(long)]
        district: Option<String>,
        #[arg(long)]
        block: Option<String>,
        #[arg(long)]
        panchayat: Option<String>,
    },

    /// Load project documents from a JSON file
    Seed { file: PathBuf },

    /// Store the API key in the OS keyring
    SetKey { key: String },

    /// Remove the API key from the OS keyring
    DeleteKey,
}

#[tokio::main]
async fn main() -> ExitCode {
    app::init_tracing();
    let cli = Cli::parse();
    let format = cli.format;

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if format == OutputFormat::Json {
                let body = serde_json::json!({ "error": e.to_string(), "kind": e.kind() });
                println!("{}", body);
            } else {
                eprintln!("error: {}", e);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::SetKey { key } => return ConfigService::new().save_api_key(&key),
        Commands::DeleteKey => return ConfigService::new().delete_api_key(),
        _ => {}
    }

    let config = AppConfig::load(&cli.config)?;
    let state = bootstrap(config).await?;

    match cli.command {
        Commands::Report { question, pdf } => {
            let report = app::report(&state, &question, pdf.as_deref()).await?;
            emit(cli.format, &report, || {
                format!("{}\n\nApplication No: {}", report.body, report.application_number)
            })
        }
        Commands::Chat { clear: true, .. } => {
            let removed = app::clear_chat(&state).await?;
            emit(cli.format, &serde_json::json!({ "cleared": removed }), || {
                format!("Cleared {} chat turn(s)", removed)
            })
        }
        Commands::Chat { message, .. } => {
            let message = message.unwrap_or_default();
            let reply = app::chat(&state, &message).await?;
            emit(cli.format, &reply, || reply.answer.clone())
        }
        Commands::Projects {
            sector,
            offset,
            page_size,
        } => {
            let listings = app::list_projects(&state, sector.as_deref(), offset, page_size).await?;
            emit(cli.format, &listings, || {
                listings
                    .iter()
                    .map(|p| {
                        format!(
                            "{}  {}  [{}]",
                            p.project_id.as_deref().unwrap_or("-"),
                            p.project_name.as_deref().unwrap_or("-"),
                            p.status.as_deref().unwrap_or("-")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Project { project_id } => {
            let project = app::project_details(&state, &project_id).await?;
            let json = serde_json::to_string_pretty(&project)
                .map_err(|e| AppError::Internal(format!("JSON serialization failed: {}", e)))?;
            emit(cli.format, &project, || json)
        }
        Commands::Summary {
            district,
            block,
            panchayat,
        } => {
            let summary = app::summary(
                &state,
                district.as_deref(),
                block.as_deref(),
                panchayat.as_deref(),
            )
            .await?;
            emit(cli.format, &summary, || {
                let mut lines = vec![format!(
                    "{} projects, allocated {:.0}, spent {:.0} ({:.1}%)",
                    summary.total_projects,
                    summary.total_allocated,
                    summary.total_spent,
                    summary.financial_progress_percentage
                )];
                for sector in &summary.sectors {
                    lines.push(format!(
                        "  {}: {} total, {} planned, {} ongoing, {} completed",
                        sector.name, sector.total_projects, sector.planned, sector.ongoing, sector.completed
                    ));
                }
                lines.join("\n")
            })
        }
        Commands::Seed { file } => {
            let count = app::seed(&state, &file).await?;
            emit(cli.format, &serde_json::json!({ "seeded": count }), || {
                format!("Seeded {} project(s)", count)
            })
        }
        Commands::SetKey { .. } | Commands::DeleteKey => Ok(()),
    }
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce() -> String) -> Result<(), AppError> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)
                .map_err(|e| AppError::Internal(format!("JSON serialization failed: {}", e)))?;
            println!("{}", json);
        }
        OutputFormat::Text => println!("{}", text()),
    }
    Ok(())
}
