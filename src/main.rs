use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use firmscout::config::Settings;
use firmscout::ingest::csv::CsvImporter;
use firmscout::model::{CompanyFilter, CompanyPatch, CompanyStatus};
use firmscout::services::{EnrichmentParams, EnrichmentService};
use firmscout::sources::{self, SourceKind};
use firmscout::state::AppState;

#[derive(Debug, Parser)]
#[command(name = "firmscout")]
#[command(about = "M&A lead generation for French accounting firms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Source {
    /// Pappers REST API (requires PAPPERS_API_KEY)
    Pappers,
    /// Société.com result pages
    Societe,
}

impl From<Source> for SourceKind {
    fn from(source: Source) -> Self {
        match source {
            Source::Pappers => SourceKind::Pappers,
            Source::Societe => SourceKind::Societe,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion source to completion
    Scrape {
        #[arg(value_enum)]
        source: Source,
    },
    /// Import companies from a CSV file
    Import {
        file: PathBuf,
        /// Overwrite records whose SIREN already exists
        #[arg(long)]
        update_existing: bool,
    },
    /// Score stored companies with the configured scorer
    Enrich {
        /// Revenue floor for batch selection
        #[arg(long)]
        min_revenue: Option<f64>,
        /// Skip companies already scored below this
        #[arg(long)]
        min_score: Option<f64>,
        /// Score a single company instead of a batch
        #[arg(long)]
        siren: Option<String>,
    },
    /// List stored companies, best prospects first
    List {
        #[arg(long)]
        min_revenue: Option<f64>,
        /// Workflow status, e.g. "to-contact" or "in discussion"
        #[arg(long)]
        status: Option<String>,
        /// Substring match on the address line
        #[arg(long)]
        city: Option<String>,
        /// Substring match on name or SIREN
        #[arg(long)]
        search: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
        #[arg(long)]
        offset: Option<u32>,
    },
    /// Print one company with its activity trail
    Show { siren: String },
    /// Move a company through the prospection workflow
    SetStatus {
        siren: String,
        /// e.g. "in-discussion", "deal-signed", "abandoned"
        status: String,
    },
    /// Remove a company from the store
    Delete { siren: String },
    /// Show ingestion runs started by this process
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "firmscout=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let state = Arc::new(AppState::new(Settings::from_env())?);

    match cli.command {
        Commands::Scrape { source } => scrape(&state, source.into()).await?,
        Commands::Import {
            file,
            update_existing,
        } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("could not read {}", file.display()))?;
            let file_name = file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file.display().to_string());

            let importer = CsvImporter::new(Arc::clone(&state.store));
            let report = importer.import(&file_name, &bytes, update_existing)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Enrich {
            min_revenue,
            min_score,
            siren,
        } => {
            let defaults = EnrichmentParams::default();
            let params = EnrichmentParams {
                min_revenue: min_revenue.unwrap_or(defaults.min_revenue),
                min_score: min_score.unwrap_or(defaults.min_score),
                siren,
            };

            let service =
                EnrichmentService::new(Arc::clone(&state.store), Arc::clone(&state.scorer));
            let report = service.run(params).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::List {
            min_revenue,
            status,
            city,
            search,
            limit,
            offset,
        } => {
            let filter = CompanyFilter {
                min_revenue,
                status: status.as_deref().map(parse_status).transpose()?,
                city,
                search,
                limit,
                offset,
            };

            let companies = state.store.list(&filter)?;
            for company in &companies {
                println!(
                    "{}  {:<40}  {:>12}  {:>5}  {}",
                    company.siren,
                    company.legal_name,
                    company
                        .annual_revenue
                        .map(|r| format!("{:.0}", r))
                        .unwrap_or_else(|| "-".to_string()),
                    company
                        .prospection_score
                        .map(|s| format!("{:.0}", s))
                        .unwrap_or_else(|| "-".to_string()),
                    company.status.as_str(),
                );
            }
            println!("{} companies", companies.len());
        }
        Commands::Show { siren } => {
            let company = state
                .store
                .get(&siren)?
                .with_context(|| format!("no company with SIREN {}", siren))?;
            println!("{}", serde_json::to_string_pretty(&company)?);

            let activity = state.store.activity(&siren, 20)?;
            if !activity.is_empty() {
                println!("{}", serde_json::to_string_pretty(&activity)?);
            }
        }
        Commands::SetStatus { siren, status } => {
            let patch = CompanyPatch {
                status: Some(parse_status(&status)?),
                ..CompanyPatch::default()
            };
            if !state.store.update(&siren, &patch)? {
                bail!("no company with SIREN {}", siren);
            }
            println!("{} -> {}", siren, status);
        }
        Commands::Delete { siren } => {
            if !state.store.delete(&siren)? {
                bail!("no company with SIREN {}", siren);
            }
            println!("{} deleted", siren);
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&state.runs.all())?);
        }
    }

    Ok(())
}

/// Start the source and poll its status until the run lands terminal
async fn scrape(state: &Arc<AppState>, kind: SourceKind) -> Result<()> {
    let run_id = sources::spawn_scrape(state, kind)?;
    println!("Started {} run {}", kind.name(), run_id);

    let mut last_message = String::new();
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let Some(status) = state.runs.status(kind.id()) else {
            continue;
        };
        if status.message != last_message {
            println!(
                "[{:>3}%] {} (new: {}, skipped: {})",
                status.progress, status.message, status.new_companies, status.skipped_companies
            );
            last_message = status.message.clone();
        }
        if status.is_terminal() {
            if let Some(error) = status.error {
                bail!("{} run failed: {}", kind.name(), error);
            }
            println!(
                "{} finished: {} new, {} skipped",
                kind.name(),
                status.new_companies,
                status.skipped_companies
            );
            return Ok(());
        }
    }
}

/// Accepts the stored label with spaces or hyphens, any case
fn parse_status(value: &str) -> Result<CompanyStatus> {
    CompanyStatus::parse(&value.replace('-', " ").to_lowercase())
        .with_context(|| format!("unknown status '{}'", value))
}
