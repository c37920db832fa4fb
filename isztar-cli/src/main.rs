//! isztar - customs tariff lookups and nomenclature code search
//!
//! Runs the HTTP facade (`isztar serve`) or answers one lookup from the
//! command line.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use isztar_core::catalog::normalize_lookup;
use isztar_core::upstream::MeasuresQuery;
use isztar_core::{HttpUpstream, SearchEngine, SearchRequest, ServiceConfig, TariffUpstream};

mod error;
mod server;

/// Log levels
#[derive(Debug, Clone, ValueEnum)]
enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_filter_directive(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

#[derive(Parser, Debug)]
#[clap(
    name = "isztar",
    about = "Customs tariff lookups and nomenclature code search over the ISZTAR API",
    version
)]
struct Cli {
    #[clap(subcommand)]
    command: Command,

    /// Set log level
    #[clap(long, default_value = "info", global = true)]
    log_level: LogLevel,

    /// Emit logs as JSON lines
    #[clap(long, global = true)]
    log_json: bool,

    /// Configuration file (defaults to the platform config dir)
    #[clap(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Parser, Debug)]
enum Command {
    /// Run the HTTP facade
    Serve {
        /// Listen address, overrides `server.bind`
        #[clap(long)]
        bind: Option<String>,
    },

    /// Build a small index and search code descriptions
    Search {
        /// Text to look for in descriptions
        query: String,

        #[clap(long)]
        date: Option<String>,

        #[clap(long)]
        language: Option<String>,

        /// Maximum number of results
        #[clap(long)]
        limit: Option<usize>,

        /// Output results as JSON
        #[clap(long)]
        json: bool,
    },

    /// Build the index and print its metadata
    Rebuild {
        #[clap(long)]
        date: Option<String>,

        #[clap(long)]
        language: Option<String>,

        /// Maximum pages to fetch
        #[clap(long)]
        pages: Option<u32>,
    },

    /// Print the measures for one nomenclature code
    Measures {
        /// Nomenclature code, e.g. 0101
        code: String,

        #[clap(long)]
        date: Option<String>,

        #[clap(long)]
        language: Option<String>,
    },
}

/// Initialize tracing with CLI flags
///
/// Logs always go to stderr so command output on stdout stays parseable.
fn initialize_tracing(log_level: &LogLevel, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_filter_directive()));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }
}

#[derive(Tabled)]
struct CodeRow {
    #[tabled(rename = "Code")]
    code: String,
    #[tabled(rename = "Description")]
    description: String,
}

struct Services {
    config: ServiceConfig,
    upstream: Arc<dyn TariffUpstream>,
    engine: Arc<SearchEngine>,
}

fn build_services(config: ServiceConfig) -> Result<Services> {
    let upstream: Arc<dyn TariffUpstream> = Arc::new(
        HttpUpstream::new(&config.upstream).context("Failed to create upstream client")?,
    );
    let engine = Arc::new(SearchEngine::new(Arc::clone(&upstream), config.index.clone()));

    Ok(Services {
        config,
        upstream,
        engine,
    })
}

/// Apply config defaults to optional `date`/`language` flags
fn lookup(
    config: &ServiceConfig,
    date: Option<String>,
    language: Option<String>,
) -> Result<(String, String)> {
    let date = date.unwrap_or_else(|| config.defaults.date.clone());
    let language = language.unwrap_or_else(|| config.defaults.language.clone());
    Ok(normalize_lookup(&date, &language)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    initialize_tracing(&cli.log_level, cli.log_json);

    let config = ServiceConfig::load(cli.config.as_deref())?;
    debug!("Effective configuration: {:?}", config);
    let services = build_services(config)?;

    match cli.command {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| services.config.server.bind.clone());
            let state = Arc::new(server::AppState {
                engine: services.engine,
                upstream: services.upstream,
                defaults: services.config.defaults,
            });
            server::serve(state, &bind).await
        }

        Command::Search {
            query,
            date,
            language,
            limit,
            json,
        } => {
            let (date, language) = lookup(&services.config, date, language)?;
            let request = SearchRequest {
                q: query,
                date,
                language,
                limit: limit.unwrap_or(services.config.index.default_search_limit),
            };
            let response = services.engine.search(&request).await?;

            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
                return Ok(());
            }

            if let Some(error) = &response.index_meta.last_error {
                eprintln!("Warning: index build failed: {error}");
            }

            if response.items.is_empty() {
                println!("No codes matching '{}'", response.query);
                return Ok(());
            }

            let rows: Vec<CodeRow> = response
                .items
                .iter()
                .map(|record| CodeRow {
                    code: record.code.clone(),
                    description: record.description.clone(),
                })
                .collect();

            let table = Table::new(&rows)
                .with(Style::rounded())
                .with(Modify::new(Rows::first()).with(Alignment::center()))
                .to_string();
            println!("{table}");
            println!(
                "{} result(s) from {} indexed code(s)",
                response.count, response.index_meta.count
            );
            Ok(())
        }

        Command::Rebuild {
            date,
            language,
            pages,
        } => {
            let (date, language) = lookup(&services.config, date, language)?;
            let meta = services
                .engine
                .rebuild(&date, &language, pages)
                .await
                .map_err(|err| anyhow::anyhow!(err.render_chain()))
                .context("Index rebuild failed")?;

            println!("{}", serde_json::to_string_pretty(&meta)?);
            Ok(())
        }

        Command::Measures {
            code,
            date,
            language,
        } => {
            let (date, language) = lookup(&services.config, date, language)?;
            let payload = services
                .upstream
                .fetch_measures(&MeasuresQuery {
                    code,
                    date,
                    language,
                })
                .await
                .context("Measures lookup failed")?;

            println!("{}", serde_json::to_string_pretty(&payload)?);
            Ok(())
        }
    }
}
