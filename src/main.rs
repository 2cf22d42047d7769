use anyhow::Context;
use clap::{Parser, Subcommand};
use incident_kb_search::{
    config::Config,
    models::Document,
    query::QueryParser,
    ranking::RankingProfile,
    search::{SearchOptions, SearchService, SortOrder},
    AppError,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "kb-search")]
#[command(about = "Search an incident knowledge base", version, long_about = None)]
struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, env = "CONFIG_PATH")]
    config: Option<PathBuf>,

    /// JSON array of knowledge-base entries
    #[arg(short, long, env = "KB_SEARCH_DOCUMENTS", default_value = "knowledge.json")]
    documents: PathBuf,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a query and print the ranked results
    Search {
        #[arg(value_name = "QUERY")]
        query: String,

        #[arg(short, long, default_value = "10")]
        limit: u64,

        #[arg(short, long, default_value = "0")]
        offset: u64,

        /// Only entries in this category
        #[arg(short = 'C', long)]
        category: Option<String>,

        /// Only entries carrying this tag; repeatable
        #[arg(short, long = "tag")]
        tags: Vec<String>,

        /// relevance, usage, recent or success_rate
        #[arg(short, long, default_value = "relevance")]
        sort: SortOrder,

        /// Treat every term as fuzzy
        #[arg(short, long)]
        fuzzy: bool,

        /// balanced, precision, recall or domain_focused
        #[arg(short, long)]
        profile: Option<RankingProfile>,

        /// Leave out score explanations
        #[arg(long)]
        no_explain: bool,
    },

    /// Complete a partially typed query
    Suggest {
        #[arg(value_name = "PARTIAL")]
        partial: String,
    },

    /// Check a query and report parse problems
    Validate {
        #[arg(value_name = "QUERY")]
        query: String,
    },

    /// Print index and cache statistics
    Stats {
        /// Also print Prometheus metrics
        #[arg(short, long)]
        metrics: bool,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_from(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(Config::load().unwrap_or_else(|e| {
            eprintln!("Failed to load configuration: {}", e);
            eprintln!("Using default configuration");
            Config::default()
        })),
    }
}

fn print_json<T: serde::Serialize>(value: &T) -> incident_kb_search::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_service(config: &Config, documents: &Path) -> incident_kb_search::Result<SearchService> {
    let documents = Document::load_all(documents)?;
    tracing::info!(documents = documents.len(), "Knowledge base loaded");
    Ok(SearchService::in_memory(config, documents).0)
}

async fn run(command: Commands, config: &Config, documents: &Path) -> incident_kb_search::Result<()> {
    match command {
        Commands::Search {
            query,
            limit,
            offset,
            category,
            tags,
            sort,
            fuzzy,
            profile,
            no_explain,
        } => {
            let options = SearchOptions {
                limit,
                offset,
                category,
                tags,
                sort,
                fuzzy,
                profile,
                include_explanation: !no_explain,
                ..SearchOptions::default()
            };
            let response = open_service(config, documents)?.search(&query, &options).await?;
            print_json(&response)?;
        }

        Commands::Suggest { partial } => {
            print_json(&open_service(config, documents)?.suggest(&partial).await)?;
        }

        Commands::Validate { query } => {
            let parser = QueryParser::new(config.query.clone());
            let result = parser.validate(&query);
            print_json(&result)?;
            if !result.valid {
                return Err(AppError::Validation(result.errors.join("; ")));
            }
        }

        Commands::Stats { metrics } => {
            print_json(&open_service(config, documents)?.get_statistics().await)?;
            if metrics {
                println!("{}", incident_kb_search::metrics::gather_metrics());
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing; logs go to stderr so stdout stays machine readable
    let json_logs = cli.json_logs || config.observability.json_logs;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("incident_kb_search={}", config.observability.log_level).into()
    });
    tracing_subscriber::registry()
        .with(filter)
        .with((!json_logs).then(|| fmt::layer().with_writer(std::io::stderr)))
        .with(json_logs.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .init();

    tracing::info!("Starting kb-search v{}", env!("CARGO_PKG_VERSION"));

    if config.observability.prometheus_enabled {
        if let Err(e) = incident_kb_search::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
        }
    }

    if let Err(e) = run(cli.command, &config, &cli.documents).await {
        tracing::error!(code = e.error_code(), error = %e, "Command failed");
        return Err(e.into());
    }
    Ok(())
}
