//! # Precedent CLI (`precedent`)
//!
//! The `precedent` binary indexes structured case records, searches them by
//! meaning, and predicts outcomes for new fact patterns from stored
//! precedent.
//!
//! ## Usage
//!
//! ```bash
//! precedent --config ./config/precedent.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `precedent init` | Create the SQLite store and its schema |
//! | `precedent index <file.json>` | Embed and index one case or a list of cases |
//! | `precedent delete <case_id>` | Remove every section of a case |
//! | `precedent search "<query>"` | Ranked semantic search over case sections |
//! | `precedent similar <case_id>` | Cases whose reasoning resembles an indexed case |
//! | `precedent predict --facts .. --issue ..` | Outcome prediction from similar cases |
//! | `precedent stats` | Store summary |
//! | `precedent completions <shell>` | Shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! precedent index ./cases/landlord-tenant.json
//! precedent search "implied warranty of habitability" --section reasoning --limit 5
//! precedent predict --facts "Tenant withheld rent after repeated flooding..." \
//!                   --issue "Whether the warranty excuses rent"
//! ```

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use precedent::config;
use precedent::models::SectionType;

/// Precedent: semantic search and outcome prediction over court decisions.
///
/// All commands except `completions` read a TOML configuration file. See
/// `config/precedent.example.toml` for a full example.
#[derive(Parser)]
#[command(name = "precedent", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/precedent.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the store and schema. Safe to run repeatedly.
    Init,

    /// Embed and index case records from a JSON file.
    ///
    /// The file holds one case object or an array of them. Cases whose
    /// normalized name and year are already indexed are skipped unless
    /// `--force` is given.
    Index {
        /// Path to the JSON file.
        file: PathBuf,

        /// Overwrite cases that are already indexed.
        #[arg(long)]
        force: bool,
    },

    /// Delete every section of a case.
    Delete {
        case_id: String,
    },

    /// Search indexed case sections.
    Search {
        /// Natural-language query (at most 1000 characters).
        query: String,

        /// Restrict results to one section type (facts, issue, reasoning,
        /// holding, judgment). Matching sections also receive the section boost.
        #[arg(long)]
        section: Option<SectionType>,

        /// Only cases decided in or after this year.
        #[arg(long)]
        from_year: Option<i32>,

        /// Only cases decided in or before this year.
        #[arg(long)]
        to_year: Option<i32>,

        /// Maximum number of results. Defaults to `[search].default_top_k`.
        #[arg(long)]
        limit: Option<usize>,

        /// Minimum raw cosine similarity. Defaults to `[search].min_similarity`.
        #[arg(long)]
        min_similarity: Option<f64>,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Find cases similar to an indexed case.
    Similar {
        case_id: String,

        #[arg(long)]
        limit: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Predict the outcome of a new case from similar precedent.
    Predict {
        /// Facts of the new case (20 to 10000 characters).
        #[arg(long)]
        facts: String,

        /// Legal issue presented (10 to 1000 characters).
        #[arg(long)]
        issue: String,

        /// Only consider precedent decided in or after this year.
        #[arg(long)]
        from_year: Option<i32>,

        /// Only consider precedent decided in or before this year.
        #[arg(long)]
        to_year: Option<i32>,

        #[arg(long)]
        json: bool,
    },

    /// Show store statistics.
    Stats,

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

fn init_tracing(default_level: &str) {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("precedent={}", default_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Completions { shell } = cli.command {
        clap_complete::generate(shell, &mut Cli::command(), "precedent", &mut std::io::stdout());
        return Ok(());
    }

    let cfg = config::load_config(&cli.config)?;
    init_tracing(&cfg.logging.level);

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Index { file, force } => commands::run_index(&cfg, &file, force).await?,
        Commands::Delete { case_id } => commands::run_delete(&cfg, &case_id).await?,
        Commands::Search {
            query,
            section,
            from_year,
            to_year,
            limit,
            min_similarity,
            json,
        } => {
            commands::run_search(
                &cfg,
                commands::SearchArgs {
                    query,
                    section,
                    from_year,
                    to_year,
                    limit,
                    min_similarity,
                    json,
                },
            )
            .await?
        }
        Commands::Similar {
            case_id,
            limit,
            json,
        } => commands::run_similar(&cfg, &case_id, limit, json).await?,
        Commands::Predict {
            facts,
            issue,
            from_year,
            to_year,
            json,
        } => commands::run_predict(&cfg, &facts, &issue, (from_year, to_year), json).await?,
        Commands::Stats => commands::run_stats(&cfg).await?,
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
