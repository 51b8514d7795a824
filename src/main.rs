use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{debug, error, trace};

use columnar_query::exercises::{
    self, DEFAULT_BATTING, DEFAULT_MASTER, DEFAULT_OUTPUT, DataPaths,
};
use columnar_query::{Session, SessionConfig};

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Run the baseball query workflow over local CSV files
#[derive(Parser, Debug)]
#[command(name = "columnar-query", version)]
#[command(about = "Grouping, aggregation and join queries over CSV datasets", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Session settings in TOML
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    /// Parallelism: local, local[N] or local[*]
    #[arg(long = "session-master", value_name = "MASTER", global = true)]
    session_master: Option<String>,

    /// Rows to print per table (defaults to the configured show_rows)
    #[arg(short = 'n', long, global = true)]
    rows: Option<usize>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Sequence with sqrt and square columns
    Range {
        #[arg(default_value = "20")]
        n: i64,
    },
    /// Mean of the squares, split by parity
    Parity {
        #[arg(default_value = "20")]
        n: i64,
    },
    /// Total runs per year
    RunsPerYear {
        #[arg(long, default_value = DEFAULT_BATTING)]
        batting: PathBuf,
    },
    /// Exact and approximate number of distinct run values
    DistinctRuns {
        #[arg(long, default_value = DEFAULT_BATTING)]
        batting: PathBuf,
        /// Relative standard deviation of the estimate
        #[arg(long, default_value = "0.05")]
        rsd: f64,
    },
    /// Top scorer of each year, saved as CSV
    MaxRuns {
        #[arg(long, default_value = DEFAULT_BATTING)]
        batting: PathBuf,
        #[arg(long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
    },
    /// Total runs by birth state
    RunsPerState {
        #[arg(long, default_value = DEFAULT_BATTING)]
        batting: PathBuf,
        #[arg(long, default_value = DEFAULT_MASTER)]
        master: PathBuf,
        #[arg(long, default_value = "USA")]
        country: String,
    },
    /// Every step in order (default)
    All {
        #[arg(long, default_value = DEFAULT_BATTING)]
        batting: PathBuf,
        #[arg(long, default_value = DEFAULT_MASTER)]
        master: PathBuf,
        #[arg(long, default_value = DEFAULT_OUTPUT)]
        output: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_thread_ids(cli.verbose >= 3)
        .with_line_number(cli.verbose >= 3)
        .init();

    debug!("columnar-query started with verbosity level: {}", cli.verbose);
    trace!("Full CLI args: {:?}", std::env::args().collect::<Vec<_>>());

    if let Err(e) = run(cli) {
        error!("Fatal error: {:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn session_config(cli: &Cli) -> Result<SessionConfig> {
    let mut config = match &cli.config {
        Some(path) => SessionConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    config
        .merge_env_vars()
        .context("invalid COLUMNAR_QUERY_* environment setting")?;
    if let Some(master) = &cli.session_master {
        config.master = master.clone();
    }
    Ok(config)
}

fn run(cli: Cli) -> Result<()> {
    let config = session_config(&cli)?;
    let session = Session::builder()
        .with_config(config)
        .get_or_create()
        .context("failed to start session")?;
    let rows = cli.rows.unwrap_or(session.config().show_rows);

    let command = cli.command.unwrap_or(Commands::All {
        batting: PathBuf::from(DEFAULT_BATTING),
        master: PathBuf::from(DEFAULT_MASTER),
        output: PathBuf::from(DEFAULT_OUTPUT),
    });

    match command {
        Commands::Range { n } => {
            exercises::squares(&session, n)?.show(rows);
        }
        Commands::Parity { n } => {
            let squares = exercises::squares(&session, n)?;
            exercises::parity_means(&squares)?.show(rows);
        }
        Commands::RunsPerYear { batting } => {
            let batting = load(&session, &batting)?;
            exercises::runs_per_year(&batting)?.show(rows);
        }
        Commands::DistinctRuns { batting, rsd } => {
            let batting = load(&session, &batting)?;
            exercises::distinct_runs(&batting)?.show(rows);
            exercises::approx_distinct_runs(&batting, rsd)?.show(rows);
        }
        Commands::MaxRuns { batting, output } => {
            let batting = load(&session, &batting)?;
            let leaders = exercises::max_runs_per_year(&batting)?;
            leaders.show(rows);
            exercises::save_leaderboard(&leaders, &output)
                .with_context(|| format!("failed to save {}", output.display()))?;
            println!("Saved {} rows to {}", leaders.count(), output.display());
        }
        Commands::RunsPerState {
            batting,
            master,
            country,
        } => {
            let batting = load(&session, &batting)?;
            let master = load(&session, &master)?;
            exercises::runs_per_state(&batting, &master, &country)?.show(rows.max(55));
        }
        Commands::All {
            batting,
            master,
            output,
        } => {
            let paths = DataPaths {
                batting,
                master,
                output,
            };
            exercises::run_all(&session, &paths, rows)?;
        }
    }
    Ok(())
}

fn load(session: &Session, path: &std::path::Path) -> Result<columnar_query::DataFrame> {
    exercises::load_table(session, path).with_context(|| format!("failed to read {}", path.display()))
}
