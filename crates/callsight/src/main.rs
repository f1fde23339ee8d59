use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use callsight::cli::{commands, Context};
use callsight::listing::{CallFilter, DEFAULT_LIMIT};

#[derive(Parser)]
#[command(name = "callsight")]
#[command(about = concat!(
  "Callsight - sales-call analysis\n",
  "Transcript features, similar-call retrieval and coaching nudges"
))]
#[command(version)]
struct Cli {
  /// Call store location (overrides config and CALLSIGHT_DATA)
  #[arg(long, global = true)]
  data: Option<PathBuf>,

  /// Configuration file
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  /// Print machine-readable JSON
  #[arg(long, global = true)]
  json: bool,

  /// Enable verbose logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Store calls from a JSON array or JSON-lines file
  Ingest {
    /// File holding the calls
    file: PathBuf,
  },
  /// Extract features for calls that have not been processed yet
  Process,
  /// List the calls most similar to a call
  Similar {
    call_id: String,
    /// Number of calls to return
    #[arg(short, long)]
    k: Option<usize>,
  },
  /// Generate coaching nudges for a call
  Advise { call_id: String },
  /// Similar calls plus coaching nudges for a call
  Recommend {
    call_id: String,
    /// Number of calls to return
    #[arg(short, long)]
    k: Option<usize>,
  },
  /// List stored calls, newest first
  Calls {
    /// Only calls handled by this agent
    #[arg(long)]
    agent: Option<String>,
    /// First day to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,
    /// Last day to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,
    /// Lowest customer sentiment to include
    #[arg(long, allow_hyphen_values = true)]
    min_sentiment: Option<f32>,
    /// Highest customer sentiment to include
    #[arg(long, allow_hyphen_values = true)]
    max_sentiment: Option<f32>,
    /// Number of matching calls to skip
    #[arg(long, default_value_t = 0)]
    skip: usize,
    /// Maximum number of calls to list
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,
  },
  /// Per-agent call counts and averages
  Analytics,
  /// Show the effective configuration
  Config,
}

async fn handle(ctx: &Context, command: Command) -> Result<()> {
  match command {
    Command::Ingest { file } => commands::ingest(ctx, &file).await,
    Command::Process => commands::process(ctx).await,
    Command::Similar { call_id, k } => commands::similar(ctx, &call_id, k).await,
    Command::Advise { call_id } => commands::advise(ctx, &call_id).await,
    Command::Recommend { call_id, k } => commands::recommend(ctx, &call_id, k).await,
    Command::Calls { agent, from, to, min_sentiment, max_sentiment, skip, limit } => {
      let filter = CallFilter {
        agent_id: agent,
        from_date: from,
        to_date: to,
        min_sentiment,
        max_sentiment,
        skip,
        limit,
      };
      commands::calls(ctx, &filter).await
    }
    Command::Analytics => commands::analytics(ctx).await,
    Command::Config => commands::show_config(ctx),
  }
}

fn init_logging(verbose: bool) {
  let default = if verbose { "callsight=debug,info" } else { "callsight=info,warn" };
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

  tracing_subscriber::registry()
    .with(fmt::layer().with_writer(std::io::stderr))
    .with(filter)
    .init();
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();
  init_logging(cli.verbose);

  let ctx = Context::load(cli.config.as_deref(), cli.data, cli.json)?;
  handle(&ctx, cli.command).await?;
  Ok(())
}
