//! raport-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) and `RAPORT_*`
//! environment variables, opens the SQLite store, and either serves the JSON
//! API over HTTP or runs one administrative command against the store.
//!
//! ```text
//! raport-server                                   # serve
//! raport-server backfill --academic-year 2024/2025 --class-id 3
//! raport-server missing --academic-year 4
//! raport-server check-student 17
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use raport_core::{
  ledger::{BackfillRequest, MissingQuery},
  registry::PeriodRef,
  store::RaportStore,
};
use raport_server::ServerConfig;
use raport_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Raport promotion/history server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml", env = "RAPORT_CONFIG")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the JSON API over HTTP (the default).
  Serve,

  /// Create repair ledger rows for students missing one in an academic year.
  Backfill {
    /// Academic year id or label, e.g. `2024/2025`.
    #[arg(long)]
    academic_year: String,
    #[arg(long)]
    class_id:      Option<i64>,
    #[arg(long)]
    student_id:    Option<i64>,
  },

  /// List students without a ledger row in an academic year.
  Missing {
    /// Academic year id or label.
    #[arg(long)]
    academic_year: String,
    #[arg(long)]
    class_id:      Option<i64>,
  },

  /// Compare a student's cached current class with the ledger.
  CheckStudent {
    student_id: i64,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(config::Environment::with_prefix("RAPORT"))
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;

  let database_path = expand_tilde(&server_cfg.database_path);
  let store = SqliteStore::open(&database_path)
    .await
    .with_context(|| format!("failed to open store at {database_path:?}"))?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(store, &server_cfg).await,
    Command::Backfill { academic_year, class_id, student_id } => {
      let academic_year_id = lookup_year_id(&store, &academic_year).await?;
      let report = store
        .backfill(BackfillRequest { academic_year_id, class_id, student_id })
        .await
        .context("backfill failed")?;
      print_json(&report)
    }
    Command::Missing { academic_year, class_id } => {
      let academic_year_id = lookup_year_id(&store, &academic_year).await?;
      let missing = store
        .list_missing(&MissingQuery { academic_year_id, class_id })
        .await
        .context("failed to list missing students")?;
      print_json(&missing)
    }
    Command::CheckStudent { student_id } => {
      let report = store
        .check_current_class(student_id)
        .await
        .with_context(|| format!("failed to check student {student_id}"))?;
      print_json(&report)
    }
  }
}

async fn serve(store: SqliteStore, cfg: &ServerConfig) -> anyhow::Result<()> {
  let app = raport_server::router(Arc::new(store));
  let address = cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Turn an id or label into an academic-year id. A number is tried as an id,
/// then as a year label; anything else unmatched goes through period
/// resolution, which also accepts a period's own label.
async fn lookup_year_id(store: &SqliteStore, reference: &str) -> anyhow::Result<i64> {
  let reference: PeriodRef = reference.parse()?;
  let years = store
    .list_academic_years()
    .await
    .context("failed to list academic years")?;
  if let PeriodRef::AcademicYearId(id) = reference
    && years.iter().any(|y| y.id == id)
  {
    return Ok(id);
  }
  let label = reference.label_text();
  if let Some(year) = years.iter().find(|y| y.label == label) {
    return Ok(year.id);
  }
  let period = store
    .resolve_period(reference, None)
    .await
    .context("failed to resolve academic year")?;
  Ok(period.academic_year_id)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
