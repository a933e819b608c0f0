//! CLI binary for edgequake-bill2ledger.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `IngestConfig` + a ledger store, then either serves the HTTP endpoint
//! or ingests a single image file.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use clap::{Args, Parser, Subcommand};
use edgequake_bill2ledger::server::{self, DEFAULT_MAX_BODY_BYTES};
use edgequake_bill2ledger::{
    IngestConfig, Ingestor, LedgerStore, MemoryStore, PostgrestStore,
};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve POST /api/analyze-bill on port 3000
  bill2ledger serve

  # Serve on another address with a specific model
  bill2ledger serve --listen 127.0.0.1:8080 --provider openai --model gpt-4.1-mini

  # Ingest one photo into the ledger
  bill2ledger ingest receipt.jpg

  # Try extraction without writing anything
  bill2ledger ingest --dry-run --json receipt.png

ENVIRONMENT VARIABLES:
  SUPABASE_URL               Ledger project URL (required unless --dry-run)
  SUPABASE_SERVICE_ROLE_KEY  Ledger service key (required unless --dry-run)
  BILL2LEDGER_LLM_PROVIDER   Provider (openai, anthropic, gemini, ollama, …)
  BILL2LEDGER_MODEL          Vision model ID
  BILL2LEDGER_LISTEN         Listen address (default 0.0.0.0:3000)
  OPENAI_API_KEY             OpenAI API key
  ANTHROPIC_API_KEY          Anthropic API key
  GEMINI_API_KEY             Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER     Fallback provider when BILL2LEDGER_LLM_PROVIDER is unset
  EDGEQUAKE_MODEL            Fallback model ID

  A .env file in the working directory is loaded before parsing.
"#;

/// Turn receipt photos into ledger rows using Vision LLMs.
#[derive(Parser, Debug)]
#[command(
    name = "bill2ledger",
    version,
    about = "Turn receipt photos into ledger rows using Vision LLMs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "BILL2LEDGER_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "BILL2LEDGER_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the bill analysis endpoint.
    Serve(ServeArgs),

    /// Ingest a single receipt image file.
    Ingest(IngestArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "BILL2LEDGER_LISTEN", default_value = "0.0.0.0:3000")]
    listen: String,

    /// Maximum accepted request body in bytes.
    #[arg(long, env = "BILL2LEDGER_MAX_BODY_BYTES", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: usize,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Receipt image (JPEG, PNG, …).
    file: PathBuf,

    /// Run extraction only; keep the row in memory instead of inserting it.
    #[arg(long)]
    dry_run: bool,

    /// Print the record and stats as JSON.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(flatten)]
    store: StoreArgs,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// LLM model ID (e.g. gpt-4.1-nano, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, env = "BILL2LEDGER_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "BILL2LEDGER_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "BILL2LEDGER_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens.
    #[arg(long, env = "BILL2LEDGER_MAX_TOKENS", default_value_t = 512)]
    max_tokens: usize,

    /// Seconds to wait for the extraction call.
    #[arg(long, env = "BILL2LEDGER_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Reference time zone as a UTC offset in hours.
    #[arg(long, env = "BILL2LEDGER_UTC_OFFSET_HOURS", default_value_t = 8,
          allow_negative_numbers = true)]
    utc_offset_hours: i32,

    /// Path to a text file with a custom extraction prompt.
    #[arg(long, env = "BILL2LEDGER_PROMPT_FILE")]
    prompt_file: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct StoreArgs {
    /// Ledger project URL.
    #[arg(long, env = "SUPABASE_URL")]
    supabase_url: Option<String>,

    /// Ledger service key.
    #[arg(long, env = "SUPABASE_SERVICE_ROLE_KEY", hide_env_values = true)]
    supabase_key: Option<String>,

    /// Ledger table name.
    #[arg(long, env = "BILL2LEDGER_TABLE", default_value = "transactions")]
    table: String,

    /// Seconds to wait for the ledger insert.
    #[arg(long, env = "BILL2LEDGER_STORE_TIMEOUT", default_value_t = 30)]
    store_timeout: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => run_serve(args).await,
        Command::Ingest(args) => run_ingest(args, cli.quiet).await,
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args.pipeline).await?;
    let store = build_store(&args.store)?;
    let ingestor = Ingestor::from_config(config, store)
        .await
        .context("Failed to configure the vision provider")?;

    let app = server::router(Arc::new(ingestor), args.max_body_bytes);
    let listener = server::bind(&args.listen).await?;
    server::serve(listener, app)
        .await
        .context("HTTP server failed")?;
    Ok(())
}

async fn run_ingest(args: IngestArgs, quiet: bool) -> Result<()> {
    let bytes = tokio::fs::read(&args.file)
        .await
        .with_context(|| format!("Failed to read image {:?}", args.file))?;

    let config = build_config(&args.pipeline).await?;
    let store: Arc<dyn LedgerStore> = if args.dry_run {
        Arc::new(MemoryStore::new())
    } else {
        build_store(&args.store)?
    };
    let ingestor = Ingestor::from_config(config, store)
        .await
        .context("Failed to configure the vision provider")?;

    let output = ingestor
        .ingest(Some(&STANDARD.encode(&bytes)))
        .await
        .context("Ingestion failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    let record = &output.record;
    println!("Amount:    {}", record.amount);
    println!("Merchant:  {}", record.merchant);
    println!("Category:  {} ({})", record.category, record.category.zh_label());
    println!("Date:      {}", record.date);
    println!("Note:      {}", record.note);

    if !quiet {
        eprintln!(
            "{} {}  {}ms",
            green("✔"),
            bold(if args.dry_run { "dry run, nothing recorded" } else { "bill recorded" }),
            output.stats.total_duration_ms,
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&output.stats.input_tokens.to_string()),
            dim(&output.stats.output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `IngestConfig`.
async fn build_config(args: &PipelineArgs) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .temperature(args.temperature)
        .max_tokens(args.max_tokens)
        .api_timeout_secs(args.api_timeout)
        .utc_offset_hours(args.utc_offset_hours);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = args.prompt_file {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read extraction prompt from {:?}", path))?;
        builder = builder.extraction_prompt(prompt);
    }

    builder.build().context("Invalid configuration")
}

/// Build the PostgREST store, failing fast when its settings are missing.
fn build_store(args: &StoreArgs) -> Result<Arc<dyn LedgerStore>> {
    let url = args
        .supabase_url
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .context("SUPABASE_URL is not set")?;
    let key = args
        .supabase_key
        .clone()
        .filter(|s| !s.trim().is_empty())
        .context("SUPABASE_SERVICE_ROLE_KEY is not set")?;

    let store = PostgrestStore::new(url, key, &args.table, args.store_timeout)
        .context("Failed to configure the ledger store")?;
    Ok(Arc::new(store))
}
