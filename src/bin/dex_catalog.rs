use std::io::{self, Write};
use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tokio::runtime::Runtime;
use tracing_subscriber::EnvFilter;

use dex_catalog::app::{App, FetchResult, ProgressSink};
use dex_catalog::config::{ConfigLoader, ConfigOverrides, PipelineConfig};
use dex_catalog::error::DexError;
use dex_catalog::output::{
    ConsoleProgress, JsonOutput, OutputMode, print_fetch_summary, print_load_summary,
    stale_snapshot_notice,
};
use dex_catalog::pokeapi::PokeApiHttpClient;
use dex_catalog::prompt::confirm;

#[derive(Parser)]
#[command(name = "dex-catalog")]
#[command(about = "Fetch the remote creature catalog into a JSON snapshot and load it into SQLite")]
#[command(version, author)]
struct Cli {
    /// Skip confirmations; implies --json.
    #[arg(long, global = true)]
    non_interactive: bool,

    /// Print phase results as JSON on stdout.
    #[arg(long, global = true)]
    json: bool,

    #[command(flatten)]
    pipeline: PipelineArgs,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args)]
struct PipelineArgs {
    #[arg(long, global = true)]
    config: Option<Utf8PathBuf>,

    /// Maximum number of detail fetches in flight.
    #[arg(long, global = true)]
    concurrency: Option<usize>,

    /// How many entries to request from the listing endpoint.
    #[arg(long, global = true)]
    limit: Option<usize>,

    #[arg(long, global = true)]
    snapshot: Option<Utf8PathBuf>,

    #[arg(long, global = true)]
    database: Option<Utf8PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Run both phases, confirming each (default)")]
    Run,
    #[command(about = "Fetch every entry and write the snapshot")]
    Fetch,
    #[command(about = "Load the snapshot into the catalog database")]
    Load,
    #[command(about = "Show one entry by name or id")]
    Lookup(LookupArgs),
}

#[derive(Args)]
struct LookupArgs {
    name_or_id: String,

    /// Read from the loaded database instead of the remote catalog.
    #[arg(long)]
    local: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(dex) = report.downcast_ref::<DexError>() {
            return ExitCode::from(map_exit_code(dex));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &DexError) -> u8 {
    match error {
        DexError::NotFound(_) => 2,
        err if err.is_configuration() => 2,
        err if err.is_remote() => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.json || cli.non_interactive {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    let PipelineArgs {
        config,
        concurrency,
        limit,
        snapshot,
        database,
    } = cli.pipeline;
    let overrides = ConfigOverrides {
        concurrency,
        listing_limit: limit,
        snapshot_path: snapshot,
        database_path: database,
    };
    let config = ConfigLoader::resolve(config.as_deref(), overrides)?;
    let app = build_app(config)?;
    let runtime = Runtime::new().into_diagnostic()?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_pipeline(&app, &runtime, cli.non_interactive, output_mode),
        Commands::Fetch => run_fetch(&app, &runtime, output_mode).map(|_| ()),
        Commands::Load => run_load(&app, output_mode),
        Commands::Lookup(args) => run_lookup(&app, &runtime, args, output_mode),
    }
}

fn build_app(config: PipelineConfig) -> miette::Result<App<PokeApiHttpClient>> {
    let client = PokeApiHttpClient::new(&config.base_url, config.request_timeout)?;
    Ok(App::new(client, config))
}

fn run_pipeline(
    app: &App<PokeApiHttpClient>,
    runtime: &Runtime,
    non_interactive: bool,
    output_mode: OutputMode,
) -> miette::Result<()> {
    if non_interactive {
        let fetched = run_fetch(app, runtime, output_mode)?;
        warn_if_stale(&fetched, &mut io::stderr());
        return run_load(app, output_mode);
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    // Keep stdout clean for JSON results.
    let mut chatter: Box<dyn Write> = match output_mode {
        OutputMode::Json => Box::new(io::stderr()),
        OutputMode::Human => Box::new(io::stdout()),
    };
    writeln!(chatter, "--- Catalog data pipeline ---").into_diagnostic()?;

    if confirm(
        &mut input,
        &mut chatter,
        "Phase 1: Do you want to fetch all data from the remote catalog?",
    )? {
        let fetched = run_fetch(app, runtime, output_mode)?;
        warn_if_stale(&fetched, &mut chatter);
    } else {
        writeln!(chatter, "Skipping remote fetch.").into_diagnostic()?;
    }

    writeln!(chatter, "{}", "-".repeat(20)).into_diagnostic()?;

    let question = format!(
        "Phase 2: Do you want to populate the database from {}?",
        app.config().snapshot_path
    );
    if confirm(&mut input, &mut chatter, &question)? {
        run_load(app, output_mode)?;
    } else {
        writeln!(chatter, "Skipping database population.").into_diagnostic()?;
    }

    writeln!(chatter, "\nData pipeline finished.").into_diagnostic()?;
    Ok(())
}

fn warn_if_stale(result: &FetchResult, out: &mut dyn Write) {
    if let Some(notice) = stale_snapshot_notice(result) {
        let _ = writeln!(out, "\x1b[33m{notice}\x1b[0m");
    }
}

fn run_fetch(
    app: &App<PokeApiHttpClient>,
    runtime: &Runtime,
    output_mode: OutputMode,
) -> miette::Result<FetchResult> {
    let result = match output_mode {
        OutputMode::Json => {
            let result = runtime.block_on(app.fetch(&JsonOutput))?;
            JsonOutput::print_fetch(&result).into_diagnostic()?;
            result
        }
        OutputMode::Human => {
            let progress = ConsoleProgress::new();
            let result = runtime.block_on(app.fetch(&progress as &dyn ProgressSink))?;
            print_fetch_summary(&result);
            result
        }
    };
    Ok(result)
}

fn run_load(app: &App<PokeApiHttpClient>, output_mode: OutputMode) -> miette::Result<()> {
    match output_mode {
        OutputMode::Json => {
            let result = app.load(&JsonOutput)?;
            JsonOutput::print_load(&result).into_diagnostic()?;
        }
        OutputMode::Human => {
            let result = app.load(&ConsoleProgress::new())?;
            print_load_summary(&result);
        }
    }
    Ok(())
}

fn run_lookup(
    app: &App<PokeApiHttpClient>,
    runtime: &Runtime,
    args: LookupArgs,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let record = if args.local {
        app.lookup_local(&args.name_or_id)?
    } else {
        runtime.block_on(app.lookup(&args.name_or_id))?
    };
    match output_mode {
        OutputMode::Json => JsonOutput::print_entry(&record).into_diagnostic()?,
        OutputMode::Human => println!("{record}"),
    }
    Ok(())
}
