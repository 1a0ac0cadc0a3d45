use std::path::PathBuf;

use anyhow::Context;
use cartprod_config::{Config, LoadOptions};
use cartprod_core::{
    build_cartesian, CartError, CartesianOptions, CartesianOutcome, CartesianRequest, Dataset,
    ExitCode, MemoryEngine,
};
use clap::{ArgAction, Parser};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const DOCUMENTATION: &str = "\
The active dataset is the left term of the product and must have a dataset
name. --input2 names the dataset holding the right-hand variables; without it
both variable sets are taken from the active dataset.

--var1 and --var2 list the variables whose cartesian product is computed. The
lists cannot share any names. ALL selects every variable of the dataset and
'a TO b' selects the variables from a through b in dataset order.

--outfile receives the product as a case file. It cannot be the file the
active dataset was opened from. --dsname names the new dataset, which becomes
active; without it a name is generated.

Datasets are JSON Lines case files: a header line {\"variables\": [...]}
followed by one JSON array per case, null for missing values.

Example:
  cartprod --active left=left.jsonl --dataset right=right.jsonl \\
      --input2 right --var1 x1 x2 --var2 y1 y2 \\
      --outfile cartprod.jsonl --dsname cart";

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Compute the cartesian product of two variable sets",
    after_help = DOCUMENTATION
)]
struct Cli {
    /// Case file opened as the active dataset (NAME=PATH, or PATH for an unnamed dataset)
    #[arg(long = "active", value_name = "[NAME=]PATH", value_parser = parse_active)]
    active: ActiveArg,

    /// Additional named dataset (repeatable)
    #[arg(long = "dataset", value_name = "NAME=PATH", value_parser = parse_named)]
    datasets: Vec<NamedPath>,

    /// Dataset holding the right-hand variables (defaults to the active dataset)
    #[arg(long = "input2", value_name = "NAME")]
    input2: Option<String>,

    /// Left-hand variables, taken from the active dataset
    #[arg(long = "var1", value_name = "VARS", num_args = 1.., required = true)]
    var1: Vec<String>,

    /// Right-hand variables
    #[arg(long = "var2", value_name = "VARS", num_args = 1.., required = true)]
    var2: Vec<String>,

    /// File receiving the product
    #[arg(long = "outfile", value_name = "PATH")]
    outfile: PathBuf,

    /// Name of the output dataset
    #[arg(long = "dsname", value_name = "NAME")]
    dsname: Option<String>,

    /// Configuration file overriding discovered settings
    #[arg(long = "config", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Suppress the status message
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Clone, Debug)]
struct NamedPath {
    name: String,
    path: PathBuf,
}

#[derive(Clone, Debug)]
enum ActiveArg {
    Named(NamedPath),
    Unnamed(PathBuf),
}

fn parse_named(raw: &str) -> Result<NamedPath, String> {
    match raw.split_once('=') {
        Some((name, path)) if !name.trim().is_empty() && !path.is_empty() => Ok(NamedPath {
            name: name.trim().to_string(),
            path: PathBuf::from(path),
        }),
        _ => Err(format!("expected NAME=PATH, got '{raw}'")),
    }
}

fn parse_active(raw: &str) -> Result<ActiveArg, String> {
    if raw.contains('=') {
        parse_named(raw).map(ActiveArg::Named)
    } else if raw.is_empty() {
        Err("expected [NAME=]PATH".to_string())
    } else {
        Ok(ActiveArg::Unnamed(PathBuf::from(raw)))
    }
}

fn main() -> std::process::ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli) {
        Ok(exit) | Err(exit) => std::process::ExitCode::from(exit as u8),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("cartprod={level}")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<ExitCode, ExitCode> {
    let config = load_config(&cli).map_err(|err| {
        eprintln!("{err:#}");
        ExitCode::Config
    })?;
    debug!(layers = config.sources.layers.len(), "Configuration loaded");

    let mut engine = open_datasets(&cli).map_err(|err| report(&err))?;

    let request = CartesianRequest {
        var1: cli.var1.clone(),
        var2: cli.var2.clone(),
        outfile: cli.outfile.clone(),
        dsname: cli.dsname.clone(),
        input2: cli.input2.clone(),
        options: CartesianOptions::from_config(&config),
    };

    match build_cartesian(&mut engine, &request) {
        Ok(outcome) => {
            handle_success(&cli, &outcome);
            Ok(ExitCode::Success)
        }
        Err(err) => Err(report(&err)),
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut options = LoadOptions::default();
    if let Some(path) = &cli.config {
        options = options.with_override_path(path);
    }
    Config::load(options).context("failed to load configuration")
}

fn open_datasets(cli: &Cli) -> Result<MemoryEngine, CartError> {
    let mut engine = MemoryEngine::new();

    for named in &cli.datasets {
        engine.insert(&named.name, Dataset::open(&named.path)?);
    }

    match &cli.active {
        ActiveArg::Named(named) => engine.insert_active(&named.name, Dataset::open(&named.path)?),
        ActiveArg::Unnamed(path) => engine.set_unnamed_active(Dataset::open(path)?),
    }

    Ok(engine)
}

fn handle_success(cli: &Cli, outcome: &CartesianOutcome) {
    if cli.quiet {
        return;
    }

    println!(
        "Created dataset {} with {} cases ({} x {}) in {}",
        outcome.dataset,
        outcome.cases,
        outcome.left_cases,
        outcome.right_cases,
        outcome.outfile.display()
    );
}

fn report(err: &CartError) -> ExitCode {
    match err {
        CartError::InvalidArguments(message) | CartError::InvalidVariableList(message) => {
            eprintln!("{message}");
        }
        CartError::Io(io_err) => {
            eprintln!("I/O error: {io_err}");
        }
        other => eprintln!("{other}"),
    }
    err.exit_code()
}
