use anyhow::Context;
use clap::{Args, ColorChoice, CommandFactory, FromArgMatches, Parser, Subcommand};
use mobgen::config::{GeneratorConfig, RunSettings};
use mobgen::dataset::sort_by_time_and_id;
use mobgen::dataset_file::{read_dataset, write_dataset};
use mobgen::extract::extract_file;
use mobgen::merge::merge_batches;
use mobgen::pipeline::generate_dataset;
use mobgen::progress::{ConsoleProgress, ProgressReporter};
use mobgen::sumo::SumoBatchRunner;
use std::io::{IsTerminal, stdout};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "mobgen",
    about = "Build vehicle-mobility datasets from batched SUMO runs",
    arg_required_else_help = true
)]
struct Cli {
    /// Disable color
    #[arg(long = "no-color", global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate batches until enough vehicles survive, then merge them
    Generate(GenerateArgs),
    /// Convert one FCD output file into a dataset CSV
    Extract(ExtractArgs),
    /// Merge filtered batch CSVs into one time/id sorted dataset
    Merge(MergeArgs),
    /// Show the effective configuration
    Config(ConfigArgs),
}

#[derive(Args, Clone)]
struct OverrideArgs {
    /// Map file (*.net.xml)
    #[arg(short = 'i', long)]
    input_map: Option<PathBuf>,

    /// Trip duration in seconds
    #[arg(short = 'd', long)]
    duration: Option<f64>,

    /// Total number of vehicles
    #[arg(short = 'n', long)]
    no_vehicle: Option<u64>,

    /// Number of vehicles per batch
    #[arg(short = 'b', long)]
    batch_size: Option<u32>,

    /// Simulation time step (e.g. 0.01 for 10ms)
    #[arg(short = 's', long)]
    step_size: Option<f64>,

    /// Seed trip generation (batch i uses seed + i) instead of --random
    #[arg(long)]
    seed: Option<u64>,

    /// Read settings from this TOML file instead of the user config
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory for per-batch artifacts
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Path of the merged dataset
    #[arg(short = 'o', long, value_name = "CSV")]
    output: Option<PathBuf>,

    /// Do not keep per-batch CSV tables
    #[arg(long)]
    no_intermediates: bool,
}

#[derive(Args, Clone)]
struct GenerateArgs {
    #[command(flatten)]
    overrides: OverrideArgs,

    /// Print a JSON run summary on stdout
    #[arg(long)]
    json: bool,
}

#[derive(Args, Clone)]
struct ExtractArgs {
    /// FCD output of one simulation run
    input: PathBuf,

    /// Ignore timesteps after this time (seconds)
    #[arg(long, value_name = "SECONDS")]
    max_time: f64,

    /// Output CSV (defaults to the input path with a .csv extension)
    #[arg(short, long, value_name = "CSV")]
    output: Option<PathBuf>,

    /// Sort rows by time, then id
    #[arg(long)]
    sorted: bool,
}

#[derive(Args, Clone)]
struct MergeArgs {
    /// Filtered batch CSVs, in batch order
    #[arg(required = true, value_name = "CSV")]
    inputs: Vec<PathBuf>,

    /// Output CSV
    #[arg(short, long, value_name = "CSV", default_value = "mobility_dataset.csv")]
    output: PathBuf,
}

#[derive(Args, Clone)]
struct ConfigArgs {
    #[command(flatten)]
    overrides: OverrideArgs,

    /// Print the user config file location
    #[arg(long, conflicts_with = "save")]
    path: bool,

    /// Write the effective configuration to the user config file
    #[arg(long)]
    save: bool,
}

/// Prints `e` with its causes and yields the exit code.
fn fail<E: Into<anyhow::Error>>(code: i32) -> impl FnOnce(E) -> i32 {
    move |e| {
        eprintln!("Error: {:#}", e.into());
        code
    }
}

fn resolve_config(args: &OverrideArgs) -> Result<GeneratorConfig, i32> {
    let mut config = match &args.config {
        Some(path) => GeneratorConfig::load_from(path).map_err(fail(2))?,
        None => GeneratorConfig::load(),
    };

    let sim = &mut config.simulation;
    if let Some(map) = &args.input_map {
        sim.input_map = Some(map.clone());
    }
    if let Some(duration) = args.duration {
        sim.trip_duration = duration;
    }
    if let Some(n) = args.no_vehicle {
        sim.target_vehicles = n;
    }
    if let Some(batch_size) = args.batch_size {
        sim.batch_size = batch_size;
    }
    if let Some(step) = args.step_size {
        sim.time_step = step;
    }
    if args.seed.is_some() {
        sim.seed = args.seed;
    }
    if let Some(dir) = &args.output_dir {
        config.output.directory = dir.clone();
    }
    if let Some(output) = &args.output {
        config.output.dataset = output.clone();
    }
    if args.no_intermediates {
        config.output.keep_intermediates = false;
    }
    Ok(config)
}

fn resolve_settings(args: &OverrideArgs) -> Result<RunSettings, i32> {
    resolve_config(args)?.validate().map_err(fail(2))
}

fn run_generate(args: GenerateArgs, color: ColorChoice) -> Result<(), i32> {
    let settings = resolve_settings(&args.overrides)?;

    let mut runner = SumoBatchRunner::new(settings.clone()).map_err(fail(1))?;

    // Keep stdout clean for the JSON summary.
    let mut progress: Box<dyn ProgressReporter> = if args.json {
        Box::new(ConsoleProgress::new(std::io::stderr(), false))
    } else {
        let want_color = stdout().is_terminal() && !matches!(color, ColorChoice::Never);
        Box::new(ConsoleProgress::stdout(want_color))
    };

    let summary =
        generate_dataset(&settings, &mut runner, progress.as_mut()).map_err(fail(1))?;

    if args.json {
        match serde_json::to_string_pretty(&summary) {
            Ok(s) => println!("{}", s),
            Err(_) => return Err(3),
        }
    } else {
        println!(
            "Wrote {} rows for {} vehicles to {}",
            summary.rows,
            summary.survivors,
            summary.dataset.display()
        );
    }
    Ok(())
}

fn run_extract(args: ExtractArgs) -> anyhow::Result<PathBuf> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| args.input.with_extension("csv"));
    let mut dataset = extract_file(&args.input, args.max_time)
        .with_context(|| format!("cannot extract {}", args.input.display()))?;
    if args.sorted {
        dataset = sort_by_time_and_id(&dataset);
    }
    write_dataset(&output, &dataset)
        .with_context(|| format!("cannot write {}", output.display()))?;
    Ok(output)
}

fn run_merge(args: &MergeArgs) -> anyhow::Result<usize> {
    let batches = args
        .inputs
        .iter()
        .map(|path| read_dataset(path).with_context(|| format!("cannot read {}", path.display())))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let merged = merge_batches(batches)?;
    write_dataset(&args.output, &merged)
        .with_context(|| format!("cannot write {}", args.output.display()))?;
    Ok(merged.distinct_ids().len())
}

fn run_config(args: ConfigArgs) -> Result<(), i32> {
    if args.path {
        match GeneratorConfig::config_dir() {
            Some(dir) => println!("{}", dir.join("config.toml").display()),
            None => {
                eprintln!("Error: no user configuration directory on this platform");
                return Err(1);
            }
        }
        return Ok(());
    }

    let config = resolve_config(&args.overrides)?;
    if args.save {
        if let Err(e) = config.save() {
            eprintln!("Error: cannot save configuration: {}", e);
            return Err(1);
        }
        return Ok(());
    }
    match toml::to_string_pretty(&config) {
        Ok(s) => print!("{}", s),
        Err(_) => return Err(3),
    }
    Ok(())
}

fn report(result: anyhow::Result<String>) -> Result<(), i32> {
    match result {
        Ok(message) => {
            println!("{}", message);
            Ok(())
        }
        Err(e) => Err(fail(1)(e)),
    }
}

fn detect_color_choice() -> ColorChoice {
    // Scan args before clap so help/errors honor `--no-color`.
    // Mirror clap's parsing by stopping at `--` which terminates flags.
    let mut args = std::env::args_os();
    // Skip binary name
    args.next();
    let mut flag = false;
    for arg in args {
        if arg == "--" {
            break;
        }
        if arg == "--no-color" {
            flag = true;
            break;
        }
    }
    if flag || std::env::var_os("NO_COLOR").is_some_and(|v| !v.is_empty()) {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn main() {
    init_tracing();

    let color = detect_color_choice();
    let matches = Cli::command().color(color).get_matches();
    let cli = Cli::from_arg_matches(&matches).unwrap_or_else(|e| e.exit());
    let outcome = match cli.command {
        Some(Commands::Generate(args)) => run_generate(args, color),
        Some(Commands::Extract(args)) => report(
            run_extract(args).map(|output| format!("Wrote {}", display(&output))),
        ),
        Some(Commands::Merge(args)) => report(run_merge(&args).map(|ids| {
            format!("Merged {} vehicles into {}", ids, display(&args.output))
        })),
        Some(Commands::Config(args)) => run_config(args),
        None => Ok(()),
    };
    if let Err(code) = outcome {
        std::process::exit(code);
    }
}
