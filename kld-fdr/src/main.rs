use clap::{Args, Parser, Subcommand};
use kinase_kld::config::PipelineConfig;
use kinase_kld::error::MotifError;
use kinase_kld::fdr;
use kinase_kld::pipeline::{self, RunSummary};
use kinase_kld::pwm::{pwms_from_fasta_dir, read_pwms, write_pwm_table};
use kinase_kld::scores::{read_id_list, read_null_dir, read_score_table, write_score_table};
use kinase_kld::shuffle;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum CliError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Motif(#[from] MotifError),

    #[error("Nothing to do: {0}")]
    Empty(String),
}

#[derive(Parser)]
#[command(
    name = "kld-fdr",
    about = "Scores kinase motifs against phospho-site modules and estimates an empirical FDR for each pair",
    long_about = "Compares kinase position weight matrices (PWMs) with module PWMs using a symmetric \
                  Kullback-Leibler divergence, builds a null distribution per module by scoring shuffled \
                  kinase PWMs, and reports for every kinase/module pair the fraction of null scores below \
                  the observed score.",
    version,
    after_help = "Example usage:\n    \
                  kld-fdr build --fasta-dir modules/ --output module_pwms.csv\n    \
                  kld-fdr run --kinases kinase_pwms/ --modules module_pwms.csv --output-dir results --iterations 1000 --seed 42\n    \
                  kld-fdr fdr --scores results/observed_scores.tsv --null-dir results/null_scores --output fdr.tsv",
    color = clap::ColorChoice::Auto
)]
struct Cli {
    /// Only log warnings and errors
    #[arg(long, short, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build module PWMs from a directory of aligned peptide FASTA files
    Build(BuildArgs),
    /// Score every kinase PWM against every module PWM
    Score(ScoreArgs),
    /// Generate null scores from shuffled kinase PWMs
    Shuffle(ShuffleArgs),
    /// Estimate the FDR of observed scores against null scores
    Fdr(FdrArgs),
    /// Score, shuffle and estimate FDR in one pass
    Run(RunArgs),
}

#[derive(Args, Debug)]
struct BuildArgs {
    /// Directory with one FASTA file of aligned peptides per module
    #[arg(long, value_name = "DIR")]
    fasta_dir: PathBuf,

    /// PWM table to write (.csv, or .tsv for tab separated)
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Pseudocount added to every residue at every position
    #[arg(long)]
    pseudocount: Option<f64>,

    /// Keep duplicate peptide sequences
    #[arg(long)]
    keep_duplicates: bool,

    /// TOML configuration file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct PwmInputs {
    /// Kinase PWM table, or a directory of tables
    #[arg(long, value_name = "PATH")]
    kinases: PathBuf,

    /// Module PWM table, or a directory of tables
    #[arg(long, value_name = "PATH")]
    modules: PathBuf,
}

#[derive(Args, Debug)]
struct ShuffleOptions {
    /// Shuffles per kinase/module pair
    #[arg(long)]
    iterations: Option<usize>,

    /// Worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Seed for reproducible shuffles
    #[arg(long)]
    seed: Option<u64>,

    /// TOML configuration file; flags override its values
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ScoreArgs {
    #[command(flatten)]
    inputs: PwmInputs,

    /// Observed score table to write
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
}

#[derive(Args, Debug)]
struct ShuffleArgs {
    #[command(flatten)]
    inputs: PwmInputs,

    #[command(flatten)]
    options: ShuffleOptions,

    /// Directory for null-score files, one sub-directory per worker
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,
}

#[derive(Args, Debug)]
struct FdrArgs {
    /// Observed score table (Scores, Kinase, Module)
    #[arg(long, value_name = "FILE")]
    scores: PathBuf,

    /// Directory of null-score files
    #[arg(long, value_name = "DIR")]
    null_dir: PathBuf,

    /// FDR table to write
    #[arg(long, value_name = "FILE")]
    output: PathBuf,

    /// Every kinase that must appear in the output, one per line
    #[arg(long, value_name = "FILE")]
    kinase_list: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    inputs: PwmInputs,

    #[command(flatten)]
    options: ShuffleOptions,

    /// Directory for the score table, null scores and FDR table
    #[arg(long, value_name = "DIR")]
    output_dir: PathBuf,

    /// Every kinase that must appear in the output, one per line
    #[arg(long, value_name = "FILE")]
    kinase_list: Option<PathBuf>,
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, CliError> {
    Ok(match path {
        Some(path) => PipelineConfig::from_file(path)?,
        None => PipelineConfig::default(),
    })
}

fn resolve_config(options: &ShuffleOptions) -> Result<PipelineConfig, CliError> {
    let mut config = load_config(options.config.as_deref())?;
    if let Some(iterations) = options.iterations {
        config.shuffle.iterations = iterations;
    }
    if let Some(workers) = options.workers {
        config.shuffle.workers = workers;
    }
    if options.seed.is_some() {
        config.shuffle.seed = options.seed;
    }
    config.validate()?;
    Ok(config)
}

fn create_parent(path: &Path) -> Result<(), CliError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn build(args: BuildArgs) -> Result<RunSummary, CliError> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(pseudocount) = args.pseudocount {
        config.pseudocount = pseudocount;
    }
    config.validate()?;

    let load = pwms_from_fasta_dir(&args.fasta_dir, config.pseudocount, !args.keep_duplicates)?;
    create_parent(&args.output)?;
    write_pwm_table(&args.output, &load.pwms)?;
    info!("Wrote {} PWM(s) to {}", load.pwms.len(), args.output.display());

    let mut summary = RunSummary::default();
    summary.record_load(&load);
    Ok(summary)
}

fn score(args: ScoreArgs) -> Result<RunSummary, CliError> {
    let kinases = read_pwms(&args.inputs.kinases)?;
    let modules = read_pwms(&args.inputs.modules)?;
    let run = pipeline::score_all(&kinases.pwms, &modules.pwms);
    run.require_scores()?;

    create_parent(&args.output)?;
    write_score_table(&args.output, &run.scores)?;
    info!("Wrote {} score(s) to {}", run.scores.len(), args.output.display());

    let mut summary = RunSummary::default();
    summary.record_load(&kinases);
    summary.record_load(&modules);
    summary.record_scores(&run);
    Ok(summary)
}

fn generate_nulls(args: ShuffleArgs) -> Result<RunSummary, CliError> {
    let config = resolve_config(&args.options)?;
    let kinases = read_pwms(&args.inputs.kinases)?;
    let modules = read_pwms(&args.inputs.modules)?;

    let run = shuffle::generate_null_scores(
        &kinases.pwms,
        &modules.pwms,
        &config.shuffle,
        Some(args.output_dir.as_path()),
    )?;
    run.require_scores()?;
    info!(
        "Wrote {} null-score file(s) under {}",
        run.written().len(),
        args.output_dir.display()
    );

    let mut summary = RunSummary::default();
    summary.record_load(&kinases);
    summary.record_load(&modules);
    summary.record_null(&run);
    Ok(summary)
}

fn estimate_fdr(args: FdrArgs) -> Result<RunSummary, CliError> {
    let observed = read_score_table(&args.scores)?;
    let pools = fdr::pool_by_module(read_null_dir(&args.null_dir)?);
    if pools.is_empty() {
        return Err(CliError::Empty(format!(
            "no null scores under {}",
            args.null_dir.display()
        )));
    }
    fdr::log_pool_summaries(&pools);

    let kinases = match &args.kinase_list {
        Some(path) => read_id_list(path)?,
        None => Vec::new(),
    };
    let records = fdr::estimate(&observed, &pools, &kinases, &[]);

    create_parent(&args.output)?;
    fdr::write_fdr_table(&args.output, &records)?;
    info!("Wrote {} FDR row(s) to {}", records.len(), args.output.display());

    let mut summary = RunSummary::default();
    summary.pairs_scored = observed.len();
    summary.null_scores = pools.values().map(|p| p.len()).sum();
    summary.record_fdr(&records);
    Ok(summary)
}

fn run_all(args: RunArgs) -> Result<RunSummary, CliError> {
    let config = resolve_config(&args.options)?;
    let kinases = read_pwms(&args.inputs.kinases)?;
    let modules = read_pwms(&args.inputs.modules)?;
    let universe = match &args.kinase_list {
        Some(path) => read_id_list(path)?,
        None => Vec::new(),
    };

    let output = pipeline::run(
        &kinases,
        &modules,
        &universe,
        &config,
        Some(args.output_dir.as_path()),
    )?;
    Ok(output.summary)
}

fn main() -> Result<(), CliError> {
    let start_time = std::time::Instant::now();
    let cli = Cli::parse();

    let level = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_millis()
        .init();

    let summary = match cli.command {
        Commands::Build(args) => build(args),
        Commands::Score(args) => score(args),
        Commands::Shuffle(args) => generate_nulls(args),
        Commands::Fdr(args) => estimate_fdr(args),
        Commands::Run(args) => run_all(args),
    }?;

    info!("Summary: {}", summary);
    info!(
        "Total execution time: {:.4} minutes",
        start_time.elapsed().as_secs_f64() / 60.0
    );
    Ok(())
}
