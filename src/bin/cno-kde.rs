//! cno-kde CLI: CNO density analysis of AFM skin scans.

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};

use cno_kde::{
    config::{AnalysisConfig, KdeSettings, ScaleSettings},
    constants::PixelCoord,
    pipeline::SampleAnalyzer,
    sample::table::read_result_table,
    CnoError, DensityPolicy,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "cno-kde")]
#[command(about = "Corneocyte nano-object density analysis of AFM skin topography scans")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every session folder of the configured source directory.
    Run(RunArgs),

    /// Fit the density of a list of detection centers and print its layers.
    AnalyzePoints(AnalyzePointsArgs),

    /// Print the per-file density index of a result table.
    Summarize {
        /// Result table written by `run`.
        #[arg(long)]
        csv: Utf8PathBuf,
    },
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// TOML configuration file.
    #[arg(long)]
    config: Utf8PathBuf,

    /// Layer accounting policy (overrides `density.policy`).
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Do not write visualization artifacts.
    #[arg(long)]
    no_render: bool,
}

#[derive(Debug, Clone, Args)]
struct AnalyzePointsArgs {
    /// CSV file with `x,y` columns (pixels).
    #[arg(long)]
    points: Utf8PathBuf,

    /// Grid height in pixels.
    #[arg(long)]
    height: usize,

    /// Grid width in pixels.
    #[arg(long)]
    width: usize,

    /// Layer accounting policy.
    #[arg(long, value_enum, default_value_t = PolicyArg::ProbabilityMass)]
    policy: PolicyArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum PolicyArg {
    HardMembership,
    ProbabilityMass,
}

impl PolicyArg {
    fn to_core(self) -> DensityPolicy {
        match self {
            Self::HardMembership => DensityPolicy::HardMembership,
            Self::ProbabilityMass => DensityPolicy::ProbabilityMass,
        }
    }
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => run_batch(&args),
        Commands::AnalyzePoints(args) => run_analyze_points(&args),
        Commands::Summarize { csv } => run_summarize(&csv),
    }
}

// ── run ───────────────────────────────────────────────────────────────

fn run_batch(args: &RunArgs) -> CliResult<()> {
    let mut config = AnalysisConfig::from_file(&args.config)?;
    if let Some(policy) = args.policy {
        config.density.policy = policy.to_core();
    }
    if args.no_render {
        config.render.enabled = false;
    }

    let pipeline = cno_kde::CnoPipeline::from_config(config)?;
    let report = pipeline.run()?;

    for folder in report.completed() {
        println!(
            "{}: {} samples ({} analyzed) -> {}",
            folder.folder,
            folder.records.len(),
            folder.analyzed(),
            folder.csv_path
        );
    }
    for (folder, error) in report.failed() {
        println!("{folder}: FAILED ({error})");
    }
    Ok(())
}

// ── analyze-points ────────────────────────────────────────────────────

fn read_points(path: &Utf8PathBuf) -> CliResult<Vec<PixelCoord>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| CnoError::InvalidCsv(format!("{path}: missing column '{name}'")))
    };
    let (x_col, y_col) = (column("x")?, column("y")?);

    let mut points = Vec::new();
    for row in reader.records() {
        let row = row?;
        let coord = |col: usize| -> CliResult<i64> {
            let value: f64 = row.get(col).unwrap_or_default().trim().parse()?;
            Ok(value.round_ties_even() as i64)
        };
        points.push((coord(x_col)?, coord(y_col)?));
    }
    Ok(points)
}

fn run_analyze_points(args: &AnalyzePointsArgs) -> CliResult<()> {
    let points = read_points(&args.points)?;
    let analyzer = SampleAnalyzer::new(
        &KdeSettings::default(),
        args.policy.to_core(),
        &ScaleSettings::default(),
    );
    let analysis = match analyzer.analyze(&points, args.height, args.width) {
        Ok(analysis) => analysis,
        Err(error) if error.is_unanalyzable() => {
            println!("{} points: unanalyzable ({error})", points.len());
            return Ok(());
        }
        Err(error) => return Err(error.into()),
    };

    println!("points:        {}", points.len());
    println!(
        "bandwidth:     {:.2} px ({}-fold cross-validation)",
        analysis.fit.bandwidth, analysis.fit.folds
    );
    println!("max density:   {:.6e}", analysis.fit.surface.max());
    println!("local maxima:  {:?}", analysis.fit.surface.local_maxima());
    println!("policy:        {}", analyzer.policy());
    println!();
    println!("{:>5} {:>14} {:>10} {:>10} {:>12}", "layer", "threshold", "area", "cno", "density");
    if let Some(layers) = analysis.layers.layers() {
        for (j, layer) in layers.iter().enumerate() {
            println!(
                "{:>5} {:>14.6e} {:>10} {:>10} {:>12}",
                j, layer.threshold, layer.pixel_area, layer.object_count, layer.density
            );
        }
    }
    if let Some(index) = analysis.layers.density_index() {
        println!();
        println!("density index (layers 16-18): {index}");
    }
    Ok(())
}

// ── summarize ─────────────────────────────────────────────────────────

fn run_summarize(csv: &Utf8PathBuf) -> CliResult<()> {
    let rows = read_result_table(csv)?;
    println!("{:<40} {:>6} {:>14}", "File", "CNO", "density index");
    for row in &rows {
        let index = row
            .density_index
            .map_or_else(|| "nan".to_string(), |v| v.to_string());
        println!("{:<40} {:>6} {:>14}", row.file, row.cno, index);
    }
    Ok(())
}
