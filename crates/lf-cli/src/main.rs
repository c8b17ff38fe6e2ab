//! licefit CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use lf_inference::{
    BadCountPolicy, CageRecord, DriverSeries, EstimatorConfig, Metric, OptimizerConfig,
    RateEstimator, Topology, aggregate_cages, build_histogram, cages::parse_cage_date,
};

mod ingest;
mod report;

#[derive(Parser)]
#[command(name = "licefit")]
#[command(about = "licefit - compartment-ODE fitting of parasite count distributions")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TopologyArg {
    /// Fall-off chain (k_inf, k_acc, k_fall)
    FallOff,
    /// Pure accumulation chain (k_inf, acc), absorbing terminal
    Accumulation,
}

impl From<TopologyArg> for Topology {
    fn from(arg: TopologyArg) -> Self {
        match arg {
            TopologyArg::FallOff => Topology::FallOff,
            TopologyArg::Accumulation => Topology::Accumulation,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BadCountArg {
    /// Abort on an unparseable count (default)
    Fail,
    /// Drop the record
    Skip,
    /// Legacy behavior: record a zero count
    Zero,
}

impl From<BadCountArg> for BadCountPolicy {
    fn from(arg: BadCountArg) -> Self {
        match arg {
            BadCountArg::Fail => BadCountPolicy::Fail,
            BadCountArg::Skip => BadCountPolicy::Skip,
            BadCountArg::Zero => BadCountPolicy::Zero,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Fit rate constants against a measured count distribution
    Fit {
        /// Cage data file (delimited, with header)
        cage_data: PathBuf,

        /// Column in the cage data holding the per-host counts
        cage_column: String,

        /// Density data file (delimited, with header)
        density_data: PathBuf,

        /// Column in the density data holding time
        density_time: String,

        /// Column in the density data holding the driver value
        density_column: String,

        /// Simulation horizon (hours)
        #[arg(short = 'l', long, default_value = "168")]
        limit: f64,

        /// Time parse format for the density data (chrono strftime syntax);
        /// omit when times are bare numbers
        #[arg(short = 'f', long)]
        format: Option<String>,

        /// Initial infection rate guess
        #[arg(long, default_value = "0.02")]
        k_inf: f64,

        /// Initial accumulation rate guess (multiplier for the
        /// accumulation topology)
        #[arg(long, default_value = "0.02")]
        k_acc: f64,

        /// Initial detachment rate guess (fall-off topology only)
        #[arg(long, default_value = "0.01")]
        k_fall: f64,

        /// Cap on the maximum histogram bucket (-1 = derive from data)
        #[arg(long, default_value = "-1")]
        max_count: i64,

        /// Transition topology of the compartment chain
        #[arg(long, value_enum, default_value = "fall-off")]
        topology: TopologyArg,

        /// Zero-mass blend weight in [0, 1]; selects the split metric
        #[arg(short = 'w', long)]
        weight: Option<f64>,

        /// Coarsen both densities to N+1 buckets before comparison
        #[arg(long)]
        downsample: Option<usize>,

        /// Number of compartments (default: twice the nominal maximum)
        #[arg(long)]
        dimensionality: Option<usize>,

        /// Cage volume
        #[arg(long, default_value = "10")]
        volume: f64,

        /// Constant driver value for the reference scenario
        #[arg(long, default_value = "0.1")]
        reference_density: f64,

        /// Iteration guard for the minimizer
        #[arg(long, default_value = "500")]
        max_iter: u64,

        /// Emit delimited tables instead of JSON
        #[arg(short = 'c', long)]
        csv: bool,

        /// Delimiter for table output (default TSV)
        #[arg(short = 's', long, default_value = "\t")]
        delimiter: String,

        /// Output file for the JSON report. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Split sentinel-cage records into per-deployment count files
    Split {
        /// Sentinel cage record file (delimited, with header)
        input: PathBuf,

        /// Output directory for the per-cage files
        outdir: PathBuf,

        /// Policy for count fields that do not parse as integers
        #[arg(long, value_enum, default_value = "fail")]
        bad_count: BadCountArg,

        /// Delimiter for the output files (default TSV)
        #[arg(short = 's', long, default_value = "\t")]
        delimiter: String,
    },

    /// Print the version
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Fit {
            cage_data,
            cage_column,
            density_data,
            density_time,
            density_column,
            limit,
            format,
            k_inf,
            k_acc,
            k_fall,
            max_count,
            topology,
            weight,
            downsample,
            dimensionality,
            volume,
            reference_density,
            max_iter,
            csv,
            delimiter,
            output,
        } => cmd_fit(FitArgs {
            cage_data,
            cage_column,
            density_data,
            density_time,
            density_column,
            limit,
            format,
            k_inf,
            k_acc,
            k_fall,
            max_count,
            topology,
            weight,
            downsample,
            dimensionality,
            volume,
            reference_density,
            max_iter,
            csv,
            delimiter,
            output,
        }),
        Commands::Split { input, outdir, bad_count, delimiter } => {
            cmd_split(&input, &outdir, bad_count.into(), parse_delimiter(&delimiter)?)
        }
        Commands::Version => {
            println!("licefit {}", lf_core::VERSION);
            Ok(())
        }
    }
}

struct FitArgs {
    cage_data: PathBuf,
    cage_column: String,
    density_data: PathBuf,
    density_time: String,
    density_column: String,
    limit: f64,
    format: Option<String>,
    k_inf: f64,
    k_acc: f64,
    k_fall: f64,
    max_count: i64,
    topology: TopologyArg,
    weight: Option<f64>,
    downsample: Option<usize>,
    dimensionality: Option<usize>,
    volume: f64,
    reference_density: f64,
    max_iter: u64,
    csv: bool,
    delimiter: String,
    output: Option<PathBuf>,
}

fn parse_delimiter(s: &str) -> Result<u8> {
    let bytes = s.as_bytes();
    if bytes.len() != 1 {
        anyhow::bail!("delimiter must be a single byte, got {s:?}");
    }
    Ok(bytes[0])
}

fn cmd_fit(args: FitArgs) -> Result<()> {
    tracing::info!(path = %args.cage_data.display(), column = %args.cage_column, "reading cage data");
    let tokens = ingest::read_column(&args.cage_data, &args.cage_column)?;
    let histogram = build_histogram(tokens.iter().map(String::as_str), args.max_count)
        .with_context(|| format!("bad count column {:?}", args.cage_column))?;
    tracing::info!(
        hosts = histogram.total_observations(),
        buckets = histogram.nominal_max(),
        "histogram built"
    );

    tracing::info!(path = %args.density_data.display(), "reading density data");
    let rows = ingest::read_pair_columns(&args.density_data, &args.density_time, &args.density_column)?;
    let series = DriverSeries::from_rows(
        rows.iter().map(|(t, v)| (t.as_str(), v.as_str())),
        args.format.as_deref(),
    )
    .with_context(|| format!("bad density data in {}", args.density_data.display()))?;
    tracing::info!(samples = series.len(), "driver series built");

    let topology: Topology = args.topology.into();
    let initial_rates = match topology {
        Topology::FallOff => vec![args.k_inf, args.k_acc, args.k_fall],
        Topology::Accumulation => vec![args.k_inf, args.k_acc],
    };
    let metric = match args.weight {
        Some(weight) => Metric::ZeroSplit { weight },
        None => Metric::Wasserstein,
    };

    let config = EstimatorConfig {
        topology,
        horizon: args.limit,
        volume: args.volume,
        reference_density: args.reference_density,
        initial_rates,
        dimensionality: args.dimensionality,
        downsample_to: args.downsample,
        metric,
        optimizer: OptimizerConfig { max_iter: args.max_iter, ..OptimizerConfig::default() },
        ..EstimatorConfig::for_topology(topology)
    };

    let report = RateEstimator::new(config).fit(&histogram, &series)?;
    for (name, scenario) in [("reference", &report.reference), ("forced", &report.forced)] {
        tracing::info!(
            scenario = name,
            dist = scenario.distance,
            converged = scenario.converged,
            n_evaluations = scenario.n_evaluations,
            "fit complete"
        );
        if !scenario.converged {
            tracing::warn!(
                scenario = name,
                "minimizer hit the iteration guard; reporting the best point found"
            );
        }
    }

    if args.csv {
        report::write_tables(&report, parse_delimiter(&args.delimiter)?)
    } else {
        write_json(args.output.as_ref(), report::report_json(&report))
    }
}

fn cmd_split(
    input: &PathBuf,
    outdir: &PathBuf,
    policy: BadCountPolicy,
    delimiter: u8,
) -> Result<()> {
    std::fs::create_dir_all(outdir)
        .with_context(|| format!("failed to create {}", outdir.display()))?;

    let rows = ingest::read_pair_columns(input, "Cage.Number", "TOTAL")?;
    let dates = ingest::read_pair_columns(input, "Deployment.date", "Recovery.date")?;

    let mut records = Vec::with_capacity(rows.len());
    for ((cage, count), (deployment, recovery)) in rows.into_iter().zip(dates) {
        records.push(CageRecord {
            cage,
            deployment: parse_cage_date(&deployment)?,
            recovery: parse_cage_date(&recovery)?,
            count,
        });
    }

    let windows = aggregate_cages(&records, policy)?;
    tracing::info!(records = records.len(), windows = windows.len(), "aggregated cage records");

    for window in &windows {
        let filename = format!("cage_{}_{}.csv", window.cage, window.recovery);
        let path = outdir.join(filename);
        let mut wtr = csv::WriterBuilder::new().delimiter(delimiter).from_path(&path)?;
        wtr.write_record(["cage", "deployment", "recovery", "duration", "count"])?;
        for count in &window.counts {
            wtr.write_record([
                window.cage.clone(),
                window.deployment.to_string(),
                window.recovery.to_string(),
                window.duration_hours.to_string(),
                count.to_string(),
            ])?;
        }
        wtr.flush()?;
        tracing::debug!(path = %path.display(), counts = window.counts.len(), "wrote window");
    }

    Ok(())
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
