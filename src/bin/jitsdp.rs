//! Run one online defect-prediction experiment.
//!
//! Settings come from an optional TOML file, then from flags, which take
//! precedence. Results land in `<output>/<dataset>/<run id>/`.
//!
//! # Run
//!
//! ```bash
//! cargo run --release -- --data-dir data --dataset camel --rate-driven
//! cargo run --release -- --synthetic 2000 --seed 3
//! RUST_LOG=jitsdp=debug cargo run -- --config runs/nova.toml
//! ```

use clap::Parser;
use jitsdp::checkpoint;
use jitsdp::config::{ExperimentConfig, ModelKind};
use jitsdp::data::{Dataset, DatasetLoader, JsonLinesLoader, SyntheticLoader};
use jitsdp::experiment::run_experiment;
use jitsdp::orb::Reweighting;
use jitsdp::report::{save_run, unique_dir};
use jitsdp::threshold::Threshold;
use jitsdp::{JitError, Result};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "jitsdp")]
#[command(about = "Online JIT defect prediction with verification latency")]
#[command(version)]
struct Args {
    /// TOML file with the base configuration
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory holding `<dataset>.jsonl` streams
    #[arg(long, default_value = "data")]
    data_dir: PathBuf,

    /// Generate N synthetic commits per dataset instead of reading files
    #[arg(long, value_name = "N")]
    synthetic: Option<usize>,

    /// Share of bug commits in synthetic streams
    #[arg(long, requires = "synthetic")]
    bug_rate: Option<f64>,

    /// Directory receiving the run results
    #[arg(long, default_value = "results")]
    output: PathBuf,

    /// Also save the final model state to this file
    #[arg(long, value_name = "FILE")]
    checkpoint: Option<PathBuf>,

    #[arg(long)]
    dataset: Option<Dataset>,

    /// First commit kept in the results
    #[arg(long)]
    start: Option<usize>,

    /// Commits loaded from the stream
    #[arg(long)]
    end: Option<usize>,

    /// Use every commit of the stream
    #[arg(long, conflicts_with = "end")]
    all: bool,

    /// Days before an unfixed commit is labeled clean
    #[arg(long)]
    waiting_time: Option<u32>,

    #[arg(long)]
    ma_window_size: Option<usize>,

    /// Target rate of bug predictions
    #[arg(long)]
    th: Option<f64>,

    #[arg(long)]
    l0: Option<f64>,

    #[arg(long)]
    l1: Option<f64>,

    #[arg(long)]
    m: Option<f64>,

    #[arg(long)]
    decay_factor: Option<f64>,

    /// Clean confirmations that turn a later bug label into noise
    #[arg(long)]
    noise_n: Option<usize>,

    /// Keep noisy bug labels
    #[arg(long)]
    noise: bool,

    /// Keep the raw event order instead of balancing
    #[arg(long)]
    order: bool,

    /// Train on the other projects as well
    #[arg(long)]
    cross_project: bool,

    #[arg(long)]
    rate_driven: bool,

    #[arg(long)]
    rd_grace_period: Option<usize>,

    /// Base learner: lr or nb
    #[arg(long, value_parser = parse_model_kind)]
    model: Option<ModelKind>,

    #[arg(long)]
    n_iterations: Option<usize>,

    #[arg(long)]
    ensemble_size: Option<usize>,

    /// Decision strategy: score, rate or rate-train
    #[arg(long)]
    threshold: Option<String>,

    /// Score cut-off, or clean share for the rate strategy
    #[arg(long)]
    threshold_value: Option<f64>,

    /// Pass weights to the learner instead of resampling
    #[arg(long)]
    weighted: bool,

    #[arg(long)]
    seed: Option<u64>,
}

fn parse_model_kind(s: &str) -> std::result::Result<ModelKind, String> {
    match s {
        "lr" => Ok(ModelKind::Lr),
        "nb" => Ok(ModelKind::Nb),
        other => Err(format!("unknown model '{other}', expected lr or nb")),
    }
}

fn parse_threshold(name: &str, value: Option<f64>) -> Result<Threshold> {
    match name {
        "score" => Ok(Threshold::ScoreFixed {
            score: value.unwrap_or(0.5),
        }),
        "rate" => Ok(Threshold::RateFixed {
            normal_proportion: value.unwrap_or(0.5),
        }),
        "rate-train" => Ok(Threshold::RateFixedTrain),
        other => Err(JitError::invalid_config(
            "threshold",
            format!("unknown strategy '{other}'"),
        )),
    }
}

fn build_config(args: &Args) -> Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::load(path)?,
        None => ExperimentConfig::default(),
    };
    macro_rules! override_field {
        ($($field:ident),*) => {
            $(if let Some(value) = args.$field {
                config.$field = value;
            })*
        };
    }
    override_field!(
        dataset,
        start,
        waiting_time,
        ma_window_size,
        th,
        l0,
        l1,
        m,
        decay_factor,
        noise_n,
        rd_grace_period,
        seed
    );
    if args.all {
        config.end = None;
    } else if let Some(end) = args.end {
        config.end = Some(end);
    }
    config.noise |= args.noise;
    config.order |= args.order;
    config.cross_project |= args.cross_project;
    config.rate_driven |= args.rate_driven;
    if let Some(kind) = args.model {
        config.model.kind = kind;
    }
    if let Some(n) = args.n_iterations {
        config.model.n_iterations = n;
    }
    if let Some(n) = args.ensemble_size {
        config.model.ensemble_size = n;
    }
    if let Some(name) = &args.threshold {
        config.threshold = parse_threshold(name, args.threshold_value)?;
    }
    if args.weighted {
        config.reweighting = Reweighting::Weighted;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::level_filters::LevelFilter::INFO.into()),
        )
        .init();

    let args = Args::parse();
    let config = build_config(&args)?;

    let loader: Box<dyn DatasetLoader> = match args.synthetic {
        Some(n) => {
            let synthetic = SyntheticLoader::new(n, config.seed);
            match args.bug_rate {
                Some(rate) => Box::new(synthetic.with_bug_rate(rate)),
                None => Box::new(synthetic),
            }
        }
        None => Box::new(JsonLinesLoader::new(&args.data_dir)),
    };
    let outcome = run_experiment(&config, loader.as_ref())?;

    let dir = unique_dir(&args.output, &config)?;
    save_run(&outcome, &config, &dir)?;
    if let Some(path) = &args.checkpoint {
        checkpoint::save(&outcome.model, path)?;
        info!(path = %path.display(), "checkpoint saved");
    }

    let summary = &outcome.summary;
    println!("=== {} ({}) ===", config.dataset, outcome.run_id);
    println!("Commits: {}", outcome.records.len());
    println!("r0:      {:.4}", summary.r0);
    println!("r1:      {:.4}", summary.r1);
    println!("|r0-r1|: {:.4}", summary.r0_r1);
    println!("g-mean:  {:.4}", summary.gmean);
    println!("p1:      {:.4}", summary.p1);
    println!("|th-p1|: {:.4}", summary.th_p1);
    println!("Results: {}", dir.display());
    Ok(())
}
