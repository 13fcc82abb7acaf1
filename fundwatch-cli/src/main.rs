//! FundWatch CLI: run supervision pages and write sample templates.
//!
//! Commands:
//! - `anomaly`, `insolvency`, `credit-risk`, `asset-loss`, `compliance`: run one page
//! - `sample <page>`: write the embedded dataset of a page as a CSV template
//! - `all`: run every page on its sample (or on `<input-dir>/<page>.csv`)

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use fundwatch_runner::pipelines::{LossBasis, WhatIfInput};
use fundwatch_runner::{
    export_csv, generate_report, run_page, sample_csv, save_artifacts, AnomalyDetection,
    AssetLossRegression, ComplianceRules, CreditRiskClassification, InsolvencyRisk, PageRun,
    Pipeline, PipelineKind, SupervisionConfig,
};

#[derive(Parser)]
#[command(
    name = "fundwatch",
    about = "FundWatch CLI: risk supervision for people's credit funds"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log at debug level (overrides RUST_LOG).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    /// Path to a TOML config file. Missing fields take their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Master seed for every stochastic page.
    #[arg(long, global = true)]
    seed: Option<u64>,
}

/// Input and output options shared by every page command.
#[derive(Args, Debug, Clone, Default)]
struct PageArgs {
    /// Input CSV. Defaults to the page's embedded sample.
    #[arg(long)]
    input: Option<PathBuf>,

    /// Write result.csv, summary.json and report.md under this directory.
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write the augmented result table to this CSV file.
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect anomalous months in loan and deposit activity.
    Anomaly {
        #[command(flatten)]
        page: PageArgs,

        /// Expected share of anomalous months, in (0, 0.5].
        #[arg(long)]
        contamination: Option<f64>,
    },
    /// Flag funds at risk of insolvency.
    Insolvency {
        #[command(flatten)]
        page: PageArgs,

        #[arg(long)]
        contamination: Option<f64>,

        /// Funds scoring below this are flagged, in [-0.5, 0].
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,
    },
    /// Classify funds into credit-risk levels.
    CreditRisk {
        #[command(flatten)]
        page: PageArgs,

        /// Held-out share for evaluation, in (0, 1).
        #[arg(long)]
        test_fraction: Option<f64>,

        /// Predict the risk level of a hypothetical fund.
        #[arg(long, num_args = 3, value_names = ["LOANS", "BAD_DEBT", "DEPOSITS"])]
        predict: Option<Vec<f64>>,
    },
    /// Flag months at risk of asset loss.
    AssetLoss {
        #[command(flatten)]
        page: PageArgs,

        /// Loss threshold in percent, in [-10, 0].
        #[arg(long, allow_hyphen_values = true)]
        threshold: Option<f64>,

        /// Which deviation drives the flagged-month listing.
        #[arg(long, value_enum)]
        basis: Option<BasisArg>,
    },
    /// Check capital adequacy and bad-debt limits.
    Compliance {
        #[command(flatten)]
        page: PageArgs,

        /// Minimum CAR in percent, in [5, 15].
        #[arg(long)]
        car_threshold: Option<f64>,

        /// Maximum bad-debt ratio in percent, in [1, 10].
        #[arg(long)]
        bad_debt_threshold: Option<f64>,
    },
    /// Write a page's embedded dataset as a CSV template.
    Sample {
        /// anomaly, insolvency, credit-risk, asset-loss or compliance.
        page: PipelineKind,

        /// Output file. Defaults to stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run every page.
    All {
        /// Directory holding `<page>.csv` inputs; pages without one use their sample.
        #[arg(long)]
        input_dir: Option<PathBuf>,

        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BasisArg {
    Predicted,
    Observed,
}

impl From<BasisArg> for LossBasis {
    fn from(arg: BasisArg) -> Self {
        match arg {
            BasisArg::Predicted => LossBasis::Predicted,
            BasisArg::Observed => LossBasis::Observed,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = match &cli.config {
        Some(path) => SupervisionConfig::from_file(path)?,
        None => SupervisionConfig::default(),
    };
    if let Some(seed) = cli.seed {
        config.set_seed(seed);
    }

    match cli.command {
        Commands::Anomaly {
            page,
            contamination,
        } => {
            if let Some(c) = contamination {
                config.anomaly.contamination = c;
            }
            run_and_emit::<AnomalyDetection>(&page, &config.anomaly)?;
        }
        Commands::Insolvency {
            page,
            contamination,
            threshold,
        } => {
            if let Some(c) = contamination {
                config.insolvency.contamination = c;
            }
            if let Some(t) = threshold {
                config.insolvency.threshold = t;
            }
            run_and_emit::<InsolvencyRisk>(&page, &config.insolvency)?;
        }
        Commands::CreditRisk {
            page,
            test_fraction,
            predict,
        } => {
            if let Some(f) = test_fraction {
                config.credit_risk.test_fraction = f;
            }
            let run = run_and_emit::<CreditRiskClassification>(&page, &config.credit_risk)?;
            if let Some(values) = predict {
                print_what_if(&run, &values)?;
            }
        }
        Commands::AssetLoss {
            page,
            threshold,
            basis,
        } => {
            if let Some(t) = threshold {
                config.asset_loss.threshold = t;
            }
            if let Some(b) = basis {
                config.asset_loss.basis = b.into();
            }
            run_and_emit::<AssetLossRegression>(&page, &config.asset_loss)?;
        }
        Commands::Compliance {
            page,
            car_threshold,
            bad_debt_threshold,
        } => {
            if let Some(t) = car_threshold {
                config.compliance.car_threshold = t;
            }
            if let Some(t) = bad_debt_threshold {
                config.compliance.bad_debt_threshold = t;
            }
            run_and_emit::<ComplianceRules>(&page, &config.compliance)?;
        }
        Commands::Sample { page, output } => write_sample(page, output.as_deref())?,
        Commands::All {
            input_dir,
            output_dir,
        } => run_all(&config, input_dir.as_deref(), output_dir)?,
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

/// Run one page, print its report and write the requested outputs.
fn run_and_emit<P: Pipeline>(page: &PageArgs, config: &P::Config) -> Result<PageRun<P>> {
    let run = run_page::<P>(page.input.as_deref(), config)
        .with_context(|| format!("{} page failed", P::KIND))?;

    print!("{}", generate_report(&run));

    if let Some(path) = &page.csv {
        let csv = export_csv(&run.outcome.rows)?;
        std::fs::write(path, csv)
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("Result table written to: {}", path.display());
    }
    if let Some(dir) = &page.output_dir {
        let run_dir = save_artifacts(&run, dir)?;
        println!("Artifacts saved to: {}", run_dir.display());
    }
    Ok(run)
}

fn print_what_if(run: &PageRun<CreditRiskClassification>, values: &[f64]) -> Result<()> {
    let [total_loans, bad_debt, total_deposits] = values else {
        bail!("--predict takes exactly three values: LOANS BAD_DEBT DEPOSITS");
    };
    let input = WhatIfInput {
        total_loans: *total_loans,
        bad_debt: *bad_debt,
        total_deposits: *total_deposits,
    };
    let prediction = run.outcome.summary.model.predict_what_if(&input)?;

    println!("## What-if Prediction\n");
    println!("| Field | Value |");
    println!("| --- | --- |");
    println!("| bad_debt_ratio | {:.2} |", prediction.bad_debt_ratio);
    println!("| capital_utilization | {:.2} |", prediction.capital_utilization);
    println!("| Predicted Risk Level | {} |", prediction.level);
    println!();
    Ok(())
}

fn write_sample(page: PipelineKind, output: Option<&Path>) -> Result<()> {
    let csv = match page {
        PipelineKind::Anomaly => sample_csv::<AnomalyDetection>()?,
        PipelineKind::Insolvency => sample_csv::<InsolvencyRisk>()?,
        PipelineKind::CreditRisk => sample_csv::<CreditRiskClassification>()?,
        PipelineKind::AssetLoss => sample_csv::<AssetLossRegression>()?,
        PipelineKind::Compliance => sample_csv::<ComplianceRules>()?,
    };
    match output {
        Some(path) => {
            std::fs::write(path, csv)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Sample for '{page}' written to: {}", path.display());
        }
        None => print!("{csv}"),
    }
    Ok(())
}

fn run_all(
    config: &SupervisionConfig,
    input_dir: Option<&Path>,
    output_dir: Option<PathBuf>,
) -> Result<()> {
    let page_args = |kind: PipelineKind| -> PageArgs {
        let input = input_dir
            .map(|dir| dir.join(format!("{}.csv", kind.slug())))
            .filter(|path| path.exists());
        PageArgs {
            input,
            output_dir: output_dir.clone(),
            csv: None,
        }
    };

    let mut failed = Vec::new();
    for kind in PipelineKind::ALL {
        let page = page_args(kind);
        let outcome = match kind {
            PipelineKind::Anomaly => run_and_emit::<AnomalyDetection>(&page, &config.anomaly).map(drop),
            PipelineKind::Insolvency => {
                run_and_emit::<InsolvencyRisk>(&page, &config.insolvency).map(drop)
            }
            PipelineKind::CreditRisk => {
                run_and_emit::<CreditRiskClassification>(&page, &config.credit_risk).map(drop)
            }
            PipelineKind::AssetLoss => {
                run_and_emit::<AssetLossRegression>(&page, &config.asset_loss).map(drop)
            }
            PipelineKind::Compliance => {
                run_and_emit::<ComplianceRules>(&page, &config.compliance).map(drop)
            }
        };
        if let Err(e) = outcome {
            tracing::error!(page = %kind, "{e:#}");
            failed.push(kind.slug());
        }
    }

    if !failed.is_empty() {
        bail!("{} page(s) failed: {}", failed.len(), failed.join(", "));
    }
    Ok(())
}
