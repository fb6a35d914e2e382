use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use flowsentry::config::Config;
use flowsentry::ml::{Label, ModelStore};
use flowsentry::{FlowSentry, ModelReport};

#[derive(Parser)]
#[command(name = "flowsentry")]
#[command(author, version, about = "Batch anomaly detection for network-flow captures")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fit the scaler and every model, then persist the artifacts
    Train {
        /// Training CSV (defaults to the configured dataset)
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Fraction of rows held out for threshold calibration
        #[arg(long)]
        holdout: Option<f32>,
    },

    /// Score a capture with the persisted models
    Evaluate {
        /// CSV to score (defaults to the configured attack capture)
        dataset: Option<PathBuf>,

        /// Label assumed for every row of the batch
        #[arg(short, long, default_value = "attack")]
        expect: ExpectedClass,
    },

    /// List persisted artifacts
    Models,

    /// Generate default configuration file
    GenConfig {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// What an evaluation batch is assumed to contain
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExpectedClass {
    /// Every row is benign traffic
    Normal,
    /// Every row belongs to an attack
    Attack,
}

impl From<ExpectedClass> for Label {
    fn from(class: ExpectedClass) -> Self {
        match class {
            ExpectedClass::Normal => Label::Normal,
            ExpectedClass::Attack => Label::Anomaly,
        }
    }
}

/// Table row for per-model results
#[derive(Tabled)]
struct ReportRow {
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "Matched")]
    matched: String,
    #[tabled(rename = "Flagged")]
    flagged: String,
    #[tabled(rename = "Fit Time")]
    fit_time: String,
}

impl ReportRow {
    fn from_report(report: &ModelReport) -> Self {
        Self {
            model: report.model.to_string(),
            accuracy: format!("{:.1}%", report.result.accuracy()),
            matched: format!("{}/{}", report.result.matched, report.result.total),
            flagged: report.result.flagged.to_string(),
            fit_time: report
                .fit_seconds
                .map(|s| format!("{:.2}s", s))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Table row for stored artifacts
#[derive(Tabled)]
struct ArtifactRow {
    #[tabled(rename = "Artifact")]
    name: String,
    #[tabled(rename = "Size")]
    size: String,
    #[tabled(rename = "Modified")]
    modified: String,
}

pub fn run_command(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default()?,
    };

    match cli.command {
        Commands::Train { dataset, holdout } => cmd_train(config, dataset, holdout),
        Commands::Evaluate { dataset, expect } => cmd_evaluate(config, dataset, expect),
        Commands::Models => cmd_models(config),
        Commands::GenConfig { output } => cmd_gen_config(output),
    }
}

fn cmd_train(config: Config, dataset: Option<PathBuf>, holdout: Option<f32>) -> Result<()> {
    let shown = dataset
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.dataset.train_path));
    println!("Training on {}...", shown.display());

    let sentry = FlowSentry::new(config);
    let report = sentry.train(dataset.as_deref(), holdout)?;

    println!(
        "{} {} rows trained, {} held out, {} feature columns",
        "Done:".green().bold(),
        report.trained_rows,
        report.holdout_rows,
        report.feature_columns
    );

    println!("\n{}", "Holdout check (rows assumed normal):".bold());
    let rows: Vec<ReportRow> = report.reports.iter().map(ReportRow::from_report).collect();
    println!("{}", Table::new(rows));

    println!(
        "Artifacts saved to {}",
        sentry.store().data_dir().display()
    );
    Ok(())
}

fn cmd_evaluate(config: Config, dataset: Option<PathBuf>, expect: ExpectedClass) -> Result<()> {
    let path = dataset.unwrap_or_else(|| PathBuf::from(&config.dataset.attack_path));
    let class = match expect {
        ExpectedClass::Normal => "normal",
        ExpectedClass::Attack => "attack",
    };
    println!("Scoring {} as an all-{} batch...", path.display(), class);

    let sentry = FlowSentry::new(config);
    let reports = sentry.evaluate_dataset(&path, expect.into())?;

    let rows: Vec<ReportRow> = reports.iter().map(ReportRow::from_report).collect();
    println!("{}", Table::new(rows));

    if let Some(best) = reports.iter().max_by(|a, b| {
        a.result
            .accuracy()
            .partial_cmp(&b.result.accuracy())
            .unwrap_or(std::cmp::Ordering::Equal)
    }) {
        println!(
            "{} {} at {:.1}%",
            "Best:".green().bold(),
            best.model,
            best.result.accuracy()
        );
    }

    Ok(())
}

fn cmd_models(config: Config) -> Result<()> {
    let store = ModelStore::new(config.data_dir());
    let artifacts = store.list_artifacts()?;

    if artifacts.is_empty() {
        println!("No artifacts found in {}", store.data_dir().display());
        println!("Run 'flowsentry train' first");
        return Ok(());
    }

    if let Ok(metadata) = store.load_metadata() {
        println!("{}", "=== Training Run ===".bold());
        println!();
        println!(
            "Saved:           {}",
            metadata.saved_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("Host:            {}", metadata.host_id);
        println!("Tool version:    {}", metadata.tool_version);
        println!("Trained rows:    {}", metadata.trained_rows);
        println!("Holdout rows:    {}", metadata.holdout_rows);
        println!("Feature columns: {}", metadata.feature_columns.len());
        println!();
    }

    let rows: Vec<ArtifactRow> = artifacts
        .iter()
        .map(|a| ArtifactRow {
            name: a.name.clone(),
            size: format_size(a.size_bytes),
            modified: a.modified.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();
    println!("{}", Table::new(rows));

    Ok(())
}

fn cmd_gen_config(output: Option<PathBuf>) -> Result<()> {
    let config = Config::default();

    match output {
        Some(path) => {
            config.save(&path)?;
            println!("Configuration written to {}", path.display());
        }
        None => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
