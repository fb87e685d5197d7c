use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use maintwatch::config::{LoggingConfig, ServiceConfig};
use maintwatch::features::TelemetryRecord;
use maintwatch::model::{resolve_artifact_dir, ModelArtifactSet};
use maintwatch::service::InferenceService;

#[derive(Parser)]
#[command(
    name = "maintwatch",
    about = "Predictive-maintenance inference: anomaly flags, failure risk and drift for machine telemetry",
    version,
    long_about = None
)]
struct Cli {
    /// Configuration file (defaults to $MAINTWATCH_CONFIG, then /etc/maintwatch/maintwatch.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (HTTP API + optional stdin consumer)
    Serve {
        /// Bind address, overrides [server] bind
        #[arg(long)]
        bind: Option<String>,

        /// Score JSON-lines telemetry arriving on stdin
        #[arg(long)]
        consume_stdin: bool,
    },

    /// Score telemetry from a JSON file with the configured artifacts
    Score {
        /// A record object, or an array of records
        #[arg(long)]
        input: PathBuf,

        /// Treat the array as one ordered sequence
        #[arg(long)]
        sequence: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Resolve and load the artifact directory, then report what is present
    CheckArtifacts {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&logging.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ServiceConfig::resolve(cli.config.as_deref())?;
    init_tracing(&config.logging);

    match cli.command {
        Commands::Serve { bind, consume_stdin } => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tracing::info!(bind = %config.server.bind, consume_stdin, "Starting maintwatch daemon");
            maintwatch::serve(config, consume_stdin).await?;
        }
        Commands::Score {
            input,
            sequence,
            json,
        } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("failed to read {}", input.display()))?;
            let value: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("failed to parse {}", input.display()))?;
            let records: Vec<TelemetryRecord> = if value.is_array() {
                serde_json::from_value(value)?
            } else if sequence {
                bail!("--sequence needs an array of records");
            } else {
                vec![serde_json::from_value(value)?]
            };

            let service = InferenceService::from_config(&config)?;
            if sequence {
                let score = service.predict_sequence(&records)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&score.result)?);
                } else {
                    println!("Sequence of {} records ({} windows of {})", records.len(), score.windows, score.window_len);
                    println!("  anomaly:             {}", score.result.anomaly);
                    println!("  failure_probability: {:.4}", score.result.failure_probability);
                    println!("  prediction:          {}", score.result.prediction);
                    println!("  risk score:          {:.3}", score.score);
                    if let Some(p) = score.model_probability {
                        println!("  model probability:   {:.4}", p);
                    }
                }
            } else {
                for (i, record) in records.iter().enumerate() {
                    let result = service.predict(record)?;
                    if json {
                        println!("{}", serde_json::to_string(&result)?);
                    } else {
                        let id = record.id.clone().unwrap_or_else(|| format!("#{i}"));
                        println!(
                            "{:<12} anomaly={:<5} failure_probability={:.4} prediction={}",
                            id, result.anomaly, result.failure_probability, result.prediction
                        );
                    }
                }
            }
        }
        Commands::CheckArtifacts { json } => {
            let version = config.artifacts.effective_version();
            let dir = resolve_artifact_dir(&config.artifacts.root, &version)
                .context("cannot resolve artifact directory")?;
            let summary = ModelArtifactSet::load_dir(&dir).summary();

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                let mark = |present: bool| if present { "OK" } else { "MISSING" };
                println!("\nmaintwatch artifacts: {}", dir.display());
                println!("{:<20} | Status", "Artifact");
                println!("{:-<20}-|-{:-<10}", "", "");
                println!("{:<20} | {}", "scaler", mark(summary.scaler));
                println!("{:<20} | {}", "anomaly detector", mark(summary.anomaly_detector));
                println!("{:<20} | {}", "classifier", mark(summary.classifier));
                println!("{:<20} | {}", "sequence model", mark(summary.sequence_model));
                println!("{:<20} | {}", "sequence scaler", mark(summary.sequence_scaler));
                println!("{:<20} | {} rows", "reference sample", summary.reference_rows);
                println!();
            }
            if !summary.models_loaded {
                bail!("required artifacts missing in {}", dir.display());
            }
        }
    }

    Ok(())
}
