//! modelserve - Command-line interface for the model serving engine

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;

mod commands;
mod config;
mod engine;
mod output;

use commands::predict::PredictArgs;
use engine::LocalEngine;
use output::OutputFormat;

/// Command-line interface for the model serving engine
#[derive(Debug, Parser)]
#[command(name = "modelserve")]
#[command(about = "Load models and serve predictions from local artifacts")]
#[command(version)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable JSON output (overrides --output)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a single prediction
    #[command(name = "predict")]
    Predict {
        /// Model identifier
        model: String,

        /// Artifact path (bucket/key); defaults to models/<model>/model.json
        #[arg(short, long)]
        artifact: Option<String>,

        /// JSON file holding a feature object
        #[arg(short, long, value_name = "FILE")]
        features: Option<PathBuf>,

        /// Feature assignment name=value (repeatable)
        #[arg(short, long = "set", value_name = "NAME=VALUE")]
        set: Vec<String>,

        /// Entity whose stored features should be merged in
        #[arg(short, long)]
        entity: Option<String>,

        /// Stored feature names to fetch for the entity (comma-separated)
        #[arg(long, value_delimiter = ',', requires = "entity")]
        feature_ids: Vec<String>,

        /// Caller correlation id
        #[arg(long)]
        request_id: Option<String>,
    },

    /// Run a JSON array of prediction requests
    #[command(name = "batch")]
    Batch {
        /// Request file
        file: PathBuf,
    },

    /// Show model details
    #[command(name = "describe-model")]
    DescribeModel {
        /// Model identifier
        model: String,

        /// Artifact path (bucket/key)
        #[arg(short, long)]
        artifact: Option<String>,
    },

    /// Run random predictions and report latency statistics
    #[command(name = "bench")]
    Bench {
        /// Model identifier
        model: String,

        /// Artifact path (bucket/key)
        #[arg(short, long)]
        artifact: Option<String>,

        /// Number of predictions
        #[arg(short = 'n', long, default_value = "100")]
        requests: usize,

        /// Also print Prometheus metrics
        #[arg(long)]
        metrics: bool,
    },

    /// Write demo models and a matching configuration
    #[command(name = "init-demo")]
    InitDemo {
        /// Target directory
        #[arg(default_value = "modelserve-demo")]
        dir: PathBuf,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Validate the configuration
    Validate,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::load_config(cli.config.as_deref())?;
    config::init_logging(&config.logging, cli.verbose)?;
    debug!("Starting modelserve with arguments: {:?}", cli);

    let output_format = if cli.json {
        OutputFormat::Json
    } else {
        cli.output
    };

    match cli.command {
        Commands::Config { action } => match action {
            ConfigCommands::Show => commands::config::show_config(&config, output_format)?,
            ConfigCommands::Validate => commands::config::validate_config(&config, output_format)?,
        },

        Commands::InitDemo { dir } => {
            commands::demo::init_demo(&dir, output_format).await?;
        }

        command => {
            let engine = LocalEngine::from_config(&config)?;
            run(&engine, command, output_format).await?;
        }
    }

    Ok(())
}

async fn run(engine: &LocalEngine, command: Commands, output_format: OutputFormat) -> Result<()> {
    match command {
        Commands::Predict {
            model,
            artifact,
            features,
            set,
            entity,
            feature_ids,
            request_id,
        } => {
            let args = PredictArgs {
                model_id: model,
                artifact,
                features_file: features,
                set,
                entity,
                feature_ids,
                request_id,
            };
            commands::predict::predict(engine, args, output_format).await
        }

        Commands::Batch { file } => commands::predict::batch(engine, &file, output_format).await,

        Commands::DescribeModel { model, artifact } => {
            commands::models::describe_model(engine, &model, artifact.as_deref(), output_format).await
        }

        Commands::Bench {
            model,
            artifact,
            requests,
            metrics,
        } => {
            commands::models::bench_model(
                engine,
                &model,
                artifact.as_deref(),
                requests,
                metrics,
                output_format,
            )
            .await
        }

        Commands::InitDemo { .. } | Commands::Config { .. } => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert()
    }

    #[test]
    fn test_predict_arguments() {
        let cli = Cli::try_parse_from([
            "modelserve",
            "predict",
            "churn",
            "--set",
            "usage=3",
            "-s",
            "plan=team",
            "--entity",
            "user-1",
            "--feature-ids",
            "usage,plan",
            "--json",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Predict {
                model,
                set,
                entity,
                feature_ids,
                ..
            } => {
                assert_eq!(model, "churn");
                assert_eq!(set, vec!["usage=3", "plan=team"]);
                assert_eq!(entity.as_deref(), Some("user-1"));
                assert_eq!(feature_ids, vec!["usage", "plan"]);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_feature_ids_require_entity() {
        let result = Cli::try_parse_from(["modelserve", "predict", "churn", "--feature-ids", "usage"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_bench_defaults() {
        let cli = Cli::try_parse_from(["modelserve", "-o", "yaml", "bench", "price-tree"]).unwrap();
        assert_eq!(cli.output, OutputFormat::Yaml);
        match cli.command {
            Commands::Bench {
                requests, metrics, ..
            } => {
                assert_eq!(requests, 100);
                assert!(!metrics);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
