//! Output formatting for the modelserve CLI

use anyhow::Result;
use clap::ValueEnum;
use colored::*;
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, Color, ContentArrangement, Table};
use serde::Serialize;
use serve_core::{ModelMetadata, ModelStats, PredictionResult};
use serve_engine::{BatchItem, PredictionResponse};

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table format
    #[default]
    Table,
    /// JSON format
    Json,
    /// YAML format
    Yaml,
    /// Compact text format
    Text,
}

/// Types that can be rendered as table rows or key-value listings
pub trait Formattable {
    fn table_headers() -> Vec<String>;
    fn table_row(&self) -> Vec<String>;

    /// Key-value pairs for the detailed view
    fn key_value_pairs(&self) -> Vec<(String, String)>;
}

/// Output formatter
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Format and print a single item
    pub fn print_item<T>(&self, item: &T) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(item)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(item)?),
            OutputFormat::Table => {
                for (key, value) in item.key_value_pairs() {
                    println!("{}: {}", key.bold().cyan(), value);
                }
            }
            OutputFormat::Text => {
                for (key, value) in item.key_value_pairs() {
                    println!("{}: {}", key, value);
                }
            }
        }
        Ok(())
    }

    /// Format and print a list of items
    pub fn print_list<T>(&self, items: &[T]) -> Result<()>
    where
        T: Serialize + Formattable,
    {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(items)?),
            OutputFormat::Yaml => print!("{}", serde_yaml::to_string(items)?),
            OutputFormat::Table | OutputFormat::Text if items.is_empty() => {
                println!("{}", "No items found".dimmed());
            }
            OutputFormat::Table => println!("{}", build_table(items)),
            OutputFormat::Text => {
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        println!();
                    }
                    for (key, value) in item.key_value_pairs() {
                        println!("{}: {}", key, value);
                    }
                }
            }
        }
        Ok(())
    }

    /// Print a success message
    pub fn print_success(&self, message: &str) -> Result<()> {
        self.print_status("success", message, || {
            println!("{} {}", "✓".green().bold(), message.green())
        })
    }

    /// Print a warning message
    pub fn print_warning(&self, message: &str) -> Result<()> {
        self.print_status("warning", message, || {
            eprintln!("{} {}", "⚠".yellow().bold(), message.yellow())
        })
    }

    fn print_status(&self, status: &str, message: &str, human: impl FnOnce()) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let result = serde_json::json!({ "status": status, "message": message });
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
            OutputFormat::Yaml => {
                println!("status: {}", status);
                println!("message: {}", message);
            }
            OutputFormat::Table | OutputFormat::Text => human(),
        }
        Ok(())
    }

    /// Print raw text in every format (used for Prometheus exposition)
    pub fn print_raw(&self, text: &str) {
        if matches!(self.format, OutputFormat::Table | OutputFormat::Text) {
            println!("{}", text.trim_end());
        }
    }
}

fn build_table<T: Formattable>(items: &[T]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = T::table_headers()
        .iter()
        .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for item in items {
        table.add_row(item.table_row());
    }
    table
}

/// Format milliseconds with a precision that suits the magnitude
pub fn format_latency(ms: f64) -> String {
    if ms < 1.0 {
        format!("{:.0}µs", ms * 1000.0)
    } else if ms < 1000.0 {
        format!("{:.2}ms", ms)
    } else {
        format!("{:.2}s", ms / 1000.0)
    }
}

pub fn format_probability(p: f64) -> String {
    format!("{:.1}%", p * 100.0)
}

fn outcome(result: &PredictionResult) -> String {
    match (result.predicted_class, result.predicted_value) {
        (Some(class), _) => format!("class {}", class),
        (None, Some(value)) => format!("{:.4}", value),
        (None, None) => "-".to_string(),
    }
}

impl Formattable for PredictionResponse {
    fn table_headers() -> Vec<String> {
        ["Model", "Prediction", "Confidence", "Latency", "Request"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.model_id.clone(),
            outcome(&self.result),
            self.result
                .confidence
                .map(format_probability)
                .unwrap_or_else(|| "-".to_string()),
            format_latency(self.result.latency_ms),
            self.request_id.clone().unwrap_or_else(|| "-".to_string()),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("Prediction ID".to_string(), self.prediction_id.to_string()),
            ("Model".to_string(), self.model_id.clone()),
            (
                "Version".to_string(),
                self.result.model_version.clone(),
            ),
            ("Framework".to_string(), self.result.framework.to_string()),
            ("Prediction".to_string(), outcome(&self.result)),
        ];
        if let Some(confidence) = self.result.confidence {
            pairs.push(("Confidence".to_string(), format_probability(confidence)));
        }
        if let Some(probabilities) = &self.result.probabilities {
            let rendered: Vec<String> = probabilities.iter().map(|p| format!("{:.4}", p)).collect();
            pairs.push(("Probabilities".to_string(), rendered.join(", ")));
        }
        pairs.push((
            "Inference latency".to_string(),
            format_latency(self.result.latency_ms),
        ));
        pairs.push(("Total latency".to_string(), format_latency(self.latency_ms)));
        pairs
    }
}

impl Formattable for BatchItem {
    fn table_headers() -> Vec<String> {
        ["Request", "Model", "Status", "Prediction", "Detail"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table_row(&self) -> Vec<String> {
        match self {
            BatchItem::Success(response) => vec![
                response.request_id.clone().unwrap_or_else(|| "-".to_string()),
                response.model_id.clone(),
                "ok".green().to_string(),
                outcome(&response.result),
                response
                    .result
                    .confidence
                    .map(format_probability)
                    .unwrap_or_default(),
            ],
            BatchItem::Failed {
                request_id,
                model_id,
                error,
            } => vec![
                request_id.clone().unwrap_or_else(|| "-".to_string()),
                model_id.clone(),
                "failed".red().to_string(),
                "-".to_string(),
                error.clone(),
            ],
        }
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        Self::table_headers().into_iter().zip(self.table_row()).collect()
    }
}

impl Formattable for ModelStats {
    fn table_headers() -> Vec<String> {
        ["Model", "Predictions", "Avg latency", "p95", "p99", "Avg confidence"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.model_id.clone(),
            self.total_predictions.to_string(),
            format_latency(self.average_latency_ms),
            format_latency(self.p95_latency_ms),
            format_latency(self.p99_latency_ms),
            self.average_confidence
                .map(format_probability)
                .unwrap_or_else(|| "-".to_string()),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<(String, String)> =
            Self::table_headers().into_iter().zip(self.table_row()).collect();
        pairs.push((
            "Last prediction".to_string(),
            self.last_prediction_time
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "never".to_string()),
        ));
        pairs
    }
}

impl Formattable for ModelMetadata {
    fn table_headers() -> Vec<String> {
        ["Model", "Framework", "Task", "Version", "Features"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn table_row(&self) -> Vec<String> {
        vec![
            self.model_id.clone(),
            self.framework.to_string(),
            self.task.to_string(),
            self.version.clone(),
            self.feature_names.len().to_string(),
        ]
    }

    fn key_value_pairs(&self) -> Vec<(String, String)> {
        let describe = |name: &String| {
            let mut notes = Vec::new();
            if let Some(encoder) = self.encoders.get(name) {
                notes.push(format!("categorical: {}", encoder.classes.join("|")));
            } else if self.categorical_features.contains(name) {
                notes.push("categorical".to_string());
            }
            if let Some(default) = self.feature_defaults.get(name) {
                notes.push(format!("default {}", default.category_label()));
            }
            if notes.is_empty() {
                name.clone()
            } else {
                format!("{} ({})", name, notes.join(", "))
            }
        };

        vec![
            ("Model".to_string(), self.model_id.clone()),
            ("Framework".to_string(), self.framework.to_string()),
            ("Task".to_string(), self.task.to_string()),
            ("Version".to_string(), self.version.clone()),
            (
                "Features".to_string(),
                self.feature_names.iter().map(describe).collect::<Vec<_>>().join(", "),
            ),
        ]
    }
}
