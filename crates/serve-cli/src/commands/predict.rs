//! Prediction commands

use crate::engine::LocalEngine;
use crate::output::{OutputFormat, OutputFormatter};
use anyhow::{bail, Context, Result};
use serve_core::{FeatureMap, FeatureValue};
use serve_engine::PredictionRequest;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Options for a single prediction
#[derive(Debug, Default)]
pub struct PredictArgs {
    pub model_id: String,
    pub artifact: Option<String>,
    pub features_file: Option<PathBuf>,
    pub set: Vec<String>,
    pub entity: Option<String>,
    pub feature_ids: Vec<String>,
    pub request_id: Option<String>,
}

/// Load the model and run one prediction
pub async fn predict(engine: &LocalEngine, args: PredictArgs, output_format: OutputFormat) -> Result<()> {
    let mut features = match &args.features_file {
        Some(path) => read_features(path)?,
        None => FeatureMap::new(),
    };
    for assignment in &args.set {
        let (name, value) = parse_assignment(assignment)?;
        features.insert(name, value);
    }

    engine
        .ensure_loaded(&args.model_id, args.artifact.as_deref())
        .await?;

    let mut request = PredictionRequest::new(&args.model_id, features);
    if let Some(entity) = args.entity {
        request = request.with_entity(entity, args.feature_ids);
    }
    if let Some(request_id) = args.request_id {
        request = request.with_request_id(request_id);
    }

    let response = engine.service.predict(&request).await?;
    OutputFormatter::new(output_format).print_item(&response)
}

/// Run a JSON array of prediction requests
pub async fn batch(engine: &LocalEngine, file: &Path, output_format: OutputFormat) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let requests: Vec<PredictionRequest> = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON array of prediction requests", file.display()))?;

    let formatter = OutputFormatter::new(output_format);
    let model_ids: BTreeSet<&str> = requests.iter().map(|r| r.model_id.as_str()).collect();
    for model_id in model_ids {
        // Requests for a model that fails to load are reported per item
        if let Err(e) = engine.ensure_loaded(model_id, None).await {
            formatter.print_warning(&format!("{:#}", e))?;
        }
    }

    let response = engine.service.predict_batch(&requests).await;
    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(&response)?),
        _ => formatter.print_list(&response.predictions)?,
    }
    Ok(())
}

fn read_features(path: &Path) -> Result<FeatureMap> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a JSON object of feature values", path.display()))
}

/// Parse `name=value`; numbers and booleans are recognized, anything else is text
pub fn parse_assignment(assignment: &str) -> Result<(String, FeatureValue)> {
    let Some((name, raw)) = assignment.split_once('=') else {
        bail!("expected name=value, got '{}'", assignment);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("feature name missing in '{}'", assignment);
    }

    let raw = raw.trim();
    let value = if let Ok(number) = raw.parse::<f64>() {
        FeatureValue::Number(number)
    } else if let Ok(flag) = raw.parse::<bool>() {
        FeatureValue::Bool(flag)
    } else {
        FeatureValue::Text(raw.to_string())
    };
    Ok((name.to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("age=31").unwrap(),
            ("age".to_string(), FeatureValue::Number(31.0))
        );
        assert_eq!(
            parse_assignment("active = true").unwrap(),
            ("active".to_string(), FeatureValue::Bool(true))
        );
        assert_eq!(
            parse_assignment("plan=team").unwrap(),
            ("plan".to_string(), FeatureValue::Text("team".to_string()))
        );
        assert!(parse_assignment("no-equals").is_err());
        assert!(parse_assignment("=5").is_err());
    }
}
