//! Feature vector assembly from named feature values

use serve_core::{Error, FeatureMap, FeatureValue, FeatureVector, ModelMetadata, Result};

/// Build the positional model input for `metadata` from named `features`.
///
/// Walks `metadata.feature_names` in order. A request value wins over the
/// registered default; a name with neither is `Error::MissingFeature`.
/// Categorical features with an encoder are label-encoded, everything else must
/// have a numeric reading.
pub fn assemble(features: &FeatureMap, metadata: &ModelMetadata) -> Result<FeatureVector> {
    let mut values = Vec::with_capacity(metadata.feature_names.len());

    for name in &metadata.feature_names {
        let value = features
            .get(name)
            .or_else(|| metadata.feature_defaults.get(name))
            .ok_or_else(|| Error::missing_feature(name))?;

        values.push(encode_value(name, value, metadata)?);
    }

    Ok(FeatureVector::new(values))
}

fn encode_value(name: &str, value: &FeatureValue, metadata: &ModelMetadata) -> Result<f64> {
    let encoder = metadata
        .categorical_features
        .contains(name)
        .then(|| metadata.encoders.get(name))
        .flatten();

    match encoder {
        Some(encoder) => {
            let category = value.category_label();
            encoder.encode(&category).ok_or_else(|| {
                Error::invalid_feature(name, format!("unknown category '{}'", category))
            })
        }
        None => value
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| Error::invalid_feature(name, format!("value {:?} is not numeric", value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serve_core::{CategoricalEncoder, Framework, TaskKind};

    fn metadata(names: &[&str]) -> ModelMetadata {
        ModelMetadata::new(
            "m",
            Framework::TabularEstimator,
            TaskKind::Regression,
            names.iter().map(|s| s.to_string()).collect(),
        )
    }

    fn features(pairs: &[(&str, FeatureValue)]) -> FeatureMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_default_fills_missing_feature() {
        let metadata = metadata(&["a", "b"]).with_default("b", 0.0);
        let vector = assemble(&features(&[("a", 5.0.into())]), &metadata).unwrap();
        assert_eq!(vector.as_slice(), &[5.0, 0.0]);
    }

    #[test]
    fn test_order_follows_metadata_not_request() {
        let metadata = metadata(&["z", "y", "x"]).with_default("y", 9.0);
        let input = features(&[("x", 1.0.into()), ("z", 3.0.into()), ("unused", 7.0.into())]);

        let vector = assemble(&input, &metadata).unwrap();
        assert_eq!(vector.len(), metadata.feature_names.len());
        assert_eq!(vector.as_slice(), &[3.0, 9.0, 1.0]);
    }

    #[test]
    fn test_request_value_overrides_default() {
        let metadata = metadata(&["a"]).with_default("a", 1.0);
        let vector = assemble(&features(&[("a", 2.0.into())]), &metadata).unwrap();
        assert_eq!(vector.as_slice(), &[2.0]);
    }

    #[test]
    fn test_missing_feature_names_the_first_gap() {
        let metadata = metadata(&["a", "b", "c"]).with_default("a", 0.0);
        let err = assemble(&features(&[("c", 1.0.into())]), &metadata).unwrap_err();
        assert_eq!(err, Error::MissingFeature("b".to_string()));
    }

    #[test]
    fn test_every_provided_default_permutation() {
        let names = ["f0", "f1", "f2", "f3"];
        let mut base = metadata(&names);
        for (i, name) in names.iter().enumerate() {
            base = base.with_default(*name, -(i as f64));
        }

        for mask in 0u8..16 {
            let input: FeatureMap = names
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(i, name)| (name.to_string(), FeatureValue::Number(i as f64 * 10.0)))
                .collect();

            let vector = assemble(&input, &base).unwrap();
            assert_eq!(vector.len(), names.len());
            for (i, value) in vector.as_slice().iter().enumerate() {
                let expected = if mask & (1 << i) != 0 {
                    i as f64 * 10.0
                } else {
                    -(i as f64)
                };
                assert_eq!(*value, expected, "mask {:04b} index {}", mask, i);
            }
        }
    }

    #[test]
    fn test_categorical_encoding() {
        let metadata = metadata(&["plan", "seats"])
            .with_encoder("plan", CategoricalEncoder::new(["free", "team", "enterprise"]));

        let vector = assemble(
            &features(&[("plan", "enterprise".into()), ("seats", 12.0.into())]),
            &metadata,
        )
        .unwrap();
        assert_eq!(vector.as_slice(), &[2.0, 12.0]);

        let err = assemble(
            &features(&[("plan", "trial".into()), ("seats", 1.0.into())]),
            &metadata,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidFeature { ref name, .. } if name == "plan"));
    }

    #[test]
    fn test_categorical_default_is_encoded() {
        let metadata = metadata(&["plan"])
            .with_encoder("plan", CategoricalEncoder::new(["free", "team"]))
            .with_default("plan", "team");
        let vector = assemble(&FeatureMap::new(), &metadata).unwrap();
        assert_eq!(vector.as_slice(), &[1.0]);
    }

    #[test]
    fn test_categorical_without_encoder_passes_numbers_through() {
        let metadata = metadata(&["bucket"]).with_categorical("bucket");
        let vector = assemble(&features(&[("bucket", 4.0.into())]), &metadata).unwrap();
        assert_eq!(vector.as_slice(), &[4.0]);
    }

    #[test]
    fn test_non_numeric_value_rejected() {
        let metadata = metadata(&["age"]);
        let err = assemble(&features(&[("age", "old".into())]), &metadata).unwrap_err();
        assert!(matches!(err, Error::InvalidFeature { ref name, .. } if name == "age"));
    }

    #[test]
    fn test_bool_and_numeric_text() {
        let metadata = metadata(&["active", "score"]);
        let vector = assemble(
            &features(&[("active", true.into()), ("score", "0.25".into())]),
            &metadata,
        )
        .unwrap();
        assert_eq!(vector.as_slice(), &[1.0, 0.25]);
    }
}
