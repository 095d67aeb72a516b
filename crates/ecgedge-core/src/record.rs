//! Feature records decoded from inbound payloads.

use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::labels::{rhythm_code, t_wave_code};

/// Number of model input features: six measurements plus two category codes.
pub const FEATURE_COUNT: usize = 8;

#[derive(Debug, Error, PartialEq)]
pub enum SchemaError {
    #[error("{0}")]
    Malformed(String),
    #[error("field `{0}` is not a finite number")]
    NonFinite(&'static str),
    #[error("field `{0}` must be a non-empty string")]
    EmptyCategory(&'static str),
}

/// One ECG measurement set, as sent by a client.
///
/// Numeric fields accept JSON numbers or numeric strings, since web form
/// clients submit text inputs verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    #[serde(rename = "Heart_Rate", deserialize_with = "number_or_string")]
    pub heart_rate: f64,
    #[serde(rename = "PR_Interval", deserialize_with = "number_or_string")]
    pub pr_interval: f64,
    #[serde(rename = "QRS_Duration", deserialize_with = "number_or_string")]
    pub qrs_duration: f64,
    #[serde(rename = "ST_Segment", deserialize_with = "number_or_string")]
    pub st_segment: f64,
    #[serde(rename = "QTc_Interval", deserialize_with = "number_or_string")]
    pub qtc_interval: f64,
    #[serde(rename = "Electrical_Axis", deserialize_with = "number_or_string")]
    pub electrical_axis: f64,
    #[serde(rename = "Rhythm")]
    pub rhythm: String,
    #[serde(rename = "T_Wave")]
    pub t_wave: String,
}

impl FeatureRecord {
    /// Parse and validate a record from a decoded JSON object.
    pub fn from_json(value: serde_json::Value) -> Result<Self, SchemaError> {
        let record: Self =
            serde_json::from_value(value).map_err(|e| SchemaError::Malformed(e.to_string()))?;
        record.validate()?;
        Ok(record)
    }

    /// Check the record invariants: finite numerics, non-empty categories.
    pub fn validate(&self) -> Result<(), SchemaError> {
        let numerics = [
            ("Heart_Rate", self.heart_rate),
            ("PR_Interval", self.pr_interval),
            ("QRS_Duration", self.qrs_duration),
            ("ST_Segment", self.st_segment),
            ("QTc_Interval", self.qtc_interval),
            ("Electrical_Axis", self.electrical_axis),
        ];
        if let Some((name, _)) = numerics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SchemaError::NonFinite(name));
        }
        if self.rhythm.trim().is_empty() {
            return Err(SchemaError::EmptyCategory("Rhythm"));
        }
        if self.t_wave.trim().is_empty() {
            return Err(SchemaError::EmptyCategory("T_Wave"));
        }
        Ok(())
    }

    /// Unscaled model input vector, categories replaced by their codes.
    pub fn to_features(&self) -> [f32; FEATURE_COUNT] {
        [
            self.heart_rate as f32,
            self.pr_interval as f32,
            self.qrs_duration as f32,
            self.st_segment as f32,
            self.qtc_interval as f32,
            self.electrical_axis as f32,
            rhythm_code(&self.rhythm) as f32,
            t_wave_code(&self.t_wave) as f32,
        ]
    }
}

fn number_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("`{s}` is not a number"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> serde_json::Value {
        json!({
            "Heart_Rate": 75,
            "PR_Interval": 160,
            "QRS_Duration": 90,
            "ST_Segment": 0.1,
            "QTc_Interval": 400,
            "Electrical_Axis": 30,
            "Rhythm": "Sinus",
            "T_Wave": "Normal"
        })
    }

    #[test]
    fn parses_numeric_fields() {
        let record = FeatureRecord::from_json(sample()).unwrap();
        assert_eq!(record.heart_rate, 75.0);
        assert_eq!(record.st_segment, 0.1);
        assert_eq!(record.rhythm, "Sinus");
    }

    #[test]
    fn accepts_numeric_strings() {
        let mut value = sample();
        value["Heart_Rate"] = json!("82.5");
        let record = FeatureRecord::from_json(value).unwrap();
        assert_eq!(record.heart_rate, 82.5);
    }

    #[test]
    fn rejects_non_numeric_string() {
        let mut value = sample();
        value["QRS_Duration"] = json!("wide");
        let err = FeatureRecord::from_json(value).unwrap_err();
        assert!(matches!(err, SchemaError::Malformed(_)));
    }

    #[test]
    fn rejects_missing_field() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("QTc_Interval");
        let err = FeatureRecord::from_json(value).unwrap_err();
        assert!(err.to_string().contains("QTc_Interval"), "got: {err}");
    }

    #[test]
    fn rejects_non_finite_string() {
        let mut value = sample();
        value["Electrical_Axis"] = json!("NaN");
        let err = FeatureRecord::from_json(value).unwrap_err();
        assert_eq!(err, SchemaError::NonFinite("Electrical_Axis"));
    }

    #[test]
    fn rejects_empty_category() {
        let mut value = sample();
        value["T_Wave"] = json!("  ");
        let err = FeatureRecord::from_json(value).unwrap_err();
        assert_eq!(err, SchemaError::EmptyCategory("T_Wave"));
    }

    #[test]
    fn unknown_category_is_tolerated() {
        let mut value = sample();
        value["Rhythm"] = json!("Junctional");
        let record = FeatureRecord::from_json(value).unwrap();
        assert_eq!(record.to_features()[6], 0.0);
    }

    #[test]
    fn features_follow_model_input_order() {
        let mut value = sample();
        value["Rhythm"] = json!("Atrial Fibrillation");
        value["T_Wave"] = json!("Peaked");
        let features = FeatureRecord::from_json(value).unwrap().to_features();
        assert_eq!(features, [75.0, 160.0, 90.0, 0.1, 400.0, 30.0, 3.0, 2.0]);
    }
}
