//! JSON shapes returned by the HTTP API and the `predict`/`info` commands.

use crate::SentimenError;
use crate::classifier::{Classifier, argmax};
use crate::vectorizer::FeatureVector;
use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

/// Round to 4 decimal places for presentation.
///
/// Rounds the exact binary value, ties to even, so results agree with
/// Python's `round(x, 4)`.
pub fn round4(value: f64) -> f64 {
    format!("{value:.4}").parse().unwrap_or(value)
}

/// Label → probability mapping, serialized as a JSON object in label-set order.
#[derive(Debug, Clone, PartialEq)]
pub struct Probabilities(Vec<(String, f64)>);

impl Probabilities {
    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(label, p)| (label.as_str(), *p))
    }

    pub fn get(&self, label: &str) -> Option<f64> {
        self.iter().find(|(l, _)| *l == label).map(|(_, p)| p)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for Probabilities {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, p) in &self.0 {
            map.serialize_entry(label, p)?;
        }
        map.end()
    }
}

/// One classifier's verdict on one text.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    pub predicted_sentiment: String,
    pub confidence: f64,
    pub probabilities: Probabilities,
}

impl Prediction {
    /// Run one classifier over an already vectorized text.
    pub fn from_classifier(clf: &dyn Classifier, features: &FeatureVector) -> Result<Self, SentimenError> {
        let proba = clf.predict_proba(features)?;
        let classes = clf.classes();
        if proba.len() != classes.len() {
            return Err(SentimenError::Shape(format!(
                "{} probabilities for {} classes",
                proba.len(),
                classes.len()
            )));
        }
        let best = argmax(&proba)
            .ok_or_else(|| SentimenError::Shape("empty probability distribution".into()))?;

        Ok(Prediction {
            predicted_sentiment: classes[best].clone(),
            confidence: round4(proba[best]),
            probabilities: Probabilities(
                classes
                    .iter()
                    .zip(&proba)
                    .map(|(label, p)| (label.clone(), round4(*p)))
                    .collect(),
            ),
        })
    }
}

/// `POST /predict` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DualPrediction {
    pub input_text: String,
    pub imbalanced: Prediction,
    pub balanced: Prediction,
}

/// `POST /predict/{model}` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SinglePrediction {
    pub input_text: String,
    pub model: String,
    #[serde(flatten)]
    pub prediction: Prediction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub name: String,
    pub file: String,
    pub description: String,
    pub classes: Vec<String>,
}

/// `GET /models/info` body.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelsInfo {
    pub total_models: usize,
    pub models: Vec<ModelInfo>,
    pub vectorizer: String,
}
