//! Probabilistic sentiment classifiers.
//!
//! Both served models are exported from the training pipeline as JSON and
//! evaluated here over the shared TF-IDF vector. Naive Bayes is what the
//! pipeline trains today; linear (logistic regression) exports load the same way.

use crate::SentimenError;
use crate::artifact::{invalid, read_artifact};
use crate::vectorizer::FeatureVector;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Vector → label/distribution capability of one trained model.
pub trait Classifier: Send + Sync {
    /// Label set in the model's internal order.
    fn classes(&self) -> &[String];

    /// Feature dimension the model was trained on.
    fn n_features(&self) -> usize;

    /// Probability for each label, aligned with [`Classifier::classes`].
    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, SentimenError>;
}

/// Index of the first maximum. `None` for an empty slice.
///
/// This is the tie-break for every reported label: equal probabilities go to
/// the earliest label in [`Classifier::classes`].
pub fn argmax(values: &[f64]) -> Option<usize> {
    let (first, rest) = values.split_first()?;
    let mut best = (0, *first);
    for (i, &v) in rest.iter().enumerate() {
        if v > best.1 {
            best = (i + 1, v);
        }
    }
    Some(best.0)
}

/// Which normalization a multi-row linear model uses.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MultiClass {
    /// Softmax over per-class scores.
    #[default]
    Multinomial,
    /// One-vs-rest: per-class sigmoid, then renormalized.
    Ovr,
}

/// Classifier as exported by the training pipeline.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassifierArtifact {
    MultinomialNb {
        classes: Vec<String>,
        class_log_prior: Vec<f64>,
        feature_log_prob: Vec<Vec<f64>>,
    },
    Linear {
        classes: Vec<String>,
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
        #[serde(default)]
        multi_class: MultiClass,
    },
}

/// Validate an exported classifier and wrap it behind the [`Classifier`] trait.
pub fn build_classifier(artifact: ClassifierArtifact) -> Result<Arc<dyn Classifier>, SentimenError> {
    match artifact {
        ClassifierArtifact::MultinomialNb {
            classes,
            class_log_prior,
            feature_log_prob,
        } => {
            let nb = MultinomialNb::new(classes, class_log_prior, feature_log_prob)?;
            Ok(Arc::new(nb) as Arc<dyn Classifier>)
        }
        ClassifierArtifact::Linear {
            classes,
            coef,
            intercept,
            multi_class,
        } => {
            let lin = LinearModel::new(classes, coef, intercept, multi_class)?;
            Ok(Arc::new(lin) as Arc<dyn Classifier>)
        }
    }
}

/// Load a classifier from an exported JSON file. Returns it with its fingerprint.
pub fn load_classifier(path: &Path) -> Result<(Arc<dyn Classifier>, String), SentimenError> {
    let (artifact, hash) = read_artifact(path)?;
    let clf = build_classifier(artifact).map_err(|e| invalid(path, e))?;
    Ok((clf, hash))
}

fn check_classes(classes: &[String]) -> Result<(), SentimenError> {
    if classes.is_empty() {
        return Err(SentimenError::Shape("classifier has no classes".into()));
    }
    let mut seen = HashSet::new();
    if let Some(dup) = classes.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(SentimenError::Shape(format!("duplicate class label {dup:?}")));
    }
    Ok(())
}

/// Check a weight matrix is rectangular and finite. Returns its column count.
fn check_matrix(name: &str, rows: &[Vec<f64>]) -> Result<usize, SentimenError> {
    let width = rows.first().map_or(0, Vec::len);
    for (i, row) in rows.iter().enumerate() {
        if row.len() != width {
            return Err(SentimenError::Shape(format!(
                "{name} row {i} has {} features, expected {width}",
                row.len()
            )));
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(SentimenError::Shape(format!("{name} row {i} has non-finite values")));
        }
    }
    Ok(width)
}

fn check_dim(features: &FeatureVector, n_features: usize) -> Result<(), SentimenError> {
    if features.dim() != n_features {
        return Err(SentimenError::Shape(format!(
            "feature vector has {} features, model expects {n_features}",
            features.dim()
        )));
    }
    Ok(())
}

/// Multinomial Naive Bayes.
#[derive(Debug)]
pub struct MultinomialNb {
    classes: Vec<String>,
    class_log_prior: Vec<f64>,
    feature_log_prob: Vec<Vec<f64>>,
    n_features: usize,
}

impl MultinomialNb {
    pub fn new(
        classes: Vec<String>,
        class_log_prior: Vec<f64>,
        feature_log_prob: Vec<Vec<f64>>,
    ) -> Result<Self, SentimenError> {
        check_classes(&classes)?;
        if class_log_prior.len() != classes.len() {
            return Err(SentimenError::Shape(format!(
                "class_log_prior has {} entries for {} classes",
                class_log_prior.len(),
                classes.len()
            )));
        }
        if class_log_prior.iter().any(|v| !v.is_finite()) {
            return Err(SentimenError::Shape("class_log_prior has non-finite values".into()));
        }
        if feature_log_prob.len() != classes.len() {
            return Err(SentimenError::Shape(format!(
                "feature_log_prob has {} rows for {} classes",
                feature_log_prob.len(),
                classes.len()
            )));
        }
        let n_features = check_matrix("feature_log_prob", &feature_log_prob)?;
        Ok(Self {
            classes,
            class_log_prior,
            feature_log_prob,
            n_features,
        })
    }

    /// Unnormalized log posterior per class.
    fn joint_log_likelihood(&self, features: &FeatureVector) -> Vec<f64> {
        self.feature_log_prob
            .iter()
            .zip(&self.class_log_prior)
            .map(|(row, prior)| features.dot(row) + prior)
            .collect()
    }
}

impl Classifier for MultinomialNb {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, SentimenError> {
        check_dim(features, self.n_features)?;
        let jll = self.joint_log_likelihood(features);
        let log_norm = logsumexp(&jll);
        Ok(jll.iter().map(|v| (v - log_norm).exp()).collect())
    }
}

/// Logistic-regression style linear model.
#[derive(Debug)]
pub struct LinearModel {
    classes: Vec<String>,
    coef: Vec<Vec<f64>>,
    intercept: Vec<f64>,
    multi_class: MultiClass,
    n_features: usize,
}

impl LinearModel {
    pub fn new(
        classes: Vec<String>,
        coef: Vec<Vec<f64>>,
        intercept: Vec<f64>,
        multi_class: MultiClass,
    ) -> Result<Self, SentimenError> {
        check_classes(&classes)?;
        let binary = classes.len() == 2 && coef.len() == 1;
        if !binary && coef.len() != classes.len() {
            return Err(SentimenError::Shape(format!(
                "coef has {} rows for {} classes",
                coef.len(),
                classes.len()
            )));
        }
        if intercept.len() != coef.len() {
            return Err(SentimenError::Shape(format!(
                "intercept has {} entries for {} coef rows",
                intercept.len(),
                coef.len()
            )));
        }
        if intercept.iter().any(|v| !v.is_finite()) {
            return Err(SentimenError::Shape("intercept has non-finite values".into()));
        }
        let n_features = check_matrix("coef", &coef)?;
        Ok(Self {
            classes,
            coef,
            intercept,
            multi_class,
            n_features,
        })
    }

    fn decision_function(&self, features: &FeatureVector) -> Vec<f64> {
        self.coef
            .iter()
            .zip(&self.intercept)
            .map(|(row, b)| features.dot(row) + b)
            .collect()
    }
}

impl Classifier for LinearModel {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, SentimenError> {
        check_dim(features, self.n_features)?;
        let scores = self.decision_function(features);

        // Single row scores the second class against the first.
        if scores.len() == 1 && self.classes.len() == 2 {
            let p = sigmoid(scores[0]);
            return Ok(vec![1.0 - p, p]);
        }

        match self.multi_class {
            MultiClass::Multinomial => {
                let log_norm = logsumexp(&scores);
                Ok(scores.iter().map(|s| (s - log_norm).exp()).collect())
            }
            MultiClass::Ovr => {
                let raw: Vec<f64> = scores.iter().map(|&s| sigmoid(s)).collect();
                let total: f64 = raw.iter().sum();
                if total == 0.0 {
                    let uniform = 1.0 / raw.len() as f64;
                    return Ok(vec![uniform; raw.len()]);
                }
                Ok(raw.iter().map(|p| p / total).collect())
            }
        }
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable `ln(Σ exp(v))`.
fn logsumexp(values: &[f64]) -> f64 {
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|v| (v - max).exp()).sum();
    max + sum.ln()
}
