//! Process-wide service state: the shared vectorizer and both classifiers.
//!
//! Built once at start-up, then shared read-only by every request. All three
//! artifacts must load and agree on the feature dimension, or nothing starts.

use crate::SentimenError;
use crate::classifier::{Classifier, load_classifier};
use crate::config::ArtifactsConfig;
use crate::report::{DualPrediction, ModelInfo, ModelsInfo, Prediction, SinglePrediction};
use crate::vectorizer::{FeatureExtractor, TfidfVectorizer};
use std::sync::Arc;

/// Which of the two served models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelRole {
    /// Trained on the original, skewed class distribution.
    Imbalanced,
    /// Trained on a rebalanced class distribution.
    Balanced,
}

impl ModelRole {
    pub const ALL: [ModelRole; 2] = [ModelRole::Imbalanced, ModelRole::Balanced];

    pub fn as_str(self) -> &'static str {
        match self {
            ModelRole::Imbalanced => "imbalanced",
            ModelRole::Balanced => "balanced",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            ModelRole::Imbalanced => "Imbalanced Model",
            ModelRole::Balanced => "Balanced Model",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            ModelRole::Imbalanced => {
                "Model trained dengan data tidak seimbang (original distribution)"
            }
            ModelRole::Balanced => "Model trained dengan data seimbang (balanced distribution)",
        }
    }
}

/// File names reported by `/models/info`.
#[derive(Debug, Clone)]
pub struct ArtifactFiles {
    pub vectorizer: String,
    pub imbalanced: String,
    pub balanced: String,
}

impl From<&ArtifactsConfig> for ArtifactFiles {
    fn from(cfg: &ArtifactsConfig) -> Self {
        Self {
            vectorizer: cfg.vectorizer.clone(),
            imbalanced: cfg.imbalanced.clone(),
            balanced: cfg.balanced.clone(),
        }
    }
}

pub struct ServiceContext {
    extractor: Arc<dyn FeatureExtractor>,
    imbalanced: Arc<dyn Classifier>,
    balanced: Arc<dyn Classifier>,
    files: ArtifactFiles,
}

impl ServiceContext {
    /// Assemble a context from already-built parts, checking they fit together.
    pub fn new(
        extractor: Arc<dyn FeatureExtractor>,
        imbalanced: Arc<dyn Classifier>,
        balanced: Arc<dyn Classifier>,
        files: ArtifactFiles,
    ) -> Result<Self, SentimenError> {
        let dim = extractor.dimension();
        for (role, clf) in [(ModelRole::Imbalanced, &imbalanced), (ModelRole::Balanced, &balanced)] {
            if clf.n_features() != dim {
                return Err(SentimenError::Shape(format!(
                    "{} model expects {} features, vectorizer produces {dim}",
                    role.as_str(),
                    clf.n_features()
                )));
            }
            if clf.classes().is_empty() {
                return Err(SentimenError::Shape(format!(
                    "{} model has no classes",
                    role.as_str()
                )));
            }
        }
        Ok(Self {
            extractor,
            imbalanced,
            balanced,
            files,
        })
    }

    /// Load all three artifacts from the configured directory.
    pub fn load(cfg: &ArtifactsConfig) -> Result<Self, SentimenError> {
        let vectorizer_path = cfg.path(&cfg.vectorizer);
        let (vectorizer, hash) = TfidfVectorizer::load(&vectorizer_path)?;
        log::info!(
            "loaded vectorizer {} ({} features, {:?} analyzer, hash {hash})",
            vectorizer_path.display(),
            vectorizer.dimension(),
            vectorizer.analyzer()
        );

        let imbalanced = load_model(cfg, ModelRole::Imbalanced, &cfg.imbalanced)?;
        let balanced = load_model(cfg, ModelRole::Balanced, &cfg.balanced)?;

        Self::new(Arc::new(vectorizer), imbalanced, balanced, ArtifactFiles::from(cfg))
    }

    pub fn classifier(&self, role: ModelRole) -> &dyn Classifier {
        match role {
            ModelRole::Imbalanced => self.imbalanced.as_ref(),
            ModelRole::Balanced => self.balanced.as_ref(),
        }
    }

    /// Run one model over `text`.
    pub fn predict_one(&self, role: ModelRole, text: &str) -> Result<SinglePrediction, SentimenError> {
        let features = self.extractor.vectorize(text);
        let prediction = Prediction::from_classifier(self.classifier(role), &features)?;
        Ok(SinglePrediction {
            input_text: text.to_string(),
            model: role.as_str().to_string(),
            prediction,
        })
    }

    /// Run both models over one vectorization of `text`.
    pub fn predict_both(&self, text: &str) -> Result<DualPrediction, SentimenError> {
        let features = self.extractor.vectorize(text);
        Ok(DualPrediction {
            input_text: text.to_string(),
            imbalanced: Prediction::from_classifier(self.imbalanced.as_ref(), &features)?,
            balanced: Prediction::from_classifier(self.balanced.as_ref(), &features)?,
        })
    }

    /// Label sets read from the loaded models, plus the configured file names.
    pub fn models_info(&self) -> ModelsInfo {
        let models: Vec<ModelInfo> = ModelRole::ALL
            .into_iter()
            .map(|role| ModelInfo {
                name: role.display_name().to_string(),
                file: match role {
                    ModelRole::Imbalanced => self.files.imbalanced.clone(),
                    ModelRole::Balanced => self.files.balanced.clone(),
                },
                description: role.description().to_string(),
                classes: self.classifier(role).classes().to_vec(),
            })
            .collect();
        ModelsInfo {
            total_models: models.len(),
            models,
            vectorizer: self.files.vectorizer.clone(),
        }
    }
}

fn load_model(
    cfg: &ArtifactsConfig,
    role: ModelRole,
    file: &str,
) -> Result<Arc<dyn Classifier>, SentimenError> {
    let path = cfg.path(file);
    let (clf, hash) = load_classifier(&path)?;
    log::info!(
        "loaded {} model {} (classes {:?}, hash {hash})",
        role.as_str(),
        path.display(),
        clf.classes()
    );
    Ok(clf)
}
