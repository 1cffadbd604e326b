pub mod artifact;
pub mod classifier;
pub mod cli;
pub mod config;
pub mod context;
pub mod metrics;
pub mod predict;
pub mod report;
pub mod serve;
pub mod vectorizer;

use std::path::PathBuf;

#[derive(Debug)]
pub enum SentimenError {
    Io(std::io::Error),
    Json(serde_json::Error),
    Config(String),
    /// An artifact file could not be read, parsed, or failed shape validation.
    Artifact { path: PathBuf, reason: String },
    /// Feature vector and model disagree on dimensions at inference time.
    Shape(String),
}

impl std::fmt::Display for SentimenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SentimenError::Io(e) => write!(f, "io: {e}"),
            SentimenError::Json(e) => write!(f, "json: {e}"),
            SentimenError::Config(msg) => write!(f, "config: {msg}"),
            SentimenError::Artifact { path, reason } => {
                write!(f, "artifact {}: {reason}", path.display())
            }
            SentimenError::Shape(msg) => write!(f, "shape: {msg}"),
        }
    }
}

impl std::error::Error for SentimenError {}

impl From<std::io::Error> for SentimenError {
    fn from(e: std::io::Error) -> Self {
        SentimenError::Io(e)
    }
}

impl From<serde_json::Error> for SentimenError {
    fn from(e: serde_json::Error) -> Self {
        SentimenError::Json(e)
    }
}
