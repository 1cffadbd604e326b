use crate::SentimenError;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file picked up from the working directory when no path is given.
pub const LOCAL_CONFIG_FILE: &str = "sentimen.toml";

#[derive(Debug, Deserialize, Default)]
pub struct SentimenConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub artifacts: ArtifactsConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub metrics: crate::metrics::MetricsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    8000
}

/// Where the three exported artifacts live. File names are relative to `dir`.
#[derive(Debug, Deserialize, Clone)]
pub struct ArtifactsConfig {
    #[serde(default = "default_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_vectorizer")]
    pub vectorizer: String,
    #[serde(default = "default_imbalanced")]
    pub imbalanced: String,
    #[serde(default = "default_balanced")]
    pub balanced: String,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            dir: default_dir(),
            vectorizer: default_vectorizer(),
            imbalanced: default_imbalanced(),
            balanced: default_balanced(),
        }
    }
}

impl ArtifactsConfig {
    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_vectorizer() -> String {
    "tfidf_vectorizer-NEW.json".into()
}

fn default_imbalanced() -> String {
    "nb_model-IMBALANCED.json".into()
}

fn default_balanced() -> String {
    "nb_model-BALANCED.json".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorsConfig {
    /// Allow any origin, method and header with credentials. Not for production.
    #[serde(default = "default_true")]
    pub permissive: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self { permissive: true }
    }
}

fn default_true() -> bool {
    true
}

/// Load config from an explicit path, `./sentimen.toml`, or defaults.
///
/// An explicit path (from `--config` or `SENTIMEN_CONFIG`) must exist.
pub fn load_config(explicit: Option<&Path>) -> Result<SentimenConfig, SentimenError> {
    let path = match explicit {
        Some(p) => Some(p.to_path_buf()),
        None => Some(PathBuf::from(LOCAL_CONFIG_FILE)).filter(|p| p.exists()),
    };
    match path {
        Some(p) => {
            let content = std::fs::read_to_string(&p)
                .map_err(|e| SentimenError::Config(format!("{}: {e}", p.display())))?;
            let config = parse_config(&content)
                .map_err(|e| SentimenError::Config(format!("{}: {e}", p.display())))?;
            log::debug!("loaded config from {}", p.display());
            Ok(config)
        }
        None => Ok(SentimenConfig::default()),
    }
}

/// Parse and validate TOML config text.
pub fn parse_config(content: &str) -> Result<SentimenConfig, SentimenError> {
    let config: SentimenConfig =
        toml::from_str(content).map_err(|e| SentimenError::Config(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &SentimenConfig) -> Result<(), SentimenError> {
    if config.server.host.trim().is_empty() {
        return Err(SentimenError::Config("server.host is empty".into()));
    }
    if config.server.port == 0 {
        return Err(SentimenError::Config("server.port must be non-zero".into()));
    }
    for (key, file) in [
        ("vectorizer", &config.artifacts.vectorizer),
        ("imbalanced", &config.artifacts.imbalanced),
        ("balanced", &config.artifacts.balanced),
    ] {
        if file.trim().is_empty() {
            return Err(SentimenError::Config(format!("artifacts.{key} is empty")));
        }
    }
    Ok(())
}
