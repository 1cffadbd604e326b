use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sentimen",
    version,
    about = "Sentiment analysis API with imbalanced and balanced Naive Bayes models"
)]
pub struct Cli {
    /// Config file path (default: ./sentimen.toml when present)
    #[arg(long, env = "SENTIMEN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding the vectorizer and model artifacts
    #[arg(long, env = "SENTIMEN_ARTIFACTS", global = true)]
    pub artifacts: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the HTTP API
    Serve(ServeArgs),
    /// Classify one text and print the JSON report
    Predict(PredictArgs),
    /// Print the loaded models' label sets and artifact names
    Info,
}

#[derive(Parser)]
pub struct ServeArgs {
    /// Listen address (default 0.0.0.0)
    #[arg(long)]
    pub host: Option<String>,

    /// Listen port (default 8000)
    #[arg(long)]
    pub port: Option<u16>,
}

#[derive(Parser)]
pub struct PredictArgs {
    /// Text to classify (reads stdin when omitted)
    pub text: Option<String>,

    /// Which model(s) to run
    #[arg(long, value_enum, default_value = "both")]
    pub model: ModelChoice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum ModelChoice {
    Both,
    Imbalanced,
    Balanced,
}
