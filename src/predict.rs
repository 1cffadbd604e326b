//! One-shot `predict` and `info` commands.
//!
//! Same artifacts and same JSON as the HTTP API, without starting a server.

use crate::SentimenError;
use crate::cli::{ModelChoice, PredictArgs};
use crate::config::SentimenConfig;
use crate::context::{ModelRole, ServiceContext};
use std::io::Read;

/// Classify the argument text (or stdin) and print the report as JSON.
pub fn handle_predict(config: &SentimenConfig, args: &PredictArgs) -> Result<(), SentimenError> {
    let text = match &args.text {
        Some(t) => t.clone(),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf.trim_end_matches(['\r', '\n']).to_string()
        }
    };

    let ctx = ServiceContext::load(&config.artifacts)?;
    let json = render_prediction(&ctx, args.model, &text)?;
    println!("{json}");
    Ok(())
}

/// Print the `/models/info` JSON for the configured artifacts.
pub fn handle_info(config: &SentimenConfig) -> Result<(), SentimenError> {
    let ctx = ServiceContext::load(&config.artifacts)?;
    println!("{}", serde_json::to_string_pretty(&ctx.models_info())?);
    Ok(())
}

fn render_prediction(
    ctx: &ServiceContext,
    choice: ModelChoice,
    text: &str,
) -> Result<String, SentimenError> {
    let json = match choice {
        ModelChoice::Both => serde_json::to_string_pretty(&ctx.predict_both(text)?)?,
        ModelChoice::Imbalanced => {
            serde_json::to_string_pretty(&ctx.predict_one(ModelRole::Imbalanced, text)?)?
        }
        ModelChoice::Balanced => {
            serde_json::to_string_pretty(&ctx.predict_one(ModelRole::Balanced, text)?)?
        }
    };
    Ok(json)
}
