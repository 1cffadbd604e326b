//! HTTP API over the shared service context.

use crate::SentimenError;
use crate::config::SentimenConfig;
use crate::context::{ModelRole, ServiceContext};
use crate::metrics::record_request_metrics;
use crate::report::{DualPrediction, ModelsInfo, SinglePrediction};
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Instant;
use tokio::net::TcpListener;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};

type AppState = Arc<ServiceContext>;

/// Request body for every predict endpoint.
#[derive(Debug, Deserialize)]
pub struct TextInput {
    pub text: String,
}

/// Failure modes of one request.
#[derive(Debug)]
pub enum ApiError {
    /// Body was not JSON, lacked `text`, or `text` was not a string.
    Rejected(JsonRejection),
    /// Vectorization or classification failed.
    Internal(SentimenError),
}

impl From<JsonRejection> for ApiError {
    fn from(e: JsonRejection) -> Self {
        ApiError::Rejected(e)
    }
}

impl From<SentimenError> for ApiError {
    fn from(e: SentimenError) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Rejected(rejection) => {
                log::debug!("rejected request body: {}", rejection.body_text());
                (
                    rejection.status(),
                    Json(json!({"detail": rejection.body_text()})),
                )
                    .into_response()
            }
            ApiError::Internal(e) => {
                log::error!("prediction failed: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": "Internal Server Error"})),
                )
                    .into_response()
            }
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Rejected(r) => r.status(),
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Build the router. `permissive_cors` mirrors any origin, method and header
/// with credentials allowed; suitable for development only.
pub fn router(ctx: Arc<ServiceContext>, permissive_cors: bool) -> Router {
    let router = Router::new()
        .route("/", get(root))
        .route("/predict", post(predict))
        .route("/predict/imbalanced", post(predict_imbalanced))
        .route("/predict/balanced", post(predict_balanced))
        .route("/models/info", get(models_info))
        .route("/openapi.json", get(openapi))
        // Texts of any length are accepted.
        .layer(DefaultBodyLimit::disable())
        .with_state(ctx);

    if permissive_cors {
        router.layer(permissive_cors_layer())
    } else {
        router
    }
}

fn permissive_cors_layer() -> CorsLayer {
    // Wildcards are not allowed together with credentials, so echo the request instead.
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

async fn root() -> Json<Value> {
    Json(json!({
        "message": "API Sentimen aktif dengan 2 model (Imbalanced vs Balanced).",
        "endpoints": {
            "/predict": "POST - Analisis sentimen dengan kedua model",
            "/predict/imbalanced": "POST - Analisis sentimen dengan model Imbalanced",
            "/predict/balanced": "POST - Analisis sentimen dengan model Balanced",
            "/models/info": "GET - Informasi model yang tersedia",
            "/openapi.json": "GET - Dokumentasi API (OpenAPI)"
        }
    }))
}

const API_TITLE: &str = "Sentiment Analysis API";
const API_DESCRIPTION: &str =
    "API untuk menganalisis sentimen teks menggunakan 2 model Naive Bayes (Imbalanced vs Balanced)";

/// OpenAPI description of every route.
async fn openapi() -> Json<Value> {
    let text_body = json!({
        "required": true,
        "content": {"application/json": {"schema": {"$ref": "#/components/schemas/TextInput"}}}
    });
    let ok = |schema: &str| {
        json!({
            "200": {
                "description": "Successful Response",
                "content": {"application/json": {"schema": {"$ref": format!("#/components/schemas/{schema}")}}}
            },
            "422": {"description": "Validation Error"},
            "500": {"description": "Internal Server Error"}
        })
    };
    let predict_op = |summary: &str, schema: &str| {
        json!({"post": {"summary": summary, "requestBody": text_body, "responses": ok(schema)}})
    };
    let probabilities = json!({"type": "object", "additionalProperties": {"type": "number"}});

    Json(json!({
        "openapi": "3.1.0",
        "info": {
            "title": API_TITLE,
            "description": API_DESCRIPTION,
            "version": env!("CARGO_PKG_VERSION")
        },
        "paths": {
            "/": {"get": {"summary": "Service description", "responses": {"200": {"description": "Successful Response"}}}},
            "/predict": predict_op("Predict with both models", "DualPrediction"),
            "/predict/imbalanced": predict_op("Predict with the imbalanced model", "SinglePrediction"),
            "/predict/balanced": predict_op("Predict with the balanced model", "SinglePrediction"),
            "/models/info": {"get": {"summary": "Loaded models", "responses": ok("ModelsInfo")}},
            "/openapi.json": {"get": {"summary": "This document", "responses": {"200": {"description": "Successful Response"}}}}
        },
        "components": {"schemas": {
            "TextInput": {
                "type": "object",
                "required": ["text"],
                "properties": {"text": {"type": "string"}}
            },
            "Prediction": {
                "type": "object",
                "required": ["predicted_sentiment", "confidence", "probabilities"],
                "properties": {
                    "predicted_sentiment": {"type": "string"},
                    "confidence": {"type": "number"},
                    "probabilities": probabilities
                }
            },
            "DualPrediction": {
                "type": "object",
                "required": ["input_text", "imbalanced", "balanced"],
                "properties": {
                    "input_text": {"type": "string"},
                    "imbalanced": {"$ref": "#/components/schemas/Prediction"},
                    "balanced": {"$ref": "#/components/schemas/Prediction"}
                }
            },
            "SinglePrediction": {
                "type": "object",
                "required": ["input_text", "model", "predicted_sentiment", "confidence", "probabilities"],
                "properties": {
                    "input_text": {"type": "string"},
                    "model": {"type": "string", "enum": ["imbalanced", "balanced"]},
                    "predicted_sentiment": {"type": "string"},
                    "confidence": {"type": "number"},
                    "probabilities": probabilities
                }
            },
            "ModelsInfo": {
                "type": "object",
                "required": ["total_models", "models", "vectorizer"],
                "properties": {
                    "total_models": {"type": "integer"},
                    "models": {"type": "array", "items": {
                        "type": "object",
                        "properties": {
                            "name": {"type": "string"},
                            "file": {"type": "string"},
                            "description": {"type": "string"},
                            "classes": {"type": "array", "items": {"type": "string"}}
                        }
                    }},
                    "vectorizer": {"type": "string"}
                }
            }
        }}
    }))
}

/// Record metrics for a finished request and pass the result through.
fn observed<T>(endpoint: &str, start: Instant, result: Result<T, ApiError>) -> Result<T, ApiError> {
    let status = match &result {
        Ok(_) => StatusCode::OK,
        Err(e) => e.status(),
    };
    record_request_metrics(endpoint, status.as_u16(), start);
    result
}

async fn predict(
    State(ctx): State<AppState>,
    body: Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<DualPrediction>, ApiError> {
    let start = Instant::now();
    let result = match body {
        Ok(Json(input)) => ctx.predict_both(&input.text).map(Json).map_err(ApiError::from),
        Err(rejection) => Err(ApiError::from(rejection)),
    };
    observed("predict", start, result)
}

async fn predict_imbalanced(
    State(ctx): State<AppState>,
    body: Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<SinglePrediction>, ApiError> {
    predict_single(&ctx, ModelRole::Imbalanced, body)
}

async fn predict_balanced(
    State(ctx): State<AppState>,
    body: Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<SinglePrediction>, ApiError> {
    predict_single(&ctx, ModelRole::Balanced, body)
}

fn predict_single(
    ctx: &ServiceContext,
    role: ModelRole,
    body: Result<Json<TextInput>, JsonRejection>,
) -> Result<Json<SinglePrediction>, ApiError> {
    let start = Instant::now();
    let endpoint = match role {
        ModelRole::Imbalanced => "predict_imbalanced",
        ModelRole::Balanced => "predict_balanced",
    };
    let result = match body {
        Ok(Json(input)) => ctx.predict_one(role, &input.text).map(Json).map_err(ApiError::from),
        Err(rejection) => Err(ApiError::from(rejection)),
    };
    observed(endpoint, start, result)
}

async fn models_info(State(ctx): State<AppState>) -> Json<ModelsInfo> {
    Json(ctx.models_info())
}

/// Load artifacts, then serve until Ctrl-C.
pub fn handle_serve(config: &SentimenConfig) -> Result<(), SentimenError> {
    // All artifacts load before the runtime or the socket exists.
    let ctx = Arc::new(ServiceContext::load(&config.artifacts)?);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(SentimenError::Io)?;

    rt.block_on(run_server(ctx, config))
}

async fn run_server(ctx: Arc<ServiceContext>, config: &SentimenConfig) -> Result<(), SentimenError> {
    let provider = crate::metrics::init_meter_provider(&config.metrics);

    if config.cors.permissive {
        log::warn!("permissive CORS enabled: any origin with credentials");
    }
    let app = router(ctx, config.cors.permissive);

    let address = format!("{}:{}", config.server.host, config.server.port);
    let listener = TcpListener::bind(&address)
        .await
        .map_err(|e| SentimenError::Config(format!("bind {address}: {e}")))?;
    log::info!("serving on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    log::info!("server stopped");

    if let Some(p) = provider {
        let _ = p.shutdown();
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("ctrl-c handler: {e}");
        std::future::pending::<()>().await;
    }
    log::info!("shutdown requested");
}
