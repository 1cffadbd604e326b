use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode, header};
use sentimen::SentimenError;
use sentimen::classifier::Classifier;
use sentimen::config::ArtifactsConfig;
use sentimen::context::{ArtifactFiles, ServiceContext};
use sentimen::serve::router;
use sentimen::vectorizer::{FeatureExtractor, FeatureVector, TfidfVectorizer};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;
use tower::ServiceExt;

const LABELS: [&str; 3] = ["negative", "neutral", "positive"];
const VOCAB: [&str; 6] = ["bagus", "sangat", "jelek", "buruk", "biasa", "produk"];

fn ln_rows(rows: &[[f64; 6]]) -> Vec<Vec<f64>> {
    rows.iter().map(|r| r.iter().map(|p| p.ln()).collect()).collect()
}

fn write_artifacts(dir: &Path) {
    let vocabulary: serde_json::Map<String, Value> = VOCAB
        .iter()
        .enumerate()
        .map(|(i, t)| (t.to_string(), json!(i)))
        .collect();
    let vectorizer = json!({
        "vocabulary": vocabulary,
        "idf": [1.2, 1.5, 1.4, 1.6, 1.3, 1.1],
        "ngram_range": [1, 1],
    });

    let feature_log_prob = ln_rows(&[
        [0.05, 0.20, 0.30, 0.30, 0.05, 0.10],
        [0.10, 0.10, 0.10, 0.10, 0.40, 0.20],
        [0.40, 0.25, 0.05, 0.05, 0.05, 0.20],
    ]);
    let imbalanced = json!({
        "kind": "multinomial_nb",
        "classes": LABELS,
        "class_log_prior": [0.2_f64.ln(), 0.2_f64.ln(), 0.6_f64.ln()],
        "feature_log_prob": feature_log_prob,
    });
    let balanced = json!({
        "kind": "multinomial_nb",
        "classes": LABELS,
        "class_log_prior": vec![(1.0_f64 / 3.0).ln(); 3],
        "feature_log_prob": feature_log_prob,
    });

    std::fs::write(dir.join("tfidf_vectorizer-NEW.json"), vectorizer.to_string()).unwrap();
    std::fs::write(dir.join("nb_model-IMBALANCED.json"), imbalanced.to_string()).unwrap();
    std::fs::write(dir.join("nb_model-BALANCED.json"), balanced.to_string()).unwrap();
}

fn artifacts_config(dir: &Path) -> ArtifactsConfig {
    ArtifactsConfig {
        dir: dir.to_path_buf(),
        ..Default::default()
    }
}

fn loaded_context() -> (TempDir, Arc<ServiceContext>) {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let ctx = ServiceContext::load(&artifacts_config(dir.path())).unwrap();
    (dir, Arc::new(ctx))
}

fn app() -> (TempDir, Router) {
    let (dir, ctx) = loaded_context();
    (dir, router(ctx, true))
}

/// Wraps a classifier and counts inference calls.
struct CountingClassifier {
    inner: Arc<dyn Classifier>,
    calls: AtomicUsize,
}

impl Classifier for CountingClassifier {
    fn classes(&self) -> &[String] {
        self.inner.classes()
    }

    fn n_features(&self) -> usize {
        self.inner.n_features()
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<Vec<f64>, SentimenError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.predict_proba(features)
    }
}

/// Always fails at inference time.
struct BrokenClassifier {
    classes: Vec<String>,
    n_features: usize,
}

impl Classifier for BrokenClassifier {
    fn classes(&self) -> &[String] {
        &self.classes
    }

    fn n_features(&self) -> usize {
        self.n_features
    }

    fn predict_proba(&self, _features: &FeatureVector) -> Result<Vec<f64>, SentimenError> {
        Err(SentimenError::Shape("weights corrupted".into()))
    }
}

fn counting_app() -> (TempDir, Router, Arc<CountingClassifier>, Arc<CountingClassifier>) {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let cfg = artifacts_config(dir.path());
    let (vectorizer, _) = TfidfVectorizer::load(&cfg.path(&cfg.vectorizer)).unwrap();
    let (imb, _) = sentimen::classifier::load_classifier(&cfg.path(&cfg.imbalanced)).unwrap();
    let (bal, _) = sentimen::classifier::load_classifier(&cfg.path(&cfg.balanced)).unwrap();
    let imb = Arc::new(CountingClassifier { inner: imb, calls: AtomicUsize::new(0) });
    let bal = Arc::new(CountingClassifier { inner: bal, calls: AtomicUsize::new(0) });
    let ctx = ServiceContext::new(
        Arc::new(vectorizer),
        imb.clone(),
        bal.clone(),
        ArtifactFiles::from(&cfg),
    )
    .unwrap();
    (dir, router(Arc::new(ctx), false), imb, bal)
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn send_raw(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send_raw(app, request).await;
    (status, serde_json::from_slice(&body).unwrap())
}

/// Check one prediction block against the response invariants.
fn assert_block_consistent(block: &Value) {
    let probs = block["probabilities"].as_object().unwrap();
    assert_eq!(probs.len(), LABELS.len());
    for label in LABELS {
        assert!(probs.contains_key(label), "missing {label}");
    }

    let sum: f64 = probs.values().map(|v| v.as_f64().unwrap()).sum();
    assert!((sum - 1.0).abs() <= 0.001, "probabilities sum to {sum}");

    let (best_label, best) = probs
        .iter()
        .map(|(l, v)| (l.as_str(), v.as_f64().unwrap()))
        .fold(("", f64::NEG_INFINITY), |acc, (l, v)| if v > acc.1 { (l, v) } else { acc });
    let confidence = block["confidence"].as_f64().unwrap();
    assert!((confidence - best).abs() < 1e-9);
    assert_eq!(block["predicted_sentiment"], best_label);

    for v in probs.values() {
        let v = v.as_f64().unwrap();
        assert!((0.0..=1.0).contains(&v));
        assert!(((v * 10_000.0).round() - v * 10_000.0).abs() < 1e-6, "{v} not at 4 dp");
    }
}

// --- info endpoints ---

#[tokio::test]
async fn root_describes_service() {
    let (_dir, app) = app();
    let (status, body) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["message"].is_string());
    assert!(body["endpoints"]["/predict"].is_string());
}

#[tokio::test]
async fn openapi_document_is_served() {
    let (_dir, app) = app();
    let (status, body) = send(&app, get("/openapi.json")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info"]["title"], "Sentiment Analysis API");
    for path in ["/", "/predict", "/predict/imbalanced", "/predict/balanced", "/models/info"] {
        assert!(body["paths"][path].is_object(), "missing {path}");
    }

    let (_, root) = send(&app, get("/")).await;
    assert!(root["endpoints"]["/openapi.json"].is_string());
}

#[tokio::test]
async fn models_info_reports_two_models() {
    let (_dir, app) = app();
    let (status, body) = send(&app, get("/models/info")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total_models"], 2);
    let models = body["models"].as_array().unwrap();
    assert_eq!(models.len(), 2);
    for model in models {
        let classes = model["classes"].as_array().unwrap();
        assert!(!classes.is_empty());
        assert!(model["name"].is_string());
        assert!(model["description"].is_string());
    }
    assert_eq!(models[0]["file"], "nb_model-IMBALANCED.json");
    assert_eq!(models[1]["file"], "nb_model-BALANCED.json");
    assert_eq!(models[0]["classes"], json!(LABELS));
    assert_eq!(body["vectorizer"], "tfidf_vectorizer-NEW.json");
}

// --- predict ---

#[tokio::test]
async fn dual_predict_example() {
    let (_dir, app) = app();
    let (status, body) = send(&app, post_json("/predict", r#"{"text": "produk ini sangat bagus"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["input_text"], "produk ini sangat bagus");
    for key in ["imbalanced", "balanced"] {
        assert_block_consistent(&body[key]);
        assert_eq!(body[key]["predicted_sentiment"], "positive");
    }
}

#[tokio::test]
async fn dual_predict_negative_text() {
    let (_dir, app) = app();
    let (status, body) = send(&app, post_json("/predict", r#"{"text": "Jelek, buruk sekali"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_block_consistent(&body["imbalanced"]);
    assert_block_consistent(&body["balanced"]);
    assert_eq!(body["balanced"]["predicted_sentiment"], "negative");
}

#[tokio::test]
async fn unknown_words_fall_back_to_priors() {
    let (_dir, app) = app();
    let (status, body) = send(&app, post_json("/predict", r#"{"text": "xyz qwerty"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["imbalanced"]["predicted_sentiment"], "positive");
    assert_eq!(body["imbalanced"]["confidence"], 0.6);
    // Uniform prior: first label wins the tie
    assert_eq!(body["balanced"]["predicted_sentiment"], "negative");
    assert_eq!(body["balanced"]["confidence"], 0.3333);
}

#[tokio::test]
async fn empty_and_unicode_text_are_accepted() {
    let (_dir, app) = app();
    for text in ["", "😀 très bien 好", "   "] {
        let payload = json!({ "text": text }).to_string();
        let (status, body) = send(&app, post_json("/predict", &payload)).await;
        assert_eq!(status, StatusCode::OK, "text {text:?}");
        assert_eq!(body["input_text"], text);
        assert_block_consistent(&body["imbalanced"]);
    }
}

#[tokio::test]
async fn text_larger_than_default_body_limit_is_accepted() {
    let (_dir, app) = app();
    let text = "bagus ".repeat(400_000);
    let payload = json!({ "text": text }).to_string();
    assert!(payload.len() > 2 * 1024 * 1024);

    let (status, body) = send(&app, post_json("/predict", &payload)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["input_text"].as_str().map(str::len), Some(text.len()));
    assert_eq!(body["imbalanced"]["predicted_sentiment"], "positive");

    let (status, _) = send(&app, post_json("/predict/balanced", &payload)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn identical_requests_are_byte_identical() {
    let (_dir, app) = app();
    let payload = r#"{"text": "produk biasa, tidak bagus tapi tidak jelek"}"#;
    let (_, first) = send_raw(&app, post_json("/predict", payload)).await;
    for _ in 0..5 {
        let (status, again) = send_raw(&app, post_json("/predict", payload)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(again, first);
    }
}

#[tokio::test]
async fn single_endpoints_match_dual_blocks() {
    let (_dir, app) = app();
    for text in ["produk ini sangat bagus", "biasa saja", "buruk"] {
        let payload = json!({ "text": text }).to_string();
        let (_, dual) = send(&app, post_json("/predict", &payload)).await;

        for model in ["imbalanced", "balanced"] {
            let (status, single) =
                send(&app, post_json(&format!("/predict/{model}"), &payload)).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(single["model"], model);
            assert_eq!(single["input_text"], text);
            assert_eq!(single["predicted_sentiment"], dual[model]["predicted_sentiment"]);
            assert_eq!(single["confidence"], dual[model]["confidence"]);
            assert_eq!(single["probabilities"], dual[model]["probabilities"]);
        }
    }
}

#[tokio::test]
async fn probabilities_keep_label_order() {
    let (_dir, app) = app();
    let (_, body) = send_raw(&app, post_json("/predict/balanced", r#"{"text": "bagus"}"#)).await;
    let text = String::from_utf8(body).unwrap();
    let text = &text[text.find("\"probabilities\"").unwrap()..];
    let neg = text.find("\"negative\"").unwrap();
    let neu = text.find("\"neutral\"").unwrap();
    let pos = text.find("\"positive\"").unwrap();
    assert!(neg < neu && neu < pos);
}

// --- rejected requests ---

#[tokio::test]
async fn invalid_bodies_are_rejected_without_inference() {
    let (_dir, app, imb, bal) = counting_app();

    let cases = [
        ("/predict", "{}", StatusCode::UNPROCESSABLE_ENTITY),
        ("/predict", r#"{"text": 42}"#, StatusCode::UNPROCESSABLE_ENTITY),
        ("/predict", r#"{"text": null}"#, StatusCode::UNPROCESSABLE_ENTITY),
        ("/predict", r#"{"txt": "bagus"}"#, StatusCode::UNPROCESSABLE_ENTITY),
        ("/predict", "not json", StatusCode::BAD_REQUEST),
        ("/predict/imbalanced", "{}", StatusCode::UNPROCESSABLE_ENTITY),
        ("/predict/balanced", r#"{"text": ["a"]}"#, StatusCode::UNPROCESSABLE_ENTITY),
    ];
    for (uri, payload, expected) in cases {
        let (status, body) = send(&app, post_json(uri, payload)).await;
        assert_eq!(status, expected, "{uri} {payload}");
        assert!(body["detail"].is_string());
    }

    let request = Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .body(Body::from(r#"{"text": "bagus"}"#))
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNSUPPORTED_MEDIA_TYPE);

    assert_eq!(imb.calls.load(Ordering::SeqCst), 0);
    assert_eq!(bal.calls.load(Ordering::SeqCst), 0);

    // A valid request does reach both models
    let (status, _) = send(&app, post_json("/predict", r#"{"text": "bagus"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert!(imb.calls.load(Ordering::SeqCst) > 0);
    assert!(bal.calls.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn single_endpoint_runs_only_its_model() {
    let (_dir, app, imb, bal) = counting_app();
    let (status, _) = send(&app, post_json("/predict/balanced", r#"{"text": "bagus"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(imb.calls.load(Ordering::SeqCst), 0);
    assert!(bal.calls.load(Ordering::SeqCst) > 0);
}

#[tokio::test]
async fn wrong_method_is_rejected() {
    let (_dir, app) = app();
    let (status, _) = send_raw(&app, get("/predict")).await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    let (status, _) = send_raw(&app, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn inference_failure_is_server_error() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let cfg = artifacts_config(dir.path());
    let (vectorizer, _) = TfidfVectorizer::load(&cfg.path(&cfg.vectorizer)).unwrap();
    let dim = vectorizer.dimension();
    let (good, _) = sentimen::classifier::load_classifier(&cfg.path(&cfg.imbalanced)).unwrap();
    let broken = Arc::new(BrokenClassifier {
        classes: LABELS.iter().map(|s| s.to_string()).collect(),
        n_features: dim,
    });
    let ctx = ServiceContext::new(Arc::new(vectorizer), good, broken, ArtifactFiles::from(&cfg)).unwrap();
    let app = router(Arc::new(ctx), false);

    let (status, body) = send(&app, post_json("/predict", r#"{"text": "bagus"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["detail"], "Internal Server Error");
    assert!(body.get("imbalanced").is_none());

    let (status, _) = send(&app, post_json("/predict/imbalanced", r#"{"text": "bagus"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, post_json("/predict/balanced", r#"{"text": "bagus"}"#)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}

// --- CORS ---

#[tokio::test]
async fn cors_mirrors_origin_with_credentials() {
    let (_dir, app) = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/predict")
        .header(header::ORIGIN, "http://localhost:5173")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(r#"{"text": "bagus"}"#))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
}

#[tokio::test]
async fn cors_preflight_allows_any_method_and_header() {
    let (_dir, app) = app();
    let request = Request::builder()
        .method(Method::OPTIONS)
        .uri("/predict")
        .header(header::ORIGIN, "https://example.org")
        .header(header::ACCESS_CONTROL_REQUEST_METHOD, "POST")
        .header(header::ACCESS_CONTROL_REQUEST_HEADERS, "content-type,x-custom")
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "https://example.org");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "POST");
    assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_HEADERS], "content-type,x-custom");
}

#[tokio::test]
async fn cors_layer_can_be_disabled() {
    let (_dir, ctx) = loaded_context();
    let app = router(ctx, false);
    let request = Request::builder()
        .uri("/")
        .header(header::ORIGIN, "http://localhost:5173")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

// --- bootstrap ---

#[test]
fn load_fails_without_all_artifacts() {
    for missing in ["tfidf_vectorizer-NEW.json", "nb_model-IMBALANCED.json", "nb_model-BALANCED.json"] {
        let dir = tempfile::tempdir().unwrap();
        write_artifacts(dir.path());
        std::fs::remove_file(dir.path().join(missing)).unwrap();
        let err = ServiceContext::load(&artifacts_config(dir.path())).err().unwrap();
        assert!(err.to_string().contains(missing), "{err}");
    }
}

#[test]
fn load_fails_on_feature_count_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    let narrow = json!({
        "kind": "multinomial_nb",
        "classes": ["negative", "positive"],
        "class_log_prior": [-0.69, -0.69],
        "feature_log_prob": [[-1.0, -1.0], [-1.0, -1.0]],
    });
    std::fs::write(dir.path().join("nb_model-BALANCED.json"), narrow.to_string()).unwrap();
    let err = ServiceContext::load(&artifacts_config(dir.path())).err().unwrap();
    assert!(matches!(err, SentimenError::Shape(_)), "{err}");
}

#[test]
fn load_fails_on_unknown_classifier_kind() {
    let dir = tempfile::tempdir().unwrap();
    write_artifacts(dir.path());
    std::fs::write(
        dir.path().join("nb_model-IMBALANCED.json"),
        r#"{"kind": "random_forest", "classes": ["a"]}"#,
    )
    .unwrap();
    let err = ServiceContext::load(&artifacts_config(dir.path())).err().unwrap();
    assert!(matches!(err, SentimenError::Artifact { .. }), "{err}");
}
