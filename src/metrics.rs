use opentelemetry::KeyValue;
use opentelemetry_otlp::{Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use serde::Deserialize;
use std::time::{Duration, Instant};

#[derive(Debug, Deserialize, Clone)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_transport")]
    pub transport: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            transport: default_transport(),
            endpoint: default_endpoint(),
        }
    }
}

fn default_transport() -> String {
    "http".into()
}

fn default_endpoint() -> String {
    "http://localhost:4318/v1/metrics".into()
}

/// Build and register a global meter provider.
/// For gRPC transport, requires an active tokio runtime context.
pub fn init_meter_provider(config: &MetricsConfig) -> Option<SdkMeterProvider> {
    if !config.enabled {
        return None;
    }

    let resource = Resource::builder_empty()
        .with_attributes([KeyValue::new("service.name", "sentimen")])
        .build();

    let exporter = match config.transport.as_str() {
        "grpc" => opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(&config.endpoint)
            .with_protocol(Protocol::Grpc)
            .with_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| log::warn!("metrics grpc exporter: {e}"))
            .ok()?,
        _ => opentelemetry_otlp::MetricExporter::builder()
            .with_http()
            .with_protocol(Protocol::HttpBinary)
            .with_endpoint(&config.endpoint)
            .with_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| log::warn!("metrics http exporter: {e}"))
            .ok()?,
    };

    let provider = SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(resource)
        .build();

    log::info!("metrics: exporting to {} ({})", config.endpoint, config.transport);
    opentelemetry::global::set_meter_provider(provider.clone());
    Some(provider)
}

/// Count one handled request and its latency. No-op without a provider.
pub fn record_request_metrics(endpoint: &str, status: u16, start: Instant) {
    let meter = opentelemetry::global::meter("sentimen");
    let attrs = [
        KeyValue::new("endpoint", endpoint.to_string()),
        KeyValue::new("status", i64::from(status)),
    ];
    meter
        .u64_counter("sentimen_requests_total")
        .build()
        .add(1, &attrs);
    meter
        .f64_histogram("sentimen_request_duration_seconds")
        .build()
        .record(start.elapsed().as_secs_f64(), &attrs);
}
