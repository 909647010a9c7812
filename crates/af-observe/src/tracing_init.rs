//! Process-wide tracing initialization: an `EnvFilter` defaulting to `info`
//! plus an `fmt` layer, with an optional OpenTelemetry layer when an OTLP
//! endpoint is configured, since every request here carries a trace/span
//! pair that's worth exporting, not just printing.

use crate::config::AppConfig;
use opentelemetry::global;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::Sampler;
use opentelemetry_sdk::Resource;
use thiserror::Error;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum TracingInitError {
    #[error("failed to build OTLP exporter: {0}")]
    Exporter(String),
}

/// Installs the global `tracing` subscriber. Call once, at process start.
///
/// When `config.tracing_endpoint` is set, spans are additionally exported
/// over OTLP/gRPC; otherwise only the stderr `fmt` layer runs.
pub fn init(config: &AppConfig) -> Result<(), TracingInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer().with_target(true);

    match &config.tracing_endpoint {
        Some(endpoint) => {
            let exporter = opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .with_endpoint(endpoint.clone())
                .build()
                .map_err(|e| TracingInitError::Exporter(e.to_string()))?;

            let trace_config = opentelemetry_sdk::trace::Config::default()
                .with_sampler(Sampler::AlwaysOn)
                .with_resource(Resource::new(vec![opentelemetry::KeyValue::new(
                    "service.name",
                    "agentflow-core",
                )]));
            let provider = opentelemetry_sdk::trace::TracerProvider::builder()
                .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                .with_config(trace_config)
                .build();
            let tracer = provider.tracer("agentflow-core");
            global::set_tracer_provider(provider);

            let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt_layer)
                .with(otel_layer)
                .init();
        }
        None => {
            tracing_subscriber::registry().with(env_filter).with(fmt_layer).init();
        }
    }
    Ok(())
}

/// Flushes any buffered spans. Call before process exit when OTLP export is
/// enabled; a no-op otherwise.
pub fn shutdown() {
    global::shutdown_tracer_provider();
}
