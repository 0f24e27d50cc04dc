//! Log and trace pipeline setup.
//!
//! # Environment variables
//!
//! | Variable | Effect |
//! |---|---|
//! | `RUST_LOG` | Log filter (default `"info"`). |
//! | `STRIDER_LOG_FORMAT=json` | Newline-delimited JSON instead of compact text. |
//! | `OTEL_EXPORTER_OTLP_ENDPOINT` | OTLP/HTTP collector URL; enables span export. |
//!
//! # Example
//!
//! ```rust,no_run
//! use strider_runtime::telemetry::{TelemetryConfig, init_tracing};
//!
//! let _guard = init_tracing(&TelemetryConfig::from_env("strider")).unwrap();
//! ```

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{Resource, trace::SdkTracerProvider};
use thiserror::Error;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("a global tracing subscriber is already installed: {0}")]
    AlreadyInstalled(#[from] TryInitError),
}

/// How the subscriber should be assembled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    pub service_name: String,
    /// Filter directive used when `RUST_LOG` is unset or invalid.
    pub default_filter: String,
    pub json: bool,
    pub otlp_endpoint: Option<String>,
}

impl TelemetryConfig {
    pub fn from_env(service_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            default_filter: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            json: std::env::var("STRIDER_LOG_FORMAT").as_deref() == Ok("json"),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|s| !s.trim().is_empty()),
        }
    }
}

/// Install the global subscriber.
///
/// Hold the returned guard until exit; dropping it flushes exported spans.
pub fn init_tracing(config: &TelemetryConfig) -> Result<TracerProviderGuard, TelemetryError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));
    let provider = config
        .otlp_endpoint
        .as_deref()
        .and_then(|endpoint| build_provider(&config.service_name, endpoint));
    let otel = provider
        .as_ref()
        .map(|p| tracing_opentelemetry::layer().with_tracer(p.tracer("strider")));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel)
        .with(config.json.then(|| fmt::layer().json()))
        .with((!config.json).then(|| fmt::layer().compact()))
        .try_init()?;

    Ok(TracerProviderGuard(provider))
}

/// Shuts the tracer provider down on drop.
pub struct TracerProviderGuard(Option<SdkTracerProvider>);

impl TracerProviderGuard {
    pub fn is_exporting(&self) -> bool {
        self.0.is_some()
    }
}

impl Drop for TracerProviderGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.0.take()
            && let Err(e) = provider.shutdown()
        {
            eprintln!("[strider] OpenTelemetry shutdown error: {e}");
        }
    }
}

/// `None` when the exporter cannot be built; console logging still works.
fn build_provider(service_name: &str, endpoint: &str) -> Option<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint)
        .build()
        .map_err(|e| eprintln!("[strider] OTLP exporter init failed: {e}"))
        .ok()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    // Simple exporter: the control loops run on plain threads, not tokio.
    Some(
        SdkTracerProvider::builder()
            .with_resource(resource)
            .with_simple_exporter(exporter)
            .build(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_without_provider_drops_cleanly() {
        let guard = TracerProviderGuard(None);
        assert!(!guard.is_exporting());
        drop(guard);
    }

    #[test]
    fn second_init_reports_existing_subscriber() {
        let config = TelemetryConfig {
            service_name: "strider-test".into(),
            default_filter: "warn".into(),
            json: false,
            otlp_endpoint: None,
        };
        let _first = init_tracing(&config);
        let second = init_tracing(&config);
        assert!(matches!(second, Err(TelemetryError::AlreadyInstalled(_))));
    }
}
