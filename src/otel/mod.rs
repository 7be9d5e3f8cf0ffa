//! Observability for campaign-sync
//!
//! This module installs the `tracing` subscriber (JSON or pretty output) and,
//! when enabled, exports spans and sync metrics to an OTLP endpoint.

use crate::config::{LoggingConfig, OtelConfig};
use crate::models::SyncSummary;
use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Meter, MeterProvider as _},
    trace::TracerProvider as TracerProviderTrait,
    KeyValue,
};
use opentelemetry_sdk::{metrics::SdkMeterProvider, trace::TracerProvider, Resource};
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// OpenTelemetry error types
#[derive(Debug, Error)]
pub enum OtelError {
    /// Failed to initialize tracer
    #[error("Failed to initialize tracer: {0}")]
    TracerInit(String),

    /// Failed to initialize meter
    #[error("Failed to initialize meter: {0}")]
    MeterInit(String),

    /// Failed to shutdown
    #[error("Failed to shutdown: {0}")]
    Shutdown(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// OpenTelemetry provider for campaign-sync
///
/// Holds the span and metric pipelines for the lifetime of a run. When
/// export is disabled the meter provider has no reader, so instruments
/// created from it record nothing.
pub struct OtelProvider {
    tracer_provider: Option<TracerProvider>,
    meter_provider: SdkMeterProvider,
    config: OtelConfig,
}

impl OtelProvider {
    /// Create a new OtelProvider with the given configuration
    pub fn new(config: &OtelConfig) -> Result<Self, OtelError> {
        let resource = Resource::new(vec![
            KeyValue::new("service.name", config.service_name.clone()),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ]);

        let (tracer_provider, meter_provider) = if config.enabled {
            let endpoint = config.endpoint.as_ref().ok_or_else(|| {
                OtelError::Config("OTLP endpoint is required when enabled".into())
            })?;

            // Initialize tracer provider with OTLP exporter
            let tracer_provider = Self::init_tracer_provider(endpoint, &resource)?;

            // Initialize meter provider with OTLP exporter
            let meter_provider = Self::init_meter_provider(endpoint, &resource)?;

            (Some(tracer_provider), meter_provider)
        } else {
            // Use no-op meter provider when disabled
            let meter_provider = SdkMeterProvider::builder().with_resource(resource).build();
            (None, meter_provider)
        };

        // Set global tracer provider
        if let Some(ref tp) = tracer_provider {
            global::set_tracer_provider(tp.clone());
        }

        Ok(Self {
            tracer_provider,
            meter_provider,
            config: config.clone(),
        })
    }

    /// Initialize the tracer provider with OTLP exporter
    fn init_tracer_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<TracerProvider, OtelError> {
        use opentelemetry_otlp::WithExportConfig;
        use opentelemetry_sdk::runtime;
        use opentelemetry_sdk::trace::{Config, Sampler};

        let exporter = opentelemetry_otlp::new_exporter()
            .tonic()
            .with_endpoint(endpoint)
            .build_span_exporter()
            .map_err(|e| OtelError::TracerInit(e.to_string()))?;

        let trace_config = Config::default()
            .with_sampler(Sampler::AlwaysOn)
            .with_resource(resource.clone());

        let tracer_provider = TracerProvider::builder()
            .with_batch_exporter(exporter, runtime::Tokio)
            .with_config(trace_config)
            .build();

        Ok(tracer_provider)
    }

    /// Initialize the meter provider with OTLP exporter
    fn init_meter_provider(
        endpoint: &str,
        resource: &Resource,
    ) -> Result<SdkMeterProvider, OtelError> {
        use opentelemetry_otlp::{MetricsExporterBuilder, WithExportConfig};
        use opentelemetry_sdk::metrics::reader::{
            DefaultAggregationSelector, DefaultTemporalitySelector,
        };
        use opentelemetry_sdk::{metrics::PeriodicReader, runtime};

        let exporter = MetricsExporterBuilder::from(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .build_metrics_exporter(
            Box::new(DefaultTemporalitySelector::new()),
            Box::new(DefaultAggregationSelector::new()),
        )
        .map_err(|e| OtelError::MeterInit(e.to_string()))?;

        let reader = PeriodicReader::builder(exporter, runtime::Tokio).build();

        let meter_provider = SdkMeterProvider::builder()
            .with_resource(resource.clone())
            .with_reader(reader)
            .build();

        Ok(meter_provider)
    }

    /// Get a tracer from the provider, if span export is enabled
    pub fn tracer(&self, name: &'static str) -> Option<opentelemetry_sdk::trace::Tracer> {
        self.tracer_provider.as_ref().map(|tp| tp.tracer(name))
    }

    /// Get the meter for creating metrics
    pub fn meter(&self) -> Meter {
        self.meter_provider.meter(self.config.service_name.clone())
    }

    /// Check if OpenTelemetry is enabled
    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Shutdown the OpenTelemetry providers gracefully
    pub fn shutdown(&self) -> Result<(), OtelError> {
        // Shutdown meter provider
        if let Err(e) = self.meter_provider.shutdown() {
            return Err(OtelError::Shutdown(format!(
                "Meter shutdown failed: {:?}",
                e
            )));
        }

        // Force flush any remaining spans
        if let Some(ref tp) = self.tracer_provider {
            for result in tp.force_flush() {
                if let Err(e) = result {
                    return Err(OtelError::Shutdown(format!("Tracer flush failed: {:?}", e)));
                }
            }
        }

        Ok(())
    }
}

impl Drop for OtelProvider {
    fn drop(&mut self) {
        // Best-effort shutdown on drop
        let _ = self.shutdown();
    }
}

/// Sync engine metrics
///
/// Instruments for remote calls, retries, and per-record outcomes. Attached
/// to the transport and orchestrator; recording is a no-op when export is
/// disabled.
pub struct SyncMetrics {
    /// Logical API calls by endpoint and final outcome
    pub requests_total: Counter<u64>,

    /// Retries by endpoint and reason (`transient` or `rate_limited`)
    pub retries_total: Counter<u64>,

    /// Records by outcome (`succeeded`, `failed`, `skipped`)
    pub records_total: Counter<u64>,

    /// Sync runs by result (`healthy`, `degraded`, `failed`)
    pub runs_total: Counter<u64>,

    /// Wall-clock duration of a logical call including retries
    pub request_duration: Histogram<f64>,
}

impl SyncMetrics {
    /// Create new metrics with the given meter
    pub fn new(meter: &Meter) -> Self {
        let requests_total = meter
            .u64_counter("campaign_sync_requests_total")
            .with_description("Total number of remote API calls")
            .init();

        let retries_total = meter
            .u64_counter("campaign_sync_retries_total")
            .with_description("Total number of retried remote API attempts")
            .init();

        let records_total = meter
            .u64_counter("campaign_sync_records_total")
            .with_description("Total number of records processed")
            .init();

        let runs_total = meter
            .u64_counter("campaign_sync_runs_total")
            .with_description("Total number of sync runs")
            .init();

        let request_duration = meter
            .f64_histogram("campaign_sync_request_duration_seconds")
            .with_description("Remote API call duration in seconds, including retries")
            .init();

        Self {
            requests_total,
            retries_total,
            records_total,
            runs_total,
            request_duration,
        }
    }

    /// Record the final outcome of a logical call
    pub fn record_request(&self, endpoint: &str, outcome: &str, elapsed: Duration) {
        self.requests_total.add(
            1,
            &[
                KeyValue::new("endpoint", endpoint.to_string()),
                KeyValue::new("outcome", outcome.to_string()),
            ],
        );
        self.request_duration.record(
            elapsed.as_secs_f64(),
            &[KeyValue::new("endpoint", endpoint.to_string())],
        );
    }

    /// Record one retry
    pub fn record_retry(&self, endpoint: &str, reason: &str) {
        self.retries_total.add(
            1,
            &[
                KeyValue::new("endpoint", endpoint.to_string()),
                KeyValue::new("reason", reason.to_string()),
            ],
        );
    }

    /// Record the record counts of a finished run
    pub fn record_summary(&self, summary: &SyncSummary) {
        for (outcome, count) in [
            ("succeeded", summary.succeeded),
            ("failed", summary.failed),
            ("skipped", summary.skipped),
        ] {
            if count > 0 {
                self.records_total.add(
                    u64::try_from(count).unwrap_or(u64::MAX),
                    &[KeyValue::new("outcome", outcome)],
                );
            }
        }
        let result = if summary.is_healthy() {
            "healthy"
        } else {
            "degraded"
        };
        self.record_run(result);
    }

    /// Record a run result
    pub fn record_run(&self, result: &str) {
        self.runs_total
            .add(1, &[KeyValue::new("result", result.to_string())]);
    }
}

impl std::fmt::Debug for SyncMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncMetrics").finish_non_exhaustive()
    }
}

/// Initialize the tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured level. Output is JSON
/// unless `logging.format` is `pretty`. Spans are exported when the provider
/// has OTLP enabled.
pub fn init_tracing(otel: &OtelProvider, logging: &LoggingConfig) -> Result<(), OtelError> {
    let level = match logging.level.to_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" | "warning" => "warn",
        "error" => "error",
        _ => "info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let pretty = logging.format.eq_ignore_ascii_case("pretty");
    let json_layer = (!pretty).then(|| tracing_subscriber::fmt::layer().json());
    let pretty_layer = pretty.then(|| tracing_subscriber::fmt::layer().pretty());
    let otel_layer = otel
        .tracer("campaign-sync")
        .map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));

    tracing_subscriber::registry()
        .with(filter)
        .with(otel_layer)
        .with(json_layer)
        .with(pretty_layer)
        .try_init()
        .map_err(|e| OtelError::TracerInit(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FailureKind, RecordFailure, SyncOutcome};

    fn disabled_config() -> OtelConfig {
        OtelConfig {
            enabled: false,
            endpoint: None,
            service_name: "test-service".to_string(),
        }
    }

    // Test 1: OtelProvider initialization with disabled config
    #[test]
    fn test_otel_provider_disabled() {
        let provider = OtelProvider::new(&disabled_config()).unwrap();

        assert!(!provider.is_enabled());
        assert!(provider.tracer_provider.is_none());
        assert!(provider.tracer("test").is_none());
    }

    // Test 2: OtelProvider requires endpoint when enabled
    #[test]
    fn test_otel_provider_requires_endpoint_when_enabled() {
        let config = OtelConfig {
            enabled: true,
            endpoint: None,
            service_name: "test-service".to_string(),
        };

        match OtelProvider::new(&config) {
            Err(OtelError::Config(msg)) => {
                assert!(msg.contains("endpoint is required"));
            }
            _ => panic!("Expected OtelError::Config"),
        }
    }

    // Test 3: Sync metrics record without an exporter
    #[test]
    fn test_sync_metrics_record() {
        let provider = OtelProvider::new(&disabled_config()).unwrap();
        let metrics = SyncMetrics::new(&provider.meter());

        // Should not panic
        metrics.record_request("list_campaigns", "success", Duration::from_millis(40));
        metrics.record_request("sync_campaign", "timeout", Duration::from_secs(30));
        metrics.record_retry("list_campaigns", "transient");
        metrics.record_retry("sync_campaign", "rate_limited");
        metrics.record_run("failed");
    }

    // Test 4: Summary counts are recorded per outcome
    #[test]
    fn test_sync_metrics_record_summary() {
        let provider = OtelProvider::new(&OtelConfig::default()).unwrap();
        let metrics = SyncMetrics::new(&provider.meter());

        let outcomes = vec![
            SyncOutcome::succeeded("a"),
            SyncOutcome::failed("b", RecordFailure::new(FailureKind::Timeout, "slow")),
        ];
        metrics.record_summary(&SyncSummary::from_outcomes(&outcomes, 1));
    }

    // Test 5: Provider shutdown
    #[test]
    fn test_otel_provider_shutdown() {
        let provider = OtelProvider::new(&disabled_config()).unwrap();
        assert!(provider.shutdown().is_ok());
    }

    // Test 6: OtelError display
    #[test]
    fn test_otel_error_display() {
        let err = OtelError::Config("test error".to_string());
        assert_eq!(err.to_string(), "Configuration error: test error");

        let err = OtelError::TracerInit("tracer error".to_string());
        assert_eq!(err.to_string(), "Failed to initialize tracer: tracer error");

        let err = OtelError::Shutdown("shutdown error".to_string());
        assert_eq!(err.to_string(), "Failed to shutdown: shutdown error");
    }

    // Test 7: Default OtelConfig
    #[test]
    fn test_default_otel_config() {
        let config = OtelConfig::default();

        assert!(!config.enabled);
        assert!(config.endpoint.is_none());
        assert_eq!(config.service_name, "campaign-sync");
    }
}
