//! Logging, tracing and metrics setup.
//!
//! Console logging through `tracing-subscriber` is always on and filtered by
//! `RUST_LOG`. With the `telemetry` feature and any `OTEL_EXPORTER_OTLP_*`
//! variable set, spans and metrics are also exported over OTLP.

use std::time::Duration;

use axum::http::{Request, Response};
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultOnRequest, MakeSpan, OnResponse, TraceLayer};
use tracing::Span;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "telemetry")]
mod otlp {
    use std::env;
    use std::time::Duration;

    use opentelemetry::{KeyValue, global};
    use opentelemetry_sdk::Resource;
    use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider, Temporality};
    use opentelemetry_sdk::trace::{RandomIdGenerator, Sampler, SdkTracerProvider};
    use opentelemetry_semantic_conventions::SCHEMA_URL;
    use opentelemetry_semantic_conventions::attribute::{
        DEPLOYMENT_ENVIRONMENT_NAME, SERVICE_VERSION,
    };

    /// OTLP transport selected by `OTEL_EXPORTER_OTLP_PROTOCOL`.
    #[derive(Debug, Clone, Copy)]
    pub(super) enum Protocol {
        Http,
        Grpc,
    }

    impl Protocol {
        /// `None` unless at least one OTLP variable is set.
        pub(super) fn from_env() -> Option<Self> {
            let configured = [
                "OTEL_EXPORTER_OTLP_ENDPOINT",
                "OTEL_EXPORTER_OTLP_HEADERS",
                "OTEL_EXPORTER_OTLP_PROTOCOL",
            ]
            .iter()
            .any(|key| env::var(key).is_ok());
            configured.then(|| match env::var("OTEL_EXPORTER_OTLP_PROTOCOL").as_deref() {
                Ok("grpc") => Self::Grpc,
                _ => Self::Http,
            })
        }
    }

    fn env_or(key: &str, fallback: &str) -> String {
        env::var(key)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| fallback.to_owned())
    }

    pub(super) fn resource(name: &str, version: &str) -> Resource {
        let mut attributes = vec![KeyValue::new(
            SERVICE_VERSION,
            env_or("OTEL_SERVICE_VERSION", version),
        )];
        if let Ok(deployment) = env::var("OTEL_SERVICE_DEPLOYMENT") {
            attributes.push(KeyValue::new(DEPLOYMENT_ENVIRONMENT_NAME, deployment));
        }
        Resource::builder()
            .with_service_name(env_or("OTEL_SERVICE_NAME", name))
            .with_schema_url(attributes, SCHEMA_URL)
            .build()
    }

    pub(super) fn tracer_provider(protocol: Protocol, resource: Resource) -> Option<SdkTracerProvider> {
        let exporter = match protocol {
            Protocol::Http => opentelemetry_otlp::SpanExporter::builder()
                .with_http()
                .build(),
            Protocol::Grpc => opentelemetry_otlp::SpanExporter::builder()
                .with_tonic()
                .build(),
        }
        .inspect_err(|e| tracing::warn!(error = %e, "OTLP span exporter unavailable"))
        .ok()?;

        Some(
            SdkTracerProvider::builder()
                .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
                .with_id_generator(RandomIdGenerator::default())
                .with_resource(resource)
                .with_batch_exporter(exporter)
                .build(),
        )
    }

    pub(super) fn meter_provider(protocol: Protocol, resource: Resource) -> Option<SdkMeterProvider> {
        let exporter = match protocol {
            Protocol::Http => opentelemetry_otlp::MetricExporter::builder()
                .with_http()
                .with_temporality(Temporality::default())
                .build(),
            Protocol::Grpc => opentelemetry_otlp::MetricExporter::builder()
                .with_tonic()
                .with_temporality(Temporality::default())
                .build(),
        }
        .inspect_err(|e| tracing::warn!(error = %e, "OTLP metric exporter unavailable"))
        .ok()?;

        let reader = PeriodicReader::builder(exporter)
            .with_interval(Duration::from_secs(30))
            .build();
        let stdout_reader =
            PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default()).build();
        let provider = SdkMeterProvider::builder()
            .with_resource(resource)
            .with_reader(reader)
            .with_reader(stdout_reader)
            .build();
        global::set_meter_provider(provider.clone());
        Some(provider)
    }
}

/// Service identity and log filter used to initialise telemetry.
#[derive(Debug, Clone)]
pub struct Telemetry {
    name: &'static str,
    version: &'static str,
    log_level: Option<String>,
}

impl Telemetry {
    /// Telemetry for the named service.
    #[must_use]
    pub const fn new(name: &'static str, version: &'static str) -> Self {
        Self {
            name,
            version,
            log_level: None,
        }
    }

    /// Filter directive used when `RUST_LOG` is not set (default `info`).
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = Some(level.into());
        self
    }

    fn filter(&self) -> EnvFilter {
        let fallback = self.log_level.as_deref().unwrap_or("info");
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback))
    }

    /// Installs the global subscriber.
    ///
    /// Must be called once per process. The returned guard flushes exporters
    /// when dropped.
    #[must_use]
    pub fn register(self) -> TelemetryGuard {
        #[cfg(feature = "telemetry")]
        {
            use opentelemetry::trace::TracerProvider;
            use tracing_opentelemetry::{MetricsLayer, OpenTelemetryLayer};

            let protocol = otlp::Protocol::from_env();
            let resource = otlp::resource(self.name, self.version);
            let tracer_provider =
                protocol.and_then(|p| otlp::tracer_provider(p, resource.clone()));
            let meter_provider = protocol.and_then(|p| otlp::meter_provider(p, resource));

            tracing_subscriber::registry()
                .with(self.filter())
                .with(tracing_subscriber::fmt::layer())
                .with(meter_provider.clone().map(MetricsLayer::new))
                .with(
                    tracer_provider
                        .as_ref()
                        .map(|tp| OpenTelemetryLayer::new(tp.tracer(self.name))),
                )
                .init();

            match protocol {
                Some(protocol) => tracing::info!(?protocol, "OpenTelemetry export enabled"),
                None => tracing::info!("OpenTelemetry not configured, console logging only"),
            }
            TelemetryGuard {
                tracer_provider,
                meter_provider,
            }
        }

        #[cfg(not(feature = "telemetry"))]
        {
            tracing_subscriber::registry()
                .with(self.filter())
                .with(tracing_subscriber::fmt::layer())
                .init();
            TelemetryGuard {}
        }
    }
}

/// Flushes and shuts down exporters on drop.
#[derive(Debug)]
pub struct TelemetryGuard {
    #[cfg(feature = "telemetry")]
    tracer_provider: Option<opentelemetry_sdk::trace::SdkTracerProvider>,
    #[cfg(feature = "telemetry")]
    meter_provider: Option<opentelemetry_sdk::metrics::SdkMeterProvider>,
}

#[cfg(feature = "telemetry")]
impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(tp) = &self.tracer_provider
            && let Err(err) = tp.shutdown()
        {
            tracing::error!(?err, "tracer provider shutdown error");
        }
        if let Some(mp) = &self.meter_provider
            && let Err(err) = mp.shutdown()
        {
            tracing::error!(?err, "meter provider shutdown error");
        }
    }
}

/// `tower-http` trace layer type produced by [`TelemetryGuard::http_tracing`].
pub type HttpTraceLayer = TraceLayer<
    SharedClassifier<ServerErrorsAsFailures>,
    HttpMakeSpan,
    DefaultOnRequest,
    HttpOnResponse,
>;

impl TelemetryGuard {
    /// HTTP request tracing for the axum router.
    #[must_use]
    #[allow(clippy::unused_self)]
    pub fn http_tracing(&self) -> HttpTraceLayer {
        TraceLayer::new_for_http()
            .make_span_with(HttpMakeSpan)
            .on_response(HttpOnResponse)
    }
}

/// One span per HTTP request.
#[derive(Clone, Copy, Debug)]
pub struct HttpMakeSpan;

impl<B> MakeSpan<B> for HttpMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "http_request",
            otel.kind = "server",
            otel.name = %format!("{} {}", request.method(), request.uri().path()),
            method = %request.method(),
            path = %request.uri().path(),
            status = tracing::field::Empty,
        )
    }
}

/// Records status and latency of each response.
#[derive(Clone, Copy, Debug)]
pub struct HttpOnResponse;

impl<B> OnResponse<B> for HttpOnResponse {
    fn on_response(self, response: &Response<B>, latency: Duration, span: &Span) {
        let status = response.status();
        span.record("status", status.as_u16());

        #[cfg(feature = "telemetry")]
        {
            use opentelemetry::trace::Status;
            use tracing_opentelemetry::OpenTelemetrySpanExt;

            if status.is_server_error() {
                span.set_status(Status::error(
                    status.canonical_reason().unwrap_or("unknown").to_owned(),
                ));
            } else {
                span.set_status(Status::Ok);
            }
        }

        tracing::info!(
            status = status.as_u16(),
            elapsed_ms = latency.as_millis(),
            "request finished"
        );
    }
}
