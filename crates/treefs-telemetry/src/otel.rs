//! OTel internals: tracing layer and sampling.

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::{ExporterBuildError, SpanExporter};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracer, SdkTracerProvider, ShouldSample, SpanLimits};
use tracing_opentelemetry::OpenTelemetryLayer;

use crate::sample_rate;

/// Shuts down the tracer provider on drop, flushing pending spans.
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("OTel shutdown error: {e}");
        }
    }
}

/// Build an OpenTelemetry tracing layer and guard.
///
/// Must be called inside a Tokio runtime; the batch exporter spawns onto
/// it. Hold the guard for the lifetime of the process.
pub fn otel_layer<S>(
    service_name: &str,
) -> Result<(OpenTelemetryLayer<S, SdkTracer>, OtelGuard), ExporterBuildError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    let exporter = SpanExporter::builder().with_tonic().build()?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(TreefsSampler)
        .with_resource(resource)
        .with_span_limits(SpanLimits::default())
        .build();

    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer("treefs");
    let layer = tracing_opentelemetry::layer().with_tracer(tracer);

    Ok((layer, OtelGuard { provider }))
}

/// Sampler with per-operation rates from [`sample_rate`].
///
/// Children of sampled parents and spans marked as errors are always kept.
#[derive(Debug, Clone)]
struct TreefsSampler;

impl ShouldSample for TreefsSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        if let Some(cx) = parent_context {
            let parent_span = cx.span();
            let parent_ctx = parent_span.span_context();
            if parent_ctx.is_sampled() {
                return SamplingResult {
                    decision: SamplingDecision::RecordAndSample,
                    attributes: vec![],
                    trace_state: parent_ctx.trace_state().clone(),
                };
            }
        }

        let is_error = attributes.iter().any(|kv| {
            (kv.key.as_str() == "otel.status_code" && kv.value.as_str() == "ERROR")
                || (kv.key.as_str() == "error" && kv.value.as_str() == "true")
        });
        if is_error {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: vec![],
                trace_state: TraceState::default(),
            };
        }

        Sampler::TraceIdRatioBased(sample_rate(name)).should_sample(
            parent_context,
            trace_id,
            name,
            span_kind,
            attributes,
            links,
        )
    }
}
