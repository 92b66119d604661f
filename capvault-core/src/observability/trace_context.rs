//! Outgoing W3C trace context (`traceparent` / `tracestate`) for calls to AC
//! and storage servers, so server-side spans join the client's trace.

use opentelemetry::trace::TraceContextExt;
use reqwest::header::{HeaderMap, HeaderValue};
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";

/// Headers for the current span, empty unless it carries a valid
/// OpenTelemetry span context (no OTLP layer installed means no headers).
pub fn trace_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();

    let cx = Span::current().context();
    let span = cx.span();
    let sc = span.span_context();
    if !sc.is_valid() {
        return headers;
    }

    let traceparent = format!(
        "00-{}-{}-{:02x}",
        sc.trace_id(),
        sc.span_id(),
        sc.trace_flags().to_u8()
    );
    if let Ok(value) = HeaderValue::from_str(&traceparent) {
        headers.insert(TRACEPARENT_HEADER, value);
    }

    let tracestate = sc.trace_state().header();
    if !tracestate.is_empty()
        && let Ok(value) = HeaderValue::from_str(&tracestate)
    {
        headers.insert(TRACESTATE_HEADER, value);
    }

    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::TracerProvider as _;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_no_span_yields_no_headers() {
        assert!(trace_headers().is_empty());
    }

    #[test]
    fn test_sampled_span_yields_traceparent() {
        let provider = opentelemetry_sdk::trace::TracerProvider::builder().build();
        let tracer = provider.tracer("capvault-test");
        let subscriber =
            tracing_subscriber::registry().with(tracing_opentelemetry::layer().with_tracer(tracer));

        tracing::subscriber::with_default(subscriber, || {
            let span = tracing::info_span!("fetch_secret");
            let _guard = span.enter();

            let headers = trace_headers();
            let traceparent = headers
                .get(TRACEPARENT_HEADER)
                .and_then(|v| v.to_str().ok())
                .unwrap();

            let parts: Vec<&str> = traceparent.split('-').collect();
            assert_eq!(parts.len(), 4);
            assert_eq!(parts[0], "00");
            assert_eq!(parts[1].len(), 32);
            assert_eq!(parts[2].len(), 16);
            assert_eq!(parts[3], "01");
        });
    }
}
