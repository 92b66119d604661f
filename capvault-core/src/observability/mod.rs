pub mod logging;
pub mod trace_context;

pub use logging::{init_from_settings, init_tracing};
pub use trace_context::{TRACEPARENT_HEADER, TRACESTATE_HEADER, trace_headers};
