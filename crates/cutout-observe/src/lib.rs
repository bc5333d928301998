//! Observability for Cutout: subscriber installation and the optional
//! OpenTelemetry span bridge.

pub mod tracing_setup;
