//! OpenTelemetry integration for treefs.
//!
//! With the `telemetry` feature, provides an OTel tracing layer with a
//! sampler that keeps every namespace mutation and thins out the
//! high-volume byte traffic.
//!
//! # Activation
//!
//! Export activates when standard OTel environment variables are set:
//!
//! ```bash
//! OTEL_EXPORTER_OTLP_ENDPOINT=http://localhost:4317 cargo run -p treefs-server -- --config cluster.ron
//! ```
//!
//! Set `OTEL_SDK_DISABLED=true` to disable even when the endpoint is set.

#[cfg(feature = "telemetry")]
mod otel;

#[cfg(feature = "telemetry")]
pub use otel::{OtelGuard, otel_layer};

/// Check whether OTel export should be enabled.
///
/// True when `OTEL_SDK_DISABLED` is not `"true"` and either
/// `OTEL_EXPORTER_OTLP_ENDPOINT` is set or `OTEL_TRACES_EXPORTER` is set to
/// something other than `"none"`.
pub fn otel_enabled() -> bool {
    let var = |name: &str| std::env::var(name).ok();
    enabled_from(
        var("OTEL_SDK_DISABLED").as_deref(),
        var("OTEL_EXPORTER_OTLP_ENDPOINT").as_deref(),
        var("OTEL_TRACES_EXPORTER").as_deref(),
    )
}

fn enabled_from(disabled: Option<&str>, endpoint: Option<&str>, exporter: Option<&str>) -> bool {
    if disabled.is_some_and(|v| v.eq_ignore_ascii_case("true")) {
        return false;
    }
    if endpoint.is_some() {
        return true;
    }
    exporter.is_some_and(|e| !e.eq_ignore_ascii_case("none"))
}

/// Sampling rate for a span, by name prefix.
///
/// | Span                                  | Rate |
/// |---------------------------------------|------|
/// | `naming.register`, `storage.start`    | 100% |
/// | `naming.create_*`, `naming.delete`    | 100% |
/// | `naming.replicate`, `storage.copy`    | 100% |
/// | `storage.create`, `storage.delete`    | 100% |
/// | other `naming.*`                      | 10%  |
/// | `storage.read/write/size`             | 1%   |
/// | anything else                         | 10%  |
pub fn sample_rate(name: &str) -> f64 {
    const ALWAYS: &[&str] = &[
        "naming.register",
        "naming.create_",
        "naming.delete",
        "naming.replicate",
        "storage.start",
        "storage.copy",
        "storage.create",
        "storage.delete",
    ];

    if ALWAYS.iter().any(|prefix| name.starts_with(prefix)) {
        1.0
    } else if name.starts_with("storage.") {
        0.01
    } else {
        0.1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_from_env() {
        assert!(!enabled_from(None, None, None));
        assert!(enabled_from(None, Some("http://localhost:4317"), None));
        assert!(!enabled_from(Some("TRUE"), Some("http://localhost:4317"), None));
        assert!(enabled_from(Some("false"), None, Some("otlp")));
        assert!(!enabled_from(None, None, Some("none")));
    }

    #[test]
    fn test_sample_rates() {
        assert_eq!(sample_rate("naming.create_file"), 1.0);
        assert_eq!(sample_rate("naming.delete"), 1.0);
        assert_eq!(sample_rate("storage.copy"), 1.0);
        assert_eq!(sample_rate("naming.lock"), 0.1);
        assert_eq!(sample_rate("storage.read"), 0.01);
        assert_eq!(sample_rate("cluster.boot"), 0.1);
    }
}
