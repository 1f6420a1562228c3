//! Daemon constants.

/// Config file read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "treefs.ron";

/// Service name reported to OpenTelemetry.
pub const SERVICE_NAME: &str = "treefs-server";
