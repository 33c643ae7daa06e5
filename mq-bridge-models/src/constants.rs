/// Default configuration file looked up in the working directory when no
/// `--config` path is given.
pub const DEFAULT_CONFIG_FILE_NAME: &str = "mq-bridge.toml";

/// Environment variable prefix for configuration overrides, e.g.
/// `MQBRIDGE__UPSTREAM__BROKER_URL`.
pub const ENV_PREFIX: &str = "MQBRIDGE";
