//! 配置模块：TOML 装载、默认值与校验。

pub mod loader;
pub mod types;

pub use loader::{ConfigError, DEFAULT_CONFIG_PATHS, load_config, write_template};
pub use types::{
    ChainSettings, FeesConfig, GlobalConfig, MagellanConfig, QuoteSettings, VenueEndpoints,
};

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}

pub(crate) fn default_quote_ttl_secs() -> u64 {
    60
}

pub(crate) fn default_provider_timeout_ms() -> u64 {
    4_000
}

pub(crate) fn default_aggregate_deadline_ms() -> u64 {
    6_000
}

pub(crate) fn default_confirm_poll_interval_ms() -> u64 {
    2_000
}

pub(crate) fn default_confirm_poll_attempts() -> u32 {
    150
}

pub(crate) fn default_rpc_timeout_ms() -> u64 {
    10_000
}
