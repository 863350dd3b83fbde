use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use super::MagellanConfig;

pub const DEFAULT_CONFIG_PATHS: &[&str] = &["magellan.toml", "config/magellan.toml"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid config at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
    #[error("refusing to overwrite existing {path} (pass --force)")]
    TemplateExists { path: PathBuf },
}

/// 按显式路径或默认查找顺序装载配置；一个候选都不存在时
/// 回退到内置默认值。
pub fn load_config(path: Option<PathBuf>) -> Result<MagellanConfig, ConfigError> {
    let candidates = match path {
        Some(path) => vec![path],
        None => DEFAULT_CONFIG_PATHS.iter().map(PathBuf::from).collect(),
    };

    for candidate in candidates {
        if let Some(config) = try_load_file(&candidate)? {
            info!(target: "config", path = %candidate.display(), "配置装载完成");
            return Ok(config);
        }
    }

    Ok(MagellanConfig::default())
}

fn try_load_file(path: &Path) -> Result<Option<MagellanConfig>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let config: MagellanConfig =
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    config.validate().map_err(|reason| ConfigError::Invalid {
        path: path.to_path_buf(),
        reason,
    })?;

    Ok(Some(config))
}

const CONFIG_TEMPLATE: &str = r#"# magellan 配置模板。所有字段都有默认值，按需取消注释。

[global]
log_level = "info"
# prometheus_listen = "0.0.0.0:9898"

[quote]
# 报价有效期（秒）
ttl_secs = 60
# 单个报价方请求超时（毫秒）
provider_timeout_ms = 4000
# 单轮聚合总预算（毫秒），必须不小于 provider_timeout_ms
aggregate_deadline_ms = 6000

# [chains.ethereum]
# rpc_url = "https://eth.llamarpc.com"
# venues = ["oneinch", "odos", "openocean"]

# [chains.fantom]
# enabled = false

# [venues]
# oneinch_api_key = ""

# [fees.tiers]
# free_bps = 1000
# holder_bps = 800
# staker_bps = 500
# enterprise_bps = 300
"#;

/// 在目标目录写出带注释的配置模板。
pub fn write_template(output: Option<PathBuf>, force: bool) -> Result<PathBuf, ConfigError> {
    let dir = output.unwrap_or_else(|| PathBuf::from("."));
    let path = dir.join("magellan.toml");
    if path.exists() && !force {
        return Err(ConfigError::TemplateExists { path });
    }
    fs::write(&path, CONFIG_TEMPLATE).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_paths_fall_back_to_defaults() {
        let config =
            load_config(Some(PathBuf::from("/nonexistent/magellan.toml"))).expect("defaults");
        assert_eq!(config.quote.ttl_secs, 60);
    }

    #[test]
    fn template_parses_back() {
        let config: MagellanConfig = toml::from_str(CONFIG_TEMPLATE).expect("template parses");
        config.validate().expect("template is valid");
    }
}
