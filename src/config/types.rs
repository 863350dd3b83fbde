use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use super::{
    default_aggregate_deadline_ms, default_confirm_poll_attempts, default_confirm_poll_interval_ms,
    default_log_level, default_provider_timeout_ms, default_quote_ttl_secs, default_rpc_timeout_ms,
    default_true,
};
use crate::chain::ChainId;
use crate::fees::{ReferralSchedule, TierSchedule};
use crate::providers::VenueId;

/// 顶层配置。所有小节都有可用默认值，空文件即可启动。
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MagellanConfig {
    pub global: GlobalConfig,
    pub quote: QuoteSettings,
    /// 以链名为键的覆盖项；未出现的链使用内置默认。
    pub chains: BTreeMap<String, ChainSettings>,
    pub fees: FeesConfig,
    pub venues: VenueEndpoints,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub timezone_offset_hours: i8,
    /// 留空则不启动 Prometheus 导出。
    #[serde(default)]
    pub prometheus_listen: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            timezone_offset_hours: 0,
            prometheus_listen: String::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QuoteSettings {
    /// 报价固定有效期（秒）。
    #[serde(default = "default_quote_ttl_secs")]
    pub ttl_secs: u64,
    /// 单个报价方的请求超时。
    #[serde(default = "default_provider_timeout_ms")]
    pub provider_timeout_ms: u64,
    /// 单轮聚合的总时间预算，应当大于单个报价方的超时。
    #[serde(default = "default_aggregate_deadline_ms")]
    pub aggregate_deadline_ms: u64,
    /// 等待确认的轮询间隔与次数上限。
    #[serde(default = "default_confirm_poll_interval_ms")]
    pub confirm_poll_interval_ms: u64,
    #[serde(default = "default_confirm_poll_attempts")]
    pub confirm_poll_attempts: u32,
    /// 链节点 RPC 调用超时。
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            ttl_secs: default_quote_ttl_secs(),
            provider_timeout_ms: default_provider_timeout_ms(),
            aggregate_deadline_ms: default_aggregate_deadline_ms(),
            confirm_poll_interval_ms: default_confirm_poll_interval_ms(),
            confirm_poll_attempts: default_confirm_poll_attempts(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

impl QuoteSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn aggregate_deadline(&self) -> Duration {
        Duration::from_millis(self.aggregate_deadline_ms)
    }

    pub fn confirm_poll_interval(&self) -> Duration {
        Duration::from_millis(self.confirm_poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// 覆盖内置的公共 RPC 端点。
    #[serde(default)]
    pub rpc_url: Option<String>,
    /// 覆盖默认启用的报价方集合（按注册顺序排列）。
    #[serde(default)]
    pub venues: Option<Vec<String>>,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            rpc_url: None,
            venues: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeesConfig {
    pub tiers: TierSchedule,
    pub referrals: ReferralSchedule,
}

/// 各报价方的端点与凭证覆盖项。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VenueEndpoints {
    pub oneinch_base_url: String,
    #[serde(default)]
    pub oneinch_api_key: Option<String>,
    pub odos_base_url: String,
    pub openocean_base_url: String,
    pub jupiter_base_url: String,
    pub dflow_base_url: String,
    pub cetus_base_url: String,
    pub utxoswap_base_url: String,
}

impl Default for VenueEndpoints {
    fn default() -> Self {
        Self {
            oneinch_base_url: crate::providers::oneinch::DEFAULT_BASE_URL.to_string(),
            oneinch_api_key: None,
            odos_base_url: crate::providers::odos::DEFAULT_BASE_URL.to_string(),
            openocean_base_url: crate::providers::openocean::DEFAULT_BASE_URL.to_string(),
            jupiter_base_url: crate::providers::jupiter::DEFAULT_BASE_URL.to_string(),
            dflow_base_url: crate::providers::dflow::DEFAULT_BASE_URL.to_string(),
            cetus_base_url: crate::providers::cetus::DEFAULT_BASE_URL.to_string(),
            utxoswap_base_url: crate::providers::utxoswap::DEFAULT_BASE_URL.to_string(),
        }
    }
}

impl MagellanConfig {
    pub fn chain_settings(&self, chain: ChainId) -> ChainSettings {
        self.chains.get(chain.as_str()).cloned().unwrap_or_default()
    }

    /// 启用的链集合：内置全链，配置可逐条关闭。
    pub fn enabled_chains(&self) -> Vec<ChainId> {
        ChainId::ALL
            .iter()
            .copied()
            .filter(|chain| self.chain_settings(*chain).enabled)
            .collect()
    }

    /// 某链实际启用的报价方，保持配置给出的顺序；
    /// 不属于该链的 venue 会被过滤并告警。
    pub fn venues_for(&self, chain: ChainId) -> Vec<VenueId> {
        let defaults = VenueId::defaults_for(chain);
        match self.chain_settings(chain).venues {
            None => defaults.to_vec(),
            Some(names) => names
                .iter()
                .filter_map(|name| match name.parse::<VenueId>() {
                    Ok(venue) if defaults.contains(&venue) => Some(venue),
                    Ok(venue) => {
                        tracing::warn!(
                            target: "config",
                            %chain,
                            %venue,
                            "该报价方不服务此链，忽略"
                        );
                        None
                    }
                    Err(err) => {
                        tracing::warn!(target: "config", %chain, error = %err, "无法识别的报价方，忽略");
                        None
                    }
                })
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.quote.ttl_secs == 0 {
            return Err("quote.ttl_secs must be positive".to_string());
        }
        if self.quote.provider_timeout_ms == 0 || self.quote.aggregate_deadline_ms == 0 {
            return Err("quote timeouts must be positive".to_string());
        }
        if self.quote.aggregate_deadline_ms < self.quote.provider_timeout_ms {
            return Err(
                "quote.aggregate_deadline_ms must enclose provider_timeout_ms".to_string(),
            );
        }
        for name in self.chains.keys() {
            name.parse::<ChainId>()
                .map_err(|err| format!("[chains.{name}]: {err}"))?;
        }
        self.fees.tiers.validate()?;
        self.fees.referrals.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config: MagellanConfig = toml::from_str("").expect("parse empty toml");
        config.validate().expect("valid defaults");
        assert_eq!(config.quote.ttl_secs, 60);
        assert_eq!(config.enabled_chains().len(), ChainId::ALL.len());
        assert_eq!(
            config.venues_for(ChainId::Ethereum),
            vec![VenueId::OneInch, VenueId::Odos, VenueId::OpenOcean]
        );
    }

    #[test]
    fn chain_can_be_disabled() {
        let config: MagellanConfig = toml::from_str(
            "[chains.fantom]\nenabled = false\n",
        )
        .expect("parse toml");
        config.validate().expect("valid");
        assert!(!config.enabled_chains().contains(&ChainId::Fantom));
        assert!(config.enabled_chains().contains(&ChainId::Ethereum));
    }

    #[test]
    fn venue_override_keeps_order_and_filters_foreign() {
        let config: MagellanConfig = toml::from_str(
            "[chains.ethereum]\nvenues = [\"odos\", \"1inch\", \"jupiter\"]\n",
        )
        .expect("parse toml");
        assert_eq!(
            config.venues_for(ChainId::Ethereum),
            vec![VenueId::Odos, VenueId::OneInch]
        );
    }

    #[test]
    fn unknown_chain_key_is_rejected() {
        let config: MagellanConfig =
            toml::from_str("[chains.near]\nenabled = true\n").expect("parse toml");
        assert!(config.validate().is_err());
    }

    #[test]
    fn deadline_must_enclose_provider_timeout() {
        let config: MagellanConfig = toml::from_str(
            "[quote]\nprovider_timeout_ms = 5000\naggregate_deadline_ms = 1000\n",
        )
        .expect("parse toml");
        assert!(config.validate().is_err());
    }

    #[test]
    fn fee_tables_are_overridable() {
        let config: MagellanConfig = toml::from_str(
            "[fees.tiers]\nfree_bps = 900\nholder_bps = 700\n",
        )
        .expect("parse toml");
        config.validate().expect("valid");
        assert_eq!(config.fees.tiers.free_bps, 900);
        assert_eq!(config.fees.tiers.holder_bps, 700);
        // 未覆盖的档位保持默认
        assert_eq!(config.fees.tiers.staker_bps, 500);
    }
}
