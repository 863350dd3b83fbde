//! 各外部报价来源（DEX 聚合器 / 路由服务）的客户端。
//!
//! 所有报价方实现统一的 [`QuoteProvider`] 契约：超时、无流动性、
//! 上游故障与响应异常一律折叠为“无报价”，调用方可以统一处理缺席。

pub mod cetus;
pub mod dflow;
pub mod jupiter;
pub mod odos;
pub mod oneinch;
pub mod openocean;
pub mod serde_helpers;
pub mod utxoswap;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use metrics::counter;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::chain::ChainId;
use crate::engine::types::{NormalizedQuote, SwapRequest};
use crate::monitoring::prometheus_enabled;

pub use cetus::CetusProvider;
pub use dflow::DflowProvider;
pub use jupiter::JupiterProvider;
pub use odos::OdosProvider;
pub use oneinch::OneInchProvider;
pub use openocean::OpenOceanProvider;
pub use utxoswap::UtxoSwapProvider;

/// 报价来源身份，随每条报价一起返回以便追溯来源。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VenueId {
    #[serde(rename = "oneinch")]
    OneInch,
    Odos,
    #[serde(rename = "openocean")]
    OpenOcean,
    Jupiter,
    Dflow,
    Cetus,
    #[serde(rename = "utxoswap")]
    UtxoSwap,
}

impl VenueId {
    pub fn as_str(&self) -> &'static str {
        match self {
            VenueId::OneInch => "oneinch",
            VenueId::Odos => "odos",
            VenueId::OpenOcean => "openocean",
            VenueId::Jupiter => "jupiter",
            VenueId::Dflow => "dflow",
            VenueId::Cetus => "cetus",
            VenueId::UtxoSwap => "utxoswap",
        }
    }

    /// 各链默认启用的报价方，顺序即注册顺序（平局时靠前者胜出）。
    pub fn defaults_for(chain: ChainId) -> &'static [VenueId] {
        match chain.kind() {
            crate::chain::ChainKind::Evm => {
                &[VenueId::OneInch, VenueId::Odos, VenueId::OpenOcean]
            }
            crate::chain::ChainKind::Solana => &[VenueId::Jupiter, VenueId::Dflow],
            crate::chain::ChainKind::Sui => &[VenueId::Cetus],
            crate::chain::ChainKind::Ckb => &[VenueId::UtxoSwap],
        }
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VenueId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "oneinch" | "1inch" => Ok(VenueId::OneInch),
            "odos" => Ok(VenueId::Odos),
            "openocean" => Ok(VenueId::OpenOcean),
            "jupiter" => Ok(VenueId::Jupiter),
            "dflow" => Ok(VenueId::Dflow),
            "cetus" => Ok(VenueId::Cetus),
            "utxoswap" => Ok(VenueId::UtxoSwap),
            other => Err(format!("unknown venue: {other}")),
        }
    }
}

#[derive(Debug, Error)]
pub enum VenueError {
    #[error("failed to call venue API: {0}")]
    Http(reqwest::Error),
    #[error("request to {endpoint} timed out")]
    Timeout { endpoint: String },
    #[error("API request to {endpoint} failed with status {status}: {body}")]
    ApiStatus {
        endpoint: String,
        status: StatusCode,
        body: String,
    },
    #[error("rate limited when calling {endpoint}: {body}")]
    RateLimited { endpoint: String, body: String },
    #[error("unexpected response schema: {0}")]
    Schema(String),
}

impl From<reqwest::Error> for VenueError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            VenueError::Timeout {
                endpoint: err
                    .url()
                    .map(|url| url.to_string())
                    .unwrap_or_else(|| "<unknown>".to_string()),
            }
        } else {
            VenueError::Http(err)
        }
    }
}

/// 非 2xx 状态统一转成类型化错误，限流单独标记。
pub(crate) async fn ensure_status(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, VenueError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let body = body.chars().take(512).collect::<String>();
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(VenueError::RateLimited {
            endpoint: endpoint.to_string(),
            body,
        });
    }
    Err(VenueError::ApiStatus {
        endpoint: endpoint.to_string(),
        status,
        body,
    })
}

/// 报价来源契约。
///
/// `fetch` 对以下情形一律返回 None：链不匹配、无流动性、上游
/// 网络故障、响应结构异常、超时。绝不向调用方抛出普通不可用。
#[async_trait]
pub trait QuoteProvider: Send + Sync + fmt::Debug {
    fn venue(&self) -> VenueId;

    fn chain(&self) -> ChainId;

    async fn fetch(&self, request: &SwapRequest) -> Option<NormalizedQuote>;
}

/// 各 venue 客户端的统一收尾：失败降级为缺席并记录指标。
pub(crate) fn swallow_absence(
    venue: VenueId,
    chain: ChainId,
    result: Result<Option<NormalizedQuote>, VenueError>,
) -> Option<NormalizedQuote> {
    let absence = |reason: &'static str| {
        if prometheus_enabled() {
            counter!("magellan_quote_absent_total", "venue" => venue.as_str(), "reason" => reason)
                .increment(1);
        }
    };
    match result {
        Ok(Some(quote)) if quote.is_usable() => Some(quote),
        Ok(Some(_)) => {
            debug!(
                target: "providers",
                venue = %venue,
                chain = %chain,
                "报价输出为零，按无流动性处理"
            );
            absence("zero_output");
            None
        }
        Ok(None) => {
            absence("no_route");
            None
        }
        Err(err) => {
            debug!(
                target: "providers",
                venue = %venue,
                chain = %chain,
                error = %err,
                "报价请求失败，降级为无报价"
            );
            absence("error");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn venue_parse_accepts_aliases() {
        assert_eq!("1inch".parse::<VenueId>(), Ok(VenueId::OneInch));
        assert_eq!("OpenOcean".parse::<VenueId>(), Ok(VenueId::OpenOcean));
        assert!("sushiswap".parse::<VenueId>().is_err());
    }

    #[test]
    fn every_chain_has_default_venues() {
        for chain in ChainId::ALL {
            assert!(!VenueId::defaults_for(*chain).is_empty());
        }
    }
}
