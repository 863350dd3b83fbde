//! OpenOcean 聚合器客户端，单次 `/swap` 调用同时返回报价与未签名交易。

use std::time::{Duration, Instant};

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::chain::ChainId;
use crate::engine::types::{CallPayload, NormalizedQuote, RouteHop, SwapRequest};

use super::serde_helpers::{field_as_string, lenient_f64};
use super::{QuoteProvider, VenueError, VenueId, ensure_status, swallow_absence};

pub const DEFAULT_BASE_URL: &str = "https://open-api.openocean.finance";

#[derive(Debug, Clone)]
pub struct OpenOceanProvider {
    chain: ChainId,
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OpenOceanProvider {
    pub fn new(
        client: reqwest::Client,
        chain: ChainId,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            chain,
            client,
            base_url,
            timeout,
        }
    }

    /// OpenOcean 的路径段用链简称而不是数字 chain id。
    fn chain_code(chain: ChainId) -> Option<&'static str> {
        match chain {
            ChainId::Ethereum => Some("eth"),
            ChainId::Bsc => Some("bsc"),
            ChainId::Polygon => Some("polygon"),
            ChainId::Arbitrum => Some("arbitrum"),
            ChainId::Optimism => Some("optimism"),
            ChainId::Base => Some("base"),
            ChainId::Avalanche => Some("avax"),
            ChainId::Fantom => Some("fantom"),
            ChainId::Linea => Some("linea"),
            ChainId::Scroll => Some("scroll"),
            _ => None,
        }
    }

    async fn try_fetch(
        &self,
        request: &SwapRequest,
    ) -> Result<Option<NormalizedQuote>, VenueError> {
        if request.chain != self.chain {
            return Ok(None);
        }
        let Some(code) = Self::chain_code(self.chain) else {
            return Ok(None);
        };

        let endpoint = format!("{}/v4/{code}/swap", self.base_url);
        let slippage = f64::from(request.slippage_bps) / 100.0;
        let started = Instant::now();
        let response = self
            .client
            .get(&endpoint)
            .timeout(self.timeout)
            .query(&[
                ("inTokenAddress", request.input_token.as_str()),
                ("outTokenAddress", request.output_token.as_str()),
                ("amountDecimals", &request.amount_in.to_string()),
                ("slippage", &slippage.to_string()),
                ("account", request.recipient.as_str()),
            ])
            .send()
            .await?;
        let response = ensure_status(&endpoint, response).await?;
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|err| VenueError::Schema(err.to_string()))?;

        // 业务层错误通过 code 字段返回，同样视为无报价
        if envelope.code != 200 {
            debug!(
                target: "providers::openocean",
                chain = %self.chain,
                code = envelope.code,
                "上游返回业务错误码"
            );
            return Ok(None);
        }
        let Some(data) = envelope.data else {
            return Ok(None);
        };

        debug!(
            target: "providers::openocean",
            chain = %self.chain,
            out_amount = %data.out_amount,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "报价请求完成"
        );

        Ok(Some(normalize(request, data)))
    }
}

#[async_trait]
impl QuoteProvider for OpenOceanProvider {
    fn venue(&self) -> VenueId {
        VenueId::OpenOcean
    }

    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn fetch(&self, request: &SwapRequest) -> Option<NormalizedQuote> {
        let result = self.try_fetch(request).await;
        swallow_absence(self.venue(), self.chain, result)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    data: Option<SwapData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapData {
    #[serde(with = "field_as_string")]
    out_amount: U256,
    #[serde(default)]
    estimated_gas: u64,
    #[serde(default, with = "lenient_f64")]
    price_impact: f64,
    to: String,
    data: String,
    #[serde(default, with = "field_as_string")]
    value: U256,
    #[serde(default)]
    path: Option<PathSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathSummary {
    #[serde(default)]
    routes: Vec<PathRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PathRoute {
    #[serde(default)]
    percentage: f64,
    #[serde(default)]
    sub_routes: Vec<SubRoute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubRoute {
    #[serde(default)]
    from: String,
    #[serde(default)]
    to: String,
    #[serde(default)]
    dexes: Vec<DexShare>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DexShare {
    #[serde(default)]
    dex: String,
    #[serde(default)]
    id: String,
    #[serde(default)]
    percentage: f64,
}

fn normalize(request: &SwapRequest, data: SwapData) -> NormalizedQuote {
    let mut route = Vec::new();
    if let Some(path) = &data.path {
        for top in &path.routes {
            for sub in &top.sub_routes {
                for dex in &sub.dexes {
                    let share = top.percentage / 100.0 * dex.percentage;
                    route.push(RouteHop {
                        venue_label: dex.dex.clone(),
                        pool: dex.id.clone(),
                        input_token: sub.from.clone(),
                        output_token: sub.to.clone(),
                        percent: share.round().clamp(0.0, 100.0) as u8,
                        fee_tier_bps: None,
                    });
                }
            }
        }
    }
    if route.is_empty() {
        route.push(RouteHop {
            venue_label: "openocean".to_string(),
            pool: data.to.clone(),
            input_token: request.input_token.clone(),
            output_token: request.output_token.clone(),
            percent: 100,
            fee_tier_bps: None,
        });
    }

    NormalizedQuote {
        venue: VenueId::OpenOcean,
        out_amount: data.out_amount,
        gas_estimate: data.estimated_gas,
        price_impact_pct: data.price_impact.abs(),
        route,
        payload: CallPayload {
            target: data.to,
            data: data.data,
            value: data.value,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWAP_JSON: &str = r#"{
        "code": 200,
        "data": {
            "inAmount": "1000000000000000000",
            "outAmount": "2655000000",
            "estimatedGas": 189000,
            "priceImpact": "0.08",
            "to": "0x6352a56caadc4f1e25cd6c75970fa768a3304e64",
            "data": "0x90411a32",
            "value": "1000000000000000000",
            "path": {
                "routes": [{
                    "percentage": 100,
                    "subRoutes": [{
                        "from": "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
                        "to": "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
                        "dexes": [
                            {"dex": "UniswapV3", "id": "0x88e6...5640", "percentage": 70},
                            {"dex": "SushiSwap", "id": "0x397f...f7a6", "percentage": 30}
                        ]
                    }]
                }]
            }
        }
    }"#;

    #[test]
    fn normalizes_swap_payload() {
        let envelope: Envelope = serde_json::from_str(SWAP_JSON).expect("parse envelope");
        let request = SwapRequest::new(
            ChainId::Ethereum,
            crate::chain::descriptor::EVM_NATIVE_SENTINEL,
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            "1000000000000000000".parse().unwrap(),
            100,
            "0x1111111111111111111111111111111111111111",
        );
        let quote = normalize(&request, envelope.data.expect("data"));
        assert_eq!(quote.out_amount, U256::from(2_655_000_000u64));
        assert_eq!(quote.gas_estimate, 189_000);
        assert_eq!(quote.route.len(), 2);
        let percent_total: u32 = quote.route.iter().map(|hop| u32::from(hop.percent)).sum();
        assert_eq!(percent_total, 100);
        assert_eq!(quote.payload.value, "1000000000000000000".parse::<U256>().unwrap());
    }

    #[test]
    fn business_error_code_is_absence() {
        let envelope: Envelope =
            serde_json::from_str(r#"{"code": 500, "data": null}"#).expect("parse envelope");
        assert_eq!(envelope.code, 500);
        assert!(envelope.data.is_none());
    }
}
