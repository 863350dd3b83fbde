//! 1inch 聚合器客户端，覆盖全部 EVM 链。

use std::time::{Duration, Instant};

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::chain::ChainId;
use crate::engine::types::{CallPayload, NormalizedQuote, RouteHop, SwapRequest};

use super::serde_helpers::field_as_string;
use super::{QuoteProvider, VenueError, VenueId, ensure_status, swallow_absence};

pub const DEFAULT_BASE_URL: &str = "https://api.1inch.dev";

#[derive(Debug, Clone)]
pub struct OneInchProvider {
    chain: ChainId,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl OneInchProvider {
    pub fn new(
        client: reqwest::Client,
        chain: ChainId,
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            chain,
            client,
            base_url,
            api_key,
            timeout,
        }
    }

    async fn try_fetch(
        &self,
        request: &SwapRequest,
    ) -> Result<Option<NormalizedQuote>, VenueError> {
        if request.chain != self.chain {
            return Ok(None);
        }
        let Some(evm_chain_id) = self.chain.evm_chain_id() else {
            return Ok(None);
        };

        let endpoint = format!("{}/swap/v6.0/{evm_chain_id}/swap", self.base_url);
        // slippage 参数按百分比传递
        let slippage = f64::from(request.slippage_bps) / 100.0;
        let mut http_request = self
            .client
            .get(&endpoint)
            .timeout(self.timeout)
            .query(&[
                ("src", request.input_token.as_str()),
                ("dst", request.output_token.as_str()),
                ("amount", &request.amount_in.to_string()),
                ("from", request.recipient.as_str()),
                ("slippage", &slippage.to_string()),
                ("disableEstimate", "true"),
                ("includeProtocols", "true"),
            ]);
        if let Some(key) = &self.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let started = Instant::now();
        let response = http_request.send().await?;
        let response = ensure_status(&endpoint, response).await?;
        let body: SwapResponse = response
            .json()
            .await
            .map_err(|err| VenueError::Schema(err.to_string()))?;
        debug!(
            target: "providers::oneinch",
            chain = %self.chain,
            out_amount = %body.dst_amount,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "报价请求完成"
        );

        Ok(Some(normalize(request, body)))
    }
}

#[async_trait]
impl QuoteProvider for OneInchProvider {
    fn venue(&self) -> VenueId {
        VenueId::OneInch
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
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    #[serde(with = "field_as_string")]
    dst_amount: U256,
    tx: TxDescriptor,
    /// 三层嵌套：路径段 -> 并行拆分 -> 具体协议。
    #[serde(default)]
    protocols: Vec<Vec<Vec<ProtocolHop>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TxDescriptor {
    to: String,
    data: String,
    #[serde(with = "field_as_string")]
    value: U256,
    #[serde(default)]
    gas: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProtocolHop {
    name: String,
    part: f64,
    from_token_address: String,
    to_token_address: String,
}

fn normalize(request: &SwapRequest, body: SwapResponse) -> NormalizedQuote {
    let mut route = Vec::new();
    for segment in &body.protocols {
        for split in segment {
            for hop in split {
                route.push(RouteHop {
                    venue_label: hop.name.clone(),
                    pool: String::new(),
                    input_token: hop.from_token_address.clone(),
                    output_token: hop.to_token_address.clone(),
                    percent: hop.part.round().clamp(0.0, 100.0) as u8,
                    fee_tier_bps: None,
                });
            }
        }
    }
    if route.is_empty() {
        route.push(RouteHop {
            venue_label: "1inch".to_string(),
            pool: body.tx.to.clone(),
            input_token: request.input_token.clone(),
            output_token: request.output_token.clone(),
            percent: 100,
            fee_tier_bps: None,
        });
    }

    NormalizedQuote {
        venue: VenueId::OneInch,
        out_amount: body.dst_amount,
        gas_estimate: body.tx.gas,
        price_impact_pct: 0.0,
        route,
        payload: CallPayload {
            target: body.tx.to,
            data: body.tx.data,
            value: body.tx.value,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SWAP_JSON: &str = r#"{
        "dstAmount": "1234500000000000000",
        "tx": {
            "from": "0x1111111111111111111111111111111111111111",
            "to": "0x111111125421ca6dc452d289314280a0f8842a65",
            "data": "0x07ed2379",
            "value": "0",
            "gas": 285000,
            "gasPrice": "12000000000"
        },
        "protocols": [[[
            {"name": "UNISWAP_V3", "part": 60, "fromTokenAddress": "0xaaa", "toTokenAddress": "0xbbb"},
            {"name": "CURVE", "part": 40, "fromTokenAddress": "0xaaa", "toTokenAddress": "0xbbb"}
        ]]]
    }"#;

    fn sample_request() -> SwapRequest {
        SwapRequest::new(
            ChainId::Ethereum,
            "0xaaa",
            "0xbbb",
            U256::from(1_000_000u64),
            50,
            "0x1111111111111111111111111111111111111111",
        )
    }

    #[test]
    fn normalizes_swap_response() {
        let body: SwapResponse = serde_json::from_str(SWAP_JSON).expect("parse swap json");
        let quote = normalize(&sample_request(), body);
        assert_eq!(quote.venue, VenueId::OneInch);
        assert_eq!(
            quote.out_amount,
            "1234500000000000000".parse::<U256>().unwrap()
        );
        assert_eq!(quote.gas_estimate, 285_000);
        assert_eq!(quote.payload.target, "0x111111125421ca6dc452d289314280a0f8842a65");
        let percent_total: u32 = quote.route.iter().map(|hop| u32::from(hop.percent)).sum();
        assert_eq!(percent_total, 100);
    }

    #[test]
    fn missing_protocols_yields_single_hop() {
        let body: SwapResponse = serde_json::from_str(
            r#"{"dstAmount":"5","tx":{"to":"0xrouter","data":"0x","value":"0"}}"#,
        )
        .expect("parse minimal json");
        let quote = normalize(&sample_request(), body);
        assert_eq!(quote.route.len(), 1);
        assert_eq!(quote.route[0].percent, 100);
        assert_eq!(quote.gas_estimate, 0);
    }
}
