//! Jupiter 聚合器客户端（Solana）。
//!
//! 先调 `/swap/v1/quote` 拿路由，再调 `/swap/v1/swap` 换取序列化
//! 后的未签名交易，两步都在本报价方的超时预算内完成。

use std::time::{Duration, Instant};

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::chain::ChainId;
use crate::engine::types::{CallPayload, NormalizedQuote, RouteHop, SwapRequest};

use super::serde_helpers::{field_as_string, lenient_f64};
use super::{QuoteProvider, VenueError, VenueId, ensure_status, swallow_absence};

pub const DEFAULT_BASE_URL: &str = "https://lite-api.jup.ag";

/// Jupiter v6 路由程序地址，作为未签名调用的目标。
pub const JUPITER_PROGRAM_ID: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

#[derive(Debug, Clone)]
pub struct JupiterProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl JupiterProvider {
    pub fn new(client: reqwest::Client, base_url: String, timeout: Duration) -> Self {
        Self {
            client,
            base_url,
            timeout,
        }
    }

    async fn try_fetch(
        &self,
        request: &SwapRequest,
    ) -> Result<Option<NormalizedQuote>, VenueError> {
        if request.chain != ChainId::Solana {
            return Ok(None);
        }

        let quote_endpoint = format!("{}/swap/v1/quote", self.base_url);
        let started = Instant::now();
        let response = self
            .client
            .get(&quote_endpoint)
            .timeout(self.timeout)
            .query(&[
                ("inputMint", request.input_token.as_str()),
                ("outputMint", request.output_token.as_str()),
                ("amount", &request.amount_in.to_string()),
                ("slippageBps", &request.slippage_bps.to_string()),
                ("restrictIntermediateTokens", "true"),
            ])
            .send()
            .await?;
        let response = ensure_status(&quote_endpoint, response).await?;
        let raw: Value = response
            .json()
            .await
            .map_err(|err| VenueError::Schema(err.to_string()))?;
        let quote: QuoteResponse = serde_json::from_value(raw.clone())
            .map_err(|err| VenueError::Schema(format!("解析报价响应失败: {err}")))?;

        if quote.out_amount == U256::ZERO {
            return Ok(None);
        }

        // 第二步：把原始 quoteResponse 原样回传换取未签名交易
        let swap_endpoint = format!("{}/swap/v1/swap", self.base_url);
        let swap_body = SwapRequestBody {
            quote_response: raw,
            user_public_key: request.recipient.clone(),
            wrap_and_unwrap_sol: true,
        };
        let response = self
            .client
            .post(&swap_endpoint)
            .timeout(self.timeout)
            .json(&swap_body)
            .send()
            .await?;
        let response = ensure_status(&swap_endpoint, response).await?;
        let swap: SwapResponse = response
            .json()
            .await
            .map_err(|err| VenueError::Schema(err.to_string()))?;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        debug!(
            target: "providers::jupiter",
            input_mint = %request.input_token,
            output_mint = %request.output_token,
            out_amount = %quote.out_amount,
            elapsed_ms,
            "报价请求完成"
        );

        Ok(Some(normalize(quote, swap)))
    }
}

#[async_trait]
impl QuoteProvider for JupiterProvider {
    fn venue(&self) -> VenueId {
        VenueId::Jupiter
    }

    fn chain(&self) -> ChainId {
        ChainId::Solana
    }

    async fn fetch(&self, request: &SwapRequest) -> Option<NormalizedQuote> {
        let result = self.try_fetch(request).await;
        swallow_absence(self.venue(), self.chain(), result)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    #[serde(with = "field_as_string")]
    out_amount: U256,
    #[serde(default, with = "lenient_f64")]
    price_impact_pct: f64,
    #[serde(default)]
    route_plan: Vec<RoutePlanStep>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutePlanStep {
    swap_info: SwapInfo,
    #[serde(default)]
    percent: u8,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapInfo {
    amm_key: String,
    #[serde(default)]
    label: String,
    input_mint: String,
    output_mint: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequestBody {
    quote_response: Value,
    user_public_key: String,
    wrap_and_unwrap_sol: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    /// base64 序列化的未签名 VersionedTransaction。
    swap_transaction: String,
    #[serde(default)]
    compute_unit_limit: u64,
}

fn normalize(quote: QuoteResponse, swap: SwapResponse) -> NormalizedQuote {
    let route = quote
        .route_plan
        .iter()
        .map(|step| RouteHop {
            venue_label: step.swap_info.label.clone(),
            pool: step.swap_info.amm_key.clone(),
            input_token: step.swap_info.input_mint.clone(),
            output_token: step.swap_info.output_mint.clone(),
            percent: step.percent,
            fee_tier_bps: None,
        })
        .collect();

    NormalizedQuote {
        venue: VenueId::Jupiter,
        out_amount: quote.out_amount,
        gas_estimate: swap.compute_unit_limit,
        price_impact_pct: quote.price_impact_pct,
        route,
        payload: CallPayload {
            target: JUPITER_PROGRAM_ID.to_string(),
            data: swap.swap_transaction,
            value: U256::ZERO,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTE_JSON: &str = r#"{
        "inputMint": "So11111111111111111111111111111111111111112",
        "inAmount": "1000000000",
        "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        "outAmount": "166210000",
        "otherAmountThreshold": "165380000",
        "swapMode": "ExactIn",
        "priceImpactPct": "0.0012",
        "routePlan": [
            {
                "swapInfo": {
                    "ammKey": "BVRbyLjjfSBcoyiYFuxbgKYnWuiFaF9CSXEa5vdSZ9Hh",
                    "label": "Whirlpool",
                    "inputMint": "So11111111111111111111111111111111111111112",
                    "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
                    "inAmount": "1000000000",
                    "outAmount": "166210000",
                    "feeAmount": "400000",
                    "feeMint": "So11111111111111111111111111111111111111112"
                },
                "percent": 100
            }
        ],
        "timeTaken": 0.012
    }"#;

    #[test]
    fn normalizes_quote_and_swap() {
        let quote: QuoteResponse = serde_json::from_str(QUOTE_JSON).expect("parse quote");
        let swap: SwapResponse = serde_json::from_str(
            r#"{"swapTransaction": "AQAAAA==", "computeUnitLimit": 140000}"#,
        )
        .expect("parse swap");
        let normalized = normalize(quote, swap);
        assert_eq!(normalized.venue, VenueId::Jupiter);
        assert_eq!(normalized.out_amount, U256::from(166_210_000u64));
        assert_eq!(normalized.gas_estimate, 140_000);
        assert_eq!(normalized.route.len(), 1);
        assert_eq!(normalized.route[0].pool, "BVRbyLjjfSBcoyiYFuxbgKYnWuiFaF9CSXEa5vdSZ9Hh");
        assert_eq!(normalized.route[0].percent, 100);
        assert_eq!(normalized.payload.target, JUPITER_PROGRAM_ID);
        assert_eq!(normalized.payload.data, "AQAAAA==");
        assert!((normalized.price_impact_pct - 0.0012).abs() < 1e-9);
    }
}
