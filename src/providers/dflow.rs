//! DFlow 聚合器客户端（Solana），接口形态与 Jupiter 保持同构。

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

pub const DEFAULT_BASE_URL: &str = "https://quote-api.dflow.net";

/// DFlow 路由程序地址。
pub const DFLOW_PROGRAM_ID: &str = "DF1ow4tspfHX9JwWJsAb9epbkA8hmpSEAtxXy1V27QBH";

#[derive(Debug, Clone)]
pub struct DflowProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl DflowProvider {
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

        let quote_endpoint = format!("{}/quote", self.base_url);
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

        let swap_endpoint = format!("{}/swap", self.base_url);
        let body = SwapRequestBody {
            quote_response: raw,
            user_public_key: request.recipient.clone(),
        };
        let response = self
            .client
            .post(&swap_endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        let response = ensure_status(&swap_endpoint, response).await?;
        let swap: SwapResponse = response
            .json()
            .await
            .map_err(|err| VenueError::Schema(err.to_string()))?;

        debug!(
            target: "providers::dflow",
            input_mint = %request.input_token,
            output_mint = %request.output_token,
            out_amount = %quote.out_amount,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "报价请求完成"
        );

        Ok(Some(normalize(quote, swap)))
    }
}

#[async_trait]
impl QuoteProvider for DflowProvider {
    fn venue(&self) -> VenueId {
        VenueId::Dflow
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
    route_plan: Vec<RoutePlanLeg>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoutePlanLeg {
    #[serde(default)]
    market_key: String,
    #[serde(default)]
    venue: String,
    input_mint: String,
    output_mint: String,
    #[serde(default)]
    percent: u8,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequestBody {
    quote_response: Value,
    user_public_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
    #[serde(default)]
    compute_unit_limit: u64,
}

fn normalize(quote: QuoteResponse, swap: SwapResponse) -> NormalizedQuote {
    let route = quote
        .route_plan
        .iter()
        .map(|leg| RouteHop {
            venue_label: leg.venue.clone(),
            pool: leg.market_key.clone(),
            input_token: leg.input_mint.clone(),
            output_token: leg.output_mint.clone(),
            percent: leg.percent,
            fee_tier_bps: None,
        })
        .collect();

    NormalizedQuote {
        venue: VenueId::Dflow,
        out_amount: quote.out_amount,
        gas_estimate: swap.compute_unit_limit,
        price_impact_pct: quote.price_impact_pct,
        route,
        payload: CallPayload {
            target: DFLOW_PROGRAM_ID.to_string(),
            data: swap.swap_transaction,
            value: U256::ZERO,
        },
    }
}
