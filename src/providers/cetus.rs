//! Cetus 聚合器客户端（Sui）。
//!
//! `/router_v2/find_routes` 只返回路由计划；计划以 base64 附在载荷
//! 上，由外部签名器的 PTB 构建器据此拼装可编程交易块。

use std::time::{Duration, Instant};

use alloy_primitives::U256;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::chain::ChainId;
use crate::engine::types::{CallPayload, NormalizedQuote, RouteHop, SwapRequest};

use super::serde_helpers::{field_as_string, lenient_f64};
use super::{QuoteProvider, VenueError, VenueId, ensure_status, swallow_absence};

pub const DEFAULT_BASE_URL: &str = "https://api-sui.cetus.zone";

/// Cetus 聚合器包地址，作为未签名调用的目标。
pub const CETUS_AGGREGATOR_PACKAGE: &str =
    "0xeffc8ae61f439bb34c9b905ff8f29ec56873dcedf81c7123ff2f1f67c45ec302";

#[derive(Debug, Clone)]
pub struct CetusProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl CetusProvider {
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
        if request.chain != ChainId::Sui {
            return Ok(None);
        }

        let endpoint = format!("{}/router_v2/find_routes", self.base_url);
        let body = json!({
            "from": request.input_token,
            "target": request.output_token,
            "amount": request.amount_in.to_string(),
            "byAmountIn": true,
            "depth": 3,
        });
        let started = Instant::now();
        let response = self
            .client
            .post(&endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?;
        let response = ensure_status(&endpoint, response).await?;
        let envelope: Envelope = response
            .json()
            .await
            .map_err(|err| VenueError::Schema(err.to_string()))?;

        if envelope.code != 200 {
            debug!(
                target: "providers::cetus",
                code = envelope.code,
                msg = %envelope.msg,
                "上游返回业务错误码"
            );
            return Ok(None);
        }
        let Some(data) = envelope.data else {
            return Ok(None);
        };

        debug!(
            target: "providers::cetus",
            from = %request.input_token,
            target_coin = %request.output_token,
            out_amount = %data.amount_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "报价请求完成"
        );

        Ok(Some(normalize(data)?))
    }
}

#[async_trait]
impl QuoteProvider for CetusProvider {
    fn venue(&self) -> VenueId {
        VenueId::Cetus
    }

    fn chain(&self) -> ChainId {
        ChainId::Sui
    }

    async fn fetch(&self, request: &SwapRequest) -> Option<NormalizedQuote> {
        let result = self.try_fetch(request).await;
        swallow_absence(self.venue(), self.chain(), result)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<RouteData>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RouteData {
    #[serde(with = "field_as_string")]
    amount_out: U256,
    #[serde(default, deserialize_with = "lenient_f64::deserialize")]
    price_impact: f64,
    #[serde(default)]
    routes: Vec<RoutePath>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct RoutePath {
    #[serde(default)]
    percent: u8,
    #[serde(default)]
    path: Vec<PathStep>,
}

#[derive(Debug, Deserialize, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct PathStep {
    id: String,
    #[serde(default)]
    provider: String,
    from: String,
    target: String,
    #[serde(default)]
    fee_rate: Option<u32>,
}

fn normalize(data: RouteData) -> Result<NormalizedQuote, VenueError> {
    let mut route = Vec::new();
    for path in &data.routes {
        for (index, step) in path.path.iter().enumerate() {
            route.push(RouteHop {
                venue_label: step.provider.clone(),
                pool: step.id.clone(),
                input_token: step.from.clone(),
                output_token: step.target.clone(),
                // 串联多跳只在首跳计份额，保证各报价方的占比和为 100
                percent: if index == 0 { path.percent } else { 0 },
                fee_tier_bps: step.fee_rate,
            });
        }
    }

    // 路由计划即载荷，外部 PTB 构建器负责展开
    let plan = serde_json::to_vec(&data).map_err(|err| VenueError::Schema(err.to_string()))?;
    let out_amount = data.amount_out;
    let price_impact = data.price_impact.abs();

    Ok(NormalizedQuote {
        venue: VenueId::Cetus,
        out_amount,
        gas_estimate: 0,
        price_impact_pct: price_impact,
        route,
        payload: CallPayload {
            target: CETUS_AGGREGATOR_PACKAGE.to_string(),
            data: BASE64.encode(plan),
            value: U256::ZERO,
        },
    })
}
