//! UTXOSwap 排序器客户端（CKB）。
//!
//! Cell 模型下排序器直接返回整笔未签名交易（JSON 编码），核心把它
//! 当作不透明载荷转交外部签名器。

use std::time::{Duration, Instant};

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::chain::ChainId;
use crate::engine::types::{CallPayload, NormalizedQuote, RouteHop, SwapRequest};

use super::serde_helpers::{field_as_string, lenient_f64};
use super::{QuoteProvider, VenueError, VenueId, ensure_status, swallow_absence};

pub const DEFAULT_BASE_URL: &str = "https://sequencer.utxoswap.xyz";

#[derive(Debug, Clone)]
pub struct UtxoSwapProvider {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl UtxoSwapProvider {
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
        if request.chain != ChainId::Ckb {
            return Ok(None);
        }

        let endpoint = format!("{}/api/v1/sequencer/quote", self.base_url);
        let body = json!({
            "tokenIn": request.input_token,
            "tokenOut": request.output_token,
            "amountIn": request.amount_in.to_string(),
            "slippageBps": request.slippage_bps,
            "recipient": request.recipient,
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

        if envelope.code != 0 {
            debug!(
                target: "providers::utxoswap",
                code = envelope.code,
                "排序器返回业务错误码"
            );
            return Ok(None);
        }
        let Some(data) = envelope.data else {
            return Ok(None);
        };

        debug!(
            target: "providers::utxoswap",
            token_in = %request.input_token,
            token_out = %request.output_token,
            out_amount = %data.amount_out,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "报价请求完成"
        );

        Ok(Some(normalize(data)))
    }
}

#[async_trait]
impl QuoteProvider for UtxoSwapProvider {
    fn venue(&self) -> VenueId {
        VenueId::UtxoSwap
    }

    fn chain(&self) -> ChainId {
        ChainId::Ckb
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
    data: Option<QuoteData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteData {
    #[serde(with = "field_as_string")]
    amount_out: U256,
    #[serde(default, with = "lenient_f64")]
    price_impact: f64,
    #[serde(default)]
    pools: Vec<PoolHop>,
    /// 排序器预组装的未签名交易（CKB JSON 交易格式）。
    unsigned_tx: String,
    /// 交易里 DEX 锁脚本的 script hash。
    #[serde(default)]
    dex_lock_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoolHop {
    pool_id: String,
    token_in: String,
    token_out: String,
    #[serde(default)]
    fee_bps: Option<u32>,
    #[serde(default)]
    percent: u8,
}

fn normalize(data: QuoteData) -> NormalizedQuote {
    let route = data
        .pools
        .iter()
        .map(|pool| RouteHop {
            venue_label: "utxoswap".to_string(),
            pool: pool.pool_id.clone(),
            input_token: pool.token_in.clone(),
            output_token: pool.token_out.clone(),
            percent: pool.percent,
            fee_tier_bps: pool.fee_bps,
        })
        .collect();

    NormalizedQuote {
        venue: VenueId::UtxoSwap,
        out_amount: data.amount_out,
        gas_estimate: 0,
        price_impact_pct: data.price_impact.abs(),
        route,
        payload: CallPayload {
            target: data.dex_lock_hash,
            data: data.unsigned_tx,
            value: U256::ZERO,
        },
    }
}
