//! Odos 智能路由客户端。报价与交易装配是两次调用：
//! `/sor/quote/v2` 返回 pathId，`/sor/assemble` 换取未签名交易。

use std::time::{Duration, Instant};

use alloy_primitives::U256;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::chain::ChainId;
use crate::chain::descriptor::EVM_NATIVE_SENTINEL;
use crate::engine::types::{CallPayload, NormalizedQuote, RouteHop, SwapRequest};

use super::serde_helpers::{field_as_string, lenient_f64};
use super::{QuoteProvider, VenueError, VenueId, ensure_status, swallow_absence};

pub const DEFAULT_BASE_URL: &str = "https://api.odos.xyz";

/// Odos 用全零地址表示原生代币。
const ODOS_NATIVE: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Clone)]
pub struct OdosProvider {
    chain: ChainId,
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl OdosProvider {
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

    fn translate_token(token: &str) -> String {
        if token.eq_ignore_ascii_case(EVM_NATIVE_SENTINEL) {
            ODOS_NATIVE.to_string()
        } else {
            token.to_string()
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

        let quote_endpoint = format!("{}/sor/quote/v2", self.base_url);
        let quote_body = json!({
            "chainId": evm_chain_id,
            "inputTokens": [{
                "tokenAddress": Self::translate_token(&request.input_token),
                "amount": request.amount_in.to_string(),
            }],
            "outputTokens": [{
                "tokenAddress": Self::translate_token(&request.output_token),
                "proportion": 1,
            }],
            "slippageLimitPercent": f64::from(request.slippage_bps) / 100.0,
            "userAddr": request.recipient,
            "compact": true,
        });

        let started = Instant::now();
        let response = self
            .client
            .post(&quote_endpoint)
            .timeout(self.timeout)
            .json(&quote_body)
            .send()
            .await?;
        let response = ensure_status(&quote_endpoint, response).await?;
        let quote: QuoteResponse = response
            .json()
            .await
            .map_err(|err| VenueError::Schema(err.to_string()))?;

        let Some(out_raw) = quote.out_amounts.first() else {
            return Ok(None);
        };
        let out_amount = out_raw
            .parse::<U256>()
            .map_err(|err| VenueError::Schema(format!("outAmounts[0]: {err}")))?;

        let assemble_endpoint = format!("{}/sor/assemble", self.base_url);
        let assemble_body = AssembleRequest {
            user_addr: request.recipient.clone(),
            path_id: quote.path_id.clone(),
            simulate: false,
        };
        let response = self
            .client
            .post(&assemble_endpoint)
            .timeout(self.timeout)
            .json(&assemble_body)
            .send()
            .await?;
        let response = ensure_status(&assemble_endpoint, response).await?;
        let assembled: AssembleResponse = response
            .json()
            .await
            .map_err(|err| VenueError::Schema(err.to_string()))?;

        debug!(
            target: "providers::odos",
            chain = %self.chain,
            out_amount = %out_amount,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "报价与装配完成"
        );

        Ok(Some(normalize(request, out_amount, quote, assembled)))
    }
}

#[async_trait]
impl QuoteProvider for OdosProvider {
    fn venue(&self) -> VenueId {
        VenueId::Odos
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
struct QuoteResponse {
    path_id: String,
    #[serde(default)]
    out_amounts: Vec<String>,
    #[serde(default)]
    gas_estimate: f64,
    #[serde(default, with = "lenient_f64")]
    price_impact: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AssembleRequest {
    user_addr: String,
    path_id: String,
    simulate: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssembleResponse {
    transaction: AssembledTransaction,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssembledTransaction {
    to: String,
    data: String,
    #[serde(with = "field_as_string")]
    value: U256,
    #[serde(default)]
    gas: u64,
}

fn normalize(
    request: &SwapRequest,
    out_amount: U256,
    quote: QuoteResponse,
    assembled: AssembleResponse,
) -> NormalizedQuote {
    let gas_estimate = if assembled.transaction.gas > 0 {
        assembled.transaction.gas
    } else {
        quote.gas_estimate.max(0.0) as u64
    };
    // Odos 不回传逐池路径，统一记为单跳
    let route = vec![RouteHop {
        venue_label: "odos".to_string(),
        pool: assembled.transaction.to.clone(),
        input_token: request.input_token.clone(),
        output_token: request.output_token.clone(),
        percent: 100,
        fee_tier_bps: None,
    }];

    NormalizedQuote {
        venue: VenueId::Odos,
        out_amount,
        gas_estimate,
        price_impact_pct: quote.price_impact.abs(),
        route,
        payload: CallPayload {
            target: assembled.transaction.to,
            data: assembled.transaction.data,
            value: assembled.transaction.value,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_two_step_response() {
        let quote: QuoteResponse = serde_json::from_str(
            r#"{
                "pathId": "abc123",
                "outAmounts": ["987650000"],
                "gasEstimate": 412000.0,
                "priceImpact": -0.12
            }"#,
        )
        .expect("parse quote");
        let assembled: AssembleResponse = serde_json::from_str(
            r#"{
                "transaction": {
                    "to": "0xcf5540fffcdc3d510b18bfca6d2b9987b0772559",
                    "data": "0x83bd37f9",
                    "value": "0",
                    "gas": 0
                }
            }"#,
        )
        .expect("parse assemble");
        let request = SwapRequest::new(
            ChainId::Base,
            "0xaaa",
            "0xbbb",
            U256::from(1_000u64),
            100,
            "0x1111111111111111111111111111111111111111",
        );
        let out = quote.out_amounts[0].parse::<U256>().unwrap();
        let normalized = normalize(&request, out, quote, assembled);
        assert_eq!(normalized.venue, VenueId::Odos);
        assert_eq!(normalized.out_amount, U256::from(987_650_000u64));
        // assemble 未带 gas 时退回报价阶段的估算
        assert_eq!(normalized.gas_estimate, 412_000);
        assert!((normalized.price_impact_pct - 0.12).abs() < f64::EPSILON);
        assert_eq!(normalized.route[0].percent, 100);
    }

    #[test]
    fn native_sentinel_translates_to_zero_address() {
        assert_eq!(
            OdosProvider::translate_token(EVM_NATIVE_SENTINEL),
            ODOS_NATIVE
        );
        assert_eq!(OdosProvider::translate_token("0xabc"), "0xabc");
    }
}
