//! Sui 适配器：对象模型链。余额按 coin type 聚合查询；签名交易
//! 以 `{tx_bytes, signatures}` 信封提交。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, info};

use super::rpc::RpcHttp;
use super::{AdapterError, ChainAdapter, ChainDescriptor, TokenInfo};
use crate::providers::QuoteProvider;

#[derive(Debug)]
pub struct SuiAdapter {
    descriptor: ChainDescriptor,
    rpc: RpcHttp,
    providers: Vec<Arc<dyn QuoteProvider>>,
    quote_deadline: Duration,
    confirm_poll_interval: Duration,
    confirm_poll_attempts: u32,
    token_cache: DashMap<String, TokenInfo>,
    initialized: AtomicBool,
}

impl SuiAdapter {
    pub fn new(
        descriptor: ChainDescriptor,
        rpc: RpcHttp,
        providers: Vec<Arc<dyn QuoteProvider>>,
        quote_deadline: Duration,
        confirm_poll_interval: Duration,
        confirm_poll_attempts: u32,
    ) -> Self {
        Self {
            descriptor,
            rpc,
            providers,
            quote_deadline,
            confirm_poll_interval,
            confirm_poll_attempts,
            token_cache: DashMap::new(),
            initialized: AtomicBool::new(false),
        }
    }
}

/// 外部签名器交回的已签交易信封。
#[derive(Debug, Deserialize)]
struct SignedEnvelope {
    tx_bytes: String,
    signatures: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BalanceResponse {
    total_balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinMetadata {
    decimals: u8,
    symbol: String,
}

#[async_trait]
impl ChainAdapter for SuiAdapter {
    fn descriptor(&self) -> &ChainDescriptor {
        &self.descriptor
    }

    fn providers(&self) -> &[Arc<dyn QuoteProvider>] {
        &self.providers
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        if self.initialized.load(Ordering::SeqCst) {
            return Ok(());
        }
        let _identifier: String = self
            .rpc
            .call("sui_getChainIdentifier", json!([]))
            .await
            .map_err(|err| AdapterError::Init {
                chain: self.descriptor.chain,
                reason: err.to_string(),
            })?;
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            target: "chain::sui",
            endpoint = self.rpc.endpoint(),
            "适配器初始化完成"
        );
        Ok(())
    }

    async fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);
        self.token_cache.clear();
    }

    async fn token_info(&self, token: &str) -> Result<TokenInfo, AdapterError> {
        if self.is_native_token(token) {
            return Ok(TokenInfo {
                address: self.descriptor.native_sentinel.to_string(),
                symbol: self.descriptor.native_symbol.to_string(),
                decimals: self.descriptor.native_decimals,
            });
        }
        if let Some(cached) = self.token_cache.get(token) {
            return Ok(cached.clone());
        }
        let metadata: Option<CoinMetadata> = self
            .rpc
            .call("suix_getCoinMetadata", json!([token]))
            .await?;
        let metadata = metadata.ok_or_else(|| {
            AdapterError::Unsupported(format!("coin {token} 没有链上元数据"))
        })?;
        let info = TokenInfo {
            address: token.to_string(),
            symbol: metadata.symbol,
            decimals: metadata.decimals,
        };
        self.token_cache.insert(token.to_string(), info.clone());
        Ok(info)
    }

    async fn native_balance(&self, address: &str) -> Result<U256, AdapterError> {
        self.token_balance(self.descriptor.native_sentinel, address)
            .await
    }

    async fn token_balance(&self, token: &str, address: &str) -> Result<U256, AdapterError> {
        if !self.is_valid_address(address) {
            return Err(AdapterError::InvalidAddress(address.to_string()));
        }
        let coin_type = if self.is_native_token(token) {
            self.descriptor.native_sentinel
        } else {
            token
        };
        let balance: BalanceResponse = self
            .rpc
            .call("suix_getBalance", json!([address, coin_type]))
            .await?;
        balance
            .total_balance
            .parse::<U256>()
            .map_err(|err| AdapterError::ParseAmount(format!("totalBalance: {err}")))
    }

    async fn submit_transaction(&self, signed: &[u8]) -> Result<String, AdapterError> {
        let envelope: SignedEnvelope = serde_json::from_slice(signed).map_err(|err| {
            AdapterError::MalformedPayload(format!("期望 {{tx_bytes, signatures}} 信封: {err}"))
        })?;
        let response: Value = self
            .rpc
            .call(
                "sui_executeTransactionBlock",
                json!([
                    envelope.tx_bytes,
                    envelope.signatures,
                    { "showEffects": true },
                    "WaitForEffectsCert"
                ]),
            )
            .await
            .map_err(|err| match err {
                super::rpc::RpcError::Node { message, .. } => AdapterError::Rejected(message),
                other => AdapterError::Rpc(other),
            })?;
        let digest = response
            .get("digest")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::Rpc(super::rpc::RpcError::Schema(
                    "executeTransactionBlock response missing digest".to_string(),
                ))
            })?
            .to_string();
        info!(target: "chain::sui", tx = %digest, "交易已提交");
        Ok(digest)
    }

    async fn wait_for_confirmation(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<(), AdapterError> {
        // Sui 共识即终局，确认数只决定是否要求交易已经可查
        let _ = confirmations;
        for _ in 0..self.confirm_poll_attempts {
            let block: Result<Value, _> = self
                .rpc
                .call(
                    "sui_getTransactionBlock",
                    json!([hash, { "showEffects": true }]),
                )
                .await;
            match block {
                Ok(block) => {
                    let status = block
                        .pointer("/effects/status/status")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    if status == "success" {
                        return Ok(());
                    }
                    if status == "failure" {
                        return Err(AdapterError::Rejected(format!("交易 {hash} 执行失败")));
                    }
                }
                Err(err) => {
                    debug!(target: "chain::sui", tx = %hash, error = %err, "交易尚未可查，继续轮询");
                }
            }
            sleep(self.confirm_poll_interval).await;
        }
        Err(AdapterError::ConfirmationTimeout {
            hash: hash.to_string(),
            confirmations,
        })
    }

    fn is_valid_address(&self, address: &str) -> bool {
        is_sui_address(address)
    }

    fn quote_deadline(&self) -> Duration {
        self.quote_deadline
    }
}

/// 标准化的 Sui 地址：0x + 64 位十六进制。
fn is_sui_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .map(|digits| digits.len() == 64 && digits.chars().all(|digit| digit.is_ascii_hexdigit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_addresses_validate() {
        assert!(is_sui_address(
            "0x7f150ac7681ae1565f8b31b9000d0a8ba77a4fc4a4fd983d5b90b01b7c6e2f3d"
        ));
        assert!(!is_sui_address("0x2"));
        assert!(!is_sui_address("0x2::sui::SUI"));
        assert!(!is_sui_address(
            "7f150ac7681ae1565f8b31b9000d0a8ba77a4fc4a4fd983d5b90b01b7c6e2f3d"
        ));
    }

    #[test]
    fn signed_envelope_parses() {
        let envelope: SignedEnvelope = serde_json::from_str(
            r#"{"tx_bytes": "AAACAC", "signatures": ["AJ7o...=="]}"#,
        )
        .expect("parse envelope");
        assert_eq!(envelope.signatures.len(), 1);
        assert!(!envelope.tx_bytes.is_empty());
    }
}
