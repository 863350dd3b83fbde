//! Solana 适配器：账户模型、ed25519 签名、base58 地址。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, info};

use super::rpc::RpcHttp;
use super::{AdapterError, ChainAdapter, ChainDescriptor, TokenInfo};
use crate::providers::QuoteProvider;

#[derive(Debug)]
pub struct SolanaAdapter {
    descriptor: ChainDescriptor,
    rpc: RpcHttp,
    providers: Vec<Arc<dyn QuoteProvider>>,
    quote_deadline: Duration,
    confirm_poll_interval: Duration,
    confirm_poll_attempts: u32,
    token_cache: DashMap<String, TokenInfo>,
    initialized: AtomicBool,
}

impl SolanaAdapter {
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

#[derive(Debug, Deserialize)]
struct RpcValue<T> {
    value: T,
}

#[derive(Debug, Deserialize)]
struct TokenSupplyValue {
    decimals: u8,
}

#[async_trait]
impl ChainAdapter for SolanaAdapter {
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
        let health: String =
            self.rpc
                .call("getHealth", json!([]))
                .await
                .map_err(|err| AdapterError::Init {
                    chain: self.descriptor.chain,
                    reason: err.to_string(),
                })?;
        if health != "ok" {
            return Err(AdapterError::Init {
                chain: self.descriptor.chain,
                reason: format!("节点健康状态异常: {health}"),
            });
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            target: "chain::solana",
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
        if !self.is_valid_address(token) {
            return Err(AdapterError::InvalidAddress(token.to_string()));
        }
        if let Some(cached) = self.token_cache.get(token) {
            return Ok(cached.clone());
        }
        let supply: RpcValue<TokenSupplyValue> =
            self.rpc.call("getTokenSupply", json!([token])).await?;
        // 链上 mint 不携带符号，用截断后的地址占位
        let symbol = token.chars().take(4).collect::<String>();
        let info = TokenInfo {
            address: token.to_string(),
            symbol,
            decimals: supply.value.decimals,
        };
        self.token_cache.insert(token.to_string(), info.clone());
        Ok(info)
    }

    async fn native_balance(&self, address: &str) -> Result<U256, AdapterError> {
        if !self.is_valid_address(address) {
            return Err(AdapterError::InvalidAddress(address.to_string()));
        }
        let balance: RpcValue<u64> = self.rpc.call("getBalance", json!([address])).await?;
        Ok(U256::from(balance.value))
    }

    async fn token_balance(&self, token: &str, address: &str) -> Result<U256, AdapterError> {
        if self.is_native_token(token) {
            return self.native_balance(address).await;
        }
        if !self.is_valid_address(token) || !self.is_valid_address(address) {
            return Err(AdapterError::InvalidAddress(format!("{token} / {address}")));
        }
        let accounts: RpcValue<Vec<Value>> = self
            .rpc
            .call(
                "getTokenAccountsByOwner",
                json!([address, { "mint": token }, { "encoding": "jsonParsed" }]),
            )
            .await?;
        // 同一 mint 可能分散在多个 token account，逐一累加
        let mut total = U256::ZERO;
        for account in accounts.value {
            let amount = account
                .pointer("/account/data/parsed/info/tokenAmount/amount")
                .and_then(Value::as_str)
                .and_then(|raw| raw.parse::<U256>().ok())
                .unwrap_or(U256::ZERO);
            total += amount;
        }
        Ok(total)
    }

    async fn submit_transaction(&self, signed: &[u8]) -> Result<String, AdapterError> {
        let payload = BASE64.encode(signed);
        let signature: String = self
            .rpc
            .call(
                "sendTransaction",
                json!([payload, { "encoding": "base64" }]),
            )
            .await
            .map_err(|err| match err {
                super::rpc::RpcError::Node { message, .. } => AdapterError::Rejected(message),
                other => AdapterError::Rpc(other),
            })?;
        info!(target: "chain::solana", tx = %signature, "交易已提交");
        Ok(signature)
    }

    async fn wait_for_confirmation(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<(), AdapterError> {
        for _ in 0..self.confirm_poll_attempts {
            let statuses: RpcValue<Vec<Option<Value>>> = self
                .rpc
                .call(
                    "getSignatureStatuses",
                    json!([[hash], { "searchTransactionHistory": true }]),
                )
                .await?;
            if let Some(Some(status)) = statuses.value.first() {
                if status.get("err").map(|err| !err.is_null()).unwrap_or(false) {
                    return Err(AdapterError::Rejected(format!("交易 {hash} 执行失败")));
                }
                let finalized = status
                    .get("confirmationStatus")
                    .and_then(Value::as_str)
                    .map(|state| state == "finalized")
                    .unwrap_or(false);
                let confirmed = status
                    .get("confirmations")
                    .and_then(Value::as_u64)
                    .map(|count| count >= u64::from(confirmations))
                    .unwrap_or(false);
                if finalized || confirmed {
                    return Ok(());
                }
            } else {
                debug!(target: "chain::solana", tx = %hash, "签名尚未可见，继续轮询");
            }
            sleep(self.confirm_poll_interval).await;
        }
        Err(AdapterError::ConfirmationTimeout {
            hash: hash.to_string(),
            confirmations,
        })
    }

    fn is_valid_address(&self, address: &str) -> bool {
        is_solana_address(address)
    }

    fn quote_deadline(&self) -> Duration {
        self.quote_deadline
    }
}

fn is_solana_address(address: &str) -> bool {
    bs58::decode(address)
        .into_vec()
        .map(|bytes| bytes.len() == 32)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base58_pubkeys_validate() {
        assert!(is_solana_address("So11111111111111111111111111111111111111112"));
        assert!(is_solana_address("EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v"));
        assert!(!is_solana_address("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"));
        assert!(!is_solana_address("short"));
        // 合法 base58 但长度不是 32 字节
        assert!(!is_solana_address("abc"));
    }
}
