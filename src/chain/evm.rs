//! EVM 家族适配器：一个实现覆盖所有账户模型的 EVM 兼容链，
//! 具体链由描述符与注入的 RPC 端点区分。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_primitives::{U256, hex};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, info};

use super::rpc::{RpcHttp, parse_hex_quantity};
use super::{AdapterError, ChainAdapter, ChainDescriptor, TokenInfo};
use crate::providers::QuoteProvider;

const SELECTOR_DECIMALS: &str = "0x313ce567";
const SELECTOR_SYMBOL: &str = "0x95d89b41";
const SELECTOR_BALANCE_OF: &str = "0x70a08231";

#[derive(Debug)]
pub struct EvmAdapter {
    descriptor: ChainDescriptor,
    rpc: RpcHttp,
    providers: Vec<Arc<dyn QuoteProvider>>,
    quote_deadline: Duration,
    confirm_poll_interval: Duration,
    confirm_poll_attempts: u32,
    token_cache: DashMap<String, TokenInfo>,
    initialized: AtomicBool,
}

impl EvmAdapter {
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

    async fn eth_call(&self, to: &str, data: String) -> Result<String, AdapterError> {
        let result: String = self
            .rpc
            .call("eth_call", json!([{ "to": to, "data": data }, "latest"]))
            .await?;
        Ok(result)
    }

    async fn fetch_token_info(&self, token: &str) -> Result<TokenInfo, AdapterError> {
        let decimals_raw = self.eth_call(token, SELECTOR_DECIMALS.to_string()).await?;
        let decimals = parse_hex_quantity(&decimals_raw)?;
        // 异常大的 decimals 按 ERC-20 惯例回退到 18
        let decimals = u8::try_from(decimals).unwrap_or(18);

        let symbol = match self.eth_call(token, SELECTOR_SYMBOL.to_string()).await {
            Ok(raw) => decode_abi_string(&raw).unwrap_or_else(|| "UNKNOWN".to_string()),
            Err(err) => {
                debug!(
                    target: "chain::evm",
                    chain = %self.descriptor.chain,
                    token,
                    error = %err,
                    "symbol 查询失败，使用占位符"
                );
                "UNKNOWN".to_string()
            }
        };

        Ok(TokenInfo {
            address: token.to_string(),
            symbol,
            decimals,
        })
    }
}

#[async_trait]
impl ChainAdapter for EvmAdapter {
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
        let reported: String = self
            .rpc
            .call("eth_chainId", json!([]))
            .await
            .map_err(|err| AdapterError::Init {
                chain: self.descriptor.chain,
                reason: err.to_string(),
            })?;
        let reported = parse_hex_quantity(&reported).map_err(|err| AdapterError::Init {
            chain: self.descriptor.chain,
            reason: err.to_string(),
        })?;
        let expected = self.descriptor.chain.evm_chain_id().unwrap_or_default();
        if reported != U256::from(expected) {
            return Err(AdapterError::Init {
                chain: self.descriptor.chain,
                reason: format!("节点 chainId {reported} 与期望 {expected} 不符"),
            });
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            target: "chain::evm",
            chain = %self.descriptor.chain,
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
        let key = token.to_ascii_lowercase();
        if let Some(cached) = self.token_cache.get(&key) {
            return Ok(cached.clone());
        }
        let info = self.fetch_token_info(token).await?;
        self.token_cache.insert(key, info.clone());
        Ok(info)
    }

    async fn native_balance(&self, address: &str) -> Result<U256, AdapterError> {
        if !self.is_valid_address(address) {
            return Err(AdapterError::InvalidAddress(address.to_string()));
        }
        let raw: String = self
            .rpc
            .call("eth_getBalance", json!([address, "latest"]))
            .await?;
        Ok(parse_hex_quantity(&raw)?)
    }

    async fn token_balance(&self, token: &str, address: &str) -> Result<U256, AdapterError> {
        if self.is_native_token(token) {
            return self.native_balance(address).await;
        }
        if !self.is_valid_address(token) || !self.is_valid_address(address) {
            return Err(AdapterError::InvalidAddress(format!("{token} / {address}")));
        }
        let raw = self
            .eth_call(token, balance_of_calldata(address))
            .await?;
        Ok(parse_hex_quantity(&raw)?)
    }

    async fn submit_transaction(&self, signed: &[u8]) -> Result<String, AdapterError> {
        let payload = format!("0x{}", hex::encode(signed));
        let hash: String = self
            .rpc
            .call("eth_sendRawTransaction", json!([payload]))
            .await
            .map_err(|err| match err {
                super::rpc::RpcError::Node { message, .. } => AdapterError::Rejected(message),
                other => AdapterError::Rpc(other),
            })?;
        info!(
            target: "chain::evm",
            chain = %self.descriptor.chain,
            tx = %hash,
            "交易已提交"
        );
        Ok(hash)
    }

    async fn wait_for_confirmation(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<(), AdapterError> {
        for _ in 0..self.confirm_poll_attempts {
            let receipt: Option<Value> = self
                .rpc
                .call("eth_getTransactionReceipt", json!([hash]))
                .await?;
            if let Some(receipt) = receipt {
                if receipt.get("status").and_then(Value::as_str) == Some("0x0") {
                    return Err(AdapterError::Rejected(format!("交易 {hash} 执行失败")));
                }
                let mined_in = receipt
                    .get("blockNumber")
                    .and_then(Value::as_str)
                    .map(parse_hex_quantity)
                    .transpose()?;
                if let Some(mined_in) = mined_in {
                    if confirmations <= 1 {
                        return Ok(());
                    }
                    let head_raw: String = self.rpc.call("eth_blockNumber", json!([])).await?;
                    let head = parse_hex_quantity(&head_raw)?;
                    if head >= mined_in
                        && head - mined_in + U256::from(1u64) >= U256::from(confirmations)
                    {
                        return Ok(());
                    }
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
        is_evm_address(address)
    }

    fn quote_deadline(&self) -> Duration {
        self.quote_deadline
    }
}

fn is_evm_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .map(|digits| digits.len() == 40 && digits.chars().all(|digit| digit.is_ascii_hexdigit()))
        .unwrap_or(false)
}

fn balance_of_calldata(address: &str) -> String {
    let digits = address.strip_prefix("0x").unwrap_or(address);
    format!("{SELECTOR_BALANCE_OF}{:0>64}", digits.to_ascii_lowercase())
}

/// 解码 eth_call 返回的字符串：兼容动态 ABI string 与裸 bytes32。
fn decode_abi_string(raw: &str) -> Option<String> {
    let bytes = hex::decode(raw).ok()?;
    let decoded = if bytes.len() >= 64 {
        let len = usize::try_from(U256::from_be_slice(&bytes[32..64])).ok()?;
        let data = bytes.get(64..64 + len.min(bytes.len().saturating_sub(64)))?;
        String::from_utf8_lossy(data).to_string()
    } else {
        String::from_utf8_lossy(&bytes).to_string()
    };
    let cleaned = decoded.trim_matches(char::from(0)).trim().to_string();
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_validation_requires_prefixed_40_hex() {
        assert!(is_evm_address("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"));
        assert!(is_evm_address("0xA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48"));
        assert!(!is_evm_address("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"));
        assert!(!is_evm_address("0xa0b8"));
        assert!(!is_evm_address("0xzzzz6991c6218b36c1d19d4a2e9eb0ce3606eb48"));
    }

    #[test]
    fn balance_of_calldata_pads_address() {
        let data = balance_of_calldata("0xA0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        assert_eq!(data.len(), 10 + 64);
        assert!(data.starts_with(SELECTOR_BALANCE_OF));
        assert!(data.ends_with("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"));
        assert!(data[10..].starts_with("000000000000000000000000"));
    }

    #[test]
    fn abi_string_decodes_dynamic_form() {
        // offset=0x20, len=4, "USDC"
        let raw = format!(
            "0x{:0>64}{:0>64}{}",
            "20",
            "4",
            format!("{:0<64}", hex::encode("USDC"))
        );
        assert_eq!(decode_abi_string(&raw), Some("USDC".to_string()));
    }

    #[test]
    fn abi_string_decodes_bytes32_form() {
        let raw = format!("0x{:0<64}", hex::encode("MKR"));
        assert_eq!(decode_abi_string(&raw), Some("MKR".to_string()));
    }
}
