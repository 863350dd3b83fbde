//! CKB 适配器：UTXO/Cell 模型。余额是锁脚本名下 cell 的容量
//! 之和，代币余额是携带目标 type script 的 cell 数据之和。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy_primitives::{U256, hex};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::time::sleep;
use tracing::{debug, info};

use super::rpc::{RpcHttp, parse_hex_quantity};
use super::{AdapterError, ChainAdapter, ChainDescriptor, TokenInfo};
use crate::providers::QuoteProvider;

#[derive(Debug)]
pub struct CkbAdapter {
    descriptor: ChainDescriptor,
    rpc: RpcHttp,
    providers: Vec<Arc<dyn QuoteProvider>>,
    quote_deadline: Duration,
    confirm_poll_interval: Duration,
    confirm_poll_attempts: u32,
    initialized: AtomicBool,
}

impl CkbAdapter {
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
            initialized: AtomicBool::new(false),
        }
    }
}

/// CKB script 的 JSON 形态（RPC 与配置通用）。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub code_hash: String,
    pub hash_type: String,
    pub args: String,
}

#[async_trait]
impl ChainAdapter for CkbAdapter {
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
        let info: Value = self
            .rpc
            .call("get_blockchain_info", json!([]))
            .await
            .map_err(|err| AdapterError::Init {
                chain: self.descriptor.chain,
                reason: err.to_string(),
            })?;
        let chain = info.get("chain").and_then(Value::as_str).unwrap_or("");
        if chain != "ckb" {
            return Err(AdapterError::Init {
                chain: self.descriptor.chain,
                reason: format!("节点网络 {chain} 不是 ckb 主网"),
            });
        }
        self.initialized.store(true, Ordering::SeqCst);
        info!(
            target: "chain::ckb",
            endpoint = self.rpc.endpoint(),
            "适配器初始化完成"
        );
        Ok(())
    }

    async fn shutdown(&self) {
        self.initialized.store(false, Ordering::SeqCst);
    }

    async fn token_info(&self, token: &str) -> Result<TokenInfo, AdapterError> {
        if self.is_native_token(token) {
            return Ok(TokenInfo {
                address: self.descriptor.native_sentinel.to_string(),
                symbol: self.descriptor.native_symbol.to_string(),
                decimals: self.descriptor.native_decimals,
            });
        }
        // UDT 元数据在链下登记，链上只有 type script；精度按惯例 8
        Ok(TokenInfo {
            address: token.to_string(),
            symbol: "UDT".to_string(),
            decimals: 8,
        })
    }

    async fn native_balance(&self, address: &str) -> Result<U256, AdapterError> {
        let lock = lock_script_of(address)
            .ok_or_else(|| AdapterError::InvalidAddress(address.to_string()))?;
        let response: Value = self
            .rpc
            .call(
                "get_cells_capacity",
                json!([{ "script": lock, "script_type": "lock" }]),
            )
            .await?;
        let capacity = response
            .get("capacity")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::Rpc(super::rpc::RpcError::Schema(
                    "get_cells_capacity response missing capacity".to_string(),
                ))
            })?;
        Ok(parse_hex_quantity(capacity)?)
    }

    async fn token_balance(&self, token: &str, address: &str) -> Result<U256, AdapterError> {
        if self.is_native_token(token) {
            return self.native_balance(address).await;
        }
        let lock = lock_script_of(address)
            .ok_or_else(|| AdapterError::InvalidAddress(address.to_string()))?;
        // 代币以完整 type script 的 JSON 编码指定
        let type_script: Script = serde_json::from_str(token).map_err(|err| {
            AdapterError::InvalidAddress(format!("期望 type script JSON: {err}"))
        })?;

        let mut total: u128 = 0;
        let mut cursor: Option<String> = None;
        loop {
            let mut params = json!([
                {
                    "script": lock,
                    "script_type": "lock",
                    "filter": { "script": type_script }
                },
                "asc",
                "0x64"
            ]);
            if let Some(after) = &cursor {
                if let Some(array) = params.as_array_mut() {
                    array.push(json!(after));
                }
            }
            let page: Value = self.rpc.call("get_cells", params).await?;
            let objects = page
                .get("objects")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            if objects.is_empty() {
                break;
            }
            for cell in &objects {
                let data = cell.get("output_data").and_then(Value::as_str).unwrap_or("0x");
                total = total.saturating_add(parse_udt_amount(data));
            }
            cursor = page
                .get("last_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() {
                break;
            }
        }
        Ok(U256::from(total))
    }

    async fn submit_transaction(&self, signed: &[u8]) -> Result<String, AdapterError> {
        let transaction: Value = serde_json::from_slice(signed).map_err(|err| {
            AdapterError::MalformedPayload(format!("期望 CKB 交易 JSON: {err}"))
        })?;
        let hash: String = self
            .rpc
            .call("send_transaction", json!([transaction, "passthrough"]))
            .await
            .map_err(|err| match err {
                super::rpc::RpcError::Node { message, .. } => AdapterError::Rejected(message),
                other => AdapterError::Rpc(other),
            })?;
        info!(target: "chain::ckb", tx = %hash, "交易已提交");
        Ok(hash)
    }

    async fn wait_for_confirmation(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<(), AdapterError> {
        for _ in 0..self.confirm_poll_attempts {
            let wrapped: Value = self.rpc.call("get_transaction", json!([hash])).await?;
            let status = wrapped
                .pointer("/tx_status/status")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            match status {
                "rejected" => {
                    let reason = wrapped
                        .pointer("/tx_status/reason")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown");
                    return Err(AdapterError::Rejected(format!(
                        "交易 {hash} 被拒绝: {reason}"
                    )));
                }
                "committed" => {
                    if confirmations <= 1 {
                        return Ok(());
                    }
                    let mined_in = wrapped
                        .pointer("/tx_status/block_number")
                        .and_then(Value::as_str)
                        .map(parse_hex_quantity)
                        .transpose()?;
                    let Some(mined_in) = mined_in else {
                        return Ok(());
                    };
                    let tip_raw: String =
                        self.rpc.call("get_tip_block_number", json!([])).await?;
                    let tip = parse_hex_quantity(&tip_raw)?;
                    if tip >= mined_in
                        && tip - mined_in + U256::from(1u64) >= U256::from(confirmations)
                    {
                        return Ok(());
                    }
                }
                other => {
                    debug!(target: "chain::ckb", tx = %hash, status = other, "等待交易上链");
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
        lock_script_of(address).is_some()
    }

    fn quote_deadline(&self) -> Duration {
        self.quote_deadline
    }
}

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// 解码 bech32m 数据段为字节。只校验字符集与分组完整性，
/// checksum 校验留给产生地址的一侧。
fn bech32_payload(data_part: &str) -> Option<Vec<u8>> {
    if data_part.len() <= 6 {
        return None;
    }
    let values: Vec<u8> = data_part
        .chars()
        .map(|symbol| BECH32_CHARSET.find(symbol).map(|index| index as u8))
        .collect::<Option<Vec<u8>>>()?;
    // 末尾 6 个符号是 checksum
    let values = &values[..values.len() - 6];

    let mut bytes = Vec::with_capacity(values.len() * 5 / 8);
    let mut buffer: u32 = 0;
    let mut bits = 0u32;
    for value in values {
        buffer = (buffer << 5) | u32::from(*value);
        bits += 5;
        if bits >= 8 {
            bits -= 8;
            bytes.push((buffer >> bits) as u8);
        }
    }
    Some(bytes)
}

/// 从主网地址还原锁脚本。只接受 full 格式（payload 以 0x00 开头）。
fn lock_script_of(address: &str) -> Option<Script> {
    let lowered = address.to_ascii_lowercase();
    if lowered != address && address.to_ascii_uppercase() != address {
        // bech32 禁止大小写混写
        return None;
    }
    let rest = lowered.strip_prefix("ckb1")?;
    let payload = bech32_payload(rest)?;
    if payload.len() < 34 || payload[0] != 0x00 {
        return None;
    }
    let code_hash = format!("0x{}", hex::encode(&payload[1..33]));
    let hash_type = match payload[33] {
        0 => "data",
        1 => "type",
        2 => "data1",
        4 => "data2",
        _ => return None,
    };
    let args = format!("0x{}", hex::encode(&payload[34..]));
    Some(Script {
        code_hash,
        hash_type: hash_type.to_string(),
        args,
    })
}

/// xUDT/sUDT 金额：cell data 的前 16 字节，小端 u128。
fn parse_udt_amount(output_data: &str) -> u128 {
    let Ok(bytes) = hex::decode(output_data) else {
        return 0;
    };
    if bytes.len() < 16 {
        return 0;
    }
    let mut amount = [0u8; 16];
    amount.copy_from_slice(&bytes[..16]);
    u128::from_le_bytes(amount)
}

#[cfg(test)]
mod tests {
    use super::*;

    // 主网 secp256k1_blake160 full 地址
    const FULL_ADDRESS: &str =
        "ckb1qzda0cr08m85hc8jlnfp3zer7xulejywt49kt2rr0vthywaa50xwsqdnnw7qkdnnclfkg59uzn8umtfd2kwxceqxwquc4";

    #[test]
    fn full_address_decodes_to_lock_script() {
        let script = lock_script_of(FULL_ADDRESS).expect("decode");
        assert_eq!(
            script.code_hash,
            "0x9bd7e06f3ecf4be0f2fcd2188b23f1b9fcc88e5d4b65a8637b17723bbda3cce8"
        );
        assert_eq!(script.hash_type, "type");
        assert!(script.args.starts_with("0x"));
        // blake160 args = 20 字节
        assert_eq!(script.args.len(), 2 + 40);
    }

    #[test]
    fn invalid_addresses_are_rejected() {
        assert!(lock_script_of("ckb1").is_none());
        assert!(lock_script_of("ckt1qzda0cr08m85hc8jlnfp3zer7xulejywt49kt2rr0vthywaa50xws").is_none());
        assert!(lock_script_of("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_none());
        // 含非法字符（b 不在 bech32 字符集）
        assert!(lock_script_of("ckb1bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb").is_none());
    }

    #[test]
    fn udt_amount_is_little_endian_u128() {
        let mut data = [0u8; 16];
        data[0] = 0x40;
        data[1] = 0x42;
        data[2] = 0x0f; // 1_000_000
        let encoded = format!("0x{}", hex::encode(data));
        assert_eq!(parse_udt_amount(&encoded), 1_000_000);
        assert_eq!(parse_udt_amount("0x"), 0);
        assert_eq!(parse_udt_amount("0x1234"), 0);
    }
}
