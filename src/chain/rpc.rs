//! 面向各链节点的最小 JSON-RPC 2.0 客户端。
//!
//! 客户端句柄由启动流程显式构造后注入适配器，不依赖任何全局状态。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, trace};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("RPC 网络请求失败: {0}")]
    Http(#[from] reqwest::Error),
    #[error("RPC {endpoint} 返回错误 {code}: {message}")]
    Node {
        endpoint: String,
        code: i64,
        message: String,
    },
    #[error("RPC 响应结构异常: {0}")]
    Schema(String),
}

/// 绑定单个节点端点的 JSON-RPC 客户端。
#[derive(Debug, Clone)]
pub struct RpcHttp {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
    next_id: Arc<AtomicU64>,
}

impl RpcHttp {
    pub fn new(client: reqwest::Client, endpoint: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            timeout,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub async fn call<P, R>(&self, method: &str, params: P) -> Result<R, RpcError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        trace!(target: "chain::rpc", endpoint = %self.endpoint, method, id, "发起 RPC 请求");

        let response = self
            .client
            .post(&self.endpoint)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let envelope: Value = response.json().await?;
        if let Some(error) = envelope.get("error").filter(|error| !error.is_null()) {
            let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error")
                .to_string();
            debug!(target: "chain::rpc", endpoint = %self.endpoint, method, code, %message, "节点返回错误");
            return Err(RpcError::Node {
                endpoint: self.endpoint.clone(),
                code,
                message,
            });
        }

        let result = envelope
            .get("result")
            .cloned()
            .ok_or_else(|| RpcError::Schema(format!("{method} response missing result")))?;
        serde_json::from_value(result)
            .map_err(|err| RpcError::Schema(format!("{method} result: {err}")))
    }
}

/// 解析 `0x` 前缀的十六进制数量字段（EVM 惯例）。
pub fn parse_hex_quantity(raw: &str) -> Result<alloy_primitives::U256, RpcError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    if digits.is_empty() {
        return Ok(alloy_primitives::U256::ZERO);
    }
    alloy_primitives::U256::from_str_radix(digits, 16)
        .map_err(|err| RpcError::Schema(format!("invalid hex quantity {raw}: {err}")))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;

    use super::*;

    #[test]
    fn hex_quantity_parses_with_and_without_prefix() {
        assert_eq!(parse_hex_quantity("0x0").unwrap(), U256::ZERO);
        assert_eq!(parse_hex_quantity("0x10").unwrap(), U256::from(16u64));
        assert_eq!(parse_hex_quantity("ff").unwrap(), U256::from(255u64));
        assert_eq!(parse_hex_quantity("0x").unwrap(), U256::ZERO);
    }

    #[test]
    fn hex_quantity_rejects_garbage() {
        assert!(parse_hex_quantity("0xzz").is_err());
    }
}
