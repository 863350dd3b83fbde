//! 链适配层：统一能力契约 + 各链家族的具体实现。
//!
//! 聚合与费用逻辑只面向 [`ChainAdapter`] 编程，新增链通过实现
//! 该契约接入，而不是在聚合器里加分支。

pub mod ckb;
pub mod descriptor;
pub mod evm;
pub mod id;
pub mod registry;
pub mod rpc;
pub mod solana;
pub mod sui;
pub mod units;

use std::fmt;
use std::sync::Arc;

use alloy_primitives::U256;
use async_trait::async_trait;
use thiserror::Error;

pub use ckb::CkbAdapter;
pub use descriptor::{ChainDescriptor, builtin_descriptor};
pub use evm::EvmAdapter;
pub use id::{ChainId, ChainKind};
pub use registry::{ChainHealth, ChainRegistry, RegistryError};
pub use rpc::{RpcError, RpcHttp};
pub use solana::SolanaAdapter;
pub use sui::SuiAdapter;

use crate::engine::types::{NormalizedQuote, SelectedQuote, SwapRequest, TxHash, UnsignedTransaction};
use crate::providers::QuoteProvider;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("链 {chain} 初始化失败: {reason}")]
    Init { chain: ChainId, reason: String },
    #[error("节点通信失败: {0}")]
    Rpc(#[from] RpcError),
    #[error("地址非法: {0}")]
    InvalidAddress(String),
    #[error("数量解析失败: {0}")]
    ParseAmount(String),
    #[error("签名交易载荷非法: {0}")]
    MalformedPayload(String),
    #[error("交易 {hash} 等待 {confirmations} 个确认超时")]
    ConfirmationTimeout { hash: String, confirmations: u32 },
    #[error("交易被节点拒绝: {0}")]
    Rejected(String),
    #[error("该链不支持此操作: {0}")]
    Unsupported(String),
}

/// 代币元数据，适配器负责查询并缓存。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

/// 单链能力契约：生命周期、代币与余额查询、报价、交易
/// 构建 / 提交 / 确认、地址校验与单位换算。
#[async_trait]
pub trait ChainAdapter: Send + Sync + fmt::Debug {
    fn descriptor(&self) -> &ChainDescriptor;

    /// 本链注册的报价方，注册顺序即聚合平局时的优先顺序。
    fn providers(&self) -> &[Arc<dyn QuoteProvider>];

    /// 幂等建立网络客户端；失败只影响本链。
    async fn initialize(&self) -> Result<(), AdapterError>;

    /// 幂等释放资源，之后可重新 initialize。
    async fn shutdown(&self);

    async fn token_info(&self, token: &str) -> Result<TokenInfo, AdapterError>;

    async fn native_balance(&self, address: &str) -> Result<U256, AdapterError>;

    async fn token_balance(&self, token: &str, address: &str) -> Result<U256, AdapterError>;

    /// 提交外部签名者产出的交易字节，返回链上哈希。
    async fn submit_transaction(&self, signed: &[u8]) -> Result<TxHash, AdapterError>;

    /// 轮询等待指定确认数，超出轮询预算返回 ConfirmationTimeout。
    async fn wait_for_confirmation(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<(), AdapterError>;

    /// 纯函数地址校验，无 I/O。
    fn is_valid_address(&self, address: &str) -> bool;

    fn chain(&self) -> ChainId {
        self.descriptor().chain
    }

    /// 请求中的代币是否为本链原生哨兵。
    fn is_native_token(&self, token: &str) -> bool {
        self.descriptor().is_native(token)
    }

    fn format_units(&self, amount: U256, decimals: u8) -> String {
        units::format_units(amount, decimals)
    }

    fn parse_units(&self, text: &str, decimals: u8) -> Result<U256, AdapterError> {
        units::parse_units(text, decimals).map_err(AdapterError::ParseAmount)
    }

    /// 对本链所有报价方做一轮并发聚合，返回最优归一化报价。
    /// 普通的上游不可用一律折叠为 NoLiquidity，不向上抛异常。
    async fn get_quote(
        &self,
        request: &SwapRequest,
    ) -> Result<NormalizedQuote, crate::engine::EngineError> {
        if request.chain != self.chain() {
            return Err(crate::engine::EngineError::UnsupportedChain(request.chain));
        }
        let results = crate::engine::aggregator::fan_out(
            self.providers(),
            request,
            self.quote_deadline(),
        )
        .await;
        crate::engine::aggregator::select_best(results)
            .map(|(_, quote)| quote)
            .ok_or(crate::engine::EngineError::NoLiquidity(request.chain))
    }

    /// 单次聚合的总时间预算，包住每个报价方自身的请求超时。
    fn quote_deadline(&self) -> std::time::Duration;

    /// 将选中报价转换为未签名交易描述，纯透传，不触网。
    fn build_swap_transaction(
        &self,
        selected: &SelectedQuote,
    ) -> Result<UnsignedTransaction, crate::engine::EngineError> {
        crate::engine::builder::build_unsigned(selected, self.descriptor())
    }
}
