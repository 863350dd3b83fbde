use thiserror::Error;
use uuid::Uuid;

use crate::chain::{AdapterError, ChainId};

#[derive(Debug, Error)]
pub enum EngineError {
    /// 请求指向未注册的链，属于调用方错误。
    #[error("不支持的链: {0}")]
    UnsupportedChain(ChainId),
    /// 该链的适配器初始化失败后被标记为不可用，其余链不受影响。
    #[error("链 {0} 当前不可用: {1}")]
    ChainDown(ChainId, String),
    /// 所有报价方都未能给出正输出的报价。
    #[error("{0} 上没有可用流动性")]
    NoLiquidity(ChainId),
    #[error("报价 {0} 不存在")]
    QuoteNotFound(Uuid),
    /// 报价超过有效期，调用方需要重新发起聚合。
    #[error("报价 {0} 已过期")]
    QuoteExpired(Uuid),
    /// 每个报价只允许被确认一次。
    #[error("报价 {0} 已被消费")]
    QuoteAlreadyConsumed(Uuid),
    /// 持有者显式放弃过的报价不能再确认。
    #[error("报价 {0} 已被取消")]
    QuoteCancelled(Uuid),
    #[error("非法请求: {0}")]
    InvalidRequest(String),
    #[error("链适配器调用失败: {0}")]
    Adapter(#[from] AdapterError),
    #[error("配置缺失或非法: {0}")]
    InvalidConfig(String),
}

pub type EngineResult<T> = Result<T, EngineError>;
