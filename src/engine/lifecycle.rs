//! 报价生命周期管理。
//!
//! 状态机：`Active -> Confirmed | Expired | Cancelled`，三个终态。
//! 确认只能发生在有效期内的 Active 记录上，且每条报价恰好被消费
//! 一次；过期后不自动续期，调用方必须重新聚合。

use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::{EngineError, EngineResult};
use super::types::SelectedQuote;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteState {
    Active,
    Confirmed,
    Expired,
    Cancelled,
}

#[derive(Debug)]
struct QuoteRecord {
    selected: SelectedQuote,
    state: QuoteState,
    expires_at: Instant,
}

/// 进程内的报价保管箱。记录单一持有者语义由上层保证，这里只
/// 负责状态转移的原子性。
#[derive(Debug)]
pub struct QuoteVault {
    records: DashMap<Uuid, QuoteRecord>,
    ttl: Duration,
}

impl QuoteVault {
    pub fn new(ttl: Duration) -> Self {
        Self {
            records: DashMap::new(),
            ttl,
        }
    }

    /// 登记一条刚选出的报价，返回其身份。
    pub fn admit(&self, selected: SelectedQuote) -> Uuid {
        let id = selected.id;
        let expires_at = Instant::now() + self.ttl;
        self.records.insert(
            id,
            QuoteRecord {
                selected,
                state: QuoteState::Active,
                expires_at,
            },
        );
        debug!(
            target: "engine::lifecycle",
            quote_id = %id,
            ttl_ms = self.ttl.as_millis() as u64,
            "报价已登记"
        );
        id
    }

    /// 读取报价与当前状态，不触发任何状态转移。
    pub fn peek(&self, id: &Uuid) -> Option<(SelectedQuote, QuoteState)> {
        self.records
            .get(id)
            .map(|record| (record.selected.clone(), record.state))
    }

    /// 确认消费一条报价。超过有效期的 Active 记录在此处被判定
    /// 为 Expired 并返回对应错误。
    pub fn confirm(&self, id: &Uuid) -> EngineResult<SelectedQuote> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or(EngineError::QuoteNotFound(*id))?;
        match record.state {
            QuoteState::Confirmed => Err(EngineError::QuoteAlreadyConsumed(*id)),
            QuoteState::Expired => Err(EngineError::QuoteExpired(*id)),
            QuoteState::Cancelled => Err(EngineError::QuoteCancelled(*id)),
            QuoteState::Active => {
                if Instant::now() >= record.expires_at {
                    record.state = QuoteState::Expired;
                    info!(
                        target: "engine::lifecycle",
                        quote_id = %id,
                        "确认时报价已过期"
                    );
                    return Err(EngineError::QuoteExpired(*id));
                }
                record.state = QuoteState::Confirmed;
                info!(target: "engine::lifecycle", quote_id = %id, "报价已确认");
                Ok(record.selected.clone())
            }
        }
    }

    /// 显式放弃一条报价。重复取消是幂等的。
    pub fn cancel(&self, id: &Uuid) -> EngineResult<()> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or(EngineError::QuoteNotFound(*id))?;
        match record.state {
            QuoteState::Cancelled => Ok(()),
            QuoteState::Confirmed => Err(EngineError::QuoteAlreadyConsumed(*id)),
            QuoteState::Expired => Err(EngineError::QuoteExpired(*id)),
            QuoteState::Active => {
                record.state = QuoteState::Cancelled;
                info!(target: "engine::lifecycle", quote_id = %id, "报价已取消");
                Ok(())
            }
        }
    }

    /// 清理有效期已过的记录（含终态墓碑），返回清除数量。
    /// 清理后再确认同一身份会得到 QuoteNotFound。
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.records.len();
        self.records.retain(|_, record| now < record.expires_at);
        let purged = before.saturating_sub(self.records.len());
        if purged > 0 {
            debug!(target: "engine::lifecycle", purged, "清理过期报价");
        }
        purged
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
