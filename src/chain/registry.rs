//! 链注册表：链标识 -> 适配器实例与健康状态。

use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use super::ChainAdapter;
use super::id::ChainId;
use crate::providers::VenueId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainHealth {
    Up,
    Down(String),
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("链 {0} 未注册")]
    Unregistered(ChainId),
    #[error("链 {0} 不可用: {1}")]
    Down(ChainId, String),
}

#[derive(Debug, Clone)]
pub struct ChainHealthEntry {
    pub chain: ChainId,
    pub health: ChainHealth,
    pub venues: Vec<VenueId>,
}

struct RegistryEntry {
    adapter: Arc<dyn ChainAdapter>,
    health: ChainHealth,
}

/// 进程级注册表：启动时注册一次，之后所有请求并发只读。
#[derive(Default)]
pub struct ChainRegistry {
    entries: DashMap<ChainId, RegistryEntry>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// 注册即视为可用；真正的健康状态由 initialize_all 裁定。
    pub fn register(&self, adapter: Arc<dyn ChainAdapter>) {
        let chain = adapter.chain();
        if self
            .entries
            .insert(
                chain,
                RegistryEntry {
                    adapter,
                    health: ChainHealth::Up,
                },
            )
            .is_some()
        {
            warn!(target: "chain::registry", %chain, "重复注册，旧适配器被替换");
        }
    }

    /// 解析请求链的适配器；未注册与不可用是两类不同的失败。
    pub fn adapter(&self, chain: ChainId) -> Result<Arc<dyn ChainAdapter>, RegistryError> {
        let entry = self
            .entries
            .get(&chain)
            .ok_or(RegistryError::Unregistered(chain))?;
        match &entry.health {
            ChainHealth::Up => Ok(Arc::clone(&entry.adapter)),
            ChainHealth::Down(reason) => Err(RegistryError::Down(chain, reason.clone())),
        }
    }

    pub fn chains(&self) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = self.entries.iter().map(|entry| *entry.key()).collect();
        chains.sort();
        chains
    }

    /// 并发初始化所有适配器。单链失败只把该链标记为不可用，
    /// 其余链继续服务。
    pub async fn initialize_all(&self) {
        let mut join_set = JoinSet::new();
        for entry in self.entries.iter() {
            let chain = *entry.key();
            let adapter = Arc::clone(&entry.adapter);
            join_set.spawn(async move { (chain, adapter.initialize().await) });
        }

        while let Some(joined) = join_set.join_next().await {
            let (chain, result) = match joined {
                Ok(pair) => pair,
                Err(join_err) => {
                    error!(target: "chain::registry", error = %join_err, "初始化任务异常退出");
                    continue;
                }
            };
            match result {
                Ok(()) => {
                    info!(target: "chain::registry", %chain, "适配器初始化完成");
                    self.set_health(chain, ChainHealth::Up);
                }
                Err(err) => {
                    error!(
                        target: "chain::registry",
                        %chain,
                        error = %err,
                        "适配器初始化失败，该链标记为不可用"
                    );
                    self.set_health(chain, ChainHealth::Down(err.to_string()));
                }
            }
        }
    }

    pub async fn shutdown_all(&self) {
        let adapters: Vec<Arc<dyn ChainAdapter>> = self
            .entries
            .iter()
            .map(|entry| Arc::clone(&entry.adapter))
            .collect();
        for adapter in adapters {
            adapter.shutdown().await;
        }
    }

    pub fn set_health(&self, chain: ChainId, health: ChainHealth) {
        if let Some(mut entry) = self.entries.get_mut(&chain) {
            entry.health = health;
        }
    }

    pub fn health_report(&self) -> Vec<ChainHealthEntry> {
        let mut report: Vec<ChainHealthEntry> = self
            .entries
            .iter()
            .map(|entry| ChainHealthEntry {
                chain: *entry.key(),
                health: entry.health.clone(),
                venues: entry
                    .adapter
                    .providers()
                    .iter()
                    .map(|provider| provider.venue())
                    .collect(),
            })
            .collect();
        report.sort_by_key(|entry| entry.chain);
        report
    }
}

impl std::fmt::Debug for ChainRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainRegistry")
            .field("chains", &self.chains())
            .finish()
    }
}
