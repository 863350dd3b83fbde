//! 引擎门面：聚合、生命周期、交易构建与费用计算的组装点。
//!
//! 外部 REST / WebSocket / 机器人层只通过 [`SwapEngine`] 的三个
//! 入口交互：`get_quote`、`confirm_quote`、`compute_fee`。

pub mod aggregator;
pub mod builder;
pub mod error;
pub mod lifecycle;
#[cfg(test)]
pub(crate) mod testkit;
pub mod types;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use uuid::Uuid;

pub use aggregator::{AggregatorSettings, QuoteAggregator};
pub use error::{EngineError, EngineResult};
pub use lifecycle::{QuoteState, QuoteVault};
pub use types::{
    CallPayload, NormalizedQuote, RouteHop, SelectedQuote, SwapRequest, TxHash,
    UnsignedTransaction,
};

use crate::chain::registry::ChainHealthEntry;
use crate::chain::{
    ChainAdapter, ChainId, ChainKind, ChainRegistry, CkbAdapter, EvmAdapter, RegistryError,
    RpcHttp, SolanaAdapter, SuiAdapter, builtin_descriptor,
};
use crate::config::MagellanConfig;
use crate::fees::{FeeBreakdown, FeeEngine, UserDirectory};
use crate::providers::{
    CetusProvider, DflowProvider, JupiterProvider, OdosProvider, OneInchProvider,
    OpenOceanProvider, QuoteProvider, UtxoSwapProvider, VenueId,
};

pub struct SwapEngine {
    registry: Arc<ChainRegistry>,
    aggregator: QuoteAggregator,
    vault: QuoteVault,
    fees: FeeEngine,
}

impl SwapEngine {
    pub fn new(registry: Arc<ChainRegistry>, settings: AggregatorSettings, fees: FeeEngine) -> Self {
        let vault = QuoteVault::new(settings.quote_ttl);
        let aggregator = QuoteAggregator::new(Arc::clone(&registry), settings);
        Self {
            registry,
            aggregator,
            vault,
            fees,
        }
    }

    /// 聚合一轮报价并登记生命周期，返回带身份与有效期的结果。
    pub async fn get_quote(&self, request: &SwapRequest) -> EngineResult<SelectedQuote> {
        let selected = self.aggregator.aggregate(request).await?;
        self.vault.admit(selected.clone());
        Ok(selected)
    }

    /// 在有效期内确认报价，换取未签名交易描述。
    pub async fn confirm_quote(&self, id: &Uuid) -> EngineResult<UnsignedTransaction> {
        let selected = self.vault.confirm(id)?;
        let adapter = self.resolve_adapter(selected.request.chain)?;
        adapter.build_swap_transaction(&selected)
    }

    pub fn cancel_quote(&self, id: &Uuid) -> EngineResult<()> {
        self.vault.cancel(id)
    }

    pub fn quote_state(&self, id: &Uuid) -> Option<QuoteState> {
        self.vault.peek(id).map(|(_, state)| state)
    }

    /// 结算一笔已实现利润的费用拆分。
    pub async fn compute_fee(&self, user: &str, profit: i128) -> FeeBreakdown {
        self.fees.compute_fee_for_user(user, profit).await
    }

    pub fn health_report(&self) -> Vec<ChainHealthEntry> {
        self.registry.health_report()
    }

    pub fn purge_expired_quotes(&self) -> usize {
        self.vault.purge_expired()
    }

    /// 幂等释放全部链适配器的网络资源。
    pub async fn shutdown(&self) {
        self.registry.shutdown_all().await;
    }

    pub fn registry(&self) -> &Arc<ChainRegistry> {
        &self.registry
    }

    fn resolve_adapter(&self, chain: ChainId) -> EngineResult<Arc<dyn ChainAdapter>> {
        match self.registry.adapter(chain) {
            Ok(adapter) => Ok(adapter),
            Err(RegistryError::Unregistered(chain)) => Err(EngineError::UnsupportedChain(chain)),
            Err(RegistryError::Down(chain, reason)) => Err(EngineError::ChainDown(chain, reason)),
        }
    }
}

/// 按配置组装整个引擎：共享 HTTP 客户端、各链适配器与报价方、
/// 注册表与费用引擎。适配器初始化在此完成，单链失败不阻断启动。
pub async fn bootstrap(
    config: &MagellanConfig,
    directory: Arc<dyn UserDirectory>,
) -> EngineResult<SwapEngine> {
    config
        .validate()
        .map_err(EngineError::InvalidConfig)?;

    // 进程内唯一的 HTTP 客户端，显式注入各适配器与报价方
    let client = reqwest::Client::builder()
        .user_agent(concat!("magellan/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(Duration::from_secs(5))
        .build()
        .map_err(|err| EngineError::InvalidConfig(format!("http client: {err}")))?;

    let registry = Arc::new(ChainRegistry::new());
    for chain in config.enabled_chains() {
        let adapter = build_adapter(chain, config, &client);
        registry.register(adapter);
    }
    registry.initialize_all().await;

    for entry in registry.health_report() {
        info!(
            target: "engine",
            chain = %entry.chain,
            health = ?entry.health,
            venues = entry.venues.len(),
            "链注册完成"
        );
    }

    let settings = AggregatorSettings {
        quote_ttl: config.quote.ttl(),
        deadline: config.quote.aggregate_deadline(),
    };
    let fees = FeeEngine::new(
        directory,
        config.fees.tiers.clone(),
        config.fees.referrals.clone(),
    );
    Ok(SwapEngine::new(registry, settings, fees))
}

fn build_adapter(
    chain: ChainId,
    config: &MagellanConfig,
    client: &reqwest::Client,
) -> Arc<dyn ChainAdapter> {
    let descriptor = builtin_descriptor(chain);
    let settings = config.chain_settings(chain);
    let rpc_url = settings
        .rpc_url
        .clone()
        .unwrap_or_else(|| descriptor.default_rpc_url.to_string());
    let rpc = RpcHttp::new(client.clone(), rpc_url, config.quote.rpc_timeout());

    let providers: Vec<Arc<dyn QuoteProvider>> = config
        .venues_for(chain)
        .into_iter()
        .map(|venue| build_provider(venue, chain, config, client))
        .collect();

    let deadline = config.quote.aggregate_deadline();
    let poll_interval = config.quote.confirm_poll_interval();
    let poll_attempts = config.quote.confirm_poll_attempts;
    match chain.kind() {
        ChainKind::Evm => Arc::new(EvmAdapter::new(
            descriptor,
            rpc,
            providers,
            deadline,
            poll_interval,
            poll_attempts,
        )),
        ChainKind::Solana => Arc::new(SolanaAdapter::new(
            descriptor,
            rpc,
            providers,
            deadline,
            poll_interval,
            poll_attempts,
        )),
        ChainKind::Sui => Arc::new(SuiAdapter::new(
            descriptor,
            rpc,
            providers,
            deadline,
            poll_interval,
            poll_attempts,
        )),
        ChainKind::Ckb => Arc::new(CkbAdapter::new(
            descriptor,
            rpc,
            providers,
            deadline,
            poll_interval,
            poll_attempts,
        )),
    }
}

fn build_provider(
    venue: VenueId,
    chain: ChainId,
    config: &MagellanConfig,
    client: &reqwest::Client,
) -> Arc<dyn QuoteProvider> {
    let timeout = config.quote.provider_timeout();
    let endpoints = &config.venues;
    match venue {
        VenueId::OneInch => Arc::new(OneInchProvider::new(
            client.clone(),
            chain,
            endpoints.oneinch_base_url.clone(),
            endpoints.oneinch_api_key.clone(),
            timeout,
        )),
        VenueId::Odos => Arc::new(OdosProvider::new(
            client.clone(),
            chain,
            endpoints.odos_base_url.clone(),
            timeout,
        )),
        VenueId::OpenOcean => Arc::new(OpenOceanProvider::new(
            client.clone(),
            chain,
            endpoints.openocean_base_url.clone(),
            timeout,
        )),
        VenueId::Jupiter => Arc::new(JupiterProvider::new(
            client.clone(),
            endpoints.jupiter_base_url.clone(),
            timeout,
        )),
        VenueId::Dflow => Arc::new(DflowProvider::new(
            client.clone(),
            endpoints.dflow_base_url.clone(),
            timeout,
        )),
        VenueId::Cetus => Arc::new(CetusProvider::new(
            client.clone(),
            endpoints.cetus_base_url.clone(),
            timeout,
        )),
        VenueId::UtxoSwap => Arc::new(UtxoSwapProvider::new(
            client.clone(),
            endpoints.utxoswap_base_url.clone(),
            timeout,
        )),
    }
}
