//! 测试专用的注入式报价方与链适配器，聚合相关测试不触网。

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::U256;
use async_trait::async_trait;

use crate::chain::{
    AdapterError, ChainAdapter, ChainDescriptor, ChainId, ChainRegistry, TokenInfo,
    builtin_descriptor,
};
use crate::providers::{QuoteProvider, VenueId};

use super::types::{CallPayload, NormalizedQuote, RouteHop, SwapRequest, TxHash};

/// 构造一条固定输出的归一化报价（单跳，USDC 风格 6 位精度输出）。
pub(crate) fn usdc_quote(venue: VenueId, out_amount: u64, gas_estimate: u64) -> NormalizedQuote {
    NormalizedQuote {
        venue,
        out_amount: U256::from(out_amount),
        gas_estimate,
        price_impact_pct: 0.0,
        route: vec![RouteHop {
            venue_label: venue.as_str().to_string(),
            pool: "0xpool".to_string(),
            input_token: "0xin".to_string(),
            output_token: "0xout".to_string(),
            percent: 100,
            fee_tier_bps: None,
        }],
        payload: CallPayload {
            target: "0xrouter".to_string(),
            data: "0xdeadbeef".to_string(),
            value: U256::ZERO,
        },
    }
}

/// 行为完全由构造时注入的报价方。
#[derive(Debug)]
pub(crate) struct StaticProvider {
    venue: VenueId,
    chain: ChainId,
    delay: Option<Duration>,
    quote: Option<NormalizedQuote>,
}

impl StaticProvider {
    /// 立即返回给定报价（默认挂在 Ethereum 上）。
    pub(crate) fn quoting(quote: NormalizedQuote) -> Arc<dyn QuoteProvider> {
        Arc::new(Self {
            venue: quote.venue,
            chain: ChainId::Ethereum,
            delay: None,
            quote: Some(quote),
        })
    }

    /// 永远缺席的报价方。
    pub(crate) fn absent(venue: VenueId, chain: ChainId) -> Arc<dyn QuoteProvider> {
        Arc::new(Self {
            venue,
            chain,
            delay: None,
            quote: None,
        })
    }

    /// 先休眠再给报价，用于验证预算截止后的静默丢弃。
    pub(crate) fn delayed(quote: NormalizedQuote, delay: Duration) -> Arc<dyn QuoteProvider> {
        Arc::new(Self {
            venue: quote.venue,
            chain: ChainId::Ethereum,
            delay: Some(delay),
            quote: Some(quote),
        })
    }
}

#[async_trait]
impl QuoteProvider for StaticProvider {
    fn venue(&self) -> VenueId {
        self.venue
    }

    fn chain(&self) -> ChainId {
        self.chain
    }

    async fn fetch(&self, request: &SwapRequest) -> Option<NormalizedQuote> {
        if request.chain != self.chain {
            return None;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.quote.clone()
    }
}

/// 不触网的链适配器替身：余额与提交都不支持，代币统一 6 位精度。
#[derive(Debug)]
pub(crate) struct TestAdapter {
    descriptor: ChainDescriptor,
    providers: Vec<Arc<dyn QuoteProvider>>,
}

impl TestAdapter {
    pub(crate) fn new(chain: ChainId, providers: Vec<Arc<dyn QuoteProvider>>) -> Self {
        Self {
            descriptor: builtin_descriptor(chain),
            providers,
        }
    }
}

#[async_trait]
impl ChainAdapter for TestAdapter {
    fn descriptor(&self) -> &ChainDescriptor {
        &self.descriptor
    }

    fn providers(&self) -> &[Arc<dyn QuoteProvider>] {
        &self.providers
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn shutdown(&self) {}

    async fn token_info(&self, token: &str) -> Result<TokenInfo, AdapterError> {
        Ok(TokenInfo {
            address: token.to_string(),
            symbol: "USDC".to_string(),
            decimals: 6,
        })
    }

    async fn native_balance(&self, _address: &str) -> Result<U256, AdapterError> {
        Err(AdapterError::Unsupported("test adapter".to_string()))
    }

    async fn token_balance(&self, _token: &str, _address: &str) -> Result<U256, AdapterError> {
        Err(AdapterError::Unsupported("test adapter".to_string()))
    }

    async fn submit_transaction(&self, _signed: &[u8]) -> Result<TxHash, AdapterError> {
        Err(AdapterError::Unsupported("test adapter".to_string()))
    }

    async fn wait_for_confirmation(
        &self,
        hash: &str,
        confirmations: u32,
    ) -> Result<(), AdapterError> {
        let _ = (hash, confirmations);
        Ok(())
    }

    fn is_valid_address(&self, address: &str) -> bool {
        !address.is_empty()
    }

    fn quote_deadline(&self) -> Duration {
        Duration::from_secs(5)
    }
}

/// 单链注册表，适配器即 [`TestAdapter`]。
pub(crate) fn test_registry(
    chain: ChainId,
    providers: Vec<Arc<dyn QuoteProvider>>,
) -> Arc<ChainRegistry> {
    let registry = ChainRegistry::new();
    registry.register(Arc::new(TestAdapter::new(chain, providers)));
    Arc::new(registry)
}
