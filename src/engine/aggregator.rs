//! 报价聚合：对目标链的所有报价方并发扇出，在统一时间预算内
//! 收集结果并按确定性规则选出最优者。
//!
//! 单轮聚合不做任何重试；调用方想重试就发起新的一轮。

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::chain::{ChainAdapter, ChainRegistry, RegistryError, units};
use crate::monitoring::prometheus_enabled;
use crate::providers::QuoteProvider;

use super::error::{EngineError, EngineResult};
use super::types::{NormalizedQuote, SelectedQuote, SwapRequest, apply_slippage, unix_millis_now};

/// 聚合参数，进程启动时从配置装载一次。
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    /// 报价的固定有效期。
    pub quote_ttl: Duration,
    /// 单轮聚合的总时间预算，包住各报价方自身的请求超时。
    pub deadline: Duration,
}

impl Default for AggregatorSettings {
    fn default() -> Self {
        Self {
            quote_ttl: Duration::from_secs(60),
            deadline: Duration::from_millis(6_000),
        }
    }
}

/// 把一次兑换请求扇出到注册表解析出的链适配器上。
#[derive(Clone)]
pub struct QuoteAggregator {
    registry: Arc<ChainRegistry>,
    settings: AggregatorSettings,
}

impl QuoteAggregator {
    pub fn new(registry: Arc<ChainRegistry>, settings: AggregatorSettings) -> Self {
        Self { registry, settings }
    }

    /// 一轮完整聚合：解析适配器、扇出、选优、升格为 SelectedQuote。
    pub async fn aggregate(&self, request: &SwapRequest) -> EngineResult<SelectedQuote> {
        validate_request(request)?;
        let adapter = match self.registry.adapter(request.chain) {
            Ok(adapter) => adapter,
            Err(RegistryError::Unregistered(chain)) => {
                return Err(EngineError::UnsupportedChain(chain));
            }
            Err(RegistryError::Down(chain, reason)) => {
                return Err(EngineError::ChainDown(chain, reason));
            }
        };
        if !adapter.is_valid_address(&request.recipient) {
            return Err(EngineError::InvalidRequest(format!(
                "recipient {} 不是合法的 {} 地址",
                request.recipient, request.chain
            )));
        }

        let started = Instant::now();
        let results = fan_out(adapter.providers(), request, self.settings.deadline).await;
        let responded = results.len();
        let Some((winner_index, winning)) = select_best(results) else {
            if prometheus_enabled() {
                counter!("magellan_no_liquidity_total", "chain" => request.chain.as_str())
                    .increment(1);
            }
            info!(
                target: "engine::aggregator",
                chain = %request.chain,
                input = %request.input_token,
                output = %request.output_token,
                responded,
                "所有报价方均无可用报价"
            );
            return Err(EngineError::NoLiquidity(request.chain));
        };

        let elapsed_ms = started.elapsed().as_millis() as f64;
        if prometheus_enabled() {
            histogram!("magellan_aggregate_duration_ms").record(elapsed_ms);
            counter!("magellan_quotes_selected_total", "venue" => winning.venue.as_str())
                .increment(1);
        }

        let rate = derive_quote_rate(&adapter, request, &winning).await;
        let selected = promote(request.clone(), winning, rate, self.settings.quote_ttl);
        info!(
            target: "engine::aggregator",
            chain = %request.chain,
            quote_id = %selected.id,
            venue = %selected.quote.venue,
            winner_index,
            responded,
            out_amount = %selected.quote.out_amount,
            min_output = %selected.min_output,
            elapsed_ms,
            "聚合完成，选出最优报价"
        );
        Ok(selected)
    }
}

fn validate_request(request: &SwapRequest) -> EngineResult<()> {
    if request.amount_in == alloy_primitives::U256::ZERO {
        return Err(EngineError::InvalidRequest("输入数量必须为正".to_string()));
    }
    if request
        .input_token
        .eq_ignore_ascii_case(&request.output_token)
    {
        return Err(EngineError::InvalidRequest(
            "输入与输出代币不能相同".to_string(),
        ));
    }
    if request.slippage_bps > 10_000 {
        return Err(EngineError::InvalidRequest(format!(
            "滑点 {} bps 超出上限",
            request.slippage_bps
        )));
    }
    Ok(())
}

/// 并发调用全部报价方，收集在预算内完成的非空结果。
/// 超过预算的任务被协作取消，其结果被静默丢弃。
pub(crate) async fn fan_out(
    providers: &[Arc<dyn QuoteProvider>],
    request: &SwapRequest,
    budget: Duration,
) -> Vec<(usize, NormalizedQuote)> {
    if providers.is_empty() {
        return Vec::new();
    }
    let deadline = Instant::now() + budget;
    let mut join_set = JoinSet::new();
    for (index, provider) in providers.iter().enumerate() {
        let provider = Arc::clone(provider);
        let request = request.clone();
        join_set.spawn(async move { (index, provider.fetch(&request).await) });
    }

    let mut collected = Vec::new();
    loop {
        match timeout_at(deadline, join_set.join_next()).await {
            Ok(Some(Ok((index, Some(quote))))) => collected.push((index, quote)),
            Ok(Some(Ok((_, None)))) => {}
            Ok(Some(Err(join_err))) => {
                warn!(
                    target: "engine::aggregator",
                    error = %join_err,
                    "报价任务异常退出"
                );
            }
            Ok(None) => break,
            Err(_) => {
                let discarded = join_set.len();
                join_set.abort_all();
                debug!(
                    target: "engine::aggregator",
                    discarded,
                    budget_ms = budget.as_millis() as u64,
                    "聚合预算耗尽，丢弃未完成的报价任务"
                );
                break;
            }
        }
    }
    collected
}

/// 确定性选优：输出最大者胜；平局先比 gas 再比注册顺序。
pub(crate) fn select_best(
    results: Vec<(usize, NormalizedQuote)>,
) -> Option<(usize, NormalizedQuote)> {
    let mut best: Option<(usize, NormalizedQuote)> = None;
    for (index, quote) in results {
        if !quote.is_usable() {
            continue;
        }
        let better = match &best {
            None => true,
            Some((best_index, best_quote)) => {
                quote.out_amount > best_quote.out_amount
                    || (quote.out_amount == best_quote.out_amount
                        && (quote.gas_estimate < best_quote.gas_estimate
                            || (quote.gas_estimate == best_quote.gas_estimate
                                && index < *best_index)))
            }
        };
        if better {
            best = Some((index, quote));
        }
    }
    best
}

/// 汇率推导失败不影响聚合结果，只是展示层少一个数字。
async fn derive_quote_rate(
    adapter: &Arc<dyn ChainAdapter>,
    request: &SwapRequest,
    winning: &NormalizedQuote,
) -> Option<rust_decimal::Decimal> {
    let in_decimals = token_decimals(adapter, &request.input_token).await?;
    let out_decimals = token_decimals(adapter, &request.output_token).await?;
    units::derive_rate(
        request.amount_in,
        in_decimals,
        winning.out_amount,
        out_decimals,
    )
}

async fn token_decimals(adapter: &Arc<dyn ChainAdapter>, token: &str) -> Option<u8> {
    if adapter.is_native_token(token) {
        return Some(adapter.descriptor().native_decimals);
    }
    match adapter.token_info(token).await {
        Ok(info) => Some(info.decimals),
        Err(err) => {
            debug!(
                target: "engine::aggregator",
                token,
                error = %err,
                "代币精度查询失败，跳过汇率推导"
            );
            None
        }
    }
}

/// 把胜出报价升格为带身份与有效期的 SelectedQuote。
pub(crate) fn promote(
    request: SwapRequest,
    quote: NormalizedQuote,
    rate: Option<rust_decimal::Decimal>,
    ttl: Duration,
) -> SelectedQuote {
    let min_output = apply_slippage(quote.out_amount, request.slippage_bps);
    SelectedQuote {
        id: Uuid::new_v4(),
        request,
        quote,
        rate,
        min_output,
        expires_at_ms: unix_millis_now() + ttl.as_millis() as u64,
    }
}

#[cfg(test)]
mod tests {
    use alloy_primitives::U256;
    use rust_decimal::Decimal;

    use super::super::testkit::{StaticProvider, test_registry, usdc_quote};
    use super::*;
    use crate::chain::ChainId;
    use crate::providers::VenueId;

    fn sample_request(chain: ChainId) -> SwapRequest {
        SwapRequest::new(
            chain,
            "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            U256::from(1_000_000u64),
            100,
            "0x1111111111111111111111111111111111111111",
        )
    }

    #[tokio::test]
    async fn empty_provider_set_is_no_liquidity() {
        let registry = test_registry(ChainId::Ethereum, vec![]);
        let aggregator = QuoteAggregator::new(registry, AggregatorSettings::default());
        let err = aggregator
            .aggregate(&sample_request(ChainId::Ethereum))
            .await
            .expect_err("expected failure");
        assert!(matches!(err, EngineError::NoLiquidity(ChainId::Ethereum)));
    }

    #[tokio::test]
    async fn unregistered_chain_is_unsupported() {
        let registry = test_registry(ChainId::Ethereum, vec![]);
        let aggregator = QuoteAggregator::new(registry, AggregatorSettings::default());
        let err = aggregator
            .aggregate(&sample_request(ChainId::Bsc))
            .await
            .expect_err("expected failure");
        assert!(matches!(err, EngineError::UnsupportedChain(ChainId::Bsc)));
    }

    #[tokio::test]
    async fn all_absent_providers_mean_no_liquidity() {
        let providers = vec![
            StaticProvider::absent(VenueId::OneInch, ChainId::Ethereum),
            StaticProvider::absent(VenueId::Odos, ChainId::Ethereum),
        ];
        let registry = test_registry(ChainId::Ethereum, providers);
        let aggregator = QuoteAggregator::new(registry, AggregatorSettings::default());
        let err = aggregator
            .aggregate(&sample_request(ChainId::Ethereum))
            .await
            .expect_err("expected failure");
        assert!(matches!(err, EngineError::NoLiquidity(_)));
    }

    #[tokio::test]
    async fn highest_output_wins_and_min_output_is_floored() {
        // 谱写规模化整数 100 / 105 / 103，第二家应当胜出
        let providers = vec![
            StaticProvider::quoting(usdc_quote(VenueId::OneInch, 100, 50_000)),
            StaticProvider::quoting(usdc_quote(VenueId::Odos, 105, 80_000)),
            StaticProvider::quoting(usdc_quote(VenueId::OpenOcean, 103, 20_000)),
        ];
        let registry = test_registry(ChainId::Ethereum, providers);
        let aggregator = QuoteAggregator::new(registry, AggregatorSettings::default());
        let selected = aggregator
            .aggregate(&sample_request(ChainId::Ethereum))
            .await
            .expect("aggregate");
        assert_eq!(selected.quote.venue, VenueId::Odos);
        assert_eq!(selected.quote.out_amount, U256::from(105u64));
        // 105 * 0.99 = 103.95，向下取整
        assert_eq!(selected.min_output, U256::from(103u64));
        assert!(selected.min_output <= selected.quote.out_amount);
    }

    #[tokio::test]
    async fn output_tie_breaks_by_gas_then_registration_order() {
        let providers = vec![
            StaticProvider::quoting(usdc_quote(VenueId::OneInch, 100, 70_000)),
            StaticProvider::quoting(usdc_quote(VenueId::Odos, 100, 30_000)),
        ];
        let registry = test_registry(ChainId::Ethereum, providers);
        let aggregator = QuoteAggregator::new(registry.clone(), AggregatorSettings::default());
        let selected = aggregator
            .aggregate(&sample_request(ChainId::Ethereum))
            .await
            .expect("aggregate");
        assert_eq!(selected.quote.venue, VenueId::Odos);

        // gas 也打平时按注册顺序
        let providers = vec![
            StaticProvider::quoting(usdc_quote(VenueId::OneInch, 100, 30_000)),
            StaticProvider::quoting(usdc_quote(VenueId::Odos, 100, 30_000)),
        ];
        let registry = test_registry(ChainId::Ethereum, providers);
        let aggregator = QuoteAggregator::new(registry, AggregatorSettings::default());
        let selected = aggregator
            .aggregate(&sample_request(ChainId::Ethereum))
            .await
            .expect("aggregate");
        assert_eq!(selected.quote.venue, VenueId::OneInch);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_provider_is_discarded_at_deadline() {
        let providers = vec![
            StaticProvider::quoting(usdc_quote(VenueId::OneInch, 90, 10_000)),
            StaticProvider::delayed(
                usdc_quote(VenueId::Odos, 500, 10_000),
                Duration::from_secs(30),
            ),
        ];
        let registry = test_registry(ChainId::Ethereum, providers);
        let settings = AggregatorSettings {
            quote_ttl: Duration::from_secs(60),
            deadline: Duration::from_secs(5),
        };
        let aggregator = QuoteAggregator::new(registry, settings);
        let selected = aggregator
            .aggregate(&sample_request(ChainId::Ethereum))
            .await
            .expect("aggregate");
        // 迟到的 500 被丢弃，按时完成的 90 胜出
        assert_eq!(selected.quote.venue, VenueId::OneInch);
        assert_eq!(selected.quote.out_amount, U256::from(90u64));
    }

    #[tokio::test]
    async fn rate_uses_token_decimals() {
        // 输入 1.0 (18 位)，输出 2000.0 (6 位)
        let providers = vec![StaticProvider::quoting(usdc_quote(
            VenueId::OneInch,
            2_000_000_000,
            10_000,
        ))];
        let registry = test_registry(ChainId::Ethereum, providers);
        let aggregator = QuoteAggregator::new(registry, AggregatorSettings::default());
        let mut request = sample_request(ChainId::Ethereum);
        request.amount_in = "1000000000000000000".parse().unwrap();
        let selected = aggregator.aggregate(&request).await.expect("aggregate");
        // testkit 的 token_info 统一返回 6 位精度，输入侧 18 位由 mock 决定：
        // 这里两侧都是 6 位 => 1e18/1e6 倍率差体现在汇率上
        assert!(selected.rate.is_some());
        assert!(selected.rate.unwrap() > Decimal::ZERO);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let registry = test_registry(ChainId::Ethereum, vec![]);
        let aggregator = QuoteAggregator::new(registry, AggregatorSettings::default());
        let mut request = sample_request(ChainId::Ethereum);
        request.amount_in = U256::ZERO;
        let err = aggregator.aggregate(&request).await.expect_err("reject");
        assert!(matches!(err, EngineError::InvalidRequest(_)));
    }

    #[test]
    fn select_best_ignores_zero_output() {
        let results = vec![
            (0, usdc_quote(VenueId::OneInch, 0, 10)),
            (1, usdc_quote(VenueId::Odos, 0, 10)),
        ];
        assert!(select_best(results).is_none());
    }

    #[tokio::test]
    async fn adapter_level_get_quote_honors_the_contract() {
        use crate::chain::ChainAdapter;

        let adapter = super::super::testkit::TestAdapter::new(
            ChainId::Ethereum,
            vec![
                StaticProvider::quoting(usdc_quote(VenueId::OneInch, 100, 50_000)),
                StaticProvider::quoting(usdc_quote(VenueId::Odos, 105, 80_000)),
            ],
        );
        let best = adapter
            .get_quote(&sample_request(ChainId::Ethereum))
            .await
            .expect("best quote");
        assert_eq!(best.venue, VenueId::Odos);

        // 链不匹配必须是 UnsupportedChain，而不是空结果
        let err = adapter
            .get_quote(&sample_request(ChainId::Bsc))
            .await
            .expect_err("mismatched chain");
        assert!(matches!(err, EngineError::UnsupportedChain(ChainId::Bsc)));
    }
}
