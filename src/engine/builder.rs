//! 未签名交易构建：把选中报价的载荷确定性地转成
//! (目标地址, calldata, 原生数量) 三元组，全程不触网。

use alloy_primitives::U256;
use tracing::debug;

use crate::chain::ChainDescriptor;

use super::error::{EngineError, EngineResult};
use super::types::{SelectedQuote, UnsignedTransaction};

/// 输入为原生代币时 value 取请求的输入数量；否则 value 恒为零，
/// 代币授权是调用方在链上预先完成的外部事务。
pub fn build_unsigned(
    selected: &SelectedQuote,
    descriptor: &ChainDescriptor,
) -> EngineResult<UnsignedTransaction> {
    let payload = &selected.quote.payload;
    if payload.target.is_empty() {
        return Err(EngineError::InvalidRequest(format!(
            "报价 {} 的载荷缺少目标地址",
            selected.id
        )));
    }

    let native_input = descriptor.is_native(&selected.request.input_token);
    let value = if native_input {
        if payload.value != selected.request.amount_in {
            debug!(
                target: "engine::builder",
                quote_id = %selected.id,
                payload_value = %payload.value,
                amount_in = %selected.request.amount_in,
                "载荷 value 与请求输入不一致，以请求为准"
            );
        }
        selected.request.amount_in
    } else {
        if payload.value != U256::ZERO {
            debug!(
                target: "engine::builder",
                quote_id = %selected.id,
                payload_value = %payload.value,
                "非原生输入的载荷带有 value，已归零"
            );
        }
        U256::ZERO
    };

    Ok(UnsignedTransaction {
        chain: selected.request.chain,
        to: payload.target.clone(),
        data: payload.data.clone(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::aggregator::promote;
    use super::super::testkit::usdc_quote;
    use super::super::types::{SwapRequest, apply_slippage};
    use super::*;
    use crate::chain::descriptor::EVM_NATIVE_SENTINEL;
    use crate::chain::{ChainId, builtin_descriptor};
    use crate::providers::VenueId;

    fn selected_with_input(input_token: &str) -> SelectedQuote {
        let request = SwapRequest::new(
            ChainId::Ethereum,
            input_token,
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
            U256::from(750_000u64),
            100,
            "0x1111111111111111111111111111111111111111",
        );
        promote(
            request,
            usdc_quote(VenueId::OneInch, 105, 10_000),
            None,
            Duration::from_secs(60),
        )
    }

    #[test]
    fn native_input_attaches_request_amount() {
        let selected = selected_with_input(EVM_NATIVE_SENTINEL);
        let descriptor = builtin_descriptor(ChainId::Ethereum);
        let tx = build_unsigned(&selected, &descriptor).expect("build");
        assert_eq!(tx.value, U256::from(750_000u64));
        assert_eq!(tx.to, "0xrouter");
        assert_eq!(tx.data, "0xdeadbeef");
        assert_eq!(tx.chain, ChainId::Ethereum);
    }

    #[test]
    fn token_input_has_zero_value() {
        let mut selected = selected_with_input("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
        // 上游误带 value 也必须被归零
        selected.quote.payload.value = U256::from(1u64);
        let descriptor = builtin_descriptor(ChainId::Ethereum);
        let tx = build_unsigned(&selected, &descriptor).expect("build");
        assert_eq!(tx.value, U256::ZERO);
    }

    #[test]
    fn missing_target_is_rejected() {
        let mut selected = selected_with_input(EVM_NATIVE_SENTINEL);
        selected.quote.payload.target.clear();
        let descriptor = builtin_descriptor(ChainId::Ethereum);
        assert!(build_unsigned(&selected, &descriptor).is_err());
    }

    #[test]
    fn min_output_rederives_identically() {
        // 从存量字段独立重推 minOutput，必须与选择时写入的值一致
        let selected = selected_with_input(EVM_NATIVE_SENTINEL);
        let descriptor = builtin_descriptor(ChainId::Ethereum);
        let _tx = build_unsigned(&selected, &descriptor).expect("build");
        let rederived = apply_slippage(selected.quote.out_amount, selected.request.slippage_bps);
        assert_eq!(rederived, selected.min_output);
    }
}
