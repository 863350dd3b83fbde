use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::U256;
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::chain::ChainId;
use crate::providers::VenueId;

/// 一次兑换请求的不可变描述，由上层每个用户动作构造一次。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub chain: ChainId,
    /// 输入代币地址，原生代币使用链描述符中的哨兵地址。
    pub input_token: String,
    pub output_token: String,
    /// 原始单位（wei / lamports / shannon 等）的输入数量。
    pub amount_in: U256,
    /// 允许滑点（基点）。
    pub slippage_bps: u16,
    /// 兑换产物的接收地址。
    pub recipient: String,
}

impl SwapRequest {
    pub fn new(
        chain: ChainId,
        input_token: impl Into<String>,
        output_token: impl Into<String>,
        amount_in: U256,
        slippage_bps: u16,
        recipient: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            input_token: input_token.into(),
            output_token: output_token.into(),
            amount_in,
            slippage_bps,
            recipient: recipient.into(),
        }
    }
}

/// 路由中的一跳。percent 表示经过该跳的流量占比，
/// 单个报价方返回的所有跳占比之和应为 100。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteHop {
    pub venue_label: String,
    pub pool: String,
    pub input_token: String,
    pub output_token: String,
    pub percent: u8,
    pub fee_tier_bps: Option<u32>,
}

/// 报价方回传的未签名调用载荷，核心不解析其内容。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallPayload {
    /// 目标合约 / 程序地址。
    pub target: String,
    /// 不透明 calldata，EVM 系为 0x 十六进制，其余链为 base64。
    pub data: String,
    /// 随调用附带的原生代币数量。
    pub value: U256,
}

/// 各报价方响应统一归一后的形态，创建后不再修改。
#[derive(Debug, Clone)]
pub struct NormalizedQuote {
    pub venue: VenueId,
    pub out_amount: U256,
    /// 预估 gas / 计算单元消耗，无法得知时为 0。
    pub gas_estimate: u64,
    /// 价格冲击（百分比），无法得知时为 0。
    pub price_impact_pct: f64,
    pub route: Vec<RouteHop>,
    pub payload: CallPayload,
}

impl NormalizedQuote {
    /// 输出为正才算可用报价，聚合器据此过滤。
    pub fn is_usable(&self) -> bool {
        self.out_amount > U256::ZERO
    }
}

/// 聚合选出的最优报价，单一持有者、单次消费。
#[derive(Debug, Clone)]
pub struct SelectedQuote {
    pub id: Uuid,
    pub request: SwapRequest,
    pub quote: NormalizedQuote,
    /// 按两侧代币精度折算后的成交汇率（输出/输入），
    /// 数值超出可表示范围时为 None。
    pub rate: Option<Decimal>,
    /// 扣除滑点容忍后的最低可接受输出。
    pub min_output: U256,
    /// 报价过期的绝对 Unix 毫秒时间戳。
    pub expires_at_ms: u64,
}

/// 滑点折算：`amount * (10000 - slippage_bps) / 10000`，向下取整。
pub fn apply_slippage(amount: U256, slippage_bps: u16) -> U256 {
    let slippage_bps = slippage_bps.min(10_000);
    let keep = U256::from(10_000u64 - u64::from(slippage_bps));
    amount
        .checked_mul(keep)
        .map(|scaled| scaled / U256::from(10_000u64))
        // 溢出时先除后乘，末位精度让位于安全。
        .unwrap_or_else(|| (amount / U256::from(10_000u64)) * keep)
}

pub fn unix_millis_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

/// 交付给外部签名者的最小未签名交易描述。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain: ChainId,
    pub to: String,
    pub data: String,
    pub value: U256,
}

/// 链上交易哈希 / 签名，格式随链而异，核心按不透明字符串传递。
pub type TxHash = String;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slippage_rounds_down() {
        // 105 * 0.99 = 103.95 -> 103
        assert_eq!(
            apply_slippage(U256::from(105u64), 100),
            U256::from(103u64)
        );
    }

    #[test]
    fn slippage_zero_keeps_amount() {
        assert_eq!(
            apply_slippage(U256::from(1_000u64), 0),
            U256::from(1_000u64)
        );
    }

    #[test]
    fn slippage_full_zeroes_amount() {
        assert_eq!(apply_slippage(U256::from(1_000u64), 10_000), U256::ZERO);
        // 超出 10000 的值按 10000 截断处理
        assert_eq!(apply_slippage(U256::from(1_000u64), u16::MAX), U256::ZERO);
    }

    #[test]
    fn slippage_never_exceeds_input() {
        for bps in [0u16, 1, 50, 100, 9_999, 10_000] {
            let amount = U256::from(987_654_321u64);
            assert!(apply_slippage(amount, bps) <= amount);
        }
    }

    #[test]
    fn slippage_survives_huge_amounts() {
        let amount = U256::MAX;
        let reduced = apply_slippage(amount, 100);
        assert!(reduced < amount);
        assert!(reduced > U256::ZERO);
    }
}
