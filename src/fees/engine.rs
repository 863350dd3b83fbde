//! 费用计算：只在交易盈利时收费，推荐人奖励从协议分成中划出，
//! 不额外加收。全部为整数运算，同样输入必然得到同样输出。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::tiers::{ReferralSchedule, ReferralTier, Tier, TierSchedule};

/// 一笔已实现利润的费用拆分结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeeResult {
    /// 协议收取的总费用。
    pub fee: u128,
    /// 用户到手的净利润，亏损时等于利润本身。
    pub net_profit: i128,
    /// 推荐人奖励，从 fee 中划出。
    pub referral_reward: u128,
    /// 协议实际留存 = fee - referral_reward。
    pub protocol_take: u128,
}

impl FeeResult {
    fn no_fee(profit: i128) -> Self {
        Self {
            fee: 0,
            net_profit: profit,
            referral_reward: 0,
            protocol_take: 0,
        }
    }
}

/// 纯函数费用计算。
///
/// `profit <= 0` 时分文不取；否则 `fee = profit * bps / 10000`
/// 向下取整，恒有 `fee + net_profit == profit` 与 `fee <= profit`。
pub fn compute_fee(
    profit: i128,
    profit_share_bps: u16,
    referrer_share_percent: Option<u8>,
) -> FeeResult {
    if profit <= 0 {
        return FeeResult::no_fee(profit);
    }
    let gross = profit as u128;
    let bps = u128::from(profit_share_bps.min(10_000));
    let fee = gross
        .checked_mul(bps)
        .map(|scaled| scaled / 10_000)
        // 接近上限的利润先除后乘，末位精度让位于安全
        .unwrap_or_else(|| gross / 10_000 * bps);
    let referral_reward = match referrer_share_percent {
        Some(percent) => {
            let percent = u128::from(percent.min(100));
            fee.checked_mul(percent)
                .map(|scaled| scaled / 100)
                .unwrap_or_else(|| fee / 100 * percent)
        }
        None => 0,
    };
    FeeResult {
        fee,
        net_profit: profit - fee as i128,
        referral_reward,
        protocol_take: fee - referral_reward,
    }
}

/// 用户目录协作方：等级、推荐关系与滚动交易量都由外部存储给出。
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// 用户当前的链上记录等级，未知用户按 Free 计。
    async fn tier_of(&self, user: &str) -> Tier;

    async fn referrer_of(&self, user: &str) -> Option<String>;

    /// 近 `days` 日滚动交易量（计价货币原始单位）。
    async fn trailing_volume(&self, user: &str, days: u32) -> u128;
}

/// 一笔结算的完整评定：用了哪个等级、推荐人落在哪一档。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeBreakdown {
    pub tier: Tier,
    pub effective_bps: u16,
    pub referral_tier: Option<ReferralTier>,
    pub result: FeeResult,
}

/// 费用引擎：等级表进程内只读，用户状态每次结算时现查。
#[derive(Clone)]
pub struct FeeEngine {
    directory: Arc<dyn UserDirectory>,
    tiers: TierSchedule,
    referrals: ReferralSchedule,
}

impl FeeEngine {
    pub fn new(
        directory: Arc<dyn UserDirectory>,
        tiers: TierSchedule,
        referrals: ReferralSchedule,
    ) -> Self {
        Self {
            directory,
            tiers,
            referrals,
        }
    }

    /// 按用户当前等级与推荐关系结算一笔已实现利润。
    /// 推荐人等级以其近 7 日交易量在此刻评定，不冻结在绑定时点。
    pub async fn compute_fee_for_user(&self, user: &str, profit: i128) -> FeeBreakdown {
        let tier = self.directory.tier_of(user).await;
        let base_bps = self.tiers.profit_share_bps(tier);

        let referral = match self.directory.referrer_of(user).await {
            Some(referrer) => {
                let volume = self.directory.trailing_volume(&referrer, 7).await;
                let referral_tier = self.referrals.resolve(volume);
                debug!(
                    target: "fees::engine",
                    user,
                    referrer = %referrer,
                    volume,
                    referral_tier = %referral_tier,
                    "推荐人等级评定完成"
                );
                Some(referral_tier)
            }
            None => None,
        };

        // 被推荐人的折扣体现在有效费率上，推荐奖励再从费用中划出
        let effective_bps = match referral {
            Some(tier_ref) => {
                let discount = u32::from(self.referrals.rule(tier_ref).referee_discount_percent);
                let bps = u32::from(base_bps);
                (bps - bps * discount / 100) as u16
            }
            None => base_bps,
        };
        let referrer_share =
            referral.map(|tier_ref| self.referrals.rule(tier_ref).referrer_share_percent);

        let result = compute_fee(profit, effective_bps, referrer_share);
        FeeBreakdown {
            tier,
            effective_bps,
            referral_tier: referral,
            result,
        }
    }

    pub fn tiers(&self) -> &TierSchedule {
        &self.tiers
    }

    pub fn referrals(&self) -> &ReferralSchedule {
        &self.referrals
    }
}

/// 进程内目录实现，测试与 CLI 演算使用。
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    tiers: HashMap<String, Tier>,
    referrers: HashMap<String, String>,
    volumes: HashMap<String, u128>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tier(mut self, user: &str, tier: Tier) -> Self {
        self.tiers.insert(user.to_string(), tier);
        self
    }

    pub fn with_referrer(mut self, user: &str, referrer: &str) -> Self {
        self.referrers.insert(user.to_string(), referrer.to_string());
        self
    }

    pub fn with_volume(mut self, user: &str, volume: u128) -> Self {
        self.volumes.insert(user.to_string(), volume);
        self
    }
}

#[async_trait]
impl UserDirectory for InMemoryDirectory {
    async fn tier_of(&self, user: &str) -> Tier {
        self.tiers.get(user).copied().unwrap_or(Tier::Free)
    }

    async fn referrer_of(&self, user: &str) -> Option<String> {
        self.referrers.get(user).cloned()
    }

    async fn trailing_volume(&self, user: &str, _days: u32) -> u128 {
        self.volumes.get(user).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn losses_and_breakeven_pay_nothing() {
        for profit in [0i128, -1, -1_000_000] {
            let result = compute_fee(profit, 1_000, Some(25));
            assert_eq!(result.fee, 0);
            assert_eq!(result.net_profit, profit);
            assert_eq!(result.referral_reward, 0);
            assert_eq!(result.protocol_take, 0);
        }
    }

    #[test]
    fn scenario_ten_percent_no_referral() {
        let result = compute_fee(1_000, 1_000, None);
        assert_eq!(result.fee, 100);
        assert_eq!(result.net_profit, 900);
        assert_eq!(result.referral_reward, 0);
        assert_eq!(result.protocol_take, 100);
    }

    #[test]
    fn scenario_referral_carves_reward_out_of_fee() {
        // 推荐人分成 25%：奖励 25，协议留存 75，用户净利不变
        let result = compute_fee(1_000, 1_000, Some(25));
        assert_eq!(result.fee, 100);
        assert_eq!(result.net_profit, 900);
        assert_eq!(result.referral_reward, 25);
        assert_eq!(result.protocol_take, 75);
    }

    #[test]
    fn fee_plus_net_always_equals_profit() {
        for profit in [1i128, 7, 999, 1_000, 12_345, 987_654_321] {
            for bps in [0u16, 1, 300, 500, 1_000, 9_999, 10_000] {
                let result = compute_fee(profit, bps, Some(33));
                assert_eq!(result.fee as i128 + result.net_profit, profit);
                assert!(result.fee as i128 <= profit);
                assert_eq!(result.protocol_take + result.referral_reward, result.fee);
            }
        }
    }

    #[test]
    fn computing_twice_yields_identical_results() {
        let first = compute_fee(54_321, 800, Some(20));
        let second = compute_fee(54_321, 800, Some(20));
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn engine_resolves_tier_and_referral_at_settlement() {
        let directory = InMemoryDirectory::new()
            .with_tier("alice", Tier::Holder)
            .with_referrer("alice", "bob")
            .with_volume("bob", 1_000_000_000_000);
        let engine = FeeEngine::new(
            Arc::new(directory),
            TierSchedule::default(),
            ReferralSchedule::default(),
        );

        let breakdown = engine.compute_fee_for_user("alice", 10_000).await;
        assert_eq!(breakdown.tier, Tier::Holder);
        assert_eq!(breakdown.referral_tier, Some(ReferralTier::Diamond));
        // Holder 800 bps，钻石档被推荐折扣 20% => 640 bps
        assert_eq!(breakdown.effective_bps, 640);
        assert_eq!(breakdown.result.fee, 640);
        assert_eq!(breakdown.result.net_profit, 9_360);
        // 钻石档推荐人分走 25%
        assert_eq!(breakdown.result.referral_reward, 160);
        assert_eq!(breakdown.result.protocol_take, 480);
    }

    #[tokio::test]
    async fn unknown_user_defaults_to_free_tier() {
        let engine = FeeEngine::new(
            Arc::new(InMemoryDirectory::new()),
            TierSchedule::default(),
            ReferralSchedule::default(),
        );
        let breakdown = engine.compute_fee_for_user("nobody", 1_000).await;
        assert_eq!(breakdown.tier, Tier::Free);
        assert_eq!(breakdown.referral_tier, None);
        assert_eq!(breakdown.result.fee, 100);
    }
}
