//! 等级表：用户等级的利润分成率 + 推荐人等级的分成与折扣。
//!
//! 两张表都在进程启动时装载一次，之后全程只读，可被所有并发
//! 请求无锁共享。

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// 用户等级，链上记录，决定协议的利润分成率。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Holder,
    Staker,
    Enterprise,
}

impl Tier {
    pub const ALL: &[Tier] = &[Tier::Free, Tier::Holder, Tier::Staker, Tier::Enterprise];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Holder => "holder",
            Tier::Staker => "staker",
            Tier::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Tier::Free),
            "holder" => Ok(Tier::Holder),
            "staker" => Ok(Tier::Staker),
            "enterprise" => Ok(Tier::Enterprise),
            other => Err(format!("unknown tier: {other}")),
        }
    }
}

/// 各用户等级的利润分成率（基点）。等级越高费率不升。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TierSchedule {
    pub free_bps: u16,
    pub holder_bps: u16,
    pub staker_bps: u16,
    pub enterprise_bps: u16,
}

impl Default for TierSchedule {
    fn default() -> Self {
        Self {
            free_bps: 1_000,
            holder_bps: 800,
            staker_bps: 500,
            enterprise_bps: 300,
        }
    }
}

impl TierSchedule {
    pub fn profit_share_bps(&self, tier: Tier) -> u16 {
        match tier {
            Tier::Free => self.free_bps,
            Tier::Holder => self.holder_bps,
            Tier::Staker => self.staker_bps,
            Tier::Enterprise => self.enterprise_bps,
        }
    }

    /// 费率必须随等级提升单调不升，且不超过 100%。
    pub fn validate(&self) -> Result<(), String> {
        let rates = [
            self.free_bps,
            self.holder_bps,
            self.staker_bps,
            self.enterprise_bps,
        ];
        if rates.iter().any(|bps| *bps > 10_000) {
            return Err("profit share bps must not exceed 10000".to_string());
        }
        if rates.windows(2).any(|pair| pair[1] > pair[0]) {
            return Err("profit share must be non-increasing across tiers".to_string());
        }
        Ok(())
    }
}

/// 推荐人等级，由近 7 日滚动交易量在结算时实时评定。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferralTier {
    Bronze,
    Silver,
    Gold,
    Diamond,
}

impl ReferralTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferralTier::Bronze => "bronze",
            ReferralTier::Silver => "silver",
            ReferralTier::Gold => "gold",
            ReferralTier::Diamond => "diamond",
        }
    }
}

impl fmt::Display for ReferralTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个推荐人等级的门槛与待遇。
#[derive(Debug, Clone, Deserialize)]
pub struct ReferralRule {
    /// 准入该等级所需的近 7 日交易量（计价货币原始单位）。
    pub min_weekly_volume: u128,
    /// 推荐人从手续费中分走的百分比。
    pub referrer_share_percent: u8,
    /// 被推荐人享受的费率折扣百分比。
    pub referee_discount_percent: u8,
}

/// 推荐人等级表，按门槛从低到高排列。
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReferralSchedule {
    pub bronze: ReferralRule,
    pub silver: ReferralRule,
    pub gold: ReferralRule,
    pub diamond: ReferralRule,
}

impl Default for ReferralSchedule {
    fn default() -> Self {
        Self {
            bronze: ReferralRule {
                min_weekly_volume: 0,
                referrer_share_percent: 10,
                referee_discount_percent: 0,
            },
            silver: ReferralRule {
                min_weekly_volume: 10_000_000_000,
                referrer_share_percent: 15,
                referee_discount_percent: 5,
            },
            gold: ReferralRule {
                min_weekly_volume: 100_000_000_000,
                referrer_share_percent: 20,
                referee_discount_percent: 10,
            },
            diamond: ReferralRule {
                min_weekly_volume: 1_000_000_000_000,
                referrer_share_percent: 25,
                referee_discount_percent: 20,
            },
        }
    }
}

impl ReferralSchedule {
    pub fn rule(&self, tier: ReferralTier) -> &ReferralRule {
        match tier {
            ReferralTier::Bronze => &self.bronze,
            ReferralTier::Silver => &self.silver,
            ReferralTier::Gold => &self.gold,
            ReferralTier::Diamond => &self.diamond,
        }
    }

    /// 用推荐人的滚动周交易量评定等级：取满足门槛的最高档。
    pub fn resolve(&self, trailing_weekly_volume: u128) -> ReferralTier {
        let mut resolved = ReferralTier::Bronze;
        for (tier, rule) in [
            (ReferralTier::Silver, &self.silver),
            (ReferralTier::Gold, &self.gold),
            (ReferralTier::Diamond, &self.diamond),
        ] {
            if trailing_weekly_volume >= rule.min_weekly_volume {
                resolved = tier;
            }
        }
        resolved
    }

    pub fn validate(&self) -> Result<(), String> {
        let rules = [&self.bronze, &self.silver, &self.gold, &self.diamond];
        if rules
            .iter()
            .any(|rule| rule.referrer_share_percent > 100 || rule.referee_discount_percent > 100)
        {
            return Err("referral percentages must not exceed 100".to_string());
        }
        if rules
            .windows(2)
            .any(|pair| pair[1].min_weekly_volume < pair[0].min_weekly_volume)
        {
            return Err("referral volume thresholds must be non-decreasing".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_schedule_is_non_increasing() {
        let schedule = TierSchedule::default();
        schedule.validate().expect("valid schedule");
        assert_eq!(schedule.profit_share_bps(Tier::Free), 1_000);
        assert_eq!(schedule.profit_share_bps(Tier::Enterprise), 300);
    }

    #[test]
    fn increasing_schedule_is_rejected() {
        let schedule = TierSchedule {
            free_bps: 300,
            holder_bps: 800,
            ..TierSchedule::default()
        };
        assert!(schedule.validate().is_err());
    }

    #[test]
    fn referral_resolution_respects_thresholds() {
        let schedule = ReferralSchedule::default();
        schedule.validate().expect("valid schedule");
        assert_eq!(schedule.resolve(0), ReferralTier::Bronze);
        assert_eq!(schedule.resolve(9_999_999_999), ReferralTier::Bronze);
        // 门槛值本身即达标
        assert_eq!(schedule.resolve(10_000_000_000), ReferralTier::Silver);
        assert_eq!(schedule.resolve(999_999_999_999), ReferralTier::Gold);
        assert_eq!(schedule.resolve(u128::MAX), ReferralTier::Diamond);
    }

    #[test]
    fn tier_names_round_trip() {
        for tier in Tier::ALL {
            assert_eq!(tier.as_str().parse::<Tier>(), Ok(*tier));
        }
    }
}
