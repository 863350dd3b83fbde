//! 费用与等级：利润分成、推荐人奖励与等级评定。

pub mod engine;
pub mod tiers;

pub use engine::{FeeBreakdown, FeeEngine, FeeResult, InMemoryDirectory, UserDirectory, compute_fee};
pub use tiers::{ReferralRule, ReferralSchedule, ReferralTier, Tier, TierSchedule};
