use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// 链家族，决定使用哪种适配器实现。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChainKind {
    /// 账户模型的 EVM 兼容链。
    Evm,
    /// 账户模型、ed25519 签名的 Solana。
    Solana,
    /// 对象模型的 Sui。
    Sui,
    /// UTXO / Cell 模型的 CKB。
    Ckb,
}

/// 支持的链标识，注册表据此路由请求。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainId {
    Ethereum,
    Bsc,
    Polygon,
    Arbitrum,
    Optimism,
    Base,
    Avalanche,
    Fantom,
    Linea,
    Scroll,
    Solana,
    Sui,
    Ckb,
}

impl ChainId {
    pub const ALL: &[ChainId] = &[
        ChainId::Ethereum,
        ChainId::Bsc,
        ChainId::Polygon,
        ChainId::Arbitrum,
        ChainId::Optimism,
        ChainId::Base,
        ChainId::Avalanche,
        ChainId::Fantom,
        ChainId::Linea,
        ChainId::Scroll,
        ChainId::Solana,
        ChainId::Sui,
        ChainId::Ckb,
    ];

    pub fn kind(&self) -> ChainKind {
        match self {
            ChainId::Solana => ChainKind::Solana,
            ChainId::Sui => ChainKind::Sui,
            ChainId::Ckb => ChainKind::Ckb,
            _ => ChainKind::Evm,
        }
    }

    /// 配置与日志中使用的小写名称。
    pub fn as_str(&self) -> &'static str {
        match self {
            ChainId::Ethereum => "ethereum",
            ChainId::Bsc => "bsc",
            ChainId::Polygon => "polygon",
            ChainId::Arbitrum => "arbitrum",
            ChainId::Optimism => "optimism",
            ChainId::Base => "base",
            ChainId::Avalanche => "avalanche",
            ChainId::Fantom => "fantom",
            ChainId::Linea => "linea",
            ChainId::Scroll => "scroll",
            ChainId::Solana => "solana",
            ChainId::Sui => "sui",
            ChainId::Ckb => "ckb",
        }
    }

    /// EVM 家族链的数字 chain id，非 EVM 链返回 None。
    pub fn evm_chain_id(&self) -> Option<u64> {
        match self {
            ChainId::Ethereum => Some(1),
            ChainId::Bsc => Some(56),
            ChainId::Polygon => Some(137),
            ChainId::Arbitrum => Some(42_161),
            ChainId::Optimism => Some(10),
            ChainId::Base => Some(8_453),
            ChainId::Avalanche => Some(43_114),
            ChainId::Fantom => Some(250),
            ChainId::Linea => Some(59_144),
            ChainId::Scroll => Some(534_352),
            _ => None,
        }
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChainId {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        ChainId::ALL
            .iter()
            .copied()
            .find(|chain| chain.as_str() == normalized)
            .ok_or_else(|| format!("unknown chain: {raw}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_chain() {
        for chain in ChainId::ALL {
            let parsed: ChainId = chain.as_str().parse().expect("parse chain name");
            assert_eq!(parsed, *chain);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!("Ethereum".parse::<ChainId>(), Ok(ChainId::Ethereum));
        assert_eq!(" SOLANA ".parse::<ChainId>(), Ok(ChainId::Solana));
    }

    #[test]
    fn rejects_unknown_chain() {
        assert!("near".parse::<ChainId>().is_err());
    }

    #[test]
    fn evm_ids_only_for_evm_family() {
        assert_eq!(ChainId::Ethereum.evm_chain_id(), Some(1));
        assert_eq!(ChainId::Base.evm_chain_id(), Some(8_453));
        assert_eq!(ChainId::Solana.evm_chain_id(), None);
        assert_eq!(ChainId::Ckb.evm_chain_id(), None);
    }
}
