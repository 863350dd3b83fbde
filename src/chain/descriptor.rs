use super::id::ChainId;

/// EVM 链惯用的原生代币哨兵地址。
pub const EVM_NATIVE_SENTINEL: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";
/// Solana 上以 wSOL mint 代表原生 SOL。
pub const SOLANA_NATIVE_SENTINEL: &str = "So11111111111111111111111111111111111111112";
pub const SUI_NATIVE_SENTINEL: &str = "0x2::sui::SUI";
/// CKB 原生容量没有 type script，约定用全零哈希表示。
pub const CKB_NATIVE_SENTINEL: &str =
    "0x0000000000000000000000000000000000000000000000000000000000000000";

/// 链的静态描述：哨兵地址、包装原生代币、浏览器模板等，
/// 进程启动时装载一次，之后只读。
#[derive(Debug, Clone)]
pub struct ChainDescriptor {
    pub chain: ChainId,
    pub native_symbol: &'static str,
    pub native_decimals: u8,
    /// 请求中代表原生代币的哨兵地址。
    pub native_sentinel: &'static str,
    /// 包装原生代币（WETH / wSOL 等）的地址。
    pub wrapped_native: &'static str,
    /// `{hash}` 占位的浏览器交易链接模板。
    pub explorer_tx_template: &'static str,
    /// 未在配置中覆盖时使用的公共 RPC 端点。
    pub default_rpc_url: &'static str,
}

impl ChainDescriptor {
    pub fn tx_url(&self, hash: &str) -> String {
        self.explorer_tx_template.replace("{hash}", hash)
    }

    pub fn is_native(&self, token: &str) -> bool {
        token.eq_ignore_ascii_case(self.native_sentinel)
    }
}

/// 内置链描述表。配置可以覆盖 RPC 端点，其余字段固定。
pub fn builtin_descriptor(chain: ChainId) -> ChainDescriptor {
    match chain {
        ChainId::Ethereum => evm_descriptor(
            chain,
            "ETH",
            "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
            "https://etherscan.io/tx/{hash}",
            "https://eth.llamarpc.com",
        ),
        ChainId::Bsc => evm_descriptor(
            chain,
            "BNB",
            "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c",
            "https://bscscan.com/tx/{hash}",
            "https://binance.llamarpc.com",
        ),
        ChainId::Polygon => evm_descriptor(
            chain,
            "POL",
            "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270",
            "https://polygonscan.com/tx/{hash}",
            "https://polygon-rpc.com",
        ),
        ChainId::Arbitrum => evm_descriptor(
            chain,
            "ETH",
            "0x82af49447d8a07e3bd95bd0d56f35241523fbab1",
            "https://arbiscan.io/tx/{hash}",
            "https://arb1.arbitrum.io/rpc",
        ),
        ChainId::Optimism => evm_descriptor(
            chain,
            "ETH",
            "0x4200000000000000000000000000000000000006",
            "https://optimistic.etherscan.io/tx/{hash}",
            "https://mainnet.optimism.io",
        ),
        ChainId::Base => evm_descriptor(
            chain,
            "ETH",
            "0x4200000000000000000000000000000000000006",
            "https://basescan.org/tx/{hash}",
            "https://mainnet.base.org",
        ),
        ChainId::Avalanche => evm_descriptor(
            chain,
            "AVAX",
            "0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7",
            "https://snowtrace.io/tx/{hash}",
            "https://api.avax.network/ext/bc/C/rpc",
        ),
        ChainId::Fantom => evm_descriptor(
            chain,
            "FTM",
            "0x21be370d5312f44cb42ce377bc9b8a0cef1a4c83",
            "https://ftmscan.com/tx/{hash}",
            "https://rpc.ftm.tools",
        ),
        ChainId::Linea => evm_descriptor(
            chain,
            "ETH",
            "0xe5d7c2a44ffddf6b295a15c148167daaaf5cf34f",
            "https://lineascan.build/tx/{hash}",
            "https://rpc.linea.build",
        ),
        ChainId::Scroll => evm_descriptor(
            chain,
            "ETH",
            "0x5300000000000000000000000000000000000004",
            "https://scrollscan.com/tx/{hash}",
            "https://rpc.scroll.io",
        ),
        ChainId::Solana => ChainDescriptor {
            chain,
            native_symbol: "SOL",
            native_decimals: 9,
            native_sentinel: SOLANA_NATIVE_SENTINEL,
            wrapped_native: SOLANA_NATIVE_SENTINEL,
            explorer_tx_template: "https://solscan.io/tx/{hash}",
            default_rpc_url: "https://api.mainnet-beta.solana.com",
        },
        ChainId::Sui => ChainDescriptor {
            chain,
            native_symbol: "SUI",
            native_decimals: 9,
            native_sentinel: SUI_NATIVE_SENTINEL,
            wrapped_native: SUI_NATIVE_SENTINEL,
            explorer_tx_template: "https://suiscan.xyz/mainnet/tx/{hash}",
            default_rpc_url: "https://fullnode.mainnet.sui.io",
        },
        ChainId::Ckb => ChainDescriptor {
            chain,
            native_symbol: "CKB",
            native_decimals: 8,
            native_sentinel: CKB_NATIVE_SENTINEL,
            wrapped_native: CKB_NATIVE_SENTINEL,
            explorer_tx_template: "https://explorer.nervos.org/transaction/{hash}",
            default_rpc_url: "https://mainnet.ckb.dev/rpc",
        },
    }
}

fn evm_descriptor(
    chain: ChainId,
    symbol: &'static str,
    wrapped: &'static str,
    explorer: &'static str,
    rpc: &'static str,
) -> ChainDescriptor {
    ChainDescriptor {
        chain,
        native_symbol: symbol,
        native_decimals: 18,
        native_sentinel: EVM_NATIVE_SENTINEL,
        wrapped_native: wrapped,
        explorer_tx_template: explorer,
        default_rpc_url: rpc,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_chain_has_a_descriptor() {
        for chain in ChainId::ALL {
            let descriptor = builtin_descriptor(*chain);
            assert_eq!(descriptor.chain, *chain);
            assert!(descriptor.explorer_tx_template.contains("{hash}"));
            assert!(!descriptor.default_rpc_url.is_empty());
        }
    }

    #[test]
    fn tx_url_substitutes_hash() {
        let descriptor = builtin_descriptor(ChainId::Ethereum);
        assert_eq!(
            descriptor.tx_url("0xabc"),
            "https://etherscan.io/tx/0xabc"
        );
    }

    #[test]
    fn native_sentinel_matches_case_insensitively() {
        let descriptor = builtin_descriptor(ChainId::Ethereum);
        assert!(descriptor.is_native("0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE"));
        assert!(!descriptor.is_native(descriptor.wrapped_native));
    }
}
