use chain_btc::network::NetworkParams;

/// Mainnet transparent prefixes: P2PKH 0x1CB8 ("t1"), P2SH 0x1CBD ("t3").
pub const ZCASH_MAINNET: NetworkParams = NetworkParams {
    name: "zcash",
    pubkey_hash_prefixes: &[&[0x1C, 0xB8]],
    script_hash_prefixes: &[&[0x1C, 0xBD]],
    bech32_hrp: None,
};

/// Testnet transparent prefixes: P2PKH 0x1D25 ("tm"), P2SH 0x1CBA ("t2").
pub const ZCASH_TESTNET: NetworkParams = NetworkParams {
    name: "zcash-testnet",
    pubkey_hash_prefixes: &[&[0x1D, 0x25]],
    script_hash_prefixes: &[&[0x1C, 0xBA]],
    bech32_hrp: None,
};

pub const SAPLING_TX_VERSION: u32 = 4;
pub const SAPLING_VERSION_GROUP_ID: u32 = 0x892F_2085;

/// Consensus branch ids committed to by the v4 signature hash.
pub const BRANCH_ID_SAPLING: u32 = 0x76B8_09BB;
pub const BRANCH_ID_BLOSSOM: u32 = 0x2BB4_0E60;
pub const BRANCH_ID_HEARTWOOD: u32 = 0xF5B9_230B;
pub const BRANCH_ID_CANOPY: u32 = 0xE9FF_75A6;
pub const DEFAULT_BRANCH_ID: u32 = BRANCH_ID_BLOSSOM;

/// Expiry heights at or above this are interpreted as timestamps and rejected.
pub const MAX_EXPIRY_HEIGHT: u32 = 499_999_999;

/// Supported Zcash networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZecNetwork {
    Mainnet,
    Testnet,
}

impl ZecNetwork {
    pub fn params(self) -> &'static NetworkParams {
        match self {
            ZecNetwork::Mainnet => &ZCASH_MAINNET,
            ZecNetwork::Testnet => &ZCASH_TESTNET,
        }
    }
}

impl std::fmt::Display for ZecNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZecNetwork::Mainnet => write!(f, "mainnet"),
            ZecNetwork::Testnet => write!(f, "testnet"),
        }
    }
}
