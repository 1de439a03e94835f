/// Address discriminators for one network.
///
/// Prefix lists allow a network to accept several version bytes for the same
/// address class (Litecoin still accepts the Bitcoin P2SH byte). The first
/// entry of each list is used when encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkParams {
    pub name: &'static str,
    pub pubkey_hash_prefixes: &'static [&'static [u8]],
    pub script_hash_prefixes: &'static [&'static [u8]],
    /// Bech32 human-readable part. `None` disables segwit addresses.
    pub bech32_hrp: Option<&'static str>,
}

impl NetworkParams {
    pub fn pubkey_hash_prefix(&self) -> &'static [u8] {
        self.pubkey_hash_prefixes.first().copied().unwrap_or(&[])
    }

    pub fn script_hash_prefix(&self) -> &'static [u8] {
        self.script_hash_prefixes.first().copied().unwrap_or(&[])
    }
}

pub const BITCOIN_MAINNET: NetworkParams = NetworkParams {
    name: "bitcoin",
    pubkey_hash_prefixes: &[&[0x00]],
    script_hash_prefixes: &[&[0x05]],
    bech32_hrp: Some("bc"),
};

pub const BITCOIN_TESTNET: NetworkParams = NetworkParams {
    name: "bitcoin-testnet",
    pubkey_hash_prefixes: &[&[0x6f]],
    script_hash_prefixes: &[&[0xc4]],
    bech32_hrp: Some("tb"),
};

pub const BITCOIN_REGTEST: NetworkParams = NetworkParams {
    name: "bitcoin-regtest",
    pubkey_hash_prefixes: &[&[0x6f]],
    script_hash_prefixes: &[&[0xc4]],
    bech32_hrp: Some("bcrt"),
};

pub const LITECOIN_MAINNET: NetworkParams = NetworkParams {
    name: "litecoin",
    pubkey_hash_prefixes: &[&[0x30]],
    script_hash_prefixes: &[&[0x32], &[0x05]],
    bech32_hrp: Some("ltc"),
};

pub const LITECOIN_TESTNET: NetworkParams = NetworkParams {
    name: "litecoin-testnet",
    pubkey_hash_prefixes: &[&[0x6f]],
    script_hash_prefixes: &[&[0x3a], &[0xc4]],
    bech32_hrp: Some("tltc"),
};

/// Supported Bitcoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BtcNetwork {
    Mainnet,
    Testnet,
    Regtest,
}

impl BtcNetwork {
    pub fn params(self) -> &'static NetworkParams {
        match self {
            BtcNetwork::Mainnet => &BITCOIN_MAINNET,
            BtcNetwork::Testnet => &BITCOIN_TESTNET,
            BtcNetwork::Regtest => &BITCOIN_REGTEST,
        }
    }
}

impl std::fmt::Display for BtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BtcNetwork::Mainnet => write!(f, "mainnet"),
            BtcNetwork::Testnet => write!(f, "testnet"),
            BtcNetwork::Regtest => write!(f, "regtest"),
        }
    }
}

/// Supported Litecoin networks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LtcNetwork {
    Mainnet,
    Testnet,
}

impl LtcNetwork {
    pub fn params(self) -> &'static NetworkParams {
        match self {
            LtcNetwork::Mainnet => &LITECOIN_MAINNET,
            LtcNetwork::Testnet => &LITECOIN_TESTNET,
        }
    }
}

impl std::fmt::Display for LtcNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LtcNetwork::Mainnet => write!(f, "mainnet"),
            LtcNetwork::Testnet => write!(f, "testnet"),
        }
    }
}
