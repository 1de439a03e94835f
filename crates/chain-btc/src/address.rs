use bech32::{segwit, Fe32, Hrp};
use crypto_utils::ecdsa::is_valid_public_key;
use crypto_utils::hash::{checksum, hash160};

use crate::error::BtcError;
use crate::network::NetworkParams;
use crate::script::{self, ScriptClass};

/// A payment destination for one network.
///
/// Each variant carries the discriminator it was decoded with (or will be
/// encoded with), so `decode(encode(a)) == a` holds on the same network.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Address {
    PubKeyHash {
        hash: [u8; 20],
        prefix: &'static [u8],
    },
    ScriptHash {
        hash: [u8; 20],
        prefix: &'static [u8],
    },
    WitnessPubKeyHash {
        program: [u8; 20],
        hrp: &'static str,
    },
    WitnessScriptHash {
        program: [u8; 32],
        hrp: &'static str,
    },
    /// Segwit program with a version other than 0.
    WitnessUnknown {
        version: u8,
        program: Vec<u8>,
        hrp: &'static str,
    },
    /// Bare public key, encoded as hex.
    PubKey {
        key: Vec<u8>,
        prefix: &'static [u8],
    },
}

impl Address {
    pub fn p2pkh(hash: [u8; 20], params: &NetworkParams) -> Self {
        Address::PubKeyHash {
            hash,
            prefix: params.pubkey_hash_prefix(),
        }
    }

    pub fn p2pkh_from_pubkey(pubkey: &[u8], params: &NetworkParams) -> Self {
        Self::p2pkh(hash160(pubkey), params)
    }

    pub fn p2sh(hash: [u8; 20], params: &NetworkParams) -> Self {
        Address::ScriptHash {
            hash,
            prefix: params.script_hash_prefix(),
        }
    }

    pub fn p2sh_from_script(redeem_script: &[u8], params: &NetworkParams) -> Self {
        Self::p2sh(hash160(redeem_script), params)
    }

    pub fn p2wpkh(program: [u8; 20], params: &NetworkParams) -> Result<Self, BtcError> {
        Ok(Address::WitnessPubKeyHash {
            program,
            hrp: require_hrp(params)?,
        })
    }

    pub fn p2wsh(program: [u8; 32], params: &NetworkParams) -> Result<Self, BtcError> {
        Ok(Address::WitnessScriptHash {
            program,
            hrp: require_hrp(params)?,
        })
    }

    pub fn pubkey(key: &[u8], params: &NetworkParams) -> Result<Self, BtcError> {
        if !is_valid_public_key(key) {
            return Err(BtcError::InvalidPublicKey(hex::encode(key)));
        }
        Ok(Address::PubKey {
            key: key.to_vec(),
            prefix: params.pubkey_hash_prefix(),
        })
    }

    /// Raw bytes identifying the destination: the hash, program or key.
    /// This is the lookup key the key manager uses.
    pub fn script_address(&self) -> Vec<u8> {
        match self {
            Address::PubKeyHash { hash, .. } | Address::ScriptHash { hash, .. } => hash.to_vec(),
            Address::WitnessPubKeyHash { program, .. } => program.to_vec(),
            Address::WitnessScriptHash { program, .. } => program.to_vec(),
            Address::WitnessUnknown { program, .. } => program.clone(),
            Address::PubKey { key, .. } => key.clone(),
        }
    }

    /// Output script paying to this address.
    pub fn to_script(&self) -> Vec<u8> {
        match self {
            Address::PubKeyHash { hash, .. } => script::p2pkh_script(hash),
            Address::ScriptHash { hash, .. } => script::p2sh_script(hash),
            Address::WitnessPubKeyHash { program, .. } => {
                script::witness_program_script(0, program)
            }
            Address::WitnessScriptHash { program, .. } => {
                script::witness_program_script(0, program)
            }
            Address::WitnessUnknown {
                version, program, ..
            } => script::witness_program_script(*version, program),
            Address::PubKey { key, .. } => script::p2pk_script(key),
        }
    }

    /// Classify an output script and build the address it pays to.
    pub fn from_script(script: &[u8], params: &NetworkParams) -> Result<Self, BtcError> {
        match script::classify(script) {
            ScriptClass::PubKeyHash(hash) => Ok(Self::p2pkh(hash, params)),
            ScriptClass::ScriptHash(hash) => Ok(Self::p2sh(hash, params)),
            ScriptClass::WitnessV0KeyHash(program) => Self::p2wpkh(program, params),
            ScriptClass::WitnessV0ScriptHash(program) => Self::p2wsh(program, params),
            ScriptClass::WitnessUnknown { version, program } => Ok(Address::WitnessUnknown {
                version,
                program,
                hrp: require_hrp(params)?,
            }),
            ScriptClass::PubKey(key) => Self::pubkey(&key, params),
            ScriptClass::NonStandard => Err(BtcError::UnsupportedScript(hex::encode(script))),
        }
    }

    pub fn encode(&self) -> Result<String, BtcError> {
        match self {
            Address::PubKeyHash { hash, prefix } | Address::ScriptHash { hash, prefix } => {
                Ok(encode_base58check(prefix, hash))
            }
            Address::WitnessPubKeyHash { program, hrp } => encode_segwit(hrp, 0, program),
            Address::WitnessScriptHash { program, hrp } => encode_segwit(hrp, 0, program),
            Address::WitnessUnknown {
                version,
                program,
                hrp,
            } => encode_segwit(hrp, *version, program),
            Address::PubKey { key, .. } => Ok(hex::encode(key)),
        }
    }

    /// Parse an address string for `params`.
    ///
    /// Bech32 is tried when the string starts with the network's prefix and
    /// separator, raw hex public keys when the string is 66 or 130 hex chars,
    /// and base58check otherwise.
    pub fn decode(s: &str, params: &NetworkParams) -> Result<Self, BtcError> {
        if let Some(hrp) = params.bech32_hrp {
            let lower = s.to_ascii_lowercase();
            if lower.starts_with(&format!("{hrp}1")) {
                return decode_segwit_address(s, hrp);
            }
        }

        if matches!(s.len(), 66 | 130) && s.bytes().all(|b| b.is_ascii_hexdigit()) {
            let key = hex::decode(s).map_err(|e| BtcError::InvalidFormat(e.to_string()))?;
            return Self::pubkey(&key, params);
        }

        if looks_like_segwit(s) {
            return Err(BtcError::UnknownAddressType(format!(
                "segwit address not supported on {}",
                params.name
            )));
        }

        decode_base58_address(s, params)
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.encode() {
            Ok(s) => f.write_str(&s),
            Err(_) => f.write_str("<unencodable address>"),
        }
    }
}

fn require_hrp(params: &NetworkParams) -> Result<&'static str, BtcError> {
    params.bech32_hrp.ok_or_else(|| {
        BtcError::UnknownAddressType(format!("segwit address not supported on {}", params.name))
    })
}

/// True for strings shaped like `<hrp>1<data>` with a known segwit prefix,
/// used to give networks without bech32 a precise error.
fn looks_like_segwit(s: &str) -> bool {
    let lower = s.to_ascii_lowercase();
    ["bc1", "tb1", "bcrt1", "ltc1", "tltc1"]
        .iter()
        .any(|p| lower.starts_with(p))
}

// ─── Base58Check ───────────────────────────────────────────────────

pub fn encode_base58check(prefix: &[u8], payload: &[u8]) -> String {
    let mut data = Vec::with_capacity(prefix.len() + payload.len() + 4);
    data.extend_from_slice(prefix);
    data.extend_from_slice(payload);
    let check = checksum(&data);
    data.extend_from_slice(&check);
    bs58::encode(data).into_string()
}

/// Decode base58check and return the versioned payload with the checksum
/// stripped.
pub fn decode_base58check(s: &str) -> Result<Vec<u8>, BtcError> {
    let data = bs58::decode(s)
        .into_vec()
        .map_err(|e| BtcError::InvalidFormat(format!("invalid base58: {e}")))?;
    if data.len() < 5 {
        return Err(BtcError::InvalidFormat(format!(
            "decoded length {} is too short",
            data.len()
        )));
    }
    let (payload, check) = data.split_at(data.len() - 4);
    if checksum(payload) != check {
        return Err(BtcError::ChecksumMismatch);
    }
    Ok(payload.to_vec())
}

fn decode_base58_address(s: &str, params: &NetworkParams) -> Result<Address, BtcError> {
    let payload = decode_base58check(s)?;

    let pkh = matching_prefix(&payload, params.pubkey_hash_prefixes);
    let sh = matching_prefix(&payload, params.script_hash_prefixes);

    match (pkh, sh) {
        (Some(_), Some(_)) => Err(BtcError::AddressCollision(format!(
            "prefix {} is both pubkey-hash and script-hash on {}",
            hex::encode(&payload[..payload.len().saturating_sub(20)]),
            params.name
        ))),
        (Some(prefix), None) => Ok(Address::PubKeyHash {
            hash: hash_after(&payload, prefix),
            prefix,
        }),
        (None, Some(prefix)) => Ok(Address::ScriptHash {
            hash: hash_after(&payload, prefix),
            prefix,
        }),
        (None, None) => {
            let known_len = params
                .pubkey_hash_prefixes
                .iter()
                .chain(params.script_hash_prefixes)
                .any(|p| payload.len() == p.len() + 20);
            if known_len {
                Err(BtcError::UnknownAddressType(format!(
                    "prefix {} is not registered on {}",
                    hex::encode(&payload[..payload.len() - 20]),
                    params.name
                )))
            } else {
                Err(BtcError::InvalidFormat(format!(
                    "payload length {} is invalid",
                    payload.len()
                )))
            }
        }
    }
}

fn matching_prefix(payload: &[u8], prefixes: &[&'static [u8]]) -> Option<&'static [u8]> {
    prefixes
        .iter()
        .copied()
        .find(|p| payload.len() == p.len() + 20 && payload.starts_with(p))
}

fn hash_after(payload: &[u8], prefix: &[u8]) -> [u8; 20] {
    let mut hash = [0u8; 20];
    hash.copy_from_slice(&payload[prefix.len()..]);
    hash
}

// ─── Bech32 segwit ─────────────────────────────────────────────────

fn check_witness_program(version: u8, program_len: usize) -> Result<(), BtcError> {
    if version > 16 {
        return Err(BtcError::InvalidWitnessVersion(version));
    }
    let ok = if version == 0 {
        matches!(program_len, 20 | 32)
    } else {
        (2..=40).contains(&program_len)
    };
    if !ok {
        return Err(BtcError::InvalidWitnessProgramLength(program_len));
    }
    Ok(())
}

/// Encode a witness program, then decode the result and reject it unless the
/// same version and program come back.
pub fn encode_segwit(hrp: &str, version: u8, program: &[u8]) -> Result<String, BtcError> {
    check_witness_program(version, program.len())?;

    let parsed_hrp =
        Hrp::parse(hrp).map_err(|e| BtcError::InvalidFormat(format!("invalid hrp: {e}")))?;
    let fe = Fe32::try_from(version).map_err(|_| BtcError::InvalidWitnessVersion(version))?;
    let encoded = segwit::encode(parsed_hrp, fe, program)
        .map_err(|e| BtcError::InvalidFormat(format!("bech32 encode failed: {e}")))?;

    let (check_version, check_program) = decode_segwit(&encoded, hrp)?;
    if check_version != version || check_program != program {
        return Err(BtcError::InvalidFormat(
            "bech32 encoding does not decode to the same program".into(),
        ));
    }
    Ok(encoded)
}

/// Decode a segwit address, requiring the given human-readable prefix.
pub fn decode_segwit(s: &str, expected_hrp: &str) -> Result<(u8, Vec<u8>), BtcError> {
    precheck_segwit_data(s)?;
    let (hrp, version, program) = segwit::decode(s)
        .map_err(|e| BtcError::InvalidFormat(format!("invalid bech32: {e}")))?;
    if hrp.to_lowercase() != expected_hrp {
        return Err(BtcError::UnknownAddressType(format!(
            "bech32 prefix {} is not {expected_hrp}",
            hrp.to_lowercase()
        )));
    }
    let version = version.to_u8();
    check_witness_program(version, program.len())?;
    Ok((version, program))
}

const BECH32_CHARSET: &[u8; 32] = b"qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Reads the witness version and program length straight from the data part
/// so version and length problems surface as their own error kinds rather
/// than as a generic decode failure.
fn precheck_segwit_data(s: &str) -> Result<(), BtcError> {
    let lower = s.to_ascii_lowercase();
    let Some(sep) = lower.rfind('1') else {
        return Err(BtcError::InvalidFormat("missing bech32 separator".into()));
    };
    let data = &lower.as_bytes()[sep + 1..];
    // version character + 6 checksum characters
    if data.len() < 7 {
        return Err(BtcError::InvalidFormat("bech32 data part too short".into()));
    }
    let version = BECH32_CHARSET
        .iter()
        .position(|c| *c == data[0])
        .ok_or_else(|| BtcError::InvalidFormat("invalid bech32 character".into()))?;
    let program_len = (data.len() - 7) * 5 / 8;
    check_witness_program(version as u8, program_len)
}

fn decode_segwit_address(s: &str, hrp: &'static str) -> Result<Address, BtcError> {
    let (version, program) = decode_segwit(s, hrp)?;
    match (version, program.len()) {
        (0, 20) => {
            let mut p = [0u8; 20];
            p.copy_from_slice(&program);
            Ok(Address::WitnessPubKeyHash { program: p, hrp })
        }
        (0, 32) => {
            let mut p = [0u8; 32];
            p.copy_from_slice(&program);
            Ok(Address::WitnessScriptHash { program: p, hrp })
        }
        (version, _) => Ok(Address::WitnessUnknown {
            version,
            program,
            hrp,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::{
        BtcNetwork, LtcNetwork, NetworkParams, BITCOIN_MAINNET, LITECOIN_MAINNET,
    };

    const PUBKEY_HEX: &str = "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";

    fn pubkey() -> Vec<u8> {
        hex::decode(PUBKEY_HEX).unwrap()
    }

    /// Private key 1 as P2WPKH mainnet: bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4
    #[test]
    fn p2wpkh_mainnet_test_vector() {
        let program = hash160(&pubkey());
        let addr = Address::p2wpkh(program, &BITCOIN_MAINNET).unwrap();
        assert_eq!(
            addr.encode().unwrap(),
            "bc1qw508d6qejxtdg4y5r3zarvary0c5xw7kv8f3t4"
        );
    }

    #[test]
    fn p2pkh_mainnet_test_vector() {
        let addr = Address::p2pkh_from_pubkey(&pubkey(), &BITCOIN_MAINNET);
        assert_eq!(addr.encode().unwrap(), "1BgGZ9tcN4rm9KBzDn7KprQz87SZ26SAMH");
    }

    #[test]
    fn genesis_address_decodes() {
        let addr = Address::decode("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", &BITCOIN_MAINNET).unwrap();
        assert!(matches!(addr, Address::PubKeyHash { prefix: &[0x00], .. }));
        assert_eq!(
            hex::encode(addr.script_address()),
            "62e907b15cbf27d5425399ebf6f0fb50ebb88f18"
        );
    }

    #[test]
    fn bip173_p2wsh_vector() {
        let s = "bc1qrp33g0q5c5txsp9arysrx4k6zdkfs4nce4xj0gdcccefvpysxf3qccfmv3";
        let addr = Address::decode(s, &BITCOIN_MAINNET).unwrap();
        assert!(matches!(addr, Address::WitnessScriptHash { .. }));
        assert_eq!(addr.encode().unwrap(), s);
    }

    #[test]
    fn uppercase_bech32_is_accepted() {
        let addr = Address::decode(
            "BC1QW508D6QEJXTDG4Y5R3ZARVARY0C5XW7KV8F3T4",
            &BITCOIN_MAINNET,
        )
        .unwrap();
        assert!(matches!(addr, Address::WitnessPubKeyHash { .. }));
    }

    #[test]
    fn wrong_checksum_is_detected() {
        // Last character altered.
        let err = Address::decode("1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNb", &BITCOIN_MAINNET)
            .unwrap_err();
        assert!(matches!(err, BtcError::ChecksumMismatch));
    }

    #[test]
    fn short_base58_is_invalid_format() {
        let s = bs58::encode([1u8, 2, 3]).into_string();
        assert!(matches!(
            Address::decode(&s, &BITCOIN_MAINNET),
            Err(BtcError::InvalidFormat(_))
        ));
    }

    #[test]
    fn bad_base58_character_is_invalid_format() {
        assert!(matches!(
            Address::decode("1A1zP1eP5QGefi2DMPTfTL5SLmv7Div0Na", &BITCOIN_MAINNET),
            Err(BtcError::InvalidFormat(_))
        ));
    }

    #[test]
    fn testnet_address_on_mainnet_is_unknown_type() {
        let addr = Address::p2pkh([7u8; 20], BtcNetwork::Testnet.params());
        let s = addr.encode().unwrap();
        assert!(matches!(
            Address::decode(&s, &BITCOIN_MAINNET),
            Err(BtcError::UnknownAddressType(_))
        ));
    }

    #[test]
    fn litecoin_accepts_legacy_script_prefix() {
        let legacy = encode_base58check(&[0x05], &[9u8; 20]);
        let addr = Address::decode(&legacy, LtcNetwork::Mainnet.params()).unwrap();
        assert_eq!(
            addr,
            Address::ScriptHash {
                hash: [9u8; 20],
                prefix: &[0x05]
            }
        );
        // Round-trips with the prefix it was decoded with.
        assert_eq!(addr.encode().unwrap(), legacy);

        let fresh = Address::p2sh([9u8; 20], &LITECOIN_MAINNET).encode().unwrap();
        assert!(fresh.starts_with('M'));
    }

    #[test]
    fn colliding_prefixes_are_rejected() {
        const COLLIDING: NetworkParams = NetworkParams {
            name: "colliding",
            pubkey_hash_prefixes: &[&[0x05]],
            script_hash_prefixes: &[&[0x05]],
            bech32_hrp: None,
        };
        let s = encode_base58check(&[0x05], &[1u8; 20]);
        assert!(matches!(
            Address::decode(&s, &COLLIDING),
            Err(BtcError::AddressCollision(_))
        ));
    }

    #[test]
    fn witness_v0_wrong_length_rejected_on_encode() {
        assert!(matches!(
            encode_segwit("bc", 0, &[0u8; 21]),
            Err(BtcError::InvalidWitnessProgramLength(21))
        ));
    }

    #[test]
    fn witness_version_above_16_rejected() {
        assert!(matches!(
            encode_segwit("bc", 17, &[0u8; 32]),
            Err(BtcError::InvalidWitnessVersion(17))
        ));
    }

    #[test]
    fn witness_v1_program_bounds() {
        assert!(matches!(
            encode_segwit("bc", 1, &[0u8; 1]),
            Err(BtcError::InvalidWitnessProgramLength(1))
        ));
        assert!(matches!(
            encode_segwit("bc", 1, &[0u8; 41]),
            Err(BtcError::InvalidWitnessProgramLength(41))
        ));
        let s = encode_segwit("bc", 1, &[0x5a; 32]).unwrap();
        let addr = Address::decode(&s, &BITCOIN_MAINNET).unwrap();
        assert!(matches!(addr, Address::WitnessUnknown { version: 1, .. }));
    }

    #[test]
    fn witness_errors_surface_on_decode() {
        // BIP-173 invalid vectors: version 17 and a 21-byte v0 program.
        assert!(matches!(
            decode_segwit("bc10w508d6qejxtdg4y5r3zarvary0c5xw7kw508d6qejxtdg4y5r3zarvary0c5xw7kw5rljs90", "bc"),
            Err(BtcError::InvalidWitnessVersion(_)) | Err(BtcError::InvalidWitnessProgramLength(_))
        ));
        assert!(matches!(
            decode_segwit("bc1zw508d6qejxtdg4y5r3zarvaryvqyzf3du", "bc"),
            Err(BtcError::InvalidWitnessProgramLength(_)) | Err(BtcError::InvalidFormat(_))
        ));
    }

    #[test]
    fn segwit_prefix_for_other_network_is_unknown() {
        let addr = Address::p2wpkh([3u8; 20], BtcNetwork::Testnet.params()).unwrap();
        let s = addr.encode().unwrap();
        assert!(matches!(
            Address::decode(&s, &BITCOIN_MAINNET),
            Err(BtcError::UnknownAddressType(_))
        ));
    }

    #[test]
    fn pubkey_address_roundtrip() {
        let addr = Address::decode(PUBKEY_HEX, &BITCOIN_MAINNET).unwrap();
        assert!(matches!(addr, Address::PubKey { .. }));
        assert_eq!(addr.encode().unwrap(), PUBKEY_HEX.to_lowercase());
        let script = addr.to_script();
        assert_eq!(Address::from_script(&script, &BITCOIN_MAINNET).unwrap(), addr);
    }

    #[test]
    fn script_roundtrip_for_every_variant() {
        let params = &BITCOIN_MAINNET;
        let addrs = vec![
            Address::p2pkh([1u8; 20], params),
            Address::p2sh([2u8; 20], params),
            Address::p2wpkh([3u8; 20], params).unwrap(),
            Address::p2wsh([4u8; 32], params).unwrap(),
            Address::pubkey(&pubkey(), params).unwrap(),
        ];
        for addr in addrs {
            let script = addr.to_script();
            assert_eq!(Address::from_script(&script, params).unwrap(), addr);
        }
    }

    #[test]
    fn from_script_rejects_op_return() {
        assert!(matches!(
            Address::from_script(&[0x6a, 0x01, 0x00], &BITCOIN_MAINNET),
            Err(BtcError::UnsupportedScript(_))
        ));
    }

    #[test]
    fn display_matches_encode() {
        let addr = Address::p2pkh([0u8; 20], &BITCOIN_MAINNET);
        assert_eq!(addr.to_string(), addr.encode().unwrap());
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;
        use proptest::prelude::prop;

        proptest! {
            #[test]
            fn base58_roundtrip(hash in prop::array::uniform20(any::<u8>()), sh in any::<bool>()) {
                let params = &BITCOIN_MAINNET;
                let addr = if sh { Address::p2sh(hash, params) } else { Address::p2pkh(hash, params) };
                let s = addr.encode().unwrap();
                prop_assert_eq!(Address::decode(&s, params).unwrap(), addr);
            }

            #[test]
            fn segwit_roundtrip(program in prop::collection::vec(any::<u8>(), 2..=40), version in 1u8..=16) {
                let s = encode_segwit("tb", version, &program).unwrap();
                let (v, p) = decode_segwit(&s, "tb").unwrap();
                prop_assert_eq!(v, version);
                prop_assert_eq!(p, program);
            }

            #[test]
            fn flipped_byte_never_decodes_to_same_address(
                hash in prop::array::uniform20(any::<u8>()),
                idx in 0usize..25,
                flip in 1u8..=255,
            ) {
                let params = &BITCOIN_MAINNET;
                let addr = Address::p2pkh(hash, params);
                let mut raw = vec![0x00];
                raw.extend_from_slice(&hash);
                raw.extend_from_slice(&checksum(&raw));
                raw[idx] ^= flip;
                let s = bs58::encode(&raw).into_string();
                if let Ok(decoded) = Address::decode(&s, params) {
                    prop_assert_ne!(decoded, addr);
                }
            }
        }
    }
}
