use chain_btc::encoding::ByteReader;
use chain_btc::transaction::{read_inputs, read_outputs, Transaction};
use crypto_utils::hash::double_sha256;

use crate::error::ZecError;
use crate::network::{SAPLING_TX_VERSION, SAPLING_VERSION_GROUP_ID};

/// fOverwintered bit of the v3+ header.
pub const OVERWINTERED_FLAG: u32 = 0x8000_0000;

/// cv, anchor, nullifier, rk (32 each), zkproof (192), spendAuthSig (64).
const SPEND_DESCRIPTION_SIZE: usize = 384;
const SPEND_NULLIFIER_OFFSET: usize = 64;

/// cv, cmu, ephemeralKey (32 each), encCiphertext (580), outCiphertext (80),
/// zkproof (192).
const OUTPUT_DESCRIPTION_SIZE: usize = 948;

/// JoinSplit with a Groth16 proof: vpub_old/new (16), anchor (32),
/// nullifiers (64), commitments (64), ephemeralKey (32), randomSeed (32),
/// vmacs (64), proof (192), ciphertexts (1202).
const JOINSPLIT_SIZE: usize = 1698;
const JOINSPLIT_NULLIFIER_OFFSET: usize = 48;

const JOINSPLIT_PUBKEY_SIZE: usize = 32;
const JOINSPLIT_SIG_SIZE: usize = 64;
const BINDING_SIG_SIZE: usize = 64;

/// Zero-length shielded spends, outputs and joinsplits.
const EMPTY_SHIELDED: [u8; 3] = [0x00, 0x00, 0x00];

/// A Sapling (v4) transaction.
///
/// The transparent part uses the shared Bitcoin-family model; its `version`
/// field holds the v4 version number without the overwinter bit. Shielded
/// sections are kept as raw bytes so the transaction re-serializes exactly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZecTransaction {
    pub transparent: Transaction,
    pub version_group_id: u32,
    pub expiry_height: u32,
    pub value_balance: i64,
    pub spend_count: usize,
    pub output_count: usize,
    pub joinsplit_count: usize,
    /// Nullifiers revealed by shielded spends and joinsplits.
    pub nullifiers: Vec<[u8; 32]>,
    shielded_data: Vec<u8>,
}

impl ZecTransaction {
    /// Wrap a transparent-only transaction as Sapling v4.
    pub fn from_transparent(mut transparent: Transaction, expiry_height: u32) -> Self {
        transparent.version = SAPLING_TX_VERSION as i32;
        Self {
            transparent,
            version_group_id: SAPLING_VERSION_GROUP_ID,
            expiry_height,
            value_balance: 0,
            spend_count: 0,
            output_count: 0,
            joinsplit_count: 0,
            nullifiers: Vec::new(),
            shielded_data: EMPTY_SHIELDED.to_vec(),
        }
    }

    pub fn is_transparent_only(&self) -> bool {
        self.spend_count == 0 && self.output_count == 0 && self.joinsplit_count == 0
    }

    /// Header word: version with the overwinter bit set.
    pub fn header(&self) -> u32 {
        (self.transparent.version as u32) | OVERWINTERED_FLAG
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(256);
        buf.extend_from_slice(&self.header().to_le_bytes());
        buf.extend_from_slice(&self.version_group_id.to_le_bytes());
        self.transparent.write_inputs(&mut buf);
        self.transparent.write_outputs(&mut buf);
        buf.extend_from_slice(&self.transparent.lock_time.to_le_bytes());
        buf.extend_from_slice(&self.expiry_height.to_le_bytes());
        buf.extend_from_slice(&self.value_balance.to_le_bytes());
        buf.extend_from_slice(&self.shielded_data);
        buf
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self, ZecError> {
        let mut reader = ByteReader::new(bytes);

        let header = reader.read_u32_le()?;
        let version = header & !OVERWINTERED_FLAG;
        if header & OVERWINTERED_FLAG == 0 || version != SAPLING_TX_VERSION {
            return Err(ZecError::UnsupportedVersion(version));
        }
        let version_group_id = reader.read_u32_le()?;

        let inputs = read_inputs(&mut reader)?;
        let outputs = read_outputs(&mut reader)?;
        let lock_time = reader.read_u32_le()?;
        let expiry_height = reader.read_u32_le()?;
        let value_balance = reader.read_i64_le()?;

        let shielded_start = reader.position();
        let mut nullifiers = Vec::new();

        let spend_count = reader.read_count(SPEND_DESCRIPTION_SIZE)?;
        for _ in 0..spend_count {
            let spend = reader.read_bytes(SPEND_DESCRIPTION_SIZE)?;
            nullifiers.push(array_at(spend, SPEND_NULLIFIER_OFFSET));
        }

        let output_count = reader.read_count(OUTPUT_DESCRIPTION_SIZE)?;
        reader.skip(output_count * OUTPUT_DESCRIPTION_SIZE)?;

        let joinsplit_count = reader.read_count(JOINSPLIT_SIZE)?;
        for _ in 0..joinsplit_count {
            let js = reader.read_bytes(JOINSPLIT_SIZE)?;
            nullifiers.push(array_at(js, JOINSPLIT_NULLIFIER_OFFSET));
            nullifiers.push(array_at(js, JOINSPLIT_NULLIFIER_OFFSET + 32));
        }
        if joinsplit_count > 0 {
            reader.skip(JOINSPLIT_PUBKEY_SIZE + JOINSPLIT_SIG_SIZE)?;
        }
        if spend_count + output_count > 0 {
            reader.skip(BINDING_SIG_SIZE)?;
        }

        if !reader.is_empty() {
            return Err(ZecError::Decode(format!(
                "{} trailing bytes after transaction",
                reader.remaining()
            )));
        }

        Ok(Self {
            transparent: Transaction {
                version: version as i32,
                inputs,
                outputs,
                lock_time,
            },
            version_group_id,
            expiry_height,
            value_balance,
            spend_count,
            output_count,
            joinsplit_count,
            nullifiers,
            shielded_data: bytes[shielded_start..].to_vec(),
        })
    }

    /// Double SHA-256 of the v4 serialization, internal byte order.
    pub fn txid(&self) -> [u8; 32] {
        double_sha256(&self.serialize())
    }
}

fn array_at(bytes: &[u8], offset: usize) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[offset..offset + 32]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_btc::script::p2pkh_script;
    use chain_btc::transaction::{OutPoint, TxIn, TxOut};

    fn transparent() -> Transaction {
        let mut tx = Transaction::new(1);
        tx.inputs.push(TxIn {
            previous_output: OutPoint::new([0x22; 32], 1),
            script_sig: vec![0x01, 0x02],
            sequence: 0,
        });
        tx.outputs.push(TxOut::new(70_000, p2pkh_script(&[0x33; 20])));
        tx
    }

    #[test]
    fn header_and_group_id_bytes() {
        let raw = ZecTransaction::from_transparent(transparent(), 0).serialize();
        assert_eq!(&raw[0..4], &[0x04, 0x00, 0x00, 0x80]);
        assert_eq!(&raw[4..8], &[0x85, 0x20, 0x2f, 0x89]);
    }

    #[test]
    fn trailer_is_value_balance_and_empty_shielded_counts() {
        let raw = ZecTransaction::from_transparent(transparent(), 123).serialize();
        let tail = &raw[raw.len() - 19..];
        assert_eq!(&tail[0..4], &0u32.to_le_bytes()); // lock time
        assert_eq!(&tail[4..8], &123u32.to_le_bytes()); // expiry
        assert_eq!(&tail[8..16], &[0u8; 8]); // value balance
        assert_eq!(&tail[16..], &[0u8; 3]);
    }

    #[test]
    fn transparent_roundtrip() {
        let tx = ZecTransaction::from_transparent(transparent(), 9);
        let raw = tx.serialize();
        let parsed = ZecTransaction::deserialize(&raw).unwrap();
        assert_eq!(parsed, tx);
        assert_eq!(parsed.txid(), double_sha256(&raw));
        assert!(parsed.is_transparent_only());
    }

    #[test]
    fn shielded_sections_are_skipped_and_nullifiers_collected() {
        let tx = ZecTransaction::from_transparent(transparent(), 0);
        let mut raw = tx.serialize();
        raw.truncate(raw.len() - 3);

        // one spend with nullifier 0xAA.., one output, no joinsplits
        raw.push(1);
        let mut spend = vec![0u8; SPEND_DESCRIPTION_SIZE];
        spend[SPEND_NULLIFIER_OFFSET..SPEND_NULLIFIER_OFFSET + 32].copy_from_slice(&[0xAA; 32]);
        raw.extend_from_slice(&spend);
        raw.push(1);
        raw.extend_from_slice(&vec![0u8; OUTPUT_DESCRIPTION_SIZE]);
        raw.push(0);
        raw.extend_from_slice(&[0u8; BINDING_SIG_SIZE]);

        let parsed = ZecTransaction::deserialize(&raw).unwrap();
        assert_eq!(parsed.spend_count, 1);
        assert_eq!(parsed.output_count, 1);
        assert_eq!(parsed.nullifiers, vec![[0xAA; 32]]);
        assert_eq!(parsed.serialize(), raw);
        assert!(!parsed.is_transparent_only());
    }

    #[test]
    fn joinsplit_nullifiers_collected() {
        let tx = ZecTransaction::from_transparent(transparent(), 0);
        let mut raw = tx.serialize();
        raw.truncate(raw.len() - 3);
        raw.extend_from_slice(&[0, 0, 1]);
        let mut js = vec![0u8; JOINSPLIT_SIZE];
        js[48..80].copy_from_slice(&[0x01; 32]);
        js[80..112].copy_from_slice(&[0x02; 32]);
        raw.extend_from_slice(&js);
        raw.extend_from_slice(&[0u8; JOINSPLIT_PUBKEY_SIZE + JOINSPLIT_SIG_SIZE]);

        let parsed = ZecTransaction::deserialize(&raw).unwrap();
        assert_eq!(parsed.nullifiers, vec![[0x01; 32], [0x02; 32]]);
    }

    #[test]
    fn non_overwintered_header_rejected() {
        let mut raw = ZecTransaction::from_transparent(transparent(), 0).serialize();
        raw[3] = 0x00;
        assert!(matches!(
            ZecTransaction::deserialize(&raw),
            Err(ZecError::UnsupportedVersion(4))
        ));
    }

    #[test]
    fn v5_header_rejected() {
        let mut raw = ZecTransaction::from_transparent(transparent(), 0).serialize();
        raw[0] = 0x05;
        assert!(matches!(
            ZecTransaction::deserialize(&raw),
            Err(ZecError::UnsupportedVersion(5))
        ));
    }

    #[test]
    fn truncated_and_trailing_rejected() {
        let raw = ZecTransaction::from_transparent(transparent(), 0).serialize();
        assert!(ZecTransaction::deserialize(&raw[..raw.len() - 1]).is_err());
        let mut longer = raw.clone();
        longer.push(0);
        assert!(matches!(
            ZecTransaction::deserialize(&longer),
            Err(ZecError::Decode(_))
        ));
    }

    #[test]
    fn txid_differs_from_legacy_serialization() {
        let t = transparent();
        let z = ZecTransaction::from_transparent(t.clone(), 0);
        assert_ne!(z.txid(), t.txid());
    }
}
