use std::cmp::Ordering;

use crypto_utils::hash::double_sha256;
use serde::{Deserialize, Serialize};

use crate::encoding::{write_compact_size, write_var_bytes, ByteReader};
use crate::error::BtcError;

/// Smallest possible serialized input: outpoint, empty script, sequence.
const MIN_INPUT_SIZE: usize = 32 + 4 + 1 + 4;
/// Smallest possible serialized output: value and empty script.
const MIN_OUTPUT_SIZE: usize = 8 + 1;

/// Reference to an output of a previous transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Txid in internal (little-endian) byte order.
    pub txid: [u8; 32],
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: [u8; 32], vout: u32) -> Self {
        Self { txid, vout }
    }

    /// The all-zero, index 0xFFFFFFFF outpoint of coinbase inputs.
    pub fn null() -> Self {
        Self {
            txid: [0u8; 32],
            vout: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.txid == [0u8; 32] && self.vout == u32::MAX
    }
}

impl std::fmt::Display for OutPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", txid_to_hex(&self.txid), self.vout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub previous_output: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

impl TxOut {
    pub fn new(value: i64, script_pubkey: Vec<u8>) -> Self {
        Self {
            value,
            script_pubkey,
        }
    }

    pub fn serialize_size(&self) -> usize {
        crate::txrules::output_serialize_size(self.script_pubkey.len())
    }
}

/// Transparent transaction: the legacy Bitcoin model, also used as the
/// transparent part of Zcash v4 transactions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn new(version: i32) -> Self {
        Self {
            version,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].previous_output.is_null()
    }

    /// Legacy serialization without witness data.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.version.to_le_bytes());
        self.write_inputs(&mut buf);
        self.write_outputs(&mut buf);
        buf.extend_from_slice(&self.lock_time.to_le_bytes());
        buf
    }

    pub fn write_inputs(&self, buf: &mut Vec<u8>) {
        write_compact_size(buf, self.inputs.len() as u64);
        for input in &self.inputs {
            buf.extend_from_slice(&input.previous_output.txid);
            buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
            write_var_bytes(buf, &input.script_sig);
            buf.extend_from_slice(&input.sequence.to_le_bytes());
        }
    }

    pub fn write_outputs(&self, buf: &mut Vec<u8>) {
        write_compact_size(buf, self.outputs.len() as u64);
        for output in &self.outputs {
            buf.extend_from_slice(&output.value.to_le_bytes());
            write_var_bytes(buf, &output.script_pubkey);
        }
    }

    /// Parse a legacy or segwit-serialized transaction. Witness data is read
    /// and dropped; it does not contribute to the txid.
    pub fn deserialize(bytes: &[u8]) -> Result<Self, BtcError> {
        let mut reader = ByteReader::new(bytes);
        let tx = Self::read_from(&mut reader)?;
        if !reader.is_empty() {
            return Err(BtcError::Decode(format!(
                "{} trailing bytes after transaction",
                reader.remaining()
            )));
        }
        Ok(tx)
    }

    fn read_from(reader: &mut ByteReader<'_>) -> Result<Self, BtcError> {
        let version = reader.read_i32_le()?;

        let mut segwit = false;
        if reader.peek_u8() == Some(0x00) {
            reader.skip(1)?;
            let flag = reader.read_u8()?;
            if flag != 0x01 {
                return Err(BtcError::Decode(format!("unknown segwit flag {flag}")));
            }
            segwit = true;
        }

        let inputs = read_inputs(reader)?;
        let outputs = read_outputs(reader)?;

        if segwit {
            for _ in 0..inputs.len() {
                let items = reader.read_count(1)?;
                for _ in 0..items {
                    reader.read_var_bytes()?;
                }
            }
        }

        let lock_time = reader.read_u32_le()?;
        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
        })
    }

    /// Double SHA-256 of the legacy serialization, internal byte order.
    pub fn txid(&self) -> [u8; 32] {
        double_sha256(&self.serialize())
    }

    pub fn txid_hex(&self) -> String {
        txid_to_hex(&self.txid())
    }

    pub fn total_output_value(&self) -> i64 {
        self.outputs.iter().map(|o| o.value).sum()
    }

    /// BIP-69 ordering: inputs by previous txid (display order) then index,
    /// outputs by value then script bytes.
    pub fn sort_bip69(&mut self) {
        self.inputs.sort_by(|a, b| compare_outpoints(&a.previous_output, &b.previous_output));
        self.outputs.sort_by(|a, b| {
            a.value
                .cmp(&b.value)
                .then_with(|| a.script_pubkey.cmp(&b.script_pubkey))
        });
    }
}

fn compare_outpoints(a: &OutPoint, b: &OutPoint) -> Ordering {
    if a.txid == b.txid {
        return a.vout.cmp(&b.vout);
    }
    a.txid.iter().rev().cmp(b.txid.iter().rev())
}

pub fn read_inputs(reader: &mut ByteReader<'_>) -> Result<Vec<TxIn>, BtcError> {
    let count = reader.read_count(MIN_INPUT_SIZE)?;
    let mut inputs = Vec::with_capacity(count);
    for _ in 0..count {
        let txid = reader.read_array::<32>()?;
        let vout = reader.read_u32_le()?;
        let script_sig = reader.read_var_bytes()?;
        let sequence = reader.read_u32_le()?;
        inputs.push(TxIn {
            previous_output: OutPoint { txid, vout },
            script_sig,
            sequence,
        });
    }
    Ok(inputs)
}

pub fn read_outputs(reader: &mut ByteReader<'_>) -> Result<Vec<TxOut>, BtcError> {
    let count = reader.read_count(MIN_OUTPUT_SIZE)?;
    let mut outputs = Vec::with_capacity(count);
    for _ in 0..count {
        let value = reader.read_i64_le()?;
        let script_pubkey = reader.read_var_bytes()?;
        outputs.push(TxOut {
            value,
            script_pubkey,
        });
    }
    Ok(outputs)
}

/// Display a txid: hex of the byte-reversed hash.
pub fn txid_to_hex(txid: &[u8; 32]) -> String {
    let mut reversed = *txid;
    reversed.reverse();
    hex::encode(reversed)
}

/// Parse a hex-encoded txid (display / big-endian order) into internal byte
/// order (little-endian / reversed).
pub fn parse_txid(txid_hex: &str) -> Result<[u8; 32], BtcError> {
    let bytes = hex::decode(txid_hex)
        .map_err(|e| BtcError::Decode(format!("invalid txid hex: {e}")))?;
    if bytes.len() != 32 {
        return Err(BtcError::Decode(format!(
            "txid must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    arr.reverse();
    Ok(arr)
}
