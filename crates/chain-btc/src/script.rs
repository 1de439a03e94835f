//! Script templates, minimal pushes, and a small instruction parser.
//!
//! Only the standard forms the wallet produces or recognises are covered:
//! P2PKH, P2SH, segwit programs, bare P2PK, bare multisig and the
//! multisig-or-timeout escrow script.

use crypto_utils::ecdsa::is_valid_public_key;

use crate::error::BtcError;

pub const OP_0: u8 = 0x00;
pub const OP_PUSHDATA1: u8 = 0x4c;
pub const OP_PUSHDATA2: u8 = 0x4d;
pub const OP_PUSHDATA4: u8 = 0x4e;
pub const OP_1NEGATE: u8 = 0x4f;
pub const OP_1: u8 = 0x51;
pub const OP_16: u8 = 0x60;
pub const OP_IF: u8 = 0x63;
pub const OP_ELSE: u8 = 0x67;
pub const OP_ENDIF: u8 = 0x68;
pub const OP_DROP: u8 = 0x75;
pub const OP_DUP: u8 = 0x76;
pub const OP_EQUAL: u8 = 0x87;
pub const OP_EQUALVERIFY: u8 = 0x88;
pub const OP_HASH160: u8 = 0xa9;
pub const OP_CHECKSIG: u8 = 0xac;
pub const OP_CHECKMULTISIG: u8 = 0xae;
pub const OP_CHECKSEQUENCEVERIFY: u8 = 0xb2;

/// Largest number of keys a bare CHECKMULTISIG template accepts here.
pub const MAX_MULTISIG_KEYS: usize = 16;

/// Append `data` using the smallest push opcode that can carry it.
pub fn push_data(script: &mut Vec<u8>, data: &[u8]) {
    match data.len() {
        0 => script.push(OP_0),
        1 if (1..=16).contains(&data[0]) => script.push(OP_1 + data[0] - 1),
        1 if data[0] == 0x81 => script.push(OP_1NEGATE),
        len @ 1..=75 => {
            script.push(len as u8);
            script.extend_from_slice(data);
        }
        len @ 76..=0xFF => {
            script.push(OP_PUSHDATA1);
            script.push(len as u8);
            script.extend_from_slice(data);
        }
        len @ 0x100..=0xFFFF => {
            script.push(OP_PUSHDATA2);
            script.extend_from_slice(&(len as u16).to_le_bytes());
            script.extend_from_slice(data);
        }
        len => {
            script.push(OP_PUSHDATA4);
            script.extend_from_slice(&(len as u32).to_le_bytes());
            script.extend_from_slice(data);
        }
    }
}

/// Append an integer, using OP_0 / OP_1NEGATE / OP_1..OP_16 where possible.
pub fn push_int(script: &mut Vec<u8>, n: i64) {
    match n {
        0 => script.push(OP_0),
        -1 => script.push(OP_1NEGATE),
        1..=16 => script.push(OP_1 + (n as u8) - 1),
        _ => push_data(script, &encode_script_num(n)),
    }
}

/// Minimal little-endian sign-magnitude encoding used by script numbers.
pub fn encode_script_num(n: i64) -> Vec<u8> {
    if n == 0 {
        return Vec::new();
    }
    let negative = n < 0;
    let mut abs = n.unsigned_abs();
    let mut out = Vec::with_capacity(9);
    while abs > 0 {
        out.push((abs & 0xff) as u8);
        abs >>= 8;
    }
    // The top bit carries the sign, so a set high bit needs an extra byte.
    if out.last().is_some_and(|b| b & 0x80 != 0) {
        out.push(if negative { 0x80 } else { 0x00 });
    } else if negative {
        if let Some(last) = out.last_mut() {
            *last |= 0x80;
        }
    }
    out
}

pub fn decode_script_num(bytes: &[u8]) -> Result<i64, BtcError> {
    if bytes.len() > 8 {
        return Err(BtcError::InvalidScript(format!(
            "script number of {} bytes",
            bytes.len()
        )));
    }
    let Some((&last, _)) = bytes.split_last() else {
        return Ok(0);
    };
    let mut value: i64 = 0;
    for (i, b) in bytes.iter().enumerate() {
        value |= (*b as i64) << (8 * i);
    }
    if last & 0x80 != 0 {
        let mask = !(0x80i64 << (8 * (bytes.len() - 1)));
        value = -(value & mask);
    }
    Ok(value)
}

/// One parsed script element. `data` is empty for non-push opcodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u8,
    pub data: Vec<u8>,
}

impl Instruction {
    pub fn is_push(&self) -> bool {
        self.opcode <= OP_PUSHDATA4
    }

    /// Numeric value of a small-int opcode or a pushed script number.
    pub fn as_int(&self) -> Result<i64, BtcError> {
        match self.opcode {
            OP_0 => Ok(0),
            OP_1NEGATE => Ok(-1),
            OP_1..=OP_16 => Ok((self.opcode - OP_1 + 1) as i64),
            op if op <= OP_PUSHDATA4 => decode_script_num(&self.data),
            op => Err(BtcError::InvalidScript(format!(
                "opcode 0x{op:02x} is not a number"
            ))),
        }
    }
}

pub fn parse_script(script: &[u8]) -> Result<Vec<Instruction>, BtcError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < script.len() {
        let opcode = script[pos];
        pos += 1;
        let len = match opcode {
            1..=75 => opcode as usize,
            OP_PUSHDATA1 => {
                let n = *script
                    .get(pos)
                    .ok_or_else(|| truncated(pos))? as usize;
                pos += 1;
                n
            }
            OP_PUSHDATA2 => {
                let bytes = script.get(pos..pos + 2).ok_or_else(|| truncated(pos))?;
                pos += 2;
                u16::from_le_bytes([bytes[0], bytes[1]]) as usize
            }
            OP_PUSHDATA4 => {
                let bytes = script.get(pos..pos + 4).ok_or_else(|| truncated(pos))?;
                pos += 4;
                u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            }
            _ => 0,
        };
        let data = script
            .get(pos..pos + len)
            .ok_or_else(|| truncated(pos))?
            .to_vec();
        pos += len;
        out.push(Instruction { opcode, data });
    }
    Ok(out)
}

fn truncated(pos: usize) -> BtcError {
    BtcError::InvalidScript(format!("push runs past end of script at offset {pos}"))
}

// ─── Output templates ──────────────────────────────────────────────

/// OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG
pub fn p2pkh_script(pubkey_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(25);
    script.push(OP_DUP);
    script.push(OP_HASH160);
    script.push(0x14); // Push 20 bytes
    script.extend_from_slice(pubkey_hash);
    script.push(OP_EQUALVERIFY);
    script.push(OP_CHECKSIG);
    script
}

/// OP_HASH160 <20-byte hash> OP_EQUAL
pub fn p2sh_script(script_hash: &[u8; 20]) -> Vec<u8> {
    let mut script = Vec::with_capacity(23);
    script.push(OP_HASH160);
    script.push(0x14);
    script.extend_from_slice(script_hash);
    script.push(OP_EQUAL);
    script
}

/// <version> <program>
pub fn witness_program_script(version: u8, program: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + program.len());
    script.push(if version == 0 { OP_0 } else { OP_1 + version - 1 });
    script.push(program.len() as u8);
    script.extend_from_slice(program);
    script
}

/// <pubkey> OP_CHECKSIG
pub fn p2pk_script(pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(pubkey.len() + 2);
    push_data(&mut script, pubkey);
    script.push(OP_CHECKSIG);
    script
}

fn check_multisig_params(threshold: usize, pubkeys: &[Vec<u8>]) -> Result<(), BtcError> {
    if pubkeys.is_empty() || pubkeys.len() > MAX_MULTISIG_KEYS {
        return Err(BtcError::InvalidScript(format!(
            "multisig needs 1 to {MAX_MULTISIG_KEYS} keys, got {}",
            pubkeys.len()
        )));
    }
    if threshold == 0 || threshold > pubkeys.len() {
        return Err(BtcError::InvalidScript(format!(
            "threshold {threshold} out of range for {} keys",
            pubkeys.len()
        )));
    }
    for pk in pubkeys {
        if !is_valid_public_key(pk) {
            return Err(BtcError::InvalidPublicKey(hex::encode(pk)));
        }
    }
    Ok(())
}

/// <m> <pubkey>... <n> OP_CHECKMULTISIG
pub fn multisig_script(threshold: usize, pubkeys: &[Vec<u8>]) -> Result<Vec<u8>, BtcError> {
    check_multisig_params(threshold, pubkeys)?;
    let mut script = Vec::new();
    push_int(&mut script, threshold as i64);
    for pk in pubkeys {
        push_data(&mut script, pk);
    }
    push_int(&mut script, pubkeys.len() as i64);
    script.push(OP_CHECKMULTISIG);
    Ok(script)
}

/// OP_IF <multisig> OP_ELSE <sequence> OP_CHECKSEQUENCEVERIFY OP_DROP
/// <timeout_pubkey> OP_CHECKSIG OP_ENDIF
pub fn timeout_multisig_script(
    threshold: usize,
    pubkeys: &[Vec<u8>],
    sequence: u32,
    timeout_pubkey: &[u8],
) -> Result<Vec<u8>, BtcError> {
    if !is_valid_public_key(timeout_pubkey) {
        return Err(BtcError::InvalidPublicKey(hex::encode(timeout_pubkey)));
    }
    let mut script = vec![OP_IF];
    script.extend_from_slice(&multisig_script(threshold, pubkeys)?);
    script.push(OP_ELSE);
    push_int(&mut script, sequence as i64);
    script.push(OP_CHECKSEQUENCEVERIFY);
    script.push(OP_DROP);
    push_data(&mut script, timeout_pubkey);
    script.push(OP_CHECKSIG);
    script.push(OP_ENDIF);
    Ok(script)
}

/// Relative lock (in blocks) of the ELSE branch of a timeout escrow script.
///
/// Errors if the script has no OP_ELSE followed by a number and
/// OP_CHECKSEQUENCEVERIFY.
pub fn lock_sequence_from_redeem_script(redeem_script: &[u8]) -> Result<u32, BtcError> {
    let ops = parse_script(redeem_script)?;
    let else_pos = ops
        .iter()
        .position(|op| op.opcode == OP_ELSE)
        .ok_or_else(|| BtcError::InvalidScript("no timeout branch".into()))?;
    let (Some(num), Some(csv)) = (ops.get(else_pos + 1), ops.get(else_pos + 2)) else {
        return Err(BtcError::InvalidScript("truncated timeout branch".into()));
    };
    if csv.opcode != OP_CHECKSEQUENCEVERIFY {
        return Err(BtcError::InvalidScript(
            "timeout branch does not check sequence".into(),
        ));
    }
    let value = num.as_int()?;
    u32::try_from(value)
        .map_err(|_| BtcError::InvalidScript(format!("lock value {value} out of range")))
}

// ─── Signature scripts ─────────────────────────────────────────────

/// <sig> <pubkey>
pub fn p2pkh_signature_script(signature: &[u8], pubkey: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(signature.len() + pubkey.len() + 2);
    push_data(&mut script, signature);
    push_data(&mut script, pubkey);
    script
}

/// OP_0 <sig>... [OP_1] <redeem_script>
///
/// `select_multisig_branch` pushes OP_1 so a timeout script takes its IF
/// branch.
pub fn multisig_signature_script(
    signatures: &[&[u8]],
    redeem_script: &[u8],
    select_multisig_branch: bool,
) -> Vec<u8> {
    let mut script = vec![OP_0]; // CHECKMULTISIG pops one extra item
    for sig in signatures {
        push_data(&mut script, sig);
    }
    if select_multisig_branch {
        script.push(OP_1);
    }
    push_data(&mut script, redeem_script);
    script
}

/// <sig> OP_0 <redeem_script>, spending the ELSE branch of a timeout script.
pub fn timeout_signature_script(signature: &[u8], redeem_script: &[u8]) -> Vec<u8> {
    let mut script = Vec::with_capacity(signature.len() + redeem_script.len() + 4);
    push_data(&mut script, signature);
    script.push(OP_0);
    push_data(&mut script, redeem_script);
    script
}

// ─── Classification ────────────────────────────────────────────────

/// Standard output forms the address codec understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptClass {
    PubKeyHash([u8; 20]),
    ScriptHash([u8; 20]),
    WitnessV0KeyHash([u8; 20]),
    WitnessV0ScriptHash([u8; 32]),
    WitnessUnknown { version: u8, program: Vec<u8> },
    PubKey(Vec<u8>),
    NonStandard,
}

pub fn classify(script: &[u8]) -> ScriptClass {
    match script {
        [OP_DUP, OP_HASH160, 0x14, hash @ .., OP_EQUALVERIFY, OP_CHECKSIG] if hash.len() == 20 => {
            ScriptClass::PubKeyHash(to_array(hash))
        }
        [OP_HASH160, 0x14, hash @ .., OP_EQUAL] if hash.len() == 20 => {
            ScriptClass::ScriptHash(to_array(hash))
        }
        [len, key @ .., OP_CHECKSIG]
            if (*len as usize == key.len()) && matches!(key.len(), 33 | 65) =>
        {
            if is_valid_public_key(key) {
                ScriptClass::PubKey(key.to_vec())
            } else {
                ScriptClass::NonStandard
            }
        }
        [version, len, program @ ..]
            if (*version == OP_0 || (OP_1..=OP_16).contains(version))
                && *len as usize == program.len()
                && (2..=40).contains(&program.len()) =>
        {
            let version = if *version == OP_0 { 0 } else { version - OP_1 + 1 };
            match (version, program.len()) {
                (0, 20) => ScriptClass::WitnessV0KeyHash(to_array(program)),
                (0, 32) => ScriptClass::WitnessV0ScriptHash(to_array(program)),
                (0, _) => ScriptClass::NonStandard,
                _ => ScriptClass::WitnessUnknown {
                    version,
                    program: program.to_vec(),
                },
            }
        }
        _ => ScriptClass::NonStandard,
    }
}

fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(bytes);
    out
}
