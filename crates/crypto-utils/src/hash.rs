use ripemd::Ripemd160;
use sha2::{Digest, Sha256};

/// Single SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// SHA-256 applied twice. Used for txids, legacy sighashes and base58 checksums.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}

/// RIPEMD160(SHA256(data)), the hash behind P2PKH and P2SH addresses.
pub fn hash160(data: &[u8]) -> [u8; 20] {
    let sha = Sha256::digest(data);
    Ripemd160::digest(sha).into()
}

/// First four bytes of the double SHA-256, appended by base58check.
pub fn checksum(data: &[u8]) -> [u8; 4] {
    let hash = double_sha256(data);
    [hash[0], hash[1], hash[2], hash[3]]
}

/// BLAKE2b-256 with a 16-byte personalization string.
///
/// Personalizations shorter than 16 bytes are zero-padded; the Zcash sighash
/// uses this for the 12-byte `ZcashSigHash` prefix followed by the branch id.
pub fn blake2b_256(personalization: &[u8], data: &[u8]) -> [u8; 32] {
    let mut persona = [0u8; 16];
    let len = personalization.len().min(16);
    persona[..len].copy_from_slice(&personalization[..len]);

    let hash = blake2b_simd::Params::new()
        .hash_length(32)
        .personal(&persona)
        .hash(data);

    let mut out = [0u8; 32];
    out.copy_from_slice(hash.as_bytes());
    out
}
