//! secp256k1 ECDSA over precomputed digests.
//!
//! Signatures are RFC 6979 deterministic, low-S normalized and DER encoded,
//! which is the form Bitcoin-family script interpreters accept.

use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};

use crate::error::CryptoError;
use crate::hash::hash160;
use crate::zeroizing::SecretBytes;

/// A secp256k1 private key whose scalar is zeroed on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct PrivateKey {
    secret: SecretBytes,
}

impl PrivateKey {
    /// Validates that `bytes` is a non-zero scalar below the curve order.
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, CryptoError> {
        SigningKey::from_bytes(bytes.into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))?;
        Ok(Self {
            secret: SecretBytes::new(*bytes),
        })
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let secret = SecretBytes::from_slice(bytes)?;
        Self::from_bytes(secret.as_bytes())
    }

    pub fn secret_bytes(&self) -> &[u8; 32] {
        self.secret.as_bytes()
    }

    fn signing_key(&self) -> Result<SigningKey, CryptoError> {
        SigningKey::from_bytes(self.secret.as_bytes().into())
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    /// 33-byte SEC1 compressed public key.
    pub fn public_key(&self) -> Result<[u8; 33], CryptoError> {
        let signing_key = self.signing_key()?;
        let point = signing_key.verifying_key().to_encoded_point(true);
        point
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey("unexpected encoding length".into()))
    }

    /// 65-byte SEC1 uncompressed public key.
    pub fn public_key_uncompressed(&self) -> Result<[u8; 65], CryptoError> {
        let signing_key = self.signing_key()?;
        let point = signing_key.verifying_key().to_encoded_point(false);
        point
            .as_bytes()
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey("unexpected encoding length".into()))
    }

    /// HASH160 of the compressed public key.
    pub fn pubkey_hash(&self) -> Result<[u8; 20], CryptoError> {
        Ok(hash160(&self.public_key()?))
    }

    /// Signs a 32-byte digest and returns the DER encoding of a low-S signature.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<Vec<u8>, CryptoError> {
        let signing_key = self.signing_key()?;
        let sig: Signature = signing_key
            .sign_prehash(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let sig = sig.normalize_s().unwrap_or(sig);
        Ok(sig.to_der().as_bytes().to_vec())
    }
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

/// Returns true if `bytes` is a valid SEC1 point (33 or 65 bytes).
pub fn is_valid_public_key(bytes: &[u8]) -> bool {
    matches!(bytes.len(), 33 | 65) && VerifyingKey::from_sec1_bytes(bytes).is_ok()
}

/// Re-encodes any valid SEC1 public key in compressed form.
pub fn compress_public_key(bytes: &[u8]) -> Result<[u8; 33], CryptoError> {
    let key = VerifyingKey::from_sec1_bytes(bytes)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    key.to_encoded_point(true)
        .as_bytes()
        .try_into()
        .map_err(|_| CryptoError::InvalidPublicKey("unexpected encoding length".into()))
}

/// Verifies a DER signature (without sighash byte) over a digest.
pub fn verify_digest(
    public_key: &[u8],
    digest: &[u8; 32],
    der_signature: &[u8],
) -> Result<bool, CryptoError> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    let sig = Signature::from_der(der_signature)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    Ok(key.verify_prehash(digest, &sig).is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const GENERATOR_COMPRESSED: &str =
        "0279be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798";

    fn key_one() -> PrivateKey {
        let mut bytes = [0u8; 32];
        bytes[31] = 1;
        PrivateKey::from_bytes(&bytes).unwrap()
    }

    #[test]
    fn public_key_of_one_is_generator() {
        let pk = key_one().public_key().unwrap();
        assert_eq!(hex::encode(pk), GENERATOR_COMPRESSED);
    }

    #[test]
    fn uncompressed_key_starts_with_04() {
        let pk = key_one().public_key_uncompressed().unwrap();
        assert_eq!(pk[0], 0x04);
        assert_eq!(compress_public_key(&pk).unwrap(), key_one().public_key().unwrap());
    }

    #[test]
    fn zero_scalar_is_rejected() {
        assert!(matches!(
            PrivateKey::from_bytes(&[0u8; 32]),
            Err(CryptoError::InvalidPrivateKey(_))
        ));
    }

    #[test]
    fn signature_verifies_and_is_low_s() {
        let key = key_one();
        let digest = crate::hash::double_sha256(b"payload");
        let der = key.sign_digest(&digest).unwrap();

        // DER: 0x30 len 0x02 rlen r 0x02 slen s
        assert_eq!(der[0], 0x30);
        assert!(der.len() <= 72);

        let pk = key.public_key().unwrap();
        assert!(verify_digest(&pk, &digest, &der).unwrap());

        let sig = Signature::from_der(&der).unwrap();
        assert!(sig.normalize_s().is_none(), "signature must already be low-S");
    }

    #[test]
    fn signing_is_deterministic() {
        let key = key_one();
        let digest = [0x42u8; 32];
        assert_eq!(key.sign_digest(&digest).unwrap(), key.sign_digest(&digest).unwrap());
    }

    #[test]
    fn verify_rejects_other_digest() {
        let key = key_one();
        let der = key.sign_digest(&[1u8; 32]).unwrap();
        let pk = key.public_key().unwrap();
        assert!(!verify_digest(&pk, &[2u8; 32], &der).unwrap());
    }

    #[test]
    fn public_key_validation() {
        let pk = key_one().public_key().unwrap();
        assert!(is_valid_public_key(&pk));
        assert!(!is_valid_public_key(&pk[..32]));
        assert!(!is_valid_public_key(&[0x05; 33]));
    }

    #[test]
    fn debug_hides_secret() {
        assert_eq!(format!("{:?}", key_one()), "PrivateKey(..)");
    }
}
