//! Signature oracle and composability hooks.

pub mod hooks;

pub use hooks::{HookRegistry, OrderHook, HOOK_RETURN_MAGIC};

use crate::domain::AccountId;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha3::{Digest, Keccak256};
use tracing::trace;

/// Length of an `r ‖ s ‖ v` signature.
pub const SIGNATURE_LEN: usize = 65;

/// Verified-boolean signature oracle over 32-byte digests.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, signer: &AccountId, digest: &[u8; 32], signature: &[u8]) -> bool;
}

/// secp256k1 recover-and-compare: a signature is valid when the address
/// recovered from it equals the claimed signer.
#[derive(Debug, Clone, Copy, Default)]
pub struct EcdsaVerifier;

impl SignatureVerifier for EcdsaVerifier {
    fn verify(&self, signer: &AccountId, digest: &[u8; 32], signature: &[u8]) -> bool {
        match recover_signer(digest, signature) {
            Some(recovered) => {
                trace!(%signer, %recovered, "recovered signer");
                recovered == *signer
            }
            None => false,
        }
    }
}

/// Recover the signing address from a 65-byte `r ‖ s ‖ v` signature.
/// `v` may be 0/1 or 27/28. High-s signatures are rejected.
pub fn recover_signer(digest: &[u8; 32], signature: &[u8]) -> Option<AccountId> {
    if signature.len() != SIGNATURE_LEN {
        return None;
    }
    let sig = Signature::from_slice(&signature[..64]).ok()?;
    if sig.normalize_s().is_some() {
        return None;
    }
    let v = match signature[64] {
        v @ (0 | 1) => v,
        v @ (27 | 28) => v - 27,
        _ => return None,
    };
    let recovery_id = RecoveryId::from_byte(v)?;
    let key = VerifyingKey::recover_from_prehash(digest, &sig, recovery_id).ok()?;
    Some(address_of(&key))
}

/// Account id of a public key: the low 20 bytes of keccak256 over the
/// uncompressed point without its prefix byte.
pub fn address_of(key: &VerifyingKey) -> AccountId {
    let point = key.as_affine().to_encoded_point(false);
    let hash = Keccak256::digest(&point.as_bytes()[1..]);
    let mut bytes = [0u8; 20];
    bytes.copy_from_slice(&hash[12..]);
    AccountId::new(bytes)
}

/// Sign `digest` as `r ‖ s ‖ v` with `v` in {27, 28}.
pub fn sign_digest(key: &SigningKey, digest: &[u8; 32]) -> Result<Vec<u8>, k256::ecdsa::Error> {
    let (sig, recovery_id) = key.sign_prehash_recoverable(digest)?;
    let mut out = Vec::with_capacity(SIGNATURE_LEN);
    out.extend_from_slice(&sig.to_bytes());
    out.push(recovery_id.to_byte() + 27);
    Ok(out)
}

/// Accepts every signature.
#[cfg(test)]
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAll;

#[cfg(test)]
impl SignatureVerifier for AcceptAll {
    fn verify(&self, _: &AccountId, _: &[u8; 32], _: &[u8]) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    #[test]
    fn test_recovers_signing_address() {
        let signer = key(7);
        let digest = [9u8; 32];
        let sig = sign_digest(&signer, &digest).unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);

        let address = address_of(signer.verifying_key());
        assert_eq!(recover_signer(&digest, &sig), Some(address));
        assert!(EcdsaVerifier.verify(&address, &digest, &sig));
    }

    #[test]
    fn test_rejects_wrong_signer_digest_or_encoding() {
        let signer = key(7);
        let address = address_of(signer.verifying_key());
        let digest = [9u8; 32];
        let sig = sign_digest(&signer, &digest).unwrap();

        let other = address_of(key(8).verifying_key());
        assert!(!EcdsaVerifier.verify(&other, &digest, &sig));
        assert!(!EcdsaVerifier.verify(&address, &[1u8; 32], &sig));
        assert!(!EcdsaVerifier.verify(&address, &digest, &sig[..64]));
        assert!(!EcdsaVerifier.verify(&address, &digest, &[0u8; SIGNATURE_LEN]));

        let mut bad_v = sig.clone();
        bad_v[64] = 5;
        assert!(!EcdsaVerifier.verify(&address, &digest, &bad_v));
    }

    #[test]
    fn test_accepts_raw_recovery_byte() {
        let signer = key(3);
        let digest = [4u8; 32];
        let mut sig = sign_digest(&signer, &digest).unwrap();
        sig[64] -= 27;
        assert!(EcdsaVerifier.verify(&address_of(signer.verifying_key()), &digest, &sig));
    }

    #[test]
    fn test_known_address() {
        // private key 1 is the secp256k1 generator
        let one = {
            let mut bytes = [0u8; 32];
            bytes[31] = 1;
            SigningKey::from_slice(&bytes).unwrap()
        };
        assert_eq!(
            address_of(one.verifying_key()).to_string(),
            "0x7e5f4552091a69125d5dfcb7b8c2659029395bdf"
        );
    }
}
