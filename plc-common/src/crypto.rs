//! did:key parsing and detached ECDSA signature verification.
//!
//! The directory permits two curves, discriminated by the multicodec prefix
//! inside the did:key: secp256k1 (`0xe7`) and NIST P-256 (`0x1200`).
//! Signatures are 64-byte `r || s` values carried as unpadded base64url.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as BASE64;
use multibase::Base;

use crate::cbor;
use crate::error::{PlcError, Result};
use crate::types::Operation;

const SECP256K1_PUB: u64 = 0xe7;
const P256_PUB: u64 = 0x1200;

/// A public key recovered from a did:key identifier.
#[derive(Debug, Clone)]
pub enum PublicKey {
    Secp256k1(k256::ecdsa::VerifyingKey),
    P256(p256::ecdsa::VerifyingKey),
}

impl PublicKey {
    /// Parse a `did:key:z...` identifier into a verifying key.
    pub fn from_did_key(did_key: &str) -> Result<Self> {
        let encoded = did_key
            .strip_prefix("did:key:")
            .ok_or_else(|| PlcError::Malformed(format!("not a did:key: {did_key}")))?;
        let (base, data) = multibase::decode(encoded)
            .map_err(|e| PlcError::Malformed(format!("did:key multibase: {e}")))?;
        if base != Base::Base58Btc {
            return Err(PlcError::Malformed(format!(
                "did:key must be base58btc, got {base:?}"
            )));
        }
        let (code, rest) = read_uvarint(&data)
            .ok_or_else(|| PlcError::Malformed("did:key missing multicodec prefix".to_string()))?;
        match code {
            SECP256K1_PUB => k256::ecdsa::VerifyingKey::from_sec1_bytes(rest)
                .map(Self::Secp256k1)
                .map_err(|e| PlcError::Malformed(format!("secp256k1 public key: {e}"))),
            P256_PUB => p256::ecdsa::VerifyingKey::from_sec1_bytes(rest)
                .map(Self::P256)
                .map_err(|e| PlcError::Malformed(format!("p-256 public key: {e}"))),
            other => Err(PlcError::Malformed(format!(
                "unsupported did:key multicodec 0x{other:x}"
            ))),
        }
    }

    /// Render the compressed-point did:key form of this key.
    pub fn to_did_key(&self) -> String {
        let (code, point) = match self {
            Self::Secp256k1(key) => (SECP256K1_PUB, key.to_encoded_point(true).as_bytes().to_vec()),
            Self::P256(key) => (P256_PUB, key.to_encoded_point(true).as_bytes().to_vec()),
        };
        let mut data = encode_uvarint(code);
        data.extend_from_slice(&point);
        format!("did:key:{}", multibase::encode(Base::Base58Btc, data))
    }

    /// Verify a 64-byte `r || s` signature over `data`. High-S signatures are
    /// normalized first; the upstream directory accepts both encodings.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> bool {
        match self {
            Self::Secp256k1(key) => {
                use k256::ecdsa::signature::Verifier;
                let Ok(sig) = k256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                let sig = sig.normalize_s().unwrap_or(sig);
                key.verify(data, &sig).is_ok()
            }
            Self::P256(key) => {
                use p256::ecdsa::signature::Verifier;
                let Ok(sig) = p256::ecdsa::Signature::from_slice(signature) else {
                    return false;
                };
                let sig = sig.normalize_s().unwrap_or(sig);
                key.verify(data, &sig).is_ok()
            }
        }
    }
}

/// Verify an operation's signature against an ordered list of did:keys.
///
/// Returns the first key in `allowed` that verifies. A padded signature (any
/// trailing `=`) is rejected before any cryptography runs; entries in
/// `allowed` that fail to parse as did:keys are skipped, since they can never
/// be the verifying key.
pub fn verify_operation_signature(allowed: &[String], op: &Operation) -> Result<String> {
    let sig = op.sig();
    if sig.is_empty() || sig.ends_with('=') {
        return Err(PlcError::InvalidSignature(Box::new(op.clone())));
    }
    let Ok(sig_bytes) = BASE64.decode(sig) else {
        return Err(PlcError::InvalidSignature(Box::new(op.clone())));
    };

    let payload = cbor::signing_payload(op)?;
    for did_key in allowed {
        let Ok(public) = PublicKey::from_did_key(did_key) else {
            continue;
        };
        if public.verify(&payload, &sig_bytes) {
            return Ok(did_key.clone());
        }
    }
    Err(PlcError::InvalidSignature(Box::new(op.clone())))
}

fn read_uvarint(bytes: &[u8]) -> Option<(u64, &[u8])> {
    let mut value = 0u64;
    let mut shift = 0u32;
    for (i, byte) in bytes.iter().enumerate() {
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some((value, &bytes[i + 1..]));
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }
    None
}

fn encode_uvarint(mut value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        out.push(byte);
        if value == 0 {
            return out;
        }
    }
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::signature::Signer;

    use super::*;
    use crate::test_support::{p256_key, secp_key, sign_operation, unsigned_tombstone};

    #[test]
    fn did_key_roundtrip_secp256k1() {
        let key = secp_key(0x11);
        let parsed = PublicKey::from_did_key(&key.did_key).unwrap();
        assert!(matches!(parsed, PublicKey::Secp256k1(_)));
        assert_eq!(parsed.to_did_key(), key.did_key);
        assert!(key.did_key.starts_with("did:key:z"));
    }

    #[test]
    fn did_key_roundtrip_p256() {
        let key = p256_key(0x22);
        let parsed = PublicKey::from_did_key(&key.did_key).unwrap();
        assert!(matches!(parsed, PublicKey::P256(_)));
        assert_eq!(parsed.to_did_key(), key.did_key);
    }

    #[test]
    fn malformed_did_keys_rejected() {
        assert!(PublicKey::from_did_key("did:web:example.com").is_err());
        assert!(PublicKey::from_did_key("did:key:bnotbase58").is_err());
        // Ed25519 multicodec (0xed) is not a directory curve.
        let mut data = encode_uvarint(0xed);
        data.extend_from_slice(&[0u8; 32]);
        let did_key = format!("did:key:{}", multibase::encode(Base::Base58Btc, data));
        assert!(PublicKey::from_did_key(&did_key).is_err());
    }

    #[test]
    fn signature_verifies_and_binds_to_message() {
        let key = secp_key(0x33);
        let public = PublicKey::from_did_key(&key.did_key).unwrap();
        let sig: k256::ecdsa::Signature = key.signing.sign(b"message");
        assert!(public.verify(b"message", &sig.to_bytes()));
        assert!(!public.verify(b"other message", &sig.to_bytes()));
    }

    #[test]
    fn high_s_signature_is_normalized() {
        let key = secp_key(0x44);
        let public = PublicKey::from_did_key(&key.did_key).unwrap();
        let sig: k256::ecdsa::Signature = key.signing.sign(b"message");
        let (r, s) = sig.split_scalars();
        let flipped =
            k256::ecdsa::Signature::from_scalars(r.to_bytes(), (-*s).to_bytes()).unwrap();
        // One of the two encodings is the high-S form; both must verify.
        assert!(public.verify(b"message", &sig.to_bytes()));
        assert!(public.verify(b"message", &flipped.to_bytes()));
    }

    #[test]
    fn operation_signature_first_match_wins() {
        let signer = secp_key(0x55);
        let other = secp_key(0x66);
        let op = sign_operation(unsigned_tombstone("bafyprev"), &signer.signing);

        let allowed = vec![other.did_key.clone(), signer.did_key.clone()];
        assert_eq!(
            verify_operation_signature(&allowed, &op).unwrap(),
            signer.did_key
        );

        // Duplicates collapse to the earliest occurrence.
        let allowed = vec![
            signer.did_key.clone(),
            other.did_key.clone(),
            signer.did_key.clone(),
        ];
        assert_eq!(
            verify_operation_signature(&allowed, &op).unwrap(),
            signer.did_key
        );
    }

    #[test]
    fn unlisted_signer_fails() {
        let signer = secp_key(0x17);
        let other = secp_key(0x18);
        let op = sign_operation(unsigned_tombstone("bafyprev"), &signer.signing);
        let err = verify_operation_signature(&[other.did_key], &op).unwrap_err();
        assert!(matches!(err, PlcError::InvalidSignature(_)));
    }

    #[test]
    fn padded_signature_rejected_before_crypto() {
        let signer = secp_key(0x19);
        let mut op = sign_operation(unsigned_tombstone("bafyprev"), &signer.signing);
        if let Operation::PlcTombstone(t) = &mut op {
            t.sig.push('=');
        }
        // Even an unparseable allowed list never gets consulted.
        let err =
            verify_operation_signature(&["not-a-did-key".to_string()], &op).unwrap_err();
        assert!(matches!(err, PlcError::InvalidSignature(_)));
    }

    #[test]
    fn unparseable_allowed_entries_are_skipped() {
        let signer = secp_key(0x1a);
        let op = sign_operation(unsigned_tombstone("bafyprev"), &signer.signing);
        let allowed = vec!["garbage".to_string(), signer.did_key.clone()];
        assert_eq!(
            verify_operation_signature(&allowed, &op).unwrap(),
            signer.did_key
        );
    }

    #[test]
    fn uvarint_roundtrip() {
        for value in [0u64, 1, 0x7f, 0x80, 0xe7, 0x1200, 0xffff] {
            let encoded = encode_uvarint(value);
            let (decoded, rest) = read_uvarint(&encoded).unwrap();
            assert_eq!(decoded, value);
            assert!(rest.is_empty());
        }
    }
}
