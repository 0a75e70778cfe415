//! Deterministic dag-cbor encoding of operations, and the CIDv1 content
//! addressing built on top of it.
//!
//! Signing and DID derivation both depend on byte-exact output, so maps are
//! built explicitly with keys in canonical order (shorter keys first, then
//! lexicographic) rather than trusting a serializer's field order.

use ciborium::Value;
use cid::Cid;
use multihash_codetable::{Code, MultihashDigest};

use crate::error::{PlcError, Result};
use crate::types::Operation;

/// Multicodec code for dag-cbor, used in every operation CID.
const DAG_CBOR: u64 = 0x71;

/// Canonical bytes of `op` with the `sig` field removed entirely. This is the
/// payload that rotation keys sign.
pub fn signing_payload(op: &Operation) -> Result<Vec<u8>> {
    encode(&operation_value(op, false))
}

/// Canonical bytes of `op` with the signature included, as stored by the
/// directory. `prev` links and the genesis DID are derived from this form.
pub fn signed_bytes(op: &Operation) -> Result<Vec<u8>> {
    encode(&operation_value(op, true))
}

/// CIDv1 (dag-cbor, sha2-256) of the signed operation.
pub fn cid_for_operation(op: &Operation) -> Result<Cid> {
    let bytes = signed_bytes(op)?;
    Ok(Cid::new_v1(DAG_CBOR, Code::Sha2_256.digest(&bytes)))
}

/// Decode an operation from its canonical CBOR bytes.
pub fn decode_operation(bytes: &[u8]) -> Result<Operation> {
    ciborium::from_reader(bytes).map_err(|e| PlcError::Malformed(format!("cbor decode: {e}")))
}

/// String form of a CID: base32-lower multibase, as used in `prev` links.
pub fn cid_to_string(cid: &Cid) -> String {
    cid.to_string()
}

pub fn cid_from_string(value: &str) -> Result<Cid> {
    Cid::try_from(value).map_err(|e| PlcError::Malformed(format!("cid parse: {e}")))
}

fn encode(value: &Value) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| PlcError::Malformed(format!("cbor encode: {e}")))?;
    Ok(bytes)
}

/// Build a CBOR map with keys in dag-cbor canonical order: sorted by byte
/// length, then lexicographically.
fn canonical_map(mut entries: Vec<(String, Value)>) -> Value {
    entries.sort_by(|(a, _), (b, _)| a.len().cmp(&b.len()).then_with(|| a.cmp(b)));
    Value::Map(
        entries
            .into_iter()
            .map(|(key, value)| (Value::Text(key), value))
            .collect(),
    )
}

fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

fn text_array(values: &[String]) -> Value {
    Value::Array(values.iter().map(|v| text(v)).collect())
}

fn prev_value(prev: Option<&str>) -> Value {
    match prev {
        Some(cid) => text(cid),
        None => Value::Null,
    }
}

/// The CBOR value of an operation in its own wire shape. Legacy v1 creates
/// keep their v1 fields: normalization never feeds the encoder.
fn operation_value(op: &Operation, include_sig: bool) -> Value {
    let mut entries: Vec<(String, Value)> = Vec::new();
    if include_sig {
        entries.push(("sig".to_string(), text(op.sig())));
    }

    match op {
        Operation::PlcOperation(op) => {
            entries.push(("type".to_string(), text("plc_operation")));
            entries.push(("prev".to_string(), prev_value(op.prev.as_deref())));
            entries.push((
                "verificationMethods".to_string(),
                canonical_map(
                    op.verification_methods
                        .iter()
                        .map(|(k, v)| (k.clone(), text(v)))
                        .collect(),
                ),
            ));
            entries.push(("rotationKeys".to_string(), text_array(&op.rotation_keys)));
            entries.push(("alsoKnownAs".to_string(), text_array(&op.also_known_as)));
            entries.push((
                "services".to_string(),
                canonical_map(
                    op.services
                        .iter()
                        .map(|(k, v)| {
                            (
                                k.clone(),
                                canonical_map(vec![
                                    ("type".to_string(), text(&v.service_type)),
                                    ("endpoint".to_string(), text(&v.endpoint)),
                                ]),
                            )
                        })
                        .collect(),
                ),
            ));
        }
        Operation::Create(op) => {
            entries.push(("type".to_string(), text("create")));
            entries.push(("prev".to_string(), prev_value(op.prev.as_deref())));
            entries.push(("signingKey".to_string(), text(&op.signing_key)));
            entries.push(("recoveryKey".to_string(), text(&op.recovery_key)));
            entries.push(("handle".to_string(), text(&op.handle)));
            entries.push(("service".to_string(), text(&op.service)));
        }
        Operation::PlcTombstone(op) => {
            entries.push(("type".to_string(), text("plc_tombstone")));
            entries.push(("prev".to_string(), text(&op.prev)));
        }
    }

    canonical_map(entries)
}
