use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Operation variants
// ---------------------------------------------------------------------------

/// A service entry inside a `plc_operation`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    #[serde(rename = "type")]
    pub service_type: String,
    pub endpoint: String,
}

/// The current (v2) operation shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlcOperation {
    pub verification_methods: BTreeMap<String, String>,
    pub rotation_keys: Vec<String>,
    pub also_known_as: Vec<String>,
    pub services: BTreeMap<String, Service>,
    pub prev: Option<String>,
    pub sig: String,
}

/// The legacy (v1) genesis shape. `prev` is always null for a valid genesis
/// but is carried as written so malformed logs fail in the validator, not in
/// serde.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateV1 {
    pub signing_key: String,
    pub recovery_key: String,
    pub handle: String,
    pub service: String,
    pub prev: Option<String>,
    pub sig: String,
}

/// A terminal operation revoking the DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tombstone {
    pub prev: String,
    pub sig: String,
}

/// Any operation that can appear in a DID's log, discriminated by the wire
/// `type` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Operation {
    #[serde(rename = "plc_operation")]
    PlcOperation(PlcOperation),

    #[serde(rename = "create")]
    Create(CreateV1),

    #[serde(rename = "plc_tombstone")]
    PlcTombstone(Tombstone),
}

impl Operation {
    pub fn sig(&self) -> &str {
        match self {
            Self::PlcOperation(op) => &op.sig,
            Self::Create(op) => &op.sig,
            Self::PlcTombstone(op) => &op.sig,
        }
    }

    pub fn prev(&self) -> Option<&str> {
        match self {
            Self::PlcOperation(op) => op.prev.as_deref(),
            Self::Create(op) => op.prev.as_deref(),
            Self::PlcTombstone(op) => Some(&op.prev),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        matches!(self, Self::PlcTombstone(_))
    }

    /// Map this operation into the canonical v2 shape. Legacy `create`
    /// operations are restructured (recovery key outranks signing key);
    /// tombstones have no document view and yield `None`.
    ///
    /// Normalization is structural only: it does not re-sign, and the result
    /// is never used for hashing — v1 operations hash in their v1 form.
    pub fn normalized(&self) -> Option<PlcOperation> {
        match self {
            Self::PlcOperation(op) => Some(op.clone()),
            Self::Create(op) => Some(PlcOperation {
                verification_methods: BTreeMap::from([(
                    "atproto".to_string(),
                    op.signing_key.clone(),
                )]),
                rotation_keys: vec![op.recovery_key.clone(), op.signing_key.clone()],
                also_known_as: vec![ensure_at(&op.handle)],
                services: BTreeMap::from([(
                    "atproto_pds".to_string(),
                    Service {
                        service_type: "AtprotoPersonalDataServer".to_string(),
                        endpoint: ensure_https(&op.service),
                    },
                )]),
                prev: op.prev.clone(),
                sig: op.sig.clone(),
            }),
            Self::PlcTombstone(_) => None,
        }
    }
}

/// Prefix `value` with `https://` unless it already carries an http scheme.
pub fn ensure_https(value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("https://{value}")
    }
}

/// Prefix `value` with `at://`, stripping the first occurrence of an http
/// scheme anywhere in the string first (matching the upstream directory's
/// behavior byte for byte).
pub fn ensure_at(value: &str) -> String {
    if value.starts_with("at://") {
        return value.to_string();
    }
    let stripped = value.replacen("http://", "", 1).replacen("https://", "", 1);
    format!("at://{stripped}")
}

// ---------------------------------------------------------------------------
// Indexed operations and documents
// ---------------------------------------------------------------------------

/// One line of the export stream: an operation together with the index data
/// the directory attaches to it. `cid` and `createdAt` come from storage; the
/// `nullified` flag is informational and never trusted by the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEntry {
    pub did: String,
    pub operation: Operation,
    pub cid: String,
    pub nullified: bool,
    pub created_at: String,
}

/// The identity document derived from the last non-tombstone operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    pub did: String,
    pub verification_methods: BTreeMap<String, String>,
    pub rotation_keys: Vec<String>,
    pub also_known_as: Vec<String>,
    pub services: BTreeMap<String, Service>,
}

impl DidDocument {
    pub fn new(did: &str, op: &PlcOperation) -> Self {
        Self {
            did: did.to_string(),
            verification_methods: op.verification_methods.clone(),
            rotation_keys: op.rotation_keys.clone(),
            also_known_as: op.also_known_as.clone(),
            services: op.services.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_v1() -> CreateV1 {
        CreateV1 {
            signing_key: "did:key:zSigning".to_string(),
            recovery_key: "did:key:zRecovery".to_string(),
            handle: "alice.example.com".to_string(),
            service: "pds.example.com".to_string(),
            prev: None,
            sig: "c2ln".to_string(),
        }
    }

    #[test]
    fn operation_json_uses_wire_tags() {
        let op = Operation::Create(sample_v1());
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["type"], "create");
        assert_eq!(json["signingKey"], "did:key:zSigning");
        assert!(json.get("signing_key").is_none());

        let tomb = Operation::PlcTombstone(Tombstone {
            prev: "bafyprev".to_string(),
            sig: "c2ln".to_string(),
        });
        let json = serde_json::to_value(&tomb).unwrap();
        assert_eq!(json["type"], "plc_tombstone");
    }

    #[test]
    fn operation_json_roundtrip() {
        let op = Operation::PlcOperation(PlcOperation {
            verification_methods: BTreeMap::from([(
                "atproto".to_string(),
                "did:key:zKey".to_string(),
            )]),
            rotation_keys: vec!["did:key:zR1".to_string(), "did:key:zR2".to_string()],
            also_known_as: vec!["at://alice.example.com".to_string()],
            services: BTreeMap::from([(
                "atproto_pds".to_string(),
                Service {
                    service_type: "AtprotoPersonalDataServer".to_string(),
                    endpoint: "https://pds.example.com".to_string(),
                },
            )]),
            prev: None,
            sig: "c2ln".to_string(),
        });
        let json = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&json).unwrap();
        assert_eq!(back, op);
    }

    #[test]
    fn normalize_legacy_create() {
        let op = Operation::Create(sample_v1());
        let v2 = op.normalized().unwrap();
        assert_eq!(
            v2.rotation_keys,
            vec!["did:key:zRecovery".to_string(), "did:key:zSigning".to_string()]
        );
        assert_eq!(
            v2.verification_methods.get("atproto").unwrap(),
            "did:key:zSigning"
        );
        assert_eq!(v2.also_known_as, vec!["at://alice.example.com".to_string()]);
        let pds = v2.services.get("atproto_pds").unwrap();
        assert_eq!(pds.service_type, "AtprotoPersonalDataServer");
        assert_eq!(pds.endpoint, "https://pds.example.com");
        assert_eq!(v2.prev, None);
        assert_eq!(v2.sig, "c2ln");
    }

    #[test]
    fn normalize_is_idempotent() {
        let once = Operation::Create(sample_v1()).normalized().unwrap();
        let twice = Operation::PlcOperation(once.clone()).normalized().unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn normalize_tombstone_has_no_document_view() {
        let tomb = Operation::PlcTombstone(Tombstone {
            prev: "bafyprev".to_string(),
            sig: "c2ln".to_string(),
        });
        assert!(tomb.normalized().is_none());
    }

    #[test]
    fn ensure_https_leaves_schemes_alone() {
        assert_eq!(ensure_https("https://pds.example.com"), "https://pds.example.com");
        assert_eq!(ensure_https("http://pds.example.com"), "http://pds.example.com");
        assert_eq!(ensure_https("pds.example.com"), "https://pds.example.com");
    }

    #[test]
    fn ensure_at_strips_first_http_occurrence() {
        assert_eq!(ensure_at("at://alice.example.com"), "at://alice.example.com");
        assert_eq!(ensure_at("https://alice.example.com"), "at://alice.example.com");
        assert_eq!(ensure_at("alice.example.com"), "at://alice.example.com");
        // The strip applies to the first occurrence anywhere in the string.
        assert_eq!(ensure_at("weird.http://host"), "at://weird.host");
    }

    #[test]
    fn log_entry_serializes_camel_case() {
        let entry = LogEntry {
            did: "did:plc:aaaabbbbccccddddeeeeffff".to_string(),
            operation: Operation::Create(sample_v1()),
            cid: "bafyop".to_string(),
            nullified: false,
            created_at: "2023-01-01T00:00:00.000Z".to_string(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"createdAt\""));
        assert!(json.contains("\"nullified\":false"));
        assert!(!json.contains("\"created_at\""));
    }
}
