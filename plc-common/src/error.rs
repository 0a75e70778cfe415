use crate::types::Operation;

/// Validation failures raised while replaying an operation log, plus a
/// `Malformed` kind for inputs that cannot be decoded at all.
#[derive(Debug, thiserror::Error)]
pub enum PlcError {
    #[error("operation is out of order for this log")]
    MisorderedOperation,

    #[error("signature does not verify under any permitted rotation key")]
    InvalidSignature(Box<Operation>),

    #[error("genesis operation hashes to a different DID, expected {0}")]
    GenesisHash(String),

    #[error("improper operation: {message}")]
    ImproperOperation {
        message: String,
        operation: Box<Operation>,
    },

    #[error("recovery attempted {0} ms after the nullified operation, outside the 72 hour window")]
    LateRecovery(i64),

    #[error("malformed input: {0}")]
    Malformed(String),
}

pub type Result<T> = std::result::Result<T, PlcError>;

impl PlcError {
    /// Return a short label for the error category.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MisorderedOperation => "misordered_operation",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::GenesisHash(_) => "genesis_hash",
            Self::ImproperOperation { .. } => "improper_operation",
            Self::LateRecovery(_) => "late_recovery",
            Self::Malformed(_) => "malformed",
        }
    }

    /// True for errors that describe an invalid operation log, as opposed to
    /// inputs the validator could not decode in the first place. The HTTP
    /// layer uses this to tell "bad log" from "internal error".
    pub fn is_validation(&self) -> bool {
        !matches!(self, Self::Malformed(_))
    }
}
