//! Signing tokens
//!
//! Issued links carry `v1.<base64url(contract_id ":" signatory_id)>`. Links
//! sent before versioning (`<contract_id>_<email>`) still decode; they are
//! never issued anymore.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::contract::SignatoryRef;
use crate::error::ContractError;

const V1_PREFIX: &str = "v1.";
const LEGACY_SEPARATOR: char = '_';

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SigningToken {
    V1 {
        contract_id: Uuid,
        signatory_id: Uuid,
    },
    /// Pre-versioning link; `email` never contains the separator
    Legacy { contract_id: String, email: String },
}

impl SigningToken {
    pub fn new(contract_id: Uuid, signatory_id: Uuid) -> Self {
        Self::V1 {
            contract_id,
            signatory_id,
        }
    }

    pub fn encode(&self) -> String {
        match self {
            Self::V1 {
                contract_id,
                signatory_id,
            } => {
                let payload = format!("{contract_id}:{signatory_id}");
                format!("{V1_PREFIX}{}", URL_SAFE_NO_PAD.encode(payload))
            }
            Self::Legacy { contract_id, email } => {
                format!("{contract_id}{LEGACY_SEPARATOR}{email}")
            }
        }
    }

    pub fn decode(raw: &str) -> Result<Self, ContractError> {
        let raw = raw.trim();
        if let Some(body) = raw.strip_prefix(V1_PREFIX) {
            if let Some(token) = Self::decode_v1(body) {
                return Ok(token);
            }
        }
        Self::decode_legacy(raw).ok_or(ContractError::InvalidToken)
    }

    fn decode_v1(body: &str) -> Option<Self> {
        let bytes = URL_SAFE_NO_PAD.decode(body).ok()?;
        let payload = String::from_utf8(bytes).ok()?;
        let (contract, signatory) = payload.split_once(':')?;
        Some(Self::V1 {
            contract_id: Uuid::parse_str(contract).ok()?,
            signatory_id: Uuid::parse_str(signatory).ok()?,
        })
    }

    fn decode_legacy(raw: &str) -> Option<Self> {
        let (contract_id, email) = raw.rsplit_once(LEGACY_SEPARATOR)?;
        if contract_id.is_empty() || !email.contains('@') {
            return None;
        }
        Some(Self::Legacy {
            contract_id: contract_id.to_string(),
            email: email.to_string(),
        })
    }

    /// Contract id as stored; legacy ids that are not UUIDs cannot exist.
    pub fn contract_id(&self) -> Result<Uuid, ContractError> {
        match self {
            Self::V1 { contract_id, .. } => Ok(*contract_id),
            Self::Legacy { contract_id, .. } => {
                Uuid::parse_str(contract_id).map_err(|_| ContractError::InvalidToken)
            }
        }
    }

    pub fn signatory(&self) -> SignatoryRef {
        match self {
            Self::V1 { signatory_id, .. } => SignatoryRef::Id(*signatory_id),
            Self::Legacy { email, .. } => SignatoryRef::Email(email.clone()),
        }
    }

    /// Full signing link under `base_url`.
    pub fn link(&self, base_url: &str) -> String {
        format!("{}/{}", base_url.trim_end_matches('/'), self.encode())
    }
}

impl fmt::Display for SigningToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for SigningToken {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
