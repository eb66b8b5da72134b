use thiserror::Error;
use uuid::Uuid;

use crate::contract::ContractStatus;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("missing contact info: {0}")]
    MissingContactInfo(String),

    #[error("cannot {action} a contract in status {from}")]
    InvalidTransition {
        from: ContractStatus,
        action: &'static str,
    },

    #[error("contract {0} has no pending signatories")]
    NoPendingSignatories(Uuid),

    #[error("invalid signing token")]
    InvalidToken,

    #[error("contract not found: {0}")]
    ContractNotFound(Uuid),

    #[error("signatory not found: {0}")]
    SignatoryNotFound(String),

    #[error("template not found: {0}")]
    TemplateNotFound(String),

    #[error("entity not found: {0}")]
    EntityNotFound(String),

    #[error("persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl ContractError {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::MissingContactInfo(_)
            | Self::InvalidTransition { .. }
            | Self::NoPendingSignatories(_)
            | Self::InvalidToken => 400,
            Self::ContractNotFound(_)
            | Self::SignatoryNotFound(_)
            | Self::TemplateNotFound(_)
            | Self::EntityNotFound(_) => 404,
            Self::Persistence(_) => 500,
        }
    }

    /// Stable machine-readable code for API bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::MissingContactInfo(_) => "missing_contact_info",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::NoPendingSignatories(_) => "no_pending_signatories",
            Self::InvalidToken => "invalid_token",
            Self::ContractNotFound(_) => "contract_not_found",
            Self::SignatoryNotFound(_) => "signatory_not_found",
            Self::TemplateNotFound(_) => "template_not_found",
            Self::EntityNotFound(_) => "entity_not_found",
            Self::Persistence(_) => "persistence_error",
        }
    }

    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }
}

pub type ContractResult<T> = Result<T, ContractError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_client_errors() {
        assert_eq!(ContractError::validation("x").http_status(), 400);
        assert_eq!(ContractError::InvalidToken.http_status(), 400);
        assert_eq!(
            ContractError::InvalidTransition {
                from: ContractStatus::Signed,
                action: "cancel",
            }
            .http_status(),
            400
        );
    }

    #[test]
    fn http_status_not_found() {
        assert_eq!(
            ContractError::ContractNotFound(Uuid::nil()).http_status(),
            404
        );
        assert_eq!(
            ContractError::SignatoryNotFound("a@b.c".into()).http_status(),
            404
        );
    }

    #[test]
    fn http_status_persistence() {
        let err = ContractError::Persistence(anyhow::anyhow!("disk full"));
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.code(), "persistence_error");
    }

    #[test]
    fn display_invalid_transition() {
        let err = ContractError::InvalidTransition {
            from: ContractStatus::Cancelled,
            action: "send",
        };
        assert_eq!(err.to_string(), "cannot send a contract in status cancelado");
    }
}
