//! Generated contract aggregate
//!
//! A `GeneratedContract` is the persisted result of filling a template for one
//! target entity. It carries its own roster of signatories and an overall
//! status driven by the state machine below:
//!
//! ```text
//! rascunho ──send──▶ aguardando_assinaturas ──sign──▶ parcialmente_assinado
//!     │                     │    │                        │     │
//!     │                     │    └──────last sign──────▶ assinado
//!     │                     └──deadline──▶ expirado ◀──────┘     │
//!     └────────cancel (any non-terminal)──▶ cancelado ◀──────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::entity::EntityKind;
use crate::error::{ContractError, ContractResult};
use crate::resolution::TokenTable;

/// Overall status of a generated contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractStatus {
    #[serde(rename = "rascunho")]
    Draft,
    #[serde(rename = "aguardando_assinaturas")]
    AwaitingSignatures,
    #[serde(rename = "parcialmente_assinado")]
    PartiallySigned,
    #[serde(rename = "assinado")]
    Signed,
    #[serde(rename = "expirado")]
    Expired,
    #[serde(rename = "cancelado")]
    Cancelled,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 6] = [
        Self::Draft,
        Self::AwaitingSignatures,
        Self::PartiallySigned,
        Self::Signed,
        Self::Expired,
        Self::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "rascunho",
            Self::AwaitingSignatures => "aguardando_assinaturas",
            Self::PartiallySigned => "parcialmente_assinado",
            Self::Signed => "assinado",
            Self::Expired => "expirado",
            Self::Cancelled => "cancelado",
        }
    }

    /// Terminal states accept no mutation, only reads.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Signed | Self::Expired | Self::Cancelled)
    }

    /// States in which signatures may still be collected.
    pub fn is_collecting(&self) -> bool {
        matches!(self, Self::AwaitingSignatures | Self::PartiallySigned)
    }

    pub fn can_transition_to(&self, target: ContractStatus) -> bool {
        use ContractStatus::*;
        match (self, target) {
            (Draft, AwaitingSignatures) => true,
            (AwaitingSignatures, PartiallySigned | Signed) => true,
            (PartiallySigned, Signed) => true,
            (AwaitingSignatures | PartiallySigned, Expired) => true,
            (Draft | AwaitingSignatures | PartiallySigned, Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "rascunho" | "draft" => Ok(Self::Draft),
            "aguardando_assinaturas" | "awaiting_signatures" => Ok(Self::AwaitingSignatures),
            "parcialmente_assinado" | "partially_signed" => Ok(Self::PartiallySigned),
            "assinado" | "signed" => Ok(Self::Signed),
            "expirado" | "expired" => Ok(Self::Expired),
            "cancelado" | "cancelled" => Ok(Self::Cancelled),
            other => Err(ContractError::validation(format!(
                "unknown contract status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatoryRole {
    Client,
    Employee,
    Witness,
    AgencyPartner,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    Pending,
    Signed,
    // Modeled for completeness; no flow produces it yet.
    Rejected,
}

/// Where a signature request came from. Real client addresses are never
/// captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NetworkOrigin {
    #[default]
    Simulated,
}

/// Evidence collected when a signatory confirms their signature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditBlock {
    /// Timestamp reported by the signer's browser
    pub client_timestamp: DateTime<Utc>,
    pub user_agent: String,
    #[serde(default)]
    pub network_origin: NetworkOrigin,
    pub confirmed_name: String,
    pub confirmed_tax_id: String,
}

/// A party required to sign a generated contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signatory {
    pub id: Uuid,
    #[serde(rename = "nome")]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(rename = "papel")]
    pub role: SignatoryRole,
    #[serde(rename = "ordem", default)]
    pub signing_order: Option<u32>,
    pub status: SignatureStatus,
    #[serde(rename = "data_assinatura", default)]
    pub signed_at: Option<DateTime<Utc>>,
    #[serde(rename = "link_assinatura", default)]
    pub signing_link: Option<String>,
    #[serde(rename = "auditoria", default)]
    pub audit: Option<AuditBlock>,
}

impl Signatory {
    pub fn new(name: impl Into<String>, email: Option<String>, role: SignatoryRole) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            email: email
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty()),
            role,
            signing_order: None,
            status: SignatureStatus::Pending,
            signed_at: None,
            signing_link: None,
            audit: None,
        }
    }

    pub fn has_email(&self) -> bool {
        self.email.as_deref().is_some_and(|e| !e.trim().is_empty())
    }

    pub fn is_signed(&self) -> bool {
        self.status == SignatureStatus::Signed
    }

    pub fn is_pending(&self) -> bool {
        self.status == SignatureStatus::Pending
    }

    fn email_matches(&self, email: &str) -> bool {
        self.email
            .as_deref()
            .is_some_and(|own| own.trim().eq_ignore_ascii_case(email.trim()))
    }

    pub fn matches(&self, reference: &SignatoryRef) -> bool {
        match reference {
            SignatoryRef::Id(id) => self.id == *id,
            SignatoryRef::Email(email) => self.email_matches(email),
        }
    }
}

/// How a caller identifies a signatory on a contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatoryRef {
    Id(Uuid),
    Email(String),
}

impl fmt::Display for SignatoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Email(email) => f.write_str(email),
        }
    }
}

/// Template identity captured at generation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateRef {
    #[serde(rename = "template_id")]
    pub id: String,
    #[serde(rename = "template_nome")]
    pub name: String,
    #[serde(rename = "template_versao")]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRef {
    pub id: String,
    #[serde(rename = "nome")]
    pub name: String,
}

/// Frozen copy of everything used to render the contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSnapshot {
    pub tokens: TokenTable,
    pub template_body: String,
    /// Source records (entity, agency, selected service) as they were
    #[serde(default)]
    pub sources: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusTransition {
    pub from: ContractStatus,
    pub to: ContractStatus,
    pub at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedContract {
    pub id: Uuid,
    #[serde(flatten)]
    pub template: TemplateRef,
    #[serde(rename = "entidade_tipo")]
    pub entity_kind: EntityKind,
    #[serde(rename = "entidade_id")]
    pub entity_id: String,
    #[serde(rename = "entidade_nome")]
    pub entity_name: String,
    #[serde(rename = "servico", default)]
    pub service: Option<ServiceRef>,
    #[serde(rename = "documento_html")]
    pub document_html: String,
    #[serde(rename = "signatarios")]
    pub signatories: Vec<Signatory>,
    #[serde(rename = "status_geral")]
    pub status: ContractStatus,
    #[serde(rename = "dados_snapshot")]
    pub snapshot: DataSnapshot,
    #[serde(rename = "data_geracao")]
    pub generated_at: DateTime<Utc>,
    #[serde(rename = "data_envio_assinatura", default)]
    pub sent_at: Option<DateTime<Utc>>,
    #[serde(rename = "prazo_assinatura", default)]
    pub signing_deadline: Option<DateTime<Utc>>,
    #[serde(rename = "data_ultima_assinatura", default)]
    pub last_signed_at: Option<DateTime<Utc>>,
    #[serde(rename = "data_conclusao", default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(rename = "historico", default)]
    pub history: Vec<StatusTransition>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl GeneratedContract {
    pub fn find_signatory(&self, reference: &SignatoryRef) -> Option<&Signatory> {
        self.signatories.iter().find(|s| s.matches(reference))
    }

    pub fn signatory_index(&self, reference: &SignatoryRef) -> Option<usize> {
        self.signatories.iter().position(|s| s.matches(reference))
    }

    pub fn pending_signatories(&self) -> impl Iterator<Item = &Signatory> {
        self.signatories.iter().filter(|s| s.is_pending())
    }

    pub fn all_signed(&self) -> bool {
        !self.signatories.is_empty() && self.signatories.iter().all(Signatory::is_signed)
    }

    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        self.signing_deadline.is_some_and(|deadline| deadline <= now)
    }

    /// Move to `to`, recording the step in the history.
    pub fn transition(
        &mut self,
        to: ContractStatus,
        action: &'static str,
        reason: Option<String>,
    ) -> ContractResult<()> {
        if !self.status.can_transition_to(to) {
            return Err(ContractError::InvalidTransition {
                from: self.status,
                action,
            });
        }

        let now = Utc::now();
        let from = std::mem::replace(&mut self.status, to);
        self.history.push(StatusTransition {
            from,
            to,
            at: now,
            reason,
        });
        self.updated_at = now;
        Ok(())
    }

    /// Status implied by the roster while signatures are being collected.
    pub fn status_from_roster(&self) -> ContractStatus {
        if self.all_signed() {
            ContractStatus::Signed
        } else if self.signatories.iter().any(Signatory::is_signed) {
            ContractStatus::PartiallySigned
        } else {
            self.status
        }
    }

    /// `status == signed` must hold exactly when every signatory signed, and
    /// a pre-terminal status must be the one the roster implies: no
    /// signatures for draft and awaiting, at least one for partially signed.
    pub fn check_consistency(&self) -> ContractResult<()> {
        if self.signatories.is_empty() {
            return Err(ContractError::validation(
                "a contract needs at least one signatory",
            ));
        }
        let any_signed = self.signatories.iter().any(Signatory::is_signed);
        let roster_agrees = match self.status {
            ContractStatus::Signed => self.all_signed(),
            ContractStatus::Draft | ContractStatus::AwaitingSignatures => !any_signed,
            ContractStatus::PartiallySigned => any_signed && !self.all_signed(),
            ContractStatus::Expired | ContractStatus::Cancelled => !self.all_signed(),
        };
        if !roster_agrees {
            return Err(ContractError::validation(format!(
                "status {} is inconsistent with signatory statuses",
                self.status
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::resolution::TokenTable;

    pub(crate) fn sample_contract(signatories: Vec<Signatory>) -> GeneratedContract {
        let now = Utc::now();
        GeneratedContract {
            id: Uuid::new_v4(),
            template: TemplateRef {
                id: "agenciamento".into(),
                name: "Agenciamento".into(),
                version: "1.0".into(),
            },
            entity_kind: EntityKind::Client,
            entity_id: "cli-1".into(),
            entity_name: "AuMiau VetCare".into(),
            service: None,
            document_html: "<p>doc</p>".into(),
            signatories,
            status: ContractStatus::Draft,
            snapshot: DataSnapshot {
                tokens: TokenTable::new(),
                template_body: "<p>doc</p>".into(),
                sources: serde_json::Value::Null,
            },
            generated_at: now,
            sent_at: None,
            signing_deadline: None,
            last_signed_at: None,
            completed_at: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn signer(email: &str) -> Signatory {
        Signatory::new("Someone", Some(email.to_string()), SignatoryRole::Client)
    }

    #[test]
    fn test_status_wire_names() {
        for status in ContractStatus::ALL {
            let json = serde_json::to_value(status).unwrap();
            assert_eq!(json, serde_json::json!(status.as_str()));
            assert_eq!(status.as_str().parse::<ContractStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ContractStatus::ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ContractStatus::ALL {
                assert!(!from.can_transition_to(to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn test_nothing_returns_to_draft() {
        for from in ContractStatus::ALL {
            assert!(!from.can_transition_to(ContractStatus::Draft));
        }
    }

    #[test]
    fn test_transition_records_history() {
        let mut contract = sample_contract(vec![signer("a@x.com")]);
        contract
            .transition(ContractStatus::AwaitingSignatures, "send", None)
            .unwrap();

        assert_eq!(contract.status, ContractStatus::AwaitingSignatures);
        assert_eq!(contract.history.len(), 1);
        assert_eq!(contract.history[0].from, ContractStatus::Draft);
    }

    #[test]
    fn test_invalid_transition_leaves_state() {
        let mut contract = sample_contract(vec![signer("a@x.com")]);
        let err = contract
            .transition(ContractStatus::Signed, "sign", None)
            .unwrap_err();

        assert!(matches!(err, ContractError::InvalidTransition { .. }));
        assert_eq!(contract.status, ContractStatus::Draft);
        assert!(contract.history.is_empty());
    }

    #[test]
    fn test_signatory_email_match_is_case_insensitive() {
        let contract = sample_contract(vec![signer("Jane@Example.com")]);
        let found = contract.find_signatory(&SignatoryRef::Email("jane@example.COM".into()));
        assert!(found.is_some());
    }

    #[test]
    fn test_consistency_check() {
        let mut contract = sample_contract(vec![signer("a@x.com"), signer("b@x.com")]);
        assert!(contract.check_consistency().is_ok());

        contract.status = ContractStatus::Signed;
        assert!(contract.check_consistency().is_err());

        for s in &mut contract.signatories {
            s.status = SignatureStatus::Signed;
        }
        assert!(contract.check_consistency().is_ok());
    }

    #[test]
    fn test_collecting_status_must_match_roster() {
        let mut contract = sample_contract(vec![signer("a@x.com"), signer("b@x.com")]);

        contract.status = ContractStatus::PartiallySigned;
        assert!(contract.check_consistency().is_err());

        contract.signatories[0].status = SignatureStatus::Signed;
        assert!(contract.check_consistency().is_ok());

        contract.status = ContractStatus::AwaitingSignatures;
        assert!(contract.check_consistency().is_err());

        contract.status = ContractStatus::Cancelled;
        assert!(contract.check_consistency().is_ok());
    }

    #[test]
    fn test_serialized_field_names() {
        let contract = sample_contract(vec![signer("a@x.com")]);
        let json = serde_json::to_value(&contract).unwrap();

        for key in [
            "id",
            "template_id",
            "template_nome",
            "entidade_id",
            "entidade_nome",
            "entidade_tipo",
            "status_geral",
            "dados_snapshot",
            "signatarios",
            "created_at",
            "updated_at",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert_eq!(json["status_geral"], "rascunho");
    }
}
