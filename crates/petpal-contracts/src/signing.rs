//! Signature capture flow
//!
//! What a signer sees behind a signing link, and what happens when they
//! confirm. States in which signing is impossible (already signed, cancelled,
//! expired, never sent) come back as a [`SigningRefusal`] on the view rather
//! than as an error, so the signing page can explain what happened.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::contract::{
    AuditBlock, ContractStatus, GeneratedContract, NetworkOrigin, Signatory, SignatoryRef,
    SignatoryRole, SignatureStatus,
};
use crate::error::{ContractError, ContractResult};
use crate::lifecycle::{ContractLifecycle, SignatureOutcome};
use crate::render::TemplateRenderer;
use crate::token::SigningToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SigningRefusal {
    AlreadySigned,
    ContractCancelled,
    ContractExpired,
    NotYetSent,
}

impl SigningRefusal {
    pub fn message(&self) -> &'static str {
        match self {
            Self::AlreadySigned => "Você já assinou este contrato.",
            Self::ContractCancelled => "Este contrato foi cancelado.",
            Self::ContractExpired => "O prazo para assinatura deste contrato expirou.",
            Self::NotYetSent => "Este contrato ainda não foi enviado para assinatura.",
        }
    }

    fn for_signatory(
        contract: &GeneratedContract,
        signatory: &Signatory,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        if signatory.is_signed() {
            return Some(Self::AlreadySigned);
        }
        match contract.status {
            ContractStatus::Cancelled => Some(Self::ContractCancelled),
            ContractStatus::Expired => Some(Self::ContractExpired),
            ContractStatus::Draft => Some(Self::NotYetSent),
            // Unreachable while the roster and status agree
            ContractStatus::Signed => Some(Self::AlreadySigned),
            ContractStatus::AwaitingSignatures | ContractStatus::PartiallySigned => contract
                .is_past_deadline(now)
                .then_some(Self::ContractExpired),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerView {
    pub id: Uuid,
    pub name: String,
    pub email: Option<String>,
    pub role: SignatoryRole,
    pub status: SignatureStatus,
    pub signed_at: Option<DateTime<Utc>>,
}

impl From<&Signatory> for SignerView {
    fn from(s: &Signatory) -> Self {
        Self {
            id: s.id,
            name: s.name.clone(),
            email: s.email.clone(),
            role: s.role,
            status: s.status,
            signed_at: s.signed_at,
        }
    }
}

/// Signing page contents for one signatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SigningView {
    pub contract_id: Uuid,
    pub template_name: String,
    pub entity_name: String,
    pub contract_status: ContractStatus,
    pub signing_deadline: Option<DateTime<Utc>>,
    pub signer: SignerView,
    /// Rendered from the stored snapshot
    pub document_html: String,
    pub refusal: Option<SigningRefusal>,
}

impl SigningView {
    pub fn can_sign(&self) -> bool {
        self.refusal.is_none()
    }
}

/// What the signer confirms on the signing page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignatureSubmission {
    pub confirmed_name: String,
    pub confirmed_tax_id: String,
    #[serde(default)]
    pub consent: bool,
    /// Timestamp reported by the signer's browser
    #[serde(default)]
    pub client_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

impl SignatureSubmission {
    fn validate(&self) -> ContractResult<()> {
        if self.confirmed_name.trim().is_empty() {
            return Err(ContractError::validation("confirmed name is required"));
        }
        if self.confirmed_tax_id.trim().is_empty() {
            return Err(ContractError::validation("confirmed tax id is required"));
        }
        if !self.consent {
            return Err(ContractError::validation(
                "explicit consent is required to sign",
            ));
        }
        Ok(())
    }

    fn audit_block(&self, now: DateTime<Utc>) -> AuditBlock {
        AuditBlock {
            client_timestamp: self.client_timestamp.unwrap_or(now),
            user_agent: self
                .user_agent
                .clone()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or_else(|| "unknown".to_string()),
            network_origin: NetworkOrigin::Simulated,
            confirmed_name: self.confirmed_name.trim().to_string(),
            confirmed_tax_id: self.confirmed_tax_id.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SubmitOutcome {
    Signed { view: SigningView },
    Refused { reason: SigningRefusal, view: SigningView },
}

impl SubmitOutcome {
    pub fn view(&self) -> &SigningView {
        match self {
            Self::Signed { view } | Self::Refused { view, .. } => view,
        }
    }
}

pub struct SignatureCaptureFlow {
    lifecycle: Arc<ContractLifecycle>,
}

impl SignatureCaptureFlow {
    pub fn new(lifecycle: Arc<ContractLifecycle>) -> Self {
        Self { lifecycle }
    }

    /// Resolve a signing link to the page a signer sees.
    pub async fn open(&self, token: &str) -> ContractResult<SigningView> {
        let (contract, signatory_ref) = self.resolve(token).await?;
        Self::view_for(&contract, &signatory_ref, Utc::now())
    }

    pub async fn submit(
        &self,
        token: &str,
        submission: SignatureSubmission,
    ) -> ContractResult<SubmitOutcome> {
        let (contract, signatory_ref) = self.resolve(token).await?;
        let now = Utc::now();
        let view = Self::view_for(&contract, &signatory_ref, now)?;
        if let Some(reason) = view.refusal {
            tracing::info!(contract = %contract.id, ?reason, "signature refused");
            return Ok(SubmitOutcome::Refused { reason, view });
        }
        submission.validate()?;

        // Address the signatory by id from here on, whatever the link format
        let by_id = SignatoryRef::Id(view.signer.id);
        let outcome = self
            .lifecycle
            .record_signature(contract.id, &by_id, submission.audit_block(now))
            .await?;

        let signed = matches!(outcome, SignatureOutcome::Signed(_));
        let view = Self::view_for(outcome.contract(), &by_id, now)?;
        if signed {
            Ok(SubmitOutcome::Signed { view })
        } else {
            Ok(SubmitOutcome::Refused {
                reason: SigningRefusal::AlreadySigned,
                view,
            })
        }
    }

    async fn resolve(&self, token: &str) -> ContractResult<(GeneratedContract, SignatoryRef)> {
        let token = SigningToken::decode(token)?;
        let contract = self.lifecycle.get_by_id(token.contract_id()?).await?;
        Ok((contract, token.signatory()))
    }

    fn view_for(
        contract: &GeneratedContract,
        signatory_ref: &SignatoryRef,
        now: DateTime<Utc>,
    ) -> ContractResult<SigningView> {
        let signatory = contract
            .find_signatory(signatory_ref)
            .ok_or_else(|| ContractError::SignatoryNotFound(signatory_ref.to_string()))?;

        Ok(SigningView {
            contract_id: contract.id,
            template_name: contract.template.name.clone(),
            entity_name: contract.entity_name.clone(),
            contract_status: contract.status,
            signing_deadline: contract.signing_deadline,
            signer: SignerView::from(signatory),
            document_html: TemplateRenderer::render(
                &contract.snapshot.template_body,
                &contract.snapshot.tokens,
            ),
            refusal: SigningRefusal::for_signatory(contract, signatory, now),
        })
    }
}
