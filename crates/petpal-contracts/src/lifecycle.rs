//! Contract Record Lifecycle Manager
//!
//! Owns every read and write of generated contracts. Callers never touch the
//! `ContractStore` directly; each operation loads the record, applies one
//! state-machine step, and writes the whole record back through the store of
//! record before reporting success.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::contract::{
    AuditBlock, ContractStatus, DataSnapshot, GeneratedContract, ServiceRef, Signatory,
    SignatoryRef, SignatureStatus, StatusTransition, TemplateRef,
};
use crate::directory::EntityDirectory;
use crate::entity::{Agency, EntityKind, TargetEntity};
use crate::error::{ContractError, ContractResult};
use crate::render::TemplateRenderer;
use crate::resolution::{ResolutionContext, VariableResolver};
use crate::roster::RosterBuilder;
use crate::store::ContractStore;
use crate::template::{ContractTemplate, TemplateStore};
use crate::token::SigningToken;

pub const DEFAULT_SIGNING_BASE_URL: &str = "http://localhost:4200/sign";

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Prefix of issued signing links
    pub signing_base_url: String,
    /// Time a contract may wait for signatures after the first send.
    /// `None` means contracts never expire.
    pub signing_window: Option<Duration>,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            signing_base_url: DEFAULT_SIGNING_BASE_URL.to_string(),
            signing_window: None,
        }
    }
}

/// Input to [`ContractLifecycle::generate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub template_id: String,
    pub entity_kind: EntityKind,
    pub entity_id: String,
    #[serde(default)]
    pub service_id: Option<String>,
    /// Date printed in the document; today when absent
    #[serde(default)]
    pub generated_on: Option<NaiveDate>,
}

/// Filters for [`ContractLifecycle::list_all`]. Empty filter matches all.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContractFilter {
    /// Case-insensitive substring of the entity or template name
    pub name: Option<String>,
    pub status: Option<ContractStatus>,
    pub kind: Option<EntityKind>,
}

impl ContractFilter {
    pub fn matches(&self, contract: &GeneratedContract) -> bool {
        let name_ok = match self.name.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                contract.entity_name.to_lowercase().contains(&needle)
                    || contract.template.name.to_lowercase().contains(&needle)
            }
        };
        name_ok
            && self.status.map_or(true, |s| contract.status == s)
            && self.kind.map_or(true, |k| contract.entity_kind == k)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedLink {
    pub signatory_id: Uuid,
    pub name: String,
    pub email: String,
    pub token: String,
    pub link: String,
}

/// A pending signatory that got no link.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedSignatory {
    pub signatory_id: Uuid,
    pub name: String,
    pub warning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendOutcome {
    pub contract: GeneratedContract,
    pub issued: Vec<IssuedLink>,
    pub skipped: Vec<SkippedSignatory>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignatureOutcome {
    Signed(GeneratedContract),
    /// The signatory had already signed; nothing was written
    AlreadySigned(GeneratedContract),
}

impl SignatureOutcome {
    pub fn contract(&self) -> &GeneratedContract {
        match self {
            Self::Signed(c) | Self::AlreadySigned(c) => c,
        }
    }

    pub fn into_contract(self) -> GeneratedContract {
        match self {
            Self::Signed(c) | Self::AlreadySigned(c) => c,
        }
    }
}

#[derive(Serialize)]
struct SnapshotSources<'a> {
    entity: &'a TargetEntity,
    agency: &'a Agency,
    service: Option<&'a ServiceRef>,
}

pub struct ContractLifecycle {
    contracts: Arc<dyn ContractStore>,
    templates: Arc<dyn TemplateStore>,
    directory: Arc<dyn EntityDirectory>,
    config: LifecycleConfig,
}

impl ContractLifecycle {
    pub fn new(
        contracts: Arc<dyn ContractStore>,
        templates: Arc<dyn TemplateStore>,
        directory: Arc<dyn EntityDirectory>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            contracts,
            templates,
            directory,
            config,
        }
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn templates(&self) -> &Arc<dyn TemplateStore> {
        &self.templates
    }

    /// Resolve, render and roster a template for one entity, then store the
    /// result as a draft.
    pub async fn generate(&self, request: GenerateRequest) -> ContractResult<GeneratedContract> {
        let template = self
            .templates
            .load(&request.template_id)
            .await
            .map_err(ContractError::Persistence)?
            .ok_or_else(|| ContractError::TemplateNotFound(request.template_id.clone()))?;
        if !template.active {
            return Err(ContractError::validation(format!(
                "template {} is inactive",
                template.id
            )));
        }

        let entity = self
            .directory
            .target(request.entity_kind, &request.entity_id)
            .await
            .map_err(ContractError::Persistence)?
            .ok_or_else(|| {
                ContractError::EntityNotFound(format!(
                    "{} {}",
                    request.entity_kind, request.entity_id
                ))
            })?;
        let agency = self
            .directory
            .agency()
            .await
            .map_err(ContractError::Persistence)?
            .ok_or_else(|| ContractError::EntityNotFound("agency".into()))?;

        let mut ctx =
            ResolutionContext::new(request.generated_on.unwrap_or_else(|| Utc::now().date_naive()));
        if let Some(service_id) = request.service_id {
            ctx = ctx.with_service(service_id);
        }

        let tokens = VariableResolver::resolve(&template, &entity, &agency, &ctx)?;
        let signatories = RosterBuilder::build(&entity, &agency)?;
        let service = entity.selected_service(&ctx)?.map(|s| ServiceRef {
            id: s.id.clone(),
            name: s.name.clone(),
        });

        let sources = serde_json::to_value(SnapshotSources {
            entity: &entity,
            agency: &agency,
            service: service.as_ref(),
        })
        .map_err(|e| ContractError::Persistence(e.into()))?;
        let snapshot = DataSnapshot {
            tokens,
            template_body: template.body.clone(),
            sources,
        };

        self.create_draft(&template, &entity, snapshot, signatories, service)
            .await
    }

    /// Store a new draft. The document is rendered from the snapshot.
    pub async fn create_draft(
        &self,
        template: &ContractTemplate,
        entity: &TargetEntity,
        snapshot: DataSnapshot,
        signatories: Vec<Signatory>,
        service: Option<ServiceRef>,
    ) -> ContractResult<GeneratedContract> {
        if signatories.is_empty() {
            return Err(ContractError::validation(
                "a contract needs at least one signatory",
            ));
        }

        let now = Utc::now();
        let contract = GeneratedContract {
            id: Uuid::new_v4(),
            template: TemplateRef {
                id: template.id.clone(),
                name: template.name.clone(),
                version: template.version.clone(),
            },
            entity_kind: entity.kind(),
            entity_id: entity.entity_id().to_string(),
            entity_name: entity.display_name().to_string(),
            service,
            document_html: TemplateRenderer::render(&snapshot.template_body, &snapshot.tokens),
            signatories,
            status: ContractStatus::Draft,
            snapshot,
            generated_at: now,
            sent_at: None,
            signing_deadline: None,
            last_signed_at: None,
            completed_at: None,
            history: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        self.persist(&contract).await?;
        tracing::info!(
            contract = %contract.id,
            template = %contract.template.id,
            entity = %contract.entity_id,
            "draft contract created"
        );
        Ok(contract)
    }

    /// Matching records, most recently created first.
    pub async fn list_all(&self, filter: &ContractFilter) -> ContractResult<Vec<GeneratedContract>> {
        let all = self
            .contracts
            .list()
            .await
            .map_err(ContractError::Persistence)?;
        let matching: Vec<_> = all.into_iter().filter(|c| filter.matches(c)).collect();
        tracing::debug!(count = matching.len(), ?filter, "listed contracts");
        Ok(matching)
    }

    pub async fn get_by_id(&self, id: Uuid) -> ContractResult<GeneratedContract> {
        self.contracts
            .load(id)
            .await
            .map_err(ContractError::Persistence)?
            .ok_or(ContractError::ContractNotFound(id))
    }

    /// Issue signing links to every pending signatory with an email.
    ///
    /// Safe to call again: only still-pending signatories get new links.
    /// Accepted from draft, awaiting and partially signed so a resend can
    /// reach whoever has not signed yet.
    pub async fn send_for_signature(&self, id: Uuid) -> ContractResult<SendOutcome> {
        let mut contract = self.get_by_id(id).await?;
        if contract.status.is_terminal() {
            return Err(ContractError::InvalidTransition {
                from: contract.status,
                action: "send",
            });
        }
        if contract.pending_signatories().next().is_none() {
            return Err(ContractError::NoPendingSignatories(id));
        }

        let mut issued = Vec::new();
        let mut skipped = Vec::new();
        for signatory in contract.signatories.iter_mut().filter(|s| s.is_pending()) {
            match signatory.email.clone().filter(|e| !e.trim().is_empty()) {
                Some(email) => {
                    let token = SigningToken::new(id, signatory.id);
                    let link = token.link(&self.config.signing_base_url);
                    signatory.signing_link = Some(link.clone());
                    issued.push(IssuedLink {
                        signatory_id: signatory.id,
                        name: signatory.name.clone(),
                        email,
                        token: token.encode(),
                        link,
                    });
                }
                None => {
                    let warning = ContractError::MissingContactInfo(format!(
                        "signatory {} has no email; no signing link issued",
                        signatory.name
                    ));
                    tracing::warn!(contract = %id, signatory = %signatory.id, "{warning}");
                    skipped.push(SkippedSignatory {
                        signatory_id: signatory.id,
                        name: signatory.name.clone(),
                        warning: warning.to_string(),
                    });
                }
            }
        }

        let now = Utc::now();
        if contract.status == ContractStatus::Draft {
            self.step(&mut contract, ContractStatus::AwaitingSignatures, "send", None)?;
            contract.sent_at = Some(now);
            contract.signing_deadline = self.config.signing_window.map(|window| now + window);
        }
        contract.updated_at = now;

        self.persist(&contract).await?;
        tracing::info!(
            contract = %id,
            issued = issued.len(),
            skipped = skipped.len(),
            "signing links issued"
        );
        Ok(SendOutcome {
            contract,
            issued,
            skipped,
        })
    }

    pub async fn cancel(&self, id: Uuid) -> ContractResult<GeneratedContract> {
        let mut contract = self.get_by_id(id).await?;
        self.step(&mut contract, ContractStatus::Cancelled, "cancel", None)?;
        self.persist(&contract).await?;
        Ok(contract)
    }

    /// Mark one signatory as signed and advance the overall status.
    pub async fn record_signature(
        &self,
        id: Uuid,
        signatory: &SignatoryRef,
        audit: AuditBlock,
    ) -> ContractResult<SignatureOutcome> {
        let mut contract = self.get_by_id(id).await?;
        let index = contract
            .signatory_index(signatory)
            .ok_or_else(|| ContractError::SignatoryNotFound(signatory.to_string()))?;

        if contract.signatories[index].is_signed() {
            tracing::info!(contract = %id, %signatory, "signature already recorded");
            return Ok(SignatureOutcome::AlreadySigned(contract));
        }
        if !contract.status.is_collecting() {
            return Err(ContractError::InvalidTransition {
                from: contract.status,
                action: "sign",
            });
        }

        let now = Utc::now();
        if contract.is_past_deadline(now) {
            self.step(
                &mut contract,
                ContractStatus::Expired,
                "expire",
                Some("signing deadline passed".into()),
            )?;
            self.persist(&contract).await?;
            return Err(ContractError::InvalidTransition {
                from: contract.status,
                action: "sign",
            });
        }

        let entry = &mut contract.signatories[index];
        entry.status = SignatureStatus::Signed;
        entry.signed_at = Some(now);
        entry.audit = Some(audit);
        contract.last_signed_at = Some(now);

        let next = contract.status_from_roster();
        if next != contract.status {
            self.step(&mut contract, next, "sign", None)?;
            if next == ContractStatus::Signed {
                contract.completed_at = Some(now);
            }
        }
        contract.updated_at = now;

        self.persist(&contract).await?;
        tracing::info!(contract = %id, %signatory, status = %contract.status, "signature recorded");
        Ok(SignatureOutcome::Signed(contract))
    }

    /// Insert or replace a full record, idempotent by id.
    ///
    /// The record must satisfy the signed-iff-all-signed rule. An existing
    /// record may only move forward along the state machine, and terminal
    /// records are never overwritten with different content.
    pub async fn import_record(
        &self,
        mut record: GeneratedContract,
    ) -> ContractResult<GeneratedContract> {
        record.check_consistency()?;

        let existing = self
            .contracts
            .load(record.id)
            .await
            .map_err(ContractError::Persistence)?;

        if let Some(existing) = existing {
            if existing == record {
                return Ok(existing);
            }
            if existing.status.is_terminal() {
                return Err(ContractError::InvalidTransition {
                    from: existing.status,
                    action: "overwrite",
                });
            }
            ensure_no_unsigning(&existing.signatories, &record.signatories)?;
            if existing.status != record.status {
                if !existing.status.can_transition_to(record.status) {
                    return Err(ContractError::InvalidTransition {
                        from: existing.status,
                        action: "import",
                    });
                }
                let already_recorded = record
                    .history
                    .last()
                    .is_some_and(|t| t.from == existing.status && t.to == record.status);
                if !already_recorded {
                    record.history.push(StatusTransition {
                        from: existing.status,
                        to: record.status,
                        at: Utc::now(),
                        reason: Some("imported".into()),
                    });
                }
                log_transition(record.id, existing.status, record.status, "import");
            }
            record.created_at = existing.created_at;
        }

        record.updated_at = Utc::now();
        self.persist(&record).await?;
        Ok(record)
    }

    /// Set status and, optionally, the whole signatory list in one write.
    pub async fn apply_status_update(
        &self,
        id: Uuid,
        status: ContractStatus,
        signatories: Option<Vec<Signatory>>,
    ) -> ContractResult<GeneratedContract> {
        let mut contract = self.get_by_id(id).await?;
        if contract.status.is_terminal() {
            return Err(ContractError::InvalidTransition {
                from: contract.status,
                action: "update",
            });
        }

        if let Some(signatories) = signatories {
            ensure_no_unsigning(&contract.signatories, &signatories)?;
            contract.signatories = signatories;
        }

        let now = Utc::now();
        if status != contract.status {
            self.step(&mut contract, status, "update status of", None)?;
            match status {
                ContractStatus::AwaitingSignatures if contract.sent_at.is_none() => {
                    contract.sent_at = Some(now);
                }
                ContractStatus::Signed => contract.completed_at = Some(now),
                _ => {}
            }
        }
        if contract.signatories.iter().any(Signatory::is_signed) && contract.last_signed_at.is_none()
        {
            contract.last_signed_at = contract.signatories.iter().filter_map(|s| s.signed_at).max();
        }
        contract.check_consistency()?;
        contract.updated_at = now;

        self.persist(&contract).await?;
        Ok(contract)
    }

    /// Expire every collecting contract whose signing deadline is at or
    /// before `now`. Returns the ids that were expired.
    pub async fn expire_overdue(&self, now: DateTime<Utc>) -> ContractResult<Vec<Uuid>> {
        let all = self
            .contracts
            .list()
            .await
            .map_err(ContractError::Persistence)?;

        let mut expired = Vec::new();
        for mut contract in all
            .into_iter()
            .filter(|c| c.status.is_collecting() && c.is_past_deadline(now))
        {
            self.step(
                &mut contract,
                ContractStatus::Expired,
                "expire",
                Some("signing deadline passed".into()),
            )?;
            self.persist(&contract).await?;
            expired.push(contract.id);
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "expired overdue contracts");
        }
        Ok(expired)
    }

    fn step(
        &self,
        contract: &mut GeneratedContract,
        to: ContractStatus,
        action: &'static str,
        reason: Option<String>,
    ) -> ContractResult<()> {
        let from = contract.status;
        contract.transition(to, action, reason)?;
        log_transition(contract.id, from, to, action);
        Ok(())
    }

    async fn persist(&self, contract: &GeneratedContract) -> ContractResult<()> {
        self.contracts.save(contract).await.map_err(|e| {
            tracing::error!(contract = %contract.id, "durable write failed: {e:#}");
            ContractError::Persistence(e)
        })
    }
}

fn log_transition(id: Uuid, from: ContractStatus, to: ContractStatus, action: &str) {
    tracing::info!(contract = %id, %from, %to, action, "contract status changed");
}

/// A signatory that was signed must stay signed.
fn ensure_no_unsigning(before: &[Signatory], after: &[Signatory]) -> ContractResult<()> {
    for old in before.iter().filter(|s| s.is_signed()) {
        let still_signed = after.iter().any(|s| s.id == old.id && s.is_signed());
        if !still_signed {
            return Err(ContractError::validation(format!(
                "signatory {} already signed and cannot be reset or removed",
                old.id
            )));
        }
    }
    Ok(())
}
