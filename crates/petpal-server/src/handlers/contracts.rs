//! Generated contract handlers.
//!
//! POST /contracts/generate                  generate a draft from a template
//! POST /contracts/generated                 upsert a full record
//! GET  /contracts/generated?nome=&status=&tipo=
//! GET  /contracts/generated/:id
//! PUT  /contracts/generated/:id/status      status + roster in one write
//! POST /contracts/generated/:id/send        issue signing links
//! POST /contracts/generated/:id/cancel
//! POST /contracts/expire                    expire overdue contracts

use axum::{
    extract::{Path, Query},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use petpal_contracts::{
    ContractFilter, ContractStatus, EntityKind, GenerateRequest, GeneratedContract, SendOutcome,
    Signatory,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::extract::AppJson;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListContractsQuery {
    pub nome: Option<String>,
    pub status: Option<String>,
    pub tipo: Option<String>,
}

impl ListContractsQuery {
    fn into_filter(self) -> Result<ContractFilter, AppError> {
        let status = non_empty(self.status)
            .map(|s| s.parse::<ContractStatus>())
            .transpose()?;
        let kind = non_empty(self.tipo)
            .map(|t| t.parse::<EntityKind>())
            .transpose()?;
        Ok(ContractFilter {
            name: non_empty(self.nome),
            status,
            kind,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Body of `PUT /contracts/generated/:id/status`.
#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub status_geral: ContractStatus,
    #[serde(default)]
    pub signatarios: Option<Vec<Signatory>>,
}

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub expired: Vec<Uuid>,
}

pub async fn generate(
    Extension(state): Extension<AppState>,
    AppJson(request): AppJson<GenerateRequest>,
) -> Result<(StatusCode, Json<GeneratedContract>), AppError> {
    let draft = state.lifecycle.generate(request).await?;
    Ok((StatusCode::CREATED, Json(draft)))
}

pub async fn upsert_contract(
    Extension(state): Extension<AppState>,
    AppJson(record): AppJson<GeneratedContract>,
) -> Result<Json<GeneratedContract>, AppError> {
    let stored = state.lifecycle.import_record(record).await?;
    Ok(Json(stored))
}

pub async fn list_contracts(
    Extension(state): Extension<AppState>,
    Query(query): Query<ListContractsQuery>,
) -> Result<Json<Vec<GeneratedContract>>, AppError> {
    let filter = query.into_filter()?;
    let contracts = state.lifecycle.list_all(&filter).await?;
    Ok(Json(contracts))
}

pub async fn get_contract(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GeneratedContract>, AppError> {
    Ok(Json(state.lifecycle.get_by_id(id).await?))
}

pub async fn update_status(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
    AppJson(update): AppJson<StatusUpdate>,
) -> Result<Json<GeneratedContract>, AppError> {
    let contract = state
        .lifecycle
        .apply_status_update(id, update.status_geral, update.signatarios)
        .await?;
    Ok(Json(contract))
}

pub async fn send_for_signature(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SendOutcome>, AppError> {
    Ok(Json(state.lifecycle.send_for_signature(id).await?))
}

pub async fn cancel_contract(
    Extension(state): Extension<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<GeneratedContract>, AppError> {
    Ok(Json(state.lifecycle.cancel(id).await?))
}

pub async fn expire_overdue(
    Extension(state): Extension<AppState>,
) -> Result<Json<ExpireResponse>, AppError> {
    let expired = state.lifecycle.expire_overdue(Utc::now()).await?;
    Ok(Json(ExpireResponse { expired }))
}
